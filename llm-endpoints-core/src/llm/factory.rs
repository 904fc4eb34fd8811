use super::batch::{BatchRunner, ExecutionStrategy};
use super::providers::{GeminiProvider, OpenAIProvider};
use super::verification::VerificationReport;
use crate::config::api_keys::Credentials;
use crate::config::constants::{env_vars, models, providers};
use crate::config::loader::EndpointsConfig;
use crate::llm::provider::{LLMError, LLMProvider, ModelParameters, Query, ResultSet};
use crate::results::ResultWriter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Model ids claimed by one provider
#[derive(Debug, Clone)]
struct Route {
    provider: String,
    prefixes: Vec<String>,
    models: Vec<String>,
}

impl Route {
    fn new(provider: &str, prefixes: &[&str]) -> Self {
        Self {
            provider: provider.to_string(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            models: Vec::new(),
        }
    }
}

/// Where a batch's results are written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOptions {
    /// Overrides the configured results directory
    pub directory: Option<PathBuf>,
    /// Overrides the configured base file name
    pub file_name: Option<String>,
    /// One label per prompt; the prompts themselves when absent
    pub labels: Option<Vec<String>>,
}

/// Options for [`Dispatcher::multiple_queries`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOptions {
    pub strategy: ExecutionStrategy,
    pub system_prompt: Option<String>,
    pub parameters: Option<ModelParameters>,
    pub save: Option<SaveOptions>,
}

/// Routes model ids to provider clients
///
/// The route table is fixed at construction. A route may exist for a provider
/// that has no client registered (its credentials were missing); requests for
/// such models fail with [`LLMError::Authentication`].
pub struct Dispatcher {
    routes: Vec<Route>,
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    writer: ResultWriter,
    max_concurrency: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Built-in routes, no clients
    pub fn new() -> Self {
        Self {
            routes: vec![
                Route::new(providers::OPENAI, models::openai::MODEL_PREFIXES),
                Route::new(providers::GEMINI, models::google::MODEL_PREFIXES),
            ],
            providers: HashMap::new(),
            writer: ResultWriter::default(),
            max_concurrency: EndpointsConfig::default().batch.max_concurrency,
        }
    }

    /// Create a client for every provider with credentials
    pub fn from_config(
        credentials: &Credentials,
        config: &EndpointsConfig,
    ) -> Result<Self, LLMError> {
        let mut dispatcher = Self::new()
            .with_results(ResultWriter::from_config(&config.results))
            .with_max_concurrency(config.batch.max_concurrency);

        dispatcher.add_models(providers::OPENAI, &config.openai.extra_models);
        dispatcher.add_models(providers::GEMINI, &config.gemini.extra_models);

        if let Some(openai) = &credentials.openai {
            let client = OpenAIProvider::from_settings(
                openai,
                &config.openai,
                &config.default_system_prompt,
                config.http.timeout(),
            )?;
            dispatcher.register(Arc::new(client));
        }

        if let Some(gemini) = &credentials.gemini {
            let client = GeminiProvider::from_settings(
                gemini,
                &config.gemini,
                &config.default_system_prompt,
                config.http.timeout(),
            )?;
            dispatcher.register(Arc::new(client));
        }

        info!(providers = ?dispatcher.providers(), "dispatcher ready");
        Ok(dispatcher)
    }

    /// Register a client under its own name, claiming `prefixes` and every
    /// model it reports as supported
    pub fn with_provider(mut self, prefixes: &[&str], provider: Arc<dyn LLMProvider>) -> Self {
        let name = provider.name().to_string();
        let index = match self.routes.iter().position(|r| r.provider == name) {
            Some(index) => index,
            None => {
                self.routes.push(Route::new(&name, &[]));
                self.routes.len() - 1
            }
        };

        let route = &mut self.routes[index];
        route
            .prefixes
            .extend(prefixes.iter().map(|p| p.to_string()));
        route.models.extend(provider.supported_models());

        self.register(provider);
        self
    }

    pub fn with_results(mut self, writer: ResultWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    fn register(&mut self, provider: Arc<dyn LLMProvider>) {
        debug!(provider = provider.name(), "registering provider");
        self.providers.insert(provider.name().to_string(), provider);
    }

    fn add_models(&mut self, provider: &str, models: &[String]) {
        if let Some(route) = self.routes.iter_mut().find(|r| r.provider == provider) {
            route.models.extend(models.iter().cloned());
        }
    }

    /// Names of providers with a registered client, sorted
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Determine provider name from model string
    ///
    /// Exact model ids win over prefixes. Matching is case-sensitive, the same
    /// as each provider's own model check.
    pub fn provider_from_model(&self, model: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|route| route.models.iter().any(|known| known == model))
            .or_else(|| {
                self.routes
                    .iter()
                    .find(|route| route.prefixes.iter().any(|prefix| model.starts_with(prefix.as_str())))
            })
            .map(|route| route.provider.as_str())
    }

    /// The client responsible for `model`
    pub fn route(&self, model: &str) -> Result<Arc<dyn LLMProvider>, LLMError> {
        let name = self
            .provider_from_model(model)
            .ok_or_else(|| LLMError::UnknownModel(model.to_string()))?;

        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LLMError::Authentication {
                provider: name.to_string(),
                message: missing_credentials_hint(name),
            })
    }

    pub async fn query(
        &self,
        model: &str,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LLMError> {
        self.route(model)?.query(model, prompt, system_prompt).await
    }

    pub async fn query_with(&self, query: &Query) -> Result<String, LLMError> {
        self.route(&query.model)?.query_with(query).await
    }

    /// Replace the stored defaults of the provider serving `model`
    pub fn configure(&self, model: &str, parameters: ModelParameters) -> Result<(), LLMError> {
        self.route(model)?.configure(parameters)
    }

    /// Run a batch against the provider serving `model`, optionally saving it
    pub async fn multiple_queries(
        &self,
        model: &str,
        prompts: &[String],
        options: &BatchOptions,
    ) -> Result<ResultSet, LLMError> {
        let provider = self.route(model)?;

        if let Some(labels) = options.save.as_ref().and_then(|save| save.labels.as_ref()) {
            if labels.len() != prompts.len() {
                return Err(LLMError::LabelCountMismatch {
                    expected: prompts.len(),
                    actual: labels.len(),
                });
            }
        }

        let results = BatchRunner::new(provider)
            .with_max_concurrency(self.max_concurrency)
            .run(
                options.strategy,
                prompts,
                options.system_prompt.as_deref(),
                model,
                options.parameters.as_ref(),
            )
            .await?;

        if let Some(save) = &options.save {
            self.save_results(&results, save)?;
        }

        Ok(results)
    }

    /// Persist a result set with the configured writer
    pub fn save_results(&self, results: &ResultSet, save: &SaveOptions) -> Result<PathBuf, LLMError> {
        self.writer.save(
            results,
            save.directory.as_deref(),
            save.file_name.as_deref(),
            save.labels.as_deref(),
        )
    }

    /// Where a batch saved with `save` lands
    pub fn results_path(&self, save: &SaveOptions) -> PathBuf {
        self.writer
            .path_for(save.directory.as_deref(), save.file_name.as_deref())
    }

    /// Self-test every registered provider, in name order
    pub async fn verify_all(&self) -> Vec<VerificationReport> {
        let mut reports = Vec::with_capacity(self.providers.len());
        for name in self.providers() {
            if let Some(provider) = self.providers.get(name) {
                reports.push(provider.run_verification().await);
            }
        }
        reports
    }
}

fn missing_credentials_hint(provider: &str) -> String {
    let variable = match provider {
        providers::OPENAI => env_vars::OPENAI_API_KEY,
        providers::GEMINI => env_vars::GEMINI_API_KEY,
        _ => return "no client is registered for this provider".to_string(),
    };
    format!("no credentials configured; set {variable}")
}
