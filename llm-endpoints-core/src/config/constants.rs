/// Model ID constants shared by the providers and the dispatcher route table
pub mod models {
    // Google/Gemini models
    pub mod google {
        pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
        pub const SUPPORTED_MODELS: &[&str] = &[
            "gemini-1.5-flash",
            "gemini-1.5-pro",
            "gemini-2.0-flash",
            "gemini-2.0-flash-lite",
            "gemini-2.5-flash",
            "gemini-2.5-pro",
        ];

        /// Prefixes the dispatcher uses to claim a model for Gemini
        pub const MODEL_PREFIXES: &[&str] = &["gemini-", "models/gemini"];

        pub const GEMINI_2_0_FLASH: &str = "gemini-2.0-flash";
    }

    // OpenAI models
    pub mod openai {
        pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

        /// Served by `/v1/chat/completions`
        pub const CHAT_MODELS: &[&str] = &[
            "gpt-4",
            "gpt-4-turbo-preview",
            "gpt-4-turbo",
            "gpt-3.5-turbo",
            "gpt-4o",
            "gpt-4o-mini",
        ];

        /// Served by the legacy `/v1/completions` endpoint
        pub const LEGACY_MODELS: &[&str] = &["gpt-3.5-turbo-instruct", "babbage-002", "davinci-002"];

        /// Prefixes the dispatcher uses to claim a model for OpenAI
        pub const MODEL_PREFIXES: &[&str] =
            &["gpt-", "o1", "o3", "o4", "babbage-", "davinci-", "text-"];

        pub const GPT_3_5_TURBO: &str = "gpt-3.5-turbo";
        pub const GPT_3_5_TURBO_INSTRUCT: &str = "gpt-3.5-turbo-instruct";
    }
}

/// Provider name constants
pub mod providers {
    pub const OPENAI: &str = "openai";
    pub const GEMINI: &str = "gemini";
    /// Attributed to failures raised by the batch worker pool itself
    pub const BATCH_RUNNER: &str = "batch-runner";
}

/// API base URLs
pub mod urls {
    pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
    pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
}

/// Environment variable names for credentials
pub mod env_vars {
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const OPENAI_ORGANIZATION: &str = "OPENAI_ORGANIZATION";
    pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
    pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";

    /// Names used by older `.env` files for the OpenAI organization account
    pub const LEGACY_API_KEY: &str = "API_KEY";
    pub const LEGACY_ORGANIZATION_ID: &str = "ORGANIZATION_ID";
}

/// Message role constants
pub mod message_roles {
    pub const SYSTEM: &str = "system";
    pub const USER: &str = "user";
    pub const ASSISTANT: &str = "assistant";
}

/// Defaults for sampling parameters and clients
pub mod defaults {
    pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
    pub const OPENAI_MAX_TOKENS: u32 = 128;
    pub const GEMINI_MAX_TOKENS: u32 = 1024;
    pub const TEMPERATURE: f32 = 0.7;
    pub const TOP_P: f32 = 1.0;
    pub const MIN_TEMPERATURE: f32 = 0.0;
    pub const MAX_TEMPERATURE: f32 = 2.0;
    pub const MIN_TOP_P: f32 = 0.0;
    pub const MAX_TOP_P: f32 = 1.0;
    pub const HTTP_TIMEOUT_SECS: u64 = 60;
    pub const MAX_CONCURRENCY: usize = 4;
}

/// Canary prompt and expected answer for provider self-tests
pub mod verification {
    pub const CANARY_PROMPT: &str = "Say this is a test!";
    pub const EXPECTED_REPLY: &str = "This is a test!";
}

/// Result file policy
pub mod results {
    pub const DEFAULT_DIRECTORY: &str = "results";
    pub const DEFAULT_FILE_NAME: &str = "results";
    pub const FILE_EXTENSION: &str = "csv";
    pub const LABEL_HEADER: &str = "label";
    pub const REPLY_HEADER: &str = "reply";
}

/// Configuration file locations
pub mod config_files {
    pub const FILE_NAME: &str = "llm-endpoints.toml";
    pub const HOME_DIR_NAME: &str = ".llm-endpoints";
}

/// Helpers for checking model ids against the curated lists
pub mod model_helpers {
    use super::models;
    use super::providers;

    /// Supported model ids for a provider
    pub fn supported_for(provider: &str) -> Vec<&'static str> {
        match provider {
            providers::OPENAI => models::openai::CHAT_MODELS
                .iter()
                .chain(models::openai::LEGACY_MODELS.iter())
                .copied()
                .collect(),
            providers::GEMINI => models::google::SUPPORTED_MODELS.to_vec(),
            _ => Vec::new(),
        }
    }

    /// Whether an OpenAI model must go through the legacy completions endpoint
    pub fn is_openai_legacy(model: &str) -> bool {
        models::openai::LEGACY_MODELS.contains(&model)
    }
}
