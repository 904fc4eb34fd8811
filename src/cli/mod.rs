//! Command-line interface module
//!
//! Argument parsing plus one handler per subcommand.

pub mod args;
pub mod ask;
pub mod batch;
pub mod init;
pub mod verify;

pub use args::*;
pub use ask::handle_ask_command;
pub use batch::handle_batch_command;
pub use init::handle_init_command;
pub use verify::handle_verify_command;

use llm_endpoints_core::llm::{Dispatcher, ModelParameters};

/// Merge command-line overrides into the routed provider's current defaults
///
/// Returns `None` when nothing was overridden so the provider defaults apply.
pub fn resolve_overrides(
    dispatcher: &Dispatcher,
    model: &str,
    overrides: &ParameterArgs,
) -> anyhow::Result<Option<ModelParameters>> {
    if overrides.is_empty() {
        return Ok(None);
    }

    let mut parameters = dispatcher.route(model)?.parameters();
    if overrides.stream {
        parameters.stream = true;
    }
    if let Some(max_tokens) = overrides.max_tokens {
        parameters.max_tokens = max_tokens;
    }
    if let Some(temperature) = overrides.temperature {
        parameters.temperature = temperature;
    }
    if let Some(top_p) = overrides.top_p {
        parameters.top_p = top_p;
    }
    Ok(Some(parameters))
}
