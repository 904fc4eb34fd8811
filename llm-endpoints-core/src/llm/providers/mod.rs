pub mod gemini;
pub mod openai;

pub(crate) mod http;

pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;
