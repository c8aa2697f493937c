//! Google Gemini adapter covering the Gemini Developer API and Vertex AI.

mod error;
mod provider;
mod request;
mod response;
mod stream;
mod types;

pub use provider::{GeminiTarget, GoogleGeminiProvider};

pub(crate) const PROVIDER_NAME: &str = "google_gemini";
