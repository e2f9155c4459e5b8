//! Concrete HTTP backends implementing [`TextGenerator`](crate::provider::TextGenerator).

pub mod gemini;
pub mod groq;

pub use gemini::GeminiBackend;
pub use groq::GroqBackend;

use crate::provider::ProviderError;

/// Turn a non-success response into [`ProviderError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body,
    })
}
