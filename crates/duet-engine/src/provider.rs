//! Response provider adapters.
//!
//! Each backend implements [`TextGenerator`], which is free to fail. The
//! [`Adapter`] wrapping it is not: every failure is logged and turned into a
//! short sentinel string starting with [`WARNING_MARKER`], so callers always
//! receive displayable text.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Prefix shared by every sentinel failure string.
pub const WARNING_MARKER: &str = "⚠️";

/// Sentinel used when a backend answers with no text.
pub const NO_RESPONSE_SENTINEL: &str = "⚠️ No response generated";

/// Shown in both fields when dispatch itself fails.
pub const ORCHESTRATION_FAILURE: &str = "⚠️ Failed to fetch response";

const FAILURE_SUFFIX: &str = " response failed";

/// Formatting instructions prepended to every prompt.
pub const STYLE_PREAMBLE: &str = r"You are a helpful AI assistant that formats all your answers beautifully in Markdown.

• 🎯 Use big section headers with relevant emojis (e.g., 🎯, 🚀, 📚, 🛠️).
• ✅ Use ✅ or ➡️ for ordered steps or checklist items.
• ⚡ Highlight tips with ⚡ or 💡.
• ⚠️ Show warnings or important notes with ⚠️ or ❗.
• 📌 Use 📌 when mentioning important points or summaries.
• 🚫 For errors or restrictions, use 🚫 or ❌.
• ✏️ For code-related instructions, use ✏️ or 🧠.
• 🎨 Feel free to use bold (**text**) and italics (*text*) for emphasis.
• ℹ️ Provide useful info with ℹ️ when explaining concepts.
• ⏳ If something is time-based, use ⏳ or ⏱️.
• Use bullet points (•) or checkmarks for clean lists.

👉 Keep all code blocks clean without adding emojis inside code.

Render everything cleanly and naturally in Markdown!";

/// A single text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// Send one completion request and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Errors a backend can report.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Backend answered without any text.
    #[error("empty completion")]
    EmptyCompletion,
}

/// Whether `text` is one of the sentinel strings produced by this crate.
///
/// Replies that merely open with [`WARNING_MARKER`] are not sentinels.
pub fn is_sentinel(text: &str) -> bool {
    if text == NO_RESPONSE_SENTINEL || text == ORCHESTRATION_FAILURE {
        return true;
    }
    text.strip_prefix(WARNING_MARKER)
        .and_then(|rest| rest.strip_prefix(' '))
        .and_then(|rest| rest.strip_suffix(FAILURE_SUFFIX))
        .is_some_and(|label| !label.trim().is_empty() && !label.contains('\n'))
}

/// Sentinel reported for a failed backend call.
pub fn failure_sentinel(label: &str) -> String {
    format!("{WARNING_MARKER} {label}{FAILURE_SUFFIX}")
}

/// Build the full prompt sent to a backend.
pub fn styled_prompt(prompt: &str) -> String {
    format!("{STYLE_PREAMBLE}\n\n{prompt}")
}

/// Non-failing wrapper around a [`TextGenerator`].
#[derive(Clone)]
pub struct Adapter {
    label: String,
    generator: Arc<dyn TextGenerator>,
}

impl Adapter {
    /// Wrap a generator; `label` appears in the failure sentinel.
    pub fn new(label: impl Into<String>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            label: label.into(),
            generator,
        }
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Generate a reply, converting every failure into a sentinel.
    pub async fn generate(&self, prompt: &str) -> String {
        let full_prompt = styled_prompt(prompt);
        match self.generator.generate(&full_prompt).await {
            Ok(text) if text.trim().is_empty() => {
                warn!(backend = %self.generator.name(), "Backend returned blank text");
                NO_RESPONSE_SENTINEL.to_string()
            }
            Ok(text) => {
                debug!(backend = %self.generator.name(), chars = text.chars().count(), "Backend replied");
                text
            }
            Err(ProviderError::EmptyCompletion) => {
                warn!(backend = %self.generator.name(), "Backend returned no completion");
                NO_RESPONSE_SENTINEL.to_string()
            }
            Err(e) => {
                warn!(backend = %self.generator.name(), error = %e, "Backend call failed");
                failure_sentinel(&self.label)
            }
        }
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("label", &self.label)
            .field("backend", &self.generator.name())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod stub {
    //! Scripted generators shared by tests across the crate.

    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{ProviderError, TextGenerator};

    /// What a [`StubGenerator`] does when called.
    pub enum Reply {
        Text(String),
        Fail,
        Empty,
        Panic,
    }

    /// Generator returning a fixed reply after an optional delay.
    pub struct StubGenerator {
        pub reply: Reply,
        pub delay: Duration,
        pub prompts: Mutex<Vec<String>>,
    }

    impl StubGenerator {
        pub fn text(text: &str) -> Self {
            Self::with(Reply::Text(text.to_string()))
        }

        pub fn failing() -> Self {
            Self::with(Reply::Fail)
        }

        pub fn with(reply: Reply) -> Self {
            Self {
                reply,
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        fn name(&self) -> &str {
            "stub"
        }

        async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Reply::Text(text) => Ok(text.clone()),
                Reply::Fail => Err(ProviderError::Status {
                    status: 500,
                    body: "boom".into(),
                }),
                Reply::Empty => Err(ProviderError::EmptyCompletion),
                Reply::Panic => panic!("stub generator panicked"),
            }
        }
    }
}
