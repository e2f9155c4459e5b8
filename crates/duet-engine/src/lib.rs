//! duet-engine: Headless engine for dual-model chat sessions
//!
//! This crate provides the core logic behind duet, including:
//! - Provider adapters that never fail, plus Gemini and Groq HTTP backends
//! - Concurrent dispatch of each prompt to both backends
//! - An observable conversation timeline
//! - Typewriter playback of finalized replies
//! - A durable, append-only history mirror

pub mod backends;
pub mod config;
pub mod history;
pub mod message;
pub mod orchestrator;
pub mod playback;
pub mod provider;
pub mod session;
pub mod timeline;

// Re-export commonly used types
pub use config::{BackendConfig, BackendKind, Config, ConfigError};
pub use history::{HistoryError, HistoryMirror};
pub use message::{DualResponse, IdGenerator, Message, MessageContent, MessageId};
pub use orchestrator::{Exchange, Orchestrator, ORCHESTRATION_FAILURE};
pub use playback::{Playback, PlaybackEngine, RevealCursor, RevealFrame};
pub use provider::{is_sentinel, Adapter, ProviderError, TextGenerator};
pub use session::{ChatSession, RenderView};
pub use timeline::TimelineStore;

/// Returns the engine version.
pub fn engine_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
