//! Chat session facade.
//!
//! [`ChatSession`] wires the timeline, orchestrator, history mirror and
//! playback engine together and exposes what a rendering surface needs:
//! submit, new chat, the theme flag and a [`RenderView`] snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::backends::{GeminiBackend, GroqBackend};
use crate::config::{BackendConfig, BackendKind, Config, ConfigError};
use crate::history::HistoryMirror;
use crate::message::{IdGenerator, Message, MessageId};
use crate::orchestrator::{Exchange, Orchestrator};
use crate::playback::{PlaybackEngine, RevealFrame};
use crate::provider::{Adapter, TextGenerator};
use crate::timeline::TimelineStore;

/// Everything the rendering surface needs for one paint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderView {
    /// Timeline entries in display order.
    pub messages: Vec<Message>,
    /// Bot messages still waiting on their backends.
    pub loading_ids: Vec<MessageId>,
    /// Reveal progress of messages being (or done being) animated.
    pub frames: Vec<RevealFrame>,
    /// Dark theme selected.
    pub dark_mode: bool,
}

/// One active chat session.
#[derive(Debug, Clone)]
pub struct ChatSession {
    orchestrator: Orchestrator,
    playback: PlaybackEngine,
    dark_mode: Arc<AtomicBool>,
    // Serializes starting playback against clearing the conversation.
    lifecycle: Arc<Mutex<()>>,
}

impl ChatSession {
    /// Assemble a session from its parts.
    pub fn new(
        adapter_a: Adapter,
        adapter_b: Adapter,
        history: HistoryMirror,
        greeting: impl Into<String>,
        reveal_tick: Duration,
    ) -> Self {
        let timeline = Arc::new(TimelineStore::with_greeting(
            Arc::new(IdGenerator::new()),
            greeting,
        ));
        let orchestrator =
            Orchestrator::new(adapter_a, adapter_b, timeline, Arc::new(Mutex::new(history)));
        Self {
            orchestrator,
            playback: PlaybackEngine::new(reveal_tick),
            dark_mode: Arc::new(AtomicBool::new(true)),
            lifecycle: Arc::new(Mutex::new(())),
        }
    }

    /// Build a session from configuration, reading API keys from the environment.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::from_config_with(config, |name| std::env::var(name).ok())
    }

    /// Build a session from configuration with a custom credential lookup.
    pub fn from_config_with(
        config: &Config,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let adapter_a = build_adapter(&config.backend_a, &lookup)?;
        let adapter_b = build_adapter(&config.backend_b, &lookup)?;
        let history = HistoryMirror::open(&config.history_path);

        info!(
            backend_a = %config.backend_a.model,
            backend_b = %config.backend_b.model,
            history = %config.history_path.display(),
            "Session ready"
        );

        Ok(Self::new(
            adapter_a,
            adapter_b,
            history,
            config.greeting.clone(),
            config.reveal_tick(),
        ))
    }

    /// Submit a prompt and start revealing the replies.
    ///
    /// Returns `None` for blank prompts.
    pub async fn submit(&self, prompt: &str) -> Option<Exchange> {
        let exchange = self.orchestrator.submit(prompt).await?;
        {
            let _guard = self.lifecycle();
            if self.timeline().contains(exchange.bot.id) {
                self.playback.start(&exchange.bot);
            }
        }
        Some(exchange)
    }

    /// Discard the conversation and show a fresh greeting.
    ///
    /// Every reveal task is cancelled. The history mirror is untouched.
    pub fn new_chat(&self) {
        {
            let _guard = self.lifecycle();
            self.timeline().reset();
            self.playback.cancel_all();
        }
        info!("Started new chat");
    }

    /// Flip the theme. Returns the new dark-mode state.
    pub fn toggle_theme(&self) -> bool {
        !self.dark_mode.fetch_xor(true, Ordering::AcqRel)
    }

    /// Whether the dark theme is selected.
    pub fn is_dark_mode(&self) -> bool {
        self.dark_mode.load(Ordering::Acquire)
    }

    /// Snapshot for rendering.
    pub fn view(&self) -> RenderView {
        let messages = self.timeline().snapshot();
        let loading_ids = messages.iter().filter(|m| m.loading).map(|m| m.id).collect();
        let frames = messages
            .iter()
            .filter_map(|m| self.playback.frame(m.id))
            .collect();
        RenderView {
            messages,
            loading_ids,
            frames,
            dark_mode: self.is_dark_mode(),
        }
    }

    /// Subscribe to timeline changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.timeline().subscribe()
    }

    /// The live timeline.
    pub fn timeline(&self) -> &Arc<TimelineStore> {
        self.orchestrator.timeline()
    }

    /// The playback engine.
    pub fn playback(&self) -> &PlaybackEngine {
        &self.playback
    }

    /// The history mirror.
    pub fn history(&self) -> &Arc<Mutex<HistoryMirror>> {
        self.orchestrator.history()
    }

    fn lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn build_adapter(
    config: &BackendConfig,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Adapter, ConfigError> {
    let api_key = config.api_key_from(lookup)?;
    let generator: Arc<dyn TextGenerator> = match config.kind {
        BackendKind::Gemini => {
            let backend = GeminiBackend::new(api_key, config.model.clone());
            Arc::new(match &config.base_url {
                Some(url) => backend.with_base_url(url.clone()),
                None => backend,
            })
        }
        BackendKind::Groq => {
            let backend = GroqBackend::new(api_key, config.model.clone());
            Arc::new(match &config.base_url {
                Some(url) => backend.with_base_url(url.clone()),
                None => backend,
            })
        }
    };
    Ok(Adapter::new(config.label.clone(), generator))
}
