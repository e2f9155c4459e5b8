//! Typewriter playback.
//!
//! Replies arrive complete; playback reveals them one character per tick so
//! the rendering surface can animate them. Each of the two replies of a bot
//! message has its own reveal task. The tasks share a cadence but are not
//! coupled, and a message counts as complete only once both have finished.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::message::{Message, MessageId};

/// Default delay between two revealed characters.
pub const DEFAULT_TICK: Duration = Duration::from_millis(20);

/// Progressive view over one string, counted in `char`s.
#[derive(Debug, Clone)]
pub struct RevealCursor {
    text: String,
    total: usize,
    shown: usize,
}

impl RevealCursor {
    /// Start with nothing exposed.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let total = text.chars().count();
        Self {
            text,
            total,
            shown: 0,
        }
    }

    /// Expose one more character. Returns false once nothing is left.
    pub fn tick(&mut self) -> bool {
        if self.is_done() {
            return false;
        }
        self.shown += 1;
        true
    }

    /// Whether the whole string is exposed.
    pub fn is_done(&self) -> bool {
        self.shown >= self.total
    }

    /// Characters exposed so far.
    pub fn shown(&self) -> usize {
        self.shown
    }

    /// Total characters.
    pub fn total(&self) -> usize {
        self.total
    }

    /// The exposed prefix.
    pub fn visible(&self) -> &str {
        match self.text.char_indices().nth(self.shown) {
            Some((end, _)) => &self.text[..end],
            None => &self.text,
        }
    }
}

/// One of the two replies of a bot message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    A,
    B,
}

/// Reveal progress of one bot message.
#[derive(Debug, Clone)]
pub struct Playback {
    id: MessageId,
    a: RevealCursor,
    b: RevealCursor,
    complete: bool,
}

impl Playback {
    /// Playback for a finalized dual bot message.
    ///
    /// Returns `None` for user messages, single banners and messages still
    /// loading.
    pub fn for_message(message: &Message) -> Option<Self> {
        if message.loading {
            return None;
        }
        let response = message.response().filter(|r| !r.show_single)?;
        let mut playback = Self {
            id: message.id,
            a: RevealCursor::new(response.response_a.clone()),
            b: RevealCursor::new(response.response_b.clone()),
            complete: false,
        };
        playback.refresh();
        Some(playback)
    }

    /// Advance one branch by a character. Returns false once that branch is done.
    pub fn tick(&mut self, branch: Branch) -> bool {
        let advanced = self.cursor_mut(branch).tick();
        self.refresh();
        advanced && !self.cursor(branch).is_done()
    }

    /// Expose both replies in full.
    pub fn reveal_all(&mut self) {
        self.a.shown = self.a.total;
        self.b.shown = self.b.total;
        self.refresh();
    }

    /// Cursor for `branch`.
    pub fn cursor(&self, branch: Branch) -> &RevealCursor {
        match branch {
            Branch::A => &self.a,
            Branch::B => &self.b,
        }
    }

    /// Whether both replies are fully exposed.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Snapshot for observers.
    pub fn frame(&self) -> RevealFrame {
        RevealFrame {
            id: self.id,
            shown_a: self.a.visible().to_string(),
            shown_b: self.b.visible().to_string(),
            complete: self.complete,
        }
    }

    fn cursor_mut(&mut self, branch: Branch) -> &mut RevealCursor {
        match branch {
            Branch::A => &mut self.a,
            Branch::B => &mut self.b,
        }
    }

    // One-way: never goes back to false.
    fn refresh(&mut self) {
        if self.a.is_done() && self.b.is_done() {
            self.complete = true;
        }
    }
}

/// What the rendering surface shows for a message being revealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealFrame {
    pub id: MessageId,
    pub shown_a: String,
    pub shown_b: String,
    pub complete: bool,
}

struct Attached {
    playback: Playback,
    cancel: CancellationToken,
    frames: watch::Sender<RevealFrame>,
}

type Registry = Arc<Mutex<HashMap<MessageId, Attached>>>;

/// Runs reveal tasks for finalized bot messages.
#[derive(Clone)]
pub struct PlaybackEngine {
    tick: Duration,
    attached: Registry,
}

impl PlaybackEngine {
    /// Create an engine revealing one character every `tick`.
    ///
    /// A zero `tick` reveals every message in full as soon as it starts.
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            attached: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start revealing `message`.
    ///
    /// Returns a frame receiver, or `None` when the message is not eligible
    /// or is already attached (running or complete). Must be called from
    /// within a tokio runtime.
    pub fn start(&self, message: &Message) -> Option<watch::Receiver<RevealFrame>> {
        let mut playback = Playback::for_message(message)?;
        if self.tick.is_zero() {
            playback.reveal_all();
        }
        let id = playback.id;
        let cancel = CancellationToken::new();

        let rx = {
            let mut attached = lock(&self.attached);
            if attached.contains_key(&id) {
                debug!(message_id = %id, "Playback already attached");
                return None;
            }
            let (frames, rx) = watch::channel(playback.frame());
            attached.insert(
                id,
                Attached {
                    playback: playback.clone(),
                    cancel: cancel.clone(),
                    frames,
                },
            );
            rx
        };

        debug!(
            message_id = %id,
            chars_a = playback.a.total(),
            chars_b = playback.b.total(),
            "Starting playback"
        );

        for branch in [Branch::A, Branch::B] {
            if !playback.cursor(branch).is_done() {
                self.spawn_reveal(id, branch, cancel.clone());
            }
        }

        Some(rx)
    }

    /// Stop and detach the reveal tasks of one message.
    pub fn cancel(&self, id: MessageId) {
        if let Some(entry) = lock(&self.attached).remove(&id) {
            entry.cancel.cancel();
        }
    }

    /// Stop and detach every reveal task.
    pub fn cancel_all(&self) {
        let drained: Vec<Attached> = lock(&self.attached).drain().map(|(_, a)| a).collect();
        for entry in drained {
            entry.cancel.cancel();
        }
    }

    /// Latest frame of an attached message.
    pub fn frame(&self, id: MessageId) -> Option<RevealFrame> {
        lock(&self.attached).get(&id).map(|a| a.playback.frame())
    }

    /// New receiver for an attached message's frames.
    pub fn subscribe(&self, id: MessageId) -> Option<watch::Receiver<RevealFrame>> {
        lock(&self.attached).get(&id).map(|a| a.frames.subscribe())
    }

    /// Whether an attached message has been fully revealed.
    pub fn is_complete(&self, id: MessageId) -> bool {
        lock(&self.attached)
            .get(&id)
            .is_some_and(|a| a.playback.is_complete())
    }

    /// Whether a message is attached.
    pub fn is_attached(&self, id: MessageId) -> bool {
        lock(&self.attached).contains_key(&id)
    }

    fn spawn_reveal(&self, id: MessageId, branch: Branch, cancel: CancellationToken) {
        let attached = Arc::clone(&self.attached);
        let period = self.tick;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if !advance(&attached, id, branch) {
                            break;
                        }
                    }
                }
            }
        });
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("tick", &self.tick)
            .field("attached", &lock(&self.attached).len())
            .finish()
    }
}

/// Reveal one more character; false when the branch is finished or detached.
fn advance(attached: &Registry, id: MessageId, branch: Branch) -> bool {
    let mut attached = lock(attached);
    let Some(entry) = attached.get_mut(&id) else {
        return false;
    };
    let more = entry.playback.tick(branch);
    entry.frames.send_replace(entry.playback.frame());
    if entry.playback.is_complete() {
        debug!(message_id = %id, "Playback complete");
    }
    more
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<MessageId, Attached>> {
    registry
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
