//! Dual-dispatch orchestrator.
//!
//! A submission appends the user message and a pending bot placeholder in one
//! timeline update, sends the prompt to both adapters at once, and replaces
//! the placeholder when both have settled. Finalized exchanges are mirrored
//! to history.

use std::sync::{Arc, Mutex};

use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::history::HistoryMirror;
use crate::message::{DualResponse, Message};
use crate::provider::Adapter;
use crate::timeline::TimelineStore;

pub use crate::provider::ORCHESTRATION_FAILURE;

/// A finalized user/bot pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: Message,
    pub bot: Message,
}

/// Sends each prompt to both adapters and records the outcome.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    adapter_a: Adapter,
    adapter_b: Adapter,
    timeline: Arc<TimelineStore>,
    history: Arc<Mutex<HistoryMirror>>,
}

impl Orchestrator {
    /// Create an orchestrator over two adapters.
    pub fn new(
        adapter_a: Adapter,
        adapter_b: Adapter,
        timeline: Arc<TimelineStore>,
        history: Arc<Mutex<HistoryMirror>>,
    ) -> Self {
        Self {
            adapter_a,
            adapter_b,
            timeline,
            history,
        }
    }

    /// Timeline this orchestrator writes to.
    pub fn timeline(&self) -> &Arc<TimelineStore> {
        &self.timeline
    }

    /// History mirror this orchestrator appends to.
    pub fn history(&self) -> &Arc<Mutex<HistoryMirror>> {
        &self.history
    }

    /// Submit a prompt to both backends.
    ///
    /// Blank prompts are ignored and return `None`. Otherwise resolves once
    /// both backends have settled, with the finalized exchange. If the
    /// placeholder was discarded meanwhile (new chat), the timeline is left
    /// alone but the exchange is still mirrored.
    pub async fn submit(&self, prompt: &str) -> Option<Exchange> {
        if prompt.trim().is_empty() {
            debug!("Ignoring blank prompt");
            return None;
        }

        let ids = self.timeline.ids();
        let user_id = ids.next_id();
        let bot_id = ids.next_id();

        let user = Message::user(user_id, prompt);
        self.timeline
            .append(vec![user.clone(), Message::pending_bot(bot_id)]);
        info!(
            message_id = %bot_id,
            backend_a = %self.adapter_a.label(),
            backend_b = %self.adapter_b.label(),
            "Dispatching prompt"
        );

        let response = self.dispatch(prompt).await;
        let bot = Message::bot(bot_id, response);

        if self.timeline.replace(bot_id, bot.clone()) {
            debug!(message_id = %bot_id, "Placeholder finalized");
        } else {
            debug!(message_id = %bot_id, "Placeholder discarded before settlement");
        }

        self.mirror(user.clone(), bot.clone()).await;

        Some(Exchange { user, bot })
    }

    /// Run both adapters concurrently and wait for both.
    async fn dispatch(&self, prompt: &str) -> DualResponse {
        let a = tokio::spawn(branch(self.adapter_a.clone(), prompt.to_string()));
        let b = tokio::spawn(branch(self.adapter_b.clone(), prompt.to_string()));

        match tokio::join!(a, b) {
            (Ok(a), Ok(b)) => DualResponse::dual(a, b),
            (a, b) => {
                for error in [a.err(), b.err()].into_iter().flatten() {
                    log_join_error(&error);
                }
                DualResponse::dual(ORCHESTRATION_FAILURE, ORCHESTRATION_FAILURE)
            }
        }
    }

    async fn mirror(&self, user: Message, bot: Message) {
        let history = Arc::clone(&self.history);
        let result = tokio::task::spawn_blocking(move || {
            history
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .append_exchange(user, bot)
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "History write failed, continuing without persistence"),
            Err(e) => warn!(error = %e, "History task failed"),
        }
    }
}

async fn branch(adapter: Adapter, prompt: String) -> String {
    adapter.generate(&prompt).await
}

fn log_join_error(error: &JoinError) {
    if error.is_panic() {
        warn!("Backend task panicked");
    } else {
        warn!(error = %error, "Backend task did not finish");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::history::DEFAULT_HISTORY_FILE;
    use crate::message::IdGenerator;
    use crate::provider::stub::{Reply, StubGenerator};
    use crate::provider::{failure_sentinel, is_sentinel};

    fn orchestrator(temp: &TempDir, a: StubGenerator, b: StubGenerator) -> Orchestrator {
        let timeline = Arc::new(TimelineStore::new(Arc::new(IdGenerator::new())));
        let history = HistoryMirror::open(temp.path().join(DEFAULT_HISTORY_FILE));
        Orchestrator::new(
            Adapter::new("A", Arc::new(a)),
            Adapter::new("B", Arc::new(b)),
            timeline,
            Arc::new(Mutex::new(history)),
        )
    }

    fn history_len(orch: &Orchestrator) -> usize {
        orch.history().lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_both_backends_succeed() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, StubGenerator::text("4"), StubGenerator::text("four"));

        let exchange = orch.submit("What is 2+2?").await.unwrap();
        let response = exchange.bot.response().unwrap();
        assert_eq!(response.response_a, "4");
        assert_eq!(response.response_b, "four");
        assert!(!response.show_single);
        assert!(!exchange.bot.loading);
        assert!(!is_sentinel(&response.response_a));
        assert!(!is_sentinel(&response.response_b));

        let messages = orch.timeline().snapshot();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1], exchange.user);
        assert_eq!(messages[2], exchange.bot);
        assert!(exchange.bot.id > exchange.user.id);
    }

    #[tokio::test]
    async fn test_unwritable_history_does_not_block_conversation() {
        let temp = TempDir::new().unwrap();
        let slot = temp.path().join("slot");
        std::fs::create_dir_all(slot.join("occupied")).unwrap();
        let orch = Orchestrator::new(
            Adapter::new("A", Arc::new(StubGenerator::text("4"))),
            Adapter::new("B", Arc::new(StubGenerator::text("four"))),
            Arc::new(TimelineStore::new(Arc::new(IdGenerator::new()))),
            Arc::new(Mutex::new(HistoryMirror::open(&slot))),
        );

        let first = orch.submit("What is 2+2?").await.unwrap();
        let second = orch.submit("And 3+3?").await.unwrap();

        let messages = orch.timeline().snapshot();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[2], first.bot);
        assert_eq!(messages[4], second.bot);
        assert!(orch.timeline().loading_ids().is_empty());
        assert_eq!(second.bot.response().unwrap().response_b, "four");

        let history = orch.history().lock().unwrap();
        assert!(history.is_degraded());
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_one_backend_failure_is_isolated() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, StubGenerator::text("4"), StubGenerator::failing());

        let exchange = orch.submit("What is 2+2?").await.unwrap();
        let response = exchange.bot.response().unwrap();
        assert_eq!(response.response_a, "4");
        assert_eq!(response.response_b, failure_sentinel("B"));
        assert!(!exchange.bot.loading);
    }

    #[tokio::test]
    async fn test_blank_prompt_changes_nothing() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, StubGenerator::text("x"), StubGenerator::text("y"));
        let before = orch.timeline().snapshot();

        assert!(orch.submit("").await.is_none());
        assert!(orch.submit("   \n\t").await.is_none());

        assert_eq!(orch.timeline().snapshot(), before);
        assert_eq!(orch.timeline().revision(), 0);
        assert_eq!(history_len(&orch), 0);
    }

    #[tokio::test]
    async fn test_panicking_branch_is_orchestration_failure() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(
            &temp,
            StubGenerator::text("fine"),
            StubGenerator::with(Reply::Panic),
        );

        let exchange = orch.submit("hello").await.unwrap();
        let response = exchange.bot.response().unwrap();
        assert_eq!(response.response_a, ORCHESTRATION_FAILURE);
        assert_eq!(response.response_b, ORCHESTRATION_FAILURE);
        assert!(!exchange.bot.loading);
        assert_eq!(history_len(&orch), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backends_run_concurrently() {
        let temp = TempDir::new().unwrap();
        let delay = Duration::from_millis(500);
        let orch = orchestrator(
            &temp,
            StubGenerator::text("a").delayed(delay),
            StubGenerator::text("b").delayed(delay),
        );

        let start = tokio::time::Instant::now();
        orch.submit("go").await.unwrap();
        assert!(start.elapsed() < delay * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholder_appears_with_user_message() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(
            &temp,
            StubGenerator::text("a").delayed(Duration::from_secs(1)),
            StubGenerator::text("b").delayed(Duration::from_secs(1)),
        );

        let task = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.submit("q").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(orch.timeline().revision(), 1);
        let messages = orch.timeline().snapshot();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].prompt(), Some("q"));
        assert!(messages[2].loading);
        assert_eq!(orch.timeline().loading_ids(), vec![messages[2].id]);

        task.await.unwrap().unwrap();
        assert!(orch.timeline().loading_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_pending_does_not_resurrect() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(
            &temp,
            StubGenerator::text("a").delayed(Duration::from_secs(1)),
            StubGenerator::text("b"),
        );

        let task = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.submit("q").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        orch.timeline().reset();

        let exchange = task.await.unwrap().unwrap();
        assert!(!orch.timeline().contains(exchange.bot.id));
        assert_eq!(orch.timeline().len(), 1);
        assert_eq!(history_len(&orch), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submissions_keep_separate_placeholders() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(
            &temp,
            StubGenerator::text("a").delayed(Duration::from_millis(100)),
            StubGenerator::text("b"),
        );

        let (first, second) = tokio::join!(orch.submit("one"), orch.submit("two"));
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first.bot.id, second.bot.id);

        let messages = orch.timeline().snapshot();
        assert_eq!(messages.len(), 5);
        assert!(messages.iter().all(|m| !m.loading));
        assert_eq!(history_len(&orch), 4);
    }

    #[tokio::test]
    async fn test_history_grows_two_per_submission() {
        let temp = TempDir::new().unwrap();
        let orch = orchestrator(&temp, StubGenerator::text("a"), StubGenerator::failing());

        for prompt in ["first", "second", "third"] {
            orch.submit(prompt).await.unwrap();
        }

        let history = orch.history().lock().unwrap();
        assert_eq!(history.len(), 6);
        assert!(history.entries().iter().all(|m| !m.loading));
        let prompts: Vec<_> = history.entries().iter().filter_map(Message::prompt).collect();
        assert_eq!(prompts, vec!["first", "second", "third"]);
    }
}
