//! Event loop owning one editor's save state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use super::{AutosaveSnapshot, SaveHandler, SaveTrigger, UnloadDecision};
use crate::clock::Clock;
use crate::config::DraftConfig;
use crate::error::{Error, Result};
use crate::models::{ConflictData, SaveFailure, SaveFailureKind, SaveResult};
use crate::state::SaveStatus;
use crate::util::compact_text;

type SaveReply = oneshot::Sender<Result<SaveResult>>;

pub(super) enum Event {
    ContentChanged(String),
    ForceSave(SaveReply),
    VisibilityHidden,
    BeforeUnload(oneshot::Sender<UnloadDecision>),
    SetEnabled(bool),
    MarkCommitted(String),
    ClearConflict,
    Settle(oneshot::Sender<()>),
    Shutdown,
}

/// Outcome of the most recent finished save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    None,
    Saved,
    Failed,
}

struct InFlight {
    task: JoinHandle<SaveResult>,
    trigger: SaveTrigger,
    content: String,
    reply: Option<SaveReply>,
}

pub(super) struct Driver {
    handler: Arc<dyn SaveHandler>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    idle_timeout: Duration,
    /// Working buffer
    content: String,
    /// Last content accepted by the authoritative store
    committed: String,
    /// Last content written anywhere (draft checkpoint or commit)
    checkpointed: String,
    enabled: bool,
    outcome: Outcome,
    in_flight: Option<InFlight>,
    debounce_at: Option<Instant>,
    idle_at: Option<Instant>,
    last_saved_at: Option<i64>,
    last_error: Option<String>,
    conflict: Option<ConflictData>,
    /// Released once the in-flight save finishes
    settle_waiters: Vec<oneshot::Sender<()>>,
    snapshots: watch::Sender<AutosaveSnapshot>,
}

impl Driver {
    pub(super) fn new(
        handler: Arc<dyn SaveHandler>,
        clock: Arc<dyn Clock>,
        config: &DraftConfig,
        committed: String,
        snapshots: watch::Sender<AutosaveSnapshot>,
    ) -> Self {
        Self {
            handler,
            clock,
            debounce: config.debounce(),
            idle_timeout: config.idle_timeout(),
            content: committed.clone(),
            checkpointed: committed.clone(),
            committed,
            enabled: true,
            outcome: Outcome::None,
            in_flight: None,
            debounce_at: None,
            idle_at: None,
            last_saved_at: None,
            last_error: None,
            conflict: None,
            settle_waiters: Vec::new(),
            snapshots,
        }
    }

    pub(super) async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        self.publish();

        loop {
            let debounce_at = self.debounce_at;
            let idle_at = self.idle_at;

            tokio::select! {
                event = events.recv() => match event {
                    Some(Event::Shutdown) | None => break,
                    Some(event) => self.handle(event),
                },
                () = sleep_until(debounce_at) => {
                    self.clear_timers();
                    self.start_save(SaveTrigger::Debounce, None);
                }
                () = sleep_until(idle_at) => {
                    self.clear_timers();
                    self.start_save(SaveTrigger::Idle, None);
                }
                joined = wait_for(&mut self.in_flight) => self.finish_save(joined),
            }

            self.publish();
        }

        if let Some(in_flight) = self.in_flight.take() {
            tracing::debug!("Autosave stopping with a {} save still running", in_flight.trigger);
        }
        tracing::debug!("Autosave driver stopped");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::ContentChanged(content) => {
                self.content = content;
                if self.outcome == Outcome::Saved {
                    self.outcome = Outcome::None;
                }
                if self.enabled {
                    self.arm_timers();
                }
            }
            Event::ForceSave(reply) => {
                self.clear_timers();
                self.start_save(SaveTrigger::Manual, Some(reply));
            }
            Event::VisibilityHidden => {
                if self.enabled && self.has_unsaved_content() {
                    self.clear_timers();
                    self.start_save(SaveTrigger::Hidden, None);
                }
            }
            Event::BeforeUnload(reply) => {
                let decision = if self.has_unsaved_content() || self.in_flight.is_some() {
                    self.clear_timers();
                    if self.in_flight.is_none() {
                        self.start_save(SaveTrigger::Unload, None);
                    }
                    UnloadDecision::ConfirmLeave
                } else {
                    UnloadDecision::Proceed
                };
                let _ = reply.send(decision);
            }
            Event::SetEnabled(enabled) => {
                self.enabled = enabled;
                if enabled {
                    if self.has_unsaved_content() {
                        self.arm_timers();
                    }
                } else {
                    self.clear_timers();
                }
            }
            Event::MarkCommitted(content) => {
                self.clear_timers();
                self.content.clone_from(&content);
                self.checkpointed.clone_from(&content);
                self.committed = content;
                self.outcome = Outcome::None;
                self.last_error = None;
            }
            Event::ClearConflict => {
                if self.conflict.take().is_some() {
                    tracing::debug!("Conflict cleared");
                }
            }
            Event::Settle(reply) => {
                if self.in_flight.is_some() {
                    self.settle_waiters.push(reply);
                } else {
                    let _ = reply.send(());
                }
            }
            Event::Shutdown => {}
        }
    }

    fn start_save(&mut self, trigger: SaveTrigger, reply: Option<SaveReply>) {
        if self.in_flight.is_some() {
            match reply {
                Some(reply) => {
                    let _ = reply.send(Err(Error::SaveInProgress));
                }
                None => tracing::debug!("Dropping {trigger} save: another save is in flight"),
            }
            return;
        }

        if trigger.is_auto() {
            if !self.enabled {
                return;
            }
            if !self.has_unsaved_content() {
                tracing::debug!("Skipping {trigger} save: nothing new to checkpoint");
                return;
            }
        } else {
            let Some(reply) = reply else { return };
            if self.conflict.is_some() {
                let _ = reply.send(Err(Error::UnresolvedConflict));
                return;
            }
            if self.content == self.committed {
                let _ = reply.send(Ok(SaveResult::unchanged(self.clock.now_millis())));
                return;
            }
            self.spawn_save(trigger, Some(reply));
            return;
        }

        self.spawn_save(trigger, None);
    }

    fn spawn_save(&mut self, trigger: SaveTrigger, reply: Option<SaveReply>) {
        let handler = Arc::clone(&self.handler);
        let content = self.content.clone();
        let task_content = content.clone();

        tracing::debug!("Starting {trigger} save ({} bytes)", content.len());
        let task = tokio::spawn(async move { handler.save(task_content, trigger).await });

        self.in_flight = Some(InFlight {
            task,
            trigger,
            content,
            reply,
        });
    }

    fn finish_save(&mut self, joined: std::result::Result<SaveResult, JoinError>) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };

        let result = joined.unwrap_or_else(|error| {
            SaveResult::failed(
                SaveFailure::new(SaveFailureKind::Store, format!("save task failed: {error}")),
                self.clock.now_millis(),
            )
        });

        if result.success {
            if result.record.is_some() {
                self.committed.clone_from(&in_flight.content);
            }
            self.checkpointed = in_flight.content;
            self.outcome = Outcome::Saved;
            self.last_saved_at = Some(result.timestamp);
            self.last_error = None;
            tracing::debug!("{} save finished", in_flight.trigger);
        } else if result.conflict_detected {
            self.conflict.clone_from(&result.conflict_data);
            self.outcome = Outcome::Failed;
            self.last_error = Some("Conflict: the record changed since it was loaded".to_string());
            tracing::info!("{} save hit a version conflict", in_flight.trigger);
        } else {
            self.outcome = Outcome::Failed;
            self.last_error = Some(
                result
                    .error_message()
                    .unwrap_or("save failed")
                    .to_string(),
            );
            tracing::warn!(
                "{} save failed: {}",
                in_flight.trigger,
                compact_text(self.last_error.as_deref().unwrap_or_default())
            );
        }

        // Triggers dropped while the save ran leave content behind.
        if result.success
            && self.enabled
            && self.debounce_at.is_none()
            && self.has_unsaved_content()
        {
            self.arm_timers();
        }

        if let Some(reply) = in_flight.reply {
            let _ = reply.send(Ok(result));
        }
        for waiter in self.settle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// Debounce restarts on every change; idle only starts once per burst.
    fn arm_timers(&mut self) {
        let now = Instant::now();
        self.debounce_at = Some(now + self.debounce);
        if self.idle_at.is_none() {
            self.idle_at = Some(now + self.idle_timeout);
        }
    }

    fn clear_timers(&mut self) {
        self.debounce_at = None;
        self.idle_at = None;
    }

    /// Non-empty content that has been neither checkpointed nor committed.
    fn has_unsaved_content(&self) -> bool {
        !self.content.is_empty()
            && self.content != self.checkpointed
            && self.content != self.committed
    }

    fn status(&self) -> SaveStatus {
        if !self.enabled {
            SaveStatus::Disabled
        } else if self.in_flight.is_some() {
            SaveStatus::Saving
        } else if self.conflict.is_some() {
            SaveStatus::Conflict
        } else {
            match self.outcome {
                Outcome::None => SaveStatus::Idle,
                Outcome::Saved => SaveStatus::Saved,
                Outcome::Failed => SaveStatus::Error,
            }
        }
    }

    fn publish(&self) {
        let snapshot = AutosaveSnapshot {
            status: self.status(),
            dirty: self.content != self.committed,
            last_saved_at: self.last_saved_at,
            last_error: self.last_error.clone(),
            conflict: self.conflict.clone(),
        };
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_for(in_flight: &mut Option<InFlight>) -> std::result::Result<SaveResult, JoinError> {
    match in_flight {
        Some(in_flight) => (&mut in_flight.task).await,
        None => std::future::pending().await,
    }
}
