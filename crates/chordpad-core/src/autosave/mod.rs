//! Autosave scheduler.
//!
//! One driver task per editor owns every piece of save state: the working
//! content, the committed and checkpointed baselines, the debounce and idle
//! deadlines, and the single in-flight save. Callers talk to it through a
//! cloneable [`AutosaveHandle`] and observe it through [`AutosaveSnapshot`]s
//! published on a watch channel.

mod driver;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

use crate::clock::Clock;
use crate::config::DraftConfig;
use crate::error::{Error, Result};
use crate::models::{ConflictData, SaveResult};
use crate::state::SaveStatus;
use crate::BoxFuture;

use driver::{Driver, Event};

/// What caused a save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveTrigger {
    /// Debounce window elapsed after the last change
    Debounce,
    /// Idle timeout elapsed while changes kept arriving
    Idle,
    /// Editor became hidden
    Hidden,
    /// Editor is about to be torn down
    Unload,
    /// Explicit user save
    Manual,
}

impl SaveTrigger {
    /// Automatic triggers write local checkpoints only.
    pub const fn is_auto(self) -> bool {
        !matches!(self, Self::Manual)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debounce => "debounce",
            Self::Idle => "idle",
            Self::Hidden => "hidden",
            Self::Unload => "unload",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SaveTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performs the actual save for the scheduler.
pub trait SaveHandler: Send + Sync {
    fn save(&self, content: String, trigger: SaveTrigger) -> BoxFuture<'_, SaveResult>;
}

/// Answer to a pre-navigation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnloadDecision {
    /// Nothing unsaved; leave freely
    Proceed,
    /// A save was started but may not finish; ask the user first
    ConfirmLeave,
}

/// Observable scheduler state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutosaveSnapshot {
    pub status: SaveStatus,
    /// Content differs from what was last committed to the record
    pub dirty: bool,
    /// Timestamp (Unix ms) of the last successful save
    pub last_saved_at: Option<i64>,
    pub last_error: Option<String>,
    /// Pending conflict that must be resolved before the next manual save
    pub conflict: Option<ConflictData>,
}

/// Cloneable handle to an editor's autosave driver.
#[derive(Clone)]
pub struct AutosaveHandle {
    events: mpsc::UnboundedSender<Event>,
    snapshots: watch::Receiver<AutosaveSnapshot>,
}

impl AutosaveHandle {
    /// Start a driver on the current tokio runtime.
    ///
    /// `committed` is the content currently held by the authoritative
    /// record; the editor starts clean against it.
    pub fn spawn(
        handler: Arc<dyn SaveHandler>,
        clock: Arc<dyn Clock>,
        config: &DraftConfig,
        committed: impl Into<String>,
    ) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(AutosaveSnapshot::default());

        let driver = Driver::new(handler, clock, config, committed.into(), snapshot_tx);
        tokio::spawn(driver.run(receiver));

        Self { events, snapshots }
    }

    fn send(&self, event: Event) -> Result<()> {
        self.events.send(event).map_err(|_| Error::SchedulerClosed)
    }

    /// Record new editor content and (re)arm the timers.
    pub fn content_changed(&self, content: impl Into<String>) -> Result<()> {
        self.send(Event::ContentChanged(content.into()))
    }

    /// Save now, bypassing the debounce.
    ///
    /// Fails with `Error::SaveInProgress` while another save is in flight
    /// and with `Error::UnresolvedConflict` until a pending conflict is
    /// cleared.
    pub async fn force_save(&self) -> Result<SaveResult> {
        let (reply, response) = oneshot::channel();
        self.send(Event::ForceSave(reply))?;
        response.await.map_err(|_| Error::SchedulerClosed)?
    }

    /// The editor was hidden; checkpoint immediately if dirty.
    pub fn visibility_hidden(&self) -> Result<()> {
        self.send(Event::VisibilityHidden)
    }

    /// The editor is about to go away.
    ///
    /// Completion of the save this may start is best-effort only.
    pub async fn before_unload(&self) -> Result<UnloadDecision> {
        let (reply, response) = oneshot::channel();
        self.send(Event::BeforeUnload(reply))?;
        response.await.map_err(|_| Error::SchedulerClosed)
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.send(Event::SetEnabled(enabled))
    }

    /// Replace the committed baseline (and the working content) with `content`.
    pub fn mark_committed(&self, content: impl Into<String>) -> Result<()> {
        self.send(Event::MarkCommitted(content.into()))
    }

    pub fn clear_conflict(&self) -> Result<()> {
        self.send(Event::ClearConflict)
    }

    /// Wait until no save is in flight.
    ///
    /// Events sent before this are applied first, so a baseline set with
    /// [`Self::mark_committed`] keeps new auto saves from starting.
    pub async fn settle(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Event::Settle(reply))?;
        response.await.map_err(|_| Error::SchedulerClosed)
    }

    /// Stop the driver. A save already in flight still runs to completion.
    pub fn shutdown(&self) {
        if self.send(Event::Shutdown).is_err() {
            tracing::debug!("Autosave driver already stopped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    /// Latest published state.
    pub fn snapshot(&self) -> AutosaveSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn status(&self) -> SaveStatus {
        self.snapshots.borrow().status
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<AutosaveSnapshot> {
        self.snapshots.clone()
    }
}
