//! The contract between the orchestrator and whatever UI drives it.
//!
//! The orchestrator owns an [`OrchestratorPort`]; the UI owns the matching
//! [`UiPort`]. Events flow out as [`UiEvent`]s, user intent flows back as
//! [`UiRequest`]s. Requests that need an answer carry a one-shot
//! [`Responder`]; the UI keeps the matching [`Pending`] and waits on it.
//!
//! The transport is in-process `std::sync::mpsc`, so either side may live on
//! any thread.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::Duration;

use crate::environment::MirrorSettings;
use crate::error::{InstallError, Result};
use crate::record::Device;
use crate::shell::OutputLine;
use crate::validation::{CheckField, ValidationResult};

/// Sending half of a one-shot reply.
#[derive(Debug)]
pub struct Responder<T> {
    tx: Sender<T>,
}

impl<T> Responder<T> {
    /// Deliver the reply. A receiver that has gone away is ignored.
    pub fn respond(self, value: T) {
        let _ = self.tx.send(value);
    }
}

/// Receiving half of a one-shot reply.
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<T>,
}

impl<T> Pending<T> {
    /// Block until the reply arrives.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().map_err(|_| InstallError::ChannelClosed)
    }

    /// The reply, if it has arrived.
    pub fn try_wait(&self) -> Result<Option<T>> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(InstallError::ChannelClosed),
        }
    }
}

/// Create a linked responder and pending reply.
pub fn request<T>() -> (Responder<T>, Pending<T>) {
    let (tx, rx) = mpsc::channel();
    (Responder { tx }, Pending { rx })
}

/// Answers to the install wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOptions {
    pub base_path: PathBuf,
    pub device: Option<Device>,

    /// Existing ComfyUI install to copy assets from.
    #[serde(default)]
    pub migration_source_path: Option<PathBuf>,

    /// Which assets to migrate: `user_files`, `models`, `custom_nodes`.
    #[serde(default)]
    pub migration_item_ids: Vec<String>,

    #[serde(default = "default_true")]
    pub auto_update: bool,

    #[serde(default = "default_true")]
    pub allow_metrics: bool,

    #[serde(default)]
    pub mirror_settings: MirrorSettings,
}

fn default_true() -> bool {
    true
}

impl InstallOptions {
    pub fn new(base_path: impl Into<PathBuf>, device: Option<Device>) -> Self {
        Self {
            base_path: base_path.into(),
            device,
            migration_source_path: None,
            migration_item_ids: Vec::new(),
            auto_update: true,
            allow_metrics: true,
            mirror_settings: MirrorSettings::default(),
        }
    }
}

/// Suggestions sent with [`UiEvent::AwaitingInstallOptions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallDefaults {
    pub suggested_device: Option<Device>,
    pub default_base_path: PathBuf,
}

/// Repairs the UI can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepairAction {
    /// Reinstall the requirements manifest into the existing environment.
    ReinstallRequirements,
    /// Run `uv cache clean`.
    ClearCache,
    /// Delete and recreate the environment.
    ResetEnvironment,
}

impl RepairAction {
    pub fn id(&self) -> &'static str {
        match self {
            Self::ReinstallRequirements => "reinstallRequirements",
            Self::ClearCache => "clearCache",
            Self::ResetEnvironment => "resetEnvironment",
        }
    }
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How a task is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// The user picks a new base path.
    SelectBasePath,
    /// The orchestrator can fix it.
    Repair(RepairAction),
    /// The user fixes it outside the application, then revalidates.
    Manual,
}

/// An outstanding issue offered to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairTask {
    pub id: String,
    pub field: CheckField,
    pub title: String,
    pub description: String,
    pub kind: TaskKind,
}

/// Orchestrator → UI.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// A validation snapshot.
    Validation(ValidationResult),
    /// One line of subprocess output.
    Log(OutputLine),
    /// The wizard is waiting for [`UiRequest::StartInstall`].
    AwaitingInstallOptions(InstallDefaults),
    /// Outstanding issues; replaces any previous list.
    RepairTasks(Vec<RepairTask>),
    UnsupportedHardware { message: String },
    ConfigCorrupt { path: PathBuf, message: String },
    InstallComplete { base_path: PathBuf },
    InstallFailed { message: String },
}

/// UI → orchestrator.
#[derive(Debug)]
pub enum UiRequest {
    StartInstall(InstallOptions),
    Repair {
        action: RepairAction,
        reply: Responder<bool>,
    },
    SelectBasePath {
        path: PathBuf,
        reply: Responder<bool>,
    },
    Revalidate,
    /// Finish the resolution loop; answered `true` only if nothing is left.
    CompleteValidation { reply: Responder<bool> },
    Abort,
}

/// The orchestrator's end of the channel.
#[derive(Debug)]
pub struct OrchestratorPort {
    events: Sender<UiEvent>,
    requests: Receiver<UiRequest>,
}

impl OrchestratorPort {
    /// Send an event. Events sent after the UI hung up are dropped.
    pub fn emit(&self, event: UiEvent) {
        let _ = self.events.send(event);
    }

    /// Block for the next request.
    pub fn next_request(&self) -> Result<UiRequest> {
        self.requests.recv().map_err(|_| InstallError::ChannelClosed)
    }
}

/// The UI's end of the channel.
#[derive(Debug)]
pub struct UiPort {
    events: Receiver<UiEvent>,
    requests: Sender<UiRequest>,
}

impl UiPort {
    /// Block for the next event; `None` once the orchestrator is gone.
    pub fn recv_event(&self) -> Option<UiEvent> {
        self.events.recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<UiEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    pub fn send(&self, request: UiRequest) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| InstallError::ChannelClosed)
    }

    pub fn start_install(&self, options: InstallOptions) -> Result<()> {
        self.send(UiRequest::StartInstall(options))
    }

    pub fn repair(&self, action: RepairAction) -> Result<Pending<bool>> {
        let (reply, pending) = request();
        self.send(UiRequest::Repair { action, reply })?;
        Ok(pending)
    }

    pub fn select_base_path(&self, path: impl Into<PathBuf>) -> Result<Pending<bool>> {
        let (reply, pending) = request();
        self.send(UiRequest::SelectBasePath {
            path: path.into(),
            reply,
        })?;
        Ok(pending)
    }

    pub fn revalidate(&self) -> Result<()> {
        self.send(UiRequest::Revalidate)
    }

    pub fn complete_validation(&self) -> Result<Pending<bool>> {
        let (reply, pending) = request();
        self.send(UiRequest::CompleteValidation { reply })?;
        Ok(pending)
    }

    pub fn abort(&self) -> Result<()> {
        self.send(UiRequest::Abort)
    }
}

/// Create both ends of a channel.
pub fn connect() -> (OrchestratorPort, UiPort) {
    let (event_tx, event_rx) = mpsc::channel();
    let (request_tx, request_rx) = mpsc::channel();
    (
        OrchestratorPort {
            events: event_tx,
            requests: request_rx,
        },
        UiPort {
            events: event_rx,
            requests: request_tx,
        },
    )
}
