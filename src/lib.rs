//! comfy-setup - installation lifecycle and environment validation for a
//! managed ComfyUI Python runtime.
//!
//! The crate decides whether the Python environment an application depends
//! on is present and correct, reports each check as it completes, and drives
//! a repair loop when it is not.
//!
//! # Modules
//!
//! - [`record`] - The persisted installation record
//! - [`environment`] - The managed virtual environment and import verification
//! - [`validation`] - The validation pipeline and its snapshots
//! - [`orchestrator`] - Install, upgrade and resolution state machine
//! - [`channel`] - Events and requests exchanged with a UI
//! - [`context`] - Directories, platform and toolchain settings
//! - [`model_paths`] - The model-path configuration document
//! - [`shell`] - Subprocess execution
//! - [`document`] - Tagged file reads and atomic writes
//! - [`host`] - Terminal front end used by the binary
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```
//! use comfy_setup::record::InstallationRecord;
//! use comfy_setup::validation::{CheckField, CheckStatus, ValidationResult};
//!
//! let record = InstallationRecord::new();
//! let mut result = ValidationResult::started(record.state());
//! result.set(CheckField::BasePath, CheckStatus::Ok);
//!
//! // Nothing is valid until installation has finished.
//! assert!(!result.is_valid());
//! ```
//!
//! For a full install driven through the channel, see the integration tests.

pub mod channel;
pub mod context;
pub mod document;
pub mod environment;
pub mod error;
pub mod host;
pub mod model_paths;
pub mod orchestrator;
pub mod record;
pub mod shell;
pub mod validation;

pub use error::{InstallError, Result};
