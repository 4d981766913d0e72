//! Environment validation.
//!
//! [`Validator`] runs a fixed pipeline of checks and reports each step's
//! outcome in a [`ValidationResult`] snapshot as soon as it is known:
//!
//! 1. Legacy install detection
//! 2. Base path accessibility
//! 3. Virtual environment directory
//! 4. Python interpreter
//! 5. Package manager
//! 6. Python package imports
//! 7. Git on `PATH`
//! 8. Visual C++ runtime (Windows only)
//!
//! Steps 3 to 6 are skipped when the base path is unusable, and step 6 also
//! requires steps 3 to 5 to pass.

pub mod engine;
pub mod probe;
pub mod result;

pub use engine::{Validator, VC_RUNTIME_DLL};
pub use probe::{HostProbe, LocalHost};
pub use result::{CheckField, CheckStatus, Issue, ValidationResult};
