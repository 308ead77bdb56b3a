//! The offline asset cache manager and its lifecycle.
//!
//! - `OfflineCacheWorker`: one version of the cache; install, activate,
//!   fetch, message and sync handlers
//! - `Registration`: sequences versions (active / waiting)
//! - `WorkerState`: `installing → installed → activating → activated`, or
//!   `redundant`

pub mod lifecycle;
pub mod manager;
pub mod message;
pub mod registration;

pub use lifecycle::WorkerState;
pub use manager::{ActivateReport, FetchOutcome, InstallReport, OfflineCacheWorker, SyncOutcome};
pub use message::{ClientMessage, MessageEvent, MessageOutcome};
pub use registration::{RegisterOutcome, Registration, RegistrationRecord};
