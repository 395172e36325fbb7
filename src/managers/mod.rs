pub mod backup;
pub mod history;
pub mod logging;
pub mod notification;
pub mod outcome;
pub mod transfer;

pub use backup::{BackupManager, RunMode};
pub use outcome::{ErrorKind, Outcome, ResultType, RunPhase, RunReport};
pub use transfer::{TransferEngine, TransferJob};
