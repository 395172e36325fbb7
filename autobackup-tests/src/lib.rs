//! Test utilities for autobackup
//!
//! This crate provides shared test utilities, mock implementations,
//! and helper functions for testing the autobackup application.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{BackupManager, ConfigBuilder, MockBackend, MockProducer, RunMode};
//!
//! #[test]
//! fn my_test() {
//!     let config = ConfigBuilder::minimal()
//!         .add_record("nightly", "prod", "local")
//!         .build();
//!     let records = autobackup::resolve_all_records(&config).unwrap();
//!     let manager = BackupManager::new(config, records)
//!         .with_backend_factory(Box::new(MockBackend::new()))
//!         .with_producer(Box::new(MockProducer::new()));
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use autobackup::config::{
    BackupScope, Config, Credentials, Destination, DestinationKind, GlobalConfig,
    NotificationConfig, PolicyConfig, RecordConfig,
};
pub use autobackup::managers::{
    BackupManager, ErrorKind, Outcome, ResultType, RunMode, RunPhase, TransferEngine,
    TransferJob,
};

// Re-export mock implementations from the main crate
pub use autobackup::backends::mock::{BackendCall, MockBackend};
pub use autobackup::strategies::mock::MockProducer;
pub use autobackup::utils::executor::mock::{MockExecutor, MockResponse};
pub use autobackup::utils::executor::CommandExecutor;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
