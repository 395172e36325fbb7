//! Configuration module for autobackup
//!
//! This module handles loading, validating, and resolving configuration from TOML files.
//!
//! ## Layout
//!
//! - `[global]`: logging, lock directory, last-result state file
//! - `[database]`: PostgreSQL connection used to produce dumps
//! - `[policy]`: company-wide switches per destination kind and notification type
//! - `[notifications]`: Discord webhook
//! - `[destinations.<name>]`: storage targets, tagged by `type`
//! - `[records.<name>]`: what to back up, where, and how many copies to keep
//!
//! ## Example Usage
//!
//! ```no_run
//! use autobackup::config;
//!
//! let config = config::load_config("autobackup.toml")?;
//! let records = config::resolve_all_records(&config)?;
//!
//! for (name, record) in records {
//!     println!("Record: {}, Destination: {}", name, record.destination_name);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{
    find_destination, load_config, parse_config, resolve_all_records, resolve_record,
    validate_config, ConfigError, Result,
};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
