//! Unit tests for autobackup
//!
//! Configuration, artifact naming and retention selection, without any I/O
//! beyond temporary directories.

mod config;
mod naming;
mod retention;
