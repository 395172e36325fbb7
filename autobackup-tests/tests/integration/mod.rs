//! Integration tests for autobackup
//!
//! Local destination tests run against temporary directories. The PostgreSQL
//! tests require Docker and a local pg_dump.
//! Run them with: `cargo test -p autobackup-tests --test integration -- --ignored`

mod local;
mod postgres;
mod sftp;
