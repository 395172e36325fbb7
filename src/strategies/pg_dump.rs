//! PostgreSQL producer
//!
//! Handles:
//! - SQL dumps with a manifest of the installed modules
//! - Filestore copies
//! - Zip packaging (dump.sql first) or raw `pg_dump --format=c` streams

use super::{Artifact, ArtifactProducer, DumpFormat};
use crate::config::{expand_tilde, BackupScope, DatabaseConfig};
use crate::utils::{CommandExecutor, RealExecutor};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const DUMP_FILE: &str = "dump.sql";
const MANIFEST_FILE: &str = "manifest.json";
const FILESTORE_DIR: &str = "filestore";

const MODULES_QUERY: &str =
    "SELECT name, latest_version FROM ir_module_module WHERE state = 'installed'";
const DATABASES_QUERY: &str =
    "SELECT datname FROM pg_database WHERE datistemplate = false ORDER BY datname";

/// Contents of `manifest.json`
#[derive(Debug, Serialize)]
struct Manifest {
    odoo_dump: &'static str,
    db_name: String,
    pg_version: String,
    modules: BTreeMap<String, String>,
}

pub struct PgDumpProducer {
    db: DatabaseConfig,
    executor: Arc<dyn CommandExecutor>,
}

impl PgDumpProducer {
    pub fn new(db: DatabaseConfig) -> Self {
        Self::with_executor(db, Arc::new(RealExecutor::new()))
    }

    pub fn with_executor(db: DatabaseConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { db, executor }
    }

    /// Connection settings passed to pg_dump and psql through the libpq environment
    fn env(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(host) = &self.db.host {
            env.push(("PGHOST".to_string(), host.clone()));
        }
        if let Some(port) = self.db.port {
            env.push(("PGPORT".to_string(), port.to_string()));
        }
        if let Some(user) = &self.db.user {
            env.push(("PGUSER".to_string(), user.clone()));
        }
        if let Some(password) = &self.db.password {
            env.push(("PGPASSWORD".to_string(), password.clone()));
        }
        env
    }

    fn filestore_path(&self, database: &str) -> PathBuf {
        expand_tilde(&self.db.filestore_root).join(database)
    }

    fn psql(&self, database: &str, query: &str) -> Result<String> {
        self.executor.run_command_stdout(
            &self.db.psql,
            &["-X", "-A", "-t", "-F", "\t", "-d", database, "-c", query],
            &self.env(),
        )
    }

    fn server_version(&self, database: &str) -> Result<String> {
        let output = self.psql(database, "SHOW server_version")?;
        Ok(output
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string())
    }

    fn installed_modules(&self, database: &str) -> Result<BTreeMap<String, String>> {
        let output = self.psql(database, MODULES_QUERY)?;
        Ok(output
            .lines()
            .filter_map(|line| {
                let mut parts = line.split('\t');
                let name = parts.next()?.trim();
                if name.is_empty() {
                    return None;
                }
                let version = parts.next().unwrap_or_default().trim();
                Some((name.to_string(), version.to_string()))
            })
            .collect())
    }

    fn write_manifest(&self, database: &str, staging: &Path) -> Result<()> {
        let pg_version = self
            .server_version(database)
            .context("Failed to read the PostgreSQL server version")?;
        let modules = self.installed_modules(database).unwrap_or_else(|e| {
            warn!("Could not read installed modules of '{}': {}", database, e);
            BTreeMap::new()
        });

        let manifest = Manifest {
            odoo_dump: "1",
            db_name: database.to_string(),
            pg_version,
            modules,
        };
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(staging.join(MANIFEST_FILE), json)?;
        Ok(())
    }

    fn dump_sql(&self, database: &str, staging: &Path) -> Result<()> {
        let file_arg = format!("--file={}", staging.join(DUMP_FILE).display());
        info!("Dumping database '{}'", database);
        self.executor
            .run_command(
                &self.db.pg_dump,
                &["--no-owner", file_arg.as_str(), database],
                &self.env(),
            )
            .with_context(|| format!("pg_dump failed for database '{}'", database))?;
        Ok(())
    }

    fn copy_filestore(&self, database: &str, staging: &Path, required: bool) -> Result<()> {
        let source = self.filestore_path(database);
        let target = staging.join(FILESTORE_DIR);
        if !source.is_dir() {
            if required {
                anyhow::bail!("Filestore not found: {}", source.display());
            }
            warn!("Filestore not found, skipping: {}", source.display());
            return Ok(());
        }

        info!("Copying filestore from {}", source.display());
        copy_tree(&source, &target)
            .with_context(|| format!("Failed to copy filestore {}", source.display()))
    }

    fn produce_zip(&self, database: &str, scope: BackupScope) -> Result<Artifact> {
        let staging = TempDir::new().context("Failed to create staging directory")?;

        if matches!(scope, BackupScope::Full | BackupScope::Fs) {
            self.copy_filestore(database, staging.path(), scope == BackupScope::Fs)?;
        }
        if matches!(scope, BackupScope::Full | BackupScope::Db) {
            self.write_manifest(database, staging.path())?;
            self.dump_sql(database, staging.path())?;
        }

        let archive = zip_staging(staging.path())?;
        let artifact = Artifact::from_file(archive)?;
        if let Some(size) = artifact.size_hint() {
            info!("Archive ready for '{}' ({} bytes)", database, size);
        }
        Ok(artifact)
    }

    fn produce_raw(&self, database: &str, scope: BackupScope) -> Result<Artifact> {
        if scope == BackupScope::Full {
            warn!("Raw dumps do not include the filestore of '{}'", database);
        }
        info!("Streaming custom-format dump of '{}'", database);
        let process = self
            .executor
            .spawn_stdout(
                &self.db.pg_dump,
                &["--no-owner", "--format=c", database],
                &self.env(),
            )
            .with_context(|| format!("pg_dump failed for database '{}'", database))?;
        Ok(Artifact::from_process(process))
    }
}

impl ArtifactProducer for PgDumpProducer {
    fn produce(&self, source: &str, scope: BackupScope, format: DumpFormat) -> Result<Artifact> {
        match (format, scope) {
            (DumpFormat::Raw, BackupScope::Fs) => {
                debug!("Filestore-only dumps are always zipped");
                self.produce_zip(source, scope)
            }
            (DumpFormat::Raw, _) => self.produce_raw(source, scope),
            (DumpFormat::Zip, _) => self.produce_zip(source, scope),
        }
    }

    fn list_databases(&self) -> Result<Vec<String>> {
        let output = self.psql("postgres", DATABASES_QUERY)?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    fn name(&self) -> &'static str {
        "pg_dump"
    }
}

fn copy_tree(source: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        let destination = target.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&path, &destination)?;
        } else {
            fs::copy(&path, &destination)?;
        }
    }
    Ok(())
}

/// Zip the staging directory into an anonymous temporary file
fn zip_staging(staging: &Path) -> Result<File> {
    let file = tempfile::tempfile().context("Failed to create archive file")?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    // Restores read the dump first
    for name in [DUMP_FILE, MANIFEST_FILE] {
        let path = staging.join(name);
        if path.is_file() {
            writer.start_file(name, options)?;
            io::copy(&mut File::open(&path)?, &mut writer)?;
        }
    }

    let filestore = staging.join(FILESTORE_DIR);
    if filestore.is_dir() {
        add_directory(&mut writer, &filestore, FILESTORE_DIR, options)?;
    }

    let mut file = writer.finish()?;
    file.flush()?;
    Ok(file)
}

fn add_directory(
    writer: &mut ZipWriter<File>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    writer.add_directory(format!("{}/", prefix), options)?;

    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = format!("{}/{}", prefix, entry.file_name().to_string_lossy());
        if entry.file_type()?.is_dir() {
            add_directory(writer, &path, &name, options)?;
        } else {
            writer.start_file(name, options)?;
            io::copy(&mut File::open(&path)?, writer)?;
        }
    }
    Ok(())
}
