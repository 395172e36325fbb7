//! PostgreSQL integration tests
//!
//! These tests require Docker and a local pg_dump/psql, and dump a real database.
//! Run with: `cargo test -p autobackup-tests --test integration -- --ignored`

use super::common::ContainerGuard;
use anyhow::Result;
use autobackup::config::{BackupScope, DatabaseConfig};
use autobackup::strategies::{ArtifactProducer, DumpFormat, PgDumpProducer};
use std::io::{Cursor, Read};
use std::process::Command;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use zip::ZipArchive;

const PORT: u16 = 55432;
const PASSWORD: &str = "testpass";

fn is_docker_available() -> bool {
    Command::new("docker")
        .args(["ps"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn start_postgres_container(name: &str) -> Result<()> {
    Command::new("docker")
        .args([
            "run",
            "-d",
            "--name",
            name,
            "-p",
            &format!("{}:5432", PORT),
            "-e",
            &format!("POSTGRES_PASSWORD={}", PASSWORD),
            "-e",
            "POSTGRES_DB=shop",
            "postgres:15-alpine",
        ])
        .output()?;

    for _ in 0..30 {
        let ready = Command::new("docker")
            .args(["exec", name, "pg_isready", "-U", "postgres"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if ready {
            return Ok(());
        }
        thread::sleep(Duration::from_secs(1));
    }

    Err(anyhow::anyhow!("PostgreSQL failed to become ready"))
}

fn seed_table(name: &str) -> Result<()> {
    let output = Command::new("docker")
        .args([
            "exec",
            name,
            "psql",
            "-U",
            "postgres",
            "-d",
            "shop",
            "-c",
            "CREATE TABLE orders (id serial PRIMARY KEY, total numeric); INSERT INTO orders (total) VALUES (42);",
        ])
        .output()?;
    anyhow::ensure!(output.status.success(), "seeding failed");
    Ok(())
}

fn database_config(filestore_root: &std::path::Path) -> DatabaseConfig {
    DatabaseConfig {
        host: Some("127.0.0.1".to_string()),
        port: Some(PORT),
        user: Some("postgres".to_string()),
        password: Some(PASSWORD.to_string()),
        filestore_root: filestore_root.to_path_buf(),
        ..DatabaseConfig::default()
    }
}

fn entry_names(bytes: Vec<u8>) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

#[test]
#[ignore]
fn test_postgres_full_backup_archive() -> Result<()> {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping");
        return Ok(());
    }

    let name = "autobackup-it-full";
    let _guard = ContainerGuard::new(name);
    start_postgres_container(name)?;
    seed_table(name)?;

    let filestore = TempDir::new()?;
    std::fs::create_dir_all(filestore.path().join("shop/ab"))?;
    std::fs::write(filestore.path().join("shop/ab/abcdef"), b"attachment")?;

    let producer = PgDumpProducer::new(database_config(filestore.path()));
    let mut artifact = producer.produce("shop", BackupScope::Full, DumpFormat::Zip)?;
    let mut bytes = Vec::new();
    artifact.read_to_end(&mut bytes)?;
    artifact.finish()?;

    let names = entry_names(bytes.clone());
    assert_eq!(names[0], "dump.sql");
    assert!(names.contains(&"manifest.json".to_string()));
    assert!(names.iter().any(|n| n.ends_with("ab/abcdef")));

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut dump = String::new();
    archive.by_name("dump.sql")?.read_to_string(&mut dump)?;
    assert!(dump.contains("CREATE TABLE public.orders"));

    let mut manifest = String::new();
    archive.by_name("manifest.json")?.read_to_string(&mut manifest)?;
    assert!(manifest.contains("\"db_name\": \"shop\""));
    Ok(())
}

#[test]
#[ignore]
fn test_postgres_list_databases() -> Result<()> {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping");
        return Ok(());
    }

    let name = "autobackup-it-list";
    let _guard = ContainerGuard::new(name);
    start_postgres_container(name)?;

    let filestore = TempDir::new()?;
    let producer = PgDumpProducer::new(database_config(filestore.path()));
    let databases = producer.list_databases()?;

    assert!(databases.contains(&"shop".to_string()));
    assert!(databases.contains(&"postgres".to_string()));
    assert!(!databases.iter().any(|d| d.starts_with("template")));
    Ok(())
}

#[test]
#[ignore]
fn test_postgres_raw_dump_stream() -> Result<()> {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping");
        return Ok(());
    }

    let name = "autobackup-it-raw";
    let _guard = ContainerGuard::new(name);
    start_postgres_container(name)?;
    seed_table(name)?;

    let filestore = TempDir::new()?;
    let producer = PgDumpProducer::new(database_config(filestore.path()));
    let mut artifact = producer.produce("shop", BackupScope::Db, DumpFormat::Raw)?;
    let mut bytes = Vec::new();
    artifact.read_to_end(&mut bytes)?;
    artifact.finish()?;

    // Custom-format archives start with the PGDMP magic
    assert!(bytes.starts_with(b"PGDMP"));
    Ok(())
}
