use anyhow::{Context, Result};
use autobackup::backends::dropbox;
use autobackup::config::{self, Config, Credentials};
use autobackup::managers::logging::{self, LoggingConfig};
use autobackup::managers::{BackupManager, Outcome, RunMode};
use autobackup::strategies::DumpFormat;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autobackup")]
#[command(about = "Automatic database and filestore backups", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/autobackup/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run backups for all enabled records or a specific record
    Run {
        /// Specific record to run (defaults to all enabled records)
        #[arg(short, long)]
        record: Option<String>,

        /// Persist the result and send notifications, as the scheduler does
        #[arg(long)]
        scheduled: bool,
    },

    /// Check that a destination accepts the configured credentials
    TestConnection {
        #[arg(short, long)]
        destination: String,
    },

    /// Upload a small text file to a destination
    SendTestFile {
        #[arg(short, long)]
        destination: String,
    },

    /// Show the last result of scheduled runs
    Status {
        /// Specific record to show
        #[arg(short, long)]
        record: Option<String>,
    },

    /// List configured destinations and records
    List,

    /// Validate configuration file
    Validate,

    /// List the databases visible to psql
    Databases,

    /// Produce a dump without uploading it
    Dump {
        #[arg(short, long)]
        record: String,

        #[arg(short, long, value_enum, default_value_t = DumpFormat::Zip)]
        format: DumpFormat,

        /// File to write the dump to
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Obtain a Dropbox refresh token for a destination
    DropboxAuth {
        #[arg(short, long)]
        destination: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = config::expand_tilde(&cli.config);
    let config = config::load_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let records = config::resolve_all_records(&config)?;

    // Commands that move data keep a log file; the others only talk to the console
    let command = cli.command.unwrap_or(Commands::Status { record: None });
    let _log_guard = match command {
        Commands::Run { .. }
        | Commands::TestConnection { .. }
        | Commands::SendTestFile { .. }
        | Commands::Dump { .. } => Some(logging::init_logging(&LoggingConfig::from_config(
            &config.global,
        ))?),
        _ => {
            logging::init_console_logging();
            None
        }
    };

    let backup_manager = BackupManager::new(config.clone(), records);

    match command {
        Commands::Run { record, scheduled } => {
            let mode = if scheduled {
                RunMode::Scheduled
            } else {
                RunMode::Manual
            };

            let results = match record {
                Some(name) => {
                    println!("Running backup for record: {}", name);
                    vec![(name.clone(), backup_manager.run_record(&name, mode))]
                }
                None => {
                    println!("Running backups for all enabled records...");
                    backup_manager.run_all(mode)
                }
            };

            let mut failed = false;
            for (name, outcome) in &results {
                print_outcome(name, outcome);
                failed |= !outcome.is_success();
            }
            if failed {
                std::process::exit(1);
            }
        }

        Commands::TestConnection { destination } => {
            let report = backup_manager.test_connection(&destination);
            println!("{}", report);
            if report.result_type != autobackup::ResultType::Success {
                std::process::exit(1);
            }
        }

        Commands::SendTestFile { destination } => {
            let outcome = backup_manager.send_test_file(&destination);
            print_outcome(&destination, &outcome);
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Status { record } => {
            let results = backup_manager.history().load();
            let names: Vec<&String> = match &record {
                Some(name) => {
                    if !backup_manager.records().contains_key(name) {
                        anyhow::bail!("Record '{}' not found in configuration", name);
                    }
                    vec![name]
                }
                None => backup_manager.records().keys().collect(),
            };

            for name in names {
                println!("=== {} ===", name);
                match results.get(name) {
                    Some(report) => println!("{}", report),
                    None => println!("No scheduled run recorded yet"),
                }
                println!();
            }
        }

        Commands::List => print_list(&config, &backup_manager),

        Commands::Validate => {
            println!("Configuration is valid!");
            println!("Records: {}", backup_manager.records().len());
            println!("Destinations: {}", config.destinations.len());
            for (name, destination) in &config.destinations {
                let kind = destination.kind();
                let state = match destination.check_ready() {
                    Ok(()) if config.policy.allows(kind) => "ready".to_string(),
                    Ok(()) => format!("disabled by the {} policy", kind),
                    Err(e) => e.to_string(),
                };
                println!("  {} ({}): {}", name, kind, state);
            }
        }

        Commands::Databases => {
            let databases = backup_manager.producer().list_databases()?;
            println!("Databases:");
            for db in &databases {
                println!("  {}", db);
            }
            for (name, record) in backup_manager.records() {
                if !databases.contains(&record.database) {
                    println!(
                        "Warning: record '{}' uses unknown database '{}'",
                        name, record.database
                    );
                }
            }
        }

        Commands::Dump {
            record,
            format,
            output,
        } => {
            let resolved = backup_manager
                .records()
                .get(&record)
                .ok_or_else(|| anyhow::anyhow!("Record '{}' not found in configuration", record))?;

            let mut artifact = backup_manager
                .producer()
                .produce(&resolved.database, resolved.scope, format)?;
            let mut file = File::create(&output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let written = io::copy(&mut artifact, &mut file)?;
            artifact.finish()?;

            println!("✓ Wrote {} bytes to {}", written, output.display());
        }

        Commands::DropboxAuth { destination } => {
            handle_dropbox_auth(&config, &destination)?;
        }
    }

    Ok(())
}

fn print_outcome(name: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Success { .. } => println!("✓ [{}] {}", name, outcome),
        Outcome::Failure { .. } => eprintln!("✗ [{}] {}", name, outcome),
    }
}

fn print_list(config: &Config, backup_manager: &BackupManager) {
    println!("Configured destinations:");
    for (name, destination) in &config.destinations {
        println!("  {} ({})", name, destination.kind());
        if !destination.description.is_empty() {
            println!("    Description: {}", destination.description);
        }
        println!("    Path: {}", destination.path);
    }
    println!();

    println!("Configured records:");
    for (name, record) in backup_manager.records() {
        println!("  {}", name);
        println!("    Database: {}", record.database);
        println!("    Scope: {}", record.scope);
        println!("    Destination: {}", record.destination_name);
        println!("    Retention: {}", record.quota);
        println!("    Enabled: {}", record.enabled);
    }
}

/// No-redirect OAuth flow: the operator pastes the code shown by Dropbox
fn handle_dropbox_auth(config: &Config, destination_name: &str) -> Result<()> {
    use dialoguer::Input;

    let destination = config::find_destination(config, destination_name)?;
    let (app_key, app_secret) = match &destination.credentials {
        Credentials::Dropbox {
            app_key: Some(key),
            app_secret: Some(secret),
            ..
        } => (key, secret),
        Credentials::Dropbox { .. } => {
            anyhow::bail!("Destination '{}' needs app_key and app_secret", destination_name)
        }
        _ => anyhow::bail!("Destination '{}' is not a Dropbox destination", destination_name),
    };

    println!("1. Open this URL and allow access:");
    println!("   {}", dropbox::authorize_url(app_key));
    println!("2. Paste the access code below.");

    let code: String = Input::new().with_prompt("Access code").interact_text()?;
    let token = dropbox::exchange_access_code(app_key, app_secret, code.trim())?;

    println!();
    println!("✓ Refresh token obtained. Add it to [destinations.{}]:", destination_name);
    println!("app_token = \"{}\"", token);
    Ok(())
}
