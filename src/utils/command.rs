//! Utilities for running external tools (pg_dump, psql) with proper error handling

use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Output, Stdio};
use tracing::{debug, error};

/// Resolve a tool name through PATH, keeping explicit paths as they are
pub fn resolve_program(program: &str) -> Result<String> {
    if Path::new(program).is_absolute() {
        return Ok(program.to_string());
    }
    let path = which::which(program).with_context(|| format!("{} not found in PATH", program))?;
    Ok(path.to_string_lossy().to_string())
}

fn build_command(program: &str, args: &[&str], env: &[(String, String)]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd
}

/// Run a command to completion, failing on a non-zero exit status
pub fn run_command(program: &str, args: &[&str], env: &[(String, String)]) -> Result<Output> {
    let mut cmd = build_command(program, args, env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!("Running command: {} {}", program, args.join(" "));

    let output = cmd
        .output()
        .context(format!("Failed to execute {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {} {}", program, args.join(" "));
        error!("Stderr: {}", stderr);
        anyhow::bail!(
            "Command failed with exit code {:?}: {}",
            output.status.code(),
            stderr.trim()
        );
    }

    Ok(output)
}

/// Run a command and return stdout as string
pub fn run_command_stdout(program: &str, args: &[&str], env: &[(String, String)]) -> Result<String> {
    let output = run_command(program, args, env)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Start a command whose stdout is consumed as a stream
///
/// The caller must wait on the returned child once the stream is drained.
pub fn spawn_stdout(
    program: &str,
    args: &[&str],
    env: &[(String, String)],
) -> Result<(Child, ChildStdout)> {
    let mut cmd = build_command(program, args, env);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    debug!("Spawning command: {} {}", program, args.join(" "));

    let mut child = cmd
        .spawn()
        .context(format!("Failed to execute {}", program))?;
    let stdout = child
        .stdout
        .take()
        .context(format!("{} has no stdout pipe", program))?;
    Ok((child, stdout))
}
