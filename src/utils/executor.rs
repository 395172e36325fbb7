//! Command execution abstraction for testability
//!
//! This module provides a trait-based abstraction for command execution,
//! enabling dependency injection and mocking for tests.

use anyhow::Result;
use std::io::Read;
use std::process::{Child, ChildStdout, Output};

/// A running process whose stdout is read as a stream
pub trait StreamingProcess: Read + Send {
    /// Wait for the process and fail if it did not exit successfully
    fn wait(self: Box<Self>) -> Result<()>;
}

/// Abstraction for command execution, enabling mocking in tests
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion
    fn run_command(&self, program: &str, args: &[&str], env: &[(String, String)]) -> Result<Output>;

    /// Run a command and return stdout as string
    fn run_command_stdout(
        &self,
        program: &str,
        args: &[&str],
        env: &[(String, String)],
    ) -> Result<String>;

    /// Start a command and hand back its stdout stream
    fn spawn_stdout(
        &self,
        program: &str,
        args: &[&str],
        env: &[(String, String)],
    ) -> Result<Box<dyn StreamingProcess>>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

struct ChildProcess {
    program: String,
    child: Child,
    stdout: ChildStdout,
}

impl Read for ChildProcess {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl StreamingProcess for ChildProcess {
    fn wait(self: Box<Self>) -> Result<()> {
        let ChildProcess {
            program,
            mut child,
            stdout,
        } = *self;
        drop(stdout);
        let status = child.wait()?;
        if !status.success() {
            anyhow::bail!("{} failed with exit code {:?}", program, status.code());
        }
        Ok(())
    }
}

impl CommandExecutor for RealExecutor {
    fn run_command(&self, program: &str, args: &[&str], env: &[(String, String)]) -> Result<Output> {
        let program = super::command::resolve_program(program)?;
        super::command::run_command(&program, args, env)
    }

    fn run_command_stdout(
        &self,
        program: &str,
        args: &[&str],
        env: &[(String, String)],
    ) -> Result<String> {
        let program = super::command::resolve_program(program)?;
        super::command::run_command_stdout(&program, args, env)
    }

    fn spawn_stdout(
        &self,
        program: &str,
        args: &[&str],
        env: &[(String, String)],
    ) -> Result<Box<dyn StreamingProcess>> {
        let resolved = super::command::resolve_program(program)?;
        let (child, stdout) = super::command::spawn_stdout(&resolved, args, env)?;
        Ok(Box::new(ChildProcess {
            program: program.to_string(),
            child,
            stdout,
        }))
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
#[allow(dead_code)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub program: String,
        pub args: Vec<String>,
        pub env: Vec<(String, String)>,
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        Success { stdout: String },
        Failure { stderr: String, exit_code: i32 },
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
            }
        }
    }

    /// Mock executor for testing
    ///
    /// An argument of the form `--file=<path>` receives the configured stdout, the
    /// way `pg_dump --file` writes its output.
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        /// Pre-configured responses: program name -> response
        responses: Arc<Mutex<HashMap<String, MockResponse>>>,
        /// Default response when no specific response is configured
        default_response: Arc<Mutex<MockResponse>>,
    }

    struct MockProcess {
        stdout: Cursor<Vec<u8>>,
        failure: Option<String>,
    }

    impl Read for MockProcess {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.stdout.read(buf)
        }
    }

    impl StreamingProcess for MockProcess {
        fn wait(self: Box<Self>) -> Result<()> {
            match self.failure {
                Some(stderr) => anyhow::bail!("Command failed: {}", stderr),
                None => Ok(()),
            }
        }
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for a specific program
        pub fn expect(self, program: &str, response: MockResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(program.to_string(), response);
            self
        }

        /// Set the default response for unconfigured programs
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Check if a program was called
        pub fn was_called(&self, program: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .any(|c| c.program == program)
        }

        /// Get number of calls to a specific program
        pub fn call_count(&self, program: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.program == program)
                .count()
        }

        fn record_call(&self, program: &str, args: &[&str], env: &[(String, String)]) {
            self.calls.lock().unwrap().push(CommandCall {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                env: env.to_vec(),
            });
        }

        fn get_response(&self, program: &str) -> MockResponse {
            self.responses
                .lock()
                .unwrap()
                .get(program)
                .cloned()
                .unwrap_or_else(|| self.default_response.lock().unwrap().clone())
        }
    }

    impl CommandExecutor for MockExecutor {
        fn run_command(
            &self,
            program: &str,
            args: &[&str],
            env: &[(String, String)],
        ) -> Result<Output> {
            self.record_call(program, args, env);
            match self.get_response(program) {
                MockResponse::Success { stdout } => {
                    if let Some(path) = args.iter().find_map(|a| a.strip_prefix("--file=")) {
                        std::fs::write(path, &stdout)?;
                    }
                    Ok(Output {
                        status: std::process::ExitStatus::default(),
                        stdout: stdout.into_bytes(),
                        stderr: Vec::new(),
                    })
                }
                MockResponse::Failure { stderr, exit_code } => {
                    anyhow::bail!("Command failed with exit code {:?}: {}", exit_code, stderr)
                }
            }
        }

        fn run_command_stdout(
            &self,
            program: &str,
            args: &[&str],
            env: &[(String, String)],
        ) -> Result<String> {
            let output = self.run_command(program, args, env)?;
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }

        fn spawn_stdout(
            &self,
            program: &str,
            args: &[&str],
            env: &[(String, String)],
        ) -> Result<Box<dyn StreamingProcess>> {
            self.record_call(program, args, env);
            let process = match self.get_response(program) {
                MockResponse::Success { stdout } => MockProcess {
                    stdout: Cursor::new(stdout.into_bytes()),
                    failure: None,
                },
                MockResponse::Failure { stderr, .. } => MockProcess {
                    stdout: Cursor::new(Vec::new()),
                    failure: Some(stderr),
                },
            };
            Ok(Box::new(process))
        }
    }
}
