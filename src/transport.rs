//! Remote-command transport used by synchronous backends.
//!
//! A [`Transport`] executes one command string on a target host and returns
//! its captured output. The crate ships a [`LocalTransport`] that runs
//! commands through the local shell and an [`SshTransport`] that wraps the
//! system `ssh` client; both sit on the [`CommandRunner`] process seam so
//! tests can script outcomes without spawning anything.

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;

/// Default TCP port for SSH.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Errors raised by transports.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// Raised when the transport configuration is invalid.
    #[error("invalid transport configuration: missing {field}")]
    InvalidConfig {
        /// Name of the missing or invalid field.
        field: String,
    },
    /// Raised when the underlying program cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error message.
        message: String,
    },
}

/// Abstraction over process execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransportError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| TransportError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Executes one command string on a target host.
pub trait Transport: Send + Sync {
    /// Runs `command` and captures its output. A non-zero remote exit code
    /// is reported through [`CommandOutput::code`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the command cannot be dispatched at
    /// all.
    fn execute(&self, command: &str) -> Result<CommandOutput, TransportError>;
}

/// Transport that runs commands through the local shell.
#[derive(Clone, Debug)]
pub struct LocalTransport<R: CommandRunner = ProcessCommandRunner> {
    shell: String,
    runner: R,
}

impl LocalTransport<ProcessCommandRunner> {
    /// Creates a local transport using `sh` and the real process runner.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runner(ProcessCommandRunner)
    }
}

impl Default for LocalTransport<ProcessCommandRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> LocalTransport<R> {
    /// Creates a local transport over the provided runner.
    pub fn with_runner(runner: R) -> Self {
        Self {
            shell: String::from("sh"),
            runner,
        }
    }
}

impl<R: CommandRunner> Transport for LocalTransport<R> {
    fn execute(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let args = vec![OsString::from("-c"), OsString::from(command)];
        self.runner.run(&self.shell, &args)
    }
}

/// SSH connection settings for one target host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshEndpoint {
    /// Remote user to connect as.
    pub user: String,
    /// Remote host name or address.
    pub host: String,
    /// TCP port for SSH.
    pub port: u16,
}

impl SshEndpoint {
    /// Creates an endpoint on the default SSH port.
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            port: DEFAULT_SSH_PORT,
        }
    }

    /// Overrides the SSH port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Validates the endpoint, returning a descriptive error when a
    /// required field is blank.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] when `user` or `host` is
    /// empty.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.user.trim().is_empty() {
            return Err(TransportError::InvalidConfig {
                field: String::from("user"),
            });
        }
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidConfig {
                field: String::from("host"),
            });
        }
        Ok(())
    }
}

/// Transport that executes commands through the system `ssh` client.
#[derive(Clone, Debug)]
pub struct SshTransport<R: CommandRunner = ProcessCommandRunner> {
    endpoint: SshEndpoint,
    ssh_bin: String,
    identity_file: Option<String>,
    batch_mode: bool,
    strict_host_key_checking: bool,
    known_hosts_file: String,
    runner: R,
}

impl SshTransport<ProcessCommandRunner> {
    /// Creates a transport to `endpoint` using the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] when the endpoint fails
    /// validation.
    pub fn new(endpoint: SshEndpoint) -> Result<Self, TransportError> {
        Self::with_runner(endpoint, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshTransport<R> {
    /// Creates a transport to `endpoint` over the provided runner.
    ///
    /// Defaults mirror ephemeral-host usage: batch mode on, strict host key
    /// checking off, known hosts routed to `/dev/null`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidConfig`] when the endpoint fails
    /// validation.
    pub fn with_runner(endpoint: SshEndpoint, runner: R) -> Result<Self, TransportError> {
        endpoint.validate()?;
        Ok(Self {
            endpoint,
            ssh_bin: String::from("ssh"),
            identity_file: None,
            batch_mode: true,
            strict_host_key_checking: false,
            known_hosts_file: String::from("/dev/null"),
            runner,
        })
    }

    /// Uses the given identity file for authentication.
    #[must_use]
    pub fn identity_file(mut self, path: impl Into<String>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Returns the target endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &SshEndpoint {
        &self.endpoint
    }

    fn build_args(&self, command: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.endpoint.port.to_string()),
        ];

        if let Some(ref identity_file) = self.identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(identity_file));
        }

        if self.batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.known_hosts_file
            )));
        }

        args.push(OsString::from(format!(
            "{}@{}",
            self.endpoint.user, self.endpoint.host
        )));
        args.push(OsString::from(command));
        args
    }
}

impl<R: CommandRunner> Transport for SshTransport<R> {
    fn execute(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let args = self.build_args(command);
        self.runner.run(&self.ssh_bin, &args)
    }
}
