//! Unmanaged cluster service driven over a command transport.
//!
//! An unmanaged cluster is a set of hosts the caller already controls; the
//! engine only installs and starts the data-processing stack on them and
//! submits jobs by rendering `hadoop`/`spark-submit` command lines executed
//! through a [`Transport`]. Submission is synchronous: the command blocks
//! until the job finishes, so run time is the controller-side elapsed time
//! and pending time is always zero.

use std::fs;
use std::time::Instant;

use shell_escape::unix::escape;
use thiserror::Error;
use tracing::info;

use crate::backend::{
    BackendFuture, Deletion, JobBackend, ProvisioningBackend, ResourceId, Submission,
};
use crate::job::{JobError, JobKind, JobResult, JobSpec};
use crate::runner::ConcurrentRunner;
use crate::transport::{CommandOutput, Transport, TransportError};

/// Default binary for Hadoop job submission.
pub const DEFAULT_HADOOP_BIN: &str = "hadoop";

/// Default binary for Spark job submission.
pub const DEFAULT_SPARK_SUBMIT_BIN: &str = "spark-submit";

const DEFAULT_PROBE_COMMAND: &str = "true";

/// Errors raised by the unmanaged cluster backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum UnmanagedClusterError {
    /// Raised when a command cannot be dispatched to a host.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Raised when a cluster command exits with a non-zero status.
    #[error("command `{command}` exited with status {status_text}: {stderr}")]
    CommandFailed {
        /// Command that failed.
        command: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
}

/// Shell commands that stand up the cluster software.
///
/// The actual installation steps live with the caller; the engine only
/// sequences them: `bootstrap_command` fans out over every node in
/// parallel, then `start_command` runs on the leader.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UnmanagedClusterSpec {
    /// Command run on every node before the service starts.
    pub bootstrap_command: Option<String>,
    /// Command run on the leader to start the service.
    pub start_command: Option<String>,
}

/// A staging directory on the leader used as a dependency resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagingDir {
    /// Absolute path of the directory.
    pub path: String,
}

impl StagingDir {
    /// Creates a staging directory spec.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Cluster reached over a command transport, submitting jobs synchronously.
pub struct UnmanagedClusterService<T: Transport> {
    leader: T,
    workers: Vec<T>,
    hadoop_bin: String,
    spark_submit_bin: String,
    stop_command: Option<String>,
    runner: ConcurrentRunner,
}

impl<T: Transport> UnmanagedClusterService<T> {
    /// Creates a service with a leader transport and one transport per
    /// worker host.
    #[must_use]
    pub fn new(leader: T, workers: Vec<T>) -> Self {
        Self {
            leader,
            workers,
            hadoop_bin: String::from(DEFAULT_HADOOP_BIN),
            spark_submit_bin: String::from(DEFAULT_SPARK_SUBMIT_BIN),
            stop_command: None,
            runner: ConcurrentRunner::default(),
        }
    }

    /// Sets the command run on the leader during teardown.
    #[must_use]
    pub fn stop_command(mut self, value: impl Into<String>) -> Self {
        self.stop_command = Some(value.into());
        self
    }

    /// Overrides the Hadoop binary path on the cluster.
    #[must_use]
    pub fn hadoop_bin(mut self, value: impl Into<String>) -> Self {
        self.hadoop_bin = value.into();
        self
    }

    /// Overrides the `spark-submit` binary path on the cluster.
    #[must_use]
    pub fn spark_submit_bin(mut self, value: impl Into<String>) -> Self {
        self.spark_submit_bin = value.into();
        self
    }

    /// Overrides the fan-out runner used for bootstrap.
    #[must_use]
    pub const fn with_runner(mut self, runner: ConcurrentRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Returns the number of worker hosts.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn run_checked(
        transport: &T,
        command: &str,
    ) -> Result<CommandOutput, UnmanagedClusterError> {
        let output = transport.execute(command)?;
        if output.is_success() {
            return Ok(output);
        }
        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(UnmanagedClusterError::CommandFailed {
            command: command.to_owned(),
            status_text,
            stderr: output.stderr,
        })
    }

    /// Renders the submission command line for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Contract`] for job kinds this channel cannot
    /// run.
    pub fn render_job_command(&self, spec: &JobSpec) -> Result<String, JobError> {
        match &spec.kind {
            JobKind::Hadoop { jarfile, classname } => {
                Ok(self.render_hadoop(spec, jarfile.as_deref(), classname.as_deref()))
            }
            JobKind::Spark { jarfile, classname } => {
                let Some(jar) = jarfile.as_deref() else {
                    return Err(JobError::Contract {
                        message: String::from(
                            "spark jobs on a command channel need a jarfile",
                        ),
                    });
                };
                Ok(self.render_spark_submit(spec, classname.as_deref(), Some(jar)))
            }
            JobKind::PySpark { script } => {
                Ok(self.render_spark_submit(spec, None, Some(script.as_str())))
            }
            JobKind::SparkSql { .. } => Err(JobError::Contract {
                message: String::from("spark-sql jobs are not supported over a command channel"),
            }),
        }
    }

    fn render_hadoop(
        &self,
        spec: &JobSpec,
        jarfile: Option<&str>,
        classname: Option<&str>,
    ) -> String {
        let mut parts = vec![self.hadoop_bin.clone()];
        if let Some(jar) = jarfile {
            parts.push(String::from("jar"));
            parts.push(escape(jar.into()).into_owned());
        }
        // Classname only works when the jar is omitted or has no main class.
        if let Some(class) = classname {
            parts.push(escape(class.into()).into_owned());
        }
        for (key, value) in &spec.properties {
            parts.push(escape(format!("-D{key}={value}").into()).into_owned());
        }
        parts.extend(
            spec.arguments
                .iter()
                .map(|arg| escape(arg.as_str().into()).into_owned()),
        );
        parts.join(" ")
    }

    fn render_spark_submit(
        &self,
        spec: &JobSpec,
        classname: Option<&str>,
        artifact: Option<&str>,
    ) -> String {
        let mut parts = vec![self.spark_submit_bin.clone()];
        if let Some(class) = classname {
            parts.push(String::from("--class"));
            parts.push(escape(class.into()).into_owned());
        }
        for (key, value) in &spec.properties {
            parts.push(String::from("--conf"));
            parts.push(escape(format!("{key}={value}").into()).into_owned());
        }
        // Main jar or script goes last before the application arguments.
        if let Some(main) = artifact {
            parts.push(escape(main.into()).into_owned());
        }
        parts.extend(
            spec.arguments
                .iter()
                .map(|arg| escape(arg.as_str().into()).into_owned()),
        );
        parts.join(" ")
    }

    fn capture_stdout(spec: &JobSpec, output: &CommandOutput) -> Result<(), JobError> {
        if let Some(path) = &spec.stdout_path {
            fs::write(path, &output.stdout).map_err(|err| {
                JobError::submission_message(format!(
                    "failed to capture job output to {path}: {err}"
                ))
            })?;
        }
        Ok(())
    }
}

impl<T: Transport> ProvisioningBackend for UnmanagedClusterService<T> {
    type Error = UnmanagedClusterError;
    type Spec = UnmanagedClusterSpec;
    type DependencySpec = StagingDir;
    type DependencyHandle = StagingDir;

    fn create_resource<'a>(
        &'a self,
        id: &'a ResourceId,
        spec: &'a Self::Spec,
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            if let Some(bootstrap) = &spec.bootstrap_command {
                let nodes = std::iter::once(&self.leader).chain(self.workers.iter());
                self.runner
                    .run_all(nodes, |node| async move {
                        Self::run_checked(node, bootstrap).map(|_| ())
                    })
                    .await?;
            }
            if let Some(start) = &spec.start_command {
                Self::run_checked(&self.leader, start)?;
            }
            info!(%id, workers = self.workers.len(), "unmanaged cluster ready");
            Ok(())
        })
    }

    fn delete_resource<'a>(
        &'a self,
        id: &'a ResourceId,
    ) -> BackendFuture<'a, Deletion, Self::Error> {
        Box::pin(async move {
            let Some(stop) = &self.stop_command else {
                return Ok(Deletion::AlreadyAbsent);
            };
            // A failing stop means nothing was running; the postcondition
            // "service absent" holds either way.
            let output = self.leader.execute(stop)?;
            if output.is_success() {
                info!(%id, "unmanaged cluster stopped");
                Ok(Deletion::Deleted)
            } else {
                Ok(Deletion::AlreadyAbsent)
            }
        })
    }

    fn probe_resource<'a>(&'a self, id: &'a ResourceId) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            Self::run_checked(&self.leader, DEFAULT_PROBE_COMMAND)?;
            info!(%id, "cluster leader reachable");
            Ok(())
        })
    }

    fn create_dependency<'a>(
        &'a self,
        spec: &'a Self::DependencySpec,
    ) -> BackendFuture<'a, Self::DependencyHandle, Self::Error> {
        Box::pin(async move {
            let command = format!("mkdir -p {}", escape(spec.path.as_str().into()));
            Self::run_checked(&self.leader, &command)?;
            Ok(spec.clone())
        })
    }

    fn delete_dependency<'a>(
        &'a self,
        handle: &'a Self::DependencyHandle,
    ) -> BackendFuture<'a, Deletion, Self::Error> {
        Box::pin(async move {
            let command = format!("rm -rf {}", escape(handle.path.as_str().into()));
            Self::run_checked(&self.leader, &command)?;
            Ok(Deletion::Deleted)
        })
    }
}

impl<T: Transport> JobBackend for UnmanagedClusterService<T> {
    fn submit_job<'a>(&'a self, spec: &'a JobSpec) -> BackendFuture<'a, Submission, JobError> {
        Box::pin(async move {
            let command = self.render_job_command(spec)?;
            let start = Instant::now();
            let output = self
                .leader
                .execute(&command)
                .map_err(|err| JobError::submission("failed to dispatch job command", err))?;
            let end = Instant::now();

            if !output.is_success() {
                let status_text = output
                    .code
                    .map_or_else(|| String::from("unknown"), |code| code.to_string());
                return Err(JobError::submission_message(format!(
                    "job command exited with status {status_text}: {}",
                    output.stderr
                )));
            }

            Self::capture_stdout(spec, &output)?;
            let result = JobResult::from_instants(start, end)?;
            Ok(Submission::Completed(result))
        })
    }
}

#[cfg(test)]
mod tests;
