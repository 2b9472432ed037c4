//! Job specification, timing results, and the submission/poll engine.
//!
//! A [`JobSpec`] describes one unit of remote work; the backend decides
//! whether submission blocks until completion or returns a queued job id
//! that [`JobExecutor`] resolves through the polling protocol built on
//! [`RetryPolicy`]. Timing comes back as a [`JobResult`] whose `Duration`
//! fields make negative run or pending times unrepresentable.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::info;

use crate::backend::{JobBackend, JobId, JobPoll, Submission};
use crate::retry::{Clock, Probe, RetryError, RetryPolicy, SystemClock};

/// Main class of the Hadoop bulk-copy utility used by
/// [`JobExecutor::distributed_copy`].
pub const DISTCP_CLASSNAME: &str = "org.apache.hadoop.tools.DistCp";

/// Closed set of job shapes the engine understands.
///
/// Each variant carries the payload that identifies the executable work;
/// [`JobSpec::builder`] validates the payload at construction so malformed
/// combinations never reach a backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JobKind {
    /// A JVM Spark application: a jar, a main class, or both.
    Spark {
        /// Jar file to execute.
        jarfile: Option<String>,
        /// Name of the main class.
        classname: Option<String>,
    },
    /// A Python Spark application.
    PySpark {
        /// Script to submit.
        script: String,
    },
    /// A Spark SQL script executed from a query file.
    SparkSql {
        /// File containing the SQL script.
        query_file: String,
    },
    /// A Hadoop MapReduce job: a jar, a main class, or both.
    Hadoop {
        /// Jar file to execute.
        jarfile: Option<String>,
        /// Name of the main class.
        classname: Option<String>,
    },
}

impl JobKind {
    /// Short name used in log events and error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Spark { .. } => "spark",
            Self::PySpark { .. } => "pyspark",
            Self::SparkSql { .. } => "spark-sql",
            Self::Hadoop { .. } => "hadoop",
        }
    }

    fn validate(&self) -> Result<(), JobError> {
        match self {
            Self::Spark { jarfile, classname } | Self::Hadoop { jarfile, classname } => {
                let has_jar = jarfile.as_deref().is_some_and(|jar| !jar.trim().is_empty());
                let has_class = classname
                    .as_deref()
                    .is_some_and(|class| !class.trim().is_empty());
                if has_jar || has_class {
                    Ok(())
                } else {
                    Err(JobError::Validation(format!(
                        "{} jobs need a jarfile or a classname",
                        self.name()
                    )))
                }
            }
            Self::PySpark { script } => {
                if script.trim().is_empty() {
                    Err(JobError::Validation(String::from(
                        "pyspark jobs need a non-empty script",
                    )))
                } else {
                    Ok(())
                }
            }
            Self::SparkSql { query_file } => {
                if query_file.trim().is_empty() {
                    Err(JobError::Validation(String::from(
                        "spark-sql jobs need a non-empty query file",
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// One unit of remote work submitted against a live service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobSpec {
    /// Job shape and executable payload.
    pub kind: JobKind,
    /// Positional arguments passed to the driver application.
    pub arguments: Vec<String>,
    /// Properties forwarded to the job; merged over executor defaults with
    /// these values winning on key collision.
    pub properties: BTreeMap<String, String>,
    /// Per-job override of the poll interval for queued submissions.
    pub poll_interval: Option<Duration>,
    /// Destination file for the job's captured standard output.
    pub stdout_path: Option<Utf8PathBuf>,
}

impl JobSpec {
    /// Starts a builder for the given job kind.
    #[must_use]
    pub fn builder(kind: JobKind) -> JobSpecBuilder {
        JobSpecBuilder::new(kind)
    }
}

/// Builder for [`JobSpec`] that defers validation to construction.
#[derive(Clone, Debug)]
pub struct JobSpecBuilder {
    kind: JobKind,
    arguments: Vec<String>,
    properties: BTreeMap<String, String>,
    poll_interval: Option<Duration>,
    stdout_path: Option<Utf8PathBuf>,
}

impl JobSpecBuilder {
    /// Creates a builder with no arguments or properties.
    #[must_use]
    pub const fn new(kind: JobKind) -> Self {
        Self {
            kind,
            arguments: Vec::new(),
            properties: BTreeMap::new(),
            poll_interval: None,
            stdout_path: None,
        }
    }

    /// Appends one positional argument.
    #[must_use]
    pub fn argument(mut self, value: impl Into<String>) -> Self {
        self.arguments.push(value.into());
        self
    }

    /// Appends several positional arguments.
    #[must_use]
    pub fn arguments<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(values.into_iter().map(Into::into));
        self
    }

    /// Sets one job property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Merges a map of job properties.
    #[must_use]
    pub fn properties(mut self, values: BTreeMap<String, String>) -> Self {
        self.properties.extend(values);
        self
    }

    /// Overrides the poll interval for queued submissions.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Captures the job's standard output to the given file.
    #[must_use]
    pub fn stdout_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.stdout_path = Some(path.into());
        self
    }

    /// Builds and validates the [`JobSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Validation`] when the job kind's payload is
    /// incomplete.
    pub fn build(self) -> Result<JobSpec, JobError> {
        self.kind.validate()?;
        Ok(JobSpec {
            kind: self.kind,
            arguments: self.arguments,
            properties: self.properties,
            poll_interval: self.poll_interval,
            stdout_path: self.stdout_path,
        })
    }
}

/// Service-reported timing of a successful job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobResult {
    /// Execution time reported by the service.
    pub run_time: Duration,
    /// Queueing delay reported by the service; zero for backends that do
    /// not report one.
    pub pending_time: Duration,
}

impl JobResult {
    /// Creates a result from service-reported durations.
    #[must_use]
    pub const fn new(run_time: Duration, pending_time: Duration) -> Self {
        Self {
            run_time,
            pending_time,
        }
    }

    /// Creates a result with no reported pending time.
    #[must_use]
    pub const fn from_run_time(run_time: Duration) -> Self {
        Self::new(run_time, Duration::ZERO)
    }

    /// Derives a result from engine-recorded start and end instants, as
    /// observed by synchronous backends. Pending time is zero in this mode.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Contract`] when `end` precedes `start`; a
    /// negative duration is a defect, never a value.
    pub fn from_instants(start: Instant, end: Instant) -> Result<Self, JobError> {
        end.checked_duration_since(start)
            .map(Self::from_run_time)
            .ok_or_else(|| JobError::Contract {
                message: String::from("job end instant precedes its start instant"),
            })
    }

    /// Total time the service took: run time plus pending time.
    #[must_use]
    pub const fn wall_time(&self) -> Duration {
        self.run_time.saturating_add(self.pending_time)
    }
}

/// Errors surfaced by job submission and polling.
#[derive(Debug, Error)]
pub enum JobError {
    /// A malformed job specification; fatal, never retried.
    #[error("invalid job specification: {0}")]
    Validation(String),
    /// A programming-contract violation (wrong kind/mode combination,
    /// inverted instants); fatal, never retried.
    #[error("job contract violated: {message}")]
    Contract {
        /// Description of the violated contract.
        message: String,
    },
    /// A transport or backend failure while submitting or while the job was
    /// executing. The wrapped cause is carried for diagnostics only.
    #[error("job submission failed: {message}")]
    Submission {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying cause, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// Polling exceeded its deadline without a definitive result; the job's
    /// true state is unknown.
    #[error("timed out after {timeout:?} waiting for job {job_id}")]
    Timeout {
        /// Identifier of the job being waited on.
        job_id: JobId,
        /// Deadline that elapsed.
        timeout: Duration,
    },
}

impl JobError {
    /// Wraps an underlying failure as a submission error. The cause's type
    /// never crosses the engine boundary; it travels only as a source for
    /// diagnostics.
    #[must_use]
    pub fn submission(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Submission {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a submission error with no underlying cause.
    #[must_use]
    pub fn submission_message(message: impl Into<String>) -> Self {
        Self::Submission {
            message: message.into(),
            source: None,
        }
    }
}

/// Submits jobs and resolves their completion.
///
/// The executor owns the polling configuration and the base property set;
/// both are explicit values passed at construction rather than process-wide
/// state.
#[derive(Debug)]
pub struct JobExecutor<B, C = SystemClock> {
    backend: B,
    retry: RetryPolicy,
    default_properties: BTreeMap<String, String>,
    clock: C,
}

impl<B: JobBackend> JobExecutor<B> {
    /// Creates an executor polling on the wall clock.
    #[must_use]
    pub const fn new(backend: B, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            default_properties: BTreeMap::new(),
            clock: SystemClock,
        }
    }
}

impl<B, C> JobExecutor<B, C>
where
    B: JobBackend,
    C: Clock,
{
    /// Replaces the clock used by the polling protocol.
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> JobExecutor<B, C2> {
        JobExecutor {
            backend: self.backend,
            retry: self.retry,
            default_properties: self.default_properties,
            clock,
        }
    }

    /// Sets the base properties merged under every job's own properties.
    #[must_use]
    pub fn with_default_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.default_properties = properties;
        self
    }

    /// Returns the backend driving this executor.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Submits a job and resolves its timing.
    ///
    /// Caller properties are merged over the executor defaults (caller
    /// winning on collision) before the spec reaches the backend. A
    /// synchronous backend resolves the result directly; a queued
    /// submission is driven through [`JobExecutor::wait_for_job`] using the
    /// spec's poll interval when one is set.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Submission`] when the backend or its transport
    /// fails, [`JobError::Timeout`] when a queued job outlives the wait
    /// deadline, or a contract/validation error for misuse.
    pub async fn submit(&self, spec: &JobSpec) -> Result<JobResult, JobError> {
        let effective = self.effective_spec(spec);
        info!(kind = effective.kind.name(), "submitting job");
        match self.backend.submit_job(&effective).await? {
            Submission::Completed(result) => Ok(result),
            Submission::Queued(job_id) => {
                let poll_interval = effective
                    .poll_interval
                    .unwrap_or_else(|| self.retry.poll_interval());
                self.wait_for_job(&job_id, self.retry.timeout(), poll_interval)
                    .await
            }
        }
    }

    /// Polls a queued job until it finishes or `timeout` elapses.
    ///
    /// "Not yet finished" is consumed inside the loop and never surfaced; a
    /// backend-reported job failure resolves to [`JobError::Submission`],
    /// never a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Timeout`] when the deadline passes first, or the
    /// backend's own [`JobError`] when the job resolves to a failure.
    pub async fn wait_for_job(
        &self,
        job_id: &JobId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<JobResult, JobError> {
        let policy = RetryPolicy::new(timeout, poll_interval).with_jitter(self.retry.jitter());
        let outcome = policy
            .run_with_clock(&self.clock, || async {
                match self.backend.completed_job(job_id).await? {
                    JobPoll::Finished(result) => Ok(Probe::Done(result)),
                    JobPoll::Pending => Ok(Probe::Pending),
                }
            })
            .await;

        match outcome {
            Ok(result) => {
                info!(%job_id, wall_time_secs = result.wall_time().as_secs(), "job finished");
                Ok(result)
            }
            Err(RetryError::TimedOut { .. }) => Err(JobError::Timeout {
                job_id: job_id.clone(),
                timeout,
            }),
            Err(RetryError::Failed(err)) => Err(err),
        }
    }

    /// Copies data between filesystems with a distributed job on the
    /// service, fixing the job shape to the Hadoop bulk-copy utility with
    /// `source` and `destination` as positional arguments.
    ///
    /// # Errors
    ///
    /// Same contract as [`JobExecutor::submit`].
    pub async fn distributed_copy(
        &self,
        source: &str,
        destination: &str,
        properties: BTreeMap<String, String>,
    ) -> Result<JobResult, JobError> {
        let spec = JobSpec::builder(JobKind::Hadoop {
            jarfile: None,
            classname: Some(DISTCP_CLASSNAME.to_owned()),
        })
        .argument(source)
        .argument(destination)
        .properties(properties)
        .build()?;
        self.submit(&spec).await
    }

    fn effective_spec(&self, spec: &JobSpec) -> JobSpec {
        let mut merged = self.default_properties.clone();
        merged.extend(spec.properties.clone());
        let mut effective = spec.clone();
        effective.properties = merged;
        effective
    }
}
