//! Test support utilities shared across unit and integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::retry::{Clock, SleepFuture};
use crate::transport::{CommandOutput, Transport, TransportError};

/// Scripted transport that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without reaching any host.
/// Interior state sits behind `Arc<Mutex>` so the transport stays usable
/// from the `Send` futures backends return.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<Result<CommandOutput, TransportError>>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    /// Creates a transport with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every command executed so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queues a successful, empty-output response.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Queues a response with the given exit code and streams.
    pub fn push_output(&self, code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(CommandOutput {
                code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            }));
    }

    /// Queues a transport-level dispatch failure.
    pub fn push_spawn_failure(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(TransportError::Spawn {
                program: String::from("scripted"),
                message: message.into(),
            }));
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, command: &str) -> Result<CommandOutput, TransportError> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_owned());
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Spawn {
                    program: String::from("scripted"),
                    message: String::from("no scripted response available"),
                })
            })
    }
}

/// Deterministic [`Clock`] whose `sleep` advances time instantly.
///
/// Lets polling tests assert on elapsed virtual time without waiting.
#[derive(Clone, Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Creates a clock anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Returns the virtual time slept so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset = offset.saturating_add(duration);
        drop(offset);
        Box::pin(std::future::ready(()))
    }
}
