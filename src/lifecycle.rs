//! Backend process lifecycle
//!
//! Probes local backends (Home Assistant, Ollama) for liveness and launches
//! them as subprocesses when they are down, polling until they answer.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Per-probe request timeout
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay between liveness probes while waiting for startup
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Overall startup wait before giving up
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Something that can report whether a backend is answering
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Return true when the backend answers; never errors
    async fn is_live(&self) -> bool;
}

/// HTTP GET probe that treats a 200 response as live
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a probe for `url` with the default two second timeout
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Override the per-probe timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn is_live(&self) -> bool {
        match self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::trace!(url = %self.url, error = %e, "liveness probe failed");
                false
            }
        }
    }
}

/// Outcome of [`BackendSupervisor::ensure_running`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The first probe succeeded, nothing was launched
    AlreadyRunning,
    /// The backend came up after waiting
    Started {
        /// Total probes issued, including the initial one
        probes: u32,
        /// Time spent waiting
        elapsed: Duration,
    },
}

/// Command used to launch a backend process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
}

impl LaunchCommand {
    /// Build from an argv-style list; `None` when empty
    #[must_use]
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Spawn the process detached from our stdio
    ///
    /// # Errors
    ///
    /// Returns error if the program is not on `PATH` or fails to spawn
    pub fn spawn(&self) -> Result<()> {
        let path = which::which(&self.program).map_err(|e| {
            Error::Config(format!("cannot launch {}: {e}", self.program))
        })?;

        tokio::process::Command::new(&path)
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| Error::Config(format!("failed to spawn {}: {e}", path.display())))?;

        tracing::info!(program = %path.display(), args = ?self.args, "launched backend process");
        Ok(())
    }
}

/// Keeps one backend alive, allowing a single start attempt at a time
pub struct BackendSupervisor {
    name: String,
    launch: Option<LaunchCommand>,
    poll_interval: Duration,
    startup_timeout: Duration,
    in_flight: Mutex<()>,
}

impl BackendSupervisor {
    /// Create a supervisor with the default 2s/60s polling policy
    #[must_use]
    pub fn new(name: impl Into<String>, launch: Option<LaunchCommand>) -> Self {
        Self {
            name: name.into(),
            launch,
            poll_interval: POLL_INTERVAL,
            startup_timeout: STARTUP_TIMEOUT,
            in_flight: Mutex::new(()),
        }
    }

    /// Override the polling policy
    #[must_use]
    pub const fn with_polling(mut self, poll_interval: Duration, startup_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.startup_timeout = startup_timeout;
        self
    }

    /// Backend name used in logs and errors
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make sure the backend answers, launching it if necessary
    ///
    /// Concurrent callers wait for the in-flight attempt instead of
    /// launching a second process.
    ///
    /// # Errors
    ///
    /// Returns `StartupTimeout` if the backend never answers, or a config
    /// error if the launch command cannot be spawned
    pub async fn ensure_running<P: LivenessProbe + ?Sized>(&self, probe: &P) -> Result<Readiness> {
        let _guard = self.in_flight.lock().await;

        if probe.is_live().await {
            tracing::debug!(backend = %self.name, "backend already live");
            return Ok(Readiness::AlreadyRunning);
        }

        match &self.launch {
            Some(cmd) => {
                tracing::info!(backend = %self.name, program = cmd.program(), "backend not running, starting it");
                cmd.spawn()?;
            }
            None => {
                tracing::info!(backend = %self.name, "backend not running, waiting for it");
            }
        }

        self.wait_until_live(probe, 1).await
    }

    /// Poll until live or the startup timeout elapses
    async fn wait_until_live<P: LivenessProbe + ?Sized>(
        &self,
        probe: &P,
        probes_so_far: u32,
    ) -> Result<Readiness> {
        let start = Instant::now();
        let mut probes = probes_so_far;

        loop {
            probes += 1;
            if probe.is_live().await {
                let elapsed = start.elapsed();
                tracing::info!(backend = %self.name, probes, ?elapsed, "backend is live");
                return Ok(Readiness::Started { probes, elapsed });
            }

            if start.elapsed() >= self.startup_timeout {
                tracing::error!(backend = %self.name, probes, "backend did not start in time");
                return Err(Error::StartupTimeout(format!(
                    "{} did not start within {}s",
                    self.name,
                    self.startup_timeout.as_secs()
                )));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Fails the first `failures` probes, then succeeds
    struct FlakyProbe {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LivenessProbe for FlakyProbe {
        async fn is_live(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) >= self.failures
        }
    }

    #[tokio::test]
    async fn already_live_backend_is_not_launched() {
        let probe = FlakyProbe {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        let supervisor = BackendSupervisor::new("test", None);

        let readiness = supervisor.ensure_running(&probe).await.unwrap();
        assert_eq!(readiness, Readiness::AlreadyRunning);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn never_live_backend_times_out() {
        let probe = FlakyProbe {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let supervisor = BackendSupervisor::new("test", None)
            .with_polling(Duration::from_millis(10), Duration::from_millis(50));

        let err = supervisor.ensure_running(&probe).await.unwrap_err();
        assert!(matches!(err, Error::StartupTimeout(_)));
    }

    #[test]
    fn launch_command_from_argv() {
        assert!(LaunchCommand::from_argv(&[]).is_none());

        let cmd = LaunchCommand::from_argv(&["ollama".to_string(), "serve".to_string()]).unwrap();
        assert_eq!(cmd.program(), "ollama");
    }

    #[test]
    fn missing_program_is_a_config_error() {
        let cmd = LaunchCommand::from_argv(&["definitely-not-a-real-binary-xyz".to_string()]).unwrap();
        assert!(matches!(cmd.spawn(), Err(Error::Config(_))));
    }
}
