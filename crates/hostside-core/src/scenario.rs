//! Scenario driver: capability gating, body execution and unconditional
//! teardown.
//!
//! A scenario gets every collaborator through [`ScenarioEnv`]; there is no
//! global device state. Whatever the body does, including returning early or
//! panicking, the environment is torn down before the report is produced:
//! settings are restored, packages uninstalled, then contexts removed.

use crate::assertion::EventAssertion;
use crate::channel::CommandChannel;
use crate::config::Config;
use crate::context::UserContextManager;
use crate::device::{Capability, Device};
use crate::error::HostError;
use crate::provision::PackageProvisioner;
use crate::runner::RemoteTestRunner;
use crate::settings::Settings;
use futures::FutureExt;
use futures::future::BoxFuture;
use hostside_error::CommonError;
use serde::Serialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Instrument;

/// Collaborators available to a scenario body.
pub struct ScenarioEnv {
    /// Device-wide queries.
    pub device: Device,
    /// Users and profiles.
    pub contexts: UserContextManager,
    /// Package installs.
    pub packages: PackageProvisioner,
    /// Procedure execution.
    pub runner: RemoteTestRunner,
    /// Settings with restore.
    pub settings: Settings,
}

impl ScenarioEnv {
    /// Builds an environment talking to the target through `channel`.
    pub fn new(channel: Arc<dyn CommandChannel>, config: &Config) -> Self {
        Self {
            device: Device::new(Arc::clone(&channel)),
            contexts: UserContextManager::new(Arc::clone(&channel)),
            packages: PackageProvisioner::new(
                Arc::clone(&channel),
                config.device.remote_tmp_dir.clone(),
            ),
            runner: RemoteTestRunner::from_config(Arc::clone(&channel), config),
            settings: Settings::new(channel),
        }
    }

    /// Event assertions over this environment's runner.
    pub fn events(&self) -> EventAssertion<'_> {
        EventAssertion::new(&self.runner)
    }

    /// Releases everything the scenario acquired. Safe to call repeatedly.
    pub async fn teardown(&mut self) {
        self.settings.restore_all().await;
        self.packages.uninstall_all().await;
        self.contexts.remove_all().await;
    }
}

/// How a scenario body ended.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The body found the target unsuitable and gave up without failing.
    #[error("skipped: {0}")]
    Skipped(String),

    /// A host operation failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// A check in the body did not hold.
    #[error("{0}")]
    Assertion(String),
}

impl ScenarioError {
    /// Creates an explicit skip.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    /// Creates an assertion failure.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
}

impl From<CommonError> for ScenarioError {
    fn from(err: CommonError) -> Self {
        Self::Host(HostError::Common(err))
    }
}

/// Result of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum ScenarioOutcome {
    /// The body completed.
    Passed,
    /// The body returned an error or panicked.
    Failed(String),
    /// A requirement was not met; the body may not have run.
    Skipped(String),
}

impl ScenarioOutcome {
    /// Returns true if the scenario passed.
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Returns true if the scenario failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true if the scenario was skipped.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

impl fmt::Display for ScenarioOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "PASSED"),
            Self::Failed(reason) => write!(f, "FAILED: {reason}"),
            Self::Skipped(reason) => write!(f, "SKIPPED: {reason}"),
        }
    }
}

/// Summary of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: String,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: ScenarioOutcome,
    /// Wall time including teardown.
    pub duration: Duration,
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({:.1}s)",
            self.name,
            self.outcome,
            self.duration.as_secs_f64()
        )
    }
}

/// A named scenario with capability requirements.
///
/// ```ignore
/// let report = Scenario::new("secondary user metrics")
///     .require(Capability::MultipleUsers)
///     .run(&mut env, |env| Box::pin(async move {
///         let mut user = env.contexts.create(ContextKind::Secondary).await?;
///         env.contexts.start(&mut user).await?;
///         Ok(())
///     }))
///     .await;
/// ```
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    requirements: Vec<Capability>,
}

impl Scenario {
    /// Creates a scenario with no requirements.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirements: Vec::new(),
        }
    }

    /// Adds a capability the target must provide for the body to run.
    #[must_use]
    pub fn require(mut self, capability: Capability) -> Self {
        self.requirements.push(capability);
        self
    }

    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks requirements, runs `body`, tears `env` down and reports.
    pub async fn run<F>(self, env: &mut ScenarioEnv, body: F) -> ScenarioReport
    where
        F: for<'e> FnOnce(&'e mut ScenarioEnv) -> BoxFuture<'e, Result<(), ScenarioError>>,
    {
        let span = tracing::info_span!("scenario", name = %self.name);
        let started = Instant::now();
        let outcome = self.execute(env, body).instrument(span.clone()).await;
        env.teardown().instrument(span.clone()).await;

        let report = ScenarioReport {
            name: self.name,
            outcome,
            duration: started.elapsed(),
        };
        span.in_scope(|| tracing::info!(outcome = %report.outcome, "scenario finished"));
        report
    }

    async fn execute<F>(&self, env: &mut ScenarioEnv, body: F) -> ScenarioOutcome
    where
        F: for<'e> FnOnce(&'e mut ScenarioEnv) -> BoxFuture<'e, Result<(), ScenarioError>>,
    {
        for capability in &self.requirements {
            match env.device.supports(capability).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(%capability, "requirement not met, skipping");
                    return ScenarioOutcome::Skipped(format!("target lacks {capability}"));
                }
                Err(e) => {
                    return ScenarioOutcome::Failed(format!("checking {capability}: {e}"));
                }
            }
        }

        match AssertUnwindSafe(body(env)).catch_unwind().await {
            Ok(Ok(())) => ScenarioOutcome::Passed,
            Ok(Err(ScenarioError::Skipped(reason))) => ScenarioOutcome::Skipped(reason),
            Ok(Err(e)) => ScenarioOutcome::Failed(e.to_string()),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ScenarioOutcome::Failed(format!("panicked: {msg}"))
            }
        }
    }
}
