//! Running instrumentation procedures inside a user.

use crate::channel::{CommandChannel, shell_quote};
use crate::config::Config;
use crate::context::ExecutionContext;
use crate::error::{HostError, Result};
use crate::event::Event;
use crate::instrumentation::{self, InstrumentationOutput};
use hostside_constants::instrumentation as raw;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

pub use crate::instrumentation::{TestOutcome, TestStatus};

/// A request to run one procedure (a test class or a single test method)
/// inside an execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureInvocation {
    package: String,
    class: String,
    method: Option<String>,
    context: ExecutionContext,
    params: Vec<(String, String)>,
    runner: Option<String>,
}

impl ProcedureInvocation {
    /// Creates an invocation of `class` from `package`, running in `context`.
    ///
    /// A class starting with `.` is relative to the package. The invocation
    /// follows the context's state, so it stops being runnable once the
    /// context is removed.
    pub fn new(package: impl Into<String>, class: impl AsRef<str>, context: &ExecutionContext) -> Self {
        let package = package.into();
        let class = class.as_ref();
        let class = if class.starts_with('.') {
            format!("{package}{class}")
        } else {
            class.to_string()
        };
        Self {
            package,
            class,
            method: None,
            context: context.clone(),
            params: Vec::new(),
            runner: None,
        }
    }

    /// Restricts the run to a single test method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Adds an instrumentation argument. Setting a name twice keeps the
    /// original position and replaces the value.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Overrides the instrumentation runner class.
    #[must_use]
    pub fn runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = Some(runner.into());
        self
    }

    /// Package hosting the procedure.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Fully qualified test class.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Target context.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Instrumentation arguments in insertion order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// `Class` or `Class#method`.
    pub fn target(&self) -> String {
        match &self.method {
            Some(method) => format!("{}#{method}", self.class),
            None => self.class.clone(),
        }
    }

    /// `package/Class#method`, for messages.
    pub fn name(&self) -> String {
        format!("{}/{}", self.package, self.target())
    }

    fn component(&self, default_runner: &str) -> String {
        format!(
            "{}/{}",
            self.package,
            self.runner.as_deref().unwrap_or(default_runner)
        )
    }

    fn command(&self, default_runner: &str) -> String {
        let mut command = format!(
            "am instrument -w -r --user {} -e class {}",
            self.context.id,
            shell_quote(&self.target())
        );
        for (name, value) in &self.params {
            command.push_str(" -e ");
            command.push_str(&shell_quote(name));
            command.push(' ');
            command.push_str(&shell_quote(value));
        }
        command.push(' ');
        command.push_str(&shell_quote(&self.component(default_runner)));
        command
    }
}

/// Result of a procedure that ran to completion.
///
/// A failed procedure is a value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureResult {
    /// True if every test passed (or was skipped) and the run was not aborted.
    pub passed: bool,
    /// Why the procedure failed.
    pub failure: Option<String>,
    /// Events in emission order.
    pub events: Vec<Event>,
    /// Per-test outcomes.
    pub tests: Vec<TestOutcome>,
}

impl ProcedureResult {
    /// Builds a result from a parsed stream.
    ///
    /// A run that reports no tests at all is a failure: the class or method
    /// name did not match anything.
    pub fn from_output(output: InstrumentationOutput) -> Self {
        let failure = if let Some(component) = &output.failed {
            Some(format!("instrumentation failed to start: {component}"))
        } else if let Some(msg) = output.short_message() {
            Some(msg.to_string())
        } else if let Some(test) = output.tests.iter().find(|t| t.status.is_failure()) {
            Some(match test.message() {
                Some(msg) => format!("{}: {msg}", test.name()),
                None => format!("{} {}", test.name(), test.status),
            })
        } else if output.tests.is_empty() {
            Some("no tests ran".to_string())
        } else {
            None
        };

        Self {
            passed: failure.is_none(),
            failure,
            events: output.events,
            tests: output.tests,
        }
    }

    /// Tests that failed or did not finish.
    pub fn failed_tests(&self) -> impl Iterator<Item = &TestOutcome> {
        self.tests.iter().filter(|t| t.status.is_failure())
    }
}

/// Executes procedures through `am instrument`.
pub struct RemoteTestRunner {
    channel: Arc<dyn CommandChannel>,
    runner: String,
    timeout: Duration,
}

impl RemoteTestRunner {
    /// Creates a runner using `runner` as the default instrumentation class.
    pub fn new(channel: Arc<dyn CommandChannel>, runner: impl Into<String>, timeout: Duration) -> Self {
        Self {
            channel,
            runner: runner.into(),
            timeout,
        }
    }

    /// Creates a runner from configuration.
    pub fn from_config(channel: Arc<dyn CommandChannel>, config: &Config) -> Self {
        Self::new(
            channel,
            config.instrumentation.runner.clone(),
            config.instrumentation.timeout(),
        )
    }

    /// Runs a procedure and collects its result and events.
    ///
    /// # Errors
    ///
    /// - [`HostError::ContextNotReady`] if the context is not started; nothing
    ///   is sent to the device.
    /// - [`HostError::ProcedureNotFound`] if the instrumentation is not
    ///   installed for that user.
    /// - [`HostError::MalformedOutput`] if the stream cannot be parsed.
    /// - [`HostError::Transport`] from the channel.
    pub async fn run(&self, invocation: &ProcedureInvocation) -> Result<ProcedureResult> {
        let context = invocation.context();
        if !context.is_started() {
            return Err(HostError::ContextNotReady {
                user_id: context.id,
                state: context.state(),
            });
        }

        let span = tracing::info_span!("procedure", name = %invocation.name(), user_id = context.id);
        async {
            let command = invocation.command(&self.runner);
            tracing::debug!(%command, "running procedure");
            let output = self
                .channel
                .execute_with_timeout(&command, self.timeout)
                .await?;

            if output.contains(raw::NOT_FOUND) {
                return Err(HostError::ProcedureNotFound(invocation.component(&self.runner)));
            }

            let parsed = instrumentation::parse(&output)
                .map_err(|detail| HostError::malformed(&command, detail))?;
            let result = ProcedureResult::from_output(parsed);

            if result.passed {
                tracing::info!(tests = result.tests.len(), events = result.events.len(), "procedure passed");
            } else {
                tracing::info!(
                    failure = result.failure.as_deref().unwrap_or_default(),
                    "procedure failed"
                );
            }
            Ok(result)
        }
        .instrument(span)
        .await
    }
}
