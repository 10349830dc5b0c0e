//! Parser for the raw (`am instrument -r`) instrumentation stream.
//!
//! The stream is a sequence of status bundles, each a run of
//! `INSTRUMENTATION_STATUS: key=value` lines closed by
//! `INSTRUMENTATION_STATUS_CODE: n`, followed by a result bundle closed by
//! `INSTRUMENTATION_CODE: n`. Values may span several lines; any line that
//! does not start with a known prefix continues the previous value.
//!
//! Bundles carrying an `event` key are procedure events encoded as JSON.
//! Bundles carrying `class` and `test` keys report test progress.

use crate::event::Event;
use hostside_constants::instrumentation as raw;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Final status of one test method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Finished without failures.
    Passed,
    /// Assertion failure or unexpected exception.
    Failed,
    /// Not run.
    Ignored,
    /// An assumption did not hold; counts as skipped.
    AssumptionFailure,
    /// Started but never reported back, usually a crash.
    Incomplete,
}

impl TestStatus {
    fn from_code(code: i32) -> Option<Self> {
        match code {
            raw::CODE_OK => Some(Self::Passed),
            raw::CODE_ERROR | raw::CODE_FAILURE => Some(Self::Failed),
            raw::CODE_IGNORED => Some(Self::Ignored),
            raw::CODE_ASSUMPTION_FAILURE => Some(Self::AssumptionFailure),
            _ => None,
        }
    }

    /// Returns true if the test counts against the procedure.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Incomplete)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Ignored => write!(f, "ignored"),
            Self::AssumptionFailure => write!(f, "assumption failure"),
            Self::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// Outcome of one test method inside a procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Fully qualified test class.
    pub class: String,
    /// Test method.
    pub method: String,
    /// Final status.
    pub status: TestStatus,
    /// Stack trace for failed tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl TestOutcome {
    /// `Class#method`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}#{}", self.class, self.method)
    }

    /// First line of the stack trace, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.stack.as_deref().and_then(|s| s.lines().next())
    }
}

/// Everything parsed out of one instrumentation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationOutput {
    /// Tests in the order they finished.
    pub tests: Vec<TestOutcome>,
    /// Events in the order they were emitted.
    pub events: Vec<Event>,
    /// `INSTRUMENTATION_RESULT` entries.
    pub result: BTreeMap<String, String>,
    /// `INSTRUMENTATION_CODE`, if the run terminated normally.
    pub code: Option<i32>,
    /// `INSTRUMENTATION_FAILED` detail, if the run could not start.
    pub failed: Option<String>,
}

impl InstrumentationOutput {
    /// Short message of a run that aborted, e.g. `Process crashed.`.
    #[must_use]
    pub fn short_message(&self) -> Option<&str> {
        self.result.get(raw::KEY_SHORT_MSG).map(String::as_str)
    }
}

enum Target {
    Status(String),
    Result(String),
}

/// Parses a complete raw instrumentation stream.
///
/// # Errors
///
/// Returns a description of the problem if the stream has no terminator or
/// an event payload is not valid JSON.
pub fn parse(output: &str) -> Result<InstrumentationOutput, String> {
    let mut parsed = InstrumentationOutput::default();
    let mut bundle: BTreeMap<String, String> = BTreeMap::new();
    let mut target: Option<Target> = None;
    let mut pending: Option<(String, String)> = None;

    for line in output.lines().map(|l| l.trim_end_matches('\r')) {
        if let Some(rest) = line.strip_prefix(raw::STATUS) {
            let (key, value) = split_pair(rest);
            bundle.insert(key.clone(), value);
            target = Some(Target::Status(key));
        } else if let Some(rest) = line.strip_prefix(raw::STATUS_CODE) {
            let code: i32 = rest
                .trim()
                .parse()
                .map_err(|_| format!("bad status code: {rest}"))?;
            close_bundle(&mut parsed, std::mem::take(&mut bundle), code, &mut pending)?;
            target = None;
        } else if let Some(rest) = line.strip_prefix(raw::RESULT) {
            let (key, value) = split_pair(rest);
            parsed.result.insert(key.clone(), value);
            target = Some(Target::Result(key));
        } else if let Some(rest) = line.strip_prefix(raw::CODE) {
            let code = rest
                .trim()
                .parse()
                .map_err(|_| format!("bad result code: {rest}"))?;
            parsed.code = Some(code);
            target = None;
        } else if let Some(pos) = line.find(raw::FAILED) {
            parsed.failed = Some(line[pos + raw::FAILED.len()..].trim().to_string());
            target = None;
        } else {
            let value = match &target {
                Some(Target::Status(key)) => bundle.get_mut(key),
                Some(Target::Result(key)) => parsed.result.get_mut(key),
                None => None,
            };
            if let Some(value) = value {
                value.push('\n');
                value.push_str(line);
            }
        }
    }

    if let Some((class, method)) = pending {
        parsed.tests.push(TestOutcome {
            class,
            method,
            status: TestStatus::Incomplete,
            stack: None,
        });
    }

    if parsed.code.is_none() && parsed.failed.is_none() {
        return Err(format!("missing {} terminator", raw::CODE.trim_end_matches(": ")));
    }
    Ok(parsed)
}

fn split_pair(rest: &str) -> (String, String) {
    match rest.split_once('=') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (rest.to_string(), String::new()),
    }
}

fn close_bundle(
    parsed: &mut InstrumentationOutput,
    mut bundle: BTreeMap<String, String>,
    code: i32,
    pending: &mut Option<(String, String)>,
) -> Result<(), String> {
    if let Some(json) = bundle.remove(raw::KEY_EVENT) {
        let event =
            Event::from_json(json.trim()).map_err(|e| format!("bad event payload {json}: {e}"))?;
        parsed.events.push(event);
        return Ok(());
    }

    let (Some(class), Some(method)) = (bundle.remove(raw::KEY_CLASS), bundle.remove(raw::KEY_TEST))
    else {
        return Ok(());
    };

    if code == raw::CODE_START {
        *pending = Some((class, method));
        return Ok(());
    }

    if let Some(status) = TestStatus::from_code(code) {
        if pending.as_ref().is_some_and(|(c, m)| *c == class && *m == method) {
            *pending = None;
        }
        parsed.tests.push(TestOutcome {
            class,
            method,
            status,
            stack: bundle
                .remove(raw::KEY_STACK)
                .filter(|_| status.is_failure()),
        });
    }
    Ok(())
}
