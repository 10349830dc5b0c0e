//! Host-side orchestration core for device test scenarios.
//!
//! `hostside-core` drives a remote Android device through a [`CommandChannel`]:
//!
//! - [`UserContextManager`] creates, starts and removes users and profiles
//! - [`PackageProvisioner`] installs test packages into a single user
//! - [`RemoteTestRunner`] runs instrumentation procedures inside a user
//! - [`EventAssertion`] checks the structured events a procedure emitted
//! - [`Scenario`] ties them together with unconditional teardown and an
//!   explicit pass/fail/skip outcome
//!
//! Every remote call is awaited in order; nothing here runs two commands
//! against the same device at once.

pub mod assertion;
pub mod channel;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod event;
pub mod instrumentation;
pub mod provision;
pub mod runner;
pub mod scenario;
pub mod settings;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use assertion::EventAssertion;
pub use channel::{AdbChannel, CommandChannel};
pub use config::Config;
pub use context::{ContextKind, ContextState, ExecutionContext, UserContextManager, UserInfo};
pub use device::{Capability, Device, ScreenSize};
pub use error::{HostError, Result};
pub use event::{Event, EventDiff, EventValue, ExpectedEventSet};
pub use provision::{Artifact, PackageHandle, PackageProvisioner};
pub use runner::{ProcedureInvocation, ProcedureResult, RemoteTestRunner, TestOutcome, TestStatus};
pub use scenario::{Scenario, ScenarioEnv, ScenarioError, ScenarioOutcome, ScenarioReport};
pub use settings::{Namespace, Settings};
