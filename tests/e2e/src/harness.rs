//! Test harness for managing the scenario environment.
//!
//! The harness manages:
//! - The target, either a scripted [`FakeDevice`] or a live adb device
//! - The [`ScenarioEnv`] scenarios run against
//! - Staged artifacts for fake targets
//! - Last-resort cleanup of users and packages left behind

use crate::fixtures::TestFixtures;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use hostside_constants::env;
use hostside_core::testing::FakeDevice;
use hostside_core::{
    AdbChannel, CommandChannel, Config, Device, Scenario, ScenarioEnv, ScenarioError,
    ScenarioReport,
};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Test configuration.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Serial of the live device; `None` lets adb pick.
    pub serial: Option<String>,
    /// Path to the adb binary.
    pub adb_binary: PathBuf,
    /// Timeout for a single shell command.
    pub command_timeout: Duration,
    /// Timeout for one instrumentation run.
    pub instrumentation_timeout: Duration,
    /// Enable verbose logging.
    pub verbose: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        let serial = std::env::var(env::DEVICE_SERIAL)
            .or_else(|_| std::env::var("ANDROID_SERIAL"))
            .ok();
        let adb_binary = std::env::var_os(env::ADB_BINARY).map_or_else(|| "adb".into(), PathBuf::from);

        Self {
            serial,
            adb_binary,
            command_timeout: Duration::from_secs(60),
            instrumentation_timeout: Duration::from_secs(600),
            verbose: std::env::var(env::VERBOSE).is_ok(),
        }
    }
}

impl TestConfig {
    /// Builds the core configuration for this target.
    pub fn to_config(&self, fixtures: &TestFixtures) -> Config {
        let mut config = Config::default();
        config.device.serial.clone_from(&self.serial);
        config.device.adb_binary.clone_from(&self.adb_binary);
        config.device.command_timeout_secs = self.command_timeout.as_secs();
        config.instrumentation.timeout_secs = self.instrumentation_timeout.as_secs();
        config.artifacts.dir = fixtures.artifact_dir().to_path_buf();
        config
    }

    /// Returns true if adb reports the target as an attached device.
    pub fn device_available(&self) -> bool {
        self.adb(&["get-state"])
            .output()
            .is_ok_and(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "device")
    }

    fn adb(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.adb_binary);
        if let Some(ref serial) = self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null());
        cmd
    }
}

/// Installs a test log writer. Later calls are no-ops.
pub fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hostside_core={level},hostside_e2e={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Returns true (and says why) if no live device is attached.
pub fn skip_if_no_device(config: &TestConfig) -> bool {
    if !config.device_available() {
        eprintln!(
            "Skipping test: no device attached (set {} or ANDROID_SERIAL)",
            env::DEVICE_SERIAL
        );
        return true;
    }
    let check = TestFixtures::from_env().check_artifacts();
    if !check.all_ready() {
        eprintln!("Skipping test: missing artifacts: {:?}", check.missing());
        return true;
    }
    false
}

enum Target {
    Fake(FakeDevice),
    Live,
}

/// Test harness for scenario tests.
///
/// Scenarios tear themselves down; the harness only steps in on drop for
/// users and packages acquired outside a scenario run.
pub struct TestHarness {
    /// Test configuration.
    pub config: TestConfig,
    /// Artifacts for this run.
    pub fixtures: TestFixtures,
    /// Environment scenarios run against.
    pub env: ScenarioEnv,
    target: Target,
    /// Staged placeholder artifacts (fake targets only).
    staging: Option<TempDir>,
    run_id: String,
    skip_cleanup: bool,
}

impl TestHarness {
    /// Creates a harness over `device`, with placeholder artifacts staged
    /// in a temporary directory.
    pub fn fake(device: FakeDevice) -> Result<Self> {
        let config = TestConfig::default();
        init_tracing(config.verbose);

        let staging = TempDir::new().context("failed to create staging directory")?;
        let fixtures = TestFixtures::new(staging.path());
        fixtures
            .stage_placeholders()
            .context("failed to stage placeholder artifacts")?;

        let channel: Arc<dyn CommandChannel> = Arc::new(device.clone());
        let env = ScenarioEnv::new(channel, &config.to_config(&fixtures));
        Ok(Self::assemble(config, fixtures, env, Target::Fake(device), Some(staging)))
    }

    /// Creates a harness over the attached device, reading artifacts from
    /// the environment.
    pub async fn live(config: TestConfig) -> Result<Self> {
        init_tracing(config.verbose);

        let fixtures = TestFixtures::from_env();
        let check = fixtures.check_artifacts();
        if !check.all_ready() {
            anyhow::bail!(
                "missing artifacts in {}: {:?}",
                fixtures.artifact_dir().display(),
                check.missing()
            );
        }

        let core = config.to_config(&fixtures);
        let channel: Arc<dyn CommandChannel> = Arc::new(AdbChannel::from_config(&core.device));
        let api_level = Device::new(Arc::clone(&channel))
            .api_level()
            .await
            .context("device did not answer")?;
        tracing::info!(api_level, serial = ?config.serial, "connected to device");

        let env = ScenarioEnv::new(channel, &core);
        Ok(Self::assemble(config, fixtures, env, Target::Live, None))
    }

    fn assemble(
        config: TestConfig,
        fixtures: TestFixtures,
        env: ScenarioEnv,
        target: Target,
        staging: Option<TempDir>,
    ) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            config,
            fixtures,
            env,
            target,
            staging,
            run_id,
            skip_cleanup: false,
        }
    }

    /// Returns the fake target, if this harness runs against one.
    pub fn fake_device(&self) -> Option<&FakeDevice> {
        match &self.target {
            Target::Fake(device) => Some(device),
            Target::Live => None,
        }
    }

    /// Short id tagging this harness in logs.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Runs `scenario` against this harness's environment.
    pub async fn run<F>(&mut self, scenario: Scenario, body: F) -> ScenarioReport
    where
        F: for<'e> FnOnce(&'e mut ScenarioEnv) -> BoxFuture<'e, Result<(), ScenarioError>>,
    {
        let report = scenario.run(&mut self.env, body).await;
        if self.config.verbose {
            eprintln!("[{}] {report}", self.run_id);
        }
        report
    }

    /// Releases everything acquired through [`env`](Self::env).
    pub async fn cleanup(&mut self) {
        self.env.teardown().await;
    }

    /// Leaves users, packages and staged artifacts in place on drop (useful
    /// for debugging failed tests).
    pub fn skip_cleanup(&mut self) {
        self.skip_cleanup = true;
    }

    fn remove_leftovers(&self) {
        for handle in self.env.packages.installed() {
            let user = handle.user_id.to_string();
            let _ = self
                .config
                .adb(&["shell", "pm", "uninstall", "--user", &user, &handle.package])
                .output();
        }
        for id in self.env.contexts.live_ids() {
            let _ = self.config.adb(&["shell", "pm", "remove-user", &id.to_string()]).output();
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        let users = self.env.contexts.live_ids();
        let packages = self.env.packages.installed().len();

        if self.skip_cleanup {
            tracing::warn!(run_id = %self.run_id, ?users, packages, "skipping cleanup");
            if let Some(staging) = self.staging.take() {
                tracing::warn!("staged artifacts kept in {}", staging.path().display());
                std::mem::forget(staging);
            }
            return;
        }

        if users.is_empty() && packages == 0 {
            return;
        }
        tracing::warn!(run_id = %self.run_id, ?users, packages, "harness dropped with leftovers");
        if matches!(self.target, Target::Live) {
            self.remove_leftovers();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_maps_to_core_config() {
        let config = TestConfig {
            serial: Some("emulator-5554".to_string()),
            adb_binary: PathBuf::from("/opt/sdk/adb"),
            command_timeout: Duration::from_secs(5),
            instrumentation_timeout: Duration::from_secs(30),
            verbose: false,
        };
        let fixtures = TestFixtures::new("/tmp/apks");
        let core = config.to_config(&fixtures);
        assert_eq!(core.device.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(core.device.command_timeout_secs, 5);
        assert_eq!(core.instrumentation.timeout_secs, 30);
        assert_eq!(core.artifacts.dir, PathBuf::from("/tmp/apks"));
    }

    #[tokio::test]
    async fn test_fake_harness_stages_artifacts() {
        let harness = TestHarness::fake(FakeDevice::new()).unwrap();
        assert!(harness.fixtures.check_artifacts().all_ready());
        assert!(harness.fake_device().is_some());
        assert_eq!(harness.run_id().len(), 8);
    }
}
