//! Test fixtures for scenario tests.
//!
//! Provides the packages, procedures and policy events the device-policy
//! scenarios use, plus a [`FakeDevice`] scripted the way a device with those
//! packages behaves.

use hostside_constants::env;
use hostside_core::testing::{FakeDevice, ProcedureScript};
use hostside_core::Artifact;
use std::path::{Path, PathBuf};

/// Device policy admin package.
pub const ADMIN_PKG: &str = "com.android.cts.deviceandprofileowner";
/// APK providing [`ADMIN_PKG`].
pub const ADMIN_APK: &str = "CtsDeviceAndProfileOwnerApp.apk";

/// Plain app used as a policy target.
pub const TEST_APP_PKG: &str = "com.android.cts.launcherapps.simpleapp";
/// APK providing [`TEST_APP_PKG`].
pub const TEST_APP_APK: &str = "CtsSimpleApp.apk";

/// Feature without which no policy scenario can run.
pub const FEATURE_DEVICE_ADMIN: &str = "android.software.device_admin";

/// Secure setting the logging scenario toggles.
pub const SKIP_FIRST_USE_HINTS: &str = "skip_first_use_hints";

/// Password used by lock-screen scenarios.
pub const TEST_PASSWORD: &str = "1234";

/// Procedures in the admin package, as `(class, method)`.
pub mod procedures {
    pub const CA_CERT: (&str, &str) = (".CaCertManagementTest", "testCanInstallAndUninstallACaCert");
    pub const SCREEN_CAPTURE_ON: (&str, &str) =
        (".ScreenCaptureDisabledTest", "testSetScreenCaptureDisabled_true");
    pub const SCREEN_CAPTURE_OFF: (&str, &str) =
        (".ScreenCaptureDisabledTest", "testSetScreenCaptureDisabled_false");
    pub const SECURE_SETTING: (&str, &str) =
        (".DevicePolicyLoggingTest", "testSetSecureSettingLogged");
    pub const STORAGE_ENCRYPTION: (&str, &str) =
        (".StorageEncryptionTest", "testSetStorageEncryption");
    pub const NO_FAILED_ATTEMPTS: (&str, &str) =
        (".GetCurrentFailedPasswordAttemptsTest", "testNoFailedPasswordAttempts");
    pub const ONE_FAILED_ATTEMPT: (&str, &str) =
        (".GetCurrentFailedPasswordAttemptsTest", "testOneFailedPasswordAttempt");
    pub const APPLICATION_HIDDEN: (&str, &str) =
        (".ApplicationHiddenTest", "testSetApplicationHidden");

    /// Parameter telling the storage encryption procedure where it runs.
    pub const IS_PRIMARY_USER: &str = "isPrimaryUser";
}

/// Policy events the admin package emits.
pub mod events {
    use super::ADMIN_PKG;
    use hostside_core::Event;

    fn admin(id: &str) -> Event {
        Event::new(id).with("admin_package_name", ADMIN_PKG)
    }

    pub fn install_ca_cert() -> Event {
        admin("INSTALL_CA_CERT").with("boolean", false)
    }

    pub fn uninstall_ca_certs() -> Event {
        admin("UNINSTALL_CA_CERTS").with("boolean", false)
    }

    pub fn screen_capture_disabled(disabled: bool) -> Event {
        admin("SET_SCREEN_CAPTURE_DISABLED").with("boolean", disabled)
    }

    /// Hiding or unhiding `package`, logged with the package, the new
    /// visibility and whether the call came through the parent profile.
    pub fn application_hidden(package: &str, hidden: bool) -> Event {
        let visibility = if hidden { "hidden" } else { "not_hidden" };
        admin("SET_APPLICATION_HIDDEN")
            .with("boolean", false)
            .with("strings", [package, visibility, "notCalledFromParent"])
    }

    pub fn secure_setting(setting: &str, value: &str) -> Event {
        admin("SET_SECURE_SETTING")
            .with("setting", setting)
            .with("value", value)
    }
}

/// Locates test artifacts on the host.
#[derive(Debug, Clone)]
pub struct TestFixtures {
    artifact_dir: PathBuf,
}

impl TestFixtures {
    /// Fixtures reading artifacts from `artifact_dir`.
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
        }
    }

    /// Fixtures reading artifacts from `HOSTSIDE_ARTIFACT_DIR`, or
    /// `testcases/` at the workspace root.
    pub fn from_env() -> Self {
        let dir = std::env::var_os(env::ARTIFACT_DIR).map_or_else(
            || {
                Path::new(env!("CARGO_MANIFEST_DIR"))
                    .join("../..")
                    .join("testcases")
            },
            PathBuf::from,
        );
        Self::new(dir)
    }

    /// Returns the artifact directory.
    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// The device policy admin artifact.
    pub fn admin(&self) -> Artifact {
        Artifact::in_dir(ADMIN_PKG, &self.artifact_dir, ADMIN_APK)
    }

    /// The plain test app artifact.
    pub fn test_app(&self) -> Artifact {
        Artifact::in_dir(TEST_APP_PKG, &self.artifact_dir, TEST_APP_APK)
    }

    /// Writes stand-in APK files so installs against a [`FakeDevice`] find
    /// something to push.
    pub fn stage_placeholders(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.artifact_dir)?;
        for apk in [ADMIN_APK, TEST_APP_APK] {
            std::fs::write(self.artifact_dir.join(apk), b"PK\x03\x04")?;
        }
        Ok(())
    }

    /// Checks which artifacts are present.
    pub fn check_artifacts(&self) -> ArtifactCheck {
        ArtifactCheck {
            admin_exists: self.admin().path.is_file(),
            test_app_exists: self.test_app().path.is_file(),
        }
    }
}

impl Default for TestFixtures {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Artifact check result.
#[derive(Debug, Clone)]
pub struct ArtifactCheck {
    /// Admin APK exists.
    pub admin_exists: bool,
    /// Test app APK exists.
    pub test_app_exists: bool,
}

impl ArtifactCheck {
    /// Returns true if every artifact is available.
    pub fn all_ready(&self) -> bool {
        self.admin_exists && self.test_app_exists
    }

    /// Returns a list of missing artifacts.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.admin_exists {
            missing.push(ADMIN_APK);
        }
        if !self.test_app_exists {
            missing.push(TEST_APP_APK);
        }
        missing
    }
}

/// A multi-user device with the policy feature, the test APKs and every
/// admin procedure scripted to pass and emit its policy events.
pub fn policy_device() -> FakeDevice {
    use procedures as p;

    let full = |(class, method): (&str, &str)| format!("{ADMIN_PKG}{class}#{method}");

    FakeDevice::new()
        .with_feature(FEATURE_DEVICE_ADMIN)
        .with_feature(hostside_constants::markers::FEATURE_MANAGED_USERS)
        .with_apk(ADMIN_APK, ADMIN_PKG)
        .with_apk(TEST_APP_APK, TEST_APP_PKG)
        .with_procedure(
            ADMIN_PKG,
            &full(p::CA_CERT),
            ProcedureScript::pass()
                .emit(events::install_ca_cert())
                .emit(events::uninstall_ca_certs()),
        )
        .with_procedure(
            ADMIN_PKG,
            &full(p::SCREEN_CAPTURE_ON),
            ProcedureScript::pass().emit(events::screen_capture_disabled(true)),
        )
        .with_procedure(
            ADMIN_PKG,
            &full(p::SCREEN_CAPTURE_OFF),
            ProcedureScript::pass().emit(events::screen_capture_disabled(false)),
        )
        .with_procedure(
            ADMIN_PKG,
            &full(p::SECURE_SETTING),
            ProcedureScript::pass()
                .emit(events::secure_setting(SKIP_FIRST_USE_HINTS, "1"))
                .emit(events::secure_setting(SKIP_FIRST_USE_HINTS, "0")),
        )
        .with_procedure(
            ADMIN_PKG,
            &full(p::APPLICATION_HIDDEN),
            ProcedureScript::pass()
                .emit(events::application_hidden(TEST_APP_PKG, true))
                .emit(events::application_hidden(TEST_APP_PKG, false)),
        )
        .with_procedure(ADMIN_PKG, &full(p::NO_FAILED_ATTEMPTS), ProcedureScript::pass())
        .with_procedure(ADMIN_PKG, &full(p::ONE_FAILED_ATTEMPT), ProcedureScript::pass())
}

/// Scripts the storage encryption procedure to require `isPrimaryUser`.
pub fn with_storage_encryption(device: FakeDevice, is_primary_user: bool) -> FakeDevice {
    let (class, method) = procedures::STORAGE_ENCRYPTION;
    device.with_procedure(
        ADMIN_PKG,
        &format!("{ADMIN_PKG}{class}#{method}"),
        ProcedureScript::pass().require_arg(procedures::IS_PRIMARY_USER, is_primary_user.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifacts() {
        let fixtures = TestFixtures::new("/nonexistent");
        let check = fixtures.check_artifacts();
        assert!(!check.all_ready());
        assert_eq!(check.missing(), vec![ADMIN_APK, TEST_APP_APK]);
    }

    #[test]
    fn test_stage_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let fixtures = TestFixtures::new(dir.path());
        fixtures.stage_placeholders().unwrap();
        assert!(fixtures.check_artifacts().all_ready());
        assert_eq!(fixtures.admin().package, ADMIN_PKG);
    }
}
