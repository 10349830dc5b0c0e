/// Prefix for configuration overrides read from the environment.
pub const CONFIG_PREFIX: &str = "HOSTSIDE_";

/// Environment variable selecting the target device serial.
pub const DEVICE_SERIAL: &str = "HOSTSIDE_SERIAL";

/// Environment variable overriding the `adb` binary path.
pub const ADB_BINARY: &str = "HOSTSIDE_ADB_BINARY";

/// Environment variable enabling verbose harness logging.
pub const VERBOSE: &str = "HOSTSIDE_VERBOSE";

/// Environment variable pointing at the directory holding test artifacts.
pub const ARTIFACT_DIR: &str = "HOSTSIDE_ARTIFACT_DIR";
