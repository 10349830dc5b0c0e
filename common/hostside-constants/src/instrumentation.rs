/// Default instrumentation runner class.
pub const DEFAULT_RUNNER: &str = "androidx.test.runner.AndroidJUnitRunner";

/// Status bundle line prefix.
pub const STATUS: &str = "INSTRUMENTATION_STATUS: ";

/// Status bundle terminator carrying the per-test status code.
pub const STATUS_CODE: &str = "INSTRUMENTATION_STATUS_CODE: ";

/// Run result line prefix.
pub const RESULT: &str = "INSTRUMENTATION_RESULT: ";

/// Run terminator carrying the overall result code.
pub const CODE: &str = "INSTRUMENTATION_CODE: ";

/// Emitted when the instrumentation could not start at all.
pub const FAILED: &str = "INSTRUMENTATION_FAILED: ";

/// Printed by `am instrument` when the runner is not installed.
pub const NOT_FOUND: &str = "Unable to find instrumentation info";

/// Status key: test class.
pub const KEY_CLASS: &str = "class";

/// Status key: test method.
pub const KEY_TEST: &str = "test";

/// Status key: failure stack trace.
pub const KEY_STACK: &str = "stack";

/// Status key: structured event payload (JSON).
pub const KEY_EVENT: &str = "event";

/// Result key: short failure message.
pub const KEY_SHORT_MSG: &str = "shortMsg";

/// Result key: free-form runner output.
pub const KEY_STREAM: &str = "stream";

/// Test started.
pub const CODE_START: i32 = 1;

/// Test finished without failures.
pub const CODE_OK: i32 = 0;

/// Test raised an unexpected error.
pub const CODE_ERROR: i32 = -1;

/// Test assertion failed.
pub const CODE_FAILURE: i32 = -2;

/// Test was ignored.
pub const CODE_IGNORED: i32 = -3;

/// Test assumption did not hold.
pub const CODE_ASSUMPTION_FAILURE: i32 = -4;

/// Status bundle carrying a procedure event rather than test progress.
pub const CODE_EVENT: i32 = 2;
