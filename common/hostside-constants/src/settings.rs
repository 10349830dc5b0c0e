/// Per-user system settings.
pub const SYSTEM: &str = "system";

/// Per-user secure settings.
pub const SECURE: &str = "secure";

/// Device-wide global settings.
pub const GLOBAL: &str = "global";

/// Literal printed by `settings get` for unset keys.
pub const NULL: &str = "null";

/// Prefix of the reply when the settings provider throws.
pub const EXCEPTION: &str = "Exception occurred while executing";

/// Prefix of the reply for an unknown namespace.
pub const INVALID_NAMESPACE: &str = "Invalid namespace";
