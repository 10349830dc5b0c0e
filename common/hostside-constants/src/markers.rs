/// Prefix of a successful `pm`/`dpm` reply.
pub const SUCCESS: &str = "Success";

/// Prefix of a failed `pm`/`am` reply.
pub const ERROR: &str = "Error";

/// Prefix of a failed `pm install`/`pm uninstall` reply.
pub const FAILURE: &str = "Failure";

/// Header line of `pm list users`.
pub const USERS_HEADER: &str = "Users:";

/// `pm uninstall` reply for a package missing in the given user.
pub const NOT_INSTALLED: &str = "not installed";

/// `pm uninstall` reply on some releases for a package missing in the user.
pub const DELETE_FAILED_INTERNAL_ERROR: &str = "DELETE_FAILED_INTERNAL_ERROR";

/// Reply for operations against a user id that does not exist.
pub const UNKNOWN_USER: &str = "Unknown user";

/// Success string of `cmd lock_settings verify`.
pub const LOCK_VERIFIED: &str = "Lock credential verified successfully";

/// Feature flag advertising managed profile support.
pub const FEATURE_MANAGED_USERS: &str = "android.software.managed_users";

/// `wm size` line for the panel size.
pub const PHYSICAL_SIZE: &str = "Physical size:";

/// `wm size` line for an override size.
pub const OVERRIDE_SIZE: &str = "Override size:";

/// User flag bit marking the primary user.
pub const FLAG_PRIMARY: u32 = 0x0000_0001;

/// User flag bit marking a guest user.
pub const FLAG_GUEST: u32 = 0x0000_0004;

/// User flag bit marking a managed profile.
pub const FLAG_MANAGED_PROFILE: u32 = 0x0000_0020;
