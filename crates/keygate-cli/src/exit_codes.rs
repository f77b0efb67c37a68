//! Exit codes for the `keygate` binary. Scripts depend on these values.

use keygate_auth::{AuthorizationError, ConfigError, TokenError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1; // Usage, I/O or parse error
pub const CONFIG_ERROR: i32 = 2; // Configuration failed validation
pub const DENIED: i32 = 3; // Authorization denied or token rejected

/// Map a command error to its exit code.
pub fn for_error(e: &anyhow::Error) -> i32 {
    if e.downcast_ref::<ConfigError>().is_some() {
        CONFIG_ERROR
    } else if e.downcast_ref::<AuthorizationError>().is_some()
        || e.downcast_ref::<TokenError>().is_some()
    {
        DENIED
    } else {
        FAILURE
    }
}
