//! Stable exit codes for repair CLI commands.

/// Command succeeded; for `run` and `exec`, the tests pass.
pub const OK: i32 = 0;
/// Invalid input, config or infrastructure failure.
pub const INVALID: i32 = 1;
/// `run` or `exec` completed but the tests do not pass.
pub const FAILED: i32 = 2;
