/// Exit codes for CI/automation.
pub const SUCCESS: i32 = 0;
/// A runbook could not be loaded or its operator could not be built.
pub const VALIDATION_FAILED: i32 = 2;
pub const RUN_FAILED: i32 = 3;
pub const RUNTIME_ERROR: i32 = 4;
