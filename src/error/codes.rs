/// Error code registry for procmap
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 4000-4999: Execution errors
/// - 9000-9999: Other errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_YAML: u16 = 1002;
    pub const CONFIG_INVALID_TOML: u16 = 1003;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;

    // Execution errors (4000-4999)
    pub const EXEC_BATCH_TIMEOUT: u16 = 4002;
    pub const EXEC_REAP_FAILED: u16 = 4003;
    pub const EXEC_SPAWN_FAILED: u16 = 4007;
    pub const EXEC_PIPE_ERROR: u16 = 4008;
    pub const EXEC_ENCODE_ERROR: u16 = 4011;

    // Other errors (9000-9999)
    pub const OTHER_INTERNAL_ERROR: u16 = 9004;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid YAML syntax in configuration",
        1003 => "Invalid TOML syntax in configuration",
        1005 => "Invalid configuration value",

        4002 => "Batch exceeded its total timeout",
        4003 => "Worker process failed to terminate",
        4007 => "Failed to spawn worker process",
        4008 => "Worker pipe I/O failed",
        4011 => "Failed to encode task for transport",

        9004 => "Internal error",
        _ => "Unknown error code",
    }
}
