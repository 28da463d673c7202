use std::fmt;
use serde::{Deserialize, Serialize};

/// Raw status code reported by the accelerator runtime.
///
/// Codes follow the HailoRT numbering for the values the bridge cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub u32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const INVALID_ARGUMENT: Status = Status(2);
    pub const OUT_OF_HOST_MEMORY: Status = Status(3);
    pub const TIMEOUT: Status = Status(4);
    pub const INVALID_OPERATION: Status = Status(6);
    pub const INTERNAL_FAILURE: Status = Status(8);
    pub const OPEN_FILE_FAILURE: Status = Status(13);
    pub const INVALID_HEF: Status = Status(26);
    pub const OUT_OF_PHYSICAL_DEVICES: Status = Status(74);

    /// The numeric code
    pub fn code(self) -> u32 {
        self.0
    }

    /// Whether the call completed normally
    pub fn is_success(self) -> bool {
        self == Status::SUCCESS
    }

    /// Whether a stream timeout expired before the call completed
    pub fn is_timeout(self) -> bool {
        self == Status::TIMEOUT
    }

    /// Symbolic name for well known codes
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Status::SUCCESS => "SUCCESS",
            Status::INVALID_ARGUMENT => "INVALID_ARGUMENT",
            Status::OUT_OF_HOST_MEMORY => "OUT_OF_HOST_MEMORY",
            Status::TIMEOUT => "TIMEOUT",
            Status::INVALID_OPERATION => "INVALID_OPERATION",
            Status::INTERNAL_FAILURE => "INTERNAL_FAILURE",
            Status::OPEN_FILE_FAILURE => "OPEN_FILE_FAILURE",
            Status::INVALID_HEF => "INVALID_HEF",
            Status::OUT_OF_PHYSICAL_DEVICES => "OUT_OF_PHYSICAL_DEVICES",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        Status(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_known_code() {
        assert_eq!(Status::TIMEOUT.to_string(), "4 (TIMEOUT)");
    }

    #[test]
    fn test_display_unknown_code() {
        assert_eq!(Status(999).to_string(), "999");
    }

    #[test]
    fn test_predicates() {
        assert!(Status::SUCCESS.is_success());
        assert!(!Status::TIMEOUT.is_success());
        assert!(Status::TIMEOUT.is_timeout());
        assert!(!Status::INTERNAL_FAILURE.is_timeout());
    }
}
