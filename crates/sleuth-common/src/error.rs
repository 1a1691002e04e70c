//! Sleuth error type and the failure-site code table.
//!
//! Every error carries the ordered list of codes that led to it: the deepest
//! failure site first, with each escalating site appended as the error
//! bubbles up. Callers can branch on the trace without parsing messages:
//!
//! ```
//! use sleuth_common::{codes, Error};
//!
//! let err = Error::new(codes::ERR_START, "no such interface")
//!     .escalate(codes::ERR_CREATE)
//!     .escalate(codes::ERR_NEW);
//! assert_eq!(err.codes, vec![905, 901, 900]);
//! ```

use thiserror::Error as ThisError;

/// Failure-site codes. Errors are in the 900-999 range, warnings in the
/// 800-899 range. Warnings are log-only and never carried by an [`Error`].
pub mod codes {
    pub const WARN_INTERFACE: u16 = 801;
    pub const WARN_CLOSE: u16 = 802;
    pub const WARN_ADD: u16 = 803;

    pub const ERR_NEW: u16 = 900;
    pub const ERR_CREATE: u16 = 901;
    pub const ERR_DISPATCH: u16 = 902;
    pub const ERR_SERVICE: u16 = 903;
    pub const ERR_INITIALIZE: u16 = 904;
    pub const ERR_START: u16 = 905;
    pub const ERR_JOIN: u16 = 906;
    pub const ERR_INTERFACE: u16 = 907;
    pub const ERR_PORT: u16 = 908;
    pub const ERR_NODE_HEADER: u16 = 909;
    pub const ERR_SERVICE_HEADER: u16 = 910;
    pub const ERR_VERSION_HEADER: u16 = 911;
    pub const ERR_GROUP_HEADER: u16 = 912;
    pub const ERR_VERBOSE: u16 = 913;
    pub const ERR_DISPATCH_HEADER: u16 = 914;
    pub const ERR_DISPATCH_ACTION: u16 = 915;
    pub const ERR_SCHEME: u16 = 916;
    pub const ERR_RES_UNMARSHAL: u16 = 917;
    pub const ERR_RES_UNMARSHAL_JSON: u16 = 918;
    pub const ERR_UNKNOWN_SERVICE: u16 = 919;
    pub const ERR_TIMEOUT: u16 = 920;
    pub const ERR_RECV: u16 = 921;
    pub const ERR_REPL: u16 = 922;
    pub const ERR_LOG_LEVEL: u16 = 923;
    pub const ERR_ADD: u16 = 924;
    pub const ERR_REQ_MARSHAL: u16 = 925;
    pub const ERR_REQ_UNMARSHAL: u16 = 926;
    pub const ERR_REQ_UNMARSHAL_JSON: u16 = 927;
    pub const ERR_REQ_UNMARSHAL_HTTP: u16 = 928;
    pub const ERR_REQ_WHISPER: u16 = 929;
    pub const ERR_RES_WHISPER: u16 = 930;
    pub const ERR_LEAVE: u16 = 931;
    pub const ERR_UNZIP: u16 = 932;
    pub const ERR_UNZIP_READ: u16 = 933;
    pub const ERR_REQUEST: u16 = 934;
    pub const ERR_CLOSED: u16 = 935;
    pub const ERR_WAIT: u16 = 936;
}

/// The error type for all fallible sleuth operations.
///
/// `codes` holds the trace of failure sites, deepest first. The trace is part
/// of the observable contract: integration tests assert on exact sequences
/// such as `[905, 901, 900]` for a constructor that failed inside fabric
/// start-up.
#[derive(Debug, ThisError)]
#[error("sleuth: {message} {codes:?}")]
pub struct Error {
    /// The ordered list of failure-site codes that led to this error.
    pub codes: Vec<u16>,
    message: String,
}

impl Error {
    /// Creates an error rooted at a single failure site.
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            codes: vec![code],
            message: message.into(),
        }
    }

    /// Appends an escalating site's code as the error propagates up.
    pub fn escalate(mut self, code: u16) -> Self {
        self.codes.push(code);
        self
    }

    /// The human-readable message recorded at the original failure site.
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::new(1, "test");
        assert_eq!(err.to_string(), "sleuth: test [1]");
    }

    #[test]
    fn test_error_escalation_order() {
        let err = Error::new(codes::ERR_START, "boom")
            .escalate(codes::ERR_CREATE)
            .escalate(codes::ERR_NEW);
        assert_eq!(err.codes, vec![905, 901, 900]);
    }

    #[test]
    fn test_error_is_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&Error::new(codes::ERR_TIMEOUT, "late"));
    }
}
