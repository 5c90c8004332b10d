use std::fmt;

/// WS-Trust validation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Valid,
    Invalid,
}

impl StatusCode {
    pub fn uri(self) -> &'static str {
        match self {
            StatusCode::Valid => "http://docs.oasis-open.org/ws-sx/ws-trust/200512/status/valid",
            StatusCode::Invalid => "http://docs.oasis-open.org/ws-sx/ws-trust/200512/status/invalid",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Outcome of validating a token. An invalid decision must deny
/// authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDecision {
    pub valid: bool,
    pub status: StatusCode,
    pub reason: String,
}

impl TrustDecision {
    pub fn valid(reason: impl Into<String>) -> Self {
        Self {
            valid: true,
            status: StatusCode::Valid,
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            status: StatusCode::Invalid,
            reason: reason.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl fmt::Display for TrustDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.status, self.reason)
    }
}
