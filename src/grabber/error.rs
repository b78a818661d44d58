use thiserror::Error;

/// Digitizer subsystem errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrabberError {
    #[error("hardware support unavailable: {0}")]
    Unsupported(String),

    #[error("capture system unavailable: {0}")]
    SystemUnavailable(String),

    #[error("no digitizers responded: {0}")]
    NoDigitizers(String),

    #[error("allocation failed for device {slot}: {reason}")]
    Allocation { slot: u32, reason: String },

    #[error("acquisition failed: {0}")]
    Acquisition(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{call} failed: {reason}")]
    Driver { call: &'static str, reason: String },
}

/// Coarse classification of a [`GrabberError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The build or adapter cannot talk to hardware at all.
    Environment,
    /// No capture system, or no digitizer answered a probe.
    Discovery,
    /// A digitizer or buffer could not be allocated.
    Allocation,
    /// A grab or plane read failed at the vendor layer.
    Acquisition,
    /// Rejected before any hardware call.
    Caller,
}

impl GrabberError {
    /// Shorthand for a vendor call failure.
    pub fn driver(call: &'static str, reason: impl Into<String>) -> Self {
        Self::Driver {
            call,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported(_) => ErrorKind::Environment,
            Self::SystemUnavailable(_) | Self::NoDigitizers(_) => ErrorKind::Discovery,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::Acquisition(_) | Self::Driver { .. } => ErrorKind::Acquisition,
            Self::InvalidRequest(_) => ErrorKind::Caller,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, GrabberError>;
