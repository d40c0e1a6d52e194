use core::fmt::{Display, Formatter};

/// Errors returned by the frame codec and the sensor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An argument was rejected before any I/O took place.
    InvalidArgument,
    /// The checksum embedded in a response does not match its body.
    BadChecksum { expected: u8, actual: u8 },
    /// The response does not end with the tail byte.
    InvalidFrame,
    /// No response sentinel arrived within the configured window.
    Timeout,
    /// The transport failed while reading.
    ReadFailure,
    /// The transport failed while writing.
    WriteFailure,
    /// The sensor did not confirm a set command (strict confirmation only).
    CommandFailed,
    /// The sensor answered a query with a reply of the wrong shape.
    UnexpectedReply,
}

impl Error {
    /// Whether only the current exchange is lost and the command may be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BadChecksum { .. } | Self::InvalidFrame)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::BadChecksum { expected, actual } => write!(
                f,
                "bad checksum: computed {expected:#04x}, received {actual:#04x}"
            ),
            Self::InvalidFrame => write!(f, "invalid frame terminator"),
            Self::Timeout => write!(f, "timed out waiting for response"),
            Self::ReadFailure => write!(f, "serial read failure"),
            Self::WriteFailure => write!(f, "serial write failure"),
            Self::CommandFailed => write!(f, "command not confirmed by sensor"),
            Self::UnexpectedReply => write!(f, "unexpected reply"),
        }
    }
}

impl core::error::Error for Error {}
