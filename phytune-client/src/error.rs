use std::{error::Error, fmt::Display, io};

/// Errors that may occur while executing a request on the management controller.
#[derive(Debug)]
pub enum RpcError {
    /// The request or the expected response does not fit into the transport buffer.
    /// Raised before any I/O is attempted.
    ResourceLimitExceeded { max: usize, got: usize },
    /// The control channel could not be opened or the device could not be addressed.
    TransportUnavailable(io::Error),
    /// The control channel is available but the request itself failed.
    TransportIoFailure(io::Error),
    /// The controller processed the request and reported an error.
    /// The code is the host errno chosen by the driver.
    ControllerRejected(i32),
    /// The lane query returned no entries.
    MissingLane,
    /// The eye scan did not complete before its deadline.
    DeadlineExceeded,
}

impl RpcError {
    /// The error code reported by the controller, if the controller rejected the request.
    pub fn controller_code(&self) -> Option<i32> {
        match self {
            RpcError::ControllerRejected(code) => Some(*code),
            _ => None,
        }
    }
}

impl Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::ResourceLimitExceeded { max, got } => write!(
                f,
                "Payload too large! Maximum is {} bytes, but got {}",
                max, got
            ),
            RpcError::TransportUnavailable(error) => {
                write!(f, "Control channel unavailable: {}", error)
            }
            RpcError::TransportIoFailure(error) => write!(f, "Request failed: {}", error),
            RpcError::ControllerRejected(code) => write!(
                f,
                "Controller rejected request: {}",
                io::Error::from_raw_os_error(*code)
            ),
            RpcError::MissingLane => write!(f, "Controller reported no lanes"),
            RpcError::DeadlineExceeded => write!(f, "Eye scan did not complete in time"),
        }
    }
}

impl Error for RpcError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RpcError::TransportUnavailable(error) | RpcError::TransportIoFailure(error) => {
                Some(error)
            }
            _ => None,
        }
    }
}
