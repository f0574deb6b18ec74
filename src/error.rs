use crate::matter::ids::SubscriptionId;
use crate::matter::status::Status;
use crate::matter::transport::ExchangeId;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum ImError {
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid subscription: 0x{0:08x}")]
    InvalidSubscription(SubscriptionId),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    #[error("Subscription 0x{0:08x} missed its liveness deadline")]
    LivenessTimeout(SubscriptionId),

    #[error("No response on exchange {0}")]
    ResponseTimeout(ExchangeId),

    #[error("Session invalidated")]
    SessionInvalidated,

    #[error("Peer reported status {0}")]
    StatusReport(Status),

    #[error("Stale or unknown handle")]
    StaleHandle,

    #[error("Operation not valid in state {0}")]
    IncorrectState(&'static str),

    #[error("Element of {0} bytes does not fit in an empty report")]
    BufferTooSmall(usize),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl ImError {
    /// Status code that best describes this error to a peer.
    pub fn status(&self) -> Status {
        match self {
            ImError::ProtocolViolation(_) | ImError::SerdeJsonError(_) => Status::InvalidAction,
            ImError::InvalidArgument(_) => Status::InvalidAction,
            ImError::InvalidSubscription(_) => Status::InvalidSubscription,
            ImError::ResourceExhausted(_) | ImError::BufferTooSmall(_) => {
                Status::ResourceExhausted
            }
            ImError::LivenessTimeout(_) | ImError::ResponseTimeout(_) => Status::Timeout,
            ImError::StatusReport(status) => *status,
            ImError::SessionInvalidated
            | ImError::StaleHandle
            | ImError::IncorrectState(_)
            | ImError::IoError(_) => Status::Failure,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImError>;
