use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("handler failed: {0}")]
    HandlerFailed(String),
    #[error("handler timed out after {0:?}")]
    HandlerTimedOut(std::time::Duration),
}
