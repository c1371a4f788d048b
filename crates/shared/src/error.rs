use thiserror::Error;

/// Failures surfaced by the widget core.
///
/// `InvalidPayload` and `ModalNotInitialized` are reported through logging at
/// the public API boundary and never propagate to the embedding page.
/// `EnvironmentMismatch` is the one hard failure: without a host window
/// nothing else can function, so construction refuses synchronously.
#[derive(Debug, Error)]
pub enum WidgetError {
    #[error("invalid checkout payload: {0}")]
    InvalidPayload(String),
    #[error("checkout modal not initialized: {0}")]
    ModalNotInitialized(String),
    #[error("host environment unavailable: {0}")]
    EnvironmentMismatch(String),
}

impl WidgetError {
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    pub fn modal_not_initialized(message: impl Into<String>) -> Self {
        Self::ModalNotInitialized(message.into())
    }

    pub fn environment_mismatch(message: impl Into<String>) -> Self {
        Self::EnvironmentMismatch(message.into())
    }
}
