use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum AppError {
    DeviceNotFound(String),
    EventNotFound(String),
    /// the caller does not own the resource
    Forbidden,
    /// no (or an invalid) identity was presented to the api layer
    Unauthorized,
    InvalidArgument(String),
    /// store, cache or transport could not be reached
    Unavailable(anyhow::Error),
}

impl AppError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
    /// Deterministic outcomes are never worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Unavailable(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::DeviceNotFound(id) => write!(f, "Device '{id}' could not be found."),
            AppError::EventNotFound(id) => write!(f, "Event '{id}' could not be found."),
            AppError::Forbidden => f.write_str("Access forbidden: resource owned by another user."),
            AppError::Unauthorized => f.write_str("Access denied: unauthorized."),
            AppError::InvalidArgument(message) => write!(f, "Invalid argument: {message}"),
            AppError::Unavailable(_) => {
                f.write_str("The service is temporarily unavailable. Please try again later.")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let status = match &self {
            AppError::DeviceNotFound(_) | AppError::EventNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(err) => {
                tracing::error!("{:?}", err);
                err.chain()
                    .skip(1)
                    .for_each(|cause| tracing::error!("Because: {}", cause));
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        tracing::debug!(status = %status, "{}", message);
        (status, message).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(value: E) -> Self {
        Self::Unavailable(value.into())
    }
}
