use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("Could not fetch source image: {0}")]
    SourceFetchFailed(String),
    #[error("Engine error: {0}")]
    EngineFailure(String),
    #[error("Invalid session: {0}")]
    InvalidSession(String),
    #[error("Too busy: {limit} requests already in flight, try again later")]
    ConcurrencyRejected { limit: usize },
    #[error("Render error: {0}")]
    RenderFailure(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Platform error: {0}")]
    PlatformError(String),
}

impl From<image::ImageError> for BotError {
    fn from(err: image::ImageError) -> Self {
        BotError::RenderFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_message_names_limit() {
        let err = BotError::ConcurrencyRejected { limit: 5 };
        assert_eq!(
            err.to_string(),
            "Too busy: 5 requests already in flight, try again later"
        );
    }

    #[test]
    fn test_image_errors_are_render_failures() {
        let err: BotError = image::ImageError::Limits(image::error::LimitError::from_kind(
            image::error::LimitErrorKind::DimensionError,
        ))
        .into();
        assert!(matches!(err, BotError::RenderFailure(_)));
    }
}
