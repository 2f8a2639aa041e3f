//! Error types for the mirrorcast renderers
//!
//! Every fallible operation in the crate returns [`Result`]. Nothing crosses
//! the renderer interface as a panic; decode-level problems are handled
//! inside the pipelines and only construction, lifecycle and presentation
//! failures reach the caller.

use thiserror::Error;

/// Main error type for the renderers
#[derive(Error, Debug)]
pub enum RendererError {
    /// Decoder could not be opened or is no longer usable
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// Scaler / colour conversion errors
    #[error("Scaler error: {0}")]
    Scaler(String),

    /// Presentation surface or presentation context errors
    #[error("Surface error: {0}")]
    Surface(String),

    /// Audio sink errors
    #[error("Audio error: {0}")]
    Audio(String),

    /// Window / event loop errors
    #[error("Window error: {0}")]
    Window(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested backend cannot be constructed
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An operation was invoked on a renderer that has been destroyed
    #[error("Renderer has been destroyed")]
    Destroyed,

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ffmpeg_next::Error> for RendererError {
    fn from(err: ffmpeg_next::Error) -> Self {
        RendererError::Decoder(format!("FFmpeg error: {}", err))
    }
}

impl RendererError {
    /// Create a decoder error from string
    pub fn decoder_error<S: Into<String>>(msg: S) -> Self {
        RendererError::Decoder(msg.into())
    }

    /// Create a backend-unavailable error from string
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        RendererError::BackendUnavailable(msg.into())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, RendererError>;

/// Extension trait for converting foreign errors into [`RendererError`]
pub trait IntoRendererError<T> {
    fn decoder_err(self, context: &str) -> Result<T>;
    fn scaler_err(self, context: &str) -> Result<T>;
    fn surface_err(self, context: &str) -> Result<T>;
    fn audio_err(self, context: &str) -> Result<T>;
    fn window_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoRendererError<T> for std::result::Result<T, E> {
    fn decoder_err(self, context: &str) -> Result<T> {
        self.map_err(|e| RendererError::Decoder(format!("{}: {}", context, e)))
    }

    fn scaler_err(self, context: &str) -> Result<T> {
        self.map_err(|e| RendererError::Scaler(format!("{}: {}", context, e)))
    }

    fn surface_err(self, context: &str) -> Result<T> {
        self.map_err(|e| RendererError::Surface(format!("{}: {}", context, e)))
    }

    fn audio_err(self, context: &str) -> Result<T> {
        self.map_err(|e| RendererError::Audio(format!("{}: {}", context, e)))
    }

    fn window_err(self, context: &str) -> Result<T> {
        self.map_err(|e| RendererError::Window(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| RendererError::Config(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RendererError::Surface("event loop closed".to_string());
        assert_eq!(err.to_string(), "Surface error: event loop closed");

        let err = RendererError::Destroyed;
        assert_eq!(err.to_string(), "Renderer has been destroyed");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: RendererError = io_err.into();
        assert!(matches!(err, RendererError::Io(_)));

        let err: RendererError = ffmpeg_next::Error::InvalidData.into();
        assert!(matches!(err, RendererError::Decoder(_)));
    }

    #[test]
    fn test_into_renderer_error_trait() {
        let result: std::result::Result<(), &str> = Err("no adapter");
        match result.surface_err("Requesting adapter") {
            Err(RendererError::Surface(msg)) => {
                assert_eq!(msg, "Requesting adapter: no adapter");
            }
            _ => panic!("Expected Surface error"),
        }
    }
}
