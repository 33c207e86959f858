//! Renderer error types.

use std::fmt;

/// Errors that can occur in the rendering backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Failed to initialize the device or the primary swap chain.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// A requested pixel format has no viable device format.
    UnsupportedFormat(String),
    /// A shader binary could not be parsed or compiled.
    ShaderParseFailed(String),
    /// A handle does not refer to a live resource.
    InvalidHandle,
    /// A resource table is full.
    PoolExhausted(&'static str),
    /// Out of GPU memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// The surface was lost and needs to be recreated.
    SurfaceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::UnsupportedFormat(msg) => write!(f, "unsupported pixel format: {msg}"),
            Self::ShaderParseFailed(msg) => write!(f, "shader parse failed: {msg}"),
            Self::InvalidHandle => write!(f, "invalid resource handle"),
            Self::PoolExhausted(kind) => write!(f, "{kind} pool exhausted"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::SurfaceLost => write!(f, "surface lost, needs recreation"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for RenderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RenderError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = RenderError::InitializationFailed("no adapter found".to_string());
        assert_eq!(err.to_string(), "initialization failed: no adapter found");

        let err = RenderError::PoolExhausted("texture");
        assert_eq!(err.to_string(), "texture pool exhausted");
    }
}
