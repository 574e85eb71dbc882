//! Error types for segedit

use thiserror::Error;

/// segedit error types
#[derive(Error, Debug)]
pub enum Error {
    /// Segmentation or segment could not be resolved
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// A modifier labelmap was required but none was given
    #[error("Missing modifier labelmap")]
    MissingModifier,

    /// Non-linear parent transform where only linear transforms are supported
    #[error("Unsupported transform: {0}")]
    UnsupportedTransform(String),

    /// Not enough points (or a singular frame) to build a brush or cut shape
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Invalid parameter provided
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Two grids do not share the voxel lattice an operation needs
    #[error("Geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// `modify()` was called while another modification was in progress
    #[error("Re-entrant modification rejected")]
    Reentrant,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation failed
    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type alias for segedit operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidParameter("test".to_string());
        assert_eq!(err.to_string(), "Invalid parameter: test");

        let err = Error::InvalidTarget("segment 'Liver' not found".to_string());
        assert_eq!(err.to_string(), "Invalid target: segment 'Liver' not found");
        assert_eq!(Error::MissingModifier.to_string(), "Missing modifier labelmap");
    }
}
