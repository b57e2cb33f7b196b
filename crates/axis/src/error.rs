use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while fitting, projecting, or persisting an axis model.
#[derive(Debug, Error)]
pub enum AxisError {
    /// Labels do not describe exactly two non-empty groups.
    #[error("invalid group composition: {0}")]
    InvalidGroupComposition(String),
    /// Shapes disagree (target width, label count, group order length or coverage).
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// The two centroids coincide, so the axis has no direction.
    #[error("degenerate axis: norm {norm:e} is below tolerance {tolerance:e}")]
    DegenerateAxis { norm: f64, tolerance: f64 },
    /// `transform` or `save` was called before `fit`.
    #[error("model has not been fitted")]
    NotFitted,
    /// Configuration values are out of range.
    #[error("invalid axis config: {0}")]
    InvalidConfig(String),
    /// Eigen-decomposition or rank failures inside the discriminant solver.
    #[error("linear algebra failure: {0}")]
    Linalg(String),
    /// No complete bundle lives at the given location.
    #[error("bundle not found: {}", .0.display())]
    BundleNotFound(PathBuf),
    /// The bundle exists but its archive or metadata cannot be trusted.
    #[error("bundle {} is corrupt: {reason}", .path.display())]
    BundleCorrupt { path: PathBuf, reason: String },
    /// Filesystem failure during a bundle operation.
    #[error("io error during {op} of bundle {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Archive serialization failed.
    #[error("archive encode error: {0}")]
    Encode(String),
}

impl AxisError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        AxisError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        AxisError::BundleCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<bincode::error::EncodeError> for AxisError {
    fn from(e: bincode::error::EncodeError) -> Self {
        AxisError::Encode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_composition_message() {
        let err = AxisError::InvalidGroupComposition("found 3 distinct labels".into());
        assert!(err.to_string().contains("invalid group composition"));
        assert!(err.to_string().contains("3 distinct"));
    }

    #[test]
    fn io_error_carries_operation_and_path() {
        let err = AxisError::io(
            "save",
            "/tmp/model.sm",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("save"));
        assert!(msg.contains("/tmp/model.sm"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn corrupt_bundle_message() {
        let err = AxisError::corrupt("bundle.sm", "group_ids has 3 entries, expected 4");
        assert!(err.to_string().contains("bundle.sm is corrupt"));
        assert!(err.to_string().contains("expected 4"));
    }

    #[test]
    fn degenerate_axis_debug() {
        let err = AxisError::DegenerateAxis {
            norm: 0.0,
            tolerance: 1e-12,
        };
        assert!(format!("{err:?}").contains("DegenerateAxis"));
    }
}
