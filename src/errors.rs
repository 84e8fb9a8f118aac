use std::ffi::NulError;

use thiserror::Error;

use crate::engine::LayerSelector;

#[cfg(feature = "ogr")]
use gdal_sys::{CPLErr, OGRErr};

pub type Result<T> = std::result::Result<T, OgrioError>;

#[derive(Clone, Debug, Error)]
pub enum OgrioError {
    #[error("Dataset '{path}' does not exist or is not readable: {msg}")]
    DatasetNotFound { path: String, msg: String },
    #[error("Layer {layer} not found in dataset '{path}'")]
    LayerNotFound { path: String, layer: LayerSelector },
    #[error("Invalid SQL filter '{filter}': {msg}")]
    InvalidFilter { filter: String, msg: String },
    #[error("Unsupported geometry type: {0}")]
    UnsupportedGeometry(String),
    #[error("Field '{field}' has unsupported type '{field_type}'")]
    UnsupportedFieldType { field: String, field_type: String },
    #[error("Field '{field}' holds a value that cannot be read: {msg}")]
    InvalidFieldValue { field: String, msg: String },
    #[error("Driver '{0}' is not available")]
    DriverNotFound(String),
    #[error("Failed to write '{path}': {msg}")]
    Write { path: String, msg: String },
    #[error("Bad argument: {0}")]
    BadArgument(String),
    #[error("Table schema mismatch: {0}")]
    Schema(String),
    #[error("FfiNulError")]
    FfiNulError(#[from] NulError),

    #[cfg(feature = "ogr")]
    #[error("CPL error class: '{class:?}', error number: '{number}', error msg: '{msg}'")]
    CplError {
        class: CPLErr::Type,
        number: i32,
        msg: String,
    },
    #[cfg(feature = "ogr")]
    #[error("GDAL method '{method_name}' returned a NULL pointer. Error msg: '{msg}'")]
    NullPointer {
        method_name: &'static str,
        msg: String,
    },
    #[cfg(feature = "ogr")]
    #[error("OGR method '{method_name}' returned error: '{err:?}'")]
    OgrError {
        err: OGRErr::Type,
        method_name: &'static str,
    },
}

impl OgrioError {
    /// Attach the destination path to an engine failure raised while writing.
    ///
    /// Errors that already name a taxonomy kind pass through untouched.
    pub(crate) fn into_write_error(self, path: &str) -> OgrioError {
        match self {
            err @ (OgrioError::Write { .. }
            | OgrioError::DriverNotFound(_)
            | OgrioError::BadArgument(_)
            | OgrioError::Schema(_)) => err,
            other => OgrioError::Write {
                path: path.to_string(),
                msg: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_message() {
        let err = OgrioError::InvalidFilter {
            filter: "invalid".to_string(),
            msg: "'invalid' not recognised as an available field".to_string(),
        };
        assert!(err.to_string().starts_with("Invalid SQL filter"));
        assert!(err.to_string().contains("not recognised"));
    }

    #[test]
    fn test_into_write_error_keeps_driver_errors() {
        let err = OgrioError::DriverNotFound("Nope".to_string()).into_write_error("/tmp/x");
        assert!(matches!(err, OgrioError::DriverNotFound(_)));

        let err = OgrioError::UnsupportedGeometry("CircularString".to_string())
            .into_write_error("/tmp/x");
        match err {
            OgrioError::Write { path, msg } => {
                assert_eq!(path, "/tmp/x");
                assert!(msg.contains("CircularString"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
