use crate::DeviceKind;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = DeviceError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device document not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("unknown device kind: {0:?}")]
    UnknownKind(String),
    #[error("device kind {0} has no registered constructor")]
    UnsupportedKind(DeviceKind),
    #[error("malformed field {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },
    #[error("settings/instance mismatch (settings={settings:?}, instance={instance:?})")]
    VariantMismatch {
        settings: Option<DeviceKind>,
        instance: Option<DeviceKind>,
    },
    #[error("failed to bind {endpoint}: {source}")]
    BindFailure {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(String),
}

impl DeviceError {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            reason: reason.into(),
        }
    }
}
