use crate::instance::{DeviceInstance, SerialPortHandle, TcpListenerHandle};
use crate::node::Node;
use crate::settings::{DeviceSettings, SerialPortSettings, TcpListenerSettings};
use crate::{DeviceError, Result};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Tag identifying which concrete variant a device represents.
///
/// The tag string of every kind is exactly its variant name, and is what
/// appears in the `<Type>` element of a device document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    SerialPort,
    TcpListener,
    /// Reserved. Has no settings variant and no instance constructor yet.
    TcpClient,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 3] = [
        DeviceKind::SerialPort,
        DeviceKind::TcpListener,
        DeviceKind::TcpClient,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::SerialPort => "SerialPort",
            DeviceKind::TcpListener => "TcpListener",
            DeviceKind::TcpClient => "TcpClient",
        }
    }

    /// Parse a raw tag. Matching is exact and case-sensitive; only
    /// surrounding whitespace is ignored.
    pub fn resolve(tag: &str) -> Result<Self> {
        let trimmed = tag.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == trimmed)
            .ok_or_else(|| DeviceError::UnknownKind(tag.to_string()))
    }

    pub fn has_settings(self) -> bool {
        create_settings(self).is_some()
    }

    pub fn has_instance(self) -> bool {
        match self {
            DeviceKind::SerialPort | DeviceKind::TcpListener => true,
            DeviceKind::TcpClient => false,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::resolve(s)
    }
}

/// Zero-valued settings for `kind`.
///
/// Lenient: a kind without a settings variant yields `None` instead of an
/// error. [`create_instance`] is strict for the same condition.
pub fn create_settings(kind: DeviceKind) -> Option<DeviceSettings> {
    match kind {
        DeviceKind::SerialPort => Some(DeviceSettings::SerialPort(SerialPortSettings::default())),
        DeviceKind::TcpListener => {
            Some(DeviceSettings::TcpListener(TcpListenerSettings::default()))
        }
        DeviceKind::TcpClient => None,
    }
}

/// Fresh, unconfigured instance for `kind`.
pub fn create_instance(kind: DeviceKind) -> Result<DeviceInstance> {
    match kind {
        DeviceKind::SerialPort => Ok(DeviceInstance::SerialPort(SerialPortHandle::default())),
        DeviceKind::TcpListener => Ok(DeviceInstance::TcpListener(TcpListenerHandle::default())),
        DeviceKind::TcpClient => Err(DeviceError::UnsupportedKind(kind)),
    }
}

/// Build the settings for `kind` and populate them from a raw `<Settings>`
/// node, if one was supplied.
pub fn configure_settings(
    kind: DeviceKind,
    node: Option<&Node>,
) -> Result<Option<DeviceSettings>> {
    let Some(mut settings) = create_settings(kind) else {
        return Ok(None);
    };
    if let Some(node) = node {
        settings.configure(node)?;
    }
    Ok(Some(settings))
}
