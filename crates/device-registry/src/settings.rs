use crate::node::Node;
use crate::{DeviceError, DeviceKind, Result};
use core::fmt::Display;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Fields every settings variant carries. `address` and `port` are only
/// meaningful for network kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl CommonSettings {
    fn configure(&mut self, node: &Node) {
        if let Some(name) = node.child_raw_text("DeviceName") {
            self.device_name = Some(name.to_string());
        }
    }

    fn fields(&self, out: &mut Vec<(&'static str, String)>) {
        if let Some(name) = &self.device_name {
            out.push(("DeviceName", name.clone()));
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
}

impl SerialPortSettings {
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            common: CommonSettings::default(),
            port_name: Some(port_name.into()),
            baud_rate: Some(baud_rate),
        }
    }

    fn configure(&mut self, node: &Node) -> Result<()> {
        self.common.configure(node);
        if let Some(port_name) = node.child_raw_text("PortName") {
            self.port_name = Some(port_name.to_string());
        }
        if let Some(raw) = node.child_text("BaudRate") {
            self.baud_rate = Some(parse_number("BaudRate", raw)?);
        }
        Ok(())
    }

    fn fields(&self, out: &mut Vec<(&'static str, String)>) {
        self.common.fields(out);
        if let Some(port_name) = &self.port_name {
            out.push(("PortName", port_name.clone()));
        }
        if let Some(baud_rate) = self.baud_rate {
            out.push(("BaudRate", baud_rate.to_string()));
        }
    }
}

/// Listener endpoint lives in the common `address`/`port` fields.
///
/// `TcpPort` is read as a `u16`, so a port outside `0..=65535` is rejected
/// when the document is loaded rather than when the listener binds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpListenerSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
}

impl TcpListenerSettings {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            common: CommonSettings {
                device_name: None,
                address: Some(address.into()),
                port: Some(port),
            },
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.common.address.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.common.port
    }

    fn configure(&mut self, node: &Node) -> Result<()> {
        self.common.configure(node);
        if let Some(address) = node.child_raw_text("TcpAddress") {
            self.common.address = Some(address.to_string());
        }
        if let Some(raw) = node.child_text("TcpPort") {
            self.common.port = Some(parse_number("TcpPort", raw)?);
        }
        Ok(())
    }

    fn fields(&self, out: &mut Vec<(&'static str, String)>) {
        self.common.fields(out);
        if let Some(address) = &self.common.address {
            out.push(("TcpAddress", address.clone()));
        }
        if let Some(port) = self.common.port {
            out.push(("TcpPort", port.to_string()));
        }
    }
}

/// Kind-specific configuration payload of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceSettings {
    SerialPort(SerialPortSettings),
    TcpListener(TcpListenerSettings),
}

impl DeviceSettings {
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceSettings::SerialPort(_) => DeviceKind::SerialPort,
            DeviceSettings::TcpListener(_) => DeviceKind::TcpListener,
        }
    }

    pub fn common(&self) -> &CommonSettings {
        match self {
            DeviceSettings::SerialPort(s) => &s.common,
            DeviceSettings::TcpListener(s) => &s.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut CommonSettings {
        match self {
            DeviceSettings::SerialPort(s) => &mut s.common,
            DeviceSettings::TcpListener(s) => &mut s.common,
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.common().device_name.as_deref()
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.common_mut().device_name = Some(name.into());
        self
    }

    /// Read this variant's sub-fields from a raw `<Settings>` node.
    ///
    /// Absent elements leave the field untouched; present numeric elements
    /// that fail to parse are rejected.
    pub fn configure(&mut self, node: &Node) -> Result<()> {
        match self {
            DeviceSettings::SerialPort(s) => s.configure(node),
            DeviceSettings::TcpListener(s) => s.configure(node),
        }
    }

    /// Element name / text pairs for the fields that are set, in document
    /// order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        match self {
            DeviceSettings::SerialPort(s) => s.fields(&mut out),
            DeviceSettings::TcpListener(s) => s.fields(&mut out),
        }
        out
    }
}

impl From<SerialPortSettings> for DeviceSettings {
    fn from(s: SerialPortSettings) -> Self {
        DeviceSettings::SerialPort(s)
    }
}

impl From<TcpListenerSettings> for DeviceSettings {
    fn from(s: TcpListenerSettings) -> Self {
        DeviceSettings::TcpListener(s)
    }
}

fn parse_number<T>(field: &'static str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>()
        .map_err(|e| DeviceError::malformed(field, format!("{raw:?}: {e}")))
}
