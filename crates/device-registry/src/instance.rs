use crate::settings::{DeviceSettings, SerialPortSettings, TcpListenerSettings};
use crate::{DeviceError, DeviceKind, Result};
use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener};

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Serial port configuration holder. The port is never opened here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortHandle {
    port_name: String,
    baud_rate: u32,
}

impl Default for SerialPortHandle {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl SerialPortHandle {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Builder for opening the configured port with the `serialport` crate.
    #[cfg(feature = "serial")]
    pub fn builder(&self) -> serialport::SerialPortBuilder {
        serialport::new(self.port_name.clone(), self.baud_rate)
    }

    fn apply(&mut self, settings: &SerialPortSettings) {
        if let Some(port_name) = &settings.port_name {
            self.port_name = port_name.clone();
        }
        if let Some(baud_rate) = settings.baud_rate {
            self.baud_rate = baud_rate;
        }
    }
}

/// TCP listener that stays unbound until settings are applied.
#[derive(Debug, Default)]
pub struct TcpListenerHandle {
    listener: Option<TcpListener>,
}

impl TcpListenerHandle {
    pub fn is_bound(&self) -> bool {
        self.listener.is_some()
    }

    /// Local endpoint once bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn listener(&self) -> Option<&TcpListener> {
        self.listener.as_ref()
    }

    pub fn bind(&mut self, endpoint: SocketAddr) -> Result<()> {
        if let Some(current) = self.local_addr() {
            return Err(bind_failure(
                endpoint.to_string(),
                io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!("listener already bound to {current}"),
                ),
            ));
        }
        let listener =
            TcpListener::bind(endpoint).map_err(|e| bind_failure(endpoint.to_string(), e))?;
        self.listener = Some(listener);
        Ok(())
    }

    fn apply(&mut self, settings: &TcpListenerSettings) -> Result<()> {
        let address = settings.address().ok_or_else(|| {
            bind_failure(
                "<unset>".to_string(),
                io::Error::new(io::ErrorKind::InvalidInput, "no listen address configured"),
            )
        })?;
        let ip: IpAddr = address.parse().map_err(|e| {
            bind_failure(
                address.to_string(),
                io::Error::new(io::ErrorKind::InvalidInput, e),
            )
        })?;
        let port = settings.port().ok_or_else(|| {
            bind_failure(
                address.to_string(),
                io::Error::new(io::ErrorKind::InvalidInput, "no listen port configured"),
            )
        })?;
        self.bind(SocketAddr::new(ip, port))
    }
}

fn bind_failure(endpoint: String, source: io::Error) -> DeviceError {
    DeviceError::BindFailure { endpoint, source }
}

/// Kind-specific native handle attached to a device.
#[derive(Debug)]
pub enum DeviceInstance {
    SerialPort(SerialPortHandle),
    TcpListener(TcpListenerHandle),
}

impl DeviceInstance {
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceInstance::SerialPort(_) => DeviceKind::SerialPort,
            DeviceInstance::TcpListener(_) => DeviceKind::TcpListener,
        }
    }

    /// Copy `settings` onto this instance. A listener binds as a side effect.
    /// On error the instance is left as it was.
    pub fn apply(&mut self, settings: &DeviceSettings) -> Result<()> {
        match (self, settings) {
            (DeviceInstance::SerialPort(handle), DeviceSettings::SerialPort(s)) => {
                handle.apply(s);
                Ok(())
            }
            (DeviceInstance::TcpListener(handle), DeviceSettings::TcpListener(s)) => handle.apply(s),
            (instance, settings) => Err(DeviceError::VariantMismatch {
                settings: Some(settings.kind()),
                instance: Some(instance.kind()),
            }),
        }
    }

    /// Human-readable endpoint, e.g. `COM3@115200` or `127.0.0.1:5000`.
    pub fn endpoint(&self) -> Option<String> {
        match self {
            DeviceInstance::SerialPort(h) if h.port_name.is_empty() => None,
            DeviceInstance::SerialPort(h) => Some(format!("{}@{}", h.port_name, h.baud_rate)),
            DeviceInstance::TcpListener(h) => h.local_addr().map(|a| a.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    pub name: String,
    pub driver: String,
}

/// Enumerate serial ports visible to the host.
#[cfg(feature = "serial")]
pub fn available_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()
        .map_err(|e| DeviceError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let driver = match p.port_type {
                serialport::SerialPortType::UsbPort(_) => "usb",
                serialport::SerialPortType::PciPort => "pci",
                serialport::SerialPortType::BluetoothPort => "bluetooth",
                serialport::SerialPortType::Unknown => "serial",
            };
            SerialPortInfo {
                name: p.port_name,
                driver: driver.to_string(),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_apply_copies_set_fields() {
        let mut instance = DeviceInstance::SerialPort(SerialPortHandle::default());
        assert_eq!(instance.endpoint(), None);
        instance
            .apply(&SerialPortSettings::new("COM3", 115_200).into())
            .unwrap();
        match &instance {
            DeviceInstance::SerialPort(h) => {
                assert_eq!(h.port_name(), "COM3");
                assert_eq!(h.baud_rate(), 115_200);
            }
            other => panic!("unexpected instance {other:?}"),
        }
        assert_eq!(instance.endpoint().as_deref(), Some("COM3@115200"));
    }

    #[test]
    fn serial_apply_keeps_defaults_for_unset_fields() {
        let mut handle = SerialPortHandle::default();
        handle.apply(&SerialPortSettings {
            port_name: Some("/dev/ttyACM0".into()),
            ..Default::default()
        });
        assert_eq!(handle.port_name(), "/dev/ttyACM0");
        assert_eq!(handle.baud_rate(), DEFAULT_BAUD_RATE);
    }

    #[test]
    fn listener_starts_unbound_and_binds_on_apply() {
        let mut instance = DeviceInstance::TcpListener(TcpListenerHandle::default());
        assert_eq!(instance.endpoint(), None);
        instance
            .apply(&TcpListenerSettings::new("127.0.0.1", 0).into())
            .unwrap();
        let DeviceInstance::TcpListener(handle) = &instance else {
            panic!("expected listener");
        };
        assert!(handle.is_bound());
        let addr = handle.local_addr().unwrap();
        assert_eq!(addr.ip(), "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_ne!(addr.port(), 0);
    }

    #[test]
    fn rebinding_a_bound_listener_fails() {
        let mut handle = TcpListenerHandle::default();
        handle.apply(&TcpListenerSettings::new("127.0.0.1", 0)).unwrap();
        let first = handle.local_addr().unwrap();
        let err = handle
            .apply(&TcpListenerSettings::new("127.0.0.1", 0))
            .unwrap_err();
        assert!(matches!(err, DeviceError::BindFailure { .. }));
        assert_eq!(handle.local_addr(), Some(first));
    }

    #[test]
    fn port_in_use_is_a_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let mut handle = TcpListenerHandle::default();
        let err = handle
            .apply(&TcpListenerSettings::new("127.0.0.1", port))
            .unwrap_err();
        match err {
            DeviceError::BindFailure { endpoint, source } => {
                assert_eq!(endpoint, format!("127.0.0.1:{port}"));
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!handle.is_bound());
    }

    #[test]
    fn invalid_address_is_a_bind_failure() {
        let mut handle = TcpListenerHandle::default();
        let err = handle
            .apply(&TcpListenerSettings::new("not-an-ip", 5000))
            .unwrap_err();
        assert!(matches!(err, DeviceError::BindFailure { endpoint, .. } if endpoint == "not-an-ip"));

        let err = handle.apply(&TcpListenerSettings::default()).unwrap_err();
        assert!(matches!(err, DeviceError::BindFailure { .. }));
        assert!(!handle.is_bound());
    }

    #[test]
    fn mismatched_variants_leave_instance_untouched() {
        let mut instance = DeviceInstance::SerialPort(SerialPortHandle::default());
        let err = instance
            .apply(&TcpListenerSettings::new("127.0.0.1", 0).into())
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::VariantMismatch {
                settings: Some(DeviceKind::TcpListener),
                instance: Some(DeviceKind::SerialPort),
            }
        ));
        match instance {
            DeviceInstance::SerialPort(h) => assert_eq!(h, SerialPortHandle::default()),
            other => panic!("unexpected instance {other:?}"),
        }
    }
}
