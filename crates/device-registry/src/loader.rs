use crate::device::Device;
use crate::kind::configure_settings;
use crate::metrics::MetricsHub;
use crate::node::Node;
use crate::{DeviceError, DeviceKind, Result};
use core::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

const ROOT: &str = "Devices";
const DEVICE: &str = "Device";
const TYPE: &str = "Type";
const IS_REGISTERED: &str = "IsRegistered";
const SETTINGS: &str = "Settings";

/// Load every device in the document at `path`, in document order.
///
/// One bad record fails the whole load.
pub fn load_devices_file(path: impl AsRef<Path>) -> Result<Vec<Device>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DeviceError::SourceNotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path)?;
    let devices = parse_devices(&raw)?;
    debug!(path = %path.display(), count = devices.len(), "loaded device document");
    Ok(devices)
}

pub fn parse_devices(xml: &str) -> Result<Vec<Device>> {
    let root = Node::parse(xml)?;
    if root.name != ROOT {
        return Err(DeviceError::malformed(
            "Devices",
            format!("expected root element <{ROOT}>, found <{}>", root.name),
        ));
    }
    root.children_named(DEVICE)
        .enumerate()
        .map(|(index, node)| {
            decode_device(node).map_err(|e| {
                warn!(index, error = %e, "rejecting device record");
                e
            })
        })
        .collect()
}

fn decode_device(node: &Node) -> Result<Device> {
    let tag = node
        .child_text(TYPE)
        .ok_or_else(|| DeviceError::malformed("Type", "missing device type"))?;
    let kind = DeviceKind::resolve(tag)?;
    let is_registered = parse_flag(node.child_text(IS_REGISTERED))?;

    let mut device = Device::new(kind).registered(is_registered);
    device.settings = configure_settings(kind, node.child(SETTINGS))?;
    Ok(device)
}

fn parse_flag(raw: Option<&str>) -> Result<bool> {
    let raw = raw.ok_or_else(|| DeviceError::malformed("IsRegistered", "missing flag"))?;
    if raw.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(DeviceError::malformed(
            "IsRegistered",
            format!("{raw:?} is not a boolean"),
        ))
    }
}

/// Overwrite `path` with the serialized devices. Instances are not written.
pub fn save_devices_file(devices: &[Device], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let xml = render_devices(devices)?;
    fs::write(path, xml)?;
    debug!(path = %path.display(), count = devices.len(), "saved device document");
    Ok(())
}

pub fn render_devices(devices: &[Device]) -> Result<String> {
    let mut root = Node::new(ROOT);
    for device in devices {
        root.push(encode_device(device));
    }
    root.to_xml()
}

fn encode_device(device: &Device) -> Node {
    let mut node = Node::new(DEVICE);
    node.push(Node::with_text(TYPE, device.kind().as_str()));
    node.push(Node::with_text(
        IS_REGISTERED,
        if device.is_registered { "true" } else { "false" },
    ));
    if let Some(settings) = &device.settings {
        let mut settings_node = Node::new(SETTINGS);
        for (name, value) in settings.fields() {
            settings_node.push(Node::with_text(name, value));
        }
        node.push(settings_node);
    }
    node
}

/// Owns the device list behind a document.
#[derive(Default)]
pub struct DeviceManager {
    devices: Vec<Device>,
    metrics: Option<MetricsHub>,
}

impl fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceManager")
            .field("devices", &self.devices)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(mut self, hub: MetricsHub) -> Self {
        self.metrics = Some(hub);
        self
    }

    pub fn metrics(&self) -> Option<&MetricsHub> {
        self.metrics.as_ref()
    }

    /// Replace the held list with the contents of `path`. On error the
    /// previous list is kept.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        self.devices = load_devices_file(path)?;
        if let Some(m) = &self.metrics {
            m.record_load(self.devices.len());
        }
        Ok(self.devices.len())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        save_devices_file(&self.devices, path)?;
        if let Some(m) = &self.metrics {
            m.record_save();
        }
        Ok(())
    }

    pub fn push(&mut self, device: Device) {
        self.devices.push(device);
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [Device] {
        &mut self.devices
    }

    pub fn into_devices(self) -> Vec<Device> {
        self.devices
    }

    pub fn registered(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_registered)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Create and configure instances for registered devices (or all of
    /// them). Stops at the first failure.
    pub fn activate(&mut self, include_unregistered: bool) -> Result<usize> {
        let mut applied = 0;
        for device in self
            .devices
            .iter_mut()
            .filter(|d| include_unregistered || d.is_registered)
        {
            device.create_instance()?;
            device.apply_settings()?;
            applied += 1;
            if let Some(m) = &self.metrics {
                m.record_apply();
            }
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DeviceSettings, SerialPortSettings, TcpListenerSettings};

    const SCENARIO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Devices>
  <Device>
    <Type>SerialPort</Type>
    <IsRegistered>true</IsRegistered>
    <Settings>
      <PortName>COM3</PortName>
      <BaudRate>115200</BaudRate>
    </Settings>
  </Device>
  <Device>
    <Type>TcpListener</Type>
    <IsRegistered>false</IsRegistered>
    <Settings>
      <TcpAddress>0.0.0.0</TcpAddress>
      <TcpPort>8080</TcpPort>
    </Settings>
  </Device>
</Devices>
"#;

    fn record(kind: &str, flag: &str) -> String {
        format!(
            "<Devices><Device><Type>{kind}</Type><IsRegistered>{flag}</IsRegistered></Device></Devices>"
        )
    }

    #[test]
    fn loads_devices_in_document_order() {
        let devices = parse_devices(SCENARIO).unwrap();
        assert_eq!(devices.len(), 2);

        assert_eq!(devices[0].kind(), DeviceKind::SerialPort);
        assert!(devices[0].is_registered);
        assert_eq!(
            devices[0].settings,
            Some(SerialPortSettings::new("COM3", 115_200).into())
        );
        assert!(devices[0].instance().is_none());

        assert_eq!(devices[1].kind(), DeviceKind::TcpListener);
        assert!(!devices[1].is_registered);
        assert_eq!(
            devices[1].settings,
            Some(TcpListenerSettings::new("0.0.0.0", 8080).into())
        );
        assert!(devices[1].instance().is_none());
    }

    #[test]
    fn unknown_kind_aborts_load() {
        let xml = format!(
            "<Devices><Device><Type>SerialPort</Type><IsRegistered>true</IsRegistered></Device>{}</Devices>",
            "<Device><Type>Bluetooth</Type><IsRegistered>true</IsRegistered></Device>"
        );
        assert!(matches!(
            parse_devices(&xml),
            Err(DeviceError::UnknownKind(tag)) if tag == "Bluetooth"
        ));
    }

    #[test]
    fn registration_flag_must_be_boolean() {
        assert!(matches!(
            parse_devices(&record("SerialPort", "maybe")),
            Err(DeviceError::MalformedField {
                field: "IsRegistered",
                ..
            })
        ));
        assert!(matches!(
            parse_devices("<Devices><Device><Type>SerialPort</Type></Device></Devices>"),
            Err(DeviceError::MalformedField {
                field: "IsRegistered",
                ..
            })
        ));
        let devices = parse_devices(&record("SerialPort", " True ")).unwrap();
        assert!(devices[0].is_registered);
    }

    #[test]
    fn missing_type_is_malformed() {
        assert!(matches!(
            parse_devices("<Devices><Device><IsRegistered>true</IsRegistered></Device></Devices>"),
            Err(DeviceError::MalformedField { field: "Type", .. })
        ));
    }

    #[test]
    fn missing_settings_yield_unset_fields() {
        let devices = parse_devices(&record("TcpListener", "false")).unwrap();
        assert_eq!(
            devices[0].settings,
            Some(DeviceSettings::TcpListener(TcpListenerSettings::default()))
        );
    }

    #[test]
    fn reserved_kind_loads_without_settings() {
        let devices = parse_devices(&record("TcpClient", "false")).unwrap();
        assert_eq!(devices[0].kind(), DeviceKind::TcpClient);
        assert!(devices[0].settings.is_none());
    }

    #[test]
    fn wrong_root_is_malformed() {
        assert!(matches!(
            parse_devices("<Sensors/>"),
            Err(DeviceError::MalformedField {
                field: "Devices",
                ..
            })
        ));
        assert!(parse_devices("<Devices/>").unwrap().is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let devices = vec![
            Device::with_settings(SerialPortSettings::new("COM2", 9600)).registered(true),
            Device::with_settings(
                DeviceSettings::from(TcpListenerSettings::new("127.0.0.1", 5000))
                    .with_device_name("telemetry & control"),
            ),
            Device::with_settings(SerialPortSettings::default()),
            Device::new(DeviceKind::TcpClient).registered(true),
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.xml");
        save_devices_file(&devices, &path).unwrap();
        assert_eq!(load_devices_file(&path).unwrap(), devices);
    }

    #[test]
    fn padded_strings_round_trip() {
        let devices = vec![
            Device::with_settings(
                DeviceSettings::from(SerialPortSettings::new(" COM3 ", 115_200))
                    .with_device_name("  gps  "),
            ),
            Device::with_settings(TcpListenerSettings::new(" 127.0.0.1", 5000)),
        ];
        let xml = render_devices(&devices).unwrap();
        assert!(xml.contains("<PortName> COM3 </PortName>"));
        assert_eq!(parse_devices(&xml).unwrap(), devices);
    }

    #[test]
    fn instances_are_not_serialized() {
        let mut device = Device::with_settings(TcpListenerSettings::new("127.0.0.1", 0));
        device.create_instance().unwrap();
        device.apply_settings().unwrap();
        let xml = render_devices(std::slice::from_ref(&device)).unwrap();
        assert_eq!(parse_devices(&xml).unwrap(), vec![device]);
        assert!(!xml.contains("Instance"));
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.xml");
        assert!(matches!(
            load_devices_file(&path),
            Err(DeviceError::SourceNotFound(p)) if p == path
        ));
    }

    #[test]
    fn manager_keeps_list_on_failed_load() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.xml");
        let bad = dir.path().join("bad.xml");
        fs::write(&good, SCENARIO).unwrap();
        fs::write(&bad, record("Bluetooth", "true")).unwrap();

        let mut manager = DeviceManager::new().with_metrics(MetricsHub::new().unwrap());
        assert_eq!(manager.load(&good).unwrap(), 2);
        assert!(manager.load(&bad).is_err());
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.registered().count(), 1);

        let text = manager.metrics().unwrap().encode_text();
        assert!(text.contains("devreg_documents_loaded 1"));
    }

    #[test]
    fn manager_save_overwrites_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.xml");
        fs::write(&path, SCENARIO).unwrap();

        let mut manager = DeviceManager::new();
        manager.push(Device::with_settings(SerialPortSettings::new("COM9", 19_200)));
        manager.save(&path).unwrap();

        let reloaded = load_devices_file(&path).unwrap();
        assert_eq!(reloaded, manager.into_devices());
    }

    #[test]
    fn activate_binds_registered_listeners() {
        let mut manager = DeviceManager::new().with_metrics(MetricsHub::new().unwrap());
        manager.push(Device::with_settings(TcpListenerSettings::new("127.0.0.1", 0)).registered(true));
        manager.push(Device::with_settings(TcpListenerSettings::new("bogus", 0)));
        manager.push(Device::with_settings(SerialPortSettings::new("COM3", 115_200)).registered(true));

        assert_eq!(manager.activate(false).unwrap(), 2);
        assert!(manager.devices()[0].instance().is_some());
        assert!(manager.devices()[1].instance().is_none());
        assert!(manager.activate(true).is_err());
        assert!(manager
            .metrics()
            .unwrap()
            .encode_text()
            .contains("devreg_instances_applied 3"));
    }
}
