//! device-registry: XML-backed registry of serial and network device descriptors
//!
//! Every device carries a kind tag, a kind-specific settings payload and,
//! once requested, a live instance built from those settings. Documents are
//! loaded and saved through [`DeviceManager`] or the free functions in the
//! loader module.

mod error;
pub use error::{DeviceError, Result};

mod kind;
pub use kind::{configure_settings, create_instance, create_settings, DeviceKind};

mod settings;
pub use settings::{CommonSettings, DeviceSettings, SerialPortSettings, TcpListenerSettings};

mod instance;
#[cfg(feature = "serial")]
pub use instance::available_ports;
pub use instance::{
    DeviceInstance, SerialPortHandle, SerialPortInfo, TcpListenerHandle, DEFAULT_BAUD_RATE,
};

mod device;
pub use device::{Device, Lifecycle};

mod node;
pub use node::Node;

mod loader;
pub use loader::{
    load_devices_file, parse_devices, render_devices, save_devices_file, DeviceManager,
};

mod metrics;
pub use metrics::MetricsHub;
