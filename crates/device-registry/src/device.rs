use crate::instance::DeviceInstance;
use crate::kind::{create_instance, create_settings};
use crate::settings::DeviceSettings;
use crate::{DeviceError, DeviceKind, Result};
use tracing::info;

/// One managed endpoint: a kind, its settings, the operator approval flag
/// and an optional live instance. The instance is process-local and never
/// persisted.
#[derive(Debug)]
pub struct Device {
    kind: DeviceKind,
    pub settings: Option<DeviceSettings>,
    pub is_registered: bool,
    instance: Option<DeviceInstance>,
}

impl Device {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            settings: None,
            is_registered: false,
            instance: None,
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self> {
        Ok(Self::new(DeviceKind::resolve(tag)?))
    }

    /// Device of the settings' kind carrying those settings.
    pub fn with_settings(settings: impl Into<DeviceSettings>) -> Self {
        let settings = settings.into();
        let mut device = Self::new(settings.kind());
        device.settings = Some(settings);
        device
    }

    pub fn registered(mut self, is_registered: bool) -> Self {
        self.is_registered = is_registered;
        self
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Re-tag the device. Settings and instance are left alone; callers
    /// re-derive them.
    pub fn assign_kind(&mut self, tag: &str) -> Result<()> {
        self.kind = DeviceKind::resolve(tag)?;
        Ok(())
    }

    /// Replace the settings with a zero-valued variant for the current kind.
    /// Kinds without a settings variant end up with none.
    pub fn create_settings(&mut self) -> Option<&mut DeviceSettings> {
        self.settings = create_settings(self.kind);
        self.settings.as_mut()
    }

    /// Replace the instance with a fresh one for the current kind.
    pub fn create_instance(&mut self) -> Result<&mut DeviceInstance> {
        let instance = create_instance(self.kind)?;
        Ok(self.instance.insert(instance))
    }

    pub fn instance(&self) -> Option<&DeviceInstance> {
        self.instance.as_ref()
    }

    pub fn instance_mut(&mut self) -> Option<&mut DeviceInstance> {
        self.instance.as_mut()
    }

    pub fn take_instance(&mut self) -> Option<DeviceInstance> {
        self.instance.take()
    }

    /// Push the held settings into the held instance. Both must be present
    /// and of the device's current kind.
    pub fn apply_settings(&mut self) -> Result<()> {
        let kind = self.kind;
        match (self.settings.as_ref(), self.instance.as_mut()) {
            (Some(settings), Some(instance))
                if settings.kind() == kind && instance.kind() == kind =>
            {
                instance.apply(settings)
            }
            (settings, instance) => Err(DeviceError::VariantMismatch {
                settings: settings.map(DeviceSettings::kind),
                instance: instance.map(|i| i.kind()),
            }),
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.is_registered == other.is_registered
            && self.settings == other.settings
    }
}

/// Start/stop hooks. The defaults only announce the transition.
pub trait Lifecycle {
    fn display_name(&self) -> &str;

    fn start(&mut self) -> Result<()> {
        info!("Starting {} ...", self.display_name());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        info!("Stopping {} ...", self.display_name());
        Ok(())
    }
}

impl Lifecycle for Device {
    /// Configured device name, else the kind tag.
    fn display_name(&self) -> &str {
        self.settings
            .as_ref()
            .and_then(DeviceSettings::device_name)
            .unwrap_or(self.kind.as_str())
    }
}
