//! Prometheus series for document and instance activity.

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Load/save/apply counters, registered on a Prometheus [`Registry`].
#[derive(Clone)]
pub struct MetricsHub {
    registry: Registry,
    documents_loaded: IntCounter,
    documents_saved: IntCounter,
    devices_held: IntGauge,
    instances_applied: IntCounter,
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        Self::with_registry(Registry::new())
    }

    /// Register the series on an existing registry. Fails if any of the
    /// names is already taken there.
    pub fn with_registry(registry: Registry) -> Result<Self, String> {
        let documents_loaded = register(
            &registry,
            IntCounter::new("devreg_documents_loaded", "Device documents loaded"),
        )?;
        let documents_saved = register(
            &registry,
            IntCounter::new("devreg_documents_saved", "Device documents saved"),
        )?;
        let devices_held = register(
            &registry,
            IntGauge::new(
                "devreg_devices_loaded",
                "Number of devices held after the last load",
            ),
        )?;
        let instances_applied = register(
            &registry,
            IntCounter::new(
                "devreg_instances_applied",
                "Device instances created and configured",
            ),
        )?;
        Ok(Self {
            registry,
            documents_loaded,
            documents_saved,
            devices_held,
            instances_applied,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_load(&self, devices: usize) {
        self.documents_loaded.inc();
        self.devices_held.set(i64::try_from(devices).unwrap_or(i64::MAX));
    }

    pub fn record_save(&self) {
        self.documents_saved.inc();
    }

    pub fn record_apply(&self) {
        self.instances_applied.inc();
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

fn register<C>(registry: &Registry, metric: prometheus::Result<C>) -> Result<C, String>
where
    C: Collector + Clone + 'static,
{
    let metric = metric.map_err(|e| format!("metrics init error: {e}"))?;
    registry
        .register(Box::new(metric.clone()))
        .map_err(|e| format!("metrics registration error: {e}"))?;
    Ok(metric)
}
