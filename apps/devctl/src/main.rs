use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use device_registry as devreg;
use devreg::{Device, DeviceError, DeviceManager, DeviceSettings, Lifecycle};

#[derive(Parser, Debug)]
#[command(
    name = "devctl",
    version,
    about = "Manage serial and TCP device descriptors",
    disable_help_subcommand = true
)]
struct Cli {
    /// Device document (XML)
    #[arg(long, global = true, default_value = "devices.xml")]
    file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the document and report how many devices it holds
    Validate {
        /// Print JSON after validation
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List devices in the document
    List,
    /// List known device kinds
    Kinds,
    /// Append a serial port device (creates the document if missing)
    AddSerial {
        /// Port name, e.g. COM3 or /dev/ttyUSB0
        #[arg(long)]
        port_name: String,
        #[arg(long, default_value_t = devreg::DEFAULT_BAUD_RATE)]
        baud_rate: u32,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Mark the device as approved for use
        #[arg(long, action = ArgAction::SetTrue)]
        registered: bool,
    },
    /// Append a TCP listener device (creates the document if missing)
    AddTcp {
        /// IP address to listen on
        #[arg(long, default_value = "0.0.0.0")]
        address: String,
        #[arg(long)]
        port: u16,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Mark the device as approved for use
        #[arg(long, action = ArgAction::SetTrue)]
        registered: bool,
    },
    /// Build instances, apply settings and run the start/stop hooks
    Apply {
        /// Include devices that are not registered
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,
    },
    /// Load the document and print Prometheus metrics
    Metrics,
    /// List serial ports on this host
    #[cfg(feature = "serial")]
    Ports,
}

#[derive(Serialize)]
struct DeviceView<'a> {
    kind: devreg::DeviceKind,
    is_registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<&'a DeviceSettings>,
}

impl<'a> From<&'a Device> for DeviceView<'a> {
    fn from(d: &'a Device) -> Self {
        Self {
            kind: d.kind(),
            is_registered: d.is_registered,
            settings: d.settings.as_ref(),
        }
    }
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { json } => device_validate(&cli.file, json),
        Commands::List => device_list(&cli.file),
        Commands::Kinds => kind_list(),
        Commands::AddSerial {
            port_name,
            baud_rate,
            name,
            registered,
        } => {
            let settings = devreg::SerialPortSettings::new(port_name, baud_rate);
            device_add(&cli.file, settings.into(), name, registered)
        }
        Commands::AddTcp {
            address,
            port,
            name,
            registered,
        } => {
            let settings = devreg::TcpListenerSettings::new(address, port);
            device_add(&cli.file, settings.into(), name, registered)
        }
        Commands::Apply { all } => device_apply(&cli.file, all),
        Commands::Metrics => metrics_dump(&cli.file),
        #[cfg(feature = "serial")]
        Commands::Ports => port_list(),
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn device_validate(file: &Path, json: bool) -> Result<()> {
    let devices = devreg::load_devices_file(file)
        .with_context(|| format!("loading {}", file.display()))?;
    println!("ok: loaded {} devices", devices.len());
    if json {
        let views: Vec<DeviceView> = devices.iter().map(DeviceView::from).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
    }
    Ok(())
}

fn device_list(file: &Path) -> Result<()> {
    let devices = devreg::load_devices_file(file)
        .with_context(|| format!("loading {}", file.display()))?;
    for (i, d) in devices.iter().enumerate() {
        println!(
            "{i}\t{}\t{}\t{}\t{}",
            d.kind(),
            if d.is_registered { "registered" } else { "-" },
            d.display_name(),
            settings_endpoint(d).unwrap_or_else(|| "-".into())
        );
    }
    Ok(())
}

fn kind_list() -> Result<()> {
    for kind in devreg::DeviceKind::ALL {
        println!(
            "{kind}\tsettings={}\tinstance={}",
            kind.has_settings(),
            kind.has_instance()
        );
    }
    Ok(())
}

fn device_add(
    file: &Path,
    settings: DeviceSettings,
    name: Option<String>,
    registered: bool,
) -> Result<()> {
    let mut manager = open_or_create(file)?;
    let settings = match name {
        Some(n) => settings.with_device_name(n),
        None => settings,
    };
    let device = Device::with_settings(settings).registered(registered);
    println!(
        "added: {} ({})",
        device.display_name(),
        settings_endpoint(&device).unwrap_or_else(|| "-".into())
    );
    manager.push(device);
    manager
        .save(file)
        .with_context(|| format!("saving {}", file.display()))?;
    println!("ok: {} devices in {}", manager.len(), file.display());
    Ok(())
}

fn device_apply(file: &Path, all: bool) -> Result<()> {
    let mut manager = DeviceManager::new();
    manager
        .load(file)
        .with_context(|| format!("loading {}", file.display()))?;
    let applied = manager.activate(all).map_err(|e| {
        error!(error = %e, "applying device settings failed");
        e
    })?;
    info!(applied, "device instances configured");

    for device in manager.devices_mut() {
        let Some(endpoint) = device.instance().map(|i| i.endpoint()) else {
            continue;
        };
        device.start()?;
        println!(
            "{}\t{}\t{}",
            device.kind(),
            device.display_name(),
            endpoint.unwrap_or_else(|| "-".into())
        );
    }
    for device in manager.devices_mut() {
        if device.instance().is_some() {
            device.stop()?;
        }
    }
    Ok(())
}

fn metrics_dump(file: &Path) -> Result<()> {
    let hub = devreg::MetricsHub::new().map_err(anyhow::Error::msg)?;
    let mut manager = DeviceManager::new().with_metrics(hub);
    manager
        .load(file)
        .with_context(|| format!("loading {}", file.display()))?;
    if let Some(hub) = manager.metrics() {
        print!("{}", hub.encode_text());
    }
    Ok(())
}

#[cfg(feature = "serial")]
fn port_list() -> Result<()> {
    for port in devreg::available_ports()? {
        println!("{}\t{}", port.name, port.driver);
    }
    Ok(())
}

fn open_or_create(file: &Path) -> Result<DeviceManager> {
    let mut manager = DeviceManager::new();
    match manager.load(file) {
        Ok(n) => info!(devices = n, path = %file.display(), "loaded device document"),
        Err(DeviceError::SourceNotFound(_)) => {
            info!(path = %file.display(), "starting a new device document")
        }
        Err(e) => return Err(e).with_context(|| format!("loading {}", file.display())),
    }
    Ok(manager)
}

/// Endpoint described by a device's settings, independent of any instance.
fn settings_endpoint(device: &Device) -> Option<String> {
    match device.settings.as_ref()? {
        DeviceSettings::SerialPort(s) => {
            let port = s.port_name.as_deref()?;
            Some(match s.baud_rate {
                Some(baud) => format!("{port}@{baud}"),
                None => port.to_string(),
            })
        }
        DeviceSettings::TcpListener(s) => {
            Some(format!("{}:{}", s.address()?, s.port()?))
        }
    }
}
