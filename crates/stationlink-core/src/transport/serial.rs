//! Port discovery
//!
//! Enumerates serial devices for the `-e` listing.

use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashMap;
use std::fmt;
#[cfg(target_os = "linux")]
use std::fs;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM6")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Entry known only by its device path
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
                serial_number: usb.serial_number,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            write!(f, " [{:04x}:{:04x}]", vid, pid)?;
        }
        let label = [self.manufacturer.as_deref(), self.product.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !label.is_empty() {
            write!(f, " {}", label)?;
        }
        if let Some(serial) = &self.serial_number {
            write!(f, " (s/n {})", serial)?;
        }
        Ok(())
    }
}

/// Sort key placing COM ports numerically, then ttyUSB*, then ttyACM*,
/// then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let numbered = |prefix: &str| {
        basename
            .strip_prefix(prefix)
            .map(|rest| rest.parse::<usize>().unwrap_or(usize::MAX))
    };
    if let Some(num) = numbered("COM") {
        return (0, num, basename.to_string());
    }
    if let Some(num) = numbered("ttyUSB") {
        return (1, num, basename.to_string());
    }
    if let Some(num) = numbered("ttyACM") {
        return (2, num, basename.to_string());
    }
    (3, 0, basename.to_string())
}

fn sorted(map: HashMap<String, PortInfo>) -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = map.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// List available serial ports in a deterministic order
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    match serialport::available_ports() {
        Ok(found) => {
            for info in found {
                let port = PortInfo::from(info);
                map.entry(port.name.clone()).or_insert(port);
            }
        }
        Err(e) => tracing::warn!("port enumeration failed: {}", e),
    }

    // USB adapters that udev has not described yet still show up in /dev
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyUSB") || fname.starts_with("ttyACM") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    sorted(map)
}
