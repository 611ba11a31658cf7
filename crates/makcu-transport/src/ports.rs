//! Serial port enumeration and candidate filtering.
//!
//! The device enumerates as a WCH CH343 USB-serial bridge. Candidate
//! ports are matched by USB vendor/product id first, with description
//! heuristics for platforms whose driver reports only a product string
//! (the older CH340 string shows up with some driver versions).

use tokio_serial::{SerialPortType, UsbPortInfo};

use makcu_core::error::{Error, Result};
use makcu_core::types::DeviceInfo;

/// USB vendor id of the device's serial bridge (WCH).
pub const VENDOR_ID: u16 = 0x1A86;
/// USB product id of the device's serial bridge (CH343).
pub const PRODUCT_ID: u16 = 0x55D3;
/// Primary product description to match.
pub const PRIMARY_DESCRIPTION: &str = "USB-Enhanced-SERIAL CH343";
/// Fallback description reported by some driver versions.
pub const FALLBACK_DESCRIPTION: &str = "USB-SERIAL CH340";

/// List the names of all serial ports the OS knows about.
pub fn available_port_names() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::PortOpenFailed(format!("port enumeration failed: {e}")))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// List candidate device ports, best match first.
///
/// A port qualifies if its USB ids match the CH343 bridge or its
/// description matches one of the known product strings. Exact-id and
/// CH343 matches sort before CH340 fallback matches.
pub fn find_device_ports() -> Result<Vec<DeviceInfo>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::PortOpenFailed(format!("port enumeration failed: {e}")))?;

    let mut candidates: Vec<(u8, DeviceInfo)> = Vec::new();
    for port in ports {
        let SerialPortType::UsbPort(usb) = &port.port_type else {
            continue;
        };
        if let Some(rank) = candidate_rank(usb) {
            tracing::debug!(port = %port.port_name, vid = usb.vid, pid = usb.pid, "Candidate device port");
            candidates.push((
                rank,
                DeviceInfo {
                    port: port.port_name,
                    description: usb
                        .product
                        .clone()
                        .unwrap_or_else(|| PRIMARY_DESCRIPTION.to_string()),
                    vid: usb.vid,
                    pid: usb.pid,
                    connected: false,
                },
            ));
        }
    }

    candidates.sort_by_key(|(rank, _)| *rank);
    Ok(candidates.into_iter().map(|(_, info)| info).collect())
}

/// The first candidate device port, if any.
pub fn find_first_device() -> Result<Option<String>> {
    Ok(find_device_ports()?.into_iter().next().map(|d| d.port))
}

/// Rank a USB port as a candidate: 0 for an id or CH343 match, 1 for the
/// CH340 fallback string, `None` for everything else.
fn candidate_rank(usb: &UsbPortInfo) -> Option<u8> {
    if usb.vid == VENDOR_ID && usb.pid == PRODUCT_ID {
        return Some(0);
    }
    let product = usb.product.as_deref().unwrap_or("");
    if product.contains(PRIMARY_DESCRIPTION) {
        Some(0)
    } else if product.contains(FALLBACK_DESCRIPTION) {
        Some(1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(vid: u16, pid: u16, product: Option<&str>) -> UsbPortInfo {
        UsbPortInfo {
            vid,
            pid,
            serial_number: None,
            manufacturer: None,
            product: product.map(str::to_string),
        }
    }

    #[test]
    fn matches_by_usb_ids() {
        assert_eq!(candidate_rank(&usb(VENDOR_ID, PRODUCT_ID, None)), Some(0));
    }

    #[test]
    fn matches_primary_description_without_ids() {
        assert_eq!(
            candidate_rank(&usb(0x0000, 0x0000, Some("USB-Enhanced-SERIAL CH343 (COM5)"))),
            Some(0)
        );
    }

    #[test]
    fn fallback_description_ranks_lower() {
        assert_eq!(
            candidate_rank(&usb(0x0000, 0x0000, Some("USB-SERIAL CH340"))),
            Some(1)
        );
    }

    #[test]
    fn unrelated_ports_are_rejected() {
        assert_eq!(candidate_rank(&usb(0x0403, 0x6001, Some("FT232R"))), None);
        assert_eq!(candidate_rank(&usb(0x0000, 0x0000, None)), None);
    }
}
