//! Identity types for blescan
//!
//! Devices are keyed by their hardware address as reported by the driver.
//! Subscriptions are keyed by small opaque counters.

use std::fmt;
use std::sync::Arc;

/// Device identity - stable key across repeated sightings of the same device
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(Arc<str>);

impl DeviceAddress {
    #[inline]
    pub fn new(address: impl AsRef<str>) -> Self {
        DeviceAddress(Arc::from(address.as_ref()))
    }

    /// Build from six raw bytes, most significant first (`AA:BB:CC:DD:EE:FF`)
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let text = bytes
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":");
        DeviceAddress(Arc::from(text.as_str()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the address looks like a colon separated 48-bit MAC
    pub fn is_mac(&self) -> bool {
        let parts: Vec<&str> = self.0.split(':').collect();
        parts.len() == 6
            && parts
                .iter()
                .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

impl From<&str> for DeviceAddress {
    fn from(value: &str) -> Self {
        DeviceAddress::new(value)
    }
}

impl From<String> for DeviceAddress {
    fn from(value: String) -> Self {
        DeviceAddress(Arc::from(value))
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Device({})", self.0)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observer registration on an [`Observable`](crate::Observable)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObserverId(pub u64);

impl fmt::Debug for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observer({})", self.0)
    }
}

/// Callback registration on a [`Cancellation`](crate::Cancellation)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallbackId(pub u64);

impl fmt::Debug for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_bytes() {
        let addr = DeviceAddress::from_bytes([0xAA, 0xBB, 0x0C, 0x0D, 0xEE, 0x01]);
        assert_eq!(addr.as_str(), "AA:BB:0C:0D:EE:01");
        assert!(addr.is_mac());
    }

    #[test]
    fn test_address_free_form() {
        let addr = DeviceAddress::from("device-1");
        assert!(!addr.is_mac());
        assert_eq!(addr, DeviceAddress::new(String::from("device-1")));
        assert_eq!(addr.to_string(), "device-1");
    }
}
