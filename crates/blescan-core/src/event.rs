//! Discovery events and scan configuration
//!
//! A [`ScanEvent`] is one sighting of a device as reported by the driver.
//! Advertisement payloads are AD structures: `[LEN:1][TYPE:1][DATA:LEN-1]`.

use std::time::Duration;

use bytes::Bytes;

use crate::{DeviceAddress, ScanTime, ScannerError, ScannerResult};

/// AD structure types understood by [`ScanRecord::parse`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AdType {
    Flags = 0x01,
    IncompleteServiceUuids16 = 0x02,
    CompleteServiceUuids16 = 0x03,
    ShortLocalName = 0x08,
    CompleteLocalName = 0x09,
    TxPowerLevel = 0x0A,
    ManufacturerData = 0xFF,
}

impl AdType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(AdType::Flags),
            0x02 => Some(AdType::IncompleteServiceUuids16),
            0x03 => Some(AdType::CompleteServiceUuids16),
            0x08 => Some(AdType::ShortLocalName),
            0x09 => Some(AdType::CompleteLocalName),
            0x0A => Some(AdType::TxPowerLevel),
            0xFF => Some(AdType::ManufacturerData),
            _ => None,
        }
    }
}

/// Manufacturer specific data block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManufacturerData {
    pub company_id: u16,
    pub data: Bytes,
}

/// Decoded advertisement record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanRecord {
    /// Advertisement flags (if present)
    pub flags: Option<u8>,
    /// Local name, complete name preferred over the short one
    pub device_name: Option<String>,
    /// 16-bit service UUIDs
    pub service_uuids: Vec<u16>,
    /// Manufacturer specific blocks in advertisement order
    pub manufacturer_data: Vec<ManufacturerData>,
    /// Advertised TX power in dBm
    pub tx_power: Option<i8>,
    /// Raw advertisement bytes
    pub raw: Bytes,
}

impl ScanRecord {
    /// Parse advertisement bytes into a record.
    /// Unknown AD types are skipped, a zero length byte ends the payload.
    pub fn parse(raw: Bytes) -> ScannerResult<Self> {
        let mut record = ScanRecord {
            raw: raw.clone(),
            ..Default::default()
        };
        let buf = &raw[..];
        let mut offset = 0;

        while offset < buf.len() {
            let len = buf[offset] as usize;
            if len == 0 {
                break; // zero padding
            }
            let end = offset + 1 + len;
            if end > buf.len() {
                return Err(ScannerError::BufferTooShort {
                    expected: end,
                    actual: buf.len(),
                });
            }

            let ad_type = buf[offset + 1];
            let data = &buf[offset + 2..end];

            match AdType::from_byte(ad_type) {
                Some(AdType::Flags) => record.flags = data.first().copied(),
                Some(AdType::IncompleteServiceUuids16 | AdType::CompleteServiceUuids16) => {
                    if data.len() % 2 != 0 {
                        return Err(ScannerError::MalformedRecord {
                            offset,
                            reason: "odd length 16-bit uuid list",
                        });
                    }
                    record
                        .service_uuids
                        .extend(data.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])));
                }
                Some(AdType::CompleteLocalName) => {
                    record.device_name = Some(String::from_utf8_lossy(data).into_owned());
                }
                Some(AdType::ShortLocalName) => {
                    if record.device_name.is_none() {
                        record.device_name = Some(String::from_utf8_lossy(data).into_owned());
                    }
                }
                Some(AdType::TxPowerLevel) => record.tx_power = data.first().map(|b| *b as i8),
                Some(AdType::ManufacturerData) => {
                    if data.len() < 2 {
                        return Err(ScannerError::MalformedRecord {
                            offset,
                            reason: "manufacturer data without company id",
                        });
                    }
                    let start = offset + 4;
                    record.manufacturer_data.push(ManufacturerData {
                        company_id: u16::from_le_bytes([data[0], data[1]]),
                        data: raw.slice(start..end),
                    });
                }
                None => {}
            }

            offset = end;
        }

        Ok(record)
    }

    /// Data block for a company id, if advertised
    pub fn manufacturer(&self, company_id: u16) -> Option<&ManufacturerData> {
        self.manufacturer_data
            .iter()
            .find(|m| m.company_id == company_id)
    }
}

/// One sighting of a device
#[derive(Clone, Debug, PartialEq)]
pub struct ScanEvent {
    /// Device identity; drivers occasionally report none
    pub address: Option<DeviceAddress>,
    /// Received signal strength in dBm
    pub rssi: i32,
    /// Advertisement payload; missing on corrupted reports
    pub record: Option<ScanRecord>,
    /// Driver timestamp of the sighting
    pub timestamp: ScanTime,
}

impl ScanEvent {
    pub fn new(address: impl Into<DeviceAddress>, rssi: i32, timestamp: ScanTime) -> Self {
        ScanEvent {
            address: Some(address.into()),
            rssi,
            record: Some(ScanRecord::default()),
            timestamp,
        }
    }

    pub fn with_record(mut self, record: ScanRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Good-event predicate: an identity, a negative RSSI and a payload.
    /// Some stacks report `rssi >= 0` for garbage sightings.
    pub fn is_plausible(&self) -> bool {
        self.address.is_some() && self.rssi < 0 && self.record.is_some()
    }

    pub fn device_name(&self) -> Option<&str> {
        self.record.as_ref().and_then(|r| r.device_name.as_deref())
    }
}

/// Device filter; every field that is set must match
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub device_name: Option<String>,
    pub address: Option<DeviceAddress>,
    pub service_uuid: Option<u16>,
    pub manufacturer_id: Option<u16>,
}

impl ScanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<DeviceAddress>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_service_uuid(mut self, uuid: u16) -> Self {
        self.service_uuid = Some(uuid);
        self
    }

    pub fn with_manufacturer_id(mut self, company_id: u16) -> Self {
        self.manufacturer_id = Some(company_id);
        self
    }

    pub fn matches(&self, event: &ScanEvent) -> bool {
        if let Some(address) = &self.address {
            if event.address.as_ref() != Some(address) {
                return false;
            }
        }
        if let Some(name) = &self.device_name {
            if event.device_name() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(uuid) = self.service_uuid {
            let advertised = event
                .record
                .as_ref()
                .is_some_and(|r| r.service_uuids.contains(&uuid));
            if !advertised {
                return false;
            }
        }
        if let Some(company_id) = self.manufacturer_id {
            let advertised = event
                .record
                .as_ref()
                .is_some_and(|r| r.manufacturer(company_id).is_some());
            if !advertised {
                return false;
            }
        }
        true
    }
}

/// Driver scan mode, trading latency for power
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ScanMode {
    Opportunistic,
    LowPower,
    Balanced,
    #[default]
    LowLatency,
}

/// Settings handed to the driver on every acquisition
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanSettings {
    pub mode: ScanMode,
    /// Batching delay requested from the driver (zero = report immediately)
    pub report_delay: Duration,
    /// Offload filters to the controller when the hardware supports it
    pub hardware_filtering: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        ScanSettings {
            mode: ScanMode::LowLatency,
            report_delay: Duration::ZERO,
            hardware_filtering: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn advertisement() -> Bytes {
        let mut buf = vec![0x02, 0x01, 0x06]; // flags
        buf.extend_from_slice(&[0x05, 0x03, 0x0F, 0x18, 0x0A, 0x18]); // uuids 0x180F, 0x180A
        buf.extend_from_slice(&[0x05, 0x09, b'b', b'e', b'a', b'n']); // name
        buf.extend_from_slice(&[0x05, 0xFF, 0x4C, 0x00, 0x02, 0x15]); // apple, 2 bytes
        buf.extend_from_slice(&[0x02, 0x0A, 0xF4]); // tx power -12
        buf.extend_from_slice(&[0x00, 0x00]); // padding
        Bytes::from(buf)
    }

    #[test]
    fn test_parse_record() {
        let record = ScanRecord::parse(advertisement()).unwrap();

        assert_eq!(record.flags, Some(0x06));
        assert_eq!(record.service_uuids, vec![0x180F, 0x180A]);
        assert_eq!(record.device_name.as_deref(), Some("bean"));
        assert_eq!(record.tx_power, Some(-12));

        let apple = record.manufacturer(0x004C).unwrap();
        assert_eq!(&apple.data[..], &[0x02, 0x15]);
    }

    #[test]
    fn test_parse_truncated_record() {
        let buf = Bytes::from_static(&[0x02, 0x01, 0x06, 0x09, 0x09, b'x']);
        let err = ScanRecord::parse(buf).unwrap_err();
        assert_eq!(
            err,
            ScannerError::BufferTooShort {
                expected: 13,
                actual: 6
            }
        );
    }

    #[test]
    fn test_parse_short_manufacturer_block() {
        let buf = Bytes::from_static(&[0x02, 0xFF, 0x4C]);
        assert!(matches!(
            ScanRecord::parse(buf),
            Err(ScannerError::MalformedRecord { offset: 0, .. })
        ));
    }

    #[test]
    fn test_plausibility() {
        let good = ScanEvent::new("device-1", -50, ScanTime::ZERO);
        assert!(good.is_plausible());

        let mut no_address = good.clone();
        no_address.address = None;
        assert!(!no_address.is_plausible());

        let mut positive_rssi = good.clone();
        positive_rssi.rssi = 0;
        assert!(!positive_rssi.is_plausible());

        let mut no_record = good;
        no_record.record = None;
        assert!(!no_record.is_plausible());
    }

    #[test]
    fn test_filter_matching() {
        let record = ScanRecord::parse(advertisement()).unwrap();
        let event = ScanEvent::new("AA:BB:CC:DD:EE:FF", -60, ScanTime::ZERO).with_record(record);

        assert!(ScanFilter::new().matches(&event));
        assert!(ScanFilter::new().with_name("bean").matches(&event));
        assert!(!ScanFilter::new().with_name("other").matches(&event));
        assert!(ScanFilter::new()
            .with_service_uuid(0x180F)
            .with_manufacturer_id(0x004C)
            .matches(&event));
        assert!(!ScanFilter::new()
            .with_address("11:22:33:44:55:66")
            .matches(&event));
    }

    proptest! {
        #[test]
        fn parse_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
            if let Ok(record) = ScanRecord::parse(Bytes::from(raw.clone())) {
                prop_assert_eq!(&record.raw[..], &raw[..]);
            }
        }
    }
}
