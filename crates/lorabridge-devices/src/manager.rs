/*!
 * Device manager for LoRaBridge.
 *
 * The manager owns every device the gateway serves and is the entry point
 * for inbound packet dispatch and for the transmit scheduler's queries.
 */
use tracing::info;

use crate::device::{DecodeOutcome, Device};
use crate::error::{DeviceError, Result};
use crate::field::TelemetryRecord;
use crate::registry::{Named, Registry};

/// Telemetry decoded from one inbound packet
#[derive(Debug)]
pub struct DecodedPacket<'a> {
    /// Device that sent the packet
    pub device: &'a Device,
    /// Decoded field values
    pub record: TelemetryRecord,
    /// How much of the packet was understood
    pub outcome: DecodeOutcome,
}

/// Registry of all devices served by the gateway
#[derive(Debug)]
pub struct DeviceManager {
    devices: Registry<Device>,
}

impl DeviceManager {
    /// Create a manager, rejecting duplicate device symbols or names
    pub fn new(devices: Vec<Device>) -> Result<Self> {
        let devices = Registry::new("devices", devices)?;
        info!("Device manager serving {} device(s)", devices.len());
        Ok(Self { devices })
    }

    /// Look up a device by radio symbol
    pub fn find_by_symbol(&self, symbol: u8) -> Option<&Device> {
        self.devices.find_by_symbol(symbol)
    }

    /// Look up a device by display name
    pub fn find_by_name(&self, name: &str) -> Option<&Device> {
        self.devices.find_by_name(name)
    }

    /// Iterate devices in definition order
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no devices are configured
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Decode a packet from the device with symbol `sender`
    pub fn decode_packet(&self, sender: u8, bytes: &[u8]) -> Result<DecodedPacket<'_>> {
        let device = self
            .find_by_symbol(sender)
            .ok_or_else(|| DeviceError::UnknownDevice(format!("{:#04x}", sender)))?;

        let (record, outcome) = device.decode_packet(bytes);
        Ok(DecodedPacket {
            device,
            record,
            outcome,
        })
    }

    /// Whether any device owes a transmission
    pub fn any_pending(&self) -> bool {
        self.devices.iter().any(Device::has_pending_transmission)
    }

    /// Number of devices owing a transmission
    pub fn pending_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|device| device.has_pending_transmission())
            .count()
    }

    /// Names of all devices, in definition order
    pub fn device_names(&self) -> Vec<&str> {
        self.devices.iter().map(|device| device.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, FieldKind};
    use serde_json::json;

    fn manager() -> DeviceManager {
        DeviceManager::new(vec![
            Device::new(
                "Main Pressure Pump",
                0x5A,
                vec![Field::new("Humidity", b'H', FieldKind::Byte)],
            )
            .unwrap(),
            Device::new(
                "Front gate monitor",
                0xA9,
                vec![
                    Field::new("Gate state", b'g', FieldKind::Byte),
                    Field::new("TransmitInterval", b'I', FieldKind::SettableByte),
                ],
            )
            .unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_lookup() {
        let manager = manager();
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.find_by_symbol(0xA9).unwrap().name(), "Front gate monitor");
        assert_eq!(manager.find_by_name("Main Pressure Pump").unwrap().symbol(), 0x5A);
        assert!(manager.find_by_symbol(0x01).is_none());
        assert_eq!(
            manager.device_names(),
            vec!["Main Pressure Pump", "Front gate monitor"]
        );
    }

    #[test]
    fn test_decode_dispatches_by_sender() {
        let manager = manager();
        let decoded = manager.decode_packet(0xA9, &[b'g', 1]).unwrap();
        assert_eq!(decoded.device.name(), "Front gate monitor");
        assert_eq!(decoded.record["Gate state"], json!(1));
        assert_eq!(decoded.outcome, DecodeOutcome::Complete);
    }

    #[test]
    fn test_decode_unknown_sender() {
        let manager = manager();
        assert_eq!(
            manager.decode_packet(0x01, &[b'g', 1]).unwrap_err(),
            DeviceError::UnknownDevice("0x01".to_string())
        );
    }

    #[test]
    fn test_pending_queries() {
        let manager = manager();
        assert!(!manager.any_pending());
        assert_eq!(manager.pending_count(), 0);

        manager
            .find_by_name("Front gate monitor")
            .and_then(|device| device.field_by_name("TransmitInterval"))
            .unwrap()
            .handle_command(&json!(30))
            .unwrap();

        assert!(manager.any_pending());
        assert_eq!(manager.pending_count(), 1);
    }

    #[test]
    fn test_duplicate_device_name() {
        let result = DeviceManager::new(vec![
            Device::new("Pump", 1, Vec::new()).unwrap(),
            Device::new("Pump", 2, Vec::new()).unwrap(),
        ]);
        assert!(matches!(result, Err(DeviceError::DuplicateName { .. })));
    }
}
