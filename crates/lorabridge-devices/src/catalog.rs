/*!
 * Device catalog for LoRaBridge.
 *
 * The built-in catalog describes the sensor nodes deployed on the farm
 * network. Deployments with different hardware can describe their devices
 * under `gateway.devices` in the configuration instead.
 */
use tracing::info;

use lorabridge_core::config::{DeviceSpec, FieldSpec};

use crate::device::Device;
use crate::error::{DeviceError, Result};
use crate::field::{Acceptance, Field, FieldKind};
use crate::manager::DeviceManager;

/// Radio symbol of the main pressure pump controller
pub const PRESSURE_PUMP: u8 = 0x5A;
/// Radio symbol of the solar electric fence controller
pub const SOLAR_FENCE: u8 = 0x4A;
/// Radio symbol of the irrigation water detector
pub const WATER_DETECTOR: u8 = 0xA7;
/// Radio symbol of the electric fence monitor
pub const FENCE_MONITOR: u8 = 0xA8;
/// Radio symbol of the front gate monitor
pub const GATE_MONITOR: u8 = 0xA9;

fn temperature() -> Field {
    Field::new("Temperature", b'T', FieldKind::Tenths)
}

fn humidity() -> Field {
    Field::new("Humidity", b'H', FieldKind::Byte)
}

fn battery_voltage() -> Field {
    Field::new("Battery Voltage", b'V', FieldKind::Tenths)
}

fn transmit_enabled() -> Field {
    Field::new("TransmitEnabled", b'r', FieldKind::SettableByte)
        .with_acceptance(Acceptance::range(Some(0), Some(1)))
}

fn transmit_interval() -> Field {
    Field::new("TransmitInterval", b'I', FieldKind::SettableByte)
        .with_acceptance(Acceptance::range(Some(1), None))
}

fn reset() -> Field {
    Field::new("Reset", b'X', FieldKind::Byte)
}

fn request_status() -> Field {
    Field::new("RequestStatus", b's', FieldKind::SettableFlag)
}

/// Build the devices of the built-in catalog
pub fn builtin_devices() -> Result<Vec<Device>> {
    Ok(vec![
        Device::new(
            "Main Pressure Pump",
            PRESSURE_PUMP,
            vec![
                temperature(),
                humidity(),
                Field::new("Pump on time", b'P', FieldKind::HalfSeconds),
                Field::new("Average pump on time", b'a', FieldKind::HalfSeconds),
                Field::new("Maximum pump on time in block", b'm', FieldKind::HalfSeconds),
                Field::new("Minimum pump on time in block", b'n', FieldKind::HalfSeconds),
                Field::new("Count of pump starts in block", b'c', FieldKind::UInt),
                reset(),
            ],
        )?,
        Device::new(
            "Solar Electric Fence",
            SOLAR_FENCE,
            vec![
                battery_voltage(),
                temperature(),
                transmit_enabled(),
                Field::new("FenceEnabled", b'F', FieldKind::SettableByte)
                    .with_acceptance(Acceptance::range(Some(0), Some(1))),
                request_status(),
                transmit_interval(),
                reset(),
            ],
        )?,
        Device::new(
            "Irrigation Water Detector",
            WATER_DETECTOR,
            vec![
                battery_voltage(),
                request_status(),
                Field::new("Water capacitive reading", b'w', FieldKind::UInt),
                reset(),
            ],
        )?,
        Device::new(
            "Electric fence monitor",
            FENCE_MONITOR,
            vec![
                battery_voltage(),
                Field::new("Fence Voltage", b'k', FieldKind::TenthsByte),
                temperature(),
            ],
        )?,
        Device::new(
            "Front gate monitor",
            GATE_MONITOR,
            vec![
                Field::new("Gate state", b'g', FieldKind::Byte),
                battery_voltage(),
                temperature(),
                humidity(),
                Field::new("Light level", b'l', FieldKind::Byte),
                Field::new("Movement detected", b'M', FieldKind::Byte),
                transmit_interval(),
            ],
        )?,
    ])
}

fn field_from_spec(device: &str, spec: &FieldSpec) -> Result<Field> {
    let kind: FieldKind = spec.kind.parse().map_err(|_| {
        DeviceError::invalid_catalog(format!(
            "Field '{}' of '{}' has unknown kind '{}'",
            spec.name, device, spec.kind
        ))
    })?;
    let symbol = spec.symbol.resolve()?;

    let has_bounds = spec.min.is_some() || spec.max.is_some();
    if has_bounds && kind != FieldKind::SettableByte {
        return Err(DeviceError::invalid_catalog(format!(
            "Field '{}' of '{}' has bounds but kind '{}' does not take commands with values",
            spec.name, device, kind
        )));
    }

    Ok(Field::new(spec.name.clone(), symbol, kind)
        .with_acceptance(Acceptance::range(spec.min, spec.max)))
}

/// Build a device described in configuration
pub fn device_from_spec(spec: &DeviceSpec) -> Result<Device> {
    let fields = spec
        .fields
        .iter()
        .map(|field| field_from_spec(&spec.name, field))
        .collect::<Result<Vec<_>>>()?;
    Device::new(spec.name.clone(), spec.symbol.resolve()?, fields)
}

/// Build the device manager from configured devices, or the built-in catalog if none
pub fn load(specs: &[DeviceSpec]) -> Result<DeviceManager> {
    let devices = if specs.is_empty() {
        info!("No devices configured, using the built-in catalog");
        builtin_devices()?
    } else {
        info!("Loading {} device(s) from configuration", specs.len());
        specs
            .iter()
            .map(device_from_spec)
            .collect::<Result<Vec<_>>>()?
    };

    DeviceManager::new(devices)
}
