/*!
 * Simulated remote devices.
 *
 * With `radio.transport = "simulated"` the gateway talks to a loopback radio.
 * The feeder here plays the part of the remote nodes: it injects recorded
 * report packets at a fixed interval and answers every set packet with a
 * report of the values it carried, the way real nodes acknowledge.
 */
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use lorabridge_core::utils::sleep_or_shutdown;
use lorabridge_devices::catalog::{PRESSURE_PUMP, SOLAR_FENCE};
use lorabridge_devices::packet::{PacketBytes, WRITE_FLAG};
use lorabridge_devices::DeviceManager;

use crate::context::AppContext;
use crate::error::Result;
use crate::transport::{LoopbackHandle, RadioPacket, SentPacket};

/// Report packets recorded from the pump and fence controllers
pub fn sample_packets() -> Vec<RadioPacket> {
    vec![
        RadioPacket::new(PRESSURE_PUMP, vec![80, 26, 0, 97, 51, 0, 99, 1, 0]).with_signal(-90, 10.0),
        RadioPacket::new(PRESSURE_PUMP, vec![80, 58, 0, 97, 57, 0, 99, 2, 0]).with_signal(-87, 5.0),
        RadioPacket::new(SOLAR_FENCE, vec![86, 122, 0, 84, 21, 0, 70, 1, 114, 1, 73, 10])
            .with_signal(-20, 25.0),
        RadioPacket::new(SOLAR_FENCE, vec![86, 123, 0, 84, 244, 255, 70, 1, 114, 1, 73, 10])
            .with_signal(-150, -25.0),
    ]
}

/// The report a remote device sends back after applying `sent`
///
/// Returns `None` if the destination is unknown or the packet is malformed.
pub fn remote_echo(sent: &SentPacket, devices: &DeviceManager) -> Option<RadioPacket> {
    let device = devices.find_by_symbol(sent.destination)?;
    let mut report = Vec::with_capacity(sent.payload.len());
    let mut offset = 0;

    while offset < sent.payload.len() {
        let symbol = sent.payload[offset] & !WRITE_FLAG;
        let field = device.field_by_symbol(symbol)?;
        let end = offset + 1 + field.encoded_length();
        if end > sent.payload.len() {
            return None;
        }
        report.push(symbol);
        report.extend_from_slice(&sent.payload[offset + 1..end]);
        offset = end;
    }

    Some(RadioPacket::new(sent.destination, report))
}

/// Play the remote devices until shutdown
pub async fn run_feeder(ctx: Arc<AppContext>, handle: LoopbackHandle, interval: Duration) -> Result<()> {
    let mut shutdown = ctx.shutdown_signal();
    let samples = sample_packets();
    let mut next_sample = 0;
    let mut echoed = 0;
    let mut since_sample = Duration::ZERO;
    let step = ctx.config().get().radio.receive_poll().max(Duration::from_millis(1));

    info!("Simulated devices started, reporting every {:?}", interval);

    loop {
        let sent = handle.sent();
        for packet in &sent[echoed..] {
            if let Some(reply) = remote_echo(packet, ctx.devices()) {
                debug!(
                    "Simulated {:#04x} acknowledging {}",
                    packet.destination,
                    PacketBytes(&packet.payload)
                );
                handle.inject(reply);
            }
        }
        echoed = sent.len();

        if since_sample >= interval || next_sample == 0 {
            if let Some(sample) = samples.get(next_sample % samples.len()) {
                handle.inject(sample.clone());
            }
            next_sample += 1;
            since_sample = Duration::ZERO;
        }

        if !sleep_or_shutdown(step, &mut shutdown).await {
            break;
        }
        since_sample += step;
    }

    info!("Simulated devices stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorabridge_core::config::{Config, SharedConfig};
    use lorabridge_devices::catalog::GATE_MONITOR;
    use lorabridge_devices::DecodeOutcome;

    use crate::transport::{shared, LoopbackRadio};

    #[test]
    fn test_samples_decode_completely() {
        let devices = lorabridge_devices::catalog::load(&[]).unwrap();
        for sample in sample_packets() {
            let decoded = devices.decode_packet(sample.sender, &sample.payload).unwrap();
            assert_eq!(decoded.outcome, DecodeOutcome::Complete);
        }
    }

    #[test]
    fn test_remote_echo_strips_write_flag() {
        let devices = lorabridge_devices::catalog::load(&[]).unwrap();
        let sent = SentPacket {
            destination: SOLAR_FENCE,
            payload: vec![b'F' | 0x80, 1, b's' | 0x80, b'I' | 0x80, 20],
        };

        let echo = remote_echo(&sent, &devices).unwrap();
        assert_eq!(echo.sender, SOLAR_FENCE);
        assert_eq!(&echo.payload[..], &[b'F', 1, b's', b'I', 20]);
    }

    #[test]
    fn test_remote_echo_rejects_malformed() {
        let devices = lorabridge_devices::catalog::load(&[]).unwrap();

        let truncated = SentPacket {
            destination: GATE_MONITOR,
            payload: vec![b'I' | 0x80],
        };
        assert!(remote_echo(&truncated, &devices).is_none());

        let unknown = SentPacket {
            destination: 0x01,
            payload: vec![b'I' | 0x80, 5],
        };
        assert!(remote_echo(&unknown, &devices).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_feeder_injects_samples_cyclically() {
        let (radio, handle) = LoopbackRadio::new();
        let devices = lorabridge_devices::catalog::load(&[]).unwrap();
        let (ctx, _outbound) =
            AppContext::new(SharedConfig::new(Config::default()), devices, shared(radio.clone()));
        let task = tokio::spawn(run_feeder(ctx.clone(), handle, Duration::from_secs(1)));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        ctx.request_shutdown();
        task.await.unwrap().unwrap();

        let mut radio = radio;
        let mut senders = Vec::new();
        while let Some(packet) = crate::transport::Radio::receive(&mut radio).await.unwrap() {
            senders.push(packet.sender);
        }
        assert_eq!(senders, vec![PRESSURE_PUMP, PRESSURE_PUMP, SOLAR_FENCE]);
    }
}
