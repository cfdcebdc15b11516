/*!
 * Transmit scheduling.
 *
 * The scheduler walks the devices in order. For each one with dirty fields
 * it builds a single set packet, hands it to the radio and then waits out the
 * inter-transmission interval before looking at the next device, giving the
 * remote a chance to answer and keeping the channel fair. Values stay dirty
 * until the remote reports them back, so unanswered packets are sent again
 * on the next cycle.
 */
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use lorabridge_core::utils::sleep_or_shutdown;
use lorabridge_devices::packet::PacketBytes;
use lorabridge_devices::Named;

use crate::bridge::GatewayBridge;
use crate::context::AppContext;
use crate::error::Result;

/// Shortest pause between pacing checks
const MIN_POLL_STEP: Duration = Duration::from_millis(1);

/// What happened during one scheduling cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Packets handed to the radio
    pub sent: usize,
    /// Devices whose dirty fields did not fit in one packet
    pub skipped: usize,
    /// Packets the radio refused
    pub failed: usize,
    /// Whether pacing was cut short by shutdown
    pub interrupted: bool,
}

/// Sends pending field values to their devices
pub struct TransmitScheduler {
    ctx: Arc<AppContext>,
    bridge: GatewayBridge,
    tx_waiting: Option<bool>,
}

impl TransmitScheduler {
    /// Create a scheduler over the shared context
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let bridge = GatewayBridge::new(ctx.clone());
        Self {
            ctx,
            bridge,
            tx_waiting: None,
        }
    }

    /// The last published transmit-pending flag
    pub fn tx_waiting(&self) -> Option<bool> {
        self.tx_waiting
    }

    /// Run until shutdown
    pub async fn run(mut self) -> Result<()> {
        let mut shutdown = self.ctx.shutdown_signal();
        let status_poll = self.ctx.config().get().radio.status_poll();
        info!("Transmit scheduler started");

        self.update_tx_waiting();
        while !*shutdown.borrow() {
            let report = self.run_cycle(&mut shutdown).await;
            if report.interrupted {
                break;
            }
            if report.sent + report.skipped + report.failed > 0 {
                debug!("Transmit cycle finished: {:?}", report);
            }

            if !sleep_or_shutdown(status_poll.max(MIN_POLL_STEP), &mut shutdown).await {
                break;
            }
            self.update_tx_waiting();
        }

        info!("Transmit scheduler stopped");
        Ok(())
    }

    /// Visit every device once, sending to those with pending values
    pub async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) -> CycleReport {
        let radio_config = self.ctx.config().get().radio.clone();
        let devices = self.ctx.devices().clone();
        let mut report = CycleReport::default();

        for device in devices.devices() {
            if !device.has_pending_transmission() {
                continue;
            }

            let packet = match device.generate_packet(radio_config.max_packet_len) {
                Ok(packet) if packet.is_empty() => continue,
                Ok(packet) => packet,
                Err(e) => {
                    error!(
                        "Could not encode pending values for '{}', retrying next cycle: {}",
                        device.name(),
                        e
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            debug!(
                "Sending packet to '{}': {}",
                device.name(),
                PacketBytes(packet.bytes())
            );

            let result = {
                let mut radio = self.ctx.radio().lock().await;
                radio.send(packet.destination(), packet.bytes()).await
            };

            match result {
                Ok(()) => {
                    device.mark_sent(&packet);
                    self.ctx.activity().record_send().await;
                    report.sent += 1;
                }
                Err(e) => {
                    warn!("Failed to send packet to '{}': {}", device.name(), e);
                    report.failed += 1;
                }
            }

            self.update_tx_waiting();
            if !self
                .pace(radio_config.tx_interval(), radio_config.status_poll(), shutdown)
                .await
            {
                report.interrupted = true;
                break;
            }
        }

        report
    }

    /// Wait out the inter-transmission interval, keeping the status flag fresh
    async fn pace(
        &mut self,
        interval: Duration,
        step: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let deadline = Instant::now() + interval;
        let step = step.max(MIN_POLL_STEP);

        loop {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            if !sleep_or_shutdown(step.min(deadline - now), shutdown).await {
                return false;
            }
            self.update_tx_waiting();
        }
    }

    /// Publish the transmit-pending flag if it changed
    fn update_tx_waiting(&mut self) {
        let waiting = self.ctx.devices().any_pending();
        if self.tx_waiting != Some(waiting) {
            debug!("Transmit pending: {}", waiting);
            self.tx_waiting = Some(waiting);
            self.bridge.set_attribute("txWaiting", json!(waiting));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorabridge_core::config::{Config, SharedConfig};
    use lorabridge_devices::catalog::{GATE_MONITOR, SOLAR_FENCE};
    use tokio::sync::mpsc;

    use crate::message::OutboundMessage;
    use crate::topics;
    use crate::transport::{shared, LoopbackHandle, LoopbackRadio, RadioPacket, SentPacket};

    fn setup(config: Config) -> (Arc<AppContext>, LoopbackHandle, mpsc::Receiver<OutboundMessage>) {
        let (radio, handle) = LoopbackRadio::new();
        let devices = lorabridge_devices::catalog::load(&[]).unwrap();
        let (ctx, outbound) = AppContext::new(SharedConfig::new(config), devices, shared(radio));
        (ctx, handle, outbound)
    }

    fn command(ctx: &AppContext, device: &str, field: &str, value: i64) {
        ctx.devices()
            .find_by_name(device)
            .and_then(|device| device.field_by_name(field))
            .unwrap()
            .handle_command(&json!(value))
            .unwrap();
    }

    fn tx_waiting_flags(outbound: &mut mpsc::Receiver<OutboundMessage>) -> Vec<bool> {
        let mut flags = Vec::new();
        while let Ok(message) = outbound.try_recv() {
            if message.topic == topics::ATTRIBUTES {
                if let Some(flag) = message.payload_json().unwrap()["txWaiting"].as_bool() {
                    flags.push(flag);
                }
            }
        }
        flags
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_sends_one_packet_per_dirty_device() {
        let (ctx, handle, _outbound) = setup(Config::default());
        let mut shutdown = ctx.shutdown_signal();
        command(&ctx, "Solar Electric Fence", "FenceEnabled", 1);
        command(&ctx, "Solar Electric Fence", "TransmitInterval", 20);
        command(&ctx, "Front gate monitor", "TransmitInterval", 30);

        let mut scheduler = TransmitScheduler::new(ctx.clone());
        let started = Instant::now();
        let report = scheduler.run_cycle(&mut shutdown).await;

        assert_eq!(report.sent, 2);
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert_eq!(
            handle.sent(),
            vec![
                SentPacket {
                    destination: SOLAR_FENCE,
                    payload: vec![b'F' | 0x80, 1, b'I' | 0x80, 20],
                },
                SentPacket {
                    destination: GATE_MONITOR,
                    payload: vec![b'I' | 0x80, 30],
                },
            ]
        );
        assert!(ctx.activity().last_sent().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_values_are_resent() {
        let (ctx, handle, _outbound) = setup(Config::default());
        let mut shutdown = ctx.shutdown_signal();
        command(&ctx, "Front gate monitor", "TransmitInterval", 30);

        let mut scheduler = TransmitScheduler::new(ctx.clone());
        scheduler.run_cycle(&mut shutdown).await;
        scheduler.run_cycle(&mut shutdown).await;
        assert_eq!(handle.sent().len(), 2);

        // The remote reports the new value back
        let bridge = GatewayBridge::new(ctx.clone());
        bridge.handle_packet(&RadioPacket::new(GATE_MONITOR, vec![b'I', 30]));

        let report = scheduler.run_cycle(&mut shutdown).await;
        assert_eq!(report.sent, 0);
        assert_eq!(handle.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_failure_skips_device() {
        let mut config = Config::default();
        config.radio.max_packet_len = 3;
        let (ctx, handle, _outbound) = setup(config);
        let mut shutdown = ctx.shutdown_signal();
        command(&ctx, "Solar Electric Fence", "FenceEnabled", 1);
        command(&ctx, "Solar Electric Fence", "TransmitInterval", 20);
        command(&ctx, "Front gate monitor", "TransmitInterval", 30);

        let mut scheduler = TransmitScheduler::new(ctx.clone());
        let report = scheduler.run_cycle(&mut shutdown).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(handle.sent()[0].destination, GATE_MONITOR);

        let fence = ctx.devices().find_by_symbol(SOLAR_FENCE).unwrap();
        assert_eq!(fence.pending_field_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_radio_failure_keeps_values_dirty() {
        let (ctx, handle, _outbound) = setup(Config::default());
        let mut shutdown = ctx.shutdown_signal();
        command(&ctx, "Front gate monitor", "TransmitInterval", 30);
        handle.set_failing(true);

        let mut scheduler = TransmitScheduler::new(ctx.clone());
        let report = scheduler.run_cycle(&mut shutdown).await;

        assert_eq!(report.failed, 1);
        let field = ctx
            .devices()
            .find_by_symbol(GATE_MONITOR)
            .and_then(|device| device.field_by_name("TransmitInterval"))
            .unwrap();
        assert_eq!(field.phase(), lorabridge_devices::TxPhase::Dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_pacing() {
        let (ctx, handle, _outbound) = setup(Config::default());
        command(&ctx, "Solar Electric Fence", "FenceEnabled", 1);
        command(&ctx, "Front gate monitor", "TransmitInterval", 30);

        let scheduler = TransmitScheduler::new(ctx.clone());
        let task = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.request_shutdown();
        task.await.unwrap().unwrap();

        // Stopped while pacing after the first device
        assert_eq!(handle.sent().len(), 1);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_tx_waiting_published_on_change() {
        let (ctx, _handle, mut outbound) = setup(Config::default());
        let scheduler = TransmitScheduler::new(ctx.clone());
        let task = tokio::spawn(scheduler.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        command(&ctx, "Front gate monitor", "TransmitInterval", 30);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // The remote confirms during pacing
        GatewayBridge::new(ctx.clone())
            .handle_packet(&RadioPacket::new(GATE_MONITOR, vec![b'I', 30]));
        tokio::time::sleep(Duration::from_secs(1)).await;

        ctx.request_shutdown();
        task.await.unwrap().unwrap();

        assert_eq!(tx_waiting_flags(&mut outbound), vec![false, true, false]);
    }
}
