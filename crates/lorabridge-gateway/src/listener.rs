/*!
 * Radio receive loop.
 */
use std::sync::Arc;

use serde_json::json;
use tracing::{info, trace, warn};

use lorabridge_core::utils::sleep_or_shutdown;

use crate::bridge::GatewayBridge;
use crate::context::AppContext;
use crate::error::Result;

/// Polls the radio and forwards every received packet to the bridge
pub struct RadioListener {
    ctx: Arc<AppContext>,
    bridge: GatewayBridge,
    connected: bool,
}

impl RadioListener {
    /// Create a listener over the shared context
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let bridge = GatewayBridge::new(ctx.clone());
        Self {
            ctx,
            bridge,
            connected: true,
        }
    }

    /// Receive and translate one packet if one is waiting
    ///
    /// Returns `Ok(true)` when a packet was handled.
    pub async fn poll_once(&mut self) -> Result<bool> {
        let received = {
            let mut radio = self.ctx.radio().lock().await;
            radio.receive().await
        };

        match received {
            Ok(Some(packet)) => {
                self.mark_connected(true);
                trace!("Received {} bytes from {:#04x}", packet.payload.len(), packet.sender);
                self.ctx.activity().record_receive().await;
                self.bridge.handle_packet(&packet);
                Ok(true)
            }
            Ok(None) => {
                self.mark_connected(true);
                Ok(false)
            }
            Err(e) => {
                if self.connected {
                    warn!("Radio receive failed: {}", e);
                }
                self.mark_connected(false);
                Err(e)
            }
        }
    }

    /// Run until shutdown
    pub async fn run(mut self) -> Result<()> {
        let mut shutdown = self.ctx.shutdown_signal();
        let poll = self.ctx.config().get().radio.receive_poll();
        info!("Radio listener started");
        self.bridge
            .set_attribute("radioConnected", json!(self.connected));

        while !*shutdown.borrow() {
            // Drain back-to-back packets before sleeping
            if let Ok(true) = self.poll_once().await {
                continue;
            }
            if !sleep_or_shutdown(poll, &mut shutdown).await {
                break;
            }
        }

        info!("Radio listener stopped");
        Ok(())
    }

    fn mark_connected(&mut self, connected: bool) {
        if self.connected != connected {
            self.connected = connected;
            if connected {
                info!("Radio link restored");
            }
            self.bridge.set_attribute("radioConnected", json!(connected));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use lorabridge_core::config::{Config, SharedConfig};
    use lorabridge_devices::catalog::PRESSURE_PUMP;
    use tokio::sync::mpsc;

    use crate::message::OutboundMessage;
    use crate::topics;
    use crate::transport::{shared, LoopbackHandle, LoopbackRadio, RadioPacket};

    fn setup() -> (Arc<AppContext>, LoopbackHandle, mpsc::Receiver<OutboundMessage>) {
        let (radio, handle) = LoopbackRadio::new();
        let devices = lorabridge_devices::catalog::load(&[]).unwrap();
        let (ctx, outbound) =
            AppContext::new(SharedConfig::new(Config::default()), devices, shared(radio));
        (ctx, handle, outbound)
    }

    #[tokio::test]
    async fn test_poll_once_publishes_telemetry() {
        let (ctx, handle, mut outbound) = setup();
        let mut listener = RadioListener::new(ctx.clone());

        assert!(!listener.poll_once().await.unwrap());

        handle.inject(
            RadioPacket::new(PRESSURE_PUMP, vec![80, 26, 0, 97, 51, 0, 99, 1, 0])
                .with_signal(-90, 10.0),
        );
        assert!(listener.poll_once().await.unwrap());
        assert!(ctx.activity().last_received().await.is_some());

        let message = outbound.try_recv().unwrap();
        assert_eq!(message.topic, topics::TELEMETRY);
        let payload = message.payload_json().unwrap();
        assert_eq!(
            payload["Main Pressure Pump"][0]["Pump on time"],
            json!(13.0)
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_radio_failure_reported_once() {
        let (ctx, handle, mut outbound) = setup();
        let mut listener = RadioListener::new(ctx);

        handle.set_failing(true);
        assert!(listener.poll_once().await.is_err());
        assert!(listener.poll_once().await.is_err());
        handle.set_failing(false);
        assert!(!listener.poll_once().await.unwrap());

        let mut flags = Vec::new();
        while let Ok(message) = outbound.try_recv() {
            assert_eq!(message.topic, topics::ATTRIBUTES);
            flags.push(message.payload_json().unwrap()["radioConnected"].clone());
        }
        assert_eq!(flags, vec![json!(false), json!(true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_until_shutdown() {
        let (ctx, handle, mut outbound) = setup();
        for _ in 0..3 {
            handle.inject(RadioPacket::new(PRESSURE_PUMP, vec![b'H', 40]));
        }

        let task = tokio::spawn(RadioListener::new(ctx.clone()).run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        ctx.request_shutdown();
        task.await.unwrap().unwrap();

        let mut telemetry = 0;
        while let Ok(message) = outbound.try_recv() {
            if message.topic == topics::TELEMETRY {
                telemetry += 1;
            }
        }
        assert_eq!(telemetry, 3);
    }
}
