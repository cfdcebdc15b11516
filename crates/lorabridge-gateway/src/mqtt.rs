/*!
 * MQTT link to the ThingsBoard broker.
 *
 * The link owns the rumqttc event loop. Incoming RPC messages go to the
 * bridge; everything the gateway tasks queue for publication is drained by a
 * separate publisher task so a slow broker never blocks the event loop.
 */
use std::sync::Arc;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use lorabridge_core::config::MqttConfig;
use lorabridge_core::utils::sleep_or_shutdown;

use crate::bridge::GatewayBridge;
use crate::context::AppContext;
use crate::error::Result;
use crate::message::OutboundMessage;
use crate::topics;

/// Capacity of the rumqttc request channel
const CLIENT_CAPACITY: usize = 32;

/// Build the client options for the configured broker
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let client_id = format!("{}-{}", config.client_name, Uuid::new_v4().simple());
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(config.keep_alive());
    if !config.access_token.is_empty() {
        // ThingsBoard authenticates devices by access token in the username
        options.set_credentials(config.access_token.clone(), "");
    }
    options
}

/// The broker connection and its publisher
pub struct MqttLink {
    ctx: Arc<AppContext>,
    bridge: GatewayBridge,
    outbound: mpsc::Receiver<OutboundMessage>,
}

impl MqttLink {
    /// Create a link that publishes everything arriving on `outbound`
    pub fn new(ctx: Arc<AppContext>, outbound: mpsc::Receiver<OutboundMessage>) -> Self {
        let bridge = GatewayBridge::new(ctx.clone());
        Self {
            ctx,
            bridge,
            outbound,
        }
    }

    /// Run until shutdown, reconnecting whenever the broker connection drops
    pub async fn run(self) -> Result<()> {
        let Self {
            ctx,
            bridge,
            outbound,
        } = self;
        let config = ctx.config().get().mqtt.clone();
        let mut shutdown = ctx.shutdown_signal();

        info!("Connecting to MQTT broker at {}:{}", config.host, config.port);
        let (client, mut eventloop) = AsyncClient::new(mqtt_options(&config), CLIENT_CAPACITY);
        let publisher = tokio::spawn(publish_outbound(client.clone(), outbound));
        let mut connected = false;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        connected = true;
                        on_connected(&bridge, &client);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        bridge.handle_message(&publish.topic, &publish.payload);
                    }
                    Ok(event) => trace!("MQTT event: {:?}", event),
                    Err(e) => {
                        if connected {
                            warn!("MQTT connection lost: {}", e);
                        } else {
                            debug!("MQTT connection attempt failed: {}", e);
                        }
                        connected = false;
                        if !sleep_or_shutdown(config.reconnect_delay(), &mut shutdown).await {
                            break;
                        }
                    }
                },
            }
        }

        if let Err(e) = client.try_disconnect() {
            debug!("Could not send MQTT disconnect: {}", e);
        }
        publisher.abort();
        info!("MQTT link stopped");
        Ok(())
    }
}

/// Announce and subscribe after every (re)connection
///
/// The request channel may still be full of publishes queued during an
/// outage, so the subscriptions wait for room in their own task.
fn on_connected(bridge: &GatewayBridge, client: &AsyncClient) -> JoinHandle<()> {
    bridge.announce_devices();
    bridge.announce_version();

    let client = client.clone();
    tokio::spawn(async move {
        for topic in [topics::RPC_GATEWAY, topics::RPC_ME_SUBSCRIBE] {
            match client.subscribe(topic, QoS::AtLeastOnce).await {
                Ok(()) => debug!("Subscribed to '{}'", topic),
                Err(e) => warn!("Could not subscribe to '{}': {}", topic, e),
            }
        }
    })
}

async fn publish_outbound(client: AsyncClient, mut outbound: mpsc::Receiver<OutboundMessage>) {
    while let Some(message) = outbound.recv().await {
        trace!("Publishing to '{}': {}", message.topic, message.payload);
        if let Err(e) = client
            .publish(message.topic, QoS::AtLeastOnce, false, message.payload)
            .await
        {
            error!("Failed to publish MQTT message: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorabridge_core::config::{Config, SharedConfig};
    use lorabridge_devices::catalog;

    use crate::transport::{shared, LoopbackRadio};

    #[test]
    fn test_options_from_config() {
        let mut config = MqttConfig::default();
        config.client_name = "farm-gateway".to_string();
        config.access_token = "secret".to_string();

        let options = mqtt_options(&config);
        assert!(options.client_id().starts_with("farm-gateway-"));
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), config.keep_alive());
        assert_eq!(
            options.credentials(),
            Some(("secret".to_string(), String::new()))
        );
    }

    #[test]
    fn test_client_ids_are_unique() {
        let config = MqttConfig::default();
        assert_ne!(
            mqtt_options(&config).client_id(),
            mqtt_options(&config).client_id()
        );
    }

    #[tokio::test]
    async fn test_connect_with_full_request_channel() {
        let (radio, _handle) = LoopbackRadio::new();
        let devices = catalog::load(&[]).unwrap();
        let (ctx, mut outbound) =
            AppContext::new(SharedConfig::new(Config::default()), devices, shared(radio));
        let bridge = GatewayBridge::new(ctx);

        let (client, eventloop) = AsyncClient::new(mqtt_options(&MqttConfig::default()), 2);
        while client
            .try_publish(topics::TELEMETRY, QoS::AtLeastOnce, false, "{}")
            .is_ok()
        {}

        let subscriptions = on_connected(&bridge, &client);
        assert_eq!(outbound.try_recv().unwrap().topic, topics::DEVICE_CONNECT);

        tokio::task::yield_now().await;
        assert!(!subscriptions.is_finished());

        // Closing the channel fails the waiting subscriptions without a panic
        drop(eventloop);
        subscriptions.await.unwrap();
    }
}
