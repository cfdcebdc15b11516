/*!
 * Application context shared by the gateway tasks.
 *
 * Everything the long-lived tasks share lives here: the device set, the
 * radio, the publish queue, the alarm level, activity timestamps and the
 * shutdown signal. It is built once at startup and handed out as an `Arc`.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, RwLock};
use tracing::info;

use lorabridge_core::config::SharedConfig;
use lorabridge_devices::DeviceManager;

use crate::alarm::AlarmState;
use crate::message::OutboundMessage;
use crate::queue::PublishQueue;
use crate::transport::SharedRadio;

/// Times of the most recent radio traffic
#[derive(Debug, Default)]
pub struct Activity {
    last_sent: RwLock<Option<DateTime<Utc>>>,
    last_received: RwLock<Option<DateTime<Utc>>>,
}

impl Activity {
    /// Record a transmission now
    pub async fn record_send(&self) {
        *self.last_sent.write().await = Some(Utc::now());
    }

    /// Record a reception now
    pub async fn record_receive(&self) {
        *self.last_received.write().await = Some(Utc::now());
    }

    /// When a packet was last sent
    pub async fn last_sent(&self) -> Option<DateTime<Utc>> {
        *self.last_sent.read().await
    }

    /// When a packet was last received
    pub async fn last_received(&self) -> Option<DateTime<Utc>> {
        *self.last_received.read().await
    }
}

/// State shared by all gateway tasks
pub struct AppContext {
    config: SharedConfig,
    devices: Arc<DeviceManager>,
    radio: SharedRadio,
    queue: PublishQueue,
    alarm: watch::Sender<AlarmState>,
    activity: Activity,
    shutdown: watch::Sender<bool>,
    restart_requested: AtomicBool,
}

impl AppContext {
    /// Build the context
    ///
    /// Returns the receiving end of the publish queue, which belongs to
    /// whatever publishes to the broker.
    pub fn new(
        config: SharedConfig,
        devices: DeviceManager,
        radio: SharedRadio,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundMessage>) {
        let (queue, outbound) = PublishQueue::new(config.get().gateway.publish_queue_capacity);
        let (alarm, _) = watch::channel(AlarmState::Off);
        let (shutdown, _) = watch::channel(false);

        let context = Arc::new(Self {
            config,
            devices: Arc::new(devices),
            radio,
            queue,
            alarm,
            activity: Activity::default(),
            shutdown,
            restart_requested: AtomicBool::new(false),
        });
        (context, outbound)
    }

    /// Gateway configuration
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Devices served by the gateway
    pub fn devices(&self) -> &Arc<DeviceManager> {
        &self.devices
    }

    /// The shared radio
    pub fn radio(&self) -> &SharedRadio {
        &self.radio
    }

    /// The outbound publish queue
    pub fn queue(&self) -> &PublishQueue {
        &self.queue
    }

    /// Radio activity timestamps
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Set the alarm level for the local indicator
    pub fn set_alarm(&self, state: AlarmState) {
        self.alarm.send_replace(state);
    }

    /// Current alarm level
    pub fn alarm_state(&self) -> AlarmState {
        *self.alarm.borrow()
    }

    /// Follow alarm level changes
    pub fn alarm_updates(&self) -> watch::Receiver<AlarmState> {
        self.alarm.subscribe()
    }

    /// A receiver that flips to `true` when the gateway is stopping
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ask every task to stop
    pub fn request_shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            info!("Shutdown requested");
        }
    }

    /// Ask every task to stop so the service supervisor restarts the gateway
    pub fn request_restart(&self) {
        self.restart_requested.store(true, Ordering::SeqCst);
        self.request_shutdown();
    }

    /// Whether the shutdown was a restart request
    pub fn restart_requested(&self) -> bool {
        self.restart_requested.load(Ordering::SeqCst)
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}
