/*!
 * LoRaBridge gateway service.
 *
 * Loads the configuration, opens the radio and runs the gateway tasks until
 * Ctrl-C or a reset request. A reset exits with `EX_TEMPFAIL` so the service
 * supervisor starts a fresh process.
 */
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use lorabridge_core::config::{Config, ConfigBuilder, SharedConfig};
use lorabridge_core::logging::{self, component_span};
use lorabridge_core::utils::spawn_and_log;
use lorabridge_devices::catalog;
use lorabridge_gateway::simulate;
use lorabridge_gateway::transport::{self, LoopbackHandle, LoopbackRadio, SharedRadio, UdpRadio};
use lorabridge_gateway::{AppContext, OutboundMessage, RadioListener, TransmitScheduler};

/// Exit status asking the supervisor for a restart
const RESTART_EXIT_CODE: u8 = 75;

/// How often the simulated devices report
const SIMULATED_REPORT_INTERVAL: Duration = Duration::from_secs(15);

/// Bridge a LoRa sensor network to a ThingsBoard MQTT broker
#[derive(Parser, Debug)]
#[command(name = "lorabridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "lorabridge.toml")]
    config: PathBuf,

    /// Log filter, overriding `logging.level`
    #[arg(short, long)]
    log_level: Option<String>,

    /// Replace the radio with simulated devices
    #[arg(long)]
    simulate: bool,

    /// Log outbound messages instead of connecting to the broker
    #[arg(long)]
    no_mqtt: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = ConfigBuilder::new()
        .with_config_file(&args.config)
        .with_environment_prefix("LORABRIDGE")
        .build()
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    if args.simulate {
        config.radio.transport = "simulated".to_string();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn open_radio(config: &Config) -> Result<(SharedRadio, Option<LoopbackHandle>)> {
    let radio = &config.radio;
    if radio.transport == "simulated" {
        info!("Using simulated devices instead of the radio");
        let (radio, handle) = LoopbackRadio::new();
        return Ok((transport::shared(radio), Some(handle)));
    }

    let udp = UdpRadio::bind(&radio.bind_addr, &radio.modem_addr, radio.max_packet_len)
        .await
        .context("Failed to open the radio transport")?;
    Ok((transport::shared(udp), None))
}

#[cfg(feature = "mqtt")]
fn spawn_publisher(
    ctx: &Arc<AppContext>,
    outbound: mpsc::Receiver<OutboundMessage>,
    no_mqtt: bool,
) -> JoinHandle<()> {
    if no_mqtt {
        return spawn_and_log("outbound", log_outbound(outbound));
    }
    let link = lorabridge_gateway::MqttLink::new(ctx.clone(), outbound);
    spawn_and_log("mqtt", link.run().instrument(component_span("mqtt", None)))
}

#[cfg(not(feature = "mqtt"))]
fn spawn_publisher(
    _ctx: &Arc<AppContext>,
    outbound: mpsc::Receiver<OutboundMessage>,
    _no_mqtt: bool,
) -> JoinHandle<()> {
    spawn_and_log("outbound", log_outbound(outbound))
}

/// Stand-in for the broker when running without MQTT
async fn log_outbound(mut outbound: mpsc::Receiver<OutboundMessage>) -> lorabridge_gateway::Result<()> {
    while let Some(message) = outbound.recv().await {
        info!("[{}] {}", message.topic, message.payload);
    }
    Ok(())
}

/// Drive the local alarm indicator
async fn follow_alarm(ctx: Arc<AppContext>) -> lorabridge_gateway::Result<()> {
    let mut alarm = ctx.alarm_updates();
    let mut shutdown = ctx.shutdown_signal();

    loop {
        tokio::select! {
            changed = alarm.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("Alarm indicator now {}", *alarm.borrow_and_update());
            }
            _ = shutdown.changed() => break,
        }
    }
    Ok(())
}

async fn wait_for_stop(ctx: &AppContext) {
    let mut shutdown = ctx.shutdown_signal();
    let stopped = async move {
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(e) => error!("Could not listen for Ctrl-C: {}", e),
        },
        _ = stopped => {}
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(ExitCode::SUCCESS);
    }

    logging::init_from_config(&config.logging)?;
    info!(
        "{} {} starting ({})",
        config.general.app_name,
        lorabridge_gateway::VERSION,
        config.general.environment
    );

    let devices = catalog::load(&config.gateway.devices)?;
    let (radio, loopback) = open_radio(&config).await?;
    let (ctx, outbound) = AppContext::new(SharedConfig::new(config), devices, radio);

    let mut tasks = vec![
        spawn_and_log(
            "scheduler",
            TransmitScheduler::new(ctx.clone())
                .run()
                .instrument(component_span("scheduler", None)),
        ),
        spawn_and_log(
            "listener",
            RadioListener::new(ctx.clone())
                .run()
                .instrument(component_span("listener", None)),
        ),
        spawn_and_log("alarm", follow_alarm(ctx.clone())),
        spawn_publisher(&ctx, outbound, args.no_mqtt),
    ];

    if let Some(handle) = loopback {
        tasks.push(spawn_and_log(
            "simulator",
            simulate::run_feeder(ctx.clone(), handle, SIMULATED_REPORT_INTERVAL)
                .instrument(component_span("simulator", None)),
        ));
    }

    wait_for_stop(&ctx).await;
    ctx.request_shutdown();
    join_all(tasks).await;

    if ctx.restart_requested() {
        info!("Exiting for restart");
        return Ok(ExitCode::from(RESTART_EXIT_CODE));
    }
    info!("Stopped");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["lorabridge", "--simulate", "-l", "debug", "--no-mqtt"]);
        assert!(args.simulate);
        assert!(args.no_mqtt);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.config, PathBuf::from("lorabridge.toml"));
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "lorabridge",
            "--config",
            "/nonexistent/lorabridge.toml",
            "--simulate",
            "--log-level",
            "trace",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.radio.transport, "simulated");
        assert_eq!(config.logging.level, "trace");
    }
}
