use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lanboard_core::events::{ClientCommand, CommandSink};
use lanboard_engine::ticker::start_countdown;
use lanboard_engine::StationStore;
use lanboard_gateway::{ActionGateway, HttpStationApi, StationApi};
use lanboard_sync::{ConnectionConfig, ConnectionManager, ConnectionState};
use lanboard_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "lanboard", about = "Operator dashboard core for a gaming cafe network")]
struct Args {
    /// Backend REST base URL.
    #[arg(long, default_value = "http://127.0.0.1:9090", env = "LANBOARD_API_URL")]
    api_url: String,

    /// Backend event channel URL.
    #[arg(long, default_value = "ws://127.0.0.1:9090/events", env = "LANBOARD_EVENTS_URL")]
    events_url: String,

    /// Countdown period in seconds.
    #[arg(long, default_value_t = 60, env = "LANBOARD_TICK_SECS")]
    tick_secs: u64,

    /// Emit JSON log lines.
    #[arg(long, env = "LANBOARD_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_telemetry(&TelemetryConfig {
        json: args.json_logs,
        ..Default::default()
    });
    info!(api_url = %args.api_url, events_url = %args.events_url, "starting lanboard");

    // Explicit construction and wiring; none of these are globals.
    let store = Arc::new(StationStore::new(256));
    let api: Arc<dyn StationApi> = Arc::new(HttpStationApi::new(&args.api_url));
    let connection = Arc::new(ConnectionManager::new(ConnectionConfig::new(&args.events_url)));
    let gateway = Arc::new(
        ActionGateway::new(api, Arc::clone(&store))
            .with_command_sink(Arc::clone(&connection) as Arc<dyn CommandSink>),
    );

    // Cafe config and the initial snapshot. Neither failure is fatal: the
    // dashboard stays inspectable and retries via the reconnect path.
    match gateway.fetch_system_config().await {
        Ok(config) => info!(cafe = %config.cafe_name, "system config loaded"),
        Err(e) => warn!(error = %e, "system config unavailable"),
    }
    if let Err(e) = gateway.fetch_and_hydrate().await {
        warn!(error = %e, "initial hydration failed, starting empty");
    }

    // Event pump: every push event funnels into the store.
    let pump_store = Arc::clone(&store);
    let mut events = connection.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => pump_store.apply_remote_event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event pump lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Resync after every (re)connect: ask the server to replay, then pull a
    // fresh authoritative snapshot over REST.
    let resync_gateway = Arc::clone(&gateway);
    let resync_connection = Arc::clone(&connection);
    let mut state_rx = connection.state();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow();
            match state {
                ConnectionState::Connected => {
                    if let Err(e) = resync_connection.send(&ClientCommand::Resync) {
                        warn!(error = %e, "resync request not sent");
                    }
                    if let Err(e) = resync_gateway.fetch_and_hydrate().await {
                        warn!(error = %e, "post-connect hydration failed");
                    } else {
                        info!("event channel connected, state resynced");
                    }
                }
                ConnectionState::Disconnected => info!("event channel down"),
                ConnectionState::Connecting => {}
            }
        }
    });

    // Surface action failures the way a front-end would.
    let mut notifications = gateway.subscribe_notifications();
    tokio::spawn(async move {
        while let Ok(note) = notifications.recv().await {
            warn!(
                action = note.action,
                station_id = note.station_id.as_ref().map(|id| id.as_str()),
                "{}",
                note.message
            );
        }
    });

    connection.connect();

    let shutdown = CancellationToken::new();
    let ticker = start_countdown(
        Arc::clone(&store),
        Duration::from_secs(args.tick_secs),
        shutdown.clone(),
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown.cancel();
    connection.disconnect();
    let _ = ticker.await;
    Ok(())
}
