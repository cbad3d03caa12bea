//! Booking Live notification server.
//!
//! Serves `GET /ws` and pushes `booking.created` events to the rooms of
//! the restaurants they belong to. Events arrive on the in-process bus,
//! fed by the Redis relay when `BOOKING_LIVE__REDIS__URL` is set.

use std::sync::Arc;

use http::HeaderValue;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use booking_live::adapters::events::{InMemoryEventBus, RedisBookingRelay};
use booking_live::adapters::websocket::{
    websocket_router, BookingEventBridge, RoomManager, WebSocketState,
};
use booking_live::config::{AppConfig, ServerConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    let room_manager = Arc::new(RoomManager::new(config.realtime.room_capacity));
    let event_bus = Arc::new(InMemoryEventBus::with_history_limit(0));
    BookingEventBridge::new_shared(room_manager.clone()).register(event_bus.as_ref());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = match &config.redis {
        Some(redis) => {
            let relay = RedisBookingRelay::new(redis, event_bus.clone())?
                .with_reconnect_policy(config.realtime.reconnect_policy());
            tracing::info!(channel = %redis.channel, "Starting Redis booking relay");
            Some(tokio::spawn(relay.run(shutdown_rx)))
        }
        None => {
            tracing::info!("No Redis configured; only in-process publishers reach clients");
            None
        }
    };

    let app = websocket_router()
        .with_state(WebSocketState::new(room_manager))
        .layer(cors_layer(&config.server))
        .layer(TraceLayer::new_for_http());

    let address = config.server.socket_addr()?;
    let listener = TcpListener::bind(address).await?;
    tracing::info!(%address, environment = ?config.server.environment, "Notification server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(relay) = relay {
        if let Err(e) = relay.await {
            tracing::warn!(error = %e, "Redis relay task failed");
        }
    }

    tracing::info!("Notification server stopped");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if server.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
