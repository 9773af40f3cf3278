//! AquaMon server binary.
//!
//! Configuration comes from the environment:
//!
//! - `AQUAMON_PORT` - listen port (default 3000)
//! - `AQUAMON_DATABASE_URL` - SQLite connection string
//! - `AQUAMON_PREDICTOR_URL` - base URL of the external consumption
//!   predictor; the `/forecast` endpoint returns 503 when unset

use std::env;
use std::net::SocketAddr;

use chrono::Utc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use aquamon::api::{AppState, router};
use aquamon::forecast::PredictorClient;
use aquamon::model::{Tank, ValveStatus};
use aquamon::storage::Storage;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:aquamon.db?mode=rwc";

/// Floors in the demo building seeded on first start.
const DEMO_FLOORS: i64 = 11;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("aquamon=info".parse()?))
        .init();

    let port: u16 = env::var("AQUAMON_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url = env::var("AQUAMON_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    info!(port, db_url = %db_url, "Starting AquaMon server");

    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    if storage.count_tanks().await? == 0 {
        seed_building(&storage).await?;
        info!(floors = DEMO_FLOORS, "Seeded demo building");
    }

    let predictor = match env::var("AQUAMON_PREDICTOR_URL") {
        Ok(url) => {
            info!(predictor_url = %url, "Consumption predictor configured");
            Some(PredictorClient::new(&url)?)
        }
        Err(_) => {
            info!("No consumption predictor configured; /forecast will return 503");
            None
        }
    };

    let state = AppState { storage, predictor };

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "AquaMon is listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the cistern and one tank per floor with healthy levels.
async fn seed_building(storage: &Storage) -> anyhow::Result<()> {
    let now = Utc::now();

    storage
        .insert_tank(&Tank {
            id: "cistern".to_string(),
            floor: 0,
            room_number: None,
            level: 85.0,
            capacity_liters: 50_000,
            valve_status: ValveStatus::Closed,
            last_updated: now,
        })
        .await?;

    for floor in 1..=DEMO_FLOORS {
        storage
            .insert_tank(&Tank {
                id: format!("tank-{floor}"),
                floor,
                room_number: None,
                level: 75.0,
                capacity_liters: 3000,
                valve_status: ValveStatus::Closed,
                last_updated: now,
            })
            .await?;
    }

    Ok(())
}
