/*!
HTTP backend: wallet login, voter registration and funding
*/

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::{
    net::TcpListener,
    signal::{self, ctrl_c},
    sync::Mutex,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use trustvote_chain::{Address, format_ether, parse_address, parse_ether};

use crate::core::{
    config::AppConfig,
    error::AppError,
    funding::{Funder, FundingService},
};
use crate::database::WalletStore;

pub const LOGIN_SUCCESS: &str = "Wallet registered, funded, and voter registered successfully.";

pub struct AppState {
    pub store: Mutex<WalletStore>,
    pub funder: Arc<dyn Funder>,
}

impl AppState {
    pub fn new(store: WalletStore, funder: Arc<dyn Funder>) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            funder,
        })
    }
}

/// The body is read as raw bytes so a missing or non-JSON content type
/// still reaches address validation. Anything other than a string
/// `walletAddress` is an invalid address.
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload: Value = serde_json::from_slice(&body)?;
    let wallet: Address = payload
        .get("walletAddress")
        .and_then(Value::as_str)
        .and_then(|address| parse_address(address).ok())
        .ok_or(AppError::InvalidAddress)?;

    let is_new = state.store.lock().await.insert(wallet)?;
    if is_new {
        info!("🆕 New wallet {wallet}");
        if let Err(e) = state.funder.register_voter(wallet).await {
            // forget the wallet so the next login retries registration
            if let Err(remove) = state.store.lock().await.remove(wallet) {
                warn!("Could not forget {wallet} after failed registration: {remove}");
            }
            return Err(e.into());
        }
    } else {
        debug!("Wallet {wallet} already registered");
    }

    state.funder.send_funds(wallet).await?;

    Ok(Json(json!({ "message": LOGIN_SUCCESS })))
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/login", post(login_handler))
        .route("/api/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Initializing state...");
    let store = WalletStore::open(&config.server.database_path)?;
    let contract = Arc::new(config.chain.writer()?);
    let amount = parse_ether(&config.server.fund_amount_ether)?;
    info!(
        "Funding {} ETH per login from {}",
        format_ether(amount),
        contract.account().map(|a| a.to_string()).unwrap_or_default()
    );

    let state = AppState::new(store, Arc::new(FundingService::new(contract, amount)));
    let app = router(state);

    let address = format!("0.0.0.0:{}", config.server.port);
    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("🚀 Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🏁 Server stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
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
