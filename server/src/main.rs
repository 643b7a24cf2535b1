//! bottrade server: REST + WebSocket surface over the signal engine.

mod mock;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Extension, Path, Query, WebSocketUpgrade,
    },
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bottrade::config::Settings;
use bottrade::events::EventBus;
use bottrade::models::SignalStatus;
use bottrade::notify::LogNotifier;
use bottrade::pipeline::PipelineSet;
use bottrade::store::{SignalFilter, Store};

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
    bus: EventBus,
    pipelines: Arc<PipelineSet>,
    timeframe: String,
    default_quantity: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();
    init_tracing();

    let mut settings = Settings::from_env();
    info!("Bot Trade server initializing...");

    // Store-open failure is the only fatal startup condition.
    let store = Arc::new(Store::open(&settings.database_path)?);

    // Persisted settings override the environment.
    let watchlist = match store.get_setting("watchlist")? {
        Some(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(list) if !list.is_empty() => {
                info!(?list, "watchlist loaded from store");
                list
            }
            _ => {
                warn!("invalid persisted watchlist, using environment");
                settings.watchlist.clone()
            }
        },
        None => settings.watchlist.clone(),
    };
    if let Some(quantity) = store
        .get_setting("default_quantity")?
        .and_then(|v| v.parse::<i64>().ok())
    {
        settings.engine.default_quantity = quantity;
    }

    let bus = EventBus::new();
    let pipelines = Arc::new(PipelineSet::new(
        Arc::clone(&store),
        bus.clone(),
        Arc::new(LogNotifier),
        &settings,
    ));
    pipelines.set_watchlist(&watchlist);

    if settings.mock_feed {
        info!("mock market feed enabled");
        bus.set_system_status("connected", true);
        tokio::spawn(mock::run(
            Arc::clone(&pipelines),
            settings.timeframe.clone(),
        ));
    } else {
        // The live transport adapter attaches out of process; until bars
        // arrive the server runs API-only.
        bus.set_system_status("waiting_for_transport", false);
    }

    let state = AppState {
        store,
        bus,
        pipelines: Arc::clone(&pipelines),
        timeframe: settings.timeframe.clone(),
        default_quantity: settings.engine.default_quantity,
    };

    let cors = CorsLayer::new()
        .allow_origin("*".parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::PUT])
        .allow_headers(tower_http::cors::Any);

    let app = Router::new()
        // GET /health
        .route("/health", get(health))
        // GET /symbols
        .route("/symbols", get(get_symbols))
        // GET /settings + PUT /settings (watchlist, default_quantity)
        .route("/settings", get(get_settings).put(put_settings))
        // GET /signals?symbol=&status=&limit=
        .route("/signals", get(get_signals))
        // GET /signals/{id}
        .route("/signals/{id}", get(get_signal))
        // GET /bars?symbol=&limit=
        .route("/bars", get(get_bars))
        // GET /indicators/{symbol} - latest worker analysis snapshot
        .route("/indicators/{symbol}", get(get_indicators))
        // GET /stream - WebSocket event feed
        .route("/stream", get(ws_stream_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("starting bottrade server on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pipelines.shutdown();
    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    dnse_connected: bool,
    timestamp: String,
}

/// GET /health
async fn health(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let system = state.bus.system_status();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dnse_connected: system.dnse_connected,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// GET /symbols
async fn get_symbols(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(state.pipelines.symbols())
}

/// GET /settings
async fn get_settings(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let default_quantity = state
        .store
        .get_setting("default_quantity")
        .ok()
        .flatten()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(state.default_quantity);

    Json(json!({
        "watchlist": state.pipelines.symbols(),
        "default_quantity": default_quantity,
        "timeframe": state.timeframe,
    }))
}

#[derive(Deserialize)]
struct SettingsUpdate {
    watchlist: Option<Vec<String>>,
    default_quantity: Option<i64>,
}

/// PUT /settings
///
/// Watchlist changes apply to the running pipelines immediately; a new
/// default quantity affects workers spawned from now on.
async fn put_settings(
    Extension(state): Extension<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(raw) = update.watchlist {
        let symbols: Vec<String> = raw
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        state
            .store
            .save_setting("watchlist", &serde_json::to_string(&symbols)?)?;
        state.pipelines.set_watchlist(&symbols);
        info!(?symbols, "watchlist updated");
    }

    if let Some(quantity) = update.default_quantity {
        if quantity <= 0 {
            return Err(ApiError::bad_request("default_quantity must be positive"));
        }
        state
            .store
            .save_setting("default_quantity", &quantity.to_string())?;
        info!(quantity, "default quantity updated");
    }

    Ok(Json(json!({
        "watchlist": state.pipelines.symbols(),
        "status": "ok",
    })))
}

#[derive(Deserialize)]
struct SignalsQuery {
    symbol: Option<String>,
    status: Option<String>,
    limit: Option<usize>,
}

/// GET /signals?symbol=&status=&limit=
async fn get_signals(
    Extension(state): Extension<AppState>,
    Query(query): Query<SignalsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            SignalStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request("unknown signal status"))?,
        ),
        None => None,
    };
    let signals = state.store.get_signals(&SignalFilter {
        symbol: query.symbol.map(|s| s.to_uppercase()),
        status,
        limit: query.limit.unwrap_or(50),
    })?;
    Ok(Json(signals))
}

/// GET /signals/{id}
async fn get_signal(
    Extension(state): Extension<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.get_signal(id)? {
        Some(signal) => Ok(Json(signal)),
        None => Err(ApiError::not_found("signal not found")),
    }
}

#[derive(Deserialize)]
struct BarsQuery {
    symbol: Option<String>,
    limit: Option<usize>,
}

/// GET /bars?symbol=&limit=
async fn get_bars(
    Extension(state): Extension<AppState>,
    Query(query): Query<BarsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let symbol = query
        .symbol
        .ok_or_else(|| ApiError::bad_request("symbol query parameter is required"))?
        .to_uppercase();
    let bars = state
        .store
        .get_bars(&symbol, &state.timeframe, query.limit.unwrap_or(100))?;
    Ok(Json(bars))
}

/// GET /indicators/{symbol}
async fn get_indicators(
    Extension(state): Extension<AppState>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let symbol = symbol.to_uppercase();
    match state.pipelines.snapshot(&symbol).await {
        Some(check) => Ok(Json(check)),
        None if state.pipelines.symbols().contains(&symbol) => {
            Err(ApiError::not_found("no analysis yet for symbol"))
        }
        None => Err(ApiError::not_found("symbol not in watchlist")),
    }
}

/// GET /stream
///
/// WebSocket feed of `{ "event": ..., "data": ... }` envelopes: the
/// current system status and latest per-symbol signal-checks first, then
/// live events.
async fn ws_stream_handler(
    Extension(state): Extension<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream_socket(state, socket))
}

async fn handle_stream_socket(state: AppState, socket: WebSocket) {
    info!("new streaming WebSocket connection");
    let mut subscription = state.bus.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = subscription.rx.recv() => {
                match event {
                    Some(event) => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(e) => {
                                error!(error = %e, "event serialization failed");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    // The bus dropped us (slow subscriber): close the socket.
                    None => break,
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound frames carry no commands on this feed.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!("WebSocket stream connection closed");
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Received Ctrl+C signal"),
        _ = terminate => warn!("Received terminate signal"),
    }

    info!("Shutting down gracefully...");
}

/// Error envelope for REST handlers.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
        }
    }

    fn not_found(message: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<bottrade::BotError> for ApiError {
    fn from(e: bottrade::BotError) -> Self {
        error!(error = %e, "store error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}
