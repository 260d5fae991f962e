use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::analytics::{CategorySummary, DailyTrend, Dashboard, LowStockItem, TopItem};
use crate::engine::DerivedView;
use crate::entity::Entity;
use crate::error::InvguardError;
use crate::interface::{Health, ViewInterface};
use crate::notify::InventoryEvent;
use crate::query::QueryDescriptor;
use crate::record::Value;
use crate::source::RecordSource;

type Shared<S> = State<Arc<ViewInterface<S>>>;

#[derive(Serialize)]
pub struct ErrorBody {
    pub status: String,
    pub error: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub status: String,
    pub entity: Entity,
    pub records: usize,
}

/// An error answered as `{"status": "error", "error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl From<InvguardError> for ApiError {
    fn from(e: InvguardError) -> Self {
        let status = match e {
            InvguardError::UnknownEntity(_) => StatusCode::NOT_FOUND,
            InvguardError::Unauthorized => StatusCode::UNAUTHORIZED,
            InvguardError::Fetch { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, message: e.to_string() }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: format!("Invalid query descriptor: {}", e.body_text()) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(msg=%self.message, code=%self.status.as_u16(), "request failed");
        let body = ErrorBody { status: "error".into(), error: self.message };
        (self.status, Json(body)).into_response()
    }
}

pub fn router<S: RecordSource>(interface: Arc<ViewInterface<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/health", get(health::<S>))
        .route("/v1/view/:entity", post(view::<S>))
        .route("/v1/facets/:entity/:field", get(facets::<S>))
        .route("/v1/refresh/:entity", post(refresh::<S>))
        .route("/v1/analytics/low-stock", get(low_stock::<S>))
        .route("/v1/analytics/category-summary", get(category_summary::<S>))
        .route("/v1/analytics/top-items", get(top_items::<S>))
        .route("/v1/analytics/stock-trends", get(stock_trends::<S>))
        .route("/v1/analytics/dashboard", get(dashboard::<S>))
        .route("/v1/notifications", get(notifications::<S>))
        .layer(cors)
        .with_state(interface)
}

async fn health<S: RecordSource>(State(iface): Shared<S>) -> Json<Health> {
    Json(iface.health())
}

async fn view<S: RecordSource>(
    State(iface): Shared<S>,
    Path(entity): Path<String>,
    payload: Result<Json<QueryDescriptor>, JsonRejection>,
) -> Result<Json<Arc<DerivedView>>, ApiError> {
    let entity: Entity = entity.parse()?;
    let Json(descriptor) = payload?;
    let started = Instant::now();
    // derivation is synchronous; keep it off the reactor
    let view = tokio::task::spawn_blocking(move || iface.view(entity, &descriptor))
        .await
        .map_err(|e| ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: format!("Join error: {e}") })?;
    let ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(%entity, ms, rows = view.rows.len(), matched = view.matched, limited = view.limited, "view complete");
    Ok(Json(view))
}

async fn facets<S: RecordSource>(
    State(iface): Shared<S>,
    Path((entity, field)): Path<(String, String)>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let entity: Entity = entity.parse()?;
    Ok(Json(iface.facets(entity, &field)))
}

async fn refresh<S: RecordSource>(
    State(iface): Shared<S>,
    Path(entity): Path<String>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let entity: Entity = entity.parse()?;
    match iface.refresh(entity).await {
        Ok(records) => Ok(Json(RefreshResponse { status: "ok".into(), entity, records })),
        Err(notice) => Err(ApiError { status: StatusCode::BAD_GATEWAY, message: notice }),
    }
}

async fn low_stock<S: RecordSource>(State(iface): Shared<S>) -> Json<Vec<LowStockItem>> {
    Json(iface.low_stock())
}

async fn category_summary<S: RecordSource>(State(iface): Shared<S>) -> Json<Vec<CategorySummary>> {
    Json(iface.category_summary())
}

async fn top_items<S: RecordSource>(State(iface): Shared<S>) -> Json<Vec<TopItem>> {
    Json(iface.top_items())
}

async fn stock_trends<S: RecordSource>(State(iface): Shared<S>) -> Json<Vec<DailyTrend>> {
    Json(iface.stock_trends())
}

async fn dashboard<S: RecordSource>(State(iface): Shared<S>) -> Json<Dashboard> {
    Json(iface.dashboard())
}

async fn notifications<S: RecordSource>(State(iface): Shared<S>, ws: WebSocketUpgrade) -> Response {
    let receiver = iface.notifier().receiver();
    ws.on_upgrade(move |socket| stream_events(socket, receiver))
}

/// Forwards events to one websocket client until either side goes away.
async fn stream_events(socket: WebSocket, receiver: broadcast::Receiver<InventoryEvent>) {
    let (mut sink, mut incoming) = socket.split();
    let mut events = BroadcastStream::new(receiver);
    info!("notification client connected");
    loop {
        tokio::select! {
            next = events.next() => match next {
                Some(Ok(event)) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error=%e, "could not encode event");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => warn!(skipped, "notification client lagging"),
                None => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(other)) => debug!(?other, "ignoring client message"),
            },
        }
    }
    info!("notification client disconnected");
}
