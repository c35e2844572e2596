use std::{convert::Infallible, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::{
    config::ServerSettings,
    error::GatewayError,
    models::{ChatRequest, ChatResponse, ConnectionReport, ProviderConfig, StreamEvent},
    router::Gateway,
};

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/**
 * \brief 启动 HTTP 服务。
 * \param settings 监听地址与跨域配置
 * \param gateway  共享的调度入口
 */
pub async fn run(settings: &ServerSettings, gateway: Arc<Gateway>) -> Result<()> {
    let app = router(gateway, &settings.allowed_origins);
    let addr = settings.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {} failed", addr))?;
    tracing::info!(addr = %addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief 构建路由表。
 */
pub fn router(gateway: Arc<Gateway>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/config", post(save_config))
        .route("/api/config/{provider}", get(get_config))
        .route("/api/models/{provider}", get(list_models))
        .route("/api/test-connection", post(test_connection))
        .layer(cors_layer(allowed_origins))
        .with_state(gateway)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

fn gateway_err(err: GatewayError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %err, "request failed");
    } else {
        tracing::warn!(status = status.as_u16(), error = %err, "request rejected");
    }
    (status, Json(json!({ "detail": err.to_string() })))
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "chatrelay gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/**
 * \brief 健康检查。
 */
async fn health_check() -> Json<Value> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(json!({ "status": "healthy", "timestamp": timestamp }))
}

/**
 * \brief 非流式聊天：POST /api/chat
 */
async fn chat(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    gateway.chat(request).await.map(Json).map_err(gateway_err)
}

/**
 * \brief 流式聊天：POST /api/chat/stream，每个事件一条 `data:` JSON，最后一条恒为 done。
 *
 * 客户端断开时 SSE 流被丢弃，上游连接随之释放。
 */
async fn chat_stream(
    State(gateway): State<Arc<Gateway>>,
    Json(request): Json<ChatRequest>,
) -> std::result::Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, ApiError>
{
    let events = gateway.chat_stream(request).map_err(gateway_err)?;
    let frames = events.map(|ev| Ok(Event::default().data(encode_event(&ev))));
    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

fn encode_event(ev: &StreamEvent) -> String {
    serde_json::to_string(ev).unwrap_or_else(|e| {
        json!({ "type": "error", "message": format!("encode event failed: {}", e) }).to_string()
    })
}

/**
 * \brief 保存 Provider 配置。
 */
async fn save_config(
    State(gateway): State<Arc<Gateway>>,
    Json(config): Json<ProviderConfig>,
) -> ApiResult<Value> {
    gateway.save_config(config).map_err(gateway_err)?;
    Ok(Json(json!({ "message": "config saved" })))
}

/**
 * \brief 读取脱敏后的 Provider 配置。
 */
async fn get_config(
    State(gateway): State<Arc<Gateway>>,
    Path(provider): Path<String>,
) -> Json<ProviderConfig> {
    Json(gateway.get_config(&provider))
}

async fn list_models(
    State(gateway): State<Arc<Gateway>>,
    Path(provider): Path<String>,
) -> ApiResult<Value> {
    let models = gateway
        .list_models(&provider, None)
        .await
        .map_err(gateway_err)?;
    Ok(Json(json!({ "provider": provider, "models": models })))
}

/**
 * \brief 使用未保存的配置测试连接。
 */
async fn test_connection(
    State(gateway): State<Arc<Gateway>>,
    Json(config): Json<ProviderConfig>,
) -> ApiResult<ConnectionReport> {
    gateway
        .test_connection(config)
        .await
        .map(Json)
        .map_err(gateway_err)
}
