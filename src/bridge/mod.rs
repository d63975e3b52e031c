//! Localhost JSON bridge.
//!
//! A small HTTP surface on the loopback interface that maps one path per
//! operation onto the registered session manager. The bridge owns no
//! browser state: it validates, dispatches, and shapes responses. Every
//! non-2xx answer carries the same `{"error": "..."}` body so an agent can
//! branch on one field regardless of which layer failed.

pub mod validate;

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{error, info, warn};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::capability::{
    ClickParams, ConsoleParams, DragAndDropParams, EvaluateParams, FillParams, GetAttributeParams,
    GetTextParams, HighlightParams, HoverParams, InspectParams, NavigateParams, PressKeyParams,
    ScreenshotParams, ScrollParams, SelectOptionParams, SelectorParams, SetDialogHandlerParams,
    TypeParams, WaitForParams, WaitForResponseParams,
};
use crate::error::{AutomationError, Result};
use crate::session::SessionManager;
use validate::{InspectTarget, parse_body, require_non_empty, resolve_inspect_target,
    validate_selector};

/// Port the bridge listens on unless overridden.
pub const DEFAULT_BRIDGE_PORT: u16 = 9333;

/// Request body ceiling, enforced while the body streams in.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// The protocol layer. Holds the registered handler and nothing else.
pub struct Bridge {
    handler: RwLock<Option<Arc<SessionManager>>>,
}

impl Bridge {
    pub fn new() -> Self {
        Self { handler: RwLock::new(None) }
    }

    pub fn with_handler(manager: Arc<SessionManager>) -> Self {
        Self { handler: RwLock::new(Some(manager)) }
    }

    /// Register or replace the session manager behind the bridge.
    pub fn register_handler(&self, manager: Arc<SessionManager>) {
        match self.handler.write() {
            Ok(mut slot) => *slot = Some(manager),
            Err(poisoned) => *poisoned.into_inner() = Some(manager),
        }
    }

    pub fn clear_handler(&self) {
        match self.handler.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn has_handler(&self) -> bool {
        match self.handler.read() {
            Ok(slot) => slot.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    fn handler(&self) -> Result<Arc<SessionManager>> {
        let slot = match self.handler.read() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.as_ref().cloned().ok_or(AutomationError::HandlerUnavailable)
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

fn status_for(err: &AutomationError) -> StatusCode {
    match err {
        AutomationError::InvalidParams(_)
        | AutomationError::MalformedBody(_)
        | AutomationError::InvalidSelector { .. } => StatusCode::BAD_REQUEST,
        AutomationError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        AutomationError::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
        AutomationError::HandlerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        AutomationError::ConnectionFailed(_)
        | AutomationError::PageNotFound(_)
        | AutomationError::ConnectionLost(_)
        | AutomationError::ElementNotFound(_)
        | AutomationError::Timeout(_)
        | AutomationError::Script(_)
        | AutomationError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AutomationError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("operation failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// -- route handlers ----------------------------------------------------------

/// Liveness. Never touches the handler, so it answers even while the
/// browser side is down or not yet registered.
async fn health(State(bridge): State<Arc<Bridge>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "handler": bridge.has_handler(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn state(State(bridge): State<Arc<Bridge>>) -> Result<Json<Value>> {
    let manager = bridge.handler()?;
    let state = manager.state().await;
    Ok(Json(to_json(&state)?))
}

async fn navigate(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: NavigateParams = parse_body(&body)?;
    let url = require_non_empty(&params.url, "url")?.to_string();
    let manager = bridge.handler()?;
    let url = manager.navigate(&url).await?;
    Ok(Json(json!({ "success": true, "url": url })))
}

async fn inspect(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: InspectParams = parse_body(&body)?;
    let target = resolve_inspect_target(params)?;
    let manager = bridge.handler()?;
    let info = match target {
        InspectTarget::Selector(selector) => manager.inspect_selector(&selector).await?,
        InspectTarget::Point { x, y } => manager.inspect_point(x, y).await?,
    };
    Ok(Json(to_json(&info)?))
}

async fn highlight(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: HighlightParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let color = match params.color.as_deref() {
        Some(color) => Some(require_non_empty(color, "color")?.to_string()),
        None => None,
    };
    let manager = bridge.handler()?;
    manager.highlight(&selector, color.as_deref(), params.duration_ms).await?;
    Ok(Json(json!({ "success": true })))
}

async fn clear_highlights(State(bridge): State<Arc<Bridge>>) -> Result<Json<Value>> {
    let manager = bridge.handler()?;
    manager.clear_highlights().await?;
    Ok(Json(json!({ "success": true })))
}

async fn screenshot(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: ScreenshotParams = parse_body(&body)?;
    let selector = match params.selector.as_deref() {
        Some(selector) => Some(validate_selector(selector)?.to_string()),
        None => None,
    };
    let manager = bridge.handler()?;
    let png = manager.screenshot(selector.as_deref()).await?;
    Ok(Json(json!({
        "data": BASE64.encode(&png),
        "mimeType": "image/png",
    })))
}

async fn console_get(State(bridge): State<Arc<Bridge>>) -> Result<Json<Value>> {
    console_result(&bridge, ConsoleParams::default()).await
}

async fn console_post(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: ConsoleParams = parse_body(&body)?;
    console_result(&bridge, params).await
}

async fn console_result(bridge: &Bridge, params: ConsoleParams) -> Result<Json<Value>> {
    let manager = bridge.handler()?;
    let messages = manager.console(params.level, params.limit).await?;
    Ok(Json(json!({ "messages": messages })))
}

async fn reload(State(bridge): State<Arc<Bridge>>) -> Result<Json<Value>> {
    let manager = bridge.handler()?;
    manager.reload().await?;
    Ok(Json(json!({ "success": true })))
}

async fn click(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: ClickParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    manager.click(&selector, &params.options).await?;
    Ok(Json(json!({ "success": true })))
}

async fn type_text(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: TypeParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    manager.type_text(&selector, &params.text, params.clear, &params.options).await?;
    Ok(Json(json!({ "success": true })))
}

async fn wait_for(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: WaitForParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    manager.wait_for(&selector, &params.options).await?;
    Ok(Json(json!({ "success": true })))
}

async fn fill(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: FillParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    manager.fill(&selector, &params.value, &params.options).await?;
    Ok(Json(json!({ "success": true })))
}

async fn select_option(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: SelectOptionParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    manager.select_option(&selector, &params.value, &params.options).await?;
    Ok(Json(json!({ "success": true })))
}

async fn hover(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: HoverParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    manager.hover(&selector, &params.options).await?;
    Ok(Json(json!({ "success": true })))
}

async fn press_key(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: PressKeyParams = parse_body(&body)?;
    let key = require_non_empty(&params.key, "key")?.to_string();
    let manager = bridge.handler()?;
    manager.press_key(&key).await?;
    Ok(Json(json!({ "success": true })))
}

async fn drag_and_drop(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: DragAndDropParams = parse_body(&body)?;
    let source = validate_selector(&params.source)?.to_string();
    let target = validate_selector(&params.target)?.to_string();
    let manager = bridge.handler()?;
    manager.drag_and_drop(&source, &target, &params.options).await?;
    Ok(Json(json!({ "success": true })))
}

async fn scroll(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: ScrollParams = parse_body(&body)?;
    if !params.delta_x.is_finite() || !params.delta_y.is_finite() {
        return Err(AutomationError::InvalidParams(
            "deltaX and deltaY must be finite numbers".to_string(),
        ));
    }
    let manager = bridge.handler()?;
    manager.scroll(params.delta_x, params.delta_y).await?;
    Ok(Json(json!({ "success": true })))
}

async fn wait_for_response(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: WaitForResponseParams = parse_body(&body)?;
    let pattern = require_non_empty(&params.url_pattern, "urlPattern")?.to_string();
    let manager = bridge.handler()?;
    let response = manager.wait_for_response(&pattern, &params.options).await?;
    Ok(Json(json!({ "response": response })))
}

async fn get_text(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: GetTextParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    let text = manager.get_text(&selector, &params.options).await?;
    Ok(Json(json!({ "text": text })))
}

async fn get_attribute(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: GetAttributeParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let name = require_non_empty(&params.name, "name")?.to_string();
    let manager = bridge.handler()?;
    let value = manager.get_attribute(&selector, &name, &params.options).await?;
    Ok(Json(json!({ "value": value })))
}

async fn is_visible(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: SelectorParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    let visible = manager.is_visible(&selector, &params.options).await?;
    Ok(Json(json!({ "visible": visible })))
}

async fn is_enabled(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: SelectorParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    let enabled = manager.is_enabled(&selector, &params.options).await?;
    Ok(Json(json!({ "enabled": enabled })))
}

async fn is_checked(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: SelectorParams = parse_body(&body)?;
    let selector = validate_selector(&params.selector)?.to_string();
    let manager = bridge.handler()?;
    let checked = manager.is_checked(&selector, &params.options).await?;
    Ok(Json(json!({ "checked": checked })))
}

async fn evaluate(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: EvaluateParams = parse_body(&body)?;
    let script = require_non_empty(&params.script, "script")?.to_string();
    let manager = bridge.handler()?;
    let result = manager.evaluate(&script).await?;
    Ok(Json(json!({ "result": result })))
}

async fn accessibility_snapshot(State(bridge): State<Arc<Bridge>>) -> Result<Json<Value>> {
    let manager = bridge.handler()?;
    let snapshot = manager.accessibility_snapshot().await?;
    Ok(Json(json!({ "snapshot": snapshot })))
}

async fn go_back(State(bridge): State<Arc<Bridge>>) -> Result<Json<Value>> {
    let manager = bridge.handler()?;
    manager.go_back().await?;
    Ok(Json(json!({ "success": true })))
}

async fn go_forward(State(bridge): State<Arc<Bridge>>) -> Result<Json<Value>> {
    let manager = bridge.handler()?;
    manager.go_forward().await?;
    Ok(Json(json!({ "success": true })))
}

async fn set_dialog_handler(State(bridge): State<Arc<Bridge>>, body: Bytes) -> Result<Json<Value>> {
    let params: SetDialogHandlerParams = parse_body(&body)?;
    let manager = bridge.handler()?;
    manager
        .set_dialog_handler(params.action, params.prompt_text.as_deref())
        .await?;
    Ok(Json(json!({ "success": true })))
}

async fn unknown_path(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Unknown path: {}", uri.path()) })),
    )
        .into_response()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| AutomationError::Unexpected(err.to_string()))
}

// -- middleware --------------------------------------------------------------

/// Loopback origins only: `localhost`, `127.x`, `[::1]` over http or https.
fn is_loopback_origin(origin: &str) -> bool {
    let Ok(url) = url::Url::parse(origin) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    match url.host() {
        Some(url::Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Echo `Access-Control-Allow-Origin` for loopback origins only. Other
/// origins get no CORS headers at all; the browser enforces the denial.
async fn cors(req: Request, next: Next) -> Response {
    let allowed = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .filter(|origin| is_loopback_origin(origin))
        .map(str::to_string);

    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        if let Some(origin) = allowed {
            if let Ok(value) = HeaderValue::from_str(&origin) {
                let headers = response.headers_mut();
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static("GET, POST, OPTIONS"),
                );
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("content-type"),
                );
            }
        }
        return response;
    }

    let mut response = next.run(req).await;
    if let Some(origin) = allowed {
        if let Ok(value) = HeaderValue::from_str(&origin) {
            response
                .headers_mut()
                .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
    response
}

/// Rewrap error responses produced below the routing layer (body-limit
/// rejections, method mismatches) into the uniform `{"error"}` shape.
async fn uniform_errors(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));
    if is_json {
        return response;
    }
    let (parts, body) = response.into_parts();
    let text = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => String::new(),
    };
    let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
        AutomationError::BodyTooLarge(MAX_BODY_BYTES).to_string()
    } else if text.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        text
    };
    let mut rewrapped = (status, Json(json!({ "error": message }))).into_response();
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            rewrapped.headers_mut().insert(name, value.clone());
        }
    }
    rewrapped
}

// -- wiring ------------------------------------------------------------------

/// One route per operation plus `/health`, wrapped in the body limit, the
/// error rewrapper and the CORS echo.
pub fn router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(state))
        .route("/navigate", post(navigate))
        .route("/inspect", post(inspect))
        .route("/highlight", post(highlight))
        .route("/clear-highlights", post(clear_highlights))
        .route("/screenshot", post(screenshot))
        .route("/console", get(console_get).post(console_post))
        .route("/reload", post(reload))
        .route("/click", post(click))
        .route("/type", post(type_text))
        .route("/wait-for", post(wait_for))
        .route("/fill", post(fill))
        .route("/select-option", post(select_option))
        .route("/hover", post(hover))
        .route("/press-key", post(press_key))
        .route("/drag-and-drop", post(drag_and_drop))
        .route("/scroll", post(scroll))
        .route("/wait-for-response", post(wait_for_response))
        .route("/get-text", post(get_text))
        .route("/get-attribute", post(get_attribute))
        .route("/is-visible", post(is_visible))
        .route("/is-enabled", post(is_enabled))
        .route("/is-checked", post(is_checked))
        .route("/evaluate", post(evaluate))
        .route("/accessibility-snapshot", post(accessibility_snapshot))
        .route("/go-back", post(go_back))
        .route("/go-forward", post(go_forward))
        .route("/set-dialog-handler", post(set_dialog_handler))
        .fallback(unknown_path)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(uniform_errors))
        .layer(middleware::from_fn(cors))
        .with_state(bridge)
}

/// Bind the loopback listener and serve until ctrl-c.
pub async fn serve(bridge: Arc<Bridge>, port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    info!("bridge listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(bridge))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler failed: {}", err);
    } else {
        info!("shutting down");
    }
}
