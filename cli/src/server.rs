use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::mcp::{INVALID_REQUEST, JsonRpcRequest, JsonRpcResponse, McpService, PARSE_ERROR};
use crate::tools::ToolDispatcher;
use crate::widget::WidgetTemplate;
use dinner_core::store::MealStore;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB

#[derive(Clone)]
struct AppState {
    mcp: Arc<McpService>,
    assets_dir: Arc<PathBuf>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(err) => {
                tracing::error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    response
}

// --- Handlers ---

async fn home() -> &'static str {
    "Dinner MCP server"
}

async fn mcp_endpoint(State(state): State<AppState>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("unparsable MCP body: {e}");
            return Json(JsonRpcResponse::error(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {e}"),
            ))
            .into_response();
        }
    };

    if value.is_array() {
        return Json(JsonRpcResponse::error(
            Value::Null,
            INVALID_REQUEST,
            "Batch requests are not supported",
        ))
        .into_response();
    }

    if value.get("id").is_some_and(Value::is_null) {
        return Json(JsonRpcResponse::error(
            Value::Null,
            INVALID_REQUEST,
            "Request id must not be null",
        ))
        .into_response();
    }

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            return Json(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {e}"),
            ))
            .into_response();
        }
    };

    match state.mcp.handle(request) {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn serve_asset(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::NotFound(format!("Asset '{file}' not found"));

    if file.contains(['/', '\\']) || file.starts_with('.') {
        return Err(not_found());
    }
    let content_type = match std::path::Path::new(&file)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        _ => return Err(not_found()),
    };

    let path = state.assets_dir.join(&file);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => {
            let err = anyhow::Error::new(e).context(format!("Failed to read asset {}", path.display()));
            return Err(err.into());
        }
    };

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

// --- Router ---

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers(Any);

    Router::new()
        .route("/", get(home))
        .route("/mcp", post(mcp_endpoint))
        .route("/{file}", get(serve_asset))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn app_state(store: MealStore, widget: WidgetTemplate, assets_dir: PathBuf) -> AppState {
    let widget = Arc::new(widget);
    let dispatcher = ToolDispatcher::new(Arc::new(store), Arc::clone(&widget));
    AppState {
        mcp: Arc::new(McpService::new(dispatcher, widget)),
        assets_dir: Arc::new(assets_dir),
    }
}

// --- Server startup ---

pub struct ServeOptions {
    pub bind: String,
    pub port: u16,
    pub assets_dir: PathBuf,
}

pub async fn start_server(
    store: MealStore,
    widget: WidgetTemplate,
    options: ServeOptions,
) -> anyhow::Result<()> {
    let app = build_router(app_state(store, widget, options.assets_dir));

    let addr = format!("{}:{}", options.bind, options.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("listening on http://{addr} (MCP endpoint at /mcp)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use dinner_core::db::Database;
    use dinner_core::ids::SequentialIds;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_app_with_assets(assets_dir: PathBuf) -> Router {
        let store = MealStore::new(
            Database::open_in_memory().unwrap(),
            Arc::new(SequentialIds::default()),
        );
        let widget = WidgetTemplate::generated("http://localhost:8000");
        build_router(app_state(store, widget, assets_dir))
    }

    fn test_app() -> Router {
        test_app_with_assets(PathBuf::from("does-not-exist"))
    }

    async fn post_mcp(app: &Router, body: Value) -> (StatusCode, Value) {
        post_raw(app, body.to_string()).await
    }

    async fn post_raw(app: &Router, body: String) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                axum::http::Request::post("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn call(id: i64, tool: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": tool, "arguments": arguments },
        })
    }

    #[tokio::test]
    async fn home_returns_banner() {
        let response = test_app()
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Dinner MCP server");
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let app = test_app();
        let (status, json) = post_mcp(
            &app,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {},
                    "clientInfo": { "name": "test", "version": "0" },
                },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], 1);
        assert_eq!(json["result"]["protocolVersion"], "2025-06-18");
        assert_eq!(json["result"]["serverInfo"]["name"], "dinner-app");
    }

    #[tokio::test]
    async fn tools_list_has_three_tools() {
        let app = test_app();
        let (_, json) = post_mcp(
            &app,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
        )
        .await;
        let tools = json["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 3);
        assert!(tools.iter().all(|t| t["inputSchema"].is_object()));
        assert!(
            tools
                .iter()
                .all(|t| t["_meta"]["openai/outputTemplate"] == "ui://widget/dinnercaster.html")
        );
    }

    #[tokio::test]
    async fn add_then_show_round_trip() {
        let app = test_app();
        let (_, added) = post_mcp(
            &app,
            call(1, "add_meal", json!({ "meal": "Tacos", "date": "2025-12-01" })),
        )
        .await;
        assert_eq!(added["result"]["content"][0]["text"], "Added \"Tacos\".");
        assert_eq!(added["result"]["structuredContent"]["meal"]["id"], "meal-1");
        assert!(added["result"].get("isError").is_none());

        post_mcp(
            &app,
            call(2, "add_meal", json!({ "meal": "Curry", "date": "2025-12-02" })),
        )
        .await;

        let (_, shown) = post_mcp(&app, call(3, "show_meals", json!({}))).await;
        let meals = shown["result"]["structuredContent"]["meals"]
            .as_array()
            .unwrap();
        assert_eq!(meals.len(), 2);
        assert_eq!(meals[0]["meal"], "Tacos");
        assert_eq!(meals[1]["date"], "2025-12-02");
        assert_eq!(
            shown["result"]["_meta"]["openai/resultCanProduceWidget"],
            true
        );
    }

    #[tokio::test]
    async fn validation_failure_is_tool_error() {
        let app = test_app();
        let (status, json) = post_mcp(
            &app,
            call(1, "add_meal", json!({ "meal": "Tacos", "date": "tomorrow" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.get("error").is_none());
        assert_eq!(json["result"]["isError"], true);

        let (_, shown) = post_mcp(&app, call(2, "show_meals", json!({}))).await;
        assert_eq!(shown["result"]["structuredContent"]["meals"], json!([]));
    }

    #[tokio::test]
    async fn remove_missing_meal_reports_false() {
        let app = test_app();
        let (_, json) = post_mcp(&app, call(1, "remove_meal", json!({ "id": "meal-7" }))).await;
        assert_eq!(json["result"]["structuredContent"]["removed"], false);
        assert_eq!(
            json["result"]["content"][0]["text"],
            "Meal meal-7 was not found."
        );
    }

    #[tokio::test]
    async fn unknown_method_returns_32601() {
        let app = test_app();
        let (_, json) = post_mcp(
            &app,
            json!({ "jsonrpc": "2.0", "id": "x", "method": "sampling/createMessage" }),
        )
        .await;
        assert_eq!(json["id"], "x");
        assert_eq!(json["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn notification_returns_202() {
        let app = test_app();
        let (status, json) = post_mcp(
            &app,
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json, Value::Null);
    }

    #[tokio::test]
    async fn null_id_is_rejected_not_treated_as_notification() {
        let app = test_app();
        let (status, json) = post_mcp(
            &app,
            json!({ "jsonrpc": "2.0", "id": null, "method": "ping" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["error"]["code"], INVALID_REQUEST);
        assert_eq!(json["id"], Value::Null);
    }

    #[tokio::test]
    async fn unparsable_body_returns_parse_error() {
        let app = test_app();
        let (_, json) = post_raw(&app, "{not json".to_string()).await;
        assert_eq!(json["error"]["code"], -32700);
        assert_eq!(json["id"], Value::Null);
    }

    #[tokio::test]
    async fn batch_and_malformed_requests_are_invalid() {
        let app = test_app();
        let (_, batch) = post_mcp(&app, json!([{ "jsonrpc": "2.0", "id": 1, "method": "ping" }])).await;
        assert_eq!(batch["error"]["code"], -32600);

        let (_, missing_method) = post_mcp(&app, json!({ "jsonrpc": "2.0", "id": 5 })).await;
        assert_eq!(missing_method["error"]["code"], -32600);
        assert_eq!(missing_method["id"], 5);
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = test_app();
        let big_body = vec![b' '; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/mcp")
                    .header("content-type", "application/json")
                    .header("content-length", big_body.len().to_string())
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn serves_js_and_css_assets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dinnercaster.js"), "console.log(1);").unwrap();
        std::fs::write(dir.path().join("dinnercaster.css"), "body{}").unwrap();
        let app = test_app_with_assets(dir.path().to_path_buf());

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::get("/dinnercaster.js")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/javascript; charset=utf-8"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"console.log(1);");

        let response = app
            .oneshot(
                axum::http::Request::get("/dinnercaster.css")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/css; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn asset_missing_or_disallowed_is_404() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "secret").unwrap();
        let app = test_app_with_assets(dir.path().to_path_buf());

        for uri in ["/missing.js", "/notes.txt", "/..%2Fetc.js"] {
            let response = app
                .clone()
                .oneshot(axum::http::Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let response = test_app()
            .oneshot(
                axum::http::Request::get("/")
                    .header("origin", "https://chatgpt.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn cors_preflight_allows_post_to_mcp() {
        let response = test_app()
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/mcp")
                    .header("origin", "https://chatgpt.com")
                    .header("access-control-request-method", "POST")
                    .header("access-control-request-headers", "content-type")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        let methods = headers
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(methods.contains("POST"));
        assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret path /home/user/.dinner/dinner.db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }
}
