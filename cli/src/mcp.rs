//! Model Context Protocol message types and JSON-RPC method routing.
//!
//! Only the stateless subset the dinner planner needs: every request is
//! handled on its own, with no session or initialize gating.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::tools::ToolDispatcher;
use crate::widget::WidgetTemplate;

pub const PROTOCOL_VERSION_LATEST: &str = "2025-06-18";

const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &[PROTOCOL_VERSION_LATEST, "2025-03-26", "2024-11-05"];

pub const SERVER_NAME: &str = "dinner-app";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// --- JSON-RPC ---

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    fn invalid_params(id: Value, detail: String) -> Self {
        let mut resp = Self::error(id, INVALID_PARAMS, "invalid params");
        if let Some(err) = resp.error.as_mut() {
            err.data = Some(json!({ "detail": detail }));
        }
        resp
    }
}

// --- MCP payloads ---

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub protocol_version: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: Value,
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    pub title: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListToolsResult {
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,
    pub title: String,
    pub uri: String,
    pub description: String,
    pub mime_type: String,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResourcesResult {
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

// --- Routing ---

pub struct McpService {
    dispatcher: ToolDispatcher,
    widget: std::sync::Arc<WidgetTemplate>,
    server_info: ServerInfo,
}

impl McpService {
    pub fn new(dispatcher: ToolDispatcher, widget: std::sync::Arc<WidgetTemplate>) -> Self {
        Self {
            dispatcher,
            widget,
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    /// Handle one JSON-RPC message. Notifications (no id) yield `None`.
    pub fn handle(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = req.id else {
            tracing::debug!(method = %req.method, "notification");
            return None;
        };

        if req.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        let response = match req.method.as_str() {
            "initialize" => self.initialize(id, req.params),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => to_response(
                id,
                &ListToolsResult {
                    tools: self.dispatcher.list_tools(),
                },
            ),
            "tools/call" => match parse_params::<CallToolParams>(req.params) {
                Ok(params) => {
                    let result = self.dispatcher.call(&params.name, params.arguments);
                    to_response(id, &result)
                }
                Err(detail) => JsonRpcResponse::invalid_params(id, detail),
            },
            "resources/list" => to_response(
                id,
                &ListResourcesResult {
                    resources: vec![self.widget.resource()],
                },
            ),
            "resources/read" => match parse_params::<ReadResourceParams>(req.params) {
                Ok(params) => to_response(id, &self.read_resource(&params.uri)),
                Err(detail) => JsonRpcResponse::invalid_params(id, detail),
            },
            other => JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
        };
        Some(response)
    }

    fn initialize(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let params = match params.map(serde_json::from_value::<InitializeParams>) {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => return JsonRpcResponse::invalid_params(id, e.to_string()),
            None => None,
        };
        let requested = params.and_then(|p| p.protocol_version);
        let result = InitializeResult {
            protocol_version: negotiate_protocol(requested.as_deref()).to_string(),
            capabilities: json!({
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
            }),
            server_info: self.server_info.clone(),
        };
        to_response(id, &result)
    }

    fn read_resource(&self, uri: &str) -> ReadResourceResult {
        if uri == self.widget.uri {
            ReadResourceResult {
                contents: vec![self.widget.contents()],
                meta: None,
            }
        } else {
            tracing::warn!(%uri, "unknown resource requested");
            ReadResourceResult {
                contents: Vec::new(),
                meta: Some(json!({ "error": format!("Unknown resource: {uri}") })),
            }
        }
    }
}

fn negotiate_protocol(requested: Option<&str>) -> &str {
    match requested {
        Some(v) if SUPPORTED_PROTOCOL_VERSIONS.contains(&v) => v,
        _ => PROTOCOL_VERSION_LATEST,
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, String> {
    let params = params.ok_or_else(|| "missing params".to_string())?;
    serde_json::from_value(params).map_err(|e| e.to_string())
}

fn to_response<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            tracing::error!("failed to serialize MCP result: {e}");
            JsonRpcResponse::error(id, INTERNAL_ERROR, "internal error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use dinner_core::db::Database;
    use dinner_core::ids::SequentialIds;
    use dinner_core::store::MealStore;

    fn service() -> McpService {
        let store = Arc::new(MealStore::new(
            Database::open_in_memory().unwrap(),
            Arc::new(SequentialIds::default()),
        ));
        let widget = Arc::new(WidgetTemplate::generated("http://localhost:8000"));
        McpService::new(ToolDispatcher::new(store, Arc::clone(&widget)), widget)
    }

    fn request(id: Option<Value>, method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }

    fn result_of(resp: JsonRpcResponse) -> Value {
        assert!(resp.error.is_none(), "unexpected error: {:?}", resp.error);
        resp.result.unwrap()
    }

    #[test]
    fn initialize_echoes_supported_version() {
        let svc = service();
        let resp = svc
            .handle(request(
                Some(json!(1)),
                "initialize",
                Some(json!({ "protocolVersion": "2025-03-26", "capabilities": {} })),
            ))
            .unwrap();
        let result = result_of(resp);
        assert_eq!(result["protocolVersion"], "2025-03-26");
        assert_eq!(result["serverInfo"]["name"], "dinner-app");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[test]
    fn initialize_falls_back_to_latest_version() {
        let svc = service();
        let resp = svc
            .handle(request(
                Some(json!(1)),
                "initialize",
                Some(json!({ "protocolVersion": "1999-01-01" })),
            ))
            .unwrap();
        assert_eq!(result_of(resp)["protocolVersion"], PROTOCOL_VERSION_LATEST);
    }

    #[test]
    fn notifications_get_no_response() {
        let svc = service();
        assert!(
            svc.handle(request(None, "notifications/initialized", None))
                .is_none()
        );
    }

    #[test]
    fn wrong_jsonrpc_version_rejected() {
        let svc = service();
        let mut req = request(Some(json!(1)), "ping", None);
        req.jsonrpc = "1.0".to_string();
        let resp = svc.handle(req).unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn unknown_method_not_found() {
        let svc = service();
        let resp = svc
            .handle(request(Some(json!("a")), "prompts/list", None))
            .unwrap();
        assert_eq!(resp.id, json!("a"));
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn tools_call_without_params_is_invalid() {
        let svc = service();
        let resp = svc
            .handle(request(Some(json!(2)), "tools/call", None))
            .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[test]
    fn resources_list_and_read() {
        let svc = service();
        let list = result_of(
            svc.handle(request(Some(json!(1)), "resources/list", None))
                .unwrap(),
        );
        let uri = list["resources"][0]["uri"].as_str().unwrap().to_string();
        assert_eq!(list["resources"][0]["mimeType"], "text/html+skybridge");
        assert_eq!(
            list["resources"][0]["_meta"]["openai/widgetPrefersBorder"],
            true
        );

        let read = result_of(
            svc.handle(request(
                Some(json!(2)),
                "resources/read",
                Some(json!({ "uri": uri })),
            ))
            .unwrap(),
        );
        assert_eq!(read["contents"][0]["uri"], uri.as_str());
        assert!(
            read["contents"][0]["text"]
                .as_str()
                .unwrap()
                .contains("dinnercaster")
        );
    }

    #[test]
    fn resources_read_unknown_uri() {
        let svc = service();
        let read = result_of(
            svc.handle(request(
                Some(json!(1)),
                "resources/read",
                Some(json!({ "uri": "ui://widget/other.html" })),
            ))
            .unwrap(),
        );
        assert_eq!(read["contents"], json!([]));
        assert!(
            read["_meta"]["error"]
                .as_str()
                .unwrap()
                .contains("Unknown resource")
        );
    }
}
