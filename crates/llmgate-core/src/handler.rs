use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use http::{header, StatusCode};
use llmgate_common::GatewayConfig;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::check_access;
use crate::address::build_upstream_url;
use crate::credential::translate_credential;
use crate::error::{error_body, GatewayError};
use crate::gate::{gate_request, GateDecision};
use crate::models::{filter_model_listing, ListModelsResponse, ModelTable};
use crate::relay::{buffered_source, frame_byte_stream, spawn_relay};
use crate::upstream_client::{
    Headers, UpstreamBody, UpstreamClient, UpstreamRequest, UpstreamResponse, REQUEST_DEADLINE,
};

/// Upstream endpoint paths the gateway will forward. Anything else is
/// rejected before credential or forwarding logic runs.
const ALLOWED_PATHS: &[&str] = &[
    "v1/chat/completions",
    "v1/completions",
    "v1/embeddings",
    "v1/models",
];

const LIST_MODELS_PATH: &str = "v1/models";
const TRACE_ID_HEADER: &str = "x-llmgate-request-id";

pub struct GatewayState {
    pub config: GatewayConfig,
    pub models: ModelTable,
    pub client: Arc<dyn UpstreamClient>,
}

pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, client: Arc<dyn UpstreamClient>) -> Self {
        let mut models = ModelTable::build(config.custom_models.as_deref());
        if config.disable_gpt4 {
            models = models.with_prefix_denied("gpt-4");
        }
        Self {
            state: Arc::new(GatewayState {
                config,
                models,
                client,
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/openai/{*path}", any(openai_proxy_handler))
            .with_state(self.state.clone())
    }

    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }
}

async fn openai_proxy_handler(
    State(state): State<Arc<GatewayState>>,
    Path(path): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(state, path, method, uri.query(), headers, body).await
}

pub async fn handle(
    state: Arc<GatewayState>,
    path: String,
    method: Method,
    query: Option<&str>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = Uuid::now_v7().to_string();
    let started_at = Instant::now();
    let path = path.trim_start_matches('/').to_string();

    if method == Method::OPTIONS {
        return with_trace_id(preflight_response(), &trace_id);
    }

    info!(
        event = "downstream_received",
        trace_id = %trace_id,
        method = %method,
        path = %path,
    );

    if !ALLOWED_PATHS.contains(&path.as_str()) {
        warn!(event = "forbidden_path", trace_id = %trace_id, path = %path);
        return with_trace_id(
            GatewayError::ForbiddenPath(path).into_response(),
            &trace_id,
        );
    }

    let credential = match check_access(&headers, &state.config) {
        Ok(credential) => credential,
        Err(err) => {
            warn!(event = "access_denied", trace_id = %trace_id, reason = %err);
            return with_trace_id(err.into_response(), &trace_id);
        }
    };

    let azure = state.config.azure_mode();
    let outbound_credential = translate_credential(credential.as_deref(), azure);
    let suffix = match query {
        Some(query) => format!("{path}?{query}"),
        None => path.clone(),
    };
    let url = match build_upstream_url(&suffix, &state.config) {
        Ok(url) => url,
        Err(err) => {
            warn!(event = "config_error", trace_id = %trace_id, reason = %err);
            return with_trace_id(err.into_response(), &trace_id);
        }
    };

    // The gate consumed the body to inspect it; forward the bytes it hands
    // back, never the original extractor value.
    let (decision, body) = gate_request(body, &state.models);
    if let GateDecision::Deny { model } = decision {
        warn!(event = "forbidden_model", trace_id = %trace_id, model = %model);
        return with_trace_id(GatewayError::ForbiddenModel(model).into_response(), &trace_id);
    }

    let mut outbound_headers: Headers = vec![
        ("content-type".to_string(), "application/json".to_string()),
        ("cache-control".to_string(), "no-store".to_string()),
        (
            outbound_credential.header_name.to_string(),
            outbound_credential.value,
        ),
    ];
    if let Some(org_id) = state
        .config
        .openai_org_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        outbound_headers.push(("openai-organization".to_string(), org_id.to_string()));
    }

    let is_models_list = path == LIST_MODELS_PATH && method == Method::GET;
    let deadline = tokio::time::Instant::now() + REQUEST_DEADLINE;
    let request = UpstreamRequest {
        method,
        url: url.clone(),
        headers: outbound_headers,
        body: (!body.is_empty()).then_some(body),
        want_stream: !is_models_list,
    };

    let response = match state.client.send(request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(
                event = "upstream_transport_error",
                trace_id = %trace_id,
                url = %url,
                kind = ?err.kind,
                message = %err.message,
            );
            return with_trace_id(
                GatewayError::Transport {
                    kind: err.kind,
                    message: err.message,
                }
                .into_response(),
                &trace_id,
            );
        }
    };

    info!(
        event = "upstream_connected",
        trace_id = %trace_id,
        url = %url,
        status = response.status,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
    );

    let resp = if (300..400).contains(&response.status) {
        // Redirects are the caller's business; surface them unmodified.
        passthrough_response(response)
    } else if is_models_list && response.status == 200 {
        models_listing_response(&state, response, deadline)
    } else {
        relay_response(response, deadline)
    };

    info!(
        event = "downstream_responded",
        trace_id = %trace_id,
        status = resp.status().as_u16(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
    );
    with_trace_id(resp, &trace_id)
}

fn preflight_response() -> Response {
    let mut resp = Response::new(Body::from(r#"{"body":"OK"}"#));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

/// Buffers, filters and re-emits the upstream model catalog as one data
/// frame through the relay, so the timer infrastructure still runs.
fn models_listing_response(
    state: &GatewayState,
    response: UpstreamResponse,
    deadline: tokio::time::Instant,
) -> Response {
    let UpstreamBody::Bytes(raw) = response.body else {
        // A buffered body was requested; a stream here is an upstream
        // client bug, not a relay concern.
        return GatewayError::UpstreamProtocol("unexpected streaming catalog".to_string())
            .into_response();
    };

    let payload = match serde_json::from_slice::<ListModelsResponse>(&raw) {
        Ok(listing) => {
            let disabled: &[&str] = if state.config.disable_gpt4 {
                &["gpt-4"]
            } else {
                &[]
            };
            let filtered = filter_model_listing(listing, disabled);
            match serde_json::to_vec(&filtered) {
                Ok(bytes) => Bytes::from(bytes),
                Err(err) => Bytes::from(error_body(&format!(
                    "malformed upstream response: {err}"
                ))),
            }
        }
        Err(err) => Bytes::from(error_body(&format!("malformed upstream response: {err}"))),
    };

    let frames = spawn_relay(buffered_source(payload), deadline);
    let mut resp = Response::new(Body::from_stream(frame_byte_stream(frames)));
    *resp.status_mut() = StatusCode::OK;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

fn relay_response(response: UpstreamResponse, deadline: tokio::time::Instant) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match response.body {
        UpstreamBody::Bytes(bytes) => {
            // Non-2xx upstream replies arrive buffered; pass them through.
            let mut resp = Response::new(Body::from(bytes));
            *resp.status_mut() = status;
            copy_upstream_headers(&response.headers, resp.headers_mut());
            resp
        }
        UpstreamBody::Stream(rx) => {
            let frames = spawn_relay(rx, deadline);
            let mut resp = Response::new(Body::from_stream(frame_byte_stream(frames)));
            *resp.status_mut() = status;
            copy_upstream_headers(&response.headers, resp.headers_mut());
            let headers = resp.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/event-stream"),
            );
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            // Hint common reverse proxies to avoid buffering SSE responses.
            headers.insert(
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            );
            resp
        }
    }
}

fn passthrough_response(response: UpstreamResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match response.body {
        UpstreamBody::Bytes(bytes) => Body::from(bytes),
        UpstreamBody::Stream(rx) => Body::from_stream(frame_byte_stream(spawn_relay(
            rx,
            tokio::time::Instant::now() + REQUEST_DEADLINE,
        ))),
    };
    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    copy_upstream_headers(&response.headers, resp.headers_mut());
    resp
}

fn copy_upstream_headers(upstream: &Headers, out: &mut HeaderMap) {
    for (name, value) in upstream {
        // Hop-by-hop and framing headers are hyper's business.
        if is_hop_by_hop_or_framing_header(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            out.append(name, value);
        }
    }
}

fn is_hop_by_hop_or_framing_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("transfer-encoding")
        || name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("keep-alive")
        || name.eq_ignore_ascii_case("proxy-authenticate")
        || name.eq_ignore_ascii_case("proxy-authorization")
        || name.eq_ignore_ascii_case("te")
        || name.eq_ignore_ascii_case("trailer")
        || name.eq_ignore_ascii_case("upgrade")
}

fn with_trace_id(mut resp: Response, trace_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(trace_id) {
        resp.headers_mut()
            .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
    }
    resp
}
