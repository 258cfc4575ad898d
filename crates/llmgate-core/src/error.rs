use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::{header, HeaderValue, StatusCode};

use crate::upstream_client::TransportErrorKind;

/// Request-fatal failures surfaced at the handler boundary.
///
/// Everything here becomes a `{"error":true,"message":...}` JSON response;
/// nothing propagates past the handler as a panic or a bare socket close.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing AZURE_API_VERSION in server config")]
    MissingAzureApiVersion,
    #[error("empty access code or api key")]
    Unauthorized,
    #[error("you are not allowed to request {0}")]
    ForbiddenPath(String),
    #[error("{0} is not permitted")]
    ForbiddenModel(String),
    #[error("upstream transport failure ({kind:?}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    #[error("malformed upstream response: {0}")]
    UpstreamProtocol(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingAzureApiVersion => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ForbiddenPath(_) | Self::ForbiddenModel(_) => StatusCode::FORBIDDEN,
            Self::Transport { .. } => StatusCode::BAD_GATEWAY,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::UpstreamProtocol(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

pub fn error_body(message: &str) -> String {
    serde_json::json!({ "error": true, "message": message }).to_string()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut resp = Response::new(Body::from(error_body(&self.to_string())));
        *resp.status_mut() = self.status();
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_model_maps_to_403_json() {
        let err = GatewayError::ForbiddenModel("gpt-4".to_string());
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value =
            serde_json::from_str(&error_body(&err.to_string())).expect("body should be json");
        assert_eq!(body["error"], serde_json::json!(true));
        assert_eq!(body["message"], serde_json::json!("gpt-4 is not permitted"));
    }

    #[test]
    fn missing_azure_version_is_a_server_side_error() {
        assert_eq!(
            GatewayError::MissingAzureApiVersion.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn deadline_exceeded_maps_to_gateway_timeout() {
        let err = GatewayError::DeadlineExceeded;
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.to_string(), "request deadline exceeded");
    }
}
