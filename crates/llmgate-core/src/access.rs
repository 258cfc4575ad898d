use http::{header, HeaderMap};
use llmgate_common::GatewayConfig;

use crate::error::GatewayError;

/// Upstream-agnostic credential pre-check.
///
/// Returns the effective inbound credential to translate and forward. When
/// the operator configured access codes, a bearer token matching one is
/// swapped for the server-held upstream key; any other non-empty token is
/// treated as the client's own key and passed through. Without configured
/// codes the gateway forwards whatever it got, absent credentials included.
pub fn check_access(
    headers: &HeaderMap,
    config: &GatewayConfig,
) -> Result<Option<String>, GatewayError> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if !config.requires_access_code() {
        return Ok(raw.map(str::to_string));
    }

    let token = raw
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(GatewayError::Unauthorized)?;

    if config.access_codes.iter().any(|code| code == token) {
        let server_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(GatewayError::Unauthorized)?;
        return Ok(Some(format!("Bearer {server_key}")));
    }

    // Not a known code: assume the client brought its own upstream key.
    Ok(raw.map(str::to_string))
}
