use llmgate_common::GatewayConfig;

use crate::error::GatewayError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Builds the fully qualified outbound URL for a request.
///
/// `path` is the inbound path suffix with the gateway routing prefix already
/// removed, plus any original query string.
pub fn build_upstream_url(path: &str, config: &GatewayConfig) -> Result<String, GatewayError> {
    let base = config
        .azure_url
        .as_deref()
        .or(config.base_url.as_deref())
        .unwrap_or(DEFAULT_BASE_URL);
    let base = normalize_base_url(base);

    let path = if config.azure_mode() {
        let api_version = config
            .azure_api_version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty())
            .ok_or(GatewayError::MissingAzureApiVersion)?;
        make_azure_path(path, api_version)
    } else {
        path.to_string()
    };

    Ok(format!("{base}/{path}"))
}

fn normalize_base_url(base: &str) -> String {
    let mut base = base.trim().to_string();
    if !base.starts_with("http") {
        base = format!("https://{base}");
    }
    if base.ends_with('/') {
        base.pop();
    }
    base
}

/// Azure addressing: `{first segment}` becomes the deployment segment and
/// the configured api version is appended as a query parameter.
fn make_azure_path(path: &str, api_version: &str) -> String {
    let path = path.strip_prefix("v1/").unwrap_or(path);
    let (path, query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };
    let deployment = path.split('/').next().unwrap_or_default();
    let rest = path.strip_prefix(deployment).unwrap_or_default();
    let mut out = format!("openai/deployments/{deployment}{rest}?api-version={api_version}");
    if let Some(query) = query {
        out.push('&');
        out.push_str(query);
    }
    out
}
