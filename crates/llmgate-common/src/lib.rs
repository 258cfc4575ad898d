use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged gateway configuration used by the running process.
///
/// Merge order: CLI > ENV > built-in defaults. Built once at startup and
/// shared read-only with every request handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Explicit upstream base URL; falls back to the provider default.
    pub base_url: Option<String>,
    /// Azure endpoint URL; takes precedence over `base_url` when set.
    pub azure_url: Option<String>,
    /// Enables the Azure credential/path convention. Implied by `azure_url`.
    pub azure: bool,
    /// Required in Azure mode; never defaulted.
    pub azure_api_version: Option<String>,
    /// Forwarded as `OpenAI-Organization` when present.
    pub openai_org_id: Option<String>,
    /// Operator override list: `+model` / `-model` / `model`, comma-separated.
    pub custom_models: Option<String>,
    /// Drops `gpt-4*` entries from the model listing and marks them denied.
    pub disable_gpt4: bool,
    /// Gateway access codes accepted in place of a client API key.
    pub access_codes: Vec<String>,
    /// Server-held upstream key, substituted for a matched access code.
    pub api_key: Option<String>,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
}

impl GatewayConfig {
    pub fn azure_mode(&self) -> bool {
        self.azure || self.azure_url.is_some()
    }

    /// Access control is only enforced when the operator configured codes.
    pub fn requires_access_code(&self) -> bool {
        !self.access_codes.is_empty()
    }
}
