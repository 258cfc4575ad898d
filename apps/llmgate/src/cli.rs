use clap::Parser;
use llmgate_common::{ConfigError, GatewayConfig};

#[derive(Parser)]
#[command(name = "llmgate")]
pub(crate) struct Cli {
    #[arg(long, default_value = "127.0.0.1")]
    pub(crate) host: String,
    #[arg(long, default_value_t = 3000)]
    pub(crate) port: u16,
    /// Upstream base URL; the provider default is used when unset.
    #[arg(long, env = "BASE_URL")]
    pub(crate) base_url: Option<String>,
    /// Azure endpoint URL; enables Azure mode and wins over --base-url.
    #[arg(long, env = "AZURE_URL")]
    pub(crate) azure_url: Option<String>,
    #[arg(long, env = "AZURE_API_VERSION")]
    pub(crate) azure_api_version: Option<String>,
    #[arg(long, env = "OPENAI_ORG_ID")]
    pub(crate) openai_org_id: Option<String>,
    /// Comma-separated model overrides: `+model`, `-model` or `model`.
    #[arg(long, env = "CUSTOM_MODELS")]
    pub(crate) custom_models: Option<String>,
    #[arg(long, env = "DISABLE_GPT4", default_value_t = false)]
    pub(crate) disable_gpt4: bool,
    /// Comma-separated gateway access codes.
    #[arg(long, env = "ACCESS_CODES")]
    pub(crate) access_codes: Option<String>,
    /// Server-held upstream key, substituted for a matched access code.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub(crate) api_key: Option<String>,
    /// Outbound proxy for upstream egress.
    #[arg(long, env = "PROXY")]
    pub(crate) proxy: Option<String>,
}

impl Cli {
    pub(crate) fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        // Azure mode cannot run without an api version; refuse to start
        // rather than fail every request later.
        if self.azure_url.is_some() && self.azure_api_version.is_none() {
            return Err(ConfigError::MissingField("azure_api_version"));
        }
        Ok(GatewayConfig {
            host: self.host,
            port: self.port,
            base_url: self.base_url,
            azure: self.azure_url.is_some(),
            azure_url: self.azure_url,
            azure_api_version: self.azure_api_version,
            openai_org_id: self.openai_org_id,
            custom_models: self.custom_models,
            disable_gpt4: self.disable_gpt4,
            access_codes: self
                .access_codes
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect(),
            api_key: self.api_key,
            proxy: self.proxy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn azure_url_without_api_version_is_rejected_at_startup() {
        let cli = Cli::parse_from(["llmgate", "--azure-url", "https://res.openai.azure.com"]);
        assert!(matches!(
            cli.into_config(),
            Err(ConfigError::MissingField("azure_api_version"))
        ));
    }

    #[test]
    fn azure_url_with_api_version_builds_an_azure_config() {
        let cli = Cli::parse_from([
            "llmgate",
            "--azure-url",
            "https://res.openai.azure.com",
            "--azure-api-version",
            "2023-05-15",
        ]);
        let config = cli.into_config().expect("config should build");
        assert!(config.azure_mode());
        assert_eq!(config.azure_api_version.as_deref(), Some("2023-05-15"));
    }

    #[test]
    fn access_codes_are_split_and_trimmed() {
        let cli = Cli::parse_from(["llmgate", "--access-codes", " alpha, ,beta "]);
        let config = cli.into_config().expect("config should build");
        assert_eq!(config.access_codes, vec!["alpha", "beta"]);
    }
}
