use serde::Deserialize;

pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
pub const DEFAULT_GOOGLE_ADS_API_BASE_URL: &str = "https://googleads.googleapis.com";
pub const DEFAULT_GOOGLE_ADS_API_VERSION: &str = "v17";
pub const DEFAULT_GOOGLE_OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub gcp_project_id: String,
    pub firestore_database: String,
    pub firestore_base_url: String,
    /// Static bearer token for Firestore. When unset the token is fetched
    /// from the metadata server on every read.
    pub firestore_access_token: Option<String>,
    pub metadata_token_url: String,
    pub google_ads_api_base_url: String,
    pub google_ads_api_version: String,
    pub google_oauth_token_url: String,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let emulator_host = std::env::var("FIRESTORE_EMULATOR_HOST")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let firestore_base_url = match &emulator_host {
            Some(host) => format!("http://{}", host),
            None => url_var("FIRESTORE_BASE_URL", DEFAULT_FIRESTORE_BASE_URL)?,
        };

        // The emulator accepts the fixed "owner" token and has no metadata server.
        let firestore_access_token = std::env::var("FIRESTORE_ACCESS_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| emulator_host.as_ref().map(|_| "owner".to_string()));

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            gcp_project_id: std::env::var("GCP_PROJECT_ID")
                .or_else(|_| std::env::var("GOOGLE_CLOUD_PROJECT"))
                .map_err(|_| {
                    anyhow::anyhow!(
                        "GCP_PROJECT_ID or GOOGLE_CLOUD_PROJECT environment variable required"
                    )
                })
                .and_then(|project| {
                    if project.trim().is_empty() {
                        anyhow::bail!("GCP_PROJECT_ID cannot be empty");
                    }
                    Ok(project)
                })?,
            firestore_database: std::env::var("FIRESTORE_DATABASE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "(default)".to_string()),
            firestore_base_url,
            firestore_access_token,
            metadata_token_url: url_var("METADATA_TOKEN_URL", DEFAULT_METADATA_TOKEN_URL)?,
            google_ads_api_base_url: url_var(
                "GOOGLE_ADS_API_BASE_URL",
                DEFAULT_GOOGLE_ADS_API_BASE_URL,
            )?,
            google_ads_api_version: std::env::var("GOOGLE_ADS_API_VERSION")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GOOGLE_ADS_API_VERSION.to_string()),
            google_oauth_token_url: url_var(
                "GOOGLE_OAUTH_TOKEN_URL",
                DEFAULT_GOOGLE_OAUTH_TOKEN_URL,
            )?,
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a positive integer"))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::debug!("GCP project: {}", config.gcp_project_id);
        tracing::debug!(
            "Firestore: {} (database {})",
            config.firestore_base_url,
            config.firestore_database
        );
        if config.firestore_access_token.is_some() {
            tracing::info!("Firestore static access token configured");
        }
        tracing::debug!(
            "Google Ads API: {}/{}",
            config.google_ads_api_base_url,
            config.google_ads_api_version
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Reads an optional URL variable, falling back to `default`.
fn url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    validate_url(name, &value)?;
    Ok(value.trim_end_matches('/').to_string())
}

fn validate_url(name: &str, value: &str) -> anyhow::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(())
}
