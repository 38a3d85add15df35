use crate::providers::ProviderKind;
use std::str::FromStr;

pub const DEFAULT_HUNTER_BASE_URL: &str = "https://api.hunter.io/v2";
pub const DEFAULT_ANYMAILFINDER_BASE_URL: &str = "https://api.anymailfinder.com/v5.1";
pub const DEFAULT_APOLLO_BASE_URL: &str = "https://api.apollo.io";
pub const DEFAULT_SCRAPER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_PROVIDER_ORDER: &str = "hunter,scraper,anymailfinder";
pub const DEFAULT_WHATSAPP_TEMPLATE: &str = "Hola {{Nombre Negocio}}, vi {{Nombre Negocio}} en Google Maps y quería preguntarle si le interesa recibir nuevos clientes en {{Ciudad}} mes a mes.";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub hunter_api_key: Option<String>,
    pub hunter_base_url: String,
    pub anymailfinder_api_key: Option<String>,
    pub anymailfinder_base_url: String,
    pub apollo_api_key: Option<String>,
    pub apollo_base_url: String,
    /// Provider priority for the enrichment cascade, first entry tried first.
    pub enrichment_providers: Vec<ProviderKind>,
    pub http_timeout_secs: u64,
    pub scraper_timeout_secs: u64,
    pub scraper_user_agent: String,
    /// 0 disables the provider outcome cache.
    pub enrichment_cache_ttl_secs: u64,
    pub batch_concurrency: usize,
    /// Default outreach message; requests may pass their own.
    pub whatsapp_template: String,
    pub default_phone_region: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            hunter_api_key: optional_var("HUNTER_API_KEY"),
            hunter_base_url: url_var("HUNTER_BASE_URL", DEFAULT_HUNTER_BASE_URL)?,
            anymailfinder_api_key: optional_var("ANYMAILFINDER_API_KEY"),
            anymailfinder_base_url: url_var(
                "ANYMAILFINDER_BASE_URL",
                DEFAULT_ANYMAILFINDER_BASE_URL,
            )?,
            apollo_api_key: optional_var("APOLLO_API_KEY"),
            apollo_base_url: url_var("APOLLO_BASE_URL", DEFAULT_APOLLO_BASE_URL)?,
            enrichment_providers: parse_provider_order(
                &std::env::var("ENRICHMENT_PROVIDERS")
                    .unwrap_or_else(|_| DEFAULT_PROVIDER_ORDER.to_string()),
            )?,
            http_timeout_secs: number_var("HTTP_TIMEOUT_SECS", 10)?,
            scraper_timeout_secs: number_var("SCRAPER_TIMEOUT_SECS", 8)?,
            scraper_user_agent: optional_var("SCRAPER_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_SCRAPER_USER_AGENT.to_string()),
            enrichment_cache_ttl_secs: number_var("ENRICHMENT_CACHE_TTL_SECS", 600)?,
            batch_concurrency: number_var("ENRICH_BATCH_CONCURRENCY", 5)
                .and_then(|n: usize| {
                    if n == 0 {
                        anyhow::bail!("ENRICH_BATCH_CONCURRENCY must be at least 1");
                    }
                    Ok(n)
                })?,
            whatsapp_template: optional_var("WHATSAPP_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_WHATSAPP_TEMPLATE.to_string()),
            default_phone_region: optional_var("DEFAULT_PHONE_REGION")
                .unwrap_or_else(|| "MX".to_string()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            url_preview(&config.database_url)
        );
        tracing::debug!("Enrichment providers: {:?}", config.enrichment_providers);
        tracing::debug!(
            "API keys present - hunter: {}, anymailfinder: {}, apollo: {}",
            config.hunter_api_key.is_some(),
            config.anymailfinder_api_key.is_some(),
            config.apollo_api_key.is_some()
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Parses a comma separated provider list, e.g. `"hunter, scraper"`.
pub fn parse_provider_order(raw: &str) -> anyhow::Result<Vec<ProviderKind>> {
    let providers = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ProviderKind::from_str)
        .collect::<anyhow::Result<Vec<_>>>()?;

    if providers.is_empty() {
        anyhow::bail!("ENRICHMENT_PROVIDERS must name at least one provider");
    }

    Ok(providers)
}

/// First 20 characters of a URL, for logs.
fn url_preview(url: &str) -> String {
    url.chars().take(20).collect()
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let url = optional_var(name).unwrap_or_else(|| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn number_var<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid non-negative number", name)),
        None => Ok(default),
    }
}
