//! Email-discovery provider adapters.
//!
//! Every adapter implements [`EmailProvider`] and reports through the uniform
//! [`ProviderOutcome`]; adapters never return errors, failures are encoded in the
//! outcome so the cascade can record them and move on.

pub mod anymailfinder;
pub mod apollo;
pub mod hunter;
pub mod scraper;

use crate::circuit_breaker::{create_provider_circuit_breaker, GuardedProvider};
use crate::config::Config;
use crate::errors::AppError;
use crate::models::ProviderOutcome;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use anymailfinder::AnyMailFinderProvider;
pub use apollo::ApolloProvider;
pub use hunter::HunterProvider;
pub use scraper::WebScraperProvider;

/// Capability "find emails for a domain".
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Tag used as the enrichment `source` and in diagnostics.
    fn name(&self) -> &str;

    /// Looks up emails for an already-normalized domain.
    async fn find_emails(&self, domain: &str) -> ProviderOutcome;
}

/// Providers that can be named in `ENRICHMENT_PROVIDERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Hunter,
    Scraper,
    AnyMailFinder,
    Apollo,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Hunter => "hunter",
            ProviderKind::Scraper => "scraper",
            ProviderKind::AnyMailFinder => "anymailfinder",
            ProviderKind::Apollo => "apollo",
        }
    }

    /// Paid APIs get a circuit breaker; the scraper fails per site, not per service.
    pub fn is_paid_api(&self) -> bool {
        !matches!(self, ProviderKind::Scraper)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hunter" | "hunter.io" => Ok(ProviderKind::Hunter),
            "scraper" | "web" => Ok(ProviderKind::Scraper),
            "anymailfinder" => Ok(ProviderKind::AnyMailFinder),
            "apollo" => Ok(ProviderKind::Apollo),
            other => anyhow::bail!(
                "Unknown enrichment provider '{}' (expected hunter, scraper, anymailfinder or apollo)",
                other
            ),
        }
    }
}

/// Builds a `reqwest` client with the per-call timeout every adapter relies on.
pub(crate) fn http_client(timeout: Duration, user_agent: Option<&str>) -> Result<reqwest::Client, AppError> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }
    builder
        .build()
        .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {}", e)))
}

/// Instantiates the configured providers in priority order.
pub fn build_providers(config: &Config) -> Result<Vec<Arc<dyn EmailProvider>>, AppError> {
    let api_timeout = Duration::from_secs(config.http_timeout_secs);
    let scraper_timeout = Duration::from_secs(config.scraper_timeout_secs);

    let mut providers: Vec<Arc<dyn EmailProvider>> = Vec::new();
    for kind in &config.enrichment_providers {
        let provider: Arc<dyn EmailProvider> = match kind {
            ProviderKind::Hunter => Arc::new(HunterProvider::new(
                config.hunter_base_url.clone(),
                config.hunter_api_key.clone(),
                api_timeout,
            )?),
            ProviderKind::Scraper => Arc::new(WebScraperProvider::new(
                scraper_timeout,
                &config.scraper_user_agent,
            )?),
            ProviderKind::AnyMailFinder => Arc::new(AnyMailFinderProvider::new(
                config.anymailfinder_base_url.clone(),
                config.anymailfinder_api_key.clone(),
                api_timeout,
            )?),
            ProviderKind::Apollo => Arc::new(ApolloProvider::new(
                config.apollo_base_url.clone(),
                config.apollo_api_key.clone(),
                api_timeout,
            )?),
        };

        let provider = if kind.is_paid_api() {
            Arc::new(GuardedProvider::new(provider, create_provider_circuit_breaker()))
                as Arc<dyn EmailProvider>
        } else {
            provider
        };

        tracing::info!("✓ Enrichment provider #{}: {}", providers.len() + 1, kind);
        providers.push(provider);
    }

    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_roundtrip_names() {
        for kind in [
            ProviderKind::Hunter,
            ProviderKind::Scraper,
            ProviderKind::AnyMailFinder,
            ProviderKind::Apollo,
        ] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!(" Hunter.io ".parse::<ProviderKind>().unwrap(), ProviderKind::Hunter);
    }

    #[test]
    fn test_only_scraper_is_unguarded() {
        assert!(ProviderKind::Hunter.is_paid_api());
        assert!(ProviderKind::Apollo.is_paid_api());
        assert!(!ProviderKind::Scraper.is_paid_api());
    }
}
