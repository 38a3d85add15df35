/// Email enrichment cascade shared by the HTTP handlers and the batch binary.
///
/// The workflow for one lead:
/// 1. Reject a missing website
/// 2. Normalize the website to a bare domain
/// 3. Ask each configured provider in priority order, stopping at the first one
///    that returns usable emails
/// 4. Overwrite the lead's additional emails with the winner's results
///
/// Provider failures never abort the run: each becomes a diagnostic entry.
use crate::config::Config;
use crate::db_storage::LeadRepository;
use crate::domain::normalize_domain;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    EmailMetadata, EnrichResult, EnrichmentOutcome, ProviderDiagnostic, ProviderOutcome,
};
use crate::providers::{build_providers, EmailProvider};
use moka::future::Cache;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

pub struct EnrichmentCascade {
    providers: Vec<Arc<dyn EmailProvider>>,
    repository: Arc<dyn LeadRepository>,
    /// Usable outcomes keyed by `"{provider}:{domain}"`.
    outcome_cache: Option<Cache<String, ProviderOutcome>>,
}

impl EnrichmentCascade {
    /// Cascade over `providers` in the given order, without outcome caching.
    pub fn new(providers: Vec<Arc<dyn EmailProvider>>, repository: Arc<dyn LeadRepository>) -> Self {
        Self {
            providers,
            repository,
            outcome_cache: None,
        }
    }

    /// Caches usable provider outcomes per domain; a zero TTL disables the cache.
    pub fn with_outcome_cache(mut self, ttl: Duration) -> Self {
        self.outcome_cache = if ttl.is_zero() {
            None
        } else {
            Some(
                Cache::builder()
                    .time_to_live(ttl)
                    .max_capacity(10_000)
                    .build(),
            )
        };
        self
    }

    pub fn from_config(
        config: &Config,
        repository: Arc<dyn LeadRepository>,
    ) -> Result<Self, AppError> {
        let providers = build_providers(config)?;
        Ok(Self::new(providers, repository)
            .with_outcome_cache(Duration::from_secs(config.enrichment_cache_ttl_secs)))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Runs the cascade for one lead.
    ///
    /// Only a missing website, an invalid domain or a failed save are errors; finding
    /// nothing is a successful outcome with an empty email list.
    pub async fn enrich(&self, lead_id: Uuid, website: &str) -> Result<EnrichmentOutcome, AppError> {
        if website.trim().is_empty() {
            return Err(AppError::MissingWebsite);
        }

        let domain = normalize_domain(website)?;
        tracing::info!("🔍 Enriching lead {} for domain: {}", lead_id, domain);

        let mut diagnostics = Vec::new();
        let mut tried = HashSet::new();
        let mut winner: Option<(String, ProviderOutcome)> = None;

        for provider in &self.providers {
            let name = provider.name().to_string();
            if !tried.insert(name.clone()) {
                tracing::debug!("Provider {} already queried for {}, skipping", name, domain);
                continue;
            }

            let outcome = self.query_provider(provider.as_ref(), &domain).await;
            if outcome.is_usable() {
                tracing::info!(
                    "✓ {} found {} emails for {}",
                    name,
                    outcome.emails.len(),
                    domain
                );
                winner = Some((name, outcome));
                break;
            }

            let reason = outcome.error.unwrap_or_else(|| "no emails found".to_string());
            tracing::info!("⚠ {} yielded nothing for {}: {}", name, domain, reason);
            diagnostics.push(ProviderDiagnostic {
                provider: name,
                reason,
            });
        }

        let Some((source, outcome)) = winner else {
            tracing::info!(
                "No emails found for lead {} ({}) after {} providers",
                lead_id,
                domain,
                diagnostics.len()
            );
            return Ok(EnrichmentOutcome {
                lead_id,
                domain,
                emails: Vec::new(),
                source: None,
                rich_data: Vec::new(),
                diagnostics,
            });
        };

        let rich_data = outcome.rich_data.unwrap_or_else(|| {
            outcome
                .emails
                .iter()
                .map(|e| EmailMetadata::classified(e))
                .collect()
        });

        self.repository
            .save_emails(lead_id, &outcome.emails)
            .await
            .with_context(|| format!("Saving emails for lead {}", lead_id))?;

        Ok(EnrichmentOutcome {
            lead_id,
            domain,
            emails: outcome.emails,
            source: Some(source),
            rich_data,
            diagnostics,
        })
    }

    /// [`enrich`](Self::enrich) flattened into the wire result.
    pub async fn enrich_lead(&self, lead_id: Uuid, website: &str) -> EnrichResult {
        match self.enrich(lead_id, website).await {
            Ok(outcome) => outcome.into(),
            Err(e) => {
                tracing::warn!("Enrichment of lead {} failed: {}", lead_id, e);
                e.into()
            }
        }
    }

    /// Enriches many leads, at most `concurrency` at a time. Results keep input order.
    pub async fn enrich_batch(
        self: &Arc<Self>,
        targets: Vec<(Uuid, String)>,
        concurrency: usize,
    ) -> Vec<(Uuid, EnrichResult)> {
        let targets = targets
            .into_iter()
            .map(|(lead_id, website)| (lead_id, website, ()))
            .collect();
        self.enrich_batch_holding(targets, concurrency).await
    }

    /// Like [`enrich_batch`](Self::enrich_batch), with a value carried by each
    /// lead's task and dropped as soon as that lead's run ends.
    pub async fn enrich_batch_holding<T: Send + 'static>(
        self: &Arc<Self>,
        targets: Vec<(Uuid, String, T)>,
        concurrency: usize,
    ) -> Vec<(Uuid, EnrichResult)> {
        let concurrency = concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        tracing::info!(
            "Starting batch enrichment of {} leads (concurrency {})",
            targets.len(),
            concurrency
        );

        let handles: Vec<_> = targets
            .into_iter()
            .map(|(lead_id, website, held)| {
                let cascade = Arc::clone(self);
                let semaphore = Arc::clone(&semaphore);
                let handle = tokio::spawn(async move {
                    let _held = held;
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return EnrichResult::from(AppError::InternalError(
                            "batch enrichment cancelled".to_string(),
                        ));
                    };
                    cascade.enrich_lead(lead_id, &website).await
                });
                (lead_id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (lead_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("Enrichment task for lead {} panicked: {}", lead_id, e);
                    EnrichResult::from(AppError::InternalError(e.to_string()))
                }
            };
            results.push((lead_id, result));
        }

        results
    }

    async fn query_provider(&self, provider: &dyn EmailProvider, domain: &str) -> ProviderOutcome {
        let Some(cache) = &self.outcome_cache else {
            return provider.find_emails(domain).await;
        };

        let key = format!("{}:{}", provider.name(), domain);
        if let Some(cached) = cache.get(&key).await {
            tracing::debug!("Using cached {} outcome for {}", provider.name(), domain);
            return cached;
        }

        let outcome = provider.find_emails(domain).await;
        if outcome.is_usable() {
            cache.insert(key, outcome.clone()).await;
        }
        outcome
    }
}
