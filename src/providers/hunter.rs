use super::{http_client, EmailProvider};
use crate::errors::AppError;
use crate::models::{EmailKind, EmailMetadata, ProviderOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Hunter.io domain search, restricted to personally attributed addresses.
pub struct HunterProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DomainSearchResponse {
    data: Option<DomainSearchData>,
}

#[derive(Debug, Deserialize)]
struct DomainSearchData {
    #[serde(default)]
    emails: Vec<HunterEmail>,
}

#[derive(Debug, Deserialize)]
struct HunterEmail {
    value: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    confidence: Option<u8>,
    first_name: Option<String>,
    last_name: Option<String>,
    position: Option<String>,
    linkedin: Option<String>,
    seniority: Option<String>,
    department: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HunterErrorBody {
    #[serde(default)]
    errors: Vec<HunterErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct HunterErrorDetail {
    details: Option<String>,
}

impl HunterEmail {
    fn into_metadata(self) -> EmailMetadata {
        let kind = match self.kind.as_deref() {
            Some("personal") => EmailKind::Personal,
            Some("generic") => EmailKind::Generic,
            _ => EmailKind::classify(&self.value),
        };
        EmailMetadata {
            email: self.value.trim().to_lowercase(),
            kind,
            first_name: self.first_name,
            last_name: self.last_name,
            position: self.position,
            seniority: self.seniority,
            department: self.department,
            linkedin: self.linkedin,
            confidence: self.confidence,
        }
    }
}

impl HunterProvider {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client(timeout, None)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn domain_search(&self, api_key: &str, domain: &str) -> Result<Vec<EmailMetadata>, String> {
        // Build URL with proper parameter encoding
        let url = reqwest::Url::parse_with_params(
            &format!("{}/domain-search", self.base_url),
            &[
                ("domain", domain),
                ("api_key", api_key),
                ("type", "personal"),
                ("limit", "10"),
            ],
        )
        .map_err(|e| format!("Failed to build URL: {}", e))?;

        tracing::debug!(
            "Hunter URL: {}/domain-search?domain={}&api_key=[REDACTED]&type=personal",
            self.base_url,
            domain
        );

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| format!("Hunter request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let details = response
                .json::<HunterErrorBody>()
                .await
                .ok()
                .and_then(|body| body.errors.into_iter().find_map(|e| e.details))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
            return Err(format!(
                "Hunter API error: {} - {}",
                status.as_u16(),
                details
            ));
        }

        let body: DomainSearchResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse Hunter response: {}", e))?;

        Ok(body
            .data
            .map(|d| d.emails)
            .unwrap_or_default()
            .into_iter()
            .map(HunterEmail::into_metadata)
            .collect())
    }
}

#[async_trait]
impl EmailProvider for HunterProvider {
    fn name(&self) -> &str {
        "hunter"
    }

    async fn find_emails(&self, domain: &str) -> ProviderOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return ProviderOutcome::failed("missing HUNTER_API_KEY");
        };

        tracing::info!("Checking Hunter.io (personal only) for domain: {}", domain);

        let found = match self.domain_search(api_key, domain).await {
            Ok(found) => found,
            Err(reason) => {
                tracing::warn!("⚠ Hunter lookup failed for {}: {}", domain, reason);
                return ProviderOutcome::failed(reason);
            }
        };

        let total = found.len();
        let personal: Vec<EmailMetadata> = found
            .into_iter()
            .filter(|e| e.kind == EmailKind::Personal)
            .collect();

        if personal.is_empty() {
            if total > 0 {
                tracing::info!(
                    "⚠ Hunter found {} emails for {}, all generic. Ignoring.",
                    total,
                    domain
                );
                return ProviderOutcome::empty(format!(
                    "only generic emails found ({}), discarded by quality policy",
                    total
                ));
            }
            tracing::info!("⚠ Hunter found 0 emails for {}", domain);
            return ProviderOutcome::empty("no emails in Hunter");
        }

        tracing::info!(
            "✓ Hunter found {} personal emails for {}",
            personal.len(),
            domain
        );
        let emails = personal.iter().map(|e| e.email.clone()).collect();
        ProviderOutcome::found(emails, Some(personal))
    }
}
