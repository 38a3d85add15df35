use super::{http_client, EmailProvider};
use crate::errors::AppError;
use crate::models::{EmailMetadata, ProviderOutcome};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// AnyMailFinder company search.
pub struct AnyMailFinderProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompanySearchResponse {
    #[serde(default)]
    emails: Vec<String>,
    #[serde(default)]
    valid_emails: Vec<String>,
}

impl AnyMailFinderProvider {
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
}

#[async_trait]
impl EmailProvider for AnyMailFinderProvider {
    fn name(&self) -> &str {
        "anymailfinder"
    }

    async fn find_emails(&self, domain: &str) -> ProviderOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return ProviderOutcome::failed("missing ANYMAILFINDER_API_KEY");
        };

        tracing::info!("Checking AnyMailFinder for domain: {}", domain);

        let response = match self
            .client
            .post(format!("{}/find-email/company", self.base_url))
            .header("Authorization", api_key)
            .json(&json!({ "domain": domain }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("⚠ AnyMailFinder request failed for {}: {}", domain, e);
                return ProviderOutcome::failed(format!("AnyMailFinder request failed: {}", e));
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // Valid request, the company simply has no known addresses.
            return ProviderOutcome::empty("no emails in AnyMailFinder");
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("AnyMailFinder returned error {}: {}", status, error_text);
            return ProviderOutcome::failed(format!(
                "AnyMailFinder API error {}: {}",
                status.as_u16(),
                error_text
            ));
        }

        let body: CompanySearchResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return ProviderOutcome::failed(format!(
                    "Failed to parse AnyMailFinder response: {}",
                    e
                ))
            }
        };

        let mut emails: Vec<String> = Vec::new();
        for email in body.valid_emails.into_iter().chain(body.emails) {
            let email = email.trim().to_lowercase();
            if !email.is_empty() && !emails.contains(&email) {
                emails.push(email);
            }
        }

        if emails.is_empty() {
            return ProviderOutcome::empty("no emails in AnyMailFinder");
        }

        tracing::info!("✓ AnyMailFinder found {} emails for {}", emails.len(), domain);
        let rich = emails.iter().map(|e| EmailMetadata::classified(e)).collect();
        ProviderOutcome::found(emails, Some(rich))
    }
}
