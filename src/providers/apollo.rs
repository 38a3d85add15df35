use super::{http_client, EmailProvider};
use crate::errors::AppError;
use crate::models::{EmailKind, EmailMetadata, ProviderOutcome};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Titles searched for, most senior first.
const DECISION_MAKER_TITLES: &[&str] = &[
    "CEO", "Founder", "Owner", "Director", "President", "Gerente",
];

/// Apollo people search for decision makers at a company domain.
pub struct ApolloProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PeopleSearchResponse {
    #[serde(default)]
    people: Vec<ApolloPerson>,
}

#[derive(Debug, Deserialize)]
struct ApolloPerson {
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    title: Option<String>,
    seniority: Option<String>,
    linkedin_url: Option<String>,
}

impl ApolloProvider {
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
impl EmailProvider for ApolloProvider {
    fn name(&self) -> &str {
        "apollo"
    }

    async fn find_emails(&self, domain: &str) -> ProviderOutcome {
        let Some(api_key) = self.api_key.as_deref() else {
            return ProviderOutcome::failed("missing APOLLO_API_KEY");
        };

        tracing::info!("Checking Apollo decision makers for domain: {}", domain);

        let response = match self
            .client
            .post(format!("{}/v1/mixed_people/search", self.base_url))
            .header("X-Api-Key", api_key)
            .header("Cache-Control", "no-cache")
            .json(&json!({
                "q_organization_domains": domain,
                "person_titles": DECISION_MAKER_TITLES,
                "page": 1,
                "per_page": 3,
                "contact_email_status": ["verified"],
            }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("⚠ Apollo request failed for {}: {}", domain, e);
                return ProviderOutcome::failed(format!("Apollo request failed: {}", e));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("Apollo returned error {}: {}", status, error_text);
            return ProviderOutcome::failed(format!(
                "Apollo API error {}: {}",
                status.as_u16(),
                error_text
            ));
        }

        let body: PeopleSearchResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                return ProviderOutcome::failed(format!("Failed to parse Apollo response: {}", e))
            }
        };

        let people: Vec<EmailMetadata> = body
            .people
            .into_iter()
            .filter_map(|p| {
                let email = p.email?.trim().to_lowercase();
                if email.is_empty() {
                    return None;
                }
                Some(EmailMetadata {
                    email,
                    kind: EmailKind::Personal,
                    first_name: p.first_name,
                    last_name: p.last_name,
                    position: p.title,
                    seniority: p.seniority,
                    department: None,
                    linkedin: p.linkedin_url,
                    confidence: None,
                })
            })
            .collect();

        if people.is_empty() {
            return ProviderOutcome::empty("no verified decision makers in Apollo");
        }

        tracing::info!("✓ Apollo found {} decision makers for {}", people.len(), domain);
        let emails = people.iter().map(|p| p.email.clone()).collect();
        ProviderOutcome::found(emails, Some(people))
    }
}
