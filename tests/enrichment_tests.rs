/// Cascade behaviour with mocked providers and an in-memory lead store
mod common;

use common::{found, sample_lead, InMemoryRepository, MockProvider};
use rust_leads_api::enrichment::EnrichmentCascade;
use rust_leads_api::models::ProviderOutcome;
use rust_leads_api::providers::EmailProvider;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn cascade(
    providers: &[Arc<MockProvider>],
    repository: Arc<InMemoryRepository>,
) -> EnrichmentCascade {
    let providers = providers
        .iter()
        .map(|p| Arc::clone(p) as Arc<dyn EmailProvider>)
        .collect();
    EnrichmentCascade::new(providers, repository)
}

#[tokio::test]
async fn test_missing_website_calls_no_provider() {
    let provider = MockProvider::new("hunter", found(&["dr.smith@myclinic.com"]));
    let repo = InMemoryRepository::new();
    let cascade = cascade(&[provider.clone()], repo.clone());

    for website in ["", "   "] {
        let result = cascade.enrich_lead(Uuid::new_v4(), website).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("MissingWebsite"));
    }

    assert_eq!(provider.calls(), 0);
    assert_eq!(repo.save_calls(), 0);
}

#[tokio::test]
async fn test_malformed_websites_are_invalid_domains() {
    let provider = MockProvider::new("hunter", found(&["a@b.com"]));
    let cascade = cascade(&[provider.clone()], InMemoryRepository::new());

    for website in ["a", "...", "localhost", "https://"] {
        let result = cascade.enrich_lead(Uuid::new_v4(), website).await;
        assert!(!result.success, "{} should fail", website);
        assert_eq!(result.error.as_deref(), Some("InvalidDomain"));
        assert!(result.debug_info.unwrap().starts_with("Input: "));
    }

    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_first_success_short_circuits() {
    let first = MockProvider::new("provider1", found(&["dr.smith@myclinic.com"]));
    let second = MockProvider::new("provider2", found(&["info@myclinic.com"]));
    let repo = InMemoryRepository::new();
    let lead = sample_lead("My Clinic", Some("myclinic.com"));
    repo.insert(lead.clone());

    let cascade = cascade(&[first.clone(), second.clone()], repo.clone());
    let result = cascade.enrich_lead(lead.id, "myclinic.com").await;

    assert!(result.success);
    assert_eq!(result.emails, Some(vec!["dr.smith@myclinic.com".to_string()]));
    assert_eq!(result.source.as_deref(), Some("provider1"));
    assert_eq!(result.saved_count, Some(1));
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 0);

    assert_eq!(
        repo.lead(lead.id).unwrap().additional_emails,
        Some(vec!["dr.smith@myclinic.com".to_string()])
    );
}

#[tokio::test]
async fn test_fallback_uses_same_normalized_domain() {
    let first = MockProvider::new("hunter", ProviderOutcome::failed("Hunter API error: 429 - Too Many Requests"));
    let second = MockProvider::new("scraper", ProviderOutcome::empty("no public emails on 5 of 5 pages"));
    let third = MockProvider::new("anymailfinder", found(&["owner@example.com"]));
    let repo = InMemoryRepository::new();
    let lead = sample_lead("Example", Some("https://WWW.Example.com/path"));
    repo.insert(lead.clone());

    let cascade = cascade(&[first.clone(), second.clone(), third.clone()], repo);
    let result = cascade
        .enrich_lead(lead.id, "https://WWW.Example.com/path")
        .await;

    assert!(result.success);
    assert_eq!(result.source.as_deref(), Some("anymailfinder"));
    assert_eq!(first.domains(), vec!["example.com"]);
    assert_eq!(second.domains(), vec!["example.com"]);
    assert_eq!(third.domains(), vec!["example.com"]);
    assert_eq!(result.diagnostics.len(), 2);
    assert_eq!(result.diagnostics[0].provider, "hunter");
    assert_eq!(result.debug_info.as_deref(), Some("Source: anymailfinder"));
}

#[tokio::test]
async fn test_all_empty_is_success_with_reasons() {
    let first = MockProvider::new("hunter", ProviderOutcome::failed("missing HUNTER_API_KEY"));
    let second = MockProvider::new("scraper", ProviderOutcome::empty("no public emails on 3 of 5 pages"));
    let third = MockProvider::new("anymailfinder", ProviderOutcome::found(vec![], None));
    let repo = InMemoryRepository::new();
    let lead = sample_lead("Quiet", Some("quiet.mx"));
    repo.insert(lead.clone());

    let cascade = cascade(&[first, second, third], repo.clone());
    let result = cascade.enrich_lead(lead.id, "quiet.mx").await;

    assert!(result.success);
    assert_eq!(result.emails, Some(vec![]));
    assert_eq!(result.saved_count, Some(0));
    assert_eq!(result.source, None);
    assert_eq!(
        result.debug_info.as_deref(),
        Some(
            "hunter: missing HUNTER_API_KEY | scraper: no public emails on 3 of 5 pages | anymailfinder: no emails found"
        )
    );
    // Nothing found means nothing written.
    assert_eq!(repo.save_calls(), 0);
    assert_eq!(repo.lead(lead.id).unwrap().additional_emails, None);
}

#[tokio::test]
async fn test_second_run_overwrites_previous_emails() {
    let repo = InMemoryRepository::new();
    let lead = sample_lead("Bufete", Some("bufete.com"));
    repo.insert(lead.clone());

    let first_run = cascade(
        &[MockProvider::new("hunter", found(&["ana@bufete.com", "luis@bufete.com"]))],
        repo.clone(),
    );
    first_run.enrich_lead(lead.id, "bufete.com").await;

    let second_run = cascade(
        &[MockProvider::new("scraper", found(&["contacto@bufete.com"]))],
        repo.clone(),
    );
    let result = second_run.enrich_lead(lead.id, "bufete.com").await;

    assert_eq!(result.saved_count, Some(1));
    assert_eq!(
        repo.lead(lead.id).unwrap().additional_emails,
        Some(vec!["contacto@bufete.com".to_string()])
    );
}

#[tokio::test]
async fn test_failed_save_is_persistence_error() {
    let repo = InMemoryRepository::failing();
    let cascade = cascade(&[MockProvider::new("hunter", found(&["ana@bufete.com"]))], repo);

    let result = cascade.enrich_lead(Uuid::new_v4(), "bufete.com").await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("PersistenceError"));
    assert!(result.debug_info.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_duplicate_provider_is_queried_once() {
    let hunter = MockProvider::new("hunter", ProviderOutcome::empty("no emails in Hunter"));
    let repo = InMemoryRepository::new();

    let cascade = cascade(&[hunter.clone(), hunter.clone()], repo);
    let result = cascade.enrich_lead(Uuid::new_v4(), "example.com").await;

    assert!(result.success);
    assert_eq!(hunter.calls(), 1);
    assert_eq!(result.diagnostics.len(), 1);
}

#[tokio::test]
async fn test_rich_data_defaults_to_classification() {
    let repo = InMemoryRepository::new();
    let lead = sample_lead("Taller", Some("taller.mx"));
    repo.insert(lead.clone());

    let cascade = cascade(
        &[MockProvider::new("scraper", found(&["info@taller.mx", "juan.perez@taller.mx"]))],
        repo,
    );
    let result = cascade.enrich_lead(lead.id, "taller.mx").await;

    let rich = result.rich_data.unwrap();
    assert_eq!(rich.len(), 2);
    assert_eq!(
        serde_json::to_value(&rich[0]).unwrap()["kind"],
        serde_json::json!("generic")
    );
    assert_eq!(
        serde_json::to_value(&rich[1]).unwrap()["kind"],
        serde_json::json!("personal")
    );
}

#[tokio::test]
async fn test_outcome_cache_avoids_repeat_lookups() {
    let hunter = MockProvider::new("hunter", found(&["ana@bufete.com"]));
    let repo = InMemoryRepository::new();
    let first = sample_lead("Bufete", Some("bufete.com"));
    let second = sample_lead("Bufete Norte", Some("www.bufete.com"));
    repo.insert(first.clone());
    repo.insert(second.clone());

    let cascade = cascade(&[hunter.clone()], repo.clone())
        .with_outcome_cache(Duration::from_secs(60));

    cascade.enrich_lead(first.id, "bufete.com").await;
    let result = cascade.enrich_lead(second.id, "www.bufete.com").await;

    assert_eq!(result.saved_count, Some(1));
    assert_eq!(hunter.calls(), 1);
    assert_eq!(repo.save_calls(), 2);
}

#[tokio::test]
async fn test_outcome_cache_skips_unusable_outcomes() {
    let hunter = MockProvider::new("hunter", ProviderOutcome::failed("timeout"));
    let cascade = cascade(&[hunter.clone()], InMemoryRepository::new())
        .with_outcome_cache(Duration::from_secs(60));

    cascade.enrich_lead(Uuid::new_v4(), "bufete.com").await;
    cascade.enrich_lead(Uuid::new_v4(), "bufete.com").await;

    assert_eq!(hunter.calls(), 2);
}

#[tokio::test]
async fn test_batch_respects_concurrency_and_order() {
    let provider = MockProvider::slow(
        "scraper",
        ProviderOutcome::empty("no public emails on 5 of 5 pages"),
        Duration::from_millis(30),
    );
    let repo = InMemoryRepository::new();
    let cascade = Arc::new(cascade(&[provider.clone()], repo));

    let targets: Vec<(Uuid, String)> = (0..8)
        .map(|i| (Uuid::new_v4(), format!("shop{}.com", i)))
        .collect();
    let expected_ids: Vec<Uuid> = targets.iter().map(|(id, _)| *id).collect();

    let results = cascade.enrich_batch(targets, 2).await;

    assert_eq!(results.len(), 8);
    assert_eq!(
        results.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        expected_ids
    );
    assert!(results.iter().all(|(_, r)| r.success));
    assert_eq!(provider.calls(), 8);
    assert!(provider.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_batch_reports_per_lead_failures() {
    let repo = InMemoryRepository::new();
    let lead = sample_lead("Good", Some("good.com"));
    repo.insert(lead.clone());
    let cascade = Arc::new(cascade(
        &[MockProvider::new("hunter", found(&["ana@good.com"]))],
        repo,
    ));

    let missing = Uuid::new_v4();
    let results = cascade
        .enrich_batch(vec![(lead.id, "good.com".into()), (missing, String::new())], 4)
        .await;

    assert!(results[0].1.success);
    assert_eq!(results[1].0, missing);
    assert_eq!(results[1].1.error.as_deref(), Some("MissingWebsite"));
}
