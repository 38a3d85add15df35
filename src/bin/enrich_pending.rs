//! Script to enrich every lead that has a website but no discovered emails yet.
//!
//! Usage: `enrich_pending [--limit N] [--concurrency N] [--dry-run]`

use anyhow::Context;
use rust_leads_api::config::Config;
use rust_leads_api::db::Database;
use rust_leads_api::db_storage::{LeadRepository, PgLeadRepository};
use rust_leads_api::enrichment::EnrichmentCascade;
use std::sync::Arc;

struct Args {
    limit: i64,
    concurrency: Option<usize>,
    dry_run: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        limit: 500,
        concurrency: None,
        dry_run: false,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--limit" => {
                let value = iter.next().context("--limit needs a value")?;
                args.limit = value.parse().context("--limit must be a number")?;
            }
            "--concurrency" => {
                let value = iter.next().context("--concurrency needs a value")?;
                let n: usize = value.parse().context("--concurrency must be a number")?;
                if n == 0 {
                    anyhow::bail!("--concurrency must be at least 1");
                }
                args.concurrency = Some(n);
            }
            "--dry-run" => args.dry_run = true,
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = parse_args()?;
    let config = Config::from_env()?;

    let db = Database::with_max_connections(&config.database_url, 5).await?;
    let repository: Arc<dyn LeadRepository> = Arc::new(PgLeadRepository::new(db.pool.clone()));

    let pending = repository.list_pending_enrichment(args.limit).await?;
    tracing::info!("Found {} leads pending enrichment", pending.len());

    if args.dry_run {
        for lead in &pending {
            tracing::info!(
                "[dry-run] {} {} ({})",
                lead.id,
                lead.name,
                lead.website().unwrap_or("-")
            );
        }
        return Ok(());
    }

    let cascade = Arc::new(EnrichmentCascade::from_config(&config, Arc::clone(&repository))?);
    let concurrency = args.concurrency.unwrap_or(config.batch_concurrency);

    let targets = pending
        .into_iter()
        .map(|lead| (lead.id, lead.website().map(String::from).unwrap_or_default()))
        .collect();

    let results = cascade.enrich_batch(targets, concurrency).await;

    let mut enriched = 0;
    let mut empty = 0;
    let mut failed = 0;
    for (lead_id, result) in &results {
        match (result.success, result.saved_count.unwrap_or(0)) {
            (true, 0) => empty += 1,
            (true, n) => {
                enriched += 1;
                tracing::debug!("Lead {}: {} emails from {:?}", lead_id, n, result.source);
            }
            (false, _) => {
                failed += 1;
                tracing::warn!(
                    "Lead {} failed: {} ({})",
                    lead_id,
                    result.error.as_deref().unwrap_or("unknown"),
                    result.debug_info.as_deref().unwrap_or("")
                );
            }
        }
    }

    tracing::info!(
        "Batch complete. {} leads processed: {} enriched, {} without emails, {} failed",
        results.len(),
        enriched,
        empty,
        failed
    );

    Ok(())
}
