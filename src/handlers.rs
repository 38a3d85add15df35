use crate::config::Config;
use crate::db_storage::{LeadRepository, ReportRepository};
use crate::enrichment::EnrichmentCascade;
use crate::errors::AppError;
use crate::models::*;
use crate::outreach::{build_links, MessageTemplate};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Default number of pending leads picked by a batch run without explicit ids.
const DEFAULT_BATCH_LIMIT: i64 = 50;

/// Most leads a single batch request may enrich.
pub const MAX_BATCH_SIZE: usize = 200;

/// Leads offered when picking additions for a report.
const AVAILABLE_LEADS_LIMIT: i64 = 100;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Lead storage.
    pub repository: Arc<dyn LeadRepository>,
    /// Client reports and their lead links.
    pub reports: Arc<dyn ReportRepository>,
    /// Provider cascade used by the enrichment endpoints.
    pub cascade: Arc<EnrichmentCascade>,
    /// Application configuration.
    pub config: Config,
    /// Leads currently being enriched, with the unix timestamp the run started.
    pub processing_leads_cache: Cache<Uuid, i64>,
}

/// Exclusive right to enrich one lead, held in `processing_leads_cache`.
///
/// The entry is removed by [`release`](Self::release), or in the background when
/// the claim is dropped (request aborted, task panicked).
pub struct InFlightClaim {
    cache: Cache<Uuid, i64>,
    lead_id: Uuid,
    released: bool,
}

impl InFlightClaim {
    /// Claims the lead atomically: only the caller that inserts the entry wins.
    /// A lost claim yields how many seconds ago the running one started.
    pub async fn acquire(cache: &Cache<Uuid, i64>, lead_id: Uuid) -> Result<Self, i64> {
        let now = chrono::Utc::now().timestamp();
        let entry = cache.entry(lead_id).or_insert_with(async { now }).await;

        if !entry.is_fresh() {
            return Err(now - entry.value());
        }

        Ok(Self {
            cache: cache.clone(),
            lead_id,
            released: false,
        })
    }

    pub async fn release(mut self) {
        self.cache.invalidate(&self.lead_id).await;
        self.released = true;
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let cache = self.cache.clone();
        let lead_id = self.lead_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { cache.invalidate(&lead_id).await });
            }
            Err(_) => tracing::warn!(
                "In-flight claim for lead {} dropped outside the runtime; it expires with the cache TTL",
                lead_id
            ),
        }
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-leads-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/v1/leads
///
/// Lists leads newest first. Archived leads are hidden unless `include_archived=true`.
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeadListParams>,
) -> Result<Json<Vec<Lead>>, AppError> {
    let leads = state.repository.list_leads(params.include_archived).await?;
    tracing::debug!(
        "GET /leads - {} leads (include_archived: {})",
        leads.len(),
        params.include_archived
    );
    Ok(Json(leads))
}

/// GET /api/v1/leads/:id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Lead>, AppError> {
    Ok(Json(fetch_lead(&state, id).await?))
}

/// PATCH /api/v1/leads/:id
///
/// Updates the manually editable fields (primary email, name, notes, contacted).
pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<LeadUpdate>,
) -> Result<Json<Lead>, AppError> {
    tracing::info!("PATCH /leads/{} - {:?}", id, update);

    if let Some(email) = update.email.as_deref() {
        if !email.is_empty() && !email.contains('@') {
            return Err(AppError::BadRequest(format!("Invalid email: {}", email)));
        }
    }

    if !state.repository.update_lead(id, &update).await? {
        return Err(lead_not_found(id));
    }

    Ok(Json(fetch_lead(&state, id).await?))
}

/// POST /api/v1/leads/:id/archive
pub async fn archive_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    set_archived(&state, id, true).await
}

/// POST /api/v1/leads/:id/restore
pub async fn restore_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    set_archived(&state, id, false).await
}

async fn set_archived(
    state: &AppState,
    id: Uuid,
    archived: bool,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.repository.set_archived(id, archived).await? {
        return Err(lead_not_found(id));
    }

    tracing::info!("Lead {} archived: {}", id, archived);
    Ok(Json(json!({
        "success": true,
        "lead_id": id,
        "archived": archived
    })))
}

/// DELETE /api/v1/leads/:id
pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.repository.delete_lead(id).await? {
        return Err(lead_not_found(id));
    }

    tracing::info!("Lead {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/leads/:id/enrich
///
/// Runs the provider cascade for one lead. The website comes from the request
/// body when given, otherwise from the stored lead. Cascade failures (missing
/// website, invalid domain, failed save) are reported inside the result; a lead
/// that is already being enriched is rejected with 409.
pub async fn enrich_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<EnrichLeadRequest>>,
) -> Result<Json<EnrichResult>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    tracing::info!("POST /leads/{}/enrich", id);

    let website = match request.website {
        Some(website) => website,
        None => fetch_lead(&state, id)
            .await?
            .website()
            .map(String::from)
            .unwrap_or_default(),
    };

    let claim = InFlightClaim::acquire(&state.processing_leads_cache, id)
        .await
        .map_err(|seconds_ago| already_enriching(id, seconds_ago))?;

    let result = state.cascade.enrich_lead(id, &website).await;
    claim.release().await;

    Ok(Json(result))
}

/// POST /api/v1/leads/enrich/batch
///
/// Enriches the given leads, or up to `limit` pending leads when no ids are given.
/// Repeated ids run once; leads already being enriched are reported as `Conflict`
/// and unknown ids as `NotFound`. Concurrency never exceeds the configured value.
pub async fn enrich_batch(
    State(state): State<Arc<AppState>>,
    body: Option<Json<BatchEnrichRequest>>,
) -> Result<Json<BatchEnrichResponse>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let max_concurrency = state.config.batch_concurrency.max(1);
    let concurrency = request
        .concurrency
        .map_or(max_concurrency, |c| c.clamp(1, max_concurrency));

    let mut skipped = Vec::new();
    let leads = match request.lead_ids {
        Some(mut ids) => {
            let mut seen = HashSet::new();
            ids.retain(|id| seen.insert(*id));
            if ids.len() > MAX_BATCH_SIZE {
                return Err(AppError::BadRequest(format!(
                    "Too many leads in one batch: {} (max {})",
                    ids.len(),
                    MAX_BATCH_SIZE
                )));
            }

            let mut leads = Vec::with_capacity(ids.len());
            for id in ids {
                match state.repository.get_lead(id).await? {
                    Some(lead) => leads.push(lead),
                    None => skipped.push(BatchEnrichItem {
                        lead_id: id,
                        result: EnrichResult::from(lead_not_found(id)),
                    }),
                }
            }
            leads
        }
        None => {
            let limit = request
                .limit
                .unwrap_or(DEFAULT_BATCH_LIMIT)
                .clamp(1, MAX_BATCH_SIZE as i64);
            state.repository.list_pending_enrichment(limit).await?
        }
    };

    let mut targets = Vec::with_capacity(leads.len());
    for lead in leads {
        match InFlightClaim::acquire(&state.processing_leads_cache, lead.id).await {
            Ok(claim) => {
                let website = lead.website().map(String::from).unwrap_or_default();
                targets.push((lead.id, website, claim));
            }
            Err(seconds_ago) => skipped.push(BatchEnrichItem {
                lead_id: lead.id,
                result: EnrichResult::from(already_enriching(lead.id, seconds_ago)),
            }),
        }
    }

    tracing::info!(
        "POST /leads/enrich/batch - {} leads claimed, {} skipped",
        targets.len(),
        skipped.len()
    );

    let mut results: Vec<BatchEnrichItem> = state
        .cascade
        .enrich_batch_holding(targets, concurrency)
        .await
        .into_iter()
        .map(|(lead_id, result)| BatchEnrichItem { lead_id, result })
        .collect();
    results.extend(skipped);

    Ok(Json(BatchEnrichResponse::from_items(results)))
}

/// POST /api/v1/leads/:id/outreach
///
/// Builds WhatsApp and SMS links for the lead's phone. The message template is
/// the request's, else the given report's, else the configured one. Optionally
/// marks the lead contacted.
pub async fn outreach(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<OutreachRequest>>,
) -> Result<Json<OutreachLinks>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let lead = fetch_lead(&state, id).await?;

    let report_template = match request.report_id {
        Some(report_id) => fetch_report(&state, report_id).await?.whatsapp_template,
        None => None,
    };

    let template = MessageTemplate::new(
        request
            .template
            .into_iter()
            .chain(report_template)
            .find(|t| !t.trim().is_empty())
            .unwrap_or_else(|| state.config.whatsapp_template.clone()),
    );

    let links = build_links(&lead, &template, &state.config.default_phone_region)?;

    if request.mark_contacted && !lead.contacted {
        let update = LeadUpdate {
            contacted: Some(true),
            ..Default::default()
        };
        state.repository.update_lead(id, &update).await?;
        tracing::info!("Lead {} marked as contacted", id);
    }

    Ok(Json(links))
}

// ============ Reports ============

/// GET /api/v1/reports
pub async fn list_reports(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Report>>, AppError> {
    Ok(Json(state.reports.list_reports().await?))
}

/// POST /api/v1/reports
pub async fn create_report(
    State(state): State<Arc<AppState>>,
    Json(report): Json<NewReport>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    let report = report.normalized();
    if report.name.is_empty() {
        return Err(AppError::BadRequest("Report name is required".to_string()));
    }

    let created = state.reports.create_report(&report).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/reports/:id
///
/// The report with its leads, most recently added first.
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportWithLeads>, AppError> {
    let mut report = fetch_report(&state, id).await?;
    let leads = state.reports.report_leads(id).await?;
    report.lead_count = leads.len() as i64;

    Ok(Json(ReportWithLeads { report, leads }))
}

/// PATCH /api/v1/reports/:id
pub async fn update_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<ReportUpdate>,
) -> Result<Json<Report>, AppError> {
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("Report name cannot be blank".to_string()));
    }

    if !state.reports.update_report(id, &update).await? {
        return Err(report_not_found(id));
    }

    Ok(Json(fetch_report(&state, id).await?))
}

/// DELETE /api/v1/reports/:id
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.reports.delete_report(id).await? {
        return Err(report_not_found(id));
    }

    tracing::info!("Report {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/reports/:id/leads
pub async fn add_report_leads(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddLeadsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    fetch_report(&state, id).await?;

    let mut seen = HashSet::new();
    let lead_ids: Vec<Uuid> = request
        .lead_ids
        .into_iter()
        .filter(|lead_id| seen.insert(*lead_id))
        .collect();

    let added = state.reports.add_leads_to_report(id, &lead_ids).await?;
    Ok(Json(json!({
        "success": true,
        "report_id": id,
        "added": added
    })))
}

/// DELETE /api/v1/reports/:id/leads/:lead_id
pub async fn remove_report_lead(
    State(state): State<Arc<AppState>>,
    Path((id, lead_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    if !state.reports.remove_lead_from_report(id, lead_id).await? {
        return Err(AppError::NotFound(format!(
            "Lead {} is not in report {}",
            lead_id, id
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/reports/:id/available-leads
///
/// Leads that could still be added to the report, newest first.
pub async fn available_report_leads(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Lead>>, AppError> {
    fetch_report(&state, id).await?;
    Ok(Json(
        state
            .reports
            .available_leads(id, AVAILABLE_LEADS_LIMIT)
            .await?,
    ))
}

async fn fetch_lead(state: &AppState, id: Uuid) -> Result<Lead, AppError> {
    state
        .repository
        .get_lead(id)
        .await?
        .ok_or_else(|| lead_not_found(id))
}

fn lead_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Lead with id {} not found", id))
}

async fn fetch_report(state: &AppState, id: Uuid) -> Result<Report, AppError> {
    state
        .reports
        .get_report(id)
        .await?
        .ok_or_else(|| report_not_found(id))
}

fn report_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Report with id {} not found", id))
}

fn already_enriching(id: Uuid, seconds_ago: i64) -> AppError {
    tracing::warn!(
        "⏭ DUPLICATE REQUEST BLOCKED - Lead {} already being enriched ({} seconds ago)",
        id,
        seconds_ago
    );
    AppError::Conflict(format!(
        "Lead {} is already being enriched (started {} seconds ago)",
        id, seconds_ago
    ))
}
