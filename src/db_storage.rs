use crate::errors::{AppError, ResultExt};
use crate::models::{Lead, LeadUpdate, NewReport, Report, ReportUpdate};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

const LEAD_COLUMNS: &str = "id, place_id, name, website, phone, email, additional_emails, \
     address, city, category, rating, review_count, maps_url, notes, contacted, archived, \
     scraped_at, updated_at";

const REPORT_COLUMNS: &str = "r.id, r.name, r.client_name, r.whatsapp_template, r.sender_phone, \
     r.category, r.location, r.created_at, r.updated_at, \
     (SELECT COUNT(*) FROM report_leads rl WHERE rl.report_id = r.id) AS lead_count";

/// Storage boundary for leads. The enrichment cascade only needs [`save_emails`];
/// the remaining operations back the lead-management endpoints.
///
/// [`save_emails`]: LeadRepository::save_emails
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Overwrites the lead's additional emails. Any failure is a `PersistenceError`.
    async fn save_emails(&self, lead_id: Uuid, emails: &[String]) -> Result<(), AppError>;

    async fn get_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, AppError>;

    /// Newest first.
    async fn list_leads(&self, include_archived: bool) -> Result<Vec<Lead>, AppError>;

    /// Active leads with a website and no enriched emails yet.
    async fn list_pending_enrichment(&self, limit: i64) -> Result<Vec<Lead>, AppError>;

    /// Applies the provided fields; returns false when the lead does not exist.
    async fn update_lead(&self, lead_id: Uuid, update: &LeadUpdate) -> Result<bool, AppError>;

    async fn set_archived(&self, lead_id: Uuid, archived: bool) -> Result<bool, AppError>;

    async fn delete_lead(&self, lead_id: Uuid) -> Result<bool, AppError>;
}

/// Storage for client reports and their lead links (`reports`, `report_leads`).
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create_report(&self, report: &NewReport) -> Result<Report, AppError>;

    /// Newest first.
    async fn list_reports(&self) -> Result<Vec<Report>, AppError>;

    async fn get_report(&self, report_id: Uuid) -> Result<Option<Report>, AppError>;

    /// Applies the provided fields; returns false when the report does not exist.
    async fn update_report(&self, report_id: Uuid, update: &ReportUpdate)
        -> Result<bool, AppError>;

    /// Deletes the report and its lead links.
    async fn delete_report(&self, report_id: Uuid) -> Result<bool, AppError>;

    /// Leads linked to the report, most recently added first.
    async fn report_leads(&self, report_id: Uuid) -> Result<Vec<Lead>, AppError>;

    /// Links existing leads to the report. Already linked and unknown ids are
    /// skipped; returns the number of new links.
    async fn add_leads_to_report(&self, report_id: Uuid, lead_ids: &[Uuid])
        -> Result<u64, AppError>;

    async fn remove_lead_from_report(&self, report_id: Uuid, lead_id: Uuid)
        -> Result<bool, AppError>;

    /// Leads not yet in the report, newest first.
    async fn available_leads(&self, report_id: Uuid, limit: i64) -> Result<Vec<Lead>, AppError>;
}

/// Postgres-backed lead and report storage.
#[derive(Clone)]
pub struct PgLeadRepository {
    pool: PgPool,
}

impl PgLeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadRepository for PgLeadRepository {
    async fn save_emails(&self, lead_id: Uuid, emails: &[String]) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE business_leads
             SET additional_emails = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(lead_id)
        .bind(emails)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("DB update failed for lead {}: {:?}", lead_id, e);
            AppError::PersistenceError(format!("Failed to save emails: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::PersistenceError(format!(
                "Lead {} not found",
                lead_id
            )));
        }

        tracing::info!("✓ Saved {} emails on lead {}", emails.len(), lead_id);
        Ok(())
    }

    async fn get_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {} FROM business_leads WHERE id = $1",
            LEAD_COLUMNS
        ))
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Fetching lead {}", lead_id))?;

        Ok(lead)
    }

    async fn list_leads(&self, include_archived: bool) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {} FROM business_leads
             WHERE ($1 OR archived = false)
             ORDER BY scraped_at DESC",
            LEAD_COLUMNS
        ))
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await
        .context("Listing leads")?;

        Ok(leads)
    }

    async fn list_pending_enrichment(&self, limit: i64) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {} FROM business_leads
             WHERE archived = false
               AND website IS NOT NULL AND btrim(website) <> ''
               AND (additional_emails IS NULL OR cardinality(additional_emails) = 0)
             ORDER BY scraped_at DESC
             LIMIT $1",
            LEAD_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Listing leads pending enrichment")?;

        Ok(leads)
    }

    async fn update_lead(&self, lead_id: Uuid, update: &LeadUpdate) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE business_leads
             SET email = COALESCE($2, email),
                 name = COALESCE($3, name),
                 notes = COALESCE($4, notes),
                 contacted = COALESCE($5, contacted),
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(lead_id)
        .bind(update.email.as_deref())
        .bind(update.name.as_deref())
        .bind(update.notes.as_deref())
        .bind(update.contacted)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Updating lead {}", lead_id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_archived(&self, lead_id: Uuid, archived: bool) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE business_leads SET archived = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(lead_id)
        .bind(archived)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Archiving lead {}", lead_id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_lead(&self, lead_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM business_leads WHERE id = $1")
            .bind(lead_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Deleting lead {}", lead_id))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ReportRepository for PgLeadRepository {
    async fn create_report(&self, report: &NewReport) -> Result<Report, AppError> {
        let created = sqlx::query_as::<_, Report>(
            "INSERT INTO reports (name, client_name, whatsapp_template, sender_phone, category, location)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, name, client_name, whatsapp_template, sender_phone, category, location,
                       created_at, updated_at, 0::BIGINT AS lead_count",
        )
        .bind(&report.name)
        .bind(report.client_name.as_deref())
        .bind(report.whatsapp_template.as_deref())
        .bind(report.sender_phone.as_deref())
        .bind(report.category.as_deref())
        .bind(report.location.as_deref())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Creating report '{}'", report.name))?;

        tracing::info!("✓ Created report {} ({})", created.id, created.name);
        Ok(created)
    }

    async fn list_reports(&self) -> Result<Vec<Report>, AppError> {
        let reports = sqlx::query_as::<_, Report>(&format!(
            "SELECT {} FROM reports r ORDER BY r.created_at DESC",
            REPORT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Listing reports")?;

        Ok(reports)
    }

    async fn get_report(&self, report_id: Uuid) -> Result<Option<Report>, AppError> {
        let report = sqlx::query_as::<_, Report>(&format!(
            "SELECT {} FROM reports r WHERE r.id = $1",
            REPORT_COLUMNS
        ))
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Fetching report {}", report_id))?;

        Ok(report)
    }

    async fn update_report(
        &self,
        report_id: Uuid,
        update: &ReportUpdate,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE reports
             SET name = COALESCE($2, name),
                 client_name = COALESCE($3, client_name),
                 whatsapp_template = COALESCE($4, whatsapp_template),
                 sender_phone = COALESCE($5, sender_phone),
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(report_id)
        .bind(update.name.as_deref())
        .bind(update.client_name.as_deref())
        .bind(update.whatsapp_template.as_deref())
        .bind(update.sender_phone.as_deref())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Updating report {}", report_id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_report(&self, report_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Starting report delete transaction")?;

        sqlx::query("DELETE FROM report_leads WHERE report_id = $1")
            .bind(report_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Unlinking leads of report {}", report_id))?;

        let result = sqlx::query("DELETE FROM reports WHERE id = $1")
            .bind(report_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Deleting report {}", report_id))?;

        tx.commit()
            .await
            .context("Committing report delete transaction")?;

        Ok(result.rows_affected() > 0)
    }

    async fn report_leads(&self, report_id: Uuid) -> Result<Vec<Lead>, AppError> {
        let columns = LEAD_COLUMNS
            .split(", ")
            .map(|c| format!("l.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");

        let leads = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {} FROM report_leads rl
             JOIN business_leads l ON l.id = rl.lead_id
             WHERE rl.report_id = $1
             ORDER BY rl.added_at DESC",
            columns
        ))
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Listing leads of report {}", report_id))?;

        Ok(leads)
    }

    async fn add_leads_to_report(
        &self,
        report_id: Uuid,
        lead_ids: &[Uuid],
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            "INSERT INTO report_leads (report_id, lead_id)
             SELECT $1, id FROM business_leads WHERE id = ANY($2)
             ON CONFLICT (report_id, lead_id) DO NOTHING",
        )
        .bind(report_id)
        .bind(lead_ids)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Adding leads to report {}", report_id))?;

        tracing::info!(
            "✓ Linked {} of {} leads to report {}",
            result.rows_affected(),
            lead_ids.len(),
            report_id
        );
        Ok(result.rows_affected())
    }

    async fn remove_lead_from_report(
        &self,
        report_id: Uuid,
        lead_id: Uuid,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM report_leads WHERE report_id = $1 AND lead_id = $2")
            .bind(report_id)
            .bind(lead_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Removing lead {} from report {}", lead_id, report_id))?;

        Ok(result.rows_affected() > 0)
    }

    async fn available_leads(&self, report_id: Uuid, limit: i64) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {} FROM business_leads
             WHERE id NOT IN (SELECT lead_id FROM report_leads WHERE report_id = $1)
             ORDER BY scraped_at DESC
             LIMIT $2",
            LEAD_COLUMNS
        ))
        .bind(report_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Listing leads available for report {}", report_id))?;

        Ok(leads)
    }
}
