use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Database Models ============

/// A business listing eligible for outreach, stored in `business_leads`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    /// Unique identifier for the lead.
    pub id: Uuid,
    /// Google Maps place id the lead was scraped from.
    pub place_id: Option<String>,
    /// Business display name.
    pub name: String,
    /// Raw website string as scraped; may be empty or malformed.
    pub website: Option<String>,
    pub phone: Option<String>,
    /// Primary email (manually edited or scraped).
    pub email: Option<String>,
    /// Emails discovered by enrichment; replaced wholesale on every successful run.
    pub additional_emails: Option<Vec<String>>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<i32>,
    pub maps_url: Option<String>,
    pub notes: Option<String>,
    /// Whether the lead has been contacted.
    pub contacted: bool,
    /// Archived leads are hidden from the default list.
    pub archived: bool,
    pub scraped_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// Website string if present and non-blank.
    pub fn website(&self) -> Option<&str> {
        self.website
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }

    /// True once enrichment has stored at least one email.
    pub fn has_enriched_emails(&self) -> bool {
        self.additional_emails
            .as_ref()
            .is_some_and(|emails| !emails.is_empty())
    }
}

/// Partial update of user-editable lead fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LeadUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub contacted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LeadListParams {
    #[serde(default)]
    pub include_archived: bool,
}

// ============ Enrichment Models ============

/// Personal (tied to a named person) vs generic (role/department) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailKind {
    Personal,
    Generic,
}

/// Local parts that identify role or department mailboxes.
const GENERIC_LOCAL_PARTS: &[&str] = &[
    "info", "contact", "contacto", "hello", "hola", "admin", "sales", "ventas", "support",
    "soporte", "office", "oficina", "mail", "email", "team", "help", "ayuda", "enquiries",
    "inquiries", "billing", "facturacion", "recepcion", "reception", "citas", "marketing",
    "jobs", "careers", "rh", "hr", "general", "webmaster", "atencion", "clientes",
];

impl EmailKind {
    /// Classifies an address by its local part.
    pub fn classify(email: &str) -> Self {
        let local = email.split('@').next().unwrap_or_default().to_lowercase();
        let head = local
            .split(|c: char| c == '.' || c == '-' || c == '_' || c == '+')
            .next()
            .unwrap_or_default();

        if GENERIC_LOCAL_PARTS.contains(&local.as_str()) || GENERIC_LOCAL_PARTS.contains(&head) {
            EmailKind::Generic
        } else {
            EmailKind::Personal
        }
    }
}

/// Rich per-email data, when a provider supplies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMetadata {
    pub email: String,
    pub kind: EmailKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Job title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seniority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    /// Provider confidence score, 0-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
}

impl EmailMetadata {
    /// Metadata with only the address and its derived classification.
    pub fn classified(email: &str) -> Self {
        Self {
            email: email.to_string(),
            kind: EmailKind::classify(email),
            first_name: None,
            last_name: None,
            position: None,
            seniority: None,
            department: None,
            linkedin: None,
            confidence: None,
        }
    }
}

/// Uniform result every provider adapter returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderOutcome {
    pub success: bool,
    /// Usable emails, provider-ranked.
    pub emails: Vec<String>,
    pub rich_data: Option<Vec<EmailMetadata>>,
    /// Failure reason, or the reason an otherwise successful call yielded nothing usable.
    pub error: Option<String>,
}

impl ProviderOutcome {
    pub fn found(emails: Vec<String>, rich_data: Option<Vec<EmailMetadata>>) -> Self {
        Self {
            success: true,
            emails,
            rich_data,
            error: None,
        }
    }

    /// Call succeeded but produced no usable emails.
    pub fn empty(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            emails: Vec::new(),
            rich_data: None,
            error: Some(reason.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            emails: Vec::new(),
            rich_data: None,
            error: Some(reason.into()),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.success && !self.emails.is_empty()
    }
}

/// Why a provider in the cascade produced no usable emails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDiagnostic {
    pub provider: String,
    pub reason: String,
}

impl std::fmt::Display for ProviderDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Outcome of one successful cascade run (emails may be empty).
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub lead_id: Uuid,
    pub domain: String,
    pub emails: Vec<String>,
    pub source: Option<String>,
    pub rich_data: Vec<EmailMetadata>,
    pub diagnostics: Vec<ProviderDiagnostic>,
}

impl EnrichmentOutcome {
    pub fn saved_count(&self) -> usize {
        self.emails.len()
    }

    /// Diagnostics joined for display, e.g. `"hunter: no emails | scraper: nothing on 5 pages"`.
    pub fn debug_info(&self) -> String {
        if self.emails.is_empty() {
            self.diagnostics
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | ")
        } else {
            format!("Source: {}", self.source.as_deref().unwrap_or("unknown"))
        }
    }
}

/// Enrichment result as returned to HTTP callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rich_data: Option<Vec<EmailMetadata>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<ProviderDiagnostic>,
}

impl From<EnrichmentOutcome> for EnrichResult {
    fn from(outcome: EnrichmentOutcome) -> Self {
        let debug_info = outcome.debug_info();
        let saved_count = outcome.saved_count();
        Self {
            success: true,
            emails: Some(outcome.emails),
            saved_count: Some(saved_count),
            source: outcome.source,
            rich_data: if outcome.rich_data.is_empty() {
                None
            } else {
                Some(outcome.rich_data)
            },
            error: None,
            debug_info: if debug_info.is_empty() {
                None
            } else {
                Some(debug_info)
            },
            diagnostics: outcome.diagnostics,
        }
    }
}

impl From<crate::errors::AppError> for EnrichResult {
    fn from(err: crate::errors::AppError) -> Self {
        Self {
            success: false,
            error: Some(err.code().to_string()),
            debug_info: err.debug_info(),
            ..Default::default()
        }
    }
}

// ============ Report Models ============

/// A named selection of leads prepared for a client, stored in `reports`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub name: String,
    pub client_name: Option<String>,
    /// Outreach template for this report's leads; overrides the configured one.
    pub whatsapp_template: Option<String>,
    pub sender_phone: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Leads linked through `report_leads`.
    pub lead_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ReportWithLeads {
    #[serde(flatten)]
    pub report: Report,
    /// Most recently added first.
    pub leads: Vec<Lead>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReport {
    pub name: String,
    pub client_name: Option<String>,
    pub whatsapp_template: Option<String>,
    pub sender_phone: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
}

impl NewReport {
    /// Trims the name and turns blank optional fields into `None`.
    pub fn normalized(self) -> Self {
        fn non_blank(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            name: self.name.trim().to_string(),
            client_name: non_blank(self.client_name),
            whatsapp_template: non_blank(self.whatsapp_template),
            sender_phone: non_blank(self.sender_phone),
            category: non_blank(self.category),
            location: non_blank(self.location),
        }
    }
}

/// Partial update of a report. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportUpdate {
    pub name: Option<String>,
    pub client_name: Option<String>,
    pub whatsapp_template: Option<String>,
    pub sender_phone: Option<String>,
}

// ============ Request / Response Models ============

#[derive(Debug, Default, Deserialize)]
pub struct EnrichLeadRequest {
    /// Overrides the stored website when present.
    pub website: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchEnrichRequest {
    /// Explicit leads to enrich; when absent, pending leads are selected.
    pub lead_ids: Option<Vec<Uuid>>,
    pub limit: Option<i64>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct BatchEnrichItem {
    pub lead_id: Uuid,
    #[serde(flatten)]
    pub result: EnrichResult,
}

#[derive(Debug, Serialize)]
pub struct BatchEnrichResponse {
    pub processed: usize,
    pub enriched: usize,
    pub failed: usize,
    pub results: Vec<BatchEnrichItem>,
}

impl BatchEnrichResponse {
    /// Tallies items: `enriched` saved at least one email, `failed` returned an error.
    pub fn from_items(results: Vec<BatchEnrichItem>) -> Self {
        let enriched = results
            .iter()
            .filter(|item| item.result.success && item.result.saved_count.unwrap_or(0) > 0)
            .count();
        let failed = results.iter().filter(|item| !item.result.success).count();

        Self {
            processed: results.len(),
            enriched,
            failed,
            results,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AddLeadsRequest {
    pub lead_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutreachRequest {
    /// Message template; falls back to the report's template, then the configured default.
    pub template: Option<String>,
    /// Report whose template applies when no explicit template is given.
    pub report_id: Option<Uuid>,
    #[serde(default)]
    pub mark_contacted: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct OutreachLinks {
    pub lead_id: Uuid,
    pub phone: String,
    pub message: String,
    pub whatsapp_url: String,
    pub sms_url: String,
}
