//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rust_leads_api::db_storage::{LeadRepository, ReportRepository};
use rust_leads_api::errors::AppError;
use rust_leads_api::models::{Lead, LeadUpdate, NewReport, ProviderOutcome, Report, ReportUpdate};
use rust_leads_api::providers::EmailProvider;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Provider returning a fixed outcome and recording every domain it was asked for.
pub struct MockProvider {
    name: String,
    outcome: ProviderOutcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    domains: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &str, outcome: ProviderOutcome) -> Arc<Self> {
        Arc::new(Self::build(name, outcome, None))
    }

    pub fn slow(name: &str, outcome: ProviderOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(name, outcome, Some(delay)))
    }

    fn build(name: &str, outcome: ProviderOutcome, delay: Option<Duration>) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            delay,
            calls: AtomicUsize::new(0),
            domains: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn domains(&self) -> Vec<String> {
        self.domains.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_emails(&self, domain: &str) -> ProviderOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.domains.lock().unwrap().push(domain.to_string());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.outcome.clone()
    }
}

/// In-memory lead and report store.
#[derive(Default)]
pub struct InMemoryRepository {
    leads: Mutex<HashMap<Uuid, Lead>>,
    reports: Mutex<HashMap<Uuid, Report>>,
    /// `(report_id, lead_id)` in the order they were linked.
    report_links: Mutex<Vec<(Uuid, Uuid)>>,
    save_calls: AtomicUsize,
    pub fail_saves: bool,
}

impl InMemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_saves: true,
            ..Default::default()
        })
    }

    pub fn insert(&self, lead: Lead) {
        self.leads.lock().unwrap().insert(lead.id, lead);
    }

    pub fn lead(&self, id: Uuid) -> Option<Lead> {
        self.leads.lock().unwrap().get(&id).cloned()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeadRepository for InMemoryRepository {
    async fn save_emails(&self, lead_id: Uuid, emails: &[String]) -> Result<(), AppError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            return Err(AppError::PersistenceError("connection refused".to_string()));
        }

        let mut leads = self.leads.lock().unwrap();
        let lead = leads
            .get_mut(&lead_id)
            .ok_or_else(|| AppError::PersistenceError(format!("Lead {} not found", lead_id)))?;
        lead.additional_emails = Some(emails.to_vec());
        lead.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn get_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, AppError> {
        Ok(self.lead(lead_id))
    }

    async fn list_leads(&self, include_archived: bool) -> Result<Vec<Lead>, AppError> {
        let mut leads: Vec<Lead> = self
            .leads
            .lock()
            .unwrap()
            .values()
            .filter(|l| include_archived || !l.archived)
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
        Ok(leads)
    }

    async fn list_pending_enrichment(&self, limit: i64) -> Result<Vec<Lead>, AppError> {
        let mut leads = self.list_leads(false).await?;
        leads.retain(|l| l.website().is_some() && !l.has_enriched_emails());
        leads.truncate(limit.max(0) as usize);
        Ok(leads)
    }

    async fn update_lead(&self, lead_id: Uuid, update: &LeadUpdate) -> Result<bool, AppError> {
        let mut leads = self.leads.lock().unwrap();
        let Some(lead) = leads.get_mut(&lead_id) else {
            return Ok(false);
        };
        if let Some(email) = &update.email {
            lead.email = Some(email.clone());
        }
        if let Some(name) = &update.name {
            lead.name = name.clone();
        }
        if let Some(notes) = &update.notes {
            lead.notes = Some(notes.clone());
        }
        if let Some(contacted) = update.contacted {
            lead.contacted = contacted;
        }
        Ok(true)
    }

    async fn set_archived(&self, lead_id: Uuid, archived: bool) -> Result<bool, AppError> {
        let mut leads = self.leads.lock().unwrap();
        Ok(leads
            .get_mut(&lead_id)
            .map(|lead| lead.archived = archived)
            .is_some())
    }

    async fn delete_lead(&self, lead_id: Uuid) -> Result<bool, AppError> {
        Ok(self.leads.lock().unwrap().remove(&lead_id).is_some())
    }
}

impl InMemoryRepository {
    fn link_count(&self, report_id: Uuid) -> i64 {
        self.report_links
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == report_id)
            .count() as i64
    }
}

#[async_trait]
impl ReportRepository for InMemoryRepository {
    async fn create_report(&self, report: &NewReport) -> Result<Report, AppError> {
        let now = Utc::now();
        let created = Report {
            id: Uuid::new_v4(),
            name: report.name.clone(),
            client_name: report.client_name.clone(),
            whatsapp_template: report.whatsapp_template.clone(),
            sender_phone: report.sender_phone.clone(),
            category: report.category.clone(),
            location: report.location.clone(),
            created_at: now,
            updated_at: now,
            lead_count: 0,
        };
        self.reports
            .lock()
            .unwrap()
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_reports(&self) -> Result<Vec<Report>, AppError> {
        let mut reports: Vec<Report> = self.reports.lock().unwrap().values().cloned().collect();
        for report in &mut reports {
            report.lead_count = self.link_count(report.id);
        }
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn get_report(&self, report_id: Uuid) -> Result<Option<Report>, AppError> {
        let report = self.reports.lock().unwrap().get(&report_id).cloned();
        Ok(report.map(|mut r| {
            r.lead_count = self.link_count(report_id);
            r
        }))
    }

    async fn update_report(
        &self,
        report_id: Uuid,
        update: &ReportUpdate,
    ) -> Result<bool, AppError> {
        let mut reports = self.reports.lock().unwrap();
        let Some(report) = reports.get_mut(&report_id) else {
            return Ok(false);
        };
        if let Some(name) = &update.name {
            report.name = name.clone();
        }
        if let Some(client_name) = &update.client_name {
            report.client_name = Some(client_name.clone());
        }
        if let Some(template) = &update.whatsapp_template {
            report.whatsapp_template = Some(template.clone());
        }
        if let Some(phone) = &update.sender_phone {
            report.sender_phone = Some(phone.clone());
        }
        report.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_report(&self, report_id: Uuid) -> Result<bool, AppError> {
        self.report_links
            .lock()
            .unwrap()
            .retain(|(r, _)| *r != report_id);
        Ok(self.reports.lock().unwrap().remove(&report_id).is_some())
    }

    async fn report_leads(&self, report_id: Uuid) -> Result<Vec<Lead>, AppError> {
        let links = self.report_links.lock().unwrap().clone();
        Ok(links
            .iter()
            .rev()
            .filter(|(r, _)| *r == report_id)
            .filter_map(|(_, lead_id)| self.lead(*lead_id))
            .collect())
    }

    async fn add_leads_to_report(
        &self,
        report_id: Uuid,
        lead_ids: &[Uuid],
    ) -> Result<u64, AppError> {
        let mut added = 0;
        for lead_id in lead_ids {
            if self.lead(*lead_id).is_none() {
                continue;
            }
            let mut links = self.report_links.lock().unwrap();
            if !links.contains(&(report_id, *lead_id)) {
                links.push((report_id, *lead_id));
                added += 1;
            }
        }
        Ok(added)
    }

    async fn remove_lead_from_report(
        &self,
        report_id: Uuid,
        lead_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut links = self.report_links.lock().unwrap();
        let before = links.len();
        links.retain(|link| *link != (report_id, lead_id));
        Ok(links.len() < before)
    }

    async fn available_leads(&self, report_id: Uuid, limit: i64) -> Result<Vec<Lead>, AppError> {
        let linked: Vec<Uuid> = self
            .report_links
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == report_id)
            .map(|(_, lead_id)| *lead_id)
            .collect();
        let mut leads = self.list_leads(true).await?;
        leads.retain(|l| !linked.contains(&l.id));
        leads.truncate(limit.max(0) as usize);
        Ok(leads)
    }
}

pub fn sample_lead(name: &str, website: Option<&str>) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        place_id: Some(format!("place-{}", name.to_lowercase())),
        name: name.to_string(),
        website: website.map(String::from),
        phone: Some("+52 81 1234 5678".to_string()),
        email: None,
        additional_emails: None,
        address: None,
        city: Some("Monterrey".to_string()),
        category: Some("Dentista".to_string()),
        rating: Some(4.7),
        review_count: Some(120),
        maps_url: None,
        notes: None,
        contacted: false,
        archived: false,
        scraped_at: Utc::now(),
        updated_at: None,
    }
}

pub fn found(emails: &[&str]) -> ProviderOutcome {
    ProviderOutcome::found(emails.iter().map(|e| e.to_string()).collect(), None)
}
