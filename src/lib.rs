//! Lead Email Enrichment API Library
//!
//! Finds contact emails for scraped business leads by asking a prioritized
//! cascade of providers (Hunter, a website scraper, AnyMailFinder, Apollo) and
//! stores the first usable result on the lead. Also serves lead management and
//! WhatsApp/SMS outreach links over HTTP.
//!
//! # Modules
//!
//! - `circuit_breaker`: Circuit breaker around paid provider APIs.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Lead repository (Postgres).
//! - `domain`: Website to domain normalization.
//! - `enrichment`: Provider cascade.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.
//! - `outreach`: Message templates and outreach links.
//! - `providers`: Email provider adapters.

pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod domain;
pub mod enrichment;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod outreach;
pub mod providers;
