use super::{http_client, EmailProvider};
use crate::errors::AppError;
use crate::models::{EmailMetadata, ProviderOutcome};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;

/// Pages tried in order; the first one yielding any address ends the walk.
pub const CONTACT_PATHS: &[&str] = &["", "/contact", "/contacto", "/about", "/nosotros"];

/// Address patterns that are never real contacts: asset names mistaken for
/// emails, no-reply senders, placeholders and platform infrastructure.
const IGNORED_PATTERNS: &[&str] = &[
    r"\.(png|jpe?g|gif|webp|svg|ico)$",
    r"^(noreply|no-reply|donotreply|do-not-reply|mailer-daemon)@",
    r"^(wix|wordpress|sentry|axios|example|domain|email|user|yourname|name|tu-?email)@",
    r"^contact@yoursite",
    r"@(example|yourdomain|domain|email|sitio)\.(com|mx|org)$",
    r"\.(wixpress\.com|squarespace\.com|sentry\.io|sentry-next\.wixpress\.com)$",
    r"@(sentry|intercom|google|facebook|wix|cloudflare|wixpress|godaddy)\.",
    r"[0-9a-f]{32}@",
];

/// Regex-based email extraction from raw HTML.
pub struct EmailExtractor {
    mailto: Regex,
    hidden_blocks: Regex,
    tags: Regex,
    email: Regex,
    ignored: Vec<Regex>,
}

impl EmailExtractor {
    pub fn new() -> Result<Self, AppError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                AppError::InternalError(format!("Invalid email pattern '{}': {}", pattern, e))
            })
        };

        Ok(Self {
            mailto: compile(r#"(?i)mailto:([^"'?\s<>]+)"#)?,
            hidden_blocks: compile(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<!--.*?-->")?,
            tags: compile(r"<[^>]*>")?,
            email: compile(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")?,
            ignored: IGNORED_PATTERNS
                .iter()
                .map(|&p| compile(p))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    /// Lower-cased, de-duplicated addresses in first-seen order: `mailto:` links first,
    /// then matches in the visible text.
    pub fn extract(&self, html: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        let mut push = |candidate: &str| {
            let clean = candidate
                .trim()
                .trim_end_matches('.')
                .replace("%40", "@")
                .to_lowercase();
            if self.is_acceptable(&clean) && seen.insert(clean.clone()) {
                found.push(clean);
            }
        };

        for cap in self.mailto.captures_iter(html) {
            push(&cap[1]);
        }

        for m in self.email.find_iter(&self.visible_text(html)) {
            push(m.as_str());
        }

        found
    }

    /// Text with scripts, styles, comments and tags removed and `@` entities decoded.
    fn visible_text(&self, html: &str) -> String {
        let without_blocks = self.hidden_blocks.replace_all(html, " ");
        let text = self.tags.replace_all(&without_blocks, " ");
        text.replace("&#64;", "@")
            .replace("&#x40;", "@")
            .replace("&commat;", "@")
            .replace("&nbsp;", " ")
    }

    pub fn is_acceptable(&self, email: &str) -> bool {
        if !email.contains('@') || !email.contains('.') {
            return false;
        }
        if email.len() < 5 || email.len() > 100 {
            return false;
        }
        !self.ignored.iter().any(|re| re.is_match(email))
    }
}

/// Fetches a site's home and contact pages and scans them for addresses.
pub struct WebScraperProvider {
    client: reqwest::Client,
    extractor: EmailExtractor,
    scheme: String,
}

impl WebScraperProvider {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client(timeout, Some(user_agent))?,
            extractor: EmailExtractor::new()?,
            scheme: "https".to_string(),
        })
    }

    /// Overrides the URL scheme (plain `http` for local test servers).
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// `None` when the page could not be loaded; page failures are never fatal.
    async fn scrape_page(&self, url: &str) -> Option<Vec<String>> {
        let response = match self
            .client
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Scrape of {} failed: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::debug!("Scrape of {} returned {}", url, response.status());
            return None;
        }

        match response.text().await {
            Ok(html) => Some(self.extractor.extract(&html)),
            Err(e) => {
                tracing::debug!("Failed to read body of {}: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl EmailProvider for WebScraperProvider {
    fn name(&self) -> &str {
        "scraper"
    }

    async fn find_emails(&self, domain: &str) -> ProviderOutcome {
        let mut loaded = 0usize;

        for path in CONTACT_PATHS {
            let url = format!("{}://{}{}", self.scheme, domain, path);
            let Some(emails) = self.scrape_page(&url).await else {
                continue;
            };
            loaded += 1;

            if !emails.is_empty() {
                tracing::info!("✓ Scraper found {} emails on {}", emails.len(), url);
                let rich = emails.iter().map(|e| EmailMetadata::classified(e)).collect();
                return ProviderOutcome::found(emails, Some(rich));
            }
        }

        if loaded == 0 {
            tracing::warn!("⚠ Scraper could not load any page of {}", domain);
            return ProviderOutcome::failed(format!("could not load any page of {}", domain));
        }

        ProviderOutcome::empty(format!(
            "no public emails on {} of {} pages",
            loaded,
            CONTACT_PATHS.len()
        ))
    }
}
