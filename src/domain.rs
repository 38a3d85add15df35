//! Website string → bare hostname normalization.

use crate::errors::AppError;
use url::Url;

/// Extracts the bare hostname (e.g. `"example.com"`) from a free-form website string.
///
/// - Adds an `https://` scheme when none is present.
/// - Parses the URL and takes its host.
/// - If parsing fails, falls back to the lower-cased input up to the first `/`.
/// - Removes leading `www.` labels (any case).
///
/// The result must contain a `.` and be at least 4 characters long, otherwise
/// [`AppError::InvalidDomain`] is returned with both the input and the rejected candidate.
pub fn normalize_domain(website: &str) -> Result<String, AppError> {
    let trimmed = website.trim();

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let host = match Url::parse(&with_scheme) {
        Ok(url) => match url.host_str() {
            Some(host) if !host.is_empty() => host.to_lowercase(),
            _ => fallback_host(trimmed),
        },
        Err(e) => {
            tracing::debug!("URL parse failed for '{}': {}, using raw fallback", trimmed, e);
            fallback_host(trimmed)
        }
    };

    let domain = strip_www(&host);

    if !domain.contains('.') || domain.len() < 4 {
        tracing::warn!("Rejected domain '{}' (input: '{}')", domain, website);
        return Err(AppError::InvalidDomain {
            input: website.to_string(),
            parsed: domain,
        });
    }

    Ok(domain)
}

fn fallback_host(raw: &str) -> String {
    raw.to_lowercase()
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

// Repeated so that normalizing an already-normalized domain never changes it.
fn strip_www(host: &str) -> String {
    let mut domain = host.to_lowercase();
    while let Some(rest) = domain.strip_prefix("www.") {
        domain = rest.to_string();
    }
    domain
}
