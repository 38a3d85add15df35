//! WhatsApp / SMS outreach links built from an explicit message template.

use crate::errors::AppError;
use crate::models::{Lead, OutreachLinks};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;

/// Outreach message with `{{...}}` placeholders filled from a lead.
///
/// Supported placeholders: `{{Nombre Negocio}}`, `{{Nombre}}`, `{{Ciudad}}`, `{{Categoría}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate(String);

impl MessageTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, lead: &Lead) -> String {
        let city = lead.city.as_deref().unwrap_or("");
        let category = lead.category.as_deref().unwrap_or("");

        self.0
            .replace("{{Nombre Negocio}}", &lead.name)
            .replace("{{Nombre}}", &lead.name)
            .replace("{{Ciudad}}", city)
            .replace("{{Categoría}}", category)
    }
}

/// Digits of the international number (no `+`), suitable for `wa.me`.
///
/// Numbers are parsed against `default_region` (ISO code, e.g. `"MX"`); when parsing
/// or validation fails, all non-digit characters are stripped instead.
pub fn normalize_phone(raw: &str, default_region: &str) -> Option<String> {
    let region = default_region.trim().to_uppercase().parse::<CountryId>().ok();

    let parsed = phonenumber::parse(region, raw)
        .ok()
        .filter(phonenumber::is_valid)
        .map(|number| {
            number
                .format()
                .mode(Mode::E164)
                .to_string()
                .trim_start_matches('+')
                .to_string()
        });

    let digits = parsed.unwrap_or_else(|| {
        tracing::debug!("Phone '{}' not valid for region {}, using digits only", raw, default_region);
        raw.chars().filter(|c| c.is_ascii_digit()).collect()
    });

    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Percent-encodes a message the way browsers' `encodeURIComponent` does for spaces.
fn encode_message(message: &str) -> String {
    // byte_serialize turns spaces into '+' and literal '+' into %2B.
    url::form_urlencoded::byte_serialize(message.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

pub fn build_links(
    lead: &Lead,
    template: &MessageTemplate,
    default_region: &str,
) -> Result<OutreachLinks, AppError> {
    let raw_phone = lead
        .phone
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("Lead {} has no phone number", lead.id)))?;

    let phone = normalize_phone(raw_phone, default_region).ok_or_else(|| {
        AppError::BadRequest(format!("Lead {} has an unusable phone number", lead.id))
    })?;

    let message = template.render(lead);
    let encoded = encode_message(&message);

    Ok(OutreachLinks {
        lead_id: lead.id,
        whatsapp_url: format!("https://wa.me/{}?text={}", phone, encoded),
        sms_url: format!("sms:+{}?body={}", phone, encoded),
        phone,
        message,
    })
}
