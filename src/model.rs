//! Inventory and settings documents as published by the showroom CMS.
//!
//! Field names follow the feed's native keys (`titolo`, `prezzo`, ...). The
//! feed is loosely typed: numbers and text are interchangeable for most
//! fields and empty strings mean "absent".

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Period used when the settings document does not configure one.
pub const DEFAULT_SLIDE_DURATION: Duration = Duration::from_millis(6000);
/// No slide is ever shown for less than this.
pub const MIN_SLIDE_DURATION: Duration = Duration::from_millis(2000);
/// Upper bound so deadline arithmetic cannot overflow.
pub const MAX_SLIDE_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// One vehicle from the inventory feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Listing {
    #[serde(rename = "titolo", default, deserialize_with = "text_or_empty")]
    pub title: String,
    /// Pre-formatted, currency symbol included.
    #[serde(rename = "prezzo", default, deserialize_with = "text_or_number")]
    pub price: Option<String>,
    #[serde(rename = "anno", default, deserialize_with = "text_or_number")]
    pub year: Option<String>,
    /// Either digits only (`"203000"`) or already formatted (`"203.000 km"`).
    #[serde(rename = "km", default, deserialize_with = "text_or_number")]
    pub distance: Option<String>,
    #[serde(rename = "alimentazione", default, deserialize_with = "text_or_number")]
    pub fuel: Option<String>,
    #[serde(rename = "cambio", default, deserialize_with = "text_or_number")]
    pub transmission: Option<String>,
    #[serde(rename = "tipo", default, deserialize_with = "condition")]
    pub condition: Option<Condition>,
    #[serde(rename = "immagine", default, deserialize_with = "text_or_number")]
    pub image: Option<String>,
    #[serde(rename = "link", default, deserialize_with = "text_or_number")]
    pub link: Option<String>,
    #[serde(rename = "posizione", default, deserialize_with = "text_or_number")]
    pub position: Option<String>,
}

impl Listing {
    pub fn display_title(&self) -> String {
        self.title.to_uppercase()
    }

    /// Short attribute labels in display order; absent attributes are skipped.
    pub fn tags(&self) -> Vec<String> {
        [
            self.year.clone(),
            self.distance.as_deref().map(format_km),
            self.fuel.clone(),
            self.transmission.as_deref().map(capitalize),
        ]
        .into_iter()
        .flatten()
        .filter(|tag| !tag.is_empty())
        .collect()
    }

    /// Numeric CMS position, if the feed carries a valid one.
    pub fn position(&self) -> Option<i64> {
        self.position.as_deref()?.trim().parse().ok()
    }
}

/// Inventory section a listing was scraped from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    ZeroKm,
    Used,
    Outlet,
    Other(String),
}

impl Condition {
    pub fn parse(raw: &str) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "km0" | "0km" | "kmzero" | "nuovo" => Self::ZeroKm,
            "usato" | "used" => Self::Used,
            "outlet" => Self::Outlet,
            _ => Self::Other(raw.trim().to_owned()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::ZeroKm => "KM 0",
            Self::Used => "USATO",
            Self::Outlet => "OUTLET",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordering applied to the inventory once per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlideOrder {
    /// Keep the feed order.
    #[default]
    Source,
    /// Shuffle once at load.
    Random,
    /// Ascending CMS position, unpositioned listings last.
    Position,
}

impl From<String> for SlideOrder {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "casuale" | "random" => Self::Random,
            "posizione" | "position" => Self::Position,
            _ => Self::Source,
        }
    }
}

/// The slideshow settings document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Settings {
    #[serde(rename = "durata_slide", default, deserialize_with = "seconds")]
    pub slide_seconds: Option<f64>,
    #[serde(rename = "promo", default, deserialize_with = "null_as_empty")]
    pub promotions: Vec<String>,
    #[serde(rename = "max_annunci", default, deserialize_with = "loose_count")]
    pub max_listings: Option<usize>,
    #[serde(rename = "ordine", default, deserialize_with = "slide_order")]
    pub order: Option<SlideOrder>,
}

impl Settings {
    /// Effective display period: unset, zero or NaN falls back to the
    /// default; any other value, negative included, is held to the floor.
    pub fn slide_duration(&self) -> Duration {
        match self.slide_seconds {
            None => DEFAULT_SLIDE_DURATION,
            Some(secs) if secs == 0.0 || secs.is_nan() => DEFAULT_SLIDE_DURATION,
            Some(secs) if secs < 0.0 => MIN_SLIDE_DURATION,
            Some(secs) => Duration::try_from_secs_f64(secs)
                .unwrap_or(MAX_SLIDE_DURATION)
                .clamp(MIN_SLIDE_DURATION, MAX_SLIDE_DURATION),
        }
    }

    pub fn order(&self) -> SlideOrder {
        self.order.unwrap_or_default()
    }
}

/// `"203000"` -> `"203.000 km"`, `"0"` -> `"0 km"`. Text without digits is
/// passed through untouched.
pub fn format_km(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.parse::<u64>() {
        Ok(0) => "0 km".to_owned(),
        Ok(km) => format!("{} km", group_thousands(km)),
        Err(_) => raw.to_owned(),
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

pub fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Fill a QR service template: `{data}` gets the percent-encoded link,
/// `{size}` the requested pixel edge.
pub fn qr_url(template: &str, link: &str, size: u32) -> String {
    template
        .replace("{size}", &size.to_string())
        .replace("{data}", &urlencoding::encode(link))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_text(self) -> Option<String> {
        let text = match self {
            Self::Text(text) => text.trim().to_owned(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(_) => return None,
        };
        (!text.is_empty()).then_some(text)
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.and_then(Scalar::into_text))
}

fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_or_number(deserializer)?.unwrap_or_default())
}

fn condition<'de, D>(deserializer: D) -> Result<Option<Condition>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_or_number(deserializer)?.map(|raw| Condition::parse(&raw)))
}

fn seconds<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Int(n)) => Some(n as f64),
        Some(Scalar::Float(f)) => Some(f),
        Some(Scalar::Text(text)) => text.trim().parse().ok(),
        Some(Scalar::Bool(_)) | None => None,
    })
}

/// Positive whole count from any scalar; anything else means "no limit".
fn loose_count<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let count = match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Int(n)) => usize::try_from(n).ok(),
        Some(Scalar::Float(f)) if f.is_finite() && f >= 1.0 => Some(f as usize),
        Some(Scalar::Text(text)) => text.trim().parse::<f64>().ok().and_then(|f| {
            (f.is_finite() && f >= 1.0).then_some(f as usize)
        }),
        _ => None,
    };
    Ok(count.filter(|n| *n > 0))
}

fn slide_order<'de, D>(deserializer: D) -> Result<Option<SlideOrder>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_or_number(deserializer)?.map(SlideOrder::from))
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
