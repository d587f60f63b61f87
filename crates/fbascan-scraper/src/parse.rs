//! Typing of extracted strings per [`FieldKind`].

use std::str::FromStr;
use std::sync::LazyLock;

use fbascan_core::FieldKind;
use regex::Regex;
use rust_decimal::Decimal;

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("valid regex"));

/// Valid EAN/UPC/GTIN lengths.
const EAN_LENGTHS: [usize; 4] = [8, 12, 13, 14];

/// A field value after typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    Text(String),
    Price(Decimal),
    Ean(String),
    Url(String),
    Integer(u64),
}

/// Types `value` as `kind`. `None` means the string is not a valid value of
/// that kind. URLs resolve against `page_url`.
#[must_use]
pub fn type_value(kind: FieldKind, value: &str, page_url: &str) -> Option<TypedValue> {
    match kind {
        FieldKind::Text => Some(TypedValue::Text(value.to_owned())),
        FieldKind::Price => parse_price(value).map(TypedValue::Price),
        FieldKind::Ean => parse_ean(value).map(TypedValue::Ean),
        FieldKind::Url => resolve_url(page_url, value).map(TypedValue::Url),
        FieldKind::Integer => fbascan_core::parse_count(value).map(TypedValue::Integer),
    }
}

/// Parses the first amount in `text`, ignoring currency symbols and
/// thousands separators: `"£19.99"` is 19.99, `"1,299.00"` is 1299.00.
/// A lone comma followed by exactly two digits is read as a decimal comma.
#[must_use]
pub fn parse_price(text: &str) -> Option<Decimal> {
    let raw = PRICE_RE.find(text)?.as_str();

    let normalized = if raw.contains('.') {
        raw.replace(',', "")
    } else {
        match raw.rsplit_once(',') {
            Some((whole, cents)) if cents.len() == 2 && !whole.contains(',') => {
                format!("{whole}.{cents}")
            }
            _ => raw.replace(',', ""),
        }
    };

    Decimal::from_str(&normalized).ok()
}

/// Keeps the digits of `text` and accepts them when they form an 8, 12, 13
/// or 14 digit article number.
#[must_use]
pub fn parse_ean(text: &str) -> Option<String> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    EAN_LENGTHS.contains(&digits.len()).then_some(digits)
}

/// Resolves `href` against `base`. Absolute `href`s are returned normalized;
/// `None` when neither yields an http(s) URL.
#[must_use]
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let resolved = match reqwest::Url::parse(href) {
        Ok(url) => url,
        Err(_) => reqwest::Url::parse(base).ok()?.join(href).ok()?,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}
