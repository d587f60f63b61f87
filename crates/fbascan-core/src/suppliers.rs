//! Per-supplier extraction configuration loaded from `suppliers.yaml`.
//!
//! Each supplier lists, per output field, an ordered chain of extraction
//! rules. A rule is written either as a bare CSS selector string or as a map:
//!
//! ```yaml
//! price:
//!   kind: price
//!   required: true
//!   rules:
//!     - selector: ".price"
//!       attribute: data-value
//!     - selector: ".price"
//!       regex: '£([\d.]+)'
//!       group: 1
//!     - ".price-fallback"
//! ```
//!
//! Selector syntax is checked later by the extractor, which owns the CSS
//! engine; regex patterns and capture groups are checked here.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// One candidate in a field's fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub enum ExtractionRule {
    /// Text content of the first node matching `selector`.
    SelectorOnly { selector: String },
    /// Value of `attribute` on the first node matching `selector`.
    SelectorWithAttribute { selector: String, attribute: String },
    /// Capture group `group` of `pattern` applied to the node's text.
    SelectorWithRegex {
        selector: String,
        pattern: String,
        group: usize,
    },
}

impl ExtractionRule {
    #[must_use]
    pub fn selector(&self) -> &str {
        match self {
            ExtractionRule::SelectorOnly { selector }
            | ExtractionRule::SelectorWithAttribute { selector, .. }
            | ExtractionRule::SelectorWithRegex { selector, .. } => selector,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawRule {
    Bare(String),
    Full {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute: Option<String>,
        #[serde(default, alias = "processing_regex", skip_serializing_if = "Option::is_none")]
        regex: Option<String>,
        #[serde(default, alias = "regex_group", skip_serializing_if = "Option::is_none")]
        group: Option<usize>,
    },
}

impl TryFrom<RawRule> for ExtractionRule {
    type Error = String;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        match raw {
            RawRule::Bare(selector) => Ok(ExtractionRule::SelectorOnly { selector }),
            RawRule::Full {
                selector,
                attribute,
                regex,
                group,
            } => match (attribute, regex) {
                (Some(_), Some(_)) => Err(format!(
                    "rule for '{selector}' sets both attribute and regex; pick one"
                )),
                (Some(attribute), None) => {
                    if group.is_some() {
                        return Err(format!(
                            "rule for '{selector}' sets a capture group without a regex"
                        ));
                    }
                    Ok(ExtractionRule::SelectorWithAttribute {
                        selector,
                        attribute,
                    })
                }
                (None, Some(pattern)) => Ok(ExtractionRule::SelectorWithRegex {
                    selector,
                    pattern,
                    group: group.unwrap_or(1),
                }),
                (None, None) => {
                    if group.is_some() {
                        return Err(format!(
                            "rule for '{selector}' sets a capture group without a regex"
                        ));
                    }
                    Ok(ExtractionRule::SelectorOnly { selector })
                }
            },
        }
    }
}

impl From<ExtractionRule> for RawRule {
    fn from(rule: ExtractionRule) -> Self {
        match rule {
            ExtractionRule::SelectorOnly { selector } => RawRule::Bare(selector),
            ExtractionRule::SelectorWithAttribute {
                selector,
                attribute,
            } => RawRule::Full {
                selector,
                attribute: Some(attribute),
                regex: None,
                group: None,
            },
            ExtractionRule::SelectorWithRegex {
                selector,
                pattern,
                group,
            } => RawRule::Full {
                selector,
                attribute: None,
                regex: Some(pattern),
                group: Some(group),
            },
        }
    }
}

/// How an extracted string is typed after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Price,
    Ean,
    Url,
    Integer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(alias = "selectors")]
    pub rules: Vec<ExtractionRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Calls allowed per window.
    pub rate: u32,
    /// Window length in seconds.
    pub per_secs: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: 2,
            per_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierConfig {
    #[serde(alias = "supplier_id")]
    pub id: String,
    /// ISO 4217 code the supplier prices in.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Selector for one product node on a listing page. When absent the
    /// whole document is treated as a single product.
    #[serde(default)]
    pub item_selector: Option<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
    #[serde(alias = "field_mappings")]
    pub fields: BTreeMap<String, FieldSpec>,
}

fn default_currency() -> String {
    "GBP".to_string()
}

/// Longest accepted rate-limit window: one day.
pub const MAX_RATE_WINDOW_SECS: f64 = 86_400.0;

/// Fields every supplier must define because the product record needs them.
pub const MANDATORY_FIELDS: &[&str] = &["title", "price"];

#[derive(Debug, Clone, Deserialize)]
pub struct SuppliersFile {
    pub suppliers: Vec<SupplierConfig>,
}

impl SuppliersFile {
    #[must_use]
    pub fn get(&self, supplier_id: &str) -> Option<&SupplierConfig> {
        self.suppliers.iter().find(|s| s.id == supplier_id)
    }
}

/// Load and validate the supplier extraction configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_suppliers(path: &Path) -> Result<SuppliersFile, ConfigError> {
    let file: SuppliersFile = crate::read_yaml(path)?;
    validate_suppliers(&file)?;
    Ok(file)
}

pub(crate) fn validate_suppliers(file: &SuppliersFile) -> Result<(), ConfigError> {
    let mut seen_ids = HashSet::new();

    for supplier in &file.suppliers {
        if supplier.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "supplier id must be non-empty".to_string(),
            ));
        }
        if !seen_ids.insert(supplier.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate supplier id: '{}'",
                supplier.id
            )));
        }
        validate_supplier(supplier)?;
    }

    Ok(())
}

fn validate_supplier(supplier: &SupplierConfig) -> Result<(), ConfigError> {
    let id = &supplier.id;

    if supplier.currency.len() != 3 || !supplier.currency.chars().all(|c| c.is_ascii_uppercase())
    {
        return Err(ConfigError::Validation(format!(
            "supplier '{id}' has invalid currency '{}'; expected an ISO 4217 code",
            supplier.currency
        )));
    }

    let limit = supplier.rate_limit;
    if limit.rate == 0 || !limit.per_secs.is_finite() || limit.per_secs <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "supplier '{id}' rate limit must allow at least one call per positive window"
        )));
    }
    if limit.per_secs > MAX_RATE_WINDOW_SECS {
        return Err(ConfigError::Validation(format!(
            "supplier '{id}' rate limit window of {}s exceeds the {MAX_RATE_WINDOW_SECS}s maximum",
            limit.per_secs
        )));
    }

    for field in MANDATORY_FIELDS {
        match supplier.fields.get(*field) {
            None => {
                return Err(ConfigError::Validation(format!(
                    "supplier '{id}' does not define mandatory field '{field}'"
                )));
            }
            Some(spec) if !spec.required => {
                return Err(ConfigError::Validation(format!(
                    "supplier '{id}' field '{field}' must be marked required"
                )));
            }
            Some(_) => {}
        }
    }

    for (name, spec) in &supplier.fields {
        if spec.rules.is_empty() {
            return Err(ConfigError::Validation(format!(
                "supplier '{id}' field '{name}' has no extraction rules"
            )));
        }
        for rule in &spec.rules {
            if rule.selector().trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "supplier '{id}' field '{name}' has an empty selector"
                )));
            }
            if let ExtractionRule::SelectorWithRegex { pattern, group, .. } = rule {
                let re = Regex::new(pattern).map_err(|e| {
                    ConfigError::Validation(format!(
                        "supplier '{id}' field '{name}' has invalid regex '{pattern}': {e}"
                    ))
                })?;
                if *group >= re.captures_len() {
                    return Err(ConfigError::Validation(format!(
                        "supplier '{id}' field '{name}' regex '{pattern}' has no group {group}"
                    )));
                }
            }
        }
    }

    let mut seen_categories = HashSet::new();
    for category in &supplier.categories {
        if category.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "supplier '{id}' has a category with an empty name"
            )));
        }
        if !seen_categories.insert(category.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "supplier '{id}' has duplicate category '{}'",
                category.name
            )));
        }
        if category.urls.is_empty() {
            return Err(ConfigError::Validation(format!(
                "supplier '{id}' category '{}' lists no URLs",
                category.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "suppliers_test.rs"]
mod tests;
