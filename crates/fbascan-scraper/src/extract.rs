//! Configuration-driven field extraction.
//!
//! A [`FieldExtractor`] is compiled once per supplier from its
//! [`SupplierConfig`]. For each field it walks the rule chain left to right
//! and keeps the first rule that yields a non-blank value. Each rule looks
//! only at the first node its selector matches within the item. Extraction
//! is synchronous and returns owned data, so the parsed DOM never crosses an
//! await point.

use std::collections::BTreeMap;

use fbascan_core::{ExtractionRule, FieldKind, SupplierConfig, SupplierProduct};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::error::{ExtractError, ValidationError};
use crate::parse::{type_value, TypedValue};

/// Raw field values of one item, `None` where no rule matched.
pub type RawRecord = BTreeMap<String, Option<String>>;

enum CompiledRule {
    Text {
        selector: Selector,
    },
    Attribute {
        selector: Selector,
        attribute: String,
    },
    Regex {
        selector: Selector,
        regex: Regex,
        group: usize,
    },
}

impl CompiledRule {
    fn apply(&self, scope: ElementRef<'_>) -> Option<String> {
        let value = match self {
            CompiledRule::Text { selector } => node_text(scope.select(selector).next()?),
            CompiledRule::Attribute {
                selector,
                attribute,
            } => scope
                .select(selector)
                .next()?
                .value()
                .attr(attribute)?
                .trim()
                .to_owned(),
            CompiledRule::Regex {
                selector,
                regex,
                group,
            } => {
                let text = node_text(scope.select(selector).next()?);
                regex
                    .captures(&text)?
                    .get(*group)?
                    .as_str()
                    .trim()
                    .to_owned()
            }
        };
        (!value.is_empty()).then_some(value)
    }
}

struct CompiledField {
    name: String,
    kind: FieldKind,
    required: bool,
    rules: Vec<CompiledRule>,
}

/// A listing item passed through without field extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnparsedItem {
    pub supplier_id: String,
    pub page_url: String,
    pub category: Option<String>,
    /// Whitespace-collapsed text content.
    pub text: String,
    /// Outer HTML of the item node.
    pub html: String,
    /// Always `true`; marks the record as not run through the extractor.
    pub unparsed: bool,
}

/// Products extracted from one document plus the items that were dropped.
#[derive(Debug, Default)]
pub struct Extraction {
    pub products: Vec<SupplierProduct>,
    pub rejected: Vec<ValidationError>,
}

pub struct FieldExtractor {
    supplier_id: String,
    currency: String,
    item_selector: Option<Selector>,
    fields: Vec<CompiledField>,
}

impl std::fmt::Debug for FieldExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldExtractor")
            .field("supplier_id", &self.supplier_id)
            .field(
                "fields",
                &self.fields.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl FieldExtractor {
    /// Compiles every selector and regex in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] naming the first selector or pattern that
    /// does not compile.
    pub fn new(config: &SupplierConfig) -> Result<Self, ExtractError> {
        let item_selector = config
            .item_selector
            .as_deref()
            .map(|s| {
                Selector::parse(s).map_err(|e| ExtractError::InvalidItemSelector {
                    supplier: config.id.clone(),
                    selector: s.to_owned(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let mut fields = Vec::with_capacity(config.fields.len());
        for (name, spec) in &config.fields {
            let rules = spec
                .rules
                .iter()
                .map(|rule| compile_rule(&config.id, name, rule))
                .collect::<Result<Vec<_>, _>>()?;
            fields.push(CompiledField {
                name: name.clone(),
                kind: semantic_kind(name, spec.kind),
                required: spec.required,
                rules,
            });
        }

        Ok(Self {
            supplier_id: config.id.clone(),
            currency: config.currency.clone(),
            item_selector,
            fields,
        })
    }

    #[must_use]
    pub fn supplier_id(&self) -> &str {
        &self.supplier_id
    }

    /// Evaluates every field's rule chain within `item`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingRequired`] for the first required
    /// field no rule matched.
    pub fn extract_fields(&self, item: ElementRef<'_>) -> Result<RawRecord, ValidationError> {
        let mut record = RawRecord::new();
        for field in &self.fields {
            let value = field.rules.iter().find_map(|rule| rule.apply(item));
            if value.is_none() && field.required {
                return Err(ValidationError::MissingRequired {
                    field: field.name.clone(),
                });
            }
            record.insert(field.name.clone(), value);
        }
        Ok(record)
    }

    /// Types a raw record and builds the product.
    ///
    /// `title` and `price` become the product's title and price, `ean` and
    /// `url` its identifiers. A product without a `url` field falls back to
    /// `page_url` when the whole document is the item.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when a required field is missing or
    /// fails to type. Optional fields that fail to type become `None`.
    pub fn build_product(
        &self,
        raw: RawRecord,
        page_url: &str,
        category: Option<&str>,
    ) -> Result<SupplierProduct, ValidationError> {
        let mut typed: BTreeMap<&str, TypedValue> = BTreeMap::new();
        for field in &self.fields {
            let Some(value) = raw.get(&field.name).and_then(Option::as_deref) else {
                continue;
            };
            match type_value(field.kind, value, page_url) {
                Some(v) => {
                    typed.insert(field.name.as_str(), v);
                }
                None if field.required => {
                    return Err(ValidationError::InvalidValue {
                        field: field.name.clone(),
                        kind: field.kind,
                        value: value.to_owned(),
                    });
                }
                None => {
                    tracing::debug!(
                        supplier = %self.supplier_id,
                        field = %field.name,
                        value,
                        "optional field failed to type, dropping"
                    );
                }
            }
        }

        let title = match typed.remove("title") {
            Some(TypedValue::Text(t)) => t,
            _ => return Err(missing("title")),
        };
        let price: Decimal = match typed.remove("price") {
            Some(TypedValue::Price(p)) => p,
            _ => return Err(missing("price")),
        };
        let ean = match typed.remove("ean") {
            Some(TypedValue::Ean(e)) => Some(e),
            _ => None,
        };
        let url = match typed.remove("url") {
            Some(TypedValue::Url(u)) => Some(u),
            _ if self.item_selector.is_none() => Some(page_url.to_owned()),
            _ => None,
        };

        Ok(SupplierProduct {
            supplier_id: self.supplier_id.clone(),
            category: category.map(str::to_owned),
            title,
            price,
            currency: self.currency.clone(),
            ean,
            url,
            raw_fields: raw,
        })
    }

    /// Extracts every item in `html`. Rejected items are logged and
    /// returned alongside the products; they never abort the document.
    #[must_use]
    pub fn extract_document(&self, html: &str, page_url: &str, category: Option<&str>) -> Extraction {
        let document = Html::parse_document(html);
        let mut extraction = Extraction::default();

        for item in self.items(&document) {
            let result = self
                .extract_fields(item)
                .and_then(|raw| self.build_product(raw, page_url, category));
            match result {
                Ok(product) => extraction.products.push(product),
                Err(e) => {
                    tracing::warn!(
                        supplier = %self.supplier_id,
                        page_url,
                        field = e.field(),
                        reason = %e,
                        "record rejected"
                    );
                    extraction.rejected.push(e);
                }
            }
        }

        extraction
    }

    /// Returns each item node in `html` without running any field rules.
    #[must_use]
    pub fn extract_unparsed(
        &self,
        html: &str,
        page_url: &str,
        category: Option<&str>,
    ) -> Vec<UnparsedItem> {
        let document = Html::parse_document(html);
        self.items(&document)
            .map(|item| UnparsedItem {
                supplier_id: self.supplier_id.clone(),
                page_url: page_url.to_owned(),
                category: category.map(str::to_owned),
                text: node_text(item),
                html: item.html(),
                unparsed: true,
            })
            .collect()
    }

    fn items<'a>(&'a self, document: &'a Html) -> Box<dyn Iterator<Item = ElementRef<'a>> + 'a> {
        match &self.item_selector {
            Some(selector) => Box::new(document.select(selector)),
            None => Box::new(std::iter::once(document.root_element())),
        }
    }
}

fn missing(field: &str) -> ValidationError {
    ValidationError::MissingRequired {
        field: field.to_owned(),
    }
}

/// Fields with a fixed meaning on the product are always typed that way.
fn semantic_kind(name: &str, configured: FieldKind) -> FieldKind {
    match name {
        "price" => FieldKind::Price,
        "ean" => FieldKind::Ean,
        "url" => FieldKind::Url,
        "title" => FieldKind::Text,
        _ => configured,
    }
}

fn node_text(node: ElementRef<'_>) -> String {
    node.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn compile_rule(supplier: &str, field: &str, rule: &ExtractionRule) -> Result<CompiledRule, ExtractError> {
    let selector = Selector::parse(rule.selector()).map_err(|e| ExtractError::InvalidSelector {
        supplier: supplier.to_owned(),
        field: field.to_owned(),
        selector: rule.selector().to_owned(),
        reason: e.to_string(),
    })?;

    Ok(match rule {
        ExtractionRule::SelectorOnly { .. } => CompiledRule::Text { selector },
        ExtractionRule::SelectorWithAttribute { attribute, .. } => CompiledRule::Attribute {
            selector,
            attribute: attribute.clone(),
        },
        ExtractionRule::SelectorWithRegex { pattern, group, .. } => CompiledRule::Regex {
            selector,
            regex: Regex::new(pattern).map_err(|source| ExtractError::InvalidRegex {
                supplier: supplier.to_owned(),
                field: field.to_owned(),
                source,
            })?,
            group: *group,
        },
    })
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
