use super::*;

const CLEARANCE_KING: &str = r#"
suppliers:
  - id: clearance-king
    currency: GBP
    item_selector: "li.product-item"
    rate_limit:
      rate: 2
      per_secs: 1.0
    categories:
      - name: household
        urls: ["https://supplier.test/household"]
    fields:
      title:
        type: text
        required: true
        rules: [".product-title", "a.product-item-link"]
      price:
        type: price
        required: true
        rules:
          - selector: ".price"
            attribute: data-value
          - selector: ".price"
            regex: '£([\d.]+)'
            group: 1
      ean:
        type: ean
        rules:
          - selector: ".product-item-details"
            regex: 'EAN:\s*(\d{8,14})'
"#;

fn parse(yaml: &str) -> SuppliersFile {
    serde_yaml::from_str(yaml).expect("valid yaml")
}

#[test]
fn parses_all_three_rule_variants() {
    let file = parse(CLEARANCE_KING);
    validate_suppliers(&file).unwrap();

    let supplier = file.get("clearance-king").unwrap();
    assert_eq!(supplier.currency, "GBP");
    assert_eq!(supplier.item_selector.as_deref(), Some("li.product-item"));

    let title = &supplier.fields["title"];
    assert_eq!(
        title.rules[0],
        ExtractionRule::SelectorOnly {
            selector: ".product-title".to_string()
        }
    );

    let price = &supplier.fields["price"];
    assert_eq!(price.kind, FieldKind::Price);
    assert_eq!(
        price.rules[0],
        ExtractionRule::SelectorWithAttribute {
            selector: ".price".to_string(),
            attribute: "data-value".to_string()
        }
    );
    assert_eq!(
        price.rules[1],
        ExtractionRule::SelectorWithRegex {
            selector: ".price".to_string(),
            pattern: r"£([\d.]+)".to_string(),
            group: 1
        }
    );

    assert!(!supplier.fields["ean"].required);
}

#[test]
fn legacy_key_names_are_accepted() {
    let file = parse(
        r#"
suppliers:
  - supplier_id: legacy
    field_mappings:
      title: { type: text, required: true, selectors: [".t"] }
      price:
        type: price
        required: true
        selectors:
          - selector: ".p"
            processing_regex: '([\d.]+)'
            regex_group: 1
"#,
    );
    validate_suppliers(&file).unwrap();
    let supplier = file.get("legacy").unwrap();
    assert!(matches!(
        supplier.fields["price"].rules[0],
        ExtractionRule::SelectorWithRegex { group: 1, .. }
    ));
}

#[test]
fn regex_group_defaults_to_one() {
    let rule: ExtractionRule =
        serde_yaml::from_str("{ selector: '.p', regex: '(\\d+)' }").unwrap();
    assert!(matches!(rule, ExtractionRule::SelectorWithRegex { group: 1, .. }));
}

#[test]
fn attribute_and_regex_together_are_rejected() {
    let result: Result<ExtractionRule, _> =
        serde_yaml::from_str("{ selector: '.p', attribute: href, regex: '(x)' }");
    assert!(result.is_err());
}

#[test]
fn group_without_regex_is_rejected() {
    let result: Result<ExtractionRule, _> = serde_yaml::from_str("{ selector: '.p', group: 2 }");
    assert!(result.is_err());
}

#[test]
fn invalid_regex_fails_validation() {
    let mut file = parse(CLEARANCE_KING);
    file.suppliers[0]
        .fields
        .get_mut("price")
        .unwrap()
        .rules
        .push(ExtractionRule::SelectorWithRegex {
            selector: ".price".to_string(),
            pattern: "([unclosed".to_string(),
            group: 1,
        });
    let err = validate_suppliers(&file).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("invalid regex")));
}

#[test]
fn missing_capture_group_fails_validation() {
    let mut file = parse(CLEARANCE_KING);
    file.suppliers[0]
        .fields
        .get_mut("price")
        .unwrap()
        .rules
        .push(ExtractionRule::SelectorWithRegex {
            selector: ".price".to_string(),
            pattern: r"£([\d.]+)".to_string(),
            group: 2,
        });
    let err = validate_suppliers(&file).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("no group 2")));
}

#[test]
fn missing_mandatory_field_fails_validation() {
    let mut file = parse(CLEARANCE_KING);
    file.suppliers[0].fields.remove("price");
    let err = validate_suppliers(&file).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("'price'")));
}

#[test]
fn optional_title_fails_validation() {
    let mut file = parse(CLEARANCE_KING);
    file.suppliers[0].fields.get_mut("title").unwrap().required = false;
    assert!(validate_suppliers(&file).is_err());
}

#[test]
fn duplicate_supplier_ids_fail_validation() {
    let mut file = parse(CLEARANCE_KING);
    let dup = file.suppliers[0].clone();
    file.suppliers.push(dup);
    let err = validate_suppliers(&file).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("duplicate supplier")));
}

#[test]
fn zero_rate_limit_fails_validation() {
    let mut file = parse(CLEARANCE_KING);
    file.suppliers[0].rate_limit.rate = 0;
    assert!(validate_suppliers(&file).is_err());
}

#[test]
fn oversized_rate_window_fails_validation() {
    let mut file = parse(CLEARANCE_KING);
    file.suppliers[0].rate_limit.per_secs = 1e30;
    let err = validate_suppliers(&file).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(ref msg) if msg.contains("exceeds")));

    file.suppliers[0].rate_limit.per_secs = MAX_RATE_WINDOW_SECS;
    assert!(validate_suppliers(&file).is_ok());
}

#[test]
fn lowercase_currency_fails_validation() {
    let mut file = parse(CLEARANCE_KING);
    file.suppliers[0].currency = "gbp".to_string();
    assert!(validate_suppliers(&file).is_err());
}

#[test]
fn empty_category_urls_fail_validation() {
    let mut file = parse(CLEARANCE_KING);
    file.suppliers[0].categories[0].urls.clear();
    assert!(validate_suppliers(&file).is_err());
}

#[test]
fn load_suppliers_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("suppliers.yaml");
    std::fs::write(&path, CLEARANCE_KING).unwrap();
    let file = load_suppliers(&path).unwrap();
    assert_eq!(file.suppliers.len(), 1);
}

#[test]
fn load_suppliers_parse_error_carries_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("suppliers.yaml");
    std::fs::write(&path, "suppliers: [ {").unwrap();
    let err = load_suppliers(&path).unwrap_err();
    assert!(matches!(err, ConfigError::FileParse { ref path, .. } if path.ends_with("suppliers.yaml")));
}
