//! Integration tests for rule files and writers

use std::io::Write;

use modelist::config::{ModelistConfig, RuleFile};
use modelist::serialization::NdjsonWriter;
use modelist::{Collection, EntityType, FieldValue};
use serde_json::json;
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_rule_file_formats_collection() {
    let rules = write_temp(
        "rules:\n\
         \x20 author:\n\
         \x20   literal: Thomas\n\
         \x20 city:\n\
         \x20   path: [address, city]\n\
         \x20 firstTag:\n\
         \x20   path: [tags, 0]\n",
    );
    let rules = RuleFile::load_from_file(rules.path()).unwrap().to_rule_set();

    let mut list = Collection::from_json(
        json!([
            {"name": "Tom", "address": {"city": "Oslo"}, "tags": ["a", "b"]},
            {"name": "Ana", "address": "unknown", "tags": []}
        ]),
        None,
    )
    .unwrap();
    list.format(Some(&rules), true);

    assert_eq!(list[0].get("author"), Some(&FieldValue::from("Thomas")));
    assert_eq!(list[0].get("city"), Some(&FieldValue::from("Oslo")));
    assert_eq!(list[0].get("firstTag"), Some(&FieldValue::from("a")));
    // `address` is a string on the second record, so the path falls back.
    assert_eq!(list[1].get("city"), Some(&FieldValue::Undefined));
    assert_eq!(list[1].get("firstTag"), Some(&FieldValue::Undefined));
    assert!(list.iter().all(|entity| entity.rules().contains_key("city")));
}

#[test]
fn test_type_rules_from_json_object() {
    let rules = modelist::RuleSet::from_json(&json!({
        "category": ["categoryId"],
        "author": "Thomas"
    }))
    .unwrap();
    let kind = EntityType::new("Album")
        .with_field("category", -1)
        .with_rules(&rules)
        .into_shared();

    let album = kind.create(json!({"categoryId": 8}));
    assert_eq!(album.to_json(), json!({"category": 8, "author": "Thomas"}));
}

#[test]
fn test_strict_flag_from_config() {
    let config = write_temp("strict: true\nlog_filter: info\n");
    let config = ModelistConfig::load_from_file(config.path()).unwrap();
    assert!(config.strict);

    let list = Collection::from_values_strict(vec![json!({"a": 1, "b": 2}), json!({"a": 3})], None).unwrap();
    assert_eq!(list.len(), 1);
    assert!(list.is_strict());
}

#[test]
fn test_ndjson_lines_per_element() {
    let list = Collection::from_json(json!([{"a": 1}, {"a": 2}]), None).unwrap();

    let mut buf = Vec::new();
    let mut writer = NdjsonWriter::new(&mut buf);
    writer.write_collection(&list).unwrap();
    writer.flush().unwrap();

    let output = String::from_utf8(buf).unwrap();
    assert_eq!(output, "{\"a\":1}\n{\"a\":2}\n");
}
