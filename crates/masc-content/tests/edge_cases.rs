//! Edge case tests for masc-content
//!
//! JSON grammar corners, round trips, XML error reporting, fragment splitting.

use masc_content::*;
use proptest::prelude::*;

// ============================================================================
// JSON
// ============================================================================

#[test]
fn test_missing_member_value() {
    let err = parse_json(r#"{"a":}"#).unwrap_err();
    assert_eq!(err.token, "}");
    assert_eq!(err.remaining, "}");
    assert_eq!(err.offset, 5);
}

#[test]
fn test_member_value_parsed() {
    let value = parse_json(r#"{"a":1}"#).unwrap();
    assert_eq!(value, JsonValue::Object(vec![("a".into(), JsonValue::Number(1.0))]));
}

#[test]
fn test_literals_are_case_sensitive() {
    assert!(parse_json("True").is_err());
    assert!(parse_json("NULL").is_err());
    assert_eq!(parse_json(" false ").unwrap(), JsonValue::Bool(false));
}

#[test]
fn test_trailing_garbage_rejected() {
    assert!(parse_json("[1,2] x").is_err());
    assert!(parse_json("[1,2,]").is_err());
}

#[test]
fn test_escapes() {
    let value = parse_json(r#""a\/b\tA\"""#).unwrap();
    assert_eq!(value.as_str(), Some("a/b\tA\""));
}

#[test]
fn test_undefined_members_skipped() {
    let value = JsonValue::Object(vec![
        ("keep".into(), JsonValue::from(1)),
        ("drop".into(), JsonValue::Undefined),
        (
            "list".into(),
            JsonValue::Array(vec![JsonValue::Undefined, JsonValue::Null]),
        ),
    ]);

    assert_eq!(serialize_json(&value), r#"{"keep":1,"list":[null]}"#);
    assert_eq!(serialize_json(&JsonValue::Undefined), "null");
}

#[test]
fn test_non_finite_numbers_become_null() {
    let value = JsonValue::Array(vec![f64::NAN.into(), f64::INFINITY.into()]);
    assert_eq!(serialize_json(&value), "[null,null]");
}

#[test]
fn test_trusted_path_keeps_key_order() {
    let value = parse_json_trusted(r#"{"z":1,"a":2,"m":3}"#).unwrap();
    let keys: Vec<&str> = value
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, _)| k.as_str())
        .collect();
    assert_eq!(keys, ["z", "a", "m"]);
}

#[test]
fn test_trusted_path_error_is_json_syntax_error() {
    let err: ContentError = parse_json_trusted("[1, }").unwrap_err().into();
    assert!(matches!(err, ContentError::Json(_)));
}

#[test]
fn test_deep_nesting_rejected() {
    let text = "[".repeat(10_000);
    assert!(parse_json(&text).is_err());
}

fn json_value() -> impl Strategy<Value = JsonValue> {
    let leaf = prop_oneof![
        Just(JsonValue::Null),
        any::<bool>().prop_map(JsonValue::Bool),
        any::<f64>()
            .prop_filter("finite", |n| n.is_finite())
            .prop_map(JsonValue::Number),
        any::<String>().prop_map(JsonValue::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(JsonValue::Array),
            prop::collection::vec(("[a-z]{0,6}", inner), 0..6).prop_map(JsonValue::Object),
        ]
    })
}

proptest! {
    #[test]
    fn prop_json_round_trip(value in json_value()) {
        let text = serialize_json(&value);
        prop_assert_eq!(parse_json(&text).unwrap(), value);
    }
}

// ============================================================================
// XML
// ============================================================================

#[test]
fn test_xml_two_roots() {
    let err = parse_xml("<a/><b/>").unwrap_err();
    assert!(err.description.contains("<b>"));
}

#[test]
fn test_xml_cdata_and_comments_kept() {
    let doc = parse_xml("<?xml version=\"1.0\"?><r><!-- c --><![CDATA[<raw>]]></r>").unwrap();

    assert_eq!(doc.declaration.as_deref(), Some("xml version=\"1.0\""));
    assert_eq!(doc.root.text(), "<raw>");
    assert_eq!(
        serialize_xml(&doc),
        "<?xml version=\"1.0\"?><r><!-- c --><![CDATA[<raw>]]></r>"
    );
}

#[test]
fn test_xml_error_converts_to_content_error() {
    let err: ContentError = parse_xml("<a>").unwrap_err().into();
    assert!(matches!(err, ContentError::Xml(_)));
}

// ============================================================================
// HTML AND CSS
// ============================================================================

#[test]
fn test_script_without_close_stays_in_html() {
    let fragment = split_html_scripts("<p>x</p><script>never closed");
    assert_eq!(fragment.html, "<p>x</p><script>never closed");
    assert!(fragment.scripts.is_empty());
}

#[test]
fn test_external_and_inline_accessors() {
    let fragment =
        split_html_scripts("<script src=a.js></script><script>one()</script><script src=b.js></script>");

    assert_eq!(fragment.external_sources().collect::<Vec<_>>(), ["a.js", "b.js"]);
    assert_eq!(fragment.inline_bodies().collect::<Vec<_>>(), ["one()"]);
}

#[test]
fn test_stylesheet_without_references_unchanged() {
    let css = "p { color: red; }";
    let rewrite = rewrite_stylesheet(css, |r| r.to_string());

    assert_eq!(rewrite.css, css);
    assert!(rewrite.imports.is_empty());
    assert!(rewrite.assets.is_empty());
}

#[test]
fn test_rules_from_rewritten_sheet() {
    let rewrite = rewrite_stylesheet(
        "@import \"base.css\";\n.logo { background: url(logo.png) }",
        |r| format!("http://cdn.test/{r}"),
    );
    let rules = split_css_rules(&rewrite.css);

    assert_eq!(rewrite.imports, ["http://cdn.test/base.css"]);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].selector, ".logo");
    assert_eq!(rules[0].declarations, "background: url(http://cdn.test/logo.png)");
}

#[test]
fn test_unbalanced_braces_do_not_panic() {
    assert!(split_css_rules("}} a { b").is_empty());
}
