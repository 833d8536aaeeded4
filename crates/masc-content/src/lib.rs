//! Masc Content
//!
//! Stateless parsers and serializers for fetched resources:
//! JSON, XML, HTML fragments with scripts, and stylesheets.

pub mod css;
pub mod html;
pub mod json;
pub mod xml;

pub use css::{CssRule, StylesheetRewrite, rewrite_stylesheet, split_css_rules};
pub use html::{HtmlFragment, ScriptBlock, split_html_scripts};
pub use json::{JsonSyntaxError, JsonValue, parse_json, parse_json_trusted, serialize_json};
pub use xml::{XmlDocument, XmlElement, XmlNode, XmlParseError, parse_xml, serialize_xml};

/// Any content parsing failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContentError {
    #[error(transparent)]
    Json(#[from] JsonSyntaxError),

    #[error(transparent)]
    Xml(#[from] XmlParseError),
}

/// Compile a pattern known at build time.
///
/// The patterns in this crate are literals covered by tests, so a failure
/// here is a programming error.
pub(crate) fn pattern(source: &str) -> fancy_regex::Regex {
    match fancy_regex::Regex::new(source) {
        Ok(regex) => regex,
        Err(err) => panic!("invalid built-in pattern {source:?}: {err}"),
    }
}
