//! JSON
//!
//! Recursive-descent parser and serializer. Objects keep their members in
//! source order. [`parse_json_trusted`] is an opt-in fast path for input
//! that is known to be well formed.

use std::fmt::{self, Write as _};

/// Nesting deeper than this is rejected instead of exhausting the stack.
const MAX_DEPTH: usize = 512;

/// A parsed or to-be-serialized JSON value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JsonValue {
    /// Absent value. Dropped from arrays and objects when serializing.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsonValue>),
    /// Members in insertion order. Duplicate keys are kept as written.
    Object(Vec<(String, JsonValue)>),
}

impl JsonValue {
    /// Look up an object member; the last duplicate wins
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(members) => members.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Array element by index
    pub fn index(&self, index: usize) -> Option<&JsonValue> {
        match self {
            JsonValue::Array(items) => items.get(index),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsonValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            JsonValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, JsonValue)]> {
        match self {
            JsonValue::Object(members) => Some(members),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, JsonValue::Undefined)
    }
}

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize_json(self))
    }
}

impl From<bool> for JsonValue {
    fn from(value: bool) -> Self {
        JsonValue::Bool(value)
    }
}

impl From<f64> for JsonValue {
    fn from(value: f64) -> Self {
        JsonValue::Number(value)
    }
}

impl From<i32> for JsonValue {
    fn from(value: i32) -> Self {
        JsonValue::Number(f64::from(value))
    }
}

impl From<&str> for JsonValue {
    fn from(value: &str) -> Self {
        JsonValue::String(value.to_string())
    }
}

impl From<String> for JsonValue {
    fn from(value: String) -> Self {
        JsonValue::String(value)
    }
}

impl From<Vec<JsonValue>> for JsonValue {
    fn from(value: Vec<JsonValue>) -> Self {
        JsonValue::Array(value)
    }
}

impl From<serde_json::Value> for JsonValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(b),
            Value::Number(n) => JsonValue::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) => JsonValue::String(s),
            Value::Array(items) => JsonValue::Array(items.into_iter().map(JsonValue::from).collect()),
            Value::Object(map) => JsonValue::Object(
                map.into_iter().map(|(k, v)| (k, JsonValue::from(v))).collect(),
            ),
        }
    }
}

/// Malformed JSON input
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("JSON syntax error at offset {offset}: expected {expected}, found {token}")]
pub struct JsonSyntaxError {
    /// The token the parser stopped at
    pub token: String,
    /// Unparsed input from the offending token on
    pub remaining: String,
    /// Byte offset of the offending token
    pub offset: usize,
    /// What the grammar allowed at that point
    pub expected: String,
}

/// Parse `text` with the strict recursive-descent parser
pub fn parse_json(text: &str) -> Result<JsonValue, JsonSyntaxError> {
    let mut parser = Parser { src: text, pos: 0 };
    let value = parser.parse_value(0)?;
    parser.skip_whitespace();
    if parser.pos < text.len() {
        return Err(parser.error("end of input"));
    }
    Ok(value)
}

/// Parse trusted input through serde_json.
///
/// Faster than [`parse_json`] but reports errors with less context. Only
/// use it for input produced by a known-good serializer.
pub fn parse_json_trusted(text: &str) -> Result<JsonValue, JsonSyntaxError> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(JsonValue::from)
        .map_err(|err| {
            let offset = line_column_offset(text, err.line(), err.column());
            JsonSyntaxError {
                token: next_token(&text[offset..]),
                remaining: text[offset..].to_string(),
                offset,
                expected: err.to_string(),
            }
        })
}

/// Render `value` as compact JSON text
pub fn serialize_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Undefined | JsonValue::Null => out.push_str("null"),
        JsonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        JsonValue::Number(n) => write_number(*n, out),
        JsonValue::String(s) => write_string(s, out),
        JsonValue::Array(items) => {
            out.push('[');
            let mut first = true;
            for item in items.iter().filter(|item| !item.is_undefined()) {
                if !first {
                    out.push(',');
                }
                first = false;
                write_value(item, out);
            }
            out.push(']');
        }
        JsonValue::Object(members) => {
            out.push('{');
            let mut first = true;
            for (key, member) in members.iter().filter(|(_, v)| !v.is_undefined()) {
                if !first {
                    out.push(',');
                }
                first = false;
                write_string(key, out);
                out.push(':');
                write_value(member, out);
            }
            out.push('}');
        }
    }
}

fn write_number(n: f64, out: &mut String) {
    if !n.is_finite() {
        out.push_str("null");
    } else if n == 0.0 {
        // Covers -0.0 as well.
        out.push('0');
    } else {
        let _ = write!(out, "{n}");
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn error(&self, expected: &str) -> JsonSyntaxError {
        JsonSyntaxError {
            token: next_token(self.rest()),
            remaining: self.rest().to_string(),
            offset: self.pos,
            expected: expected.to_string(),
        }
    }

    fn expect(&mut self, byte: u8, expected: &str) -> Result<(), JsonSyntaxError> {
        self.skip_whitespace();
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<JsonValue, JsonSyntaxError> {
        self.skip_whitespace();
        if depth > MAX_DEPTH {
            return Err(self.error("shallower nesting"));
        }
        match self.peek() {
            Some(b'{') => self.parse_object(depth),
            Some(b'[') => self.parse_array(depth),
            Some(b'"') => self.parse_string().map(JsonValue::String),
            Some(b't') => self.parse_literal("true", JsonValue::Bool(true)),
            Some(b'f') => self.parse_literal("false", JsonValue::Bool(false)),
            Some(b'n') => self.parse_literal("null", JsonValue::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            _ => Err(self.error("a value")),
        }
    }

    fn parse_literal(&mut self, word: &str, value: JsonValue) -> Result<JsonValue, JsonSyntaxError> {
        if self.rest().starts_with(word) {
            self.pos += word.len();
            Ok(value)
        } else {
            Err(self.error(word))
        }
    }

    fn parse_object(&mut self, depth: usize) -> Result<JsonValue, JsonSyntaxError> {
        self.pos += 1;
        let mut members = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(JsonValue::Object(members));
        }

        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(self.error("a string key"));
            }
            let key = self.parse_string()?;
            self.expect(b':', "':'")?;
            let value = self.parse_value(depth + 1)?;
            members.push((key, value));

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(JsonValue::Object(members));
                }
                _ => return Err(self.error("',' or '}'")),
            }
        }
    }

    fn parse_array(&mut self, depth: usize) -> Result<JsonValue, JsonSyntaxError> {
        self.pos += 1;
        let mut items = Vec::new();

        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(JsonValue::Array(items));
        }

        loop {
            items.push(self.parse_value(depth + 1)?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    return Ok(JsonValue::Array(items));
                }
                _ => return Err(self.error("',' or ']'")),
            }
        }
    }

    fn parse_string(&mut self) -> Result<String, JsonSyntaxError> {
        self.pos += 1;
        let mut out = String::new();

        loop {
            let Some(ch) = self.rest().chars().next() else {
                return Err(self.error("a closing quote"));
            };
            match ch {
                '"' => {
                    self.pos += 1;
                    return Ok(out);
                }
                '\\' => {
                    let escape_start = self.pos;
                    self.pos += 1;
                    let Some(escaped) = self.rest().chars().next() else {
                        return Err(self.error("an escape sequence"));
                    };
                    self.pos += escaped.len_utf8();
                    match escaped {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => out.push(self.parse_unicode_escape()?),
                        _ => {
                            self.pos = escape_start;
                            return Err(self.error("a valid escape sequence"));
                        }
                    }
                }
                c if (c as u32) < 0x20 => return Err(self.error("an escaped control character")),
                c => {
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    /// Called after `\u`. Combines surrogate pairs; a lone surrogate
    /// becomes U+FFFD.
    fn parse_unicode_escape(&mut self) -> Result<char, JsonSyntaxError> {
        let high = self.parse_hex4()?;
        if (0xD800..0xDC00).contains(&high) && self.rest().starts_with("\\u") {
            let checkpoint = self.pos;
            self.pos += 2;
            let low = self.parse_hex4()?;
            if (0xDC00..0xE000).contains(&low) {
                let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                return Ok(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            self.pos = checkpoint;
        }
        Ok(char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    fn parse_hex4(&mut self) -> Result<u32, JsonSyntaxError> {
        let digits = self.rest().get(..4).filter(|d| d.bytes().all(|b| b.is_ascii_hexdigit()));
        match digits.and_then(|d| u32::from_str_radix(d, 16).ok()) {
            Some(code) => {
                self.pos += 4;
                Ok(code)
            }
            None => Err(self.error("four hex digits")),
        }
    }

    fn parse_number(&mut self) -> Result<JsonValue, JsonSyntaxError> {
        let start = self.pos;

        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => self.skip_digits(),
            _ => return Err(self.error("a digit")),
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.require_digits()?;
        }
        if let Some(b'e' | b'E') = self.peek() {
            self.pos += 1;
            if let Some(b'+' | b'-') = self.peek() {
                self.pos += 1;
            }
            self.require_digits()?;
        }

        let text = &self.src[start..self.pos];
        match text.parse::<f64>() {
            Ok(n) => Ok(JsonValue::Number(n)),
            Err(_) => {
                self.pos = start;
                Err(self.error("a number"))
            }
        }
    }

    fn skip_digits(&mut self) {
        while let Some(b'0'..=b'9') = self.peek() {
            self.pos += 1;
        }
    }

    fn require_digits(&mut self) -> Result<(), JsonSyntaxError> {
        match self.peek() {
            Some(b'0'..=b'9') => {
                self.skip_digits();
                Ok(())
            }
            _ => Err(self.error("a digit")),
        }
    }
}

/// The token starting at the beginning of `rest`, for error messages
fn next_token(rest: &str) -> String {
    let rest = rest.trim_start();
    let Some(first) = rest.chars().next() else {
        return "end of input".to_string();
    };
    if first.is_ascii_alphanumeric() || matches!(first, '-' | '+' | '.') {
        rest.chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.'))
            .collect()
    } else {
        first.to_string()
    }
}

fn line_column_offset(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    let offset = line_start + column.saturating_sub(1);
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object() {
        let value = parse_json(r#"{"a":1}"#).unwrap();
        assert_eq!(value, JsonValue::Object(vec![("a".into(), JsonValue::Number(1.0))]));
    }

    #[test]
    fn test_missing_member_value() {
        let err = parse_json(r#"{"a":}"#).unwrap_err();
        assert_eq!(err.token, "}");
        assert_eq!(err.remaining, "}");
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn test_literals_are_case_sensitive() {
        assert_eq!(parse_json("true").unwrap(), JsonValue::Bool(true));
        assert_eq!(parse_json("null").unwrap(), JsonValue::Null);
        assert!(parse_json("True").is_err());
        assert!(parse_json("NULL").is_err());
    }

    #[test]
    fn test_string_escapes() {
        let value = parse_json(r#""a\"b\\c\/d\b\f\n\r\tA""#).unwrap();
        assert_eq!(value.as_str(), Some("a\"b\\c/d\u{8}\u{c}\n\r\tA"));
    }

    #[test]
    fn test_surrogate_pair() {
        let value = parse_json(r#""\ud83d\ude00""#).unwrap();
        assert_eq!(value.as_str(), Some("\u{1F600}"));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_json("-0.5e2").unwrap(), JsonValue::Number(-50.0));
        assert!(parse_json("01").is_err());
        assert!(parse_json("1.").is_err());
        assert!(parse_json("-").is_err());
    }

    #[test]
    fn test_trailing_content_rejected() {
        let err = parse_json("[1] x").unwrap_err();
        assert_eq!(err.token, "x");
    }

    #[test]
    fn test_serialize_skips_undefined() {
        let value = JsonValue::Object(vec![
            ("keep".into(), JsonValue::Bool(true)),
            ("drop".into(), JsonValue::Undefined),
            ("list".into(), JsonValue::Array(vec![JsonValue::Undefined, JsonValue::Null])),
        ]);
        assert_eq!(serialize_json(&value), r#"{"keep":true,"list":[null]}"#);
    }

    #[test]
    fn test_serialize_numbers() {
        assert_eq!(serialize_json(&JsonValue::Number(1.0)), "1");
        assert_eq!(serialize_json(&JsonValue::Number(-0.0)), "0");
        assert_eq!(serialize_json(&JsonValue::Number(f64::NAN)), "null");
        assert_eq!(serialize_json(&JsonValue::Number(f64::INFINITY)), "null");
        assert_eq!(serialize_json(&JsonValue::Number(2.5)), "2.5");
    }

    #[test]
    fn test_serialize_escapes() {
        let value = JsonValue::String("q\"b\\n\n\u{1}".into());
        assert_eq!(serialize_json(&value), r#""q\"b\\n\n\u0001""#);
    }

    #[test]
    fn test_trusted_keeps_key_order() {
        let value = parse_json_trusted(r#"{"z":1,"a":2}"#).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_trusted_reports_offset() {
        let err = parse_json_trusted("{\"a\":\n}").unwrap_err();
        assert_eq!(err.token, "}");
    }
}
