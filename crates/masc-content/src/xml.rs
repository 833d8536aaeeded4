//! XML
//!
//! Owned document tree built with quick-xml, plus a serializer.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// Root element name some producers use to report a failed parse in-band.
const PARSE_ERROR_ROOT: &str = "parsererror";

/// Malformed XML, or an in-band error document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("XML parse error: {description}")]
pub struct XmlParseError {
    pub description: String,
}

impl XmlParseError {
    fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    fn at(position: u64, err: impl std::fmt::Display) -> Self {
        Self::new(format!("{err} (at byte {position})"))
    }
}

/// A parsed XML document
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    /// Declaration body without `<?`/`?>`, e.g. `xml version="1.0"`
    pub declaration: Option<String>,
    pub root: XmlElement,
}

/// An element with attributes in source order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

impl XmlElement {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Attribute value by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements, skipping text and comments
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// First descendant element named `name` (depth-first)
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in self.elements() {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated text and CDATA of all descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.collect_text(out),
                XmlNode::Text(text) | XmlNode::CData(text) => out.push_str(text),
                XmlNode::Comment(_) => {}
            }
        }
    }
}

/// Parse `text` into a document.
///
/// Reader errors, mismatched or unclosed tags, a missing or repeated root,
/// stray text outside the root, and `<parsererror>` documents all come back
/// as [`XmlParseError`].
pub fn parse_xml(text: &str) -> Result<XmlDocument, XmlParseError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut declaration = None;
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => return Err(XmlParseError::at(reader.error_position() as u64, err)),
        };

        match event {
            Event::Decl(decl) => {
                declaration = Some(String::from_utf8_lossy(&decl).into_owned());
            }
            Event::Start(start) => {
                stack.push(element_from(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from(&start)?;
                close_element(&mut stack, &mut root, element)?;
            }
            Event::End(_) => match stack.pop() {
                Some(element) => close_element(&mut stack, &mut root, element)?,
                None => return Err(XmlParseError::new("closing tag without an open element")),
            },
            Event::Text(raw) => {
                let content = raw
                    .unescape()
                    .map_err(|err| XmlParseError::at(reader.buffer_position() as u64, err))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Text(content.into_owned())),
                    None if content.trim().is_empty() => {}
                    None => return Err(XmlParseError::new("text outside the root element")),
                }
            }
            Event::CData(data) => {
                let content = String::from_utf8_lossy(&data.into_inner()).into_owned();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::CData(content)),
                    None => return Err(XmlParseError::new("CDATA outside the root element")),
                }
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    let content = String::from_utf8_lossy(&comment).into_owned();
                    parent.children.push(XmlNode::Comment(content));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlParseError::new(format!("unclosed element <{}>", open.name)));
    }
    let Some(root) = root else {
        return Err(XmlParseError::new("document has no root element"));
    };
    if root.name == PARSE_ERROR_ROOT {
        return Err(XmlParseError::new(root.text().trim()));
    }

    Ok(XmlDocument { declaration, root })
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, XmlParseError> {
    let mut element = XmlElement::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|err| XmlParseError::new(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlParseError::new(err.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn close_element(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlParseError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(XmlParseError::new(format!(
            "second root element <{}>",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

/// Render a document back to text
pub fn serialize_xml(document: &XmlDocument) -> String {
    let mut out = String::new();
    if let Some(declaration) = &document.declaration {
        out.push_str("<?");
        out.push_str(declaration);
        out.push_str("?>");
    }
    write_element(&document.root, &mut out);
    out
}

fn write_element(element: &XmlElement, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        match child {
            XmlNode::Element(el) => write_element(el, out),
            XmlNode::Text(text) => out.push_str(&escape(text.as_str())),
            XmlNode::CData(data) => {
                out.push_str("<![CDATA[");
                out.push_str(data);
                out.push_str("]]>");
            }
            XmlNode::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}
