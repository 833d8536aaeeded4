//! HTML fragments with embedded scripts
//!
//! Splits markup into the script-free HTML and the list of scripts it
//! carried, so the markup can be inserted and the scripts run afterwards.

use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::pattern;

static SCRIPT_END: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)</script\s*>"));
static SCRIPT_START: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)<script\b([^>]*)>"));
static SRC_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
});
static FUNCTION_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?m)^([ \t]*)function\s+([A-Za-z_$][\w$]*)\s*\(")
});

/// One `<script>` element pulled out of a fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    /// Raw attribute text of the opening tag
    pub attributes: String,
    /// Inline source with top-level function declarations (any
    /// indentation, outside braces) turned into assignments; empty for
    /// external scripts
    pub body: String,
    /// Value of the `src` attribute, if any
    pub src: Option<String>,
}

impl ScriptBlock {
    fn new(attributes: &str, body: &str) -> Self {
        let src = src_attribute(attributes);
        let body = match src {
            Some(_) => String::new(),
            None => rewrite_function_declarations(body),
        };
        Self {
            attributes: attributes.trim().to_string(),
            body,
            src,
        }
    }

    pub fn is_external(&self) -> bool {
        self.src.is_some()
    }
}

/// Markup with its scripts removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlFragment {
    pub html: String,
    /// Scripts in document order
    pub scripts: Vec<ScriptBlock>,
}

impl HtmlFragment {
    /// `src` values of the external scripts, in document order
    pub fn external_sources(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().filter_map(|s| s.src.as_deref())
    }

    /// Bodies of the inline scripts, in document order
    pub fn inline_bodies(&self) -> impl Iterator<Item = &str> {
        self.scripts
            .iter()
            .filter(|s| !s.is_external())
            .map(|s| s.body.as_str())
    }
}

/// Split `html` on its script elements.
///
/// Every `</script>` (any case, optional whitespace before `>`) is paired
/// with the last `<script ...>` before it. A closing tag with no opening
/// tag is left in the HTML untouched.
pub fn split_html_scripts(html: &str) -> HtmlFragment {
    let mut fragment = HtmlFragment::default();
    let mut cursor = 0;

    for end in SCRIPT_END.find_iter(html) {
        let Ok(end) = end else {
            break;
        };
        let piece = &html[cursor..end.start()];
        match last_script_open(piece) {
            Some((open_start, attributes, body_start)) => {
                fragment.html.push_str(&piece[..open_start]);
                fragment
                    .scripts
                    .push(ScriptBlock::new(attributes, &piece[body_start..]));
            }
            None => {
                fragment.html.push_str(piece);
                fragment.html.push_str(end.as_str());
            }
        }
        cursor = end.end();
    }

    fragment.html.push_str(&html[cursor..]);
    fragment
}

/// Start of the last opening tag, its attribute text, and where its body begins
fn last_script_open(piece: &str) -> Option<(usize, &str, usize)> {
    let mut last = None;
    for captures in SCRIPT_START.captures_iter(piece) {
        let Ok(captures) = captures else {
            break;
        };
        if let Some(whole) = captures.get(0) {
            let attributes = captures.get(1).map_or("", |m| m.as_str());
            last = Some((whole.start(), attributes, whole.end()));
        }
    }
    last
}

fn src_attribute(attributes: &str) -> Option<String> {
    let captures = SRC_ATTRIBUTE.captures(attributes).ok()??;
    (1..=3)
        .find_map(|group| captures.get(group))
        .map(|m| m.as_str().to_string())
}

/// Line-leading `function name(` outside any braces becomes
/// `name = function(`. Brace depth is counted naively, so braces inside
/// strings or comments throw it off.
fn rewrite_function_declarations(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    let mut scanned = 0;
    let mut depth = 0usize;

    for captures in FUNCTION_DECLARATION.captures_iter(body) {
        let Ok(captures) = captures else {
            break;
        };
        let (Some(whole), Some(indent), Some(name)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        for byte in body[scanned..whole.start()].bytes() {
            match byte {
                b'{' => depth += 1,
                b'}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        scanned = whole.start();
        if depth > 0 {
            continue;
        }

        out.push_str(&body[last..whole.start()]);
        out.push_str(indent.as_str());
        out.push_str(name.as_str());
        out.push_str(" = function(");
        last = whole.end();
    }

    out.push_str(&body[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_and_external() {
        let fragment = split_html_scripts(
            r#"<p>a</p><script src="/js/x.js">ignored()</script><b>b</b><script>run();</script>"#,
        );

        assert_eq!(fragment.html, "<p>a</p><b>b</b>");
        assert_eq!(fragment.scripts.len(), 2);
        assert_eq!(fragment.scripts[0].src.as_deref(), Some("/js/x.js"));
        assert_eq!(fragment.scripts[0].body, "");
        assert_eq!(fragment.scripts[1].body, "run();");
    }

    #[test]
    fn test_close_tag_case_and_whitespace() {
        let fragment = split_html_scripts("<SCRIPT type=\"text/javascript\">go()</Script  >tail");

        assert_eq!(fragment.html, "tail");
        assert_eq!(fragment.scripts[0].attributes, "type=\"text/javascript\"");
        assert_eq!(fragment.scripts[0].body, "go()");
    }

    #[test]
    fn test_unmatched_close_tag_folded_back() {
        let fragment = split_html_scripts("<div>x</script></div>");
        assert_eq!(fragment.html, "<div>x</script></div>");
        assert!(fragment.scripts.is_empty());
    }

    #[test]
    fn test_function_declarations_rewritten() {
        let fragment = split_html_scripts(
            "<script>\nfunction init(a, b) {\n  function inner() {}\n}\nvar f = function(){};\n</script>",
        );

        assert_eq!(
            fragment.scripts[0].body,
            "\ninit = function(a, b) {\n  function inner() {}\n}\nvar f = function(){};\n"
        );
    }

    #[test]
    fn test_indented_top_level_declaration_rewritten() {
        let fragment = split_html_scripts(
            "<script>\n    function setup() {\n        function helper() {}\n    }\n    function run() {}\n</script>",
        );

        assert_eq!(
            fragment.scripts[0].body,
            "\n    setup = function() {\n        function helper() {}\n    }\n    run = function() {}\n"
        );
    }

    #[test]
    fn test_src_quote_styles() {
        assert_eq!(src_attribute("src='a.js'").as_deref(), Some("a.js"));
        assert_eq!(src_attribute("defer SRC=b.js").as_deref(), Some("b.js"));
        assert_eq!(src_attribute("data-src-x=\"no\""), None);
    }
}
