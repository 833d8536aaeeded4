//! Stylesheet URL rewriting and rule splitting
//!
//! Only basic token splitting: strings and escapes inside selectors or
//! values are not interpreted.

use std::sync::LazyLock;

use fancy_regex::Regex;

use crate::pattern;

static COMMENT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?s)/\*.*?\*/"));
static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"(?i)@import\s+(?:url\(\s*(['"]?)(.*?)\1\s*\)|(['"])(.*?)\3)[^;]*;?"#)
});
static URL_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r#"(?i)url\(\s*(['"]?)(.*?)\1\s*\)"#));

/// Result of [`rewrite_stylesheet`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StylesheetRewrite {
    /// The stylesheet with imports removed and references made absolute
    pub css: String,
    /// Imported stylesheets, resolved, in source order
    pub imports: Vec<String>,
    /// Other referenced assets (images, fonts), resolved, without duplicates
    pub assets: Vec<String>,
}

/// One top-level rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRule {
    /// Selector or at-rule prelude
    pub selector: String,
    /// Block contents without the braces
    pub declarations: String,
}

/// Remove `/* ... */` comments
pub fn strip_comments(css: &str) -> String {
    replace_matches(&COMMENT, css, |_| Some(String::new()))
}

/// Pull `@import`s out of `css` and make every `url(...)` absolute.
///
/// `resolve` maps a reference as written to its absolute form; it is
/// usually a closure over the stylesheet's own URL. `data:` URIs are left
/// alone.
pub fn rewrite_stylesheet<F>(css: &str, resolve: F) -> StylesheetRewrite
where
    F: Fn(&str) -> String,
{
    let mut rewrite = StylesheetRewrite::default();
    let css = strip_comments(css);

    let without_imports = replace_matches(&IMPORT, &css, |captures| {
        let target = captures
            .get(2)
            .or_else(|| captures.get(4))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        if !target.is_empty() {
            rewrite.imports.push(resolve(target));
        }
        Some(String::new())
    });

    rewrite.css = replace_matches(&URL_REFERENCE, &without_imports, |captures| {
        let quote = captures.get(1).map_or("", |m| m.as_str());
        let target = captures.get(2).map(|m| m.as_str().trim())?;
        if target.is_empty() || is_data_uri(target) {
            return None;
        }
        let absolute = resolve(target);
        if !rewrite.assets.contains(&absolute) {
            rewrite.assets.push(absolute.clone());
        }
        Some(format!("url({quote}{absolute}{quote})"))
    });

    rewrite
}

/// Split a stylesheet into its top-level rules.
///
/// Nested blocks (`@media`) come back as one rule whose declarations hold
/// the inner rules verbatim. Statement at-rules such as `@charset` are
/// dropped.
pub fn split_css_rules(css: &str) -> Vec<CssRule> {
    let css = strip_comments(css);
    let mut rules = Vec::new();
    let mut depth = 0usize;
    let mut prelude_start = 0;
    let mut body_start = 0;
    let mut selector = "";

    for (i, ch) in css.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    selector = css[prelude_start..i].trim();
                    body_start = i + 1;
                }
                depth += 1;
            }
            '}' if depth == 0 => prelude_start = i + 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if !selector.is_empty() {
                        rules.push(CssRule {
                            selector: selector.to_string(),
                            declarations: css[body_start..i].trim().to_string(),
                        });
                    }
                    prelude_start = i + 1;
                }
            }
            ';' if depth == 0 => prelude_start = i + 1,
            _ => {}
        }
    }

    rules
}

fn is_data_uri(target: &str) -> bool {
    target
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Rebuild `text`, replacing each match with `replace(captures)`; `None`
/// keeps the match as written.
fn replace_matches<F>(regex: &Regex, text: &str, mut replace: F) -> String
where
    F: FnMut(&fancy_regex::Captures<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for captures in regex.captures_iter(text) {
        let Ok(captures) = captures else {
            break;
        };
        let Some(whole) = captures.get(0) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        match replace(&captures) {
            Some(replacement) => out.push_str(&replacement),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }

    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(reference: &str) -> String {
        format!("/base/{reference}")
    }

    #[test]
    fn test_imports_extracted() {
        let rewrite = rewrite_stylesheet(
            "@import url(\"reset.css\");\n@import 'theme.css' screen;\nbody { color: red; }",
            resolver,
        );

        assert_eq!(rewrite.imports, vec!["/base/reset.css", "/base/theme.css"]);
        assert!(!rewrite.css.contains("@import"));
        assert!(rewrite.css.contains("body { color: red; }"));
    }

    #[test]
    fn test_assets_rewritten() {
        let rewrite = rewrite_stylesheet(
            ".a { background: url(img/a.png); } .b { background: url('img/a.png'); }",
            resolver,
        );

        assert_eq!(rewrite.assets, vec!["/base/img/a.png"]);
        assert_eq!(
            rewrite.css,
            ".a { background: url(/base/img/a.png); } .b { background: url('/base/img/a.png'); }"
        );
    }

    #[test]
    fn test_data_uri_untouched() {
        let css = ".i { background: url(data:image/png;base64,AAAA); }";
        let rewrite = rewrite_stylesheet(css, resolver);
        assert_eq!(rewrite.css, css);
        assert!(rewrite.assets.is_empty());
    }

    #[test]
    fn test_commented_url_ignored() {
        let rewrite = rewrite_stylesheet("/* url(old.png) */ p { margin: 0 }", resolver);
        assert!(rewrite.assets.is_empty());
    }

    #[test]
    fn test_split_rules() {
        let rules = split_css_rules(
            "@charset \"utf-8\";\nh1, h2 { margin: 0; }\n@media print { p { color: black; } }\n",
        );

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].selector, "h1, h2");
        assert_eq!(rules[0].declarations, "margin: 0;");
        assert_eq!(rules[1].selector, "@media print");
        assert_eq!(rules[1].declarations, "p { color: black; }");
    }
}
