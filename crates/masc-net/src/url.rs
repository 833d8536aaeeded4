//! URL resolution
//!
//! String-level resolution of relative references against a base, the way
//! a document resolves `src`/`href` attributes. Never fails: malformed
//! input gives a best-effort result.

use std::borrow::Cow;

/// Resolve `url` against `relative_to`, or the document URL when absent.
///
/// References starting with `/` or containing `:` are already absolute and
/// are returned unchanged. A bare file name in `relative_to` (no `/` and no
/// `:`) is itself resolved against `document_url` first; any other base is
/// used as given. The query string of `url` is carried over.
pub fn resolve_url(url: &str, relative_to: Option<&str>, document_url: &str) -> String {
    if is_absolute(url) {
        return url.to_string();
    }

    let base: Cow<'_, str> = match relative_to.filter(|base| !base.is_empty()) {
        Some(base) if !base.contains(['/', ':']) => Cow::Owned(join(document_url, base)),
        Some(base) => Cow::Borrowed(base),
        None => Cow::Borrowed(document_url),
    };

    let (path, query) = match url.find('?') {
        Some(i) => url.split_at(i),
        None => (url, ""),
    };

    let mut resolved = join(&base, path);
    resolved.push_str(query);
    resolved
}

/// Whether `url` uses the `file:` scheme
pub fn is_local_file(url: &str) -> bool {
    url.get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("file:"))
}

fn is_absolute(url: &str) -> bool {
    url.starts_with('/') || url.contains(':')
}

/// Append `path` to the directory of `base`, applying `.` and `..`.
fn join(base: &str, path: &str) -> String {
    let base = base.find(['?', '#']).map_or(base, |i| &base[..i]);
    let mut segments: Vec<&str> = base.split('/').collect();
    let floor = protected_segments(&segments);

    // file name of the base
    if segments.len() > floor {
        segments.pop();
    }

    for segment in path.split('/') {
        match segment {
            "." => {}
            ".." => {
                if segments.len() > floor {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }

    if segments.len() == 1 && segments[0].is_empty() {
        return "/".to_string();
    }
    segments.join("/")
}

/// Leading segments that `..` may never remove: `scheme:` plus the empty
/// segment and authority of `scheme://host`, or the root of `/path`.
fn protected_segments(segments: &[&str]) -> usize {
    match segments {
        [scheme, "", ..] if scheme.ends_with(':') && segments.len() > 2 => 3,
        [scheme, ..] if scheme.ends_with(':') => 1,
        ["", ..] => 1,
        _ => 0,
    }
}

/// Resolves references against a fixed document URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlResolver {
    document_url: String,
}

impl UrlResolver {
    pub fn new(document_url: impl Into<String>) -> Self {
        Self {
            document_url: document_url.into(),
        }
    }

    pub fn document_url(&self) -> &str {
        &self.document_url
    }

    pub fn set_document_url(&mut self, document_url: impl Into<String>) {
        self.document_url = document_url.into();
    }

    /// See [`resolve_url`]
    pub fn resolve(&self, url: &str, relative_to: Option<&str>) -> String {
        resolve_url(url, relative_to, &self.document_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "http://example.com/app/index.html";

    #[test]
    fn test_parent_segment() {
        assert_eq!(resolve_url("../x.css", Some("/a/b/c.html"), DOC), "/a/x.css");
    }

    #[test]
    fn test_absolute_unchanged() {
        assert_eq!(resolve_url("/abs/y.js", Some("/a/b/c.html"), DOC), "/abs/y.js");
        assert_eq!(
            resolve_url("https://cdn.test/x.js?v=2", None, DOC),
            "https://cdn.test/x.js?v=2"
        );
    }

    #[test]
    fn test_directory_base() {
        assert_eq!(resolve_url("z.js", Some("/a/b/"), DOC), "/a/b/z.js");
    }

    #[test]
    fn test_document_url_default() {
        assert_eq!(
            resolve_url("js/app.js", None, DOC),
            "http://example.com/app/js/app.js"
        );
    }

    #[test]
    fn test_never_pops_authority() {
        assert_eq!(
            resolve_url("../../../x.js", None, DOC),
            "http://example.com/x.js"
        );
        assert_eq!(resolve_url("../../x.js", Some("/a.html"), DOC), "/x.js");
    }

    #[test]
    fn test_query_reattached() {
        assert_eq!(
            resolve_url("./lib.js?v=1.2/3", Some("/s/page.html"), DOC),
            "/s/lib.js?v=1.2/3"
        );
    }

    #[test]
    fn test_base_query_ignored() {
        assert_eq!(resolve_url("b.js", Some("/x/a.html?q=/y/z"), DOC), "/x/b.js");
    }

    #[test]
    fn test_bare_file_base_resolved_against_document() {
        assert_eq!(
            resolve_url("img/logo.png", Some("site.css"), DOC),
            "http://example.com/app/img/logo.png"
        );
    }

    #[test]
    fn test_base_with_directory_used_as_given() {
        assert_eq!(
            resolve_url("img/logo.png", Some("css/site.css"), DOC),
            "css/img/logo.png"
        );
        assert_eq!(resolve_url("../x.png", Some("css/site.css"), DOC), "x.png");
    }

    #[test]
    fn test_local_file() {
        assert!(is_local_file("file:///tmp/a.js"));
        assert!(is_local_file("FILE:///tmp/a.js"));
        assert!(!is_local_file("http://a/b"));
        assert!(!is_local_file("fil"));
    }

    #[test]
    fn test_resolver_struct() {
        let mut resolver = UrlResolver::new("/docs/guide/intro.html");
        assert_eq!(resolver.resolve("../api.html", None), "/docs/api.html");

        resolver.set_document_url("file:///srv/site/index.html");
        assert_eq!(resolver.resolve("a.js", None), "file:///srv/site/a.js");
    }
}
