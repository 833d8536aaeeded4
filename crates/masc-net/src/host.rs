//! Host collaborators
//!
//! The loader never touches a document directly. Everything it needs from
//! the embedding page (where it lives, how to run a script, where style
//! rules go, how to tell the user) comes through [`Host`].

use tracing::{debug, info, warn};

pub trait Host {
    /// Absolute URL of the current document; the default base for resolution
    fn current_document_url(&self) -> String;

    /// Run fetched script source. An `Err` carries the script's error message.
    fn evaluate_script(&self, url: &str, source: &str) -> Result<(), String>;

    /// Whether the document already has a `<script>` whose `src` is exactly `url`
    fn has_script_tag(&self, _url: &str) -> bool {
        false
    }

    /// Append one rule to the document's styles
    fn insert_style_rule(&self, _selector: &str, _declarations: &str) {}

    fn show_busy_indicator(&self, _label: &str) {}

    fn hide_busy_indicator(&self, _label: &str) {}

    /// Report an error nobody else handled
    fn display_message(&self, message: &str);
}

/// Headless host that only logs
#[derive(Debug, Clone, Default)]
pub struct NullHost {
    document_url: String,
}

impl NullHost {
    pub fn new(document_url: impl Into<String>) -> Self {
        Self {
            document_url: document_url.into(),
        }
    }
}

impl Host for NullHost {
    fn current_document_url(&self) -> String {
        self.document_url.clone()
    }

    fn evaluate_script(&self, url: &str, source: &str) -> Result<(), String> {
        debug!(url, bytes = source.len(), "script evaluation skipped");
        Ok(())
    }

    fn insert_style_rule(&self, selector: &str, _declarations: &str) {
        debug!(selector, "style rule dropped");
    }

    fn show_busy_indicator(&self, label: &str) {
        info!(label, "busy");
    }

    fn hide_busy_indicator(&self, label: &str) {
        info!(label, "idle");
    }

    fn display_message(&self, message: &str) {
        warn!("{message}");
    }
}
