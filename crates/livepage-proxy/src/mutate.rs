//! HTML rewriting for eligible live-page responses.
//!
//! Removes configured nodes, makes sure the mount containers exist (when
//! force mount is on), and injects the bootstrap script block that wires the
//! dev server's live-reload runtime and loads the app entry module.
//!
//! Single application is the only supported mode: running the mutator over
//! its own output injects a second bootstrap block.

use std::fmt;

use bytes::Bytes;

use crate::config::LiveConfig;
use crate::document::{DocumentError, HtmlDocument, KuchikiDocument};

/// Logged in the browser console by every rewritten page.
pub const INJECTION_MARKER: &str =
    "==================== livepage dev script injected ====================";

const DOCTYPE: &str = "<!DOCTYPE html>\n";
const BODY_CLOSE: &str = "</body>";

/// Advisory problems found while rewriting. None of them fail the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationWarning {
    /// The body could not be parsed, queried or serialized.
    Document(String),
    /// A container id is absent and force mount is on.
    MissingContainer { id: String },
    /// Force mount found nothing to mount next to; likely not a full page.
    MissingAnchor { selector: String },
}

impl fmt::Display for MutationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationWarning::Document(e) => write!(f, "document not rewritten: {e}"),
            MutationWarning::MissingContainer { id } => write!(
                f,
                "container #{id} not found in live page, mounting it next to the fallback anchor"
            ),
            MutationWarning::MissingAnchor { selector } => write!(
                f,
                "fallback anchor `{selector}` not found; response does not look like a full page \
                 (ignore this path with `live.ignore_path_regex` if it is an HTML fragment)"
            ),
        }
    }
}

/// Result of running the mutator over one body.
#[derive(Debug, Clone)]
pub enum MutationOutcome {
    Rewritten {
        body: Bytes,
        warnings: Vec<MutationWarning>,
    },
    /// The original buffer, untouched.
    Unchanged {
        body: Bytes,
        warnings: Vec<MutationWarning>,
    },
}

impl MutationOutcome {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, MutationOutcome::Rewritten { .. })
    }

    pub fn body(&self) -> &Bytes {
        match self {
            MutationOutcome::Rewritten { body, .. } | MutationOutcome::Unchanged { body, .. } => body,
        }
    }

    pub fn warnings(&self) -> &[MutationWarning] {
        match self {
            MutationOutcome::Rewritten { warnings, .. }
            | MutationOutcome::Unchanged { warnings, .. } => warnings,
        }
    }

    pub fn into_body(self) -> Bytes {
        match self {
            MutationOutcome::Rewritten { body, .. } | MutationOutcome::Unchanged { body, .. } => body,
        }
    }
}

/// Rewrite `body` with the default HTML backend.
pub fn mutate_document(body: Bytes, config: &LiveConfig) -> MutationOutcome {
    mutate_with::<KuchikiDocument>(body, config)
}

/// Rewrite `body` with any [`HtmlDocument`] backend.
pub fn mutate_with<D: HtmlDocument>(body: Bytes, config: &LiveConfig) -> MutationOutcome {
    let mut warnings = Vec::new();
    match rewrite::<D>(&body, config, &mut warnings) {
        Ok(Some(html)) => MutationOutcome::Rewritten {
            body: Bytes::from(html),
            warnings,
        },
        Ok(None) => MutationOutcome::Unchanged { body, warnings },
        Err(e) => {
            warnings.push(MutationWarning::Document(e.to_string()));
            MutationOutcome::Unchanged { body, warnings }
        }
    }
}

/// `Ok(None)` means "return the original buffer".
fn rewrite<D: HtmlDocument>(
    body: &[u8],
    config: &LiveConfig,
    warnings: &mut Vec<MutationWarning>,
) -> Result<Option<String>, DocumentError> {
    let doc = D::parse(body)?;

    if let Some(ref selector) = config.remove_selectors {
        for node in doc.query_selector_all(selector)? {
            doc.remove_node(&node);
        }
    }

    // Decide for every id before touching the tree, so a missing anchor
    // leaves the document exactly as it came in.
    let missing: Vec<&str> = if config.force_mount {
        config
            .container_ids
            .iter()
            .map(String::as_str)
            .filter(|id| doc.get_element_by_id(id).is_none())
            .collect()
    } else {
        Vec::new()
    };

    if !missing.is_empty() {
        warnings.extend(missing.iter().map(|id| MutationWarning::MissingContainer {
            id: id.to_string(),
        }));

        let Some(anchor) = doc.query_selector(&config.mount_fallback_selector)? else {
            warnings.push(MutationWarning::MissingAnchor {
                selector: config.mount_fallback_selector.clone(),
            });
            return Ok(None);
        };

        // Chain the new containers so they keep configuration order.
        let mut previous = anchor;
        for id in missing {
            let container = doc.create_container(id);
            doc.insert_after(&previous, container.clone());
            previous = container;
        }
    }

    let html = doc.serialize()?;
    Ok(Some(inject_before_body_close(&html, &bootstrap_block(config))))
}

/// Prepend the doctype and place `block` right before the last `</body>`.
fn inject_before_body_close(html: &str, block: &str) -> String {
    let mut out = String::with_capacity(DOCTYPE.len() + html.len() + block.len());
    out.push_str(DOCTYPE);
    match html.rfind(BODY_CLOSE) {
        Some(at) => {
            out.push_str(&html[..at]);
            out.push_str(block);
            out.push_str(&html[at..]);
        }
        None => {
            out.push_str(html);
            out.push_str(block);
        }
    }
    out
}

/// The injected script markup, in load order: console marker, refresh
/// runtime preamble, dev client, guarded entry import.
pub fn bootstrap_block(config: &LiveConfig) -> String {
    let dev_origin = config.dev_server.origin();
    let refresh_url = js_literal(&format!("{dev_origin}/@react-refresh"));
    let client_url = attr_escape(&format!("{dev_origin}/@vite/client"));
    let entry = js_literal(&format!("/{}", config.entry_module_path));

    let entry_import = if config.container_ids.is_empty() {
        format!("    import({entry}).catch(console.error);\n")
    } else {
        format!(
            "    const containerIds = {ids};\n\
             \x20   const missing = containerIds.filter((id) => !(document.getElementById(id) instanceof HTMLElement));\n\
             \x20   if (missing.length === 0) {{\n\
             \x20     import({entry}).catch(console.error);\n\
             \x20   }} else {{\n\
             \x20     missing.forEach((id) => console.error('Container element not found: ', id));\n\
             \x20   }}\n",
            ids = js_literal(&config.container_ids),
        )
    };

    format!(
        "<script>console.warn({marker})</script>\n\
         \x20 <script type=\"module\">\n\
         \x20   import RefreshRuntime from {refresh_url}\n\
         \x20   RefreshRuntime.injectIntoGlobalHook(window)\n\
         \x20   window.$RefreshReg$ = () => {{}}\n\
         \x20   window.$RefreshSig$ = () => (type) => type\n\
         \x20   window.__vite_plugin_react_preamble_installed__ = true\n\
         \x20 </script>\n\
         \x20 <script type=\"module\" src=\"{client_url}\"></script>\n\
         \x20 <script type=\"module\">\n\
         {entry_import}\
         \x20 </script>\n",
        marker = js_literal(INJECTION_MARKER),
    )
}

/// JSON-encode a value for use as a JS literal inside a `<script>` element.
fn js_literal<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
}

fn attr_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
