//! Path classification: which request paths stay local and which go to the
//! live origin.
//!
//! The exclusion list is a snapshot taken at startup. Files added to the
//! static assets directory afterwards are proxied to the live origin until
//! the proxy restarts.

use std::path::Path;

use crate::config::{AssetsConfig, ConfigError, LiveConfig};

/// Dev tooling paths that always belong to the local dev server.
const TOOLING_PREFIXES: &[&str] = &["node_modules", "@vite", "@id", "@fs"];

/// Live-reload runtime endpoint requested by the bootstrap script.
const REFRESH_ENDPOINT: &str = "@react-refresh";

/// Where a request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRoute {
    /// Forward to the live origin through the interception pipeline.
    Intercept,
    /// Serve from the local dev server, untouched.
    PassThrough,
}

impl PathRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathRoute::Intercept => "intercept",
            PathRoute::PassThrough => "pass-through",
        }
    }
}

/// Ordered set of path prefixes that are never intercepted.
#[derive(Debug, Clone)]
pub struct ExclusionSet {
    /// Each entry is stored with its leading `/`.
    prefixes: Vec<String>,
}

impl ExclusionSet {
    /// Build the startup snapshot. Fails if the static assets directory
    /// cannot be listed.
    pub fn build(assets: &AssetsConfig, live: &LiveConfig) -> Result<Self, ConfigError> {
        let mut entries: Vec<String> = TOOLING_PREFIXES.iter().map(|s| s.to_string()).collect();
        entries.push(REFRESH_ENDPOINT.to_string());
        entries.push(assets.source_dir.clone());
        entries.push(live.entry_module_path.clone());
        entries.extend(list_static_dir(&assets.static_dir)?);

        Ok(Self::from_entries(entries))
    }

    /// Build from explicit entries, without touching the filesystem.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.as_ref().trim_matches('/');
            if entry.is_empty() {
                continue;
            }
            let prefix = format!("/{entry}");
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
        Self { prefixes }
    }

    /// `PassThrough` iff the path starts with any excluded prefix.
    pub fn classify(&self, path: &str) -> PathRoute {
        if self.prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            PathRoute::PassThrough
        } else {
            PathRoute::Intercept
        }
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }
}

fn list_static_dir(dir: &Path) -> Result<Vec<String>, ConfigError> {
    let to_error = |source| ConfigError::StaticDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(to_error)? {
        let entry = entry.map_err(to_error)?;
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => {
                tracing::warn!(name = ?name, "Skipping static asset with a non UTF-8 name");
            }
        }
    }
    names.sort();
    Ok(names)
}
