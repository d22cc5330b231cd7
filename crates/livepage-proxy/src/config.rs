//! Configuration types, loading and validation.
//!
//! [`ProxyConfig`] is what figment extracts from the TOML file and the
//! environment. [`ProxyConfig::validate`] turns it into the immutable
//! [`LiveConfig`] the request pipeline reads; every startup-fatal condition
//! is caught there.

use std::collections::BTreeMap;
use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use http::{HeaderMap, HeaderName, HeaderValue};
use kuchikiki::Selectors;
use livepage_tracing::TracingConfig;
use regex::Regex;
use serde::Deserialize;
use url::Url;

/// Container id used when none is configured.
pub const DEFAULT_CONTAINER_ID: &str = "root";

/// Anchor the forced container is mounted next to.
pub const DEFAULT_FALLBACK_SELECTOR: &str = "body > *:first-child";

/// Startup configuration errors. Any of these stops the proxy before it
/// binds its listener.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("live origin is not set (set `live.origin` or pass --origin)")]
    MissingOrigin,

    #[error("live origin `{0}` is not an absolute URL with scheme and host")]
    InvalidOrigin(String),

    #[error("invalid ignore path regex `{pattern}`: {source}")]
    InvalidIgnorePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid CSS selector for `{field}`: `{selector}`")]
    InvalidSelector { field: &'static str, selector: String },

    #[error("invalid header override `{name}`")]
    InvalidHeaderOverride { name: String },

    #[error("unsupported dev server scheme `{0}` (expected http or https)")]
    InvalidDevServerScheme(String),

    #[error("cannot read static assets directory {path}: {source}")]
    StaticDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Figment(#[from] figment::Error),
}

/// Top-level proxy configuration as loaded from file and environment.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub live: LiveOriginConfig,
    #[serde(default)]
    pub mount: MountConfig,
    #[serde(default)]
    pub dev_server: DevServerConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
    #[serde(default)]
    pub debug: bool,
}

/// Server listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

/// The remote, already-deployed site being proxied.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveOriginConfig {
    /// Absolute URL of the live page origin, e.g. `https://www.example.com`.
    #[serde(default)]
    pub origin: Option<String>,

    /// Requests whose path and query match this pattern are never rewritten.
    #[serde(default)]
    pub ignore_path_regex: Option<String>,

    /// Headers set on every request to the live origin, replacing any value
    /// the browser sent. Names are case-insensitive.
    #[serde(default)]
    pub header_overrides: BTreeMap<String, String>,

    /// Rewrite `Set-Cookie` domains for the dev host. Turn off when another
    /// layer in front of the proxy already does it.
    #[serde(default = "default_true")]
    pub rewrite_cookies: bool,

    #[serde(default = "default_live_timeout")]
    pub timeout_secs: u64,
}

/// Where and how the local app is mounted into the live page.
#[derive(Debug, Clone, Deserialize)]
pub struct MountConfig {
    #[serde(default = "default_container_ids")]
    pub container_ids: Vec<String>,

    #[serde(default = "default_fallback_selector")]
    pub fallback_selector: String,

    /// Nodes matching this selector are deleted from the live page.
    #[serde(default)]
    pub remove_selectors: Option<String>,

    /// Create missing containers next to `fallback_selector`.
    #[serde(default)]
    pub force_mount: bool,

    #[serde(default = "default_entry_module_path")]
    pub entry_module_path: String,
}

/// The local dev server the bootstrap script loads from.
#[derive(Debug, Clone, Deserialize)]
pub struct DevServerConfig {
    #[serde(default = "default_dev_scheme")]
    pub scheme: String,

    #[serde(default = "default_dev_host")]
    pub host: String,

    #[serde(default = "default_dev_port")]
    pub port: u16,

    #[serde(default = "default_dev_timeout")]
    pub timeout_secs: u64,
}

/// Local directories whose contents are served by the dev server rather than
/// the live origin.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    #[serde(default = "default_source_dir")]
    pub source_dir: String,
}

fn default_listen_address() -> String {
    "127.0.0.1:3080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_live_timeout() -> u64 {
    60
}

fn default_container_ids() -> Vec<String> {
    vec![DEFAULT_CONTAINER_ID.to_string()]
}

fn default_fallback_selector() -> String {
    DEFAULT_FALLBACK_SELECTOR.to_string()
}

fn default_entry_module_path() -> String {
    "src/main.tsx".to_string()
}

fn default_dev_scheme() -> String {
    "http".to_string()
}

fn default_dev_host() -> String {
    "localhost".to_string()
}

fn default_dev_port() -> u16 {
    5173
}

fn default_dev_timeout() -> u64 {
    30
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_source_dir() -> String {
    "src".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

impl Default for LiveOriginConfig {
    fn default() -> Self {
        Self {
            origin: None,
            ignore_path_regex: None,
            header_overrides: BTreeMap::new(),
            rewrite_cookies: true,
            timeout_secs: default_live_timeout(),
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            container_ids: default_container_ids(),
            fallback_selector: default_fallback_selector(),
            remove_selectors: None,
            force_mount: false,
            entry_module_path: default_entry_module_path(),
        }
    }
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            scheme: default_dev_scheme(),
            host: default_dev_host(),
            port: default_dev_port(),
            timeout_secs: default_dev_timeout(),
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            static_dir: default_static_dir(),
            source_dir: default_source_dir(),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LIVEPAGE_ prefix, __ for nesting)
    /// 2. TOML config file
    /// 3. Defaults
    pub fn load(config_path: &str) -> Result<Self, ConfigError> {
        let config: ProxyConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("LIVEPAGE_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Check every startup-fatal condition and freeze the pipeline settings.
    pub fn validate(&self) -> Result<LiveConfig, ConfigError> {
        let raw_origin = self
            .live
            .origin
            .as_deref()
            .ok_or(ConfigError::MissingOrigin)?;
        let live_origin = parse_origin(raw_origin)?;

        let ignore_path = self
            .live
            .ignore_path_regex
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidIgnorePattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()?;

        let mut header_overrides = HeaderMap::new();
        for (name, value) in &self.live.header_overrides {
            let invalid = || ConfigError::InvalidHeaderOverride { name: name.clone() };
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            header_overrides.insert(name, value);
        }

        check_selector("mount.fallback_selector", &self.mount.fallback_selector)?;
        if let Some(ref selector) = self.mount.remove_selectors {
            check_selector("mount.remove_selectors", selector)?;
        }

        let scheme = self.dev_server.scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::InvalidDevServerScheme(scheme));
        }

        let mut container_ids: Vec<String> = Vec::with_capacity(self.mount.container_ids.len());
        for id in &self.mount.container_ids {
            if !id.is_empty() && !container_ids.contains(id) {
                container_ids.push(id.clone());
            }
        }

        Ok(LiveConfig {
            live_origin,
            container_ids,
            mount_fallback_selector: self.mount.fallback_selector.clone(),
            remove_selectors: self.mount.remove_selectors.clone(),
            ignore_path,
            header_overrides,
            force_mount: self.mount.force_mount,
            dev_server: DevServer {
                scheme,
                host: self.dev_server.host.clone(),
                port: self.dev_server.port,
            },
            entry_module_path: self.mount.entry_module_path.trim_start_matches('/').to_string(),
            rewrite_cookies: self.live.rewrite_cookies,
            debug: self.debug,
        })
    }
}

fn parse_origin(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidOrigin(raw.to_string()))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ConfigError::InvalidOrigin(raw.to_string()));
    }
    Ok(url)
}

fn check_selector(field: &'static str, selector: &str) -> Result<(), ConfigError> {
    Selectors::compile(selector)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidSelector {
            field,
            selector: selector.to_string(),
        })
}

/// Address of the local dev server as seen by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevServer {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl DevServer {
    /// `scheme://host:port`, no trailing slash.
    pub fn origin(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Validated, immutable settings shared by every request.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub live_origin: Url,
    pub container_ids: Vec<String>,
    pub mount_fallback_selector: String,
    pub remove_selectors: Option<String>,
    pub ignore_path: Option<Regex>,
    pub header_overrides: HeaderMap,
    pub force_mount: bool,
    pub dev_server: DevServer,
    pub entry_module_path: String,
    pub rewrite_cookies: bool,
    pub debug: bool,
}

impl LiveConfig {
    /// Live origin without a trailing slash, for building upstream URLs.
    pub fn live_base(&self) -> &str {
        self.live_origin.as_str().trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn config_with_origin(origin: &str) -> ProxyConfig {
        let mut config: ProxyConfig = Figment::new().extract().unwrap();
        config.live.origin = Some(origin.to_string());
        config
    }

    #[test]
    fn test_defaults_without_file() {
        let config = config_with_origin("https://live.example.com");
        assert_eq!(config.server.listen_address, "127.0.0.1:3080");
        assert_eq!(config.mount.container_ids, vec!["root"]);
        assert_eq!(config.mount.fallback_selector, "body > *:first-child");
        assert_eq!(config.dev_server.port, 5173);
        assert!(config.live.rewrite_cookies);
        assert!(!config.mount.force_mount);
    }

    #[test]
    fn test_toml_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "livepage-proxy.toml",
                r#"
                    [live]
                    origin = "https://live.example.com"
                    ignore_path_regex = "^/api/"

                    [live.header_overrides]
                    X-Bypass-Token = "secret"

                    [mount]
                    container_ids = ["root", "widget"]
                    force_mount = true

                    [dev_server]
                    port = 4000
                "#,
            )?;
            jail.set_env("LIVEPAGE_DEV_SERVER__PORT", "5000");
            jail.set_env("LIVEPAGE_DEBUG", "true");

            let config = ProxyConfig::load("livepage-proxy.toml").unwrap();
            assert_eq!(config.dev_server.port, 5000);
            assert!(config.debug);

            let live = config.validate().unwrap();
            assert_eq!(live.live_origin.host_str(), Some("live.example.com"));
            assert_eq!(live.container_ids, vec!["root", "widget"]);
            assert!(live.force_mount);
            assert_eq!(live.header_overrides["x-bypass-token"], "secret");
            assert!(live.ignore_path.as_ref().unwrap().is_match("/api/items"));
            assert_eq!(live.dev_server.origin(), "http://localhost:5000");
            Ok(())
        });
    }

    #[test]
    fn test_missing_origin_is_fatal() {
        let config: ProxyConfig = Figment::new().extract().unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingOrigin)));
    }

    #[test]
    fn test_relative_origin_is_fatal() {
        let config = config_with_origin("/just/a/path");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidOrigin(_))));

        let config = config_with_origin("mailto:someone@example.com");
        assert!(matches!(config.validate(), Err(ConfigError::InvalidOrigin(_))));
    }

    #[test]
    fn test_bad_ignore_pattern_is_fatal() {
        let mut config = config_with_origin("https://live.example.com");
        config.live.ignore_path_regex = Some("([unclosed".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIgnorePattern { .. })
        ));
    }

    #[test]
    fn test_bad_selector_is_fatal() {
        let mut config = config_with_origin("https://live.example.com");
        config.mount.remove_selectors = Some("div[".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSelector { field: "mount.remove_selectors", .. })
        ));
    }

    #[test]
    fn test_bad_header_override_is_fatal() {
        let mut config = config_with_origin("https://live.example.com");
        config
            .live
            .header_overrides
            .insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidHeaderOverride { .. })
        ));
    }

    #[test]
    fn test_container_ids_deduplicated_in_order() {
        let mut config = config_with_origin("https://live.example.com");
        config.mount.container_ids = vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
            String::new(),
        ];
        let live = config.validate().unwrap();
        assert_eq!(live.container_ids, vec!["b", "a"]);
    }

    #[test]
    fn test_entry_path_leading_slash_trimmed() {
        let mut config = config_with_origin("https://live.example.com/");
        config.mount.entry_module_path = "/src/app.tsx".to_string();
        let live = config.validate().unwrap();
        assert_eq!(live.entry_module_path, "src/app.tsx");
        assert_eq!(live.live_base(), "https://live.example.com");
    }
}
