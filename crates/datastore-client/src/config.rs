// Configuration loading and parsing (datastore.toml).
//
// The endpoint location, request verb and default headers used to live in
// page globals; here they are an explicit `ClientConfig` handed to the
// submitter at construction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Name of the config file inside `config/` (and `defaults/`).
pub const CONFIG_FILE: &str = "datastore.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// datastore.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the whole file.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    endpoint: EndpointSection,
    #[serde(default)]
    request: RequestSection,
}

#[derive(Debug, Clone, Deserialize)]
struct EndpointSection {
    host: String,
    hub: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RequestSection {
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

impl Default for RequestSection {
    fn default() -> Self {
        RequestSection {
            method: default_method(),
            timeout_secs: None,
            headers: BTreeMap::new(),
        }
    }
}

fn default_method() -> String {
    "PUT".to_string()
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Validated settings for talking to one hub's datastore endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base address of the service, e.g. `http://localhost:8000`.
    pub host: Url,
    /// Logical group the datastores live under.
    pub hub: String,
    /// Verb used for value writes.
    pub method: Method,
    /// Headers attached to every request.
    pub headers: HeaderMap,
    /// Deadline a caller may wrap around a submission. Not applied by the
    /// submitter itself.
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    /// Build a config with the default verb (`PUT`), no extra headers and
    /// no timeout.
    pub fn new(host: &str, hub: &str) -> Result<Self, ConfigError> {
        Self::from_parts(host, hub, &default_method(), None, &BTreeMap::new())
    }

    /// Add or replace a default header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_method(mut self, method: &str) -> Result<Self, ConfigError> {
        self.method = parse_method(method)?;
        Ok(self)
    }

    /// URL of one datastore: `{host}/api/hub/{hub}/datastores/{target}`.
    ///
    /// Segments are percent-encoded, so a target id can never escape its
    /// path position.
    pub fn datastore_url(&self, target_id: &str) -> Url {
        let mut url = self.host.clone();
        // `host` is validated as a base URL in `from_parts`, so this only
        // fails for cannot-be-a-base URLs which never get this far.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "hub", self.hub.as_str(), "datastores", target_id]);
        }
        url
    }

    fn from_parts(
        host: &str,
        hub: &str,
        method: &str,
        timeout_secs: Option<u64>,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let host = parse_host(host)?;

        if hub.trim().is_empty() {
            return Err(ConfigError::invalid("endpoint.hub", "must not be empty"));
        }

        let method = parse_method(method)?;

        let timeout = match timeout_secs {
            Some(0) => {
                return Err(ConfigError::invalid(
                    "request.timeout_secs",
                    "must be > 0 when set",
                ))
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let (name, value) = parse_header(name, value)?;
            header_map.insert(name, value);
        }

        Ok(ClientConfig {
            host,
            hub: hub.trim().to_string(),
            method,
            headers: header_map,
            timeout,
        })
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/datastore.toml` relative to `base_dir`.
///
/// This does not bootstrap defaults; `load_config()` does.
pub fn load_config_from(base_dir: &Path) -> Result<ClientConfig, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    parse_config(&text, &path)
}

/// Parse config text. `path` is only used for error messages.
pub fn parse_config(text: &str, path: &Path) -> Result<ClientConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    ClientConfig::from_parts(
        &file.endpoint.host,
        &file.endpoint.hub,
        &file.request.method,
        file.request.timeout_secs,
        &file.request.headers,
    )
}

/// Install `defaults/datastore.toml` as `config/datastore.toml` if there is
/// no config yet. Returns the installed path, or `None` when a config was
/// already in place.
///
/// The default file is validated before it is installed, so a broken
/// default is reported against `defaults/` and never lands in `config/`.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }

    let default = base_dir.join("defaults").join(CONFIG_FILE);
    let text = std::fs::read_to_string(&default).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!(
            "no {} and cannot read {}: {e}",
            target.display(),
            default.display()
        ),
    })?;
    parse_config(&text, &default)?;

    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", dir.display()),
        })?;
    }

    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
    {
        Ok(file) => file,
        // Someone else installed one in the meantime; keep theirs.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => {
            return Err(ConfigError::DefaultsCopyError {
                message: format!("failed to create {}: {e}", target.display()),
            })
        }
    };
    std::io::Write::write_all(&mut dest, text.as_bytes()).map_err(|e| {
        ConfigError::DefaultsCopyError {
            message: format!("failed to write {}: {e}", target.display()),
        }
    })?;

    info!(path = %target.display(), "installed default datastore config");
    Ok(Some(target))
}

/// Bootstrap defaults under `base_dir`, then load.
pub fn load_config(base_dir: &Path) -> Result<ClientConfig, ConfigError> {
    ensure_config_file(base_dir)?;
    load_config_from(base_dir)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn parse_host(host: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(host.trim())
        .map_err(|e| ConfigError::invalid("endpoint.host", format!("invalid URL `{host}`: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "endpoint.host",
            format!("scheme must be http or https, got `{}`", url.scheme()),
        ));
    }
    if url.cannot_be_a_base() || url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::invalid(
            "endpoint.host",
            "must be a plain base address without query or fragment",
        ));
    }
    Ok(url)
}

fn parse_method(method: &str) -> Result<Method, ConfigError> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
        ConfigError::invalid("request.method", format!("`{method}` is not an HTTP method"))
    })
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ConfigError> {
    let field = format!("request.headers.{name}");
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ConfigError::invalid(&field, "invalid header name"))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| ConfigError::invalid(&field, "invalid header value"))?;
    Ok((header_name, header_value))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// The crate's own `defaults/` directory.
    fn crate_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    }

    fn parse(text: &str) -> Result<ClientConfig, ConfigError> {
        parse_config(text, Path::new("datastore.toml"))
    }

    fn validation_field(err: ConfigError) -> String {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("expected ValidationError, got: {other:?}"),
        }
    }

    #[test]
    fn default_file_parses() {
        let text = fs::read_to_string(crate_root().join("defaults").join(CONFIG_FILE)).unwrap();
        let config = parse(&text).expect("shipped defaults should be valid");
        assert_eq!(config.host.as_str(), "http://localhost:8000/");
        assert_eq!(config.hub, "1");
        assert_eq!(config.method, Method::PUT);
        assert_eq!(config.timeout, Some(Duration::from_secs(10)));
        assert_eq!(
            config.headers.get("accept").and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[test]
    fn request_section_is_optional() {
        let config = parse(
            r#"
[endpoint]
host = "https://hub.example.com"
hub = "7"
"#,
        )
        .unwrap();
        assert_eq!(config.method, Method::PUT);
        assert!(config.headers.is_empty());
        assert!(config.timeout.is_none());
    }

    #[test]
    fn method_is_normalized() {
        let config = parse(
            r#"
[endpoint]
host = "http://localhost:8000"
hub = "1"

[request]
method = "patch"
"#,
        )
        .unwrap();
        assert_eq!(config.method, Method::PATCH);
    }

    #[test]
    fn missing_endpoint_is_a_parse_error() {
        let err = parse("[request]\nmethod = \"PUT\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn rejects_empty_hub() {
        let err = parse("[endpoint]\nhost = \"http://h\"\nhub = \" \"\n").unwrap_err();
        assert_eq!(validation_field(err), "endpoint.hub");
    }

    #[test]
    fn rejects_non_http_host() {
        let err = parse("[endpoint]\nhost = \"ftp://h\"\nhub = \"1\"\n").unwrap_err();
        assert_eq!(validation_field(err), "endpoint.host");

        let err = parse("[endpoint]\nhost = \"not a url\"\nhub = \"1\"\n").unwrap_err();
        assert_eq!(validation_field(err), "endpoint.host");
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = parse(
            "[endpoint]\nhost = \"http://h\"\nhub = \"1\"\n[request]\ntimeout_secs = 0\n",
        )
        .unwrap_err();
        assert_eq!(validation_field(err), "request.timeout_secs");
    }

    #[test]
    fn rejects_bad_method() {
        let err = parse("[endpoint]\nhost = \"http://h\"\nhub = \"1\"\n[request]\nmethod = \"P UT\"\n")
            .unwrap_err();
        assert_eq!(validation_field(err), "request.method");
    }

    #[test]
    fn rejects_bad_header_value() {
        let err = parse(
            "[endpoint]\nhost = \"http://h\"\nhub = \"1\"\n[request.headers]\n\"x-token\" = \"a\\nb\"\n",
        )
        .unwrap_err();
        assert_eq!(validation_field(err), "request.headers.x-token");
    }

    #[test]
    fn datastore_url_layout() {
        let config = ClientConfig::new("http://localhost:8000", "3").unwrap();
        assert_eq!(
            config.datastore_url("temp1").as_str(),
            "http://localhost:8000/api/hub/3/datastores/temp1"
        );
    }

    #[test]
    fn datastore_url_keeps_host_prefix() {
        let config = ClientConfig::new("https://example.com/sentinel/", "3").unwrap();
        assert_eq!(
            config.datastore_url("temp1").as_str(),
            "https://example.com/sentinel/api/hub/3/datastores/temp1"
        );
    }

    #[test]
    fn datastore_url_escapes_target() {
        let config = ClientConfig::new("http://localhost:8000", "1").unwrap();
        assert_eq!(
            config.datastore_url("a/b c").as_str(),
            "http://localhost:8000/api/hub/1/datastores/a%2Fb%20c"
        );
    }

    #[test]
    fn builder_helpers() {
        let config = ClientConfig::new("http://localhost:8000", "1")
            .unwrap()
            .with_method("post")
            .unwrap()
            .with_header("X-CSRFToken", "abc")
            .unwrap();
        assert_eq!(config.method, Method::POST);
        assert_eq!(config.headers.get("x-csrftoken").unwrap(), "abc");
    }

    fn seeded_dir(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("defaults")).unwrap();
        fs::copy(
            crate_root().join("defaults").join(CONFIG_FILE),
            tmp.join("defaults").join(CONFIG_FILE),
        )
        .unwrap();
        tmp
    }

    #[test]
    fn ensure_installs_default_once() {
        let tmp = seeded_dir("datastore_config_test_ensure");

        let installed = ensure_config_file(&tmp).unwrap();
        assert_eq!(installed, Some(tmp.join("config").join(CONFIG_FILE)));

        // Second run leaves the user's edits alone.
        fs::write(
            tmp.join("config").join(CONFIG_FILE),
            "[endpoint]\nhost = \"http://edited\"\nhub = \"9\"\n",
        )
        .unwrap();
        assert_eq!(ensure_config_file(&tmp).unwrap(), None);
        let config = load_config(&tmp).unwrap();
        assert_eq!(config.hub, "9");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_refuses_invalid_default() {
        let tmp = seeded_dir("datastore_config_test_bad_default");
        fs::write(
            tmp.join("defaults").join(CONFIG_FILE),
            "[endpoint]\nhost = \"ftp://hub\"\nhub = \"1\"\n",
        )
        .unwrap();

        let err = ensure_config_file(&tmp).unwrap_err();
        assert_eq!(validation_field(err), "endpoint.host");
        assert!(!tmp.join("config").join(CONFIG_FILE).exists());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_without_any_config_fails() {
        let tmp = std::env::temp_dir().join("datastore_config_test_empty");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_file(&tmp).unwrap_err();
        assert!(matches!(err, ConfigError::DefaultsCopyError { .. }));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_keeps_existing_config_without_defaults() {
        let tmp = std::env::temp_dir().join("datastore_config_test_no_defaults");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(
            tmp.join("config").join(CONFIG_FILE),
            "[endpoint]\nhost = \"http://hub\"\nhub = \"2\"\n",
        )
        .unwrap();

        assert_eq!(ensure_config_file(&tmp).unwrap(), None);
        assert_eq!(load_config(&tmp).unwrap().hub, "2");

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn load_from_missing_file_reports_path() {
        let tmp = std::env::temp_dir().join("datastore_config_test_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("config")).unwrap();

        match load_config_from(&tmp).unwrap_err() {
            ConfigError::FileNotFound { path } => {
                assert!(path.ends_with(Path::new("config").join(CONFIG_FILE)));
            }
            other => panic!("expected FileNotFound, got: {other:?}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }
}
