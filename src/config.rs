//! Configuration types for recmailer
//!
//! The on-disk format is JSON with PascalCase keys, so existing config files
//! of the form `{"RecUrl": ..., "SmtpServer": ..., "SmtpFrom": ...,
//! "EnvelopeFrom": ...}` load unchanged. Everything beyond those keys is
//! optional and falls back to the defaults below.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// Placeholder in `RecUrl` / `UserUrl` that is replaced by the subject id
pub const SUBJECT_PLACEHOLDER: &str = "%s";

/// Main configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Payload URL template; `%s` is replaced by the URL-encoded subject id
    pub rec_url: String,

    /// Identity-resolution endpoint used by the trigger API
    #[serde(default)]
    pub user_url: Option<String>,

    /// SMTP endpoint as `host` or `host:port` (default port 25)
    pub smtp_server: String,

    /// Envelope sender (`MAIL FROM`)
    pub smtp_from: String,

    /// Address rendered into the message `From` header (defaults to `SmtpFrom`)
    #[serde(default)]
    pub envelope_from: Option<String>,

    /// Subject line handed to the template
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Substituted for suggestions that come back without a thumbnail
    #[serde(default = "default_thumbnail_url")]
    pub default_thumbnail_url: String,

    /// Worker pool and queue sizing
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Outbound HTTP settings
    #[serde(default)]
    pub http: HttpConfig,

    /// SMTP session settings
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Trigger API settings
    #[serde(default)]
    pub api: ApiConfig,
}

/// Worker pool and queue sizing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PipelineConfig {
    /// Number of concurrent executors (default: 30)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Capacity of the record queue (default: 100)
    #[serde(default = "default_queue_capacity")]
    pub record_queue: usize,

    /// Capacity of the outcome queue (default: 100)
    #[serde(default = "default_queue_capacity")]
    pub outcome_queue: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            record_queue: default_queue_capacity(),
            outcome_queue: default_queue_capacity(),
        }
    }
}

/// Outbound HTTP settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HttpConfig {
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl HttpConfig {
    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Transport security for the SMTP session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection, no TLS
    #[default]
    None,
    /// Upgrade with STARTTLS (required)
    Starttls,
    /// Implicit TLS (SMTPS)
    Tls,
}

/// SMTP session settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SmtpConfig {
    /// Connection security (default: none)
    #[serde(default)]
    pub security: SmtpSecurity,

    /// Command timeout in seconds (default: 60)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SmtpConfig {
    /// Command timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_SMTP_TIMEOUT_SECS))
    }
}

const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 60;

/// Trigger API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiConfig {
    /// Address to bind the API server to (default: 127.0.0.1:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Name of the cookie that must be present on trigger requests (default: "session")
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// Batch input processed by each triggered run
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    /// Presentation template used by the API server
    #[serde(default)]
    pub template_file: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            session_cookie: default_session_cookie(),
            data_file: None,
            template_file: None,
        }
    }
}

impl Config {
    /// Create a config with the required fields and defaults for everything else
    pub fn new(
        rec_url: impl Into<String>,
        smtp_server: impl Into<String>,
        smtp_from: impl Into<String>,
    ) -> Self {
        Self {
            rec_url: rec_url.into(),
            user_url: None,
            smtp_server: smtp_server.into(),
            smtp_from: smtp_from.into(),
            envelope_from: None,
            subject: default_subject(),
            default_thumbnail_url: default_thumbnail_url(),
            pipeline: PipelineConfig::default(),
            http: HttpConfig::default(),
            smtp: SmtpConfig::default(),
            api: ApiConfig::default(),
        }
    }

    /// Read, parse and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("unable to read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON config document
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw).map_err(|e| Error::Config {
            message: format!("unable to parse config: {}", e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that cannot be expressed through serde defaults
    pub fn validate(&self) -> Result<()> {
        validate_url_template("RecUrl", &self.rec_url)?;
        if let Some(user_url) = &self.user_url {
            url::Url::parse(user_url)
                .map_err(|e| Error::config("UserUrl", format!("invalid URL: {}", e)))?;
        }
        self.smtp_endpoint()?;
        if self.smtp_from.trim().is_empty() {
            return Err(Error::config("SmtpFrom", "sender address is empty"));
        }
        if !(1..=MAX_WORKERS).contains(&self.pipeline.workers) {
            return Err(Error::config(
                "Pipeline.Workers",
                format!("must be between 1 and {}", MAX_WORKERS),
            ));
        }
        if self.pipeline.record_queue == 0 {
            return Err(Error::config("Pipeline.RecordQueue", "must be at least 1"));
        }
        if self.pipeline.outcome_queue == 0 {
            return Err(Error::config("Pipeline.OutcomeQueue", "must be at least 1"));
        }
        Ok(())
    }

    /// Split `SmtpServer` into host and port
    pub fn smtp_endpoint(&self) -> Result<(String, u16)> {
        let server = self.smtp_server.trim();
        if server.is_empty() {
            return Err(Error::config("SmtpServer", "server address is empty"));
        }
        match server.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port = port.parse::<u16>().map_err(|_| {
                    Error::config("SmtpServer", format!("invalid port in {}", server))
                })?;
                Ok((host.to_string(), port))
            }
            Some(_) => Err(Error::config("SmtpServer", "missing host")),
            None => Ok((server.to_string(), DEFAULT_SMTP_PORT)),
        }
    }

    /// Address rendered into the `From` header
    pub fn header_from(&self) -> &str {
        match &self.envelope_from {
            Some(from) if !from.trim().is_empty() => from,
            _ => &self.smtp_from,
        }
    }
}

/// Substitute a subject id into a `%s` URL template
pub fn expand_url_template(template: &str, subject_id: &str) -> String {
    template.replacen(
        SUBJECT_PLACEHOLDER,
        &urlencoding::encode(subject_id),
        1,
    )
}

fn validate_url_template(key: &str, template: &str) -> Result<()> {
    if !template.contains(SUBJECT_PLACEHOLDER) {
        return Err(Error::config(
            key,
            format!("URL template must contain {}", SUBJECT_PLACEHOLDER),
        ));
    }
    url::Url::parse(&expand_url_template(template, "0"))
        .map_err(|e| Error::config(key, format!("invalid URL: {}", e)))?;
    Ok(())
}

const DEFAULT_SMTP_PORT: u16 = 25;
const MAX_WORKERS: usize = 1024;

fn default_subject() -> String {
    "Recommendations for you".to_string()
}

fn default_thumbnail_url() -> String {
    "http://graphics8.nytimes.com/images/misc/spacer.gif".to_string()
}

fn default_workers() -> usize {
    30
}

fn default_queue_capacity() -> usize {
    100
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_session_cookie() -> String {
    "session".to_string()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "RecUrl": "http://recs.example.com/users/%s/suggestions",
        "SmtpServer": "mail.example.com:2525",
        "SmtpFrom": "bounces@example.com",
        "EnvelopeFrom": "Recommendations <recs@example.com>"
    }"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_json(MINIMAL).unwrap();
        assert_eq!(config.pipeline.workers, 30);
        assert_eq!(config.pipeline.record_queue, 100);
        assert_eq!(config.pipeline.outcome_queue, 100);
        assert_eq!(config.subject, "Recommendations for you");
        assert_eq!(
            config.default_thumbnail_url,
            "http://graphics8.nytimes.com/images/misc/spacer.gif"
        );
        assert_eq!(config.smtp.security, SmtpSecurity::None);
        assert_eq!(config.smtp.timeout(), Duration::from_secs(60));
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert_eq!(config.api.session_cookie, "session");
        assert!(config.user_url.is_none());
    }

    #[test]
    fn test_nested_sections_override_defaults() {
        let raw = r#"{
            "RecUrl": "http://recs/%s",
            "SmtpServer": "localhost",
            "SmtpFrom": "a@example.com",
            "Pipeline": { "Workers": 4, "RecordQueue": 8 },
            "Smtp": { "Security": "starttls", "TimeoutSecs": 5 },
            "Api": { "BindAddress": "0.0.0.0:9000", "DataFile": "list.csv" }
        }"#;
        let config = Config::from_json(raw).unwrap();
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.record_queue, 8);
        assert_eq!(config.pipeline.outcome_queue, 100);
        assert_eq!(config.smtp.security, SmtpSecurity::Starttls);
        assert_eq!(config.smtp.timeout(), Duration::from_secs(5));
        assert_eq!(config.api.bind_address.port(), 9000);
        assert_eq!(config.api.data_file, Some(PathBuf::from("list.csv")));
    }

    #[test]
    fn test_rec_url_requires_placeholder() {
        let raw = r#"{"RecUrl": "http://recs/users", "SmtpServer": "mx", "SmtpFrom": "a@b.c"}"#;
        match Config::from_json(raw) {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("RecUrl")),
            other => panic!("expected RecUrl config error, got {:?}", other),
        }
    }

    #[test]
    fn test_unparsable_json_is_config_error() {
        let result = Config::from_json("{ not json");
        assert!(matches!(result, Err(Error::Config { key: None, .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/recmailer.json");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.smtp_from, "bounces@example.com");
    }

    #[test]
    fn test_smtp_endpoint_parsing() {
        let mut config = Config::new("http://recs/%s", "mail.example.com:587", "a@b.c");
        assert_eq!(
            config.smtp_endpoint().unwrap(),
            ("mail.example.com".to_string(), 587)
        );

        config.smtp_server = "mail.example.com".into();
        assert_eq!(
            config.smtp_endpoint().unwrap(),
            ("mail.example.com".to_string(), 25)
        );

        config.smtp_server = "mail.example.com:smtp".into();
        assert!(config.smtp_endpoint().is_err());

        config.smtp_server = ":25".into();
        assert!(config.smtp_endpoint().is_err());
    }

    #[test]
    fn test_worker_bounds() {
        let mut config = Config::new("http://recs/%s", "mx", "a@b.c");
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());
        config.pipeline.workers = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_header_from_falls_back_to_smtp_from() {
        let mut config = Config::new("http://recs/%s", "mx", "bounces@example.com");
        assert_eq!(config.header_from(), "bounces@example.com");
        config.envelope_from = Some("recs@example.com".into());
        assert_eq!(config.header_from(), "recs@example.com");
    }

    #[test]
    fn test_expand_url_template_encodes_subject() {
        assert_eq!(
            expand_url_template("http://recs/users/%s/recs", "a b/c"),
            "http://recs/users/a%20b%2Fc/recs"
        );
        assert_eq!(expand_url_template("http://recs?id=%s", "42"), "http://recs?id=42");
    }
}
