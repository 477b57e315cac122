//! Process configuration.
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `INTERIM_*` environment variables
//! (`INTERIM_YEARS__START=1990`, `INTERIM_SERVICE__KEY=...`).
//!
//! API credentials fall back to the conventional `ECMWF_API_URL`,
//! `ECMWF_API_KEY` and `ECMWF_API_EMAIL` variables and finally to the
//! `~/.ecmwfapirc` JSON file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

use crate::area::{BoundingBox, Grid};
use crate::client::ClientOptions;
use crate::date::YearRange;
use crate::error::{Error, Result};
use crate::request::RequestValue;
use crate::plan::RequestTemplate;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "interim-batch.toml";
pub const ENV_PREFIX: &str = "INTERIM";
pub const RC_FILE: &str = ".ecmwfapirc";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service: ServiceSettings,
    pub years: YearSettings,
    pub request: RequestSettings,
    pub output: OutputSettings,
    pub retry: RetrySettings,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name or base URL.
    pub url: Option<String>,
    pub key: Option<String>,
    pub email: Option<String>,
    pub poll_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub verify_tls: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            url: None,
            key: None,
            email: None,
            poll_interval_secs: 5,
            connect_timeout_secs: 60,
            verify_tls: true,
        }
    }
}

impl std::fmt::Debug for ServiceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSettings")
            .field("url", &self.url)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("email", &self.email)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YearSettings {
    /// First year, inclusive.
    pub start: i32,
    /// Last year, exclusive.
    pub end: i32,
}

impl Default for YearSettings {
    fn default() -> Self {
        Self {
            start: 1980,
            end: 2020,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    pub class: String,
    pub dataset: String,
    pub expver: String,
    pub grid: String,
    pub levtype: String,
    /// Slash-separated parameter codes.
    pub param: String,
    pub stream: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// north/west/south/east
    pub area: String,
    pub format: String,
}

impl Default for RequestSettings {
    fn default() -> Self {
        let t = RequestTemplate::default();
        Self {
            class: t.class,
            dataset: t.dataset,
            expver: t.expver,
            grid: t.grid.to_string(),
            levtype: t.levtype,
            param: t.params.join("/"),
            stream: t.stream,
            kind: t.kind,
            area: t.area.to_string(),
            format: t.format,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub file_prefix: String,
    pub extension: String,
    /// Completion ledger; defaults to `<dir>/.interim-ledger.json`.
    pub ledger: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        let t = RequestTemplate::default();
        Self {
            dir: t.output_dir,
            file_prefix: t.file_prefix,
            extension: t.extension,
            ledger: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_secs: u64,
    pub multiplier: f64,
    pub max_backoff_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let p = RetryPolicy::default();
        Self {
            max_attempts: p.max_attempts,
            initial_backoff_secs: p.initial_backoff.as_secs(),
            multiplier: p.multiplier,
            max_backoff_secs: p.max_backoff.as_secs(),
        }
    }
}

/// Resolved service endpoint and credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub key: String,
    pub email: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RcFile {
    url: Option<String>,
    key: Option<String>,
    email: Option<String>,
}

impl Settings {
    /// Load settings from `path` (required when given) or from
    /// `interim-batch.toml` in the working directory (optional), then apply
    /// the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`Settings::load`], but reads `INTERIM_*` variables from `env`
    /// instead of the process environment when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        debug!(?settings, "settings loaded");
        Ok(settings)
    }

    pub fn year_range(&self) -> Result<YearRange> {
        YearRange::new(self.years.start, self.years.end)
    }

    pub fn template(&self) -> Result<RequestTemplate> {
        let r = &self.request;
        let params = RequestValue::parse_auto(&r.param).as_strings();
        if params.iter().all(|p| p.is_empty()) {
            return Err(Error::Config("request.param must name at least one parameter".into()));
        }
        for (name, v) in [
            ("class", &r.class),
            ("dataset", &r.dataset),
            ("stream", &r.stream),
            ("type", &r.kind),
            ("format", &r.format),
        ] {
            if v.trim().is_empty() {
                return Err(Error::Config(format!("request.{name} must not be empty")));
            }
        }

        Ok(RequestTemplate {
            class: r.class.clone(),
            dataset: r.dataset.clone(),
            expver: r.expver.clone(),
            grid: r.grid.parse::<Grid>()?,
            levtype: r.levtype.clone(),
            params,
            stream: r.stream.clone(),
            kind: r.kind.clone(),
            area: r.area.parse::<BoundingBox>()?,
            format: r.format.clone(),
            output_dir: self.output.dir.clone(),
            file_prefix: self.output.file_prefix.clone(),
            extension: self.output.extension.clone(),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            initial_backoff: Duration::from_secs(self.retry.initial_backoff_secs),
            multiplier: if self.retry.multiplier >= 1.0 {
                self.retry.multiplier
            } else {
                1.0
            },
            max_backoff: Duration::from_secs(self.retry.max_backoff_secs),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.output
            .ledger
            .clone()
            .unwrap_or_else(|| self.output.dir.join(".interim-ledger.json"))
    }

    /// Resolve credentials from settings, the `ECMWF_API_*` environment and
    /// `~/.ecmwfapirc`, in that order, field by field.
    pub fn credentials(&self) -> Result<Credentials> {
        let rc = dirs::home_dir().map(|h| h.join(RC_FILE));
        self.credentials_from(|k| std::env::var(k).ok(), rc.as_deref())
    }

    pub fn credentials_from(
        &self,
        env: impl Fn(&str) -> Option<String>,
        rc_path: Option<&Path>,
    ) -> Result<Credentials> {
        let rc = match rc_path {
            Some(p) if p.exists() => read_rc_file(p)?,
            _ => RcFile::default(),
        };
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let url = non_empty(self.service.url.clone())
            .or_else(|| non_empty(env("ECMWF_API_URL")))
            .or_else(|| non_empty(rc.url.clone()))
            .unwrap_or_else(|| "ecmwf".to_string());
        let key = non_empty(self.service.key.clone())
            .or_else(|| non_empty(env("ECMWF_API_KEY")))
            .or_else(|| non_empty(rc.key.clone()))
            .ok_or_else(|| {
                Error::Config(
                    "no API key: set INTERIM_SERVICE__KEY, ECMWF_API_KEY or ~/.ecmwfapirc".into(),
                )
            })?;
        let email = non_empty(self.service.email.clone())
            .or_else(|| non_empty(env("ECMWF_API_EMAIL")))
            .or_else(|| non_empty(rc.email.clone()))
            .ok_or_else(|| {
                Error::Config(
                    "no API email: set INTERIM_SERVICE__EMAIL, ECMWF_API_EMAIL or ~/.ecmwfapirc"
                        .into(),
                )
            })?;

        Ok(Credentials { url, key, email })
    }

    pub fn client_options(&self, creds: Credentials) -> ClientOptions {
        ClientOptions {
            source: creds.url,
            key: creds.key,
            email: creds.email,
            poll_interval: Duration::from_secs(self.service.poll_interval_secs.max(1)),
            connect_timeout: Duration::from_secs(self.service.connect_timeout_secs),
            verify_tls: self.service.verify_tls,
        }
    }
}

fn read_rc_file(path: &Path) -> Result<RcFile> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
}
