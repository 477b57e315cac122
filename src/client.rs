use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{
    ACCEPT, FROM, HeaderMap, HeaderName, HeaderValue, LOCATION, RETRY_AFTER, USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::request::Request;
use crate::sources::resolve_base_url;

const USER_AGENT_VALUE: &str = concat!("interim-batch/", env!("CARGO_PKG_VERSION"));

const X_ECMWF_KEY: HeaderName = HeaderName::from_static("x-ecmwf-key");
const X_ECMWF_EMAIL: HeaderName = HeaderName::from_static("x-ecmwf-email");

/// Anything that can turn a request into a file on disk.
///
/// The batch driver only talks to this trait, so it can be exercised without
/// a network.
pub trait Retriever {
    /// Submit `request` and block until its `target` file has been written.
    fn retrieve(&self, request: &Request) -> Result<Transfer>;
}

#[derive(Clone)]
pub struct ClientOptions {
    /// Service name (`ecmwf`) or base URL.
    pub source: String,
    pub key: String,
    pub email: String,
    /// Poll interval used until the service sends `Retry-After`.
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub verify_tls: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            source: "ecmwf".to_string(),
            key: String::new(),
            email: String::new(),
            poll_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(60),
            verify_tls: true,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("source", &self.source)
            .field("key", &"<redacted>")
            .field("email", &self.email)
            .field("poll_interval", &self.poll_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

/// Outcome of one completed retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub target: PathBuf,
    pub href: String,
    pub size_bytes: u64,
}

/// Job state reported by the service while a request is queued or running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobStatus {
    Queued,
    Active,
    Complete,
    Aborted(String),
    Other(String),
}

impl JobStatus {
    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "queued" | "submitted" => JobStatus::Queued,
            "active" => JobStatus::Active,
            "complete" => JobStatus::Complete,
            "aborted" | "failed" | "rejected" => JobStatus::Aborted(s.to_string()),
            other => JobStatus::Other(other.to_string()),
        }
    }
}

/// Parsed reply from one API call.
#[derive(Debug)]
struct Reply {
    code: StatusCode,
    location: Option<Url>,
    retry_after: Option<Duration>,
    body: Value,
}

impl Reply {
    fn status(&self) -> Option<JobStatus> {
        self.body.get("status").and_then(Value::as_str).map(JobStatus::parse)
    }
}

/// Blocking client for the ECMWF Web API.
#[derive(Debug, Clone)]
pub struct Client {
    opts: ClientOptions,
    base_url: String,
    api: HttpClient,
    transfer: HttpClient,
}

impl Client {
    pub fn new(opts: ClientOptions) -> Result<Self> {
        let base_url = resolve_base_url(&opts.source)
            .ok_or_else(|| Error::Config(format!("unknown source: {}", opts.source)))?;
        if opts.key.trim().is_empty() {
            return Err(Error::Config("no API key configured".into()));
        }
        if opts.email.trim().is_empty() {
            return Err(Error::Config("no API email configured".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(X_ECMWF_KEY, header_value(&opts.key, "key")?);
        headers.insert(X_ECMWF_EMAIL, header_value(&opts.email, "email")?);
        headers.insert(FROM, header_value(&opts.email, "email")?);

        // The API signals job hand-off with 303 + Location, which we follow ourselves.
        let api = HttpClient::builder()
            .default_headers(headers)
            .redirect(Policy::none())
            .connect_timeout(opts.connect_timeout)
            .danger_accept_invalid_certs(!opts.verify_tls)
            .build()?;

        let mut transfer_headers = HeaderMap::new();
        transfer_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        let transfer = HttpClient::builder()
            .default_headers(transfer_headers)
            .connect_timeout(opts.connect_timeout)
            .timeout(None)
            .danger_accept_invalid_certs(!opts.verify_tls)
            .build()?;

        Ok(Self {
            opts,
            base_url,
            api,
            transfer,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit, wait for completion, download to the request's `target`, then
    /// delete the server-side job.
    pub fn retrieve(&self, request: &Request) -> Result<Transfer> {
        let dataset = request
            .get_str("dataset")
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::InvalidRequest("request has no dataset".into()))?;
        let target = request
            .get_str("target")
            .filter(|t| !t.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| Error::InvalidRequest("request has no target".into()))?;

        let url = requests_url(&self.base_url, &dataset)?;
        info!(%url, target = %target.display(), "submitting request");

        let reply = self.call(self.api.post(url.clone()).json(&request.to_payload()), &url)?;
        let Some(location) = reply.location.clone() else {
            return Err(Error::Service(
                "submission accepted without a Location to poll".into(),
            ));
        };

        let outcome = self.wait_and_fetch(reply, &location, &target);
        self.cleanup(&location);
        outcome
    }

    fn wait_and_fetch(&self, mut reply: Reply, location: &Url, target: &Path) -> Result<Transfer> {
        let mut location = location.clone();
        let mut interval = self.opts.poll_interval;
        let mut last_status = None;

        loop {
            if let Some(d) = reply.retry_after {
                interval = poll_delay(self.opts.poll_interval, d);
            }
            if let Some(l) = reply.location.take() {
                location = l;
            }

            let status = reply.status();
            if status != last_status {
                if let Some(s) = &status {
                    info!(status = ?s, "request status");
                }
                last_status = status.clone();
            }

            // Without a status field, 200 or 303 means the job is done.
            let finished = match status {
                Some(JobStatus::Complete) => true,
                Some(JobStatus::Aborted(s)) => return Err(Error::Aborted(s)),
                Some(_) => false,
                None => matches!(reply.code, StatusCode::OK | StatusCode::SEE_OTHER),
            };
            if finished {
                if reply.body.get("href").is_none() {
                    reply = self.call(self.api.get(location.clone()), &location)?;
                }
                break;
            }

            debug!(secs = interval.as_secs_f64(), %location, "polling");
            std::thread::sleep(interval);
            reply = self.call(self.api.get(location.clone()), &location)?;
        }

        let href = reply
            .body
            .get("href")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Service("completed request has no href".into()))?
            .to_string();
        let expected = reply.body.get("size").and_then(Value::as_u64);

        let size_bytes = self.download(&href, target, expected)?;
        Ok(Transfer {
            target: target.to_path_buf(),
            href,
            size_bytes,
        })
    }

    /// Stream `href` to `<target>.part`, check its size, then move it into place.
    fn download(&self, href: &str, target: &Path, expected: Option<u64>) -> Result<u64> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let part = part_path(target);

        info!(%href, size = ?expected, "transferring result");
        let mut resp = self.transfer.get(href).send()?.error_for_status()?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&part)?;
        let written = resp.copy_to(&mut file)?;
        file.sync_all()?;
        drop(file);

        if let Some(expected) = expected {
            if expected != written {
                let _ = fs::remove_file(&part);
                return Err(Error::SizeMismatch {
                    expected,
                    actual: written,
                });
            }
        }

        fs::rename(&part, target)?;
        info!(target = %target.display(), bytes = written, "transfer complete");
        Ok(written)
    }

    fn cleanup(&self, location: &Url) {
        match self.api.delete(location.clone()).send() {
            Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND => {
                debug!(%location, "request deleted");
            }
            Ok(resp) => warn!(%location, status = %resp.status(), "failed to delete request"),
            Err(e) => warn!(%location, error = %e, "failed to delete request"),
        }
    }

    fn call(&self, builder: reqwest::blocking::RequestBuilder, url: &Url) -> Result<Reply> {
        let resp = builder.send()?;
        self.read_reply(resp, url)
    }

    fn read_reply(&self, resp: Response, url: &Url) -> Result<Reply> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let text = resp.text()?;

        if !(status.is_success() || status == StatusCode::SEE_OTHER) {
            return Err(Error::Status {
                status,
                message: error_message(&text).unwrap_or_else(|| text.trim().to_string()),
            });
        }

        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        if let Some(messages) = body.get("messages").and_then(Value::as_array) {
            for m in messages {
                if let Some(m) = m.as_str() {
                    info!(target: "ecmwf", "{m}");
                }
            }
        }
        if let Some(e) = body.get("error") {
            let msg = e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string());
            return Err(Error::Service(msg));
        }

        let location = match headers.get(LOCATION).and_then(|v| v.to_str().ok()) {
            Some(loc) if matches!(status.as_u16(), 201 | 202 | 303) => Some(url.join(loc)?),
            _ => None,
        };
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        Ok(Reply {
            code: status,
            location,
            retry_after,
            body,
        })
    }
}

impl Retriever for Client {
    fn retrieve(&self, request: &Request) -> Result<Transfer> {
        Client::retrieve(self, request)
    }
}

fn header_value(v: &str, what: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(v.trim())
        .map_err(|_| Error::Config(format!("API {what} contains invalid characters")))
}

pub(crate) fn requests_url(base_url: &str, dataset: &str) -> Result<Url> {
    Ok(Url::parse(&format!(
        "{}/datasets/{}/requests",
        base_url.trim_end_matches('/'),
        dataset
    ))?)
}

/// Server-requested wait, never shorter than the configured poll interval.
pub(crate) fn poll_delay(configured: Duration, retry_after: Duration) -> Duration {
    retry_after.max(configured)
}

pub(crate) fn parse_retry_after(v: &str) -> Option<Duration> {
    v.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Pull the `error` field out of a JSON error body.
pub(crate) fn error_message(text: &str) -> Option<String> {
    let v: Value = serde_json::from_str(text).ok()?;
    match v.get("error")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn part_path(target: &Path) -> PathBuf {
    let mut p = target.as_os_str().to_owned();
    p.push(".part");
    PathBuf::from(p)
}
