use std::borrow::Cow;
use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use encoding_rs::{Encoding, GB18030, UTF_8};
use rand::Rng;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::Url;
use tracing::{debug, warn};

use crate::error::FetchError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CHARSET_SNIFF_LIMIT: usize = 2048;

static META_CHARSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_\-:.]+)"#).unwrap()
});

/// Politeness delay between successive page fetches of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// A delay drawn uniformly from `[min, max]`.
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    pub fn wait(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            debug!("Waiting {:.2}s before next page", delay.as_secs_f64());
            thread::sleep(delay);
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(3))
    }
}

/// Everything needed to request pages of one source. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    pacing: Pacing,
}

impl RequestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: browser_headers(DEFAULT_USER_AGENT),
            timeout: DEFAULT_TIMEOUT,
            pacing: Pacing::default(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.headers = browser_headers(user_agent);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Same settings against another source.
    pub fn for_source(&self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Base URL with `page=<n>` appended to its query.
    pub fn page_url(&self, page: u32) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| FetchError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        Ok(url)
    }
}

fn browser_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let user_agent = HeaderValue::from_str(user_agent).unwrap_or_else(|_| {
        warn!("Invalid user agent {:?}, using default", user_agent);
        HeaderValue::from_static(DEFAULT_USER_AGENT)
    });
    headers.insert(USER_AGENT, user_agent);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"));
    headers
}

/// A paged listing source the ingestion pipeline can walk.
pub trait PageSource {
    /// Human readable name for logs.
    fn describe(&self) -> &str;

    fn pacing(&self) -> Pacing;

    fn fetch_page(&self, page: u32) -> Result<String, FetchError>;
}

/// Fetches one page of a source. No retries.
pub fn fetch(client: &Client, config: &RequestConfig, page: u32) -> Result<String, FetchError> {
    let url = config.page_url(page)?;
    debug!("Fetching listing page: {}", url);

    let response = client
        .get(url.clone())
        .headers(config.headers.clone())
        .timeout(config.timeout)
        .send()
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.bytes().map_err(|source| FetchError::Body {
        url: url.to_string(),
        source,
    })?;

    Ok(decode_body(&body, content_type.as_deref()).into_owned())
}

/// HTTP implementation of [`PageSource`] over a blocking reqwest client.
pub struct HttpFetcher {
    client: Client,
    config: RequestConfig,
}

impl HttpFetcher {
    pub fn new(config: RequestConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| FetchError::Transport {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }
}

impl PageSource for HttpFetcher {
    fn describe(&self) -> &str {
        &self.config.base_url
    }

    fn pacing(&self) -> Pacing {
        self.config.pacing
    }

    fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
        fetch(&self.client, &self.config, page)
    }
}

/// Decodes a response body with its apparent encoding.
pub fn decode_body<'a>(bytes: &'a [u8], content_type: Option<&str>) -> Cow<'a, str> {
    let encoding = detect_encoding(bytes, content_type);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        debug!("Body contained bytes invalid for {}", encoding.name());
    }
    text
}

/// Picks the body charset: header, BOM, `<meta>` declaration, UTF-8 validity, then GB18030.
pub fn detect_encoding(bytes: &[u8], content_type: Option<&str>) -> &'static Encoding {
    if let Some(encoding) = content_type.and_then(charset_from_content_type) {
        return encoding;
    }
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }

    let head = &bytes[..bytes.len().min(CHARSET_SNIFF_LIMIT)];
    if let Some(encoding) = sniff_meta_charset(head) {
        return encoding;
    }

    if std::str::from_utf8(bytes).is_ok() {
        UTF_8
    } else {
        GB18030
    }
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        Encoding::for_label(value.trim().trim_matches(|c| c == '"' || c == '\'').as_bytes())
    })
}

fn sniff_meta_charset(head: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(head);
    let label = META_CHARSET_RE.captures(&head)?.get(1)?.as_str().to_owned();
    Encoding::for_label(label.as_bytes())
}
