use crate::error::AppError;
use crate::fetcher::{HttpFetcher, PageSource, RequestConfig};

const BEIJING_KEY: &str = "bj";
const BEIJING_URL: &str = "https://esf.fang.com/";
const MAX_KEY_LEN: usize = 16;

/// Resolves a city code to the base URL of its second-hand listing pages.
/// Beijing lives on the bare domain; every other city on its own subdomain.
pub fn resolve_source_url(source_key: &str) -> Result<String, AppError> {
    let key = source_key.trim();
    if key.is_empty() {
        return Err(AppError::validation("source_key is required"));
    }
    if key.len() > MAX_KEY_LEN
        || !key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(AppError::validation(format!(
            "source_key must be a lowercase city code, got {:?}",
            source_key
        )));
    }

    if key == BEIJING_KEY {
        Ok(BEIJING_URL.to_string())
    } else {
        Ok(format!("https://{}.esf.fang.com/", key))
    }
}

/// Opens a [`PageSource`] for a source key.
pub trait SourceProvider: Send + Sync {
    fn open(&self, source_key: &str) -> Result<Box<dyn PageSource>, AppError>;
}

/// Production provider: resolves the key and fetches over HTTP.
pub struct HttpSourceProvider {
    template: RequestConfig,
}

impl HttpSourceProvider {
    /// `template` supplies headers, timeout and pacing; its base URL is replaced per source.
    pub fn new(template: RequestConfig) -> Self {
        Self { template }
    }
}

impl SourceProvider for HttpSourceProvider {
    fn open(&self, source_key: &str) -> Result<Box<dyn PageSource>, AppError> {
        let url = resolve_source_url(source_key)?;
        let fetcher = HttpFetcher::new(self.template.for_source(url))
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Box::new(fetcher))
    }
}
