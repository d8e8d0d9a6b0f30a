use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::error::AppError;
use crate::fetcher::PageSource;
use crate::models::CandidateRecord;
use crate::scraper::{self, ListingSelectors};
use crate::store::Store;

pub const DEFAULT_PAGES: u32 = 5;

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub pages: u32,
    pub selectors: ListingSelectors,
}

impl IngestionOptions {
    pub fn with_pages(pages: u32) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            pages: DEFAULT_PAGES,
            selectors: ListingSelectors::default(),
        }
    }
}

/// Everything one ingestion job produced, before touching the store.
#[derive(Debug, Default)]
pub struct IngestionReport {
    pub records: Vec<CandidateRecord>,
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub malformed: usize,
    pub incomplete: usize,
    pub normalization_misses: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionOutcome {
    pub found: usize,
    pub inserted: usize,
    pub pages_failed: u32,
}

/// Walks pages `1..=pages` of `source` in order and parses every listing.
///
/// A page that fails to fetch is logged and treated as empty. The pacing
/// delay is applied between successive fetches, not after the last one.
pub fn run_ingestion(
    source: &dyn PageSource,
    options: &IngestionOptions,
    progress: Option<&ProgressBar>,
) -> IngestionReport {
    let mut report = IngestionReport::default();
    let pacing = source.pacing();

    for page in 1..=options.pages {
        if page > 1 {
            pacing.wait();
        }

        if let Some(bar) = progress {
            bar.set_message(format!("page {}/{}", page, options.pages));
        }
        info!("Scraping {} page {}/{}", source.describe(), page, options.pages);

        match source.fetch_page(page) {
            Ok(markup) => {
                let parsed = scraper::parse_listings_with(&markup, &options.selectors);
                report.pages_fetched += 1;
                report.malformed += parsed.malformed;
                report.incomplete += parsed.incomplete;
                report.normalization_misses += parsed
                    .records
                    .iter()
                    .map(CandidateRecord::normalization_misses)
                    .sum::<usize>();
                info!("Page {}: found {} listings", page, parsed.records.len());
                report.records.extend(parsed.records);
            }
            Err(e) => {
                warn!("Skipping page {}: {}", page, e);
                report.pages_failed += 1;
            }
        }

        if let Some(bar) = progress {
            bar.inc(1);
        }
    }

    info!(
        "Scraped {} listings from {} ({} pages ok, {} failed, {} malformed, {} field misses)",
        report.records.len(),
        source.describe(),
        report.pages_fetched,
        report.pages_failed,
        report.malformed,
        report.normalization_misses
    );
    report
}

/// One full ingestion job followed by a single batch upsert.
pub fn ingest_and_store(
    store: &Store,
    source: &dyn PageSource,
    options: &IngestionOptions,
    progress: Option<&ProgressBar>,
) -> Result<IngestionOutcome, AppError> {
    let report = run_ingestion(source, options, progress);
    let inserted = if report.records.is_empty() {
        0
    } else {
        store.upsert_batch(&report.records)?
    };

    Ok(IngestionOutcome {
        found: report.records.len(),
        inserted,
        pages_failed: report.pages_failed,
    })
}
