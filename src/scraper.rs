use std::sync::LazyLock;

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::models::CandidateRecord;
use crate::parser;

static DEFAULT_SELECTORS: LazyLock<ListingSelectors> = LazyLock::new(|| {
    ListingSelectors::new(
        "div.shop_list > dl",
        "p.tel_shop",
        "p.add_shop",
        "p.label",
        "dd.price_right",
    )
    .unwrap()
});

/// CSS selectors locating one listing and its four text fragments.
///
/// Fragment selectors are evaluated inside each container, so a listing that
/// lacks a fragment cannot shift its neighbours' data.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    container: Selector,
    attributes: Selector,
    address: Selector,
    description: Selector,
    price: Selector,
}

impl ListingSelectors {
    pub fn new(
        container: &str,
        attributes: &str,
        address: &str,
        description: &str,
        price: &str,
    ) -> Result<Self> {
        Ok(Self {
            container: parse_selector(container)?,
            attributes: parse_selector(attributes)?,
            address: parse_selector(address)?,
            description: parse_selector(description)?,
            price: parse_selector(price)?,
        })
    }
}

impl Default for ListingSelectors {
    fn default() -> Self {
        DEFAULT_SELECTORS.clone()
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("Failed to parse selector {:?}: {:?}", selector, e))
}

/// Result of parsing one listing page.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub records: Vec<CandidateRecord>,
    /// Listings dropped because the attribute fragment did not have six fields.
    pub malformed: usize,
    /// Containers missing one of the four fragments.
    pub incomplete: usize,
}

/// Raw text of the four fragments of one listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFragments {
    pub attributes: String,
    pub address: String,
    pub description: String,
    pub price: String,
}

pub fn parse_listings(markup: &str) -> Vec<CandidateRecord> {
    parse_listings_with(markup, &DEFAULT_SELECTORS).records
}

pub fn parse_listings_with(markup: &str, selectors: &ListingSelectors) -> ParsedPage {
    let document = Html::parse_document(markup);
    let mut page = ParsedPage::default();

    for (index, container) in document.select(&selectors.container).enumerate() {
        let Some(fragments) = extract_fragments(container, selectors) else {
            debug!("Listing {} is missing a fragment, skipping", index);
            page.incomplete += 1;
            continue;
        };

        match build_candidate(&fragments) {
            Some(record) => page.records.push(record),
            None => page.malformed += 1,
        }
    }

    debug!(
        "Parsed {} listings ({} malformed, {} incomplete)",
        page.records.len(),
        page.malformed,
        page.incomplete
    );
    page
}

fn extract_fragments(container: ElementRef, selectors: &ListingSelectors) -> Option<ListingFragments> {
    Some(ListingFragments {
        attributes: fragment_text(container, &selectors.attributes)?,
        address: fragment_text(container, &selectors.address)?,
        description: fragment_text(container, &selectors.description)?,
        price: fragment_text(container, &selectors.price)?,
    })
}

/// Text of the first match below `container`, trimmed pieces joined without separator.
fn fragment_text(container: ElementRef, selector: &Selector) -> Option<String> {
    container.select(selector).next().map(|element| {
        element
            .text()
            .map(str::trim)
            .filter(|piece| !piece.is_empty())
            .collect::<String>()
    })
}

/// Combines the fragments into a candidate. `None` when the attribute
/// fragment is malformed; numeric misses only null the field.
pub fn build_candidate(fragments: &ListingFragments) -> Option<CandidateRecord> {
    let fields = match parser::split_attributes(&fragments.attributes) {
        Ok(fields) => fields,
        Err(e) => {
            warn!(
                "Malformed attribute fragment ({}), address: {}, price: {}",
                e, fragments.address, fragments.price
            );
            return None;
        }
    };

    Some(CandidateRecord {
        area: parser::normalize_area(&fields.area),
        build_year: parser::normalize_build_year(&fields.build_year),
        price: parser::normalize_price(&fragments.price),
        room_type: fields.room_type,
        floor: fields.floor,
        orientation: fields.orientation,
        owner_name: fields.owner_name,
        address: fragments.address.clone(),
        description: fragments.description.clone(),
    })
}
