//! Text normalization for the noisy fields of a listing.
//!
//! None of these functions fail: a fragment that does not match its pattern
//! comes back as [`Normalized::Unparsed`] with the original text.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::MalformedAttribute;
use crate::models::Normalized;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());
static PRICE_WAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)万").unwrap());
static PRICE_YUAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)元").unwrap());
static BUILD_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})年建").unwrap());

const ATTRIBUTE_DELIMITER: char = '|';
const ATTRIBUTE_FIELDS: usize = 6;
const YUAN_PER_WAN: f64 = 10_000.0;

/// The six positional parts of a composite attribute fragment,
/// e.g. `3室2厅|91㎡|中层（共18层）|南向|2024年建|郭星`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFields {
    pub room_type: String,
    pub area: String,
    pub floor: String,
    pub orientation: String,
    pub build_year: String,
    pub owner_name: String,
}

pub fn split_attributes(text: &str) -> Result<AttributeFields, MalformedAttribute> {
    let fields: Vec<&str> = text.split(ATTRIBUTE_DELIMITER).map(str::trim).collect();
    if fields.len() != ATTRIBUTE_FIELDS {
        return Err(MalformedAttribute {
            fields: fields.len(),
            raw: text.to_string(),
        });
    }

    Ok(AttributeFields {
        room_type: fields[0].to_string(),
        area: fields[1].to_string(),
        floor: fields[2].to_string(),
        orientation: fields[3].to_string(),
        build_year: fields[4].to_string(),
        owner_name: fields[5].to_string(),
    })
}

/// First numeric token of the fragment, e.g. `91㎡` -> 91.0.
pub fn normalize_area(text: &str) -> Normalized<f64> {
    match first_number(&NUMBER_RE, text) {
        Some(area) => Normalized::Parsed(area),
        None => miss("area", text),
    }
}

/// Total price in 万 units. A `万` amount wins; otherwise a `元` amount is scaled down.
pub fn normalize_price(text: &str) -> Normalized<f64> {
    if let Some(price) = first_number(&PRICE_WAN_RE, text) {
        return Normalized::Parsed(price);
    }
    if let Some(yuan) = first_number(&PRICE_YUAN_RE, text) {
        return Normalized::Parsed(yuan / YUAN_PER_WAN);
    }
    miss("price", text)
}

/// Four-digit year followed by `年建`. A bare year is not accepted.
pub fn normalize_build_year(text: &str) -> Normalized<i32> {
    let year = BUILD_YEAR_RE
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok());

    match year {
        Some(year) => Normalized::Parsed(year),
        None => miss("build year", text),
    }
}

fn first_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn miss<T>(field: &str, text: &str) -> Normalized<T> {
    debug!("{} did not match its pattern: {:?}", field, text);
    Normalized::Unparsed(text.to_string())
}
