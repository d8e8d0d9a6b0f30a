use serde::{Deserialize, Serialize};

/// Outcome of normalizing one raw text fragment.
///
/// `Unparsed` keeps the original text so callers can tell a field that failed
/// its pattern apart from one that was never there.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized<T> {
    Parsed(T),
    Unparsed(String),
}

impl<T: Copy> Normalized<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Normalized::Parsed(value) => Some(*value),
            Normalized::Unparsed(_) => None,
        }
    }
}

impl<T> Normalized<T> {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Normalized::Parsed(_))
    }

    pub fn raw(&self) -> Option<&str> {
        match self {
            Normalized::Parsed(_) => None,
            Normalized::Unparsed(raw) => Some(raw),
        }
    }
}

/// A listing extracted from one page and normalized, not yet checked against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub room_type: String,
    pub area: Normalized<f64>,
    pub floor: String,
    pub orientation: String,
    pub build_year: Normalized<i32>,
    pub owner_name: String,
    pub address: String,
    pub description: String,
    /// Total price in units of 10,000 (万).
    pub price: Normalized<f64>,
}

impl CandidateRecord {
    /// Number of numeric fields that failed normalization.
    pub fn normalization_misses(&self) -> usize {
        [
            self.area.is_parsed(),
            self.build_year.is_parsed(),
            self.price.is_parsed(),
        ]
        .iter()
        .filter(|parsed| !**parsed)
        .count()
    }
}

/// A persisted listing. Write-once: the store has no update or delete path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: i64,
    pub room_type: String,
    pub area: Option<f64>,
    pub floor: String,
    pub orientation: String,
    pub build_year: Option<i32>,
    pub owner_name: String,
    pub address: String,
    pub description: String,
    pub price: Option<f64>,
}

impl ListingRecord {
    pub const CSV_HEADER: [&'static str; 10] = [
        "id",
        "room_type",
        "area",
        "floor",
        "orientation",
        "build_year",
        "owner_name",
        "address",
        "description",
        "price",
    ];

    /// Flattens the record for CSV export; nulls become empty cells.
    pub fn to_csv_record(&self) -> Vec<String> {
        fn opt<T: ToString>(value: Option<T>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }

        vec![
            self.id.to_string(),
            self.room_type.clone(),
            opt(self.area),
            self.floor.clone(),
            self.orientation.clone(),
            opt(self.build_year),
            self.owner_name.clone(),
            self.address.clone(),
            self.description.clone(),
            opt(self.price),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate() -> CandidateRecord {
        CandidateRecord {
            room_type: "3室2厅".to_string(),
            area: Normalized::Parsed(91.0),
            floor: "中层（共18层）".to_string(),
            orientation: "南向".to_string(),
            build_year: Normalized::Unparsed("年代不详".to_string()),
            owner_name: "郭星".to_string(),
            address: "望京西园".to_string(),
            description: "满五唯一".to_string(),
            price: Normalized::Parsed(560.0),
        }
    }

    #[test]
    fn normalized_value_and_raw() {
        let parsed: Normalized<f64> = Normalized::Parsed(91.0);
        let missed: Normalized<f64> = Normalized::Unparsed("abc".to_string());

        assert_eq!(parsed.value(), Some(91.0));
        assert_eq!(parsed.raw(), None);
        assert_eq!(missed.value(), None);
        assert_eq!(missed.raw(), Some("abc"));
    }

    #[test]
    fn counts_normalization_misses() {
        assert_eq!(sample_candidate().normalization_misses(), 1);
    }

    #[test]
    fn csv_record_leaves_nulls_empty() {
        let record = ListingRecord {
            id: 7,
            room_type: "2室1厅".to_string(),
            area: Some(67.4),
            floor: "低层".to_string(),
            orientation: "南北向".to_string(),
            build_year: None,
            owner_name: "王女士".to_string(),
            address: "天通苑".to_string(),
            description: String::new(),
            price: None,
        };

        let row = record.to_csv_record();
        assert_eq!(row.len(), ListingRecord::CSV_HEADER.len());
        assert_eq!(row[2], "67.4");
        assert_eq!(row[5], "");
        assert_eq!(row[9], "");
    }
}
