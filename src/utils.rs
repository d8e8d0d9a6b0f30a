use crate::models::ListingRecord;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Writes listings as CSV with a header row; null numeric fields become empty cells.
pub fn write_listings_csv<W: Write>(listings: &[ListingRecord], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(ListingRecord::CSV_HEADER)?;

    for listing in listings {
        writer.write_record(listing.to_csv_record())?;
    }

    writer.flush()?;
    Ok(())
}

pub fn save_listings_to_csv(listings: &[ListingRecord], output_path: &str) -> Result<()> {
    let path = Path::new(output_path);
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", output_path))?;

    write_listings_csv(listings, file)?;
    info!("Saved {} listings to {}", listings.len(), output_path);

    Ok(())
}
