//! `cardwise import`: Load knowledge cards into a business catalog.

use crate::runtime::Runtime;
use cardwise_core::card::CardMetadata;
use cardwise_store::parse_card_file;
use std::path::Path;

pub async fn run(file: &Path, business: &str) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("Cannot read {}: {e}", file.display()))?;
    let records = parse_card_file(&content)?;

    // Report metadata problems up front; the fields are ignored at load time.
    for record in &records {
        if let Some(raw) = &record.metadata {
            let (_, problems) = CardMetadata::parse(&record.id, raw);
            for problem in problems {
                eprintln!("  warning: {problem}");
            }
        }
    }

    let runtime = Runtime::load().await?;
    let written = runtime.store.import_cards(business, records).await?;
    println!("Imported {written} card(s) for business '{business}'");
    Ok(())
}
