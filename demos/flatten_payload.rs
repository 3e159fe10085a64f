use balance_sheet_flattener::{process_json_str, records_to_csv, ValidationConfig};
use std::fs;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/balance_sheet_payload.json".to_string());

    println!("Loading balance sheet from {}", path);
    let payload = fs::read_to_string(&path)?;

    let outcome = process_json_str(&payload, &ValidationConfig::default())?;
    println!("{}", outcome.report.to_markdown());

    match outcome.records {
        Some(records) => {
            println!("Flattened {} accounts:\n", records.len());
            print!("{}", records_to_csv(&records)?);
        }
        None => {
            println!("Balance sheet does not add up; no rows were produced.");
            std::process::exit(1);
        }
    }

    Ok(())
}
