use crate::error::{BalanceSheetError, Result};
use crate::flattener::FlatAccountRecord;
use std::collections::BTreeSet;

const FIXED_COLUMNS: [&str; 4] = ["account_id", "account_name", "value", "path"];

/// Sorted union of every dimension key used by the records.
pub fn dimension_columns(records: &[FlatAccountRecord]) -> Vec<String> {
    let keys: BTreeSet<&String> = records.iter().flat_map(|r| r.dimensions.keys()).collect();
    keys.into_iter().cloned().collect()
}

/// Renders the flat table as CSV: the fixed account columns followed by one
/// column per dimension key. Rows lacking a dimension leave the cell empty.
pub fn records_to_csv(records: &[FlatAccountRecord]) -> Result<String> {
    let dimensions = dimension_columns(records);
    let mut writer = csv::Writer::from_writer(Vec::new());

    let header: Vec<&str> = FIXED_COLUMNS
        .iter()
        .copied()
        .chain(dimensions.iter().map(String::as_str))
        .collect();
    writer.write_record(&header)?;

    for record in records {
        let mut row = vec![
            record.account_id.clone().unwrap_or_default(),
            record.account_name.clone(),
            record.value.to_string(),
            record.path_string(),
        ];
        row.extend(
            dimensions
                .iter()
                .map(|key| record.dimensions.get(key).cloned().unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| BalanceSheetError::IoError(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| {
        BalanceSheetError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

pub fn records_to_json(records: &[FlatAccountRecord]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}
