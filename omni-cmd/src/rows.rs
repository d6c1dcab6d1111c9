//! Writing decoded report rows as CSV.

use omni_api::decode::DATETIME;
use omni_api::Row;
use std::io::Write;

/// Union of the row keys in sorted order, with `datetime` first.
pub fn columns(rows: &[Row]) -> Vec<String> {
    let mut columns = rows
        .iter()
        .flat_map(|row| row.keys().cloned())
        .collect::<std::collections::BTreeSet<String>>()
        .into_iter()
        .collect::<Vec<String>>();
    if let Some(index) = columns.iter().position(|c| c == DATETIME) {
        let datetime = columns.remove(index);
        columns.insert(0, datetime);
    }
    columns
}

/// Write `rows` with a header; cells a row lacks are left empty.
pub fn write_csv<W: Write>(writer: W, rows: &[Row]) -> anyhow::Result<()> {
    let columns = columns(rows);
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(&columns)?;
    for row in rows {
        let record = columns
            .iter()
            .map(|column| row.get(column).map(|cell| cell.to_string()).unwrap_or_default())
            .collect::<Vec<String>>();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
