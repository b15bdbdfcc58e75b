//! CSV codec for attribute [`Table`]s.
//!
//! Column kinds are inferred on read: a column is
//! [`FieldKind::Double`] when every non-empty cell is a finite number and
//! no cell is a zero-padded code (`"06037"`). Everything else stays text so
//! that identifiers such as GEOIDs keep their leading zeros.

use std::io::{Read, Write};

use urban_index_layer_models::{Attributes, FieldDef, FieldKind, FieldValue, Table};

use crate::LayerError;

/// Reads a CSV table with a header row.
///
/// Header names and cells are trimmed. Short rows are padded with nulls.
///
/// # Errors
///
/// Returns [`LayerError::Csv`] on malformed input and
/// [`LayerError::InvalidLayer`] if the header row is missing.
pub fn read_table<R: Read>(reader: R) -> Result<Table, LayerError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(LayerError::InvalidLayer {
            message: "CSV table contains no header row".to_string(),
        });
    }

    let mut cells: Vec<Vec<String>> = Vec::new();
    for result in reader.records() {
        let record = result?;
        cells.push(
            (0..headers.len())
                .map(|i| record.get(i).unwrap_or("").to_owned())
                .collect(),
        );
    }

    let fields: Vec<FieldDef> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| FieldDef {
            name: name.clone(),
            kind: infer_kind(cells.iter().map(|row| row[i].as_str())),
        })
        .collect();

    let rows = cells
        .into_iter()
        .map(|row| {
            fields
                .iter()
                .zip(row)
                .map(|(field, cell)| (field.name.clone(), cell_to_value(cell, field.kind)))
                .collect::<Attributes>()
        })
        .collect::<Vec<_>>();

    log::debug!("Parsed {} CSV rows with {} columns", rows.len(), fields.len());

    Ok(Table::new(fields, rows))
}

/// Writes a table as CSV with a header row, in schema order.
///
/// Null and non-finite values are written as empty cells.
///
/// # Errors
///
/// Returns [`LayerError::Csv`] if writing fails.
pub fn write_table<W: Write>(table: &Table, writer: W) -> Result<(), LayerError> {
    let mut writer = csv::Writer::from_writer(writer);

    writer.write_record(table.fields.iter().map(|f| f.name.as_str()))?;

    for row in &table.rows {
        writer.write_record(
            table
                .fields
                .iter()
                .map(|f| row.get(&f.name).map(cell_text).unwrap_or_default()),
        )?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a str>) -> FieldKind {
    let mut seen_value = false;

    for cell in cells {
        if cell.is_empty() {
            continue;
        }
        seen_value = true;
        if is_zero_padded(cell) || !cell.parse::<f64>().is_ok_and(f64::is_finite) {
            return FieldKind::Text;
        }
    }

    if seen_value {
        FieldKind::Double
    } else {
        FieldKind::Text
    }
}

fn is_zero_padded(cell: &str) -> bool {
    let digits = cell.strip_prefix('-').unwrap_or(cell);
    digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.")
}

fn cell_to_value(cell: String, kind: FieldKind) -> FieldValue {
    if cell.is_empty() {
        return FieldValue::Null;
    }
    match kind {
        FieldKind::Double => cell
            .parse::<f64>()
            .map_or(FieldValue::Text(cell), FieldValue::Number),
        FieldKind::Text => FieldValue::Text(cell),
    }
}

fn cell_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Number(n) if !n.is_finite() => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUDI: &str = "\
NAME,GEOID,Field2,Field3,note
Los Angeles,06037,12.5,13,
Orange,06059,8,,coastal
";

    #[test]
    fn infers_column_kinds() {
        let table = read_table(NUDI.as_bytes()).unwrap();

        assert_eq!(table.field("NAME").unwrap().kind, FieldKind::Text);
        assert_eq!(table.field("GEOID").unwrap().kind, FieldKind::Text);
        assert_eq!(table.field("Field2").unwrap().kind, FieldKind::Double);
        assert_eq!(table.field("Field3").unwrap().kind, FieldKind::Double);
        assert_eq!(table.field("note").unwrap().kind, FieldKind::Text);
    }

    #[test]
    fn empty_cells_are_null() {
        let table = read_table(NUDI.as_bytes()).unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("GEOID"), Some(&FieldValue::from("06037")));
        assert_eq!(table.rows[0].get("Field2"), Some(&FieldValue::Number(12.5)));
        assert_eq!(table.rows[1].get("Field3"), Some(&FieldValue::Null));
        assert_eq!(table.rows[0].get("note"), Some(&FieldValue::Null));
    }

    #[test]
    fn short_rows_are_padded() {
        let table = read_table("a,b,c\n1\n".as_bytes()).unwrap();
        assert_eq!(table.rows[0].get("c"), Some(&FieldValue::Null));
        assert_eq!(table.rows[0].get("a"), Some(&FieldValue::Number(1.0)));
    }

    #[test]
    fn zero_padding_detection() {
        assert!(is_zero_padded("06037"));
        assert!(is_zero_padded("-01"));
        assert!(!is_zero_padded("0"));
        assert!(!is_zero_padded("0.25"));
        assert!(!is_zero_padded("6037"));
    }

    #[test]
    fn non_finite_text_is_not_numeric() {
        assert_eq!(infer_kind(["1", "NaN"].into_iter()), FieldKind::Text);
        assert_eq!(infer_kind(["", ""].into_iter()), FieldKind::Text);
        assert_eq!(infer_kind(["1", "", "2.5"].into_iter()), FieldKind::Double);
    }

    #[test]
    fn writes_header_and_blank_nulls() {
        let mut row = Attributes::new();
        row.insert("FREQUENCY".to_string(), FieldValue::Number(58.0));
        row.insert("MEAN_Pop_den".to_string(), FieldValue::Number(f64::NAN));
        let table = Table::new(
            vec![
                FieldDef::double("FREQUENCY"),
                FieldDef::double("MEAN_Pop_den"),
                FieldDef::double("STD_Pop_den"),
            ],
            vec![row],
        );

        let mut out = Vec::new();
        write_table(&table, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "FREQUENCY,MEAN_Pop_den,STD_Pop_den\n58,,\n"
        );
    }
}
