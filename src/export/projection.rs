//! `fields=` projection

use super::Row;
use serde_json::Value;

/// Keep only the requested fields, in the caller's order.
///
/// A field present in at least one row is kept in every row (`null` where
/// missing); a field present in no row is dropped. Every output row ends up
/// with the same columns.
pub fn apply_field_selection(rows: Vec<Row>, fields: &[String]) -> Vec<Row> {
    if fields.is_empty() {
        return rows;
    }

    let mut columns: Vec<&String> = Vec::with_capacity(fields.len());
    for field in fields {
        if !columns.contains(&field) && rows.iter().any(|row| row.contains_key(field)) {
            columns.push(field);
        }
    }

    rows.into_iter()
        .map(|mut row| {
            columns
                .iter()
                .map(|field| {
                    let value = row.remove(field.as_str()).unwrap_or(Value::Null);
                    ((*field).clone(), value)
                })
                .collect()
        })
        .collect()
}
