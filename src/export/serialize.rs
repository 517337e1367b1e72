//! Output serializers: JSON envelope, CSV, XLSX workbook and IQY pointer

use super::Row;
use crate::error::{AppError, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::Serialize;
use serde_json::{json, Value};
use url::{form_urlencoded, Url};

pub const PREVIEW_ROWS: usize = 10;

const MIN_COLUMN_WIDTH: usize = 15;
const MAX_COLUMN_WIDTH: usize = 60;

/// `metadata` object of the JSON envelope, reused for the XLSX Metadata sheet
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub category: String,
    /// Row count before any preview truncation
    pub total: usize,
    pub generated_at: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excel: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<bool>,
}

/// Text form of a cell; `null` is empty
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Column headers, taken from the first row
fn headers(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

pub fn to_json(rows: &[Row], metadata: &ExportMetadata) -> Result<Vec<u8>> {
    let body = json!({
        "data": rows,
        "metadata": metadata,
    });
    Ok(serde_json::to_vec(&body)?)
}

/// CSV with a header line; no rows gives an empty body
pub fn to_csv(rows: &[Row]) -> Result<Vec<u8>> {
    let headers = headers(rows);
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;
    for row in rows {
        writer.write_record(
            headers
                .iter()
                .map(|h| row.get(h).map(cell_text).unwrap_or_default()),
        )?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV: {}", e)))
}

/// Two-sheet workbook: `Data` and `Metadata`
pub fn to_xlsx(rows: &[Row], metadata: &ExportMetadata, product_name: &str) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let data = workbook.add_worksheet();
    data.set_name("Data")?;
    write_data_sheet(data, rows, &bold)?;

    let meta = workbook.add_worksheet();
    meta.set_name("Metadata")?;
    let entries = [
        ("Category", metadata.category.clone()),
        ("Rows", metadata.total.to_string()),
        ("Generated", metadata.generated_at.clone()),
        ("Source", metadata.source.clone()),
        ("Exported by", product_name.to_string()),
    ];
    meta.write_string_with_format(0, 0, "Field", &bold)?;
    meta.write_string_with_format(0, 1, "Value", &bold)?;
    for (i, (label, value)) in entries.iter().enumerate() {
        let row = i as u32 + 1;
        meta.write_string_with_format(row, 0, *label, &bold)?;
        meta.write_string(row, 1, value.as_str())?;
    }
    meta.set_column_width(0, MIN_COLUMN_WIDTH as f64)?;
    meta.set_column_width(1, 40)?;

    Ok(workbook.save_to_buffer()?)
}

fn write_data_sheet(sheet: &mut Worksheet, rows: &[Row], bold: &Format) -> Result<()> {
    let headers = headers(rows);
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for (col, header) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, header.as_str(), bold)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let excel_row = r as u32 + 1;
        for (c, header) in headers.iter().enumerate() {
            let col = c as u16;
            let value = row.get(header).unwrap_or(&Value::Null);
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    sheet.write_boolean(excel_row, col, *b)?;
                }
                Value::Number(n) => match n.as_f64() {
                    Some(f) => {
                        sheet.write_number(excel_row, col, f)?;
                    }
                    None => {
                        sheet.write_string(excel_row, col, n.to_string())?;
                    }
                },
                other => {
                    sheet.write_string(excel_row, col, cell_text(other))?;
                }
            }
            widths[c] = widths[c].max(cell_text(value).chars().count());
        }
    }

    for (col, width) in widths.iter().enumerate() {
        let width = (width + 2).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH);
        sheet.set_column_width(col as u16, width as f64)?;
    }

    Ok(())
}

/// Web Query pointer back to the CSV export of the same request.
///
/// Every original parameter is kept except `format`, `preview` and `excel`;
/// `format=csv` and `excel=true` are appended.
pub fn iqy_url(base_url: &str, raw_query: Option<&str>) -> Result<String> {
    let mut url = Url::parse(&format!("{}/api/download", base_url.trim_end_matches('/')))
        .map_err(|e| AppError::Config(format!("Invalid public base URL '{}': {}", base_url, e)))?;

    let kept: Vec<(String, String)> = raw_query
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .filter(|(key, _)| !matches!(key.as_str(), "format" | "preview" | "excel"))
                .collect()
        })
        .unwrap_or_default();

    url.query_pairs_mut()
        .extend_pairs(kept)
        .append_pair("format", "csv")
        .append_pair("excel", "true");

    Ok(url.to_string())
}

pub fn iqy_body(url: &str) -> String {
    format!("WEB\n1\n{}\n", url)
}
