//! XLSX rendering (single "Report" sheet)

use std::path::Path;

use rust_xlsxwriter::{Format, Workbook};

use super::ArtifactError;
use crate::domain::reports::{ResultTable, TypedCell};

pub const SHEET_NAME: &str = "Report";

const FLOAT_FORMAT: &str = "0.00";

pub fn write_file(path: &Path, table: &ResultTable) -> Result<(), ArtifactError> {
    if table.columns.len() > usize::from(u16::MAX) {
        return Err(ArtifactError::TooManyColumns(table.columns.len()));
    }

    let mut workbook = Workbook::new();
    let float_format = Format::new().set_num_format(FLOAT_FORMAT);
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, name) in table.columns.iter().enumerate() {
        sheet.write_string(0, col as u16, name.as_str())?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let r = u32::try_from(r + 1).unwrap_or(u32::MAX);
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                TypedCell::Integer(v) => {
                    sheet.write_number(r, col, *v as f64)?;
                }
                TypedCell::Unsigned(v) => {
                    sheet.write_number(r, col, *v as f64)?;
                }
                TypedCell::Float(v) => {
                    sheet.write_number_with_format(r, col, *v, &float_format)?;
                }
                TypedCell::Text(s) | TypedCell::Time(s) => {
                    sheet.write_string(r, col, s.as_str())?;
                }
                TypedCell::Empty => {}
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}
