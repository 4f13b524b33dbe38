//! CSV rendering

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::reports::ResultTable;

/// Quote a field when it holds a separator, quote or line break
fn escape_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}

fn write_record<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> std::io::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        out.write_all(escape_field(field.as_ref()).as_bytes())?;
    }
    out.write_all(b"\n")
}

pub fn render<W: Write>(out: &mut W, table: &ResultTable) -> std::io::Result<()> {
    if !table.columns.is_empty() {
        write_record(out, &table.columns)?;
    }
    for row in &table.rows {
        let fields: Vec<String> = row.iter().map(|c| c.render()).collect();
        write_record(out, &fields)?;
    }
    Ok(())
}

pub fn write_file(path: &Path, table: &ResultTable) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    render(&mut out, table)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reports::TypedCell;

    fn to_string(table: &ResultTable) -> String {
        let mut buf = Vec::new();
        render(&mut buf, table).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_render_rows() {
        let table = ResultTable {
            columns: vec!["time".into(), "browser".into(), "clicks".into(), "cpm".into()],
            rows: vec![vec![
                TypedCell::Time("2024-01-15 10".into()),
                TypedCell::Text("firefox".into()),
                TypedCell::Integer(12),
                TypedCell::Float(1.5),
            ]],
        };
        assert_eq!(
            to_string(&table),
            "time,browser,clicks,cpm\n2024-01-15 10,firefox,12,1.5\n"
        );
    }

    #[test]
    fn test_quoting() {
        let table = ResultTable {
            columns: vec!["name".into(), "note".into()],
            rows: vec![vec![
                TypedCell::Text("Acme, Inc.".into()),
                TypedCell::Text("say \"hi\"\nbye".into()),
            ]],
        };
        assert_eq!(
            to_string(&table),
            "name,note\n\"Acme, Inc.\",\"say \"\"hi\"\"\nbye\"\n"
        );
    }

    #[test]
    fn test_empty_cells_and_header_only() {
        let table = ResultTable {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec![TypedCell::Empty, TypedCell::Unsigned(7)]],
        };
        assert_eq!(to_string(&table), "a,b\n,7\n");

        let header_only = ResultTable {
            columns: vec!["a".into()],
            rows: vec![],
        };
        assert_eq!(to_string(&header_only), "a\n");
    }
}
