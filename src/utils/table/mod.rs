use std::io::{self, Write};

/// Header plus rows for a plain-text table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableOptions {
    pub header: Vec<String>,
    pub lines: Vec<Vec<String>>,
}

/// Write `table` as left-aligned columns separated by two spaces.
pub fn render_table<W: Write>(table: &TableOptions, out: &mut W) -> io::Result<()> {
    let columns = table
        .lines
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(table.header.len()))
        .max()
        .unwrap_or(0);

    let mut widths = vec![0usize; columns];
    for row in std::iter::once(&table.header).chain(table.lines.iter()) {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    write_row(&table.header, &widths, out)?;
    for row in &table.lines {
        write_row(row, &widths, out)?;
    }
    Ok(())
}

fn write_row<W: Write>(row: &[String], widths: &[usize], out: &mut W) -> io::Result<()> {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        let cell = row.get(idx).map(String::as_str).unwrap_or("");
        if idx + 1 == widths.len() {
            line.push_str(cell);
        } else {
            line.push_str(&format!("{:<width$}  ", cell, width = width));
        }
    }
    writeln!(out, "{}", line.trim_end())
}
