//! Console rendering of a source's first rows and column types.

use crate::config::PREVIEW_CELL_WIDTH;
use crate::db::Schema;
use crate::formats::reader::Record;

/// Render `rows` as a fixed-width table under the schema's column names
///
/// Cells wider than the preview width are cut and end in `...`; NULLs show
/// as `NULL`.
pub fn format_preview(schema: &Schema, rows: &[Record]) -> String {
    let header: Vec<String> = schema
        .columns
        .iter()
        .map(|c| truncate_cell(&c.name))
        .collect();

    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|record| {
            (0..header.len())
                .map(|i| match record.get(i) {
                    None => "NULL".to_string(),
                    Some(value) => truncate_cell(value),
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| {
            body.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    push_row(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in &body {
        push_row(&mut out, row, &widths);
    }
    out
}

/// One line per column: name, SQL type and nullability
pub fn format_column_types(schema: &Schema) -> String {
    let name_width = schema
        .columns
        .iter()
        .map(|c| c.name.chars().count())
        .max()
        .unwrap_or(0);

    schema
        .columns
        .iter()
        .map(|c| {
            let null = if c.nullable { "" } else { " NOT NULL" };
            format!(
                "{:<width$}  {}{}\n",
                c.name,
                c.sql_type.to_postgres(),
                null,
                width = name_width
            )
        })
        .collect()
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}

fn truncate_cell(value: &str) -> String {
    if value.chars().count() <= PREVIEW_CELL_WIDTH {
        return value.to_string();
    }
    let kept: String = value.chars().take(PREVIEW_CELL_WIDTH - 3).collect();
    format!("{}...", kept)
}
