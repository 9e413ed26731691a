//! Table builder wrapper around comfy-table for consistent list display.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::style;

/// Create a standard list table with the given headers.
///
/// Uses the NOTHING preset (no borders) for a clean CLI aesthetic.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Render the table with a count header.
pub fn render_list(entity_name: &str, table: &Table, total: usize) -> String {
    if total == 0 {
        return format!("No {entity_name}s found.");
    }
    let noun = if total == 1 {
        entity_name.to_string()
    } else {
        format!("{entity_name}s")
    };
    format!("{} {noun}:\n{table}", style(total).bold())
}

/// Color a status word for terminal display.
pub fn styled_status(status: &str) -> String {
    match status {
        "done" => style(status).green().to_string(),
        "failed" | "error" => style(status).red().to_string(),
        "running" => style(status).cyan().to_string(),
        _ => style(status).dim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty_list() {
        let table = list_table(&["id"]);
        assert_eq!(render_list("run", &table, 0), "No runs found.");
    }

    #[test]
    fn test_render_list_has_headers() {
        let mut table = list_table(&["id", "status"]);
        table.add_row(vec!["abc", "done"]);
        let rendered = render_list("run", &table, 1);
        assert!(rendered.contains("ID"));
        assert!(rendered.contains("abc"));
        assert!(rendered.contains("run:"));
    }
}
