use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

/// Print `summary` as pretty JSON, or hand it to `render` for the terminal.
pub fn print_output<T: Serialize>(
    summary: &T,
    json: bool,
    render: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if !json {
        render(summary);
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

/// Column alignment for tabular output.
#[derive(Clone, Copy)]
pub enum Align {
    Left,
    Right,
}

impl From<Align> for CellAlignment {
    fn from(align: Align) -> Self {
        match align {
            Align::Left => CellAlignment::Left,
            Align::Right => CellAlignment::Right,
        }
    }
}

/// Borderless table whose columns are separated by two spaces.
pub struct TabWriter {
    table: Table,
}

impl TabWriter {
    pub fn new(columns: Vec<(&str, Align)>) -> Self {
        let mut table = Table::new();
        table
            .load_preset(presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(columns.iter().map(|(header, _)| *header).collect::<Vec<_>>());

        let last = columns.len().saturating_sub(1);
        for (index, (_, align)) in columns.into_iter().enumerate() {
            if let Some(column) = table.column_mut(index) {
                column.set_cell_alignment(align.into());
                column.set_padding((u16::from(index > 0), u16::from(index < last)));
            }
        }
        TabWriter { table }
    }

    pub fn row(&mut self, cells: Vec<String>) {
        self.table.add_row(cells);
    }

    pub fn print(&self) {
        self.table
            .to_string()
            .lines()
            .for_each(|line| println!("{}", line.trim_end()));
    }
}
