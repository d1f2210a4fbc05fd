//! Terminal and JSON rendering shared by the commands.

use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use serde::Serialize;

use crate::app::GlobalOptions;

/// Writes `report` as pretty JSON under `--json`, otherwise renders it with `human`.
pub fn emit<T: Serialize>(
    report: &T,
    opts: &GlobalOptions,
    human: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if opts.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        human(report);
    }
    Ok(())
}

/// Renders an absolute address or an RVA.
pub fn address(value: u64) -> String {
    format!("0x{value:X}")
}

/// What a listing column holds, with its header.
#[derive(Clone, Copy)]
pub enum Column {
    /// Export, symbol or section names
    Name(&'static str),
    /// Absolute addresses and RVAs
    Address(&'static str),
    /// Byte counts
    Size(&'static str),
    /// Strategies, flags and error text
    Note(&'static str),
}

impl Column {
    fn header(self) -> &'static str {
        match self {
            Column::Name(header)
            | Column::Address(header)
            | Column::Size(header)
            | Column::Note(header) => header,
        }
    }

    fn alignment(self) -> CellAlignment {
        match self {
            Column::Size(_) => CellAlignment::Right,
            _ => CellAlignment::Left,
        }
    }
}

/// A titled table of module entities, printed as `Title (rows):` over indented rows.
pub struct Listing {
    title: String,
    table: Table,
    rows: usize,
}

impl Listing {
    pub fn new(title: impl Into<String>, columns: &[Column]) -> Self {
        let mut table = Table::new();
        table
            .load_preset(presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(columns.iter().map(|column| column.header()).collect::<Vec<_>>());

        // Two spaces between columns, none at the outer edges
        let last = columns.len().saturating_sub(1);
        for (index, column) in columns.iter().enumerate() {
            if let Some(cells) = table.column_mut(index) {
                cells.set_cell_alignment(column.alignment());
                cells.set_padding((u16::from(index != 0), u16::from(index != last)));
            }
        }

        Listing {
            title: title.into(),
            table,
            rows: 0,
        }
    }

    /// Adds a row, values in column order.
    pub fn row<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cells: Vec<String> = values.into_iter().map(Into::into).collect();
        self.table.add_row(cells);
        self.rows += 1;
    }

    /// Prints the title and rows, or `empty` when nothing was added.
    pub fn print_or(&self, empty: &str) {
        if self.rows == 0 {
            println!("{empty}");
            return;
        }

        println!("{} ({}):", self.title, self.rows);
        for line in self.table.to_string().lines() {
            println!("  {}", line.trim_end());
        }
    }
}
