use crate::{Row, Schema};
use tabled::{Table, builder::Builder, settings};
use types::Value;

/// Predefined output styles that map to `tabled` styles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TableStyleKind {
    #[default]
    Modern,
    Ascii,
    Plain,
}

impl TableStyleKind {
    fn apply(self, table: &mut Table) {
        match self {
            Self::Modern => table.with(settings::Style::modern()),
            Self::Ascii => table.with(settings::Style::ascii()),
            Self::Plain => table.with(settings::Style::empty()),
        };
    }
}

/// Render rows under a schema's column names as a human-friendly table.
pub fn render_rows(schema: &Schema, rows: &[Row], style: TableStyleKind) -> String {
    if schema.is_empty() && rows.is_empty() {
        return "<empty>".into();
    }

    let mut builder = Builder::default();
    builder.push_record(schema.columns().iter().map(|c| c.name.clone()));

    for row in rows {
        builder.push_record(row.values.iter().map(format_value));
    }

    let mut table = builder.build();
    style.apply(&mut table);
    table.to_string()
}

/// Format a single value for display.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::Text(text) => format!("'{}'", text),
    }
}
