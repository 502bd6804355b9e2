use std::fmt::{self, Display, Formatter};

use tabled::{builder::Builder, settings::Style as TableStyle};

use super::painter::Painter;

/// A two-column field/value table that renders via `Display`.
#[derive(Debug)]
pub(crate) struct Table {
    rows: Vec<[String; 2]>,
}

impl Table {
    /// Field names are muted.
    pub(crate) fn key_value(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        let rows = rows
            .into_iter()
            .map(|(field, value)| [painter.muted(field), value])
            .collect();
        Self { rows }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(["field", "value"]);
        for row in &self.rows {
            builder.push_record(row.clone());
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_table_lists_fields_in_order() {
        let painter = Painter::new(false);
        let rendered = Table::key_value(
            &painter,
            vec![
                ("address", "c0:ff:ee:00:00:01".into()),
                ("firmware", "1.5.1970.2".into()),
            ],
        )
        .to_string();

        let address = rendered.find("c0:ff:ee:00:00:01").expect("address row");
        let firmware = rendered.find("1.5.1970.2").expect("firmware row");
        assert!(rendered.contains("field"));
        assert!(address < firmware);
    }
}
