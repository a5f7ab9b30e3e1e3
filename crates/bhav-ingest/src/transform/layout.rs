//! Known exchange column layouts
//!
//! Each layout is recognised by a set of sentinel columns and maps its
//! source columns onto a short canonical shape. Layouts are tried in table
//! order; a table matching none of them is passed through unchanged.

use super::table::{Cell, Table};
use super::TransformError;

/// Keep only rows whose series column is one of `values`
#[derive(Debug)]
pub struct SeriesFilter {
    /// Candidate column names, first present wins
    pub columns: &'static [&'static str],
    pub values: &'static [&'static str],
}

#[derive(Debug)]
pub struct Layout {
    pub name: &'static str,
    pub sentinels: &'static [&'static str],
    pub series: Option<SeriesFilter>,
    /// `(source column, canonical column)` in output order
    pub columns: &'static [(&'static str, &'static str)],
    /// Canonical column rows are sorted by, descending
    pub metric: Option<&'static str>,
    /// Rows with a metric below this are dropped
    pub min_metric: Option<f64>,
    pub sheet: &'static str,
}

const EQUITY_SERIES: &[&str] = &["EQ"];

const DELIVERY_THRESHOLD: f64 = 50.0;

pub static KNOWN_LAYOUTS: &[Layout] = &[
    Layout {
        name: "nse_bhavcopy",
        sentinels: &["TrdSymb"],
        series: Some(SeriesFilter {
            columns: &["SctySrs", "Series"],
            values: EQUITY_SERIES,
        }),
        columns: &[
            ("TrdSymb", "Symbol"),
            ("OpnPric", "Open"),
            ("HghPric", "High"),
            ("LwPric", "Low"),
            ("ClsPric", "Close"),
            ("TtlTradgVol", "Volume"),
        ],
        metric: Some("Volume"),
        min_metric: None,
        sheet: "Equity_Data",
    },
    Layout {
        name: "nse_delivery",
        sentinels: &["SYMBOL", "QTY_PER"],
        series: None,
        columns: &[
            ("SYMBOL", "Symbol"),
            ("QTY_PER", "Delivery_%"),
            ("DELIV_QTY", "Delivery_Qty"),
            ("TRADED_QTY", "Traded_Qty"),
        ],
        metric: Some("Delivery_%"),
        min_metric: Some(DELIVERY_THRESHOLD),
        sheet: "High_Delivery",
    },
    Layout {
        name: "nse_delivery_full",
        sentinels: &["SYMBOL", "DELIV_PER"],
        series: None,
        columns: &[
            ("SYMBOL", "Symbol"),
            ("DELIV_PER", "Delivery_%"),
            ("DELIV_QTY", "Delivery_Qty"),
            ("TTL_TRD_QNTY", "Traded_Qty"),
        ],
        metric: Some("Delivery_%"),
        min_metric: Some(DELIVERY_THRESHOLD),
        sheet: "High_Delivery",
    },
    Layout {
        name: "nse_bhavcopy_legacy",
        sentinels: &["SYMBOL", "TOTTRDQTY"],
        series: Some(SeriesFilter {
            columns: &["SERIES"],
            values: EQUITY_SERIES,
        }),
        columns: &[
            ("SYMBOL", "Symbol"),
            ("OPEN", "Open"),
            ("HIGH", "High"),
            ("LOW", "Low"),
            ("CLOSE", "Close"),
            ("TOTTRDQTY", "Volume"),
        ],
        metric: Some("Volume"),
        min_metric: None,
        sheet: "Equity_Data",
    },
    Layout {
        name: "bse_bhavcopy",
        sentinels: &["SC_CODE"],
        series: None,
        columns: &[
            ("SC_CODE", "Code"),
            ("SC_NAME", "Name"),
            ("OPEN", "Open"),
            ("HIGH", "High"),
            ("LOW", "Low"),
            ("CLOSE", "Close"),
            ("NO_OF_SHRS", "Volume"),
        ],
        metric: Some("Volume"),
        min_metric: None,
        sheet: "BSE_Data",
    },
];

/// Fallback for unrecognised tables: everything kept as read
pub static GENERIC_LAYOUT: Layout = Layout {
    name: "generic",
    sentinels: &[],
    series: None,
    columns: &[],
    metric: None,
    min_metric: None,
    sheet: "Data",
};

impl Layout {
    pub fn is_generic(&self) -> bool {
        self.columns.is_empty()
    }

    fn matches(&self, table: &Table) -> bool {
        !self.sentinels.is_empty() && self.sentinels.iter().all(|s| table.has_column(s))
    }

    /// Filter, project, threshold and sort `table`
    pub fn apply(&self, table: Table) -> Result<Table, TransformError> {
        if self.is_generic() {
            return Ok(table);
        }

        let sources = self
            .columns
            .iter()
            .map(|(source, _)| required_column(&table, self.name, source))
            .collect::<Result<Vec<_>, _>>()?;

        let series = match &self.series {
            Some(filter) => {
                let index = filter
                    .columns
                    .iter()
                    .find_map(|c| table.column(c))
                    .ok_or_else(|| missing_column(self.name, filter.columns.join(" or ")))?;
                Some((index, filter.values))
            },
            None => None,
        };

        let metric = self
            .metric
            .and_then(|m| self.columns.iter().position(|(_, canonical)| *canonical == m));

        let mut rows: Vec<Vec<Cell>> = table
            .rows
            .into_iter()
            .filter(|row| match series {
                Some((index, values)) => row
                    .get(index)
                    .and_then(Cell::as_text)
                    .is_some_and(|s| values.iter().any(|v| *v == s)),
                None => true,
            })
            .map(|row| sources.iter().map(|&i| row.get(i).cloned().unwrap_or(Cell::Empty)).collect())
            .collect();

        if let (Some(min), Some(index)) = (self.min_metric, metric) {
            rows.retain(|row| row[index].as_number().is_some_and(|v| v >= min));
        }

        if let Some(index) = metric {
            rows.sort_by(|a, b| a[index].cmp_desc(&b[index]));
        }

        let headers = self.columns.iter().map(|(_, canonical)| canonical.to_string()).collect();
        Ok(Table::new(headers, rows))
    }
}

/// First known layout whose sentinels are all present, else the generic one
pub fn detect(table: &Table) -> &'static Layout {
    KNOWN_LAYOUTS
        .iter()
        .find(|layout| layout.matches(table))
        .unwrap_or(&GENERIC_LAYOUT)
}

fn required_column(table: &Table, layout: &str, name: &str) -> Result<usize, TransformError> {
    table.column(name).ok_or_else(|| missing_column(layout, name))
}

fn missing_column(layout: &str, name: impl std::fmt::Display) -> TransformError {
    TransformError::ParseError(format!("{} layout is missing column {}", layout, name))
}
