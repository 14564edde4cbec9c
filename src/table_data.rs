use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::collections::{HashMap, HashSet};

/// Marker that opens a sparkline payload inside a cell.
pub const SPARKLINE_SENTINEL: &str = "##__SPARKLINE__##";

/// Columns whose values are timestamps and get a column-wide display format.
pub const TIME_COLUMNS: [&str; 3] = ["_time", "earliest_time", "latest_time"];

/// Columns never treated as numbers for overlays. The empty name is the
/// synthetic row-number column.
pub const NOT_NUMBER_COLUMNS: [&str; 5] = ["", "_time", "_raw", "earliest_time", "latest_time"];

pub fn is_time_column(name: &str) -> bool {
    TIME_COLUMNS.contains(&name)
}

pub fn is_not_number_column(name: &str) -> bool {
    NOT_NUMBER_COLUMNS.contains(&name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Single(String),
    Multi(Vec<String>),
}

impl CellValue {
    /// Flattens a multi-value cell. Sparkline payloads keep their comma
    /// separated form, everything else stacks one value per line.
    pub fn into_text(self) -> String {
        match self {
            CellValue::Single(value) => value,
            CellValue::Multi(values) => match values.first() {
                None => String::new(),
                Some(first) if SPARKLINE_SENTINEL.starts_with(first.as_str()) => values.join(","),
                Some(_) => values.join("\n"),
            },
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Single(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Single(value)
    }
}

impl From<Vec<String>> for CellValue {
    fn from(values: Vec<String>) -> Self {
        if values.len() == 1 {
            CellValue::Single(values.into_iter().next().unwrap_or_default())
        } else {
            CellValue::Multi(values)
        }
    }
}

/// Display precision picked for a time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl TimeFormat {
    pub fn pattern(self) -> &'static str {
        match self {
            TimeFormat::Millisecond => "%Y-%m-%d %H:%M:%S%.3f",
            TimeFormat::Second => "%Y-%m-%d %H:%M:%S",
            TimeFormat::Minute => "%Y-%m-%d %H:%M:00",
            TimeFormat::Hour => "%Y-%m-%d %H:00",
            TimeFormat::Day => "%Y-%m-%d",
            TimeFormat::Month => "%Y-%m",
            TimeFormat::Year => "%Y",
        }
    }

    /// Coarsest format that still shows every component that varies away
    /// from its zero value somewhere in `values`.
    pub fn infer(values: &[NaiveDateTime]) -> TimeFormat {
        if !all_match(values, |t| t.nanosecond() == 0) {
            TimeFormat::Millisecond
        } else if !all_match(values, |t| t.second() == 0) {
            TimeFormat::Second
        } else if !all_match(values, |t| t.minute() == 0) {
            TimeFormat::Minute
        } else if !all_match(values, |t| t.hour() == 0) {
            TimeFormat::Hour
        } else if !all_match(values, |t| t.day() == 1) {
            TimeFormat::Day
        } else if !all_match(values, |t| t.month() == 1) {
            TimeFormat::Month
        } else {
            TimeFormat::Year
        }
    }

    pub fn format(self, value: &NaiveDateTime) -> String {
        value.format(self.pattern()).to_string()
    }
}

fn all_match(values: &[NaiveDateTime], f: impl Fn(&NaiveDateTime) -> bool) -> bool {
    values.iter().all(|v| f(v))
}

/// Parses ISO-8601 timestamps as produced by search results. Offsets are
/// honoured by keeping the wall-clock time of the value itself.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, pattern) {
            return Some(dt.naive_local());
        }
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Column names plus rectangular rows of flattened cell text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    columns: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
}

impl TableData {
    /// Duplicate column names are dropped, first occurrence wins.
    pub fn new(columns: Option<Vec<String>>) -> Self {
        let columns = columns.map(|names| {
            let mut seen = HashSet::new();
            let mut unique = Vec::with_capacity(names.len());
            for name in names {
                let name = name.trim().to_string();
                if seen.insert(name.clone()) {
                    unique.push(name);
                } else {
                    log::warn!("duplicate column {name:?} ignored");
                }
            }
            unique
        });
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Vec<CellValue>>) -> Self {
        for row in rows {
            self.add_row(row);
        }
        self
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn has_header(&self) -> bool {
        self.columns.is_some()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        match &self.columns {
            Some(columns) => columns.len(),
            None => self.rows.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    /// Appends a positional row. Empty rows are ignored.
    pub fn add_row(&mut self, values: Vec<CellValue>) {
        if values.is_empty() {
            return;
        }
        let mut row: Vec<String> = values.into_iter().map(CellValue::into_text).collect();
        if let Some(columns) = &self.columns {
            if row.len() > columns.len() {
                log::debug!(
                    "row has {} cells for {} columns; extra cells dropped",
                    row.len(),
                    columns.len()
                );
            }
            row.resize(columns.len(), String::new());
        }
        self.rows.push(row);
    }

    /// Appends a row from a field map. Columns the record lacks become empty
    /// cells; field names are matched after trimming.
    pub fn add_record<I, K>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, CellValue)>,
        K: AsRef<str>,
    {
        let Some(columns) = &self.columns else {
            log::warn!("record added to a table without column names; ignored");
            return;
        };
        let mut by_name: HashMap<String, CellValue> = fields
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim().to_string(), v))
            .collect();
        let row = columns
            .iter()
            .map(|name| by_name.remove(name).unwrap_or(CellValue::Single(String::new())))
            .collect();
        self.add_row(row);
    }

    /// Rewrites every time column with one display format inferred from the
    /// whole column. Returns the chosen format per column.
    pub fn format_times(&mut self) -> HashMap<String, TimeFormat> {
        let mut formats = HashMap::new();
        let Some(columns) = &self.columns else {
            return formats;
        };
        for (col, name) in columns.iter().enumerate() {
            if !is_time_column(name) {
                continue;
            }
            let parsed: Vec<Option<NaiveDateTime>> = self
                .rows
                .iter()
                .map(|row| {
                    let cell = row.get(col).map(String::as_str).unwrap_or("");
                    if cell.is_empty() {
                        return None;
                    }
                    let value = parse_timestamp(cell);
                    if value.is_none() {
                        log::warn!("column {name}: cannot parse timestamp {cell:?}; kept as is");
                    }
                    value
                })
                .collect();
            let observed: Vec<NaiveDateTime> = parsed.iter().flatten().copied().collect();
            let format = TimeFormat::infer(&observed);
            log::info!("use timestamp format {:?} for column {name}", format);
            for (row, value) in self.rows.iter_mut().zip(&parsed) {
                if let (Some(cell), Some(value)) = (row.get_mut(col), value) {
                    *cell = format.format(value);
                }
            }
            formats.insert(name.clone(), format);
        }
        formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time_table(values: &[&str]) -> TableData {
        TableData::new(Some(vec!["_time".to_string(), "count".to_string()])).with_rows(
            values
                .iter()
                .map(|v| vec![CellValue::from(*v), CellValue::from("1")])
                .collect(),
        )
    }

    #[test]
    fn sub_second_differences_keep_milliseconds() {
        let mut table = time_table(&[
            "2021-03-04T10:20:30.000+00:00",
            "2021-03-04T10:20:30.250+00:00",
        ]);
        let formats = table.format_times();
        assert_eq!(formats["_time"], TimeFormat::Millisecond);
        assert_eq!(table.rows()[1][0], "2021-03-04 10:20:30.250");
        assert_eq!(table.rows()[0][0], "2021-03-04 10:20:30.000");
    }

    #[test]
    fn minute_differences_pick_minute_precision() {
        let mut table = time_table(&["2021-03-04T10:20:00.000-07:00", "2021-03-04T10:45:00.000-07:00"]);
        let formats = table.format_times();
        assert_eq!(formats["_time"], TimeFormat::Minute);
        assert_eq!(table.rows()[1][0], "2021-03-04 10:45:00");
    }

    #[test]
    fn coarse_values_collapse_to_year() {
        let mut table = time_table(&["2020-01-01T00:00:00", "2021-01-01T00:00:00"]);
        assert_eq!(table.format_times()["_time"], TimeFormat::Year);
        assert_eq!(table.rows()[0][0], "2020");
    }

    #[test]
    fn empty_and_unparseable_cells_survive() {
        let mut table = time_table(&["", "yesterday", "2021-05-02T00:00:00"]);
        assert_eq!(table.format_times()["_time"], TimeFormat::Day);
        assert_eq!(table.rows()[0][0], "");
        assert_eq!(table.rows()[1][0], "yesterday");
        assert_eq!(table.rows()[2][0], "2021-05-02");
    }

    #[test]
    fn multi_values_join_by_kind() {
        let spark = CellValue::Multi(vec!["##__SPARKLINE__##".into(), "1".into(), "2".into()]);
        assert_eq!(spark.into_text(), "##__SPARKLINE__##,1,2");
        let multi = CellValue::Multi(vec!["a".into(), "b".into()]);
        assert_eq!(multi.into_text(), "a\nb");
    }

    #[test]
    fn records_fill_missing_fields_and_dedupe_columns() {
        let mut table = TableData::new(Some(vec!["a".into(), "b".into(), "a".into()]));
        assert_eq!(table.column_count(), 2);
        table.add_record(vec![(" b ", CellValue::from("2"))]);
        assert_eq!(table.rows()[0], vec!["".to_string(), "2".to_string()]);
    }
}
