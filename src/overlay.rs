use crate::table_data::is_not_number_column;
use crate::types::Color;
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

const HEATMAP_LOWER_PERCENTILE: f64 = 0.05;
const HEATMAP_UPPER_PERCENTILE: f64 = 0.95;

fn decimal_or_scientific() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^[-+]?[0-9]*[.]?[0-9]*$)|(^[-+]?[0-9][.]?[0-9]*e[-+]?[1-9][0-9]*$)")
            .expect("valid number regex")
    })
}

/// Parses plain decimals and `1.5e3` style numbers only. Things Rust would
/// otherwise accept, such as `inf` or `NaN`, are not numbers here.
pub fn strict_parse_float(text: &str) -> Option<f64> {
    if !decimal_or_scientific().is_match(text) {
        return None;
    }
    text.parse::<f64>().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    HeatMap,
    HighLow,
}

impl FromStr for OverlayMode {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "heatmap" => Ok(OverlayMode::HeatMap),
            "highlow" => Ok(OverlayMode::HighLow),
            _ => Err(()),
        }
    }
}

/// One cell that gets a background, in table coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ColoredCell {
    pub row: usize,
    pub col: usize,
    pub color: Color,
}

#[derive(Debug, Clone)]
struct NumberCell {
    row: usize,
    col: usize,
    value: Option<f64>,
}

#[derive(Debug, Clone)]
struct ColumnValues {
    name: String,
    not_null: usize,
    cells: Vec<NumberCell>,
}

/// Collects cell values per column and colours the numeric ones.
#[derive(Debug, Clone)]
pub struct DataOverlay {
    mode: OverlayMode,
    column_names: Vec<String>,
    columns: Vec<ColumnValues>,
}

impl DataOverlay {
    pub fn new(mode: OverlayMode, column_names: Vec<String>) -> Self {
        Self {
            mode,
            column_names,
            columns: Vec::new(),
        }
    }

    pub fn mode(&self) -> OverlayMode {
        self.mode
    }

    /// Records the raw text of cell (`col`, `row`). Unnamed and non-number
    /// columns are ignored.
    pub fn add_value(&mut self, col: usize, row: usize, value: &str) {
        let Some(name) = self.column_names.get(col) else {
            return;
        };
        if is_not_number_column(name) {
            return;
        }
        let idx = match self.columns.iter().position(|c| &c.name == name) {
            Some(idx) => idx,
            None => {
                self.columns.push(ColumnValues {
                    name: name.clone(),
                    not_null: 0,
                    cells: Vec::new(),
                });
                self.columns.len() - 1
            }
        };
        let column = &mut self.columns[idx];
        if !value.is_empty() {
            column.not_null += 1;
        }
        column.cells.push(NumberCell {
            row,
            col,
            value: strict_parse_float(value),
        });
    }

    /// Backgrounds for every coloured cell, column by column in the order the
    /// columns were first seen.
    pub fn colored_cells(&self) -> Vec<ColoredCell> {
        let columns: Vec<&ColumnValues> = self
            .columns
            .iter()
            .filter(|column| {
                let numbers = column.cells.iter().filter(|c| c.value.is_some()).count();
                let failing = column.not_null.saturating_sub(numbers);
                let keep = 2 * failing < column.not_null;
                if !keep {
                    log::debug!("overlay: column {} is not a number column", column.name);
                }
                keep
            })
            .collect();
        let values: Vec<f64> = columns
            .iter()
            .flat_map(|column| column.cells.iter().filter_map(|c| c.value))
            .collect();

        match self.mode {
            OverlayMode::HeatMap => heat_map(&columns, values),
            OverlayMode::HighLow => high_low(&columns, &values),
        }
    }
}

fn heat_map(columns: &[&ColumnValues], mut values: Vec<f64>) -> Vec<ColoredCell> {
    values.sort_by(|a, b| a.total_cmp(b));
    let (lower, upper) = percentiles(&values, HEATMAP_LOWER_PERCENTILE, HEATMAP_UPPER_PERCENTILE);
    let range = upper - lower;
    log::debug!("heat map ready, range {range} offset {lower}");

    let mut out = Vec::new();
    for column in columns {
        for cell in &column.cells {
            let Some(value) = cell.value.filter(|v| *v != 0.0) else {
                continue;
            };
            let alpha = if range == 0.0 {
                0.0
            } else {
                ((((value - lower) / range) * 1000.0).ceil() / 1000.0).clamp(0.0, 1.0)
            };
            out.push(ColoredCell {
                row: cell.row,
                col: cell.col,
                color: Color::from_rgb8(216, 93, 60).with_alpha(alpha as f32),
            });
        }
    }
    out
}

fn high_low(columns: &[&ColumnValues], values: &[f64]) -> Vec<ColoredCell> {
    let min = values.iter().copied().reduce(f64::min);
    let max = values.iter().copied().reduce(f64::max);
    let (Some(min), Some(max)) = (min, max) else {
        return Vec::new();
    };
    log::debug!("high-low ready, min {min} max {max}");

    let min_color = Color::from_rgb8(0x6a, 0xb7, 0xc7);
    let max_color = Color::from_rgb8(0xdc, 0x4e, 0x41);
    let mut out = Vec::new();
    for column in columns {
        for cell in &column.cells {
            let color = match cell.value {
                Some(v) if v == min => min_color,
                Some(v) if v == max => max_color,
                _ => continue,
            };
            out.push(ColoredCell {
                row: cell.row,
                col: cell.col,
                color,
            });
        }
    }
    out
}

/// Linear-interpolation estimate of two percentiles of a sorted list.
fn percentiles(sorted: &[f64], lower: f64, upper: f64) -> (f64, f64) {
    if sorted.is_empty() {
        return (0.0, 0.0);
    }
    (percentile(sorted, lower), percentile(sorted, upper))
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = p * (sorted.len() - 1) as f64 + 1.0;
    let k = n.trunc() as usize;
    let d = n.fract();
    if k == 0 || sorted.len() == 1 {
        sorted[0]
    } else if k >= sorted.len() - 1 {
        sorted[sorted.len() - 1]
    } else {
        sorted[k] + d * (sorted[k + 1] - sorted[k])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn strict_parsing_rejects_words() {
        assert_eq!(strict_parse_float("12.5"), Some(12.5));
        assert_eq!(strict_parse_float("-3"), Some(-3.0));
        assert_eq!(strict_parse_float("1e5"), Some(100000.0));
        assert_eq!(strict_parse_float("inf"), None);
        assert_eq!(strict_parse_float("12 apples"), None);
        assert_eq!(strict_parse_float(""), None);
    }

    #[test]
    fn flat_heat_map_has_zero_alpha() {
        let mut overlay = DataOverlay::new(OverlayMode::HeatMap, names(&["count"]));
        for row in 0..4 {
            overlay.add_value(0, row, "7");
        }
        let cells = overlay.colored_cells();
        assert_eq!(cells.len(), 4);
        for cell in cells {
            assert!(!cell.color.a.is_nan());
            assert_eq!(cell.color.a, 0.0);
        }
    }

    #[test]
    fn heat_map_alpha_follows_the_percentile_band() {
        let mut overlay = DataOverlay::new(OverlayMode::HeatMap, names(&["a", "b"]));
        for (row, value) in ["1", "2", "3"].iter().enumerate() {
            overlay.add_value(0, row, value);
        }
        overlay.add_value(1, 0, "10");
        let cells = overlay.colored_cells();
        let top = cells.iter().find(|c| c.col == 1).unwrap();
        assert_eq!(top.color.a, 1.0);
        let bottom = cells.iter().find(|c| c.col == 0 && c.row == 0).unwrap();
        assert_eq!(bottom.color.a, 0.0);
    }

    #[test]
    fn high_low_marks_extremes_only() {
        let mut overlay = DataOverlay::new(OverlayMode::HighLow, names(&["x", "y"]));
        overlay.add_value(0, 0, "5");
        overlay.add_value(0, 1, "1");
        overlay.add_value(1, 0, "9");
        overlay.add_value(1, 1, "4");
        let cells = overlay.colored_cells();
        assert_eq!(cells.len(), 2);
        assert_eq!((cells[0].row, cells[0].col), (1, 0));
        assert_eq!(cells[0].color, Color::from_rgb8(0x6a, 0xb7, 0xc7));
        assert_eq!((cells[1].row, cells[1].col), (0, 1));
    }

    #[test]
    fn mostly_text_columns_are_dropped() {
        let mut overlay = DataOverlay::new(OverlayMode::HighLow, names(&["host", "count"]));
        for (row, host) in ["web-1", "web-2", "3", "db"].iter().enumerate() {
            overlay.add_value(0, row, host);
            overlay.add_value(1, row, &(row * 10).to_string());
        }
        assert!(overlay.colored_cells().iter().all(|c| c.col == 1));
    }

    #[test]
    fn half_failing_columns_are_not_numeric() {
        let mut three_of_five = DataOverlay::new(OverlayMode::HighLow, names(&["count"]));
        for (row, value) in ["1", "9", "a", "b", "c"].iter().enumerate() {
            three_of_five.add_value(0, row, value);
        }
        assert!(three_of_five.colored_cells().is_empty());

        let mut two_of_four = DataOverlay::new(OverlayMode::HighLow, names(&["count"]));
        for (row, value) in ["1", "9", "a", "b"].iter().enumerate() {
            two_of_four.add_value(0, row, value);
        }
        assert!(two_of_four.colored_cells().is_empty());

        let mut one_of_three = DataOverlay::new(OverlayMode::HighLow, names(&["count"]));
        for (row, value) in ["1", "9", "a"].iter().enumerate() {
            one_of_three.add_value(0, row, value);
        }
        assert_eq!(one_of_three.colored_cells().len(), 2);
    }

    #[test]
    fn excluded_columns_never_participate() {
        let mut overlay = DataOverlay::new(OverlayMode::HighLow, names(&["", "_time"]));
        overlay.add_value(0, 0, "1");
        overlay.add_value(1, 0, "2");
        overlay.add_value(3, 0, "2");
        assert!(overlay.colored_cells().is_empty());
    }

    #[test]
    fn modes_parse_by_name() {
        assert_eq!("heatmap".parse(), Ok(OverlayMode::HeatMap));
        assert_eq!("HighLow".parse(), Ok(OverlayMode::HighLow));
        assert!("none".parse::<OverlayMode>().is_err());
    }
}
