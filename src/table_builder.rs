use crate::column_sizer;
use crate::flowable::BlockAlign;
use crate::font::FontManager;
use crate::overlay::{DataOverlay, OverlayMode};
use crate::sparkline::{self, Sparkline, SPARKLINE_HEIGHT};
use crate::table::{CellContent, TableFragment};
use crate::table_data::{is_time_column, TableData};
use crate::table_style::{HAlign, LineOp, PaddingSide, TableStyle, VAlign};
use crate::table_text::{TableText, TABLE_FONT_SIZE};
use crate::types::{Color, Size};
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const CELL_PADDING: f32 = 2.0;
const H_PADDING: f32 = 2.0 * CELL_PADDING;
const V_PADDING: f32 = 2.0 * CELL_PADDING;
const ROW_NUMBER_COL_WIDTH: f32 = 20.0;
/// Keeps a full-width table strictly narrower than its frame.
const WIDTH_SLACK: f32 = 2.0;

/// Per-field display formats, first entry wins. A sparkline format looks like
/// `{"type": "sparkline", "options": {...}}`.
pub type FieldFormats = HashMap<String, Vec<Value>>;

#[derive(Debug, Clone)]
pub struct TableOptions {
    pub title: Option<String>,
    pub column_valigns: Vec<VAlign>,
    pub display_row_numbers: bool,
    pub field_formats: FieldFormats,
    pub overlay: Option<OverlayMode>,
    /// Space the table may use, normally the page content box.
    pub table_size: Size,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            title: None,
            column_valigns: Vec::new(),
            display_row_numbers: false,
            field_formats: FieldFormats::new(),
            overlay: None,
            table_size: Size::from_mm(210.0, 297.0),
        }
    }
}

/// Turns table data into a sized, styled [`TableFragment`].
pub struct TableBuilder {
    data: TableData,
    fonts: Arc<FontManager>,
    options: TableOptions,
    max_col_width: f32,
    max_cell_height: f32,
}

impl TableBuilder {
    pub fn new(data: TableData, fonts: Arc<FontManager>, options: TableOptions) -> Self {
        let width = options.table_size.width.to_f32();
        let height = options.table_size.height.to_f32();
        let max_col_width = (width - ROW_NUMBER_COL_WIDTH) / 2.0 - 5.0;
        // Room for a header line plus some slack.
        let max_cell_height = height - (V_PADDING + 60.0);
        log::debug!("max cell height {max_cell_height}");
        Self {
            data,
            fonts,
            options,
            max_col_width,
            max_cell_height,
        }
    }

    pub fn build(mut self) -> TableFragment {
        self.data.format_times();
        let has_header = self.data.has_header();
        let column_names: Vec<String> = self.data.columns().map(<[String]>::to_vec).unwrap_or_default();

        let mut rows: Vec<Vec<String>> = Vec::with_capacity(self.data.rows().len() + 1);
        if has_header {
            log::info!("table header row: {column_names:?}");
            rows.push(column_names.clone());
        }
        rows.extend(self.data.rows().iter().cloned());

        let mut cells: Vec<Vec<CellContent>> = rows
            .par_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(col, text)| self.make_cell(column_names.get(col), text))
                    .collect()
            })
            .collect();

        let (required, maximum) = self.track_cell_sizes(&cells, &column_names);
        let mut row_numbers = self.options.display_row_numbers;
        let budget = if row_numbers {
            self.options.table_size.width.to_f32() - ROW_NUMBER_COL_WIDTH
        } else {
            self.options.table_size.width.to_f32()
        };
        let mut col_widths = column_sizer::allocate(&required, &maximum, budget - WIDTH_SLACK, H_PADDING);
        log::debug!("table column widths {col_widths:?} for width {budget}");
        if col_widths.iter().sum::<f32>() > budget {
            // The table will be split by columns; number the rows.
            row_numbers = true;
        }

        let row_heights: Vec<f32> = cells
            .par_iter()
            .map(|row| {
                row.iter()
                    .zip(&col_widths)
                    .map(|(cell, width)| match cell {
                        CellContent::Text(_) => cell.wrap(width - H_PADDING).1,
                        CellContent::Sparkline(_) => SPARKLINE_HEIGHT,
                    })
                    .fold(0.0, |acc: f32, h| acc.max(h + V_PADDING))
            })
            .collect();
        log::debug!("table row heights {row_heights:?}");

        let mut overlay_names = column_names;
        if row_numbers {
            for (idx, row) in cells.iter_mut().enumerate() {
                let label = match (idx, has_header) {
                    (0, true) => "#".to_string(),
                    (_, true) => idx.to_string(),
                    (_, false) => (idx + 1).to_string(),
                };
                row.insert(0, CellContent::Text(self.text_cell(label)));
            }
            col_widths.insert(0, ROW_NUMBER_COL_WIDTH);
            // Unnamed, so overlays skip it.
            if has_header {
                overlay_names.insert(0, String::new());
            }
        }
        let style = self.table_style(&cells, overlay_names, has_header, row_numbers);
        let fragment = TableFragment::new(cells, col_widths, row_heights, &style, self.fonts.clone())
            .with_repeats(usize::from(has_header), usize::from(row_numbers))
            .with_align(BlockAlign::Left);
        match &self.options.title {
            Some(title) => fragment.with_title(title.clone()),
            None => fragment,
        }
    }

    fn text_cell(&self, text: impl Into<String>) -> TableText {
        TableText::with_options(text, self.fonts.clone(), TABLE_FONT_SIZE, self.max_cell_height)
    }

    fn make_cell(&self, column: Option<&String>, text: &str) -> CellContent {
        if !sparkline::is_sparkline(text) {
            return CellContent::Text(self.text_cell(text));
        }
        let options = column
            .and_then(|name| self.sparkline_options(name))
            .unwrap_or_else(sparkline::default_options);
        log::debug!("sparkline cell {text:?} with options {options:?}");
        CellContent::Sparkline(Sparkline::new(text, options))
    }

    fn sparkline_options(&self, column: &str) -> Option<Map<String, Value>> {
        let format = self.options.field_formats.get(column)?.first()?;
        if format.get("type").and_then(Value::as_str) != Some("sparkline") {
            return None;
        }
        format.get("options")?.as_object().cloned()
    }

    /// Required and maximum width per column. The header seeds both; later
    /// rows only widen the required width for numbers and timestamps.
    fn track_cell_sizes(&self, cells: &[Vec<CellContent>], column_names: &[String]) -> (Vec<f32>, Vec<f32>) {
        let ncols = cells.iter().map(Vec::len).max().unwrap_or(0);
        let mut required = vec![0.0f32; ncols];
        let mut maximum = vec![0.0f32; ncols];
        for (row_idx, row) in cells.iter().enumerate() {
            for (col, cell) in row.iter().enumerate() {
                let width = cell.natural_width() + H_PADDING;
                if row_idx == 0 {
                    required[col] = width.min(self.max_col_width);
                    maximum[col] = width;
                }
                maximum[col] = maximum[col].max(width);
                let is_time = column_names.get(col).is_some_and(|name| is_time_column(name));
                if cell.is_numeric() || is_time {
                    required[col] = required[col].max(width).min(self.max_col_width);
                }
            }
        }
        (required, maximum)
    }

    fn table_style(
        &self,
        cells: &[Vec<CellContent>],
        overlay_names: Vec<String>,
        has_header: bool,
        row_numbers: bool,
    ) -> TableStyle {
        let mut overlay = self
            .options
            .overlay
            .map(|mode| DataOverlay::new(mode, overlay_names));
        let mut numeric_cells = Vec::new();
        for (row, cells) in cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                if cell.is_numeric() {
                    numeric_cells.push((col as i32, row as i32));
                }
                if has_header && row == 0 {
                    continue;
                }
                if let (CellContent::Text(text), Some(overlay)) = (cell, overlay.as_mut()) {
                    overlay.add_value(col, row, text.text());
                }
            }
        }

        let mut style = TableStyle::new();
        for (col, valign) in self.options.column_valigns.iter().enumerate() {
            style.valign((col as i32, 0), (col as i32, -1), *valign);
        }
        style.line(LineOp::LineAfter, (0, 0), (-2, -1), 0.25, Color::LIGHT_GREY);

        let data_rows = cells.len() - usize::from(has_header);
        let number_align = if data_rows == 1 { HAlign::Left } else { HAlign::Right };
        for cell in numeric_cells {
            style.align(cell, cell, number_align);
        }
        if row_numbers {
            style.align((0, 0), (0, 0), HAlign::Right);
        }

        let first_data_row = if has_header {
            style.line(LineOp::LineBelow, (0, 0), (-1, 0), 1.0, Color::BLACK);
            1
        } else {
            0
        };
        style.line(LineOp::LineBelow, (0, first_data_row), (-1, -2), 0.25, Color::LIGHT_GREY);

        for side in [PaddingSide::Left, PaddingSide::Right, PaddingSide::Top, PaddingSide::Bottom] {
            style.padding((0, 0), (-1, -1), side, CELL_PADDING);
        }

        if let Some(overlay) = overlay {
            for cell in overlay.colored_cells() {
                if row_numbers && cell.col == 0 {
                    continue;
                }
                let at = (cell.col as i32, cell.row as i32);
                style.background(at, at, cell.color);
            }
        }
        style
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_data::CellValue;
    use crate::table_style::LineCommand;

    fn data(columns: &[&str], rows: &[&[&str]]) -> TableData {
        TableData::new(Some(columns.iter().map(|c| c.to_string()).collect())).with_rows(
            rows.iter()
                .map(|row| row.iter().map(|v| CellValue::from(*v)).collect())
                .collect(),
        )
    }

    fn build(data: TableData, options: TableOptions) -> TableFragment {
        TableBuilder::new(data, FontManager::shared_default(), options).build()
    }

    fn has_line(lines: &[LineCommand], op: LineOp, weight: f32, start: (i32, i32), end: (i32, i32)) -> bool {
        lines
            .iter()
            .any(|l| l.op == op && l.weight == weight && l.start == start && l.end == end)
    }

    #[test]
    fn header_gets_a_rule_and_repeats() {
        let table = build(
            data(&["host", "count"], &[&["a", "1"], &["b", "22"], &["c", "333"]]),
            TableOptions::default(),
        );
        assert_eq!(table.row_count(), 4);
        assert!(has_line(table.lines(), LineOp::LineBelow, 1.0, (0, 0), (1, 0)));
        assert!(has_line(table.lines(), LineOp::LineBelow, 0.25, (0, 1), (1, 2)));
        assert!(has_line(table.lines(), LineOp::LineAfter, 0.25, (0, 0), (0, 3)));
        assert_eq!(table.cell_style(1, 2).unwrap().h_align, HAlign::Right);
        assert_eq!(table.cell_style(0, 2).unwrap().h_align, HAlign::Left);
        assert_eq!(table.cell_style(1, 2).unwrap().left_padding, 2.0);
        assert!(table.row_heights().iter().all(|h| *h == 12.0));
    }

    #[test]
    fn single_data_row_numbers_align_left() {
        let table = build(data(&["count"], &[&["5"]]), TableOptions::default());
        assert_eq!(table.cell_style(0, 1).unwrap().h_align, HAlign::Left);
    }

    #[test]
    fn wide_tables_get_row_numbers() {
        let columns: Vec<String> = (0..12).map(|i| format!("value_{i}")).collect();
        let names: Vec<&str> = columns.iter().map(String::as_str).collect();
        let row: Vec<&str> = vec!["123456789.123456"; 12];
        let options = TableOptions {
            table_size: Size::new(300.0, 400.0),
            ..TableOptions::default()
        };
        let table = build(data(&names, &[&row, &row]), options);
        assert_eq!(table.column_count(), 13);
        assert_eq!(table.col_widths()[0], ROW_NUMBER_COL_WIDTH);
        assert!(matches!(table.cell(0, 0), Some(CellContent::Text(t)) if t.text() == "#"));
        assert!(matches!(table.cell(0, 2), Some(CellContent::Text(t)) if t.text() == "2"));
        assert_eq!(table.cell_style(0, 0).unwrap().h_align, HAlign::Right);
        assert_eq!(table.columns().total, 12);
    }

    #[test]
    fn headerless_rows_are_numbered_from_one() {
        let table_data = TableData::new(None).with_rows(vec![vec![CellValue::from("x")]]);
        let options = TableOptions {
            display_row_numbers: true,
            ..TableOptions::default()
        };
        let table = build(table_data, options);
        assert!(matches!(table.cell(0, 0), Some(CellContent::Text(t)) if t.text() == "1"));
    }

    #[test]
    fn sparkline_cells_use_field_formats() {
        let mut formats = FieldFormats::new();
        formats.insert(
            "trend".to_string(),
            vec![serde_json::json!({"type": "sparkline", "options": {"type": "bar"}})],
        );
        let options = TableOptions {
            field_formats: formats,
            ..TableOptions::default()
        };
        let table = build(
            data(&["trend"], &[&["##__SPARKLINE__##,1,2,3"]]),
            options,
        );
        match table.cell(0, 1) {
            Some(CellContent::Sparkline(spark)) => {
                assert_eq!(spark.kind(), sparkline::SparklineKind::Bar)
            }
            _ => panic!("expected a sparkline cell"),
        }
        assert!((table.row_heights()[1] - (SPARKLINE_HEIGHT + V_PADDING)).abs() < 1e-4);
    }

    #[test]
    fn overlay_backgrounds_skip_row_numbers() {
        let options = TableOptions {
            overlay: Some(OverlayMode::HighLow),
            display_row_numbers: true,
            ..TableOptions::default()
        };
        let table = build(data(&["count"], &[&["1"], &["9"], &["4"]]), options);
        let cells: Vec<(i32, i32)> = table.backgrounds().iter().map(|b| b.start).collect();
        assert_eq!(cells, vec![(1, 1), (1, 2)]);
    }

    #[test]
    fn header_text_does_not_count_against_number_columns() {
        let options = TableOptions {
            overlay: Some(OverlayMode::HighLow),
            ..TableOptions::default()
        };
        let table = build(data(&["count"], &[&["7"]]), options);
        let cells: Vec<(i32, i32)> = table.backgrounds().iter().map(|b| b.start).collect();
        assert_eq!(cells, vec![(0, 1)]);
    }

    #[test]
    fn time_columns_are_formatted_before_measuring() {
        let table = build(
            data(
                &["_time"],
                &[&["2021-03-04T10:20:00.000+00:00"], &["2021-03-04T10:21:00.000+00:00"]],
            ),
            TableOptions::default(),
        );
        assert!(matches!(table.cell(0, 1), Some(CellContent::Text(t)) if t.text() == "2021-03-04 10:20:00"));
    }
}
