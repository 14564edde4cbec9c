//! Table fragments and the splitting that keeps them inside a frame.
//!
//! A table that does not fit is cut into row bands first; only the first band
//! is then cut by columns. Every part is a new immutable fragment whose style
//! commands were remapped into its own coordinates. Parts that still do not
//! fit are split again when the document loop reaches them.

use crate::canvas::Canvas;
use crate::flowable::{BlockAlign, Flowable, PageBreak, Paragraph, ParagraphStyle};
use crate::font::FontManager;
use crate::sparkline::Sparkline;
use crate::table_style::{
    clamp_span, keep_after, keep_before, lines_at_cut, Axis, BackgroundCommand, CellStyle, HAlign,
    LineCommand, LineOp, TableStyle, VAlign,
};
use crate::table_text::TableText;
use crate::types::{Pt, Size};
use std::sync::Arc;

/// Height reserved for a column caption when a column split is coming.
pub const CAPTION_HEIGHT: f32 = 15.0;

/// Cells are measured without a height limit; their own cap applies.
const UNBOUNDED_HEIGHT: f32 = 1.0e6;

#[derive(Debug, Clone)]
pub enum CellContent {
    Text(TableText),
    Sparkline(Sparkline),
}

impl CellContent {
    pub fn is_numeric(&self) -> bool {
        match self {
            CellContent::Text(text) => text.is_numeric(),
            CellContent::Sparkline(spark) => spark.is_numeric(),
        }
    }

    pub fn natural_width(&self) -> f32 {
        match self {
            CellContent::Text(text) => text.natural_width(),
            CellContent::Sparkline(spark) => spark.width(),
        }
    }

    fn as_flowable(&self) -> &dyn Flowable {
        match self {
            CellContent::Text(text) => text,
            CellContent::Sparkline(spark) => spark,
        }
    }

    pub fn wrap(&self, avail_width: f32) -> (f32, f32) {
        let size = self
            .as_flowable()
            .wrap(Pt::from_f32(avail_width.max(0.0)), Pt::from_f32(UNBOUNDED_HEIGHT));
        (size.width.to_f32(), size.height.to_f32())
    }
}

/// Which of the table's columns a fragment shows, 1-based and excluding
/// repeated columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRange {
    pub start: usize,
    pub end: usize,
    pub total: usize,
}

impl ColumnRange {
    pub fn caption(&self, title: &str) -> String {
        if self.start == self.end {
            format!("{title} (Column {} of {})", self.start, self.total)
        } else {
            format!("{title} (Columns {}-{} of {})", self.start, self.end, self.total)
        }
    }
}

enum RowSplit {
    Unsplittable,
    Fits,
    Split(TableFragment, TableFragment),
}

/// A rectangular block of table cells with its own styling.
#[derive(Debug, Clone)]
pub struct TableFragment {
    cells: Vec<Vec<Arc<CellContent>>>,
    cell_styles: Vec<Vec<CellStyle>>,
    col_widths: Vec<f32>,
    row_heights: Vec<f32>,
    lines: Vec<LineCommand>,
    backgrounds: Vec<BackgroundCommand>,
    repeat_rows: usize,
    repeat_cols: usize,
    columns: ColumnRange,
    title: Option<String>,
    align: BlockAlign,
    fonts: Arc<FontManager>,
}

impl TableFragment {
    /// Builds the root fragment. Rows shorter than `col_widths` are padded
    /// with empty text cells.
    pub fn new(
        cells: Vec<Vec<CellContent>>,
        col_widths: Vec<f32>,
        row_heights: Vec<f32>,
        style: &TableStyle,
        fonts: Arc<FontManager>,
    ) -> Self {
        let ncols = col_widths.len();
        let nrows = row_heights.len();
        let mut grid: Vec<Vec<Arc<CellContent>>> = cells
            .into_iter()
            .take(nrows)
            .map(|row| row.into_iter().take(ncols).map(Arc::new).collect())
            .collect();
        grid.resize_with(nrows, Vec::new);
        for row in &mut grid {
            while row.len() < ncols {
                row.push(Arc::new(CellContent::Text(TableText::new("", fonts.clone()))));
            }
        }
        let resolved = style.resolve(ncols, nrows);
        Self {
            cells: grid,
            cell_styles: resolved.cells,
            col_widths,
            row_heights,
            lines: resolved.lines,
            backgrounds: resolved.backgrounds,
            repeat_rows: 0,
            repeat_cols: 0,
            columns: ColumnRange {
                start: 1,
                end: ncols,
                total: ncols,
            },
            title: None,
            align: BlockAlign::Left,
            fonts,
        }
    }

    /// Leading rows and columns copied into every part after a split.
    pub fn with_repeats(mut self, rows: usize, cols: usize) -> Self {
        self.repeat_rows = rows.min(self.row_heights.len());
        self.repeat_cols = cols.min(self.col_widths.len());
        let shown = self.col_widths.len() - self.repeat_cols;
        self.columns = ColumnRange {
            start: 1,
            end: shown,
            total: shown,
        };
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_align(mut self, align: BlockAlign) -> Self {
        self.align = align;
        self
    }

    pub fn column_count(&self) -> usize {
        self.col_widths.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_heights.len()
    }

    pub fn columns(&self) -> ColumnRange {
        self.columns
    }

    pub fn col_widths(&self) -> &[f32] {
        &self.col_widths
    }

    pub fn row_heights(&self) -> &[f32] {
        &self.row_heights
    }

    pub fn lines(&self) -> &[LineCommand] {
        &self.lines
    }

    pub fn backgrounds(&self) -> &[BackgroundCommand] {
        &self.backgrounds
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<&CellContent> {
        self.cells.get(row)?.get(col).map(Arc::as_ref)
    }

    pub fn cell_style(&self, col: usize, row: usize) -> Option<&CellStyle> {
        self.cell_styles.get(row)?.get(col)
    }

    pub fn width(&self) -> f32 {
        self.col_widths.iter().sum()
    }

    pub fn height(&self) -> f32 {
        self.row_heights.iter().sum()
    }

    pub fn caption_text(&self) -> String {
        self.columns.caption(self.title.as_deref().unwrap_or(""))
    }

    fn caption(&self) -> Box<dyn Flowable> {
        Box::new(Paragraph::new(
            self.caption_text(),
            ParagraphStyle::caption(),
            self.fonts.clone(),
        ))
    }

    /// First column index that no longer fits, or 0 when every column fits.
    pub fn column_split_index(&self, avail_width: f32) -> usize {
        let mut used = 0.0;
        let mut split_at = 0;
        for (idx, width) in self.col_widths.iter().enumerate() {
            if used + width >= avail_width {
                break;
            }
            split_at = idx + 1;
            used += width;
        }
        if split_at == self.col_widths.len() {
            return 0;
        }
        if split_at <= self.repeat_cols {
            log::warn!("no data column fits in {avail_width}pt; table drawn clipped");
            return 0;
        }
        split_at
    }

    /// Number of leading rows that fit in `avail_height`.
    pub fn row_split_index(&self, avail_height: f32) -> usize {
        let mut used = 0.0;
        let mut n = 0;
        for height in &self.row_heights {
            if used + height > avail_height {
                break;
            }
            used += height;
            n += 1;
        }
        n
    }

    fn split_rows(&self, avail_height: f32) -> RowSplit {
        let n = self.row_split_index(avail_height);
        if n == self.row_heights.len() {
            return RowSplit::Fits;
        }
        if n <= self.repeat_rows {
            return RowSplit::Unsplittable;
        }
        let r = self.repeat_rows;
        let lines = lines_at_cut(&self.lines, Axis::Row, n as i32);

        let mut first = self.derive_rows(0..n);
        first.lines = keep_before(&lines, Axis::Row, n as i32);
        first.backgrounds = keep_before(&self.backgrounds, Axis::Row, n as i32);

        let rows: Vec<usize> = (0..r).chain(n..self.row_heights.len()).collect();
        let mut rest = self.derive_rows(rows);
        rest.lines = keep_after(&lines, Axis::Row, n as i32, r as i32);
        rest.backgrounds = keep_after(&self.backgrounds, Axis::Row, n as i32, r as i32);

        log::debug!(
            "table rows split at {n}: {} + {} rows",
            first.row_count(),
            rest.row_count()
        );
        RowSplit::Split(first, rest)
    }

    fn derive_rows(&self, rows: impl IntoIterator<Item = usize>) -> TableFragment {
        let rows: Vec<usize> = rows.into_iter().collect();
        TableFragment {
            cells: rows.iter().map(|&r| self.cells[r].clone()).collect(),
            cell_styles: rows.iter().map(|&r| self.cell_styles[r].clone()).collect(),
            row_heights: rows.iter().map(|&r| self.row_heights[r]).collect(),
            lines: Vec::new(),
            backgrounds: Vec::new(),
            ..self.clone()
        }
    }

    fn derive_columns(&self, cols: &[usize]) -> TableFragment {
        let pick = |row: &Vec<Arc<CellContent>>| -> Vec<Arc<CellContent>> {
            cols.iter().map(|&c| row[c].clone()).collect()
        };
        TableFragment {
            cells: self.cells.iter().map(pick).collect(),
            cell_styles: self
                .cell_styles
                .iter()
                .map(|row| cols.iter().map(|&c| row[c]).collect())
                .collect(),
            col_widths: cols.iter().map(|&c| self.col_widths[c]).collect(),
            lines: Vec::new(),
            backgrounds: Vec::new(),
            ..self.clone()
        }
    }

    /// Cuts before column `n`. Both parts keep the repeated columns.
    pub fn split_columns(&self, n: usize) -> (TableFragment, TableFragment) {
        let r = self.repeat_cols;
        let cut = n as i32;
        let lines = lines_at_cut(&self.lines, Axis::Column, cut);

        let left_cols: Vec<usize> = (0..n).collect();
        let mut left = self.derive_columns(&left_cols);
        left.lines = keep_before(&lines, Axis::Column, cut);
        left.backgrounds = keep_before(&self.backgrounds, Axis::Column, cut);
        left.columns.end = self.columns.start + (n - r - 1);

        let right_cols: Vec<usize> = (0..r).chain(n..self.col_widths.len()).collect();
        let mut right = self.derive_columns(&right_cols);
        right.lines = keep_after(&lines, Axis::Column, cut, r as i32);
        right.backgrounds = keep_after(&self.backgrounds, Axis::Column, cut, r as i32);
        right.columns.start = left.columns.end + 1;
        right.columns.end = self.columns.end;

        log::debug!(
            "table columns split at {n}: columns {}-{} and {}-{} of {}",
            left.columns.start,
            left.columns.end,
            right.columns.start,
            right.columns.end,
            self.columns.total
        );
        (left, right)
    }

    fn col_positions(&self, x: f32) -> Vec<f32> {
        let mut positions = Vec::with_capacity(self.col_widths.len() + 1);
        let mut cursor = x;
        positions.push(cursor);
        for width in &self.col_widths {
            cursor += width;
            positions.push(cursor);
        }
        positions
    }

    fn row_positions(&self, top: f32) -> Vec<f32> {
        let mut positions = Vec::with_capacity(self.row_heights.len() + 1);
        let mut cursor = top;
        positions.push(cursor);
        for height in &self.row_heights {
            cursor -= height;
            positions.push(cursor);
        }
        positions
    }

    fn draw_backgrounds(&self, canvas: &mut Canvas, cols: &[f32], rows: &[f32]) {
        for bg in &self.backgrounds {
            let Some((c0, c1)) = clamp_span(bg.start.0, bg.end.0, self.col_widths.len()) else {
                continue;
            };
            let Some((r0, r1)) = clamp_span(bg.start.1, bg.end.1, self.row_heights.len()) else {
                continue;
            };
            canvas.save_state();
            canvas.set_fill_color(bg.color);
            if bg.color.a < 1.0 {
                canvas.set_opacity(bg.color.a, 1.0);
            }
            canvas.draw_rect(
                pt(cols[c0]),
                pt(rows[r1 + 1]),
                pt(cols[c1 + 1] - cols[c0]),
                pt(rows[r0] - rows[r1 + 1]),
            );
            canvas.restore_state();
        }
    }

    fn draw_cells(&self, canvas: &mut Canvas, cols: &[f32], rows: &[f32]) {
        for (r, row) in self.cells.iter().enumerate() {
            let row_height = self.row_heights[r];
            let row_y = rows[r + 1];
            for (c, content) in row.iter().enumerate() {
                let style = &self.cell_styles[r][c];
                let col_width = self.col_widths[c];
                let inner = col_width - style.left_padding - style.right_padding;
                let (w, h) = content.wrap(inner);
                let x = match style.h_align {
                    HAlign::Left => cols[c] + style.left_padding,
                    HAlign::Right => cols[c] + col_width - style.right_padding - w,
                    HAlign::Center => {
                        cols[c] + (col_width + style.left_padding - style.right_padding - w) / 2.0
                    }
                };
                let y = match style.v_align {
                    VAlign::Bottom => row_y + style.bottom_padding,
                    VAlign::Top => row_y + row_height - style.top_padding - h,
                    VAlign::Middle => {
                        row_y + (row_height + style.bottom_padding - style.top_padding - h) / 2.0
                    }
                };
                content
                    .as_flowable()
                    .draw(canvas, pt(x), pt(y), pt(inner.max(0.0)), pt(h));
            }
        }
    }

    fn draw_lines(&self, canvas: &mut Canvas, cols: &[f32], rows: &[f32]) {
        let ncols = self.col_widths.len();
        let nrows = self.row_heights.len();
        for cmd in &self.lines {
            if cmd.weight <= 0.0 {
                continue;
            }
            let Some((c0, c1)) = clamp_span(cmd.start.0, cmd.end.0, ncols) else {
                continue;
            };
            let Some((r0, r1)) = clamp_span(cmd.start.1, cmd.end.1, nrows) else {
                continue;
            };
            canvas.set_stroke_color(cmd.color);
            canvas.set_line_width(pt(cmd.weight));
            let vline = |canvas: &mut Canvas, x: f32| {
                canvas.line(pt(x), pt(rows[r0]), pt(x), pt(rows[r1 + 1]));
            };
            let hline = |canvas: &mut Canvas, y: f32| {
                canvas.line(pt(cols[c0]), pt(y), pt(cols[c1 + 1]), pt(y));
            };
            match cmd.op {
                LineOp::LineBefore => (c0..=c1).for_each(|c| vline(canvas, cols[c])),
                LineOp::LineAfter => (c0..=c1).for_each(|c| vline(canvas, cols[c + 1])),
                LineOp::LineAbove => (r0..=r1).for_each(|r| hline(canvas, rows[r])),
                LineOp::LineBelow => (r0..=r1).for_each(|r| hline(canvas, rows[r + 1])),
                LineOp::Box | LineOp::Outline | LineOp::Grid | LineOp::InnerGrid => {
                    if cmd.op != LineOp::InnerGrid {
                        hline(canvas, rows[r0]);
                        hline(canvas, rows[r1 + 1]);
                        vline(canvas, cols[c0]);
                        vline(canvas, cols[c1 + 1]);
                    }
                    if matches!(cmd.op, LineOp::Grid | LineOp::InnerGrid) {
                        (c0 + 1..=c1).for_each(|c| vline(canvas, cols[c]));
                        (r0 + 1..=r1).for_each(|r| hline(canvas, rows[r]));
                    }
                }
            }
        }
    }
}

fn pt(value: f32) -> Pt {
    Pt::from_f32(value)
}

impl Flowable for TableFragment {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        Size::new(self.width(), self.height())
    }

    fn split(&self, avail_width: Pt, avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        let avail_width = avail_width.to_f32();
        let needs_column_split = self.column_split_index(avail_width) > 0;
        let h_offset = if needs_column_split { CAPTION_HEIGHT } else { 0.0 };

        let (first, rest) = match self.split_rows(avail_height.to_f32() - h_offset) {
            RowSplit::Unsplittable => return None,
            RowSplit::Fits => (self.clone(), None),
            RowSplit::Split(first, rest) => (first, Some(rest)),
        };
        let rest: Option<Box<dyn Flowable>> = rest.map(|r| Box::new(r) as Box<dyn Flowable>);

        let n = first.column_split_index(avail_width);
        if n == 0 {
            // Nothing was divided; report the block as unsplittable so the
            // frame can move or force it.
            let parts: Vec<Box<dyn Flowable>> = vec![Box::new(first), rest?];
            return Some(parts);
        }

        let (left, right) = first.split_columns(n);
        let mut parts: Vec<Box<dyn Flowable>> = vec![left.caption(), Box::new(left), Box::new(PageBreak)];
        if right.column_split_index(avail_width) == 0 {
            parts.push(right.caption());
        }
        parts.push(Box::new(right));
        parts.extend(rest);
        Some(parts)
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, _avail_width: Pt, _avail_height: Pt) {
        let cols = self.col_positions(x.to_f32());
        let rows = self.row_positions(y.to_f32() + self.height());
        canvas.save_state();
        self.draw_backgrounds(canvas, &cols, &rows);
        self.draw_cells(canvas, &cols, &rows);
        self.draw_lines(canvas, &cols, &rows);
        canvas.restore_state();
    }

    fn h_align(&self) -> BlockAlign {
        self.align
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::doc_template::DocTemplate;
    use crate::page_template::PageTemplate;
    use crate::table_style::PaddingSide;
    use crate::types::{Color, Margins};

    fn grid(ncols: usize, nrows: usize, style: &TableStyle) -> TableFragment {
        let fonts = FontManager::shared_default();
        let cells = (0..nrows)
            .map(|r| {
                (0..ncols)
                    .map(|c| CellContent::Text(TableText::new(format!("r{r}c{c}"), fonts.clone())))
                    .collect()
            })
            .collect();
        TableFragment::new(cells, vec![50.0; ncols], vec![20.0; nrows], style, fonts)
    }

    fn padded() -> TableStyle {
        let mut style = TableStyle::new();
        for side in [PaddingSide::Left, PaddingSide::Right, PaddingSide::Top, PaddingSide::Bottom] {
            style.padding((0, 0), (-1, -1), side, 2.0);
        }
        style
    }

    fn captions(document: &crate::canvas::Document) -> Vec<(usize, usize)> {
        document
            .pages
            .iter()
            .flat_map(|page| page.commands.iter())
            .filter_map(|cmd| match cmd {
                Command::DrawString { text, .. } => {
                    let range = text.split("(Columns ").nth(1)?.split(" of").next()?;
                    let (s, e) = range.split_once('-')?;
                    Some((s.parse().ok()?, e.parse().ok()?))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn column_split_index_stops_before_overflow() {
        let table = grid(6, 2, &padded());
        assert_eq!(table.column_split_index(120.0), 2);
        assert_eq!(table.column_split_index(100.0), 1);
        assert_eq!(table.column_split_index(400.0), 0);
    }

    #[test]
    fn repeated_columns_count_against_the_cut() {
        let table = grid(6, 2, &padded()).with_repeats(0, 1);
        assert_eq!(table.columns().total, 5);
        let (left, right) = table.split_columns(3);
        assert_eq!((left.columns().start, left.columns().end), (1, 2));
        assert_eq!((right.columns().start, right.columns().end), (3, 5));
        assert_eq!(right.column_count(), 4);
        assert_eq!(table.column_split_index(60.0), 0);
    }

    #[test]
    fn captions_cover_every_column_once_per_band() {
        let table = grid(6, 6, &padded()).with_title("T");
        // 120x60 frames: two columns and two rows per page.
        let template =
            PageTemplate::new("page", Size::new(160.0, 100.0)).with_margins(Margins::all(20.0));
        let mut doc = DocTemplate::new(vec![template]);
        doc.add_flowable(Box::new(table));
        let document = doc.build().unwrap();
        let band = vec![(1, 2), (3, 4), (5, 6)];
        assert_eq!(captions(&document), [band.clone(), band.clone(), band].concat());
        assert_eq!(document.pages.len(), 9);
    }

    #[test]
    fn header_rows_repeat_after_a_row_split() {
        let mut style = padded();
        style.line(LineOp::LineBelow, (0, 0), (-1, 0), 1.0, Color::BLACK);
        style.line(LineOp::LineBelow, (0, 1), (-1, -2), 0.25, Color::LIGHT_GREY);
        let table = grid(2, 10, &style).with_repeats(1, 0);
        let parts = table.split(pt(200.0), pt(90.0)).unwrap();
        assert_eq!(parts.len(), 2);
        match table.split_rows(90.0) {
            RowSplit::Split(first, rest) => {
                assert_eq!(first.row_count(), 4);
                assert_eq!(rest.row_count(), 7);
                assert!(matches!(rest.cell(0, 0), Some(CellContent::Text(t)) if t.text() == "r0c0"));
                assert!(matches!(rest.cell(0, 1), Some(CellContent::Text(t)) if t.text() == "r4c0"));
                let header_rule = rest
                    .lines()
                    .iter()
                    .find(|l| l.weight == 1.0)
                    .map(|l| (l.start, l.end));
                assert_eq!(header_rule, Some(((0, 0), (1, 0))));
                assert!(rest.lines().iter().all(|l| l.end.1 < rest.row_count() as i32));
            }
            _ => panic!("expected a row split"),
        }
    }

    #[test]
    fn header_alone_is_unsplittable() {
        let table = grid(2, 4, &padded()).with_repeats(1, 0);
        assert!(table.split(pt(200.0), pt(30.0)).is_none());
    }

    #[test]
    fn fitting_rows_and_columns_do_not_split() {
        let table = grid(2, 2, &padded());
        assert!(table.split(pt(200.0), pt(100.0)).is_none());
    }

    #[test]
    fn drawing_paints_backgrounds_before_lines() {
        let mut style = padded();
        style.background((0, 0), (0, 0), Color::from_rgb8(216, 93, 60).with_alpha(0.5));
        style.line(LineOp::Grid, (0, 0), (-1, -1), 0.25, Color::BLACK);
        let table = grid(2, 2, &style);
        let mut canvas = Canvas::new(Size::new(200.0, 200.0));
        table.draw(&mut canvas, pt(10.0), pt(10.0), pt(100.0), pt(40.0));
        let commands = canvas.current_commands();
        let rect = commands
            .iter()
            .position(|c| matches!(c, Command::DrawRect { .. }))
            .unwrap();
        let first_stroke = commands.iter().position(|c| matches!(c, Command::Stroke)).unwrap();
        assert!(rect < first_stroke);
        assert!(commands.iter().any(|c| matches!(c, Command::SetOpacity { fill, .. } if *fill == 0.5)));
        // Box edges plus one inner line each way.
        assert_eq!(commands.iter().filter(|c| matches!(c, Command::Stroke)).count(), 6);
    }
}
