//! Table style commands and their remapping when a table is cut.
//!
//! Cell references are `(col, row)`. Negative indices count from the end and
//! are resolved once against the grid the commands are attached to; after
//! that every command in a fragment uses plain non-negative indices.

use crate::types::Color;

pub type CellRef = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HAlign {
    #[default]
    Left,
    Center,
    Right,
}

impl HAlign {
    pub fn parse(value: &str) -> Option<HAlign> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LEFT" => Some(HAlign::Left),
            "CENTER" | "CENTRE" => Some(HAlign::Center),
            "RIGHT" => Some(HAlign::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VAlign {
    Top,
    Middle,
    #[default]
    Bottom,
}

impl VAlign {
    pub fn parse(value: &str) -> Option<VAlign> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TOP" => Some(VAlign::Top),
            "MIDDLE" | "CENTER" => Some(VAlign::Middle),
            "BOTTOM" => Some(VAlign::Bottom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    Grid,
    Box,
    Outline,
    InnerGrid,
    LineBefore,
    LineAfter,
    LineAbove,
    LineBelow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineCommand {
    pub op: LineOp,
    pub start: CellRef,
    pub end: CellRef,
    pub weight: f32,
    pub color: Color,
}

impl LineCommand {
    pub fn new(op: LineOp, start: CellRef, end: CellRef, weight: f32, color: Color) -> Self {
        Self {
            op,
            start,
            end,
            weight,
            color,
        }
    }

    fn with_op(&self, op: LineOp, start: CellRef, end: CellRef) -> Self {
        Self {
            op,
            start,
            end,
            weight: self.weight,
            color: self.color,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundCommand {
    pub start: CellRef,
    pub end: CellRef,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingSide {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StyleCommand {
    Line(LineCommand),
    Background(BackgroundCommand),
    Align {
        start: CellRef,
        end: CellRef,
        align: HAlign,
    },
    VAlign {
        start: CellRef,
        end: CellRef,
        align: VAlign,
    },
    Padding {
        start: CellRef,
        end: CellRef,
        side: PaddingSide,
        value: f32,
    },
}

/// Per-cell settings after all commands have been applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellStyle {
    pub h_align: HAlign,
    pub v_align: VAlign,
    pub left_padding: f32,
    pub right_padding: f32,
    pub top_padding: f32,
    pub bottom_padding: f32,
}

impl Default for CellStyle {
    fn default() -> Self {
        Self {
            h_align: HAlign::Left,
            v_align: VAlign::Bottom,
            left_padding: 6.0,
            right_padding: 6.0,
            top_padding: 3.0,
            bottom_padding: 3.0,
        }
    }
}

/// Ordered command list. Later commands win for the cells they cover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStyle {
    commands: Vec<StyleCommand>,
}

/// Style commands bound to a concrete grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedStyle {
    /// Indexed `[row][col]`.
    pub cells: Vec<Vec<CellStyle>>,
    pub lines: Vec<LineCommand>,
    pub backgrounds: Vec<BackgroundCommand>,
}

impl TableStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, command: StyleCommand) {
        self.commands.push(command);
    }

    pub fn line(&mut self, op: LineOp, start: CellRef, end: CellRef, weight: f32, color: Color) {
        self.add(StyleCommand::Line(LineCommand::new(op, start, end, weight, color)));
    }

    pub fn background(&mut self, start: CellRef, end: CellRef, color: Color) {
        self.add(StyleCommand::Background(BackgroundCommand { start, end, color }));
    }

    pub fn align(&mut self, start: CellRef, end: CellRef, align: HAlign) {
        self.add(StyleCommand::Align { start, end, align });
    }

    pub fn valign(&mut self, start: CellRef, end: CellRef, align: VAlign) {
        self.add(StyleCommand::VAlign { start, end, align });
    }

    pub fn padding(&mut self, start: CellRef, end: CellRef, side: PaddingSide, value: f32) {
        self.add(StyleCommand::Padding {
            start,
            end,
            side,
            value,
        });
    }

    pub fn commands(&self) -> &[StyleCommand] {
        &self.commands
    }

    pub fn resolve(&self, ncols: usize, nrows: usize) -> ResolvedStyle {
        let mut resolved = ResolvedStyle {
            cells: vec![vec![CellStyle::default(); ncols]; nrows],
            lines: Vec::new(),
            backgrounds: Vec::new(),
        };
        for command in &self.commands {
            match command {
                StyleCommand::Line(line) => {
                    let (start, end) = normalize_range(line.start, line.end, ncols, nrows);
                    resolved.lines.push(line.with_op(line.op, start, end));
                }
                StyleCommand::Background(bg) => {
                    let (start, end) = normalize_range(bg.start, bg.end, ncols, nrows);
                    resolved.backgrounds.push(BackgroundCommand {
                        start,
                        end,
                        color: bg.color,
                    });
                }
                StyleCommand::Align { start, end, align } => {
                    for_each_cell(&mut resolved.cells, *start, *end, |cell| cell.h_align = *align);
                }
                StyleCommand::VAlign { start, end, align } => {
                    for_each_cell(&mut resolved.cells, *start, *end, |cell| cell.v_align = *align);
                }
                StyleCommand::Padding {
                    start,
                    end,
                    side,
                    value,
                } => for_each_cell(&mut resolved.cells, *start, *end, |cell| match side {
                    PaddingSide::Left => cell.left_padding = *value,
                    PaddingSide::Right => cell.right_padding = *value,
                    PaddingSide::Top => cell.top_padding = *value,
                    PaddingSide::Bottom => cell.bottom_padding = *value,
                }),
            }
        }
        resolved
    }
}

fn normalize(index: i32, len: usize) -> i32 {
    if index < 0 { index + len as i32 } else { index }
}

fn normalize_range(start: CellRef, end: CellRef, ncols: usize, nrows: usize) -> (CellRef, CellRef) {
    (
        (normalize(start.0, ncols), normalize(start.1, nrows)),
        (normalize(end.0, ncols), normalize(end.1, nrows)),
    )
}

fn for_each_cell(cells: &mut [Vec<CellStyle>], start: CellRef, end: CellRef, mut f: impl FnMut(&mut CellStyle)) {
    let nrows = cells.len();
    let ncols = cells.first().map(Vec::len).unwrap_or(0);
    let ((sc, sr), (ec, er)) = normalize_range(start, end, ncols, nrows);
    let Some((c0, c1)) = clamp_span(sc, ec, ncols) else {
        return;
    };
    let Some((r0, r1)) = clamp_span(sr, er, nrows) else {
        return;
    };
    for row in &mut cells[r0..=r1] {
        for cell in &mut row[c0..=c1] {
            f(cell);
        }
    }
}

/// Inclusive span clipped to `0..len`, or `None` when nothing is left.
pub(crate) fn clamp_span(start: i32, end: i32, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let start = start.max(0);
    let end = end.min(len as i32 - 1);
    if start > end {
        return None;
    }
    Some((start as usize, end as usize))
}

/// Direction of a cut through the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Column,
    Row,
}

impl Axis {
    fn get(self, cell: CellRef) -> i32 {
        match self {
            Axis::Column => cell.0,
            Axis::Row => cell.1,
        }
    }

    fn set(self, cell: CellRef, value: i32) -> CellRef {
        match self {
            Axis::Column => (value, cell.1),
            Axis::Row => (cell.0, value),
        }
    }

    /// Edge drawn on the leading side of each index along this axis.
    fn leading(self) -> LineOp {
        match self {
            Axis::Column => LineOp::LineBefore,
            Axis::Row => LineOp::LineAbove,
        }
    }

    fn trailing(self) -> LineOp {
        match self {
            Axis::Column => LineOp::LineAfter,
            Axis::Row => LineOp::LineBelow,
        }
    }
}

/// Rewrites line commands so both sides of a cut at index `n` keep their
/// borders. Boxes crossing the cut are broken into their four edges, and
/// edges on the cut itself are drawn on both sides.
pub fn lines_at_cut(lines: &[LineCommand], axis: Axis, n: i32) -> Vec<LineCommand> {
    let mut out = Vec::with_capacity(lines.len());
    for cmd in lines {
        let s = axis.get(cmd.start);
        let e = axis.get(cmd.end);
        let straddles = s < n && e >= n;
        let ((sc, sr), (ec, er)) = (cmd.start, cmd.end);
        let at = |index: i32| (axis.set(cmd.start, index), axis.set(cmd.end, index));
        match cmd.op {
            LineOp::Box | LineOp::Outline | LineOp::Grid if straddles => {
                out.push(cmd.with_op(LineOp::LineBefore, (sc, sr), (sc, er)));
                out.push(cmd.with_op(LineOp::LineAfter, (ec, sr), (ec, er)));
                out.push(cmd.with_op(LineOp::LineAbove, (sc, sr), (ec, sr)));
                out.push(cmd.with_op(LineOp::LineBelow, (sc, er), (ec, er)));
                if cmd.op == LineOp::Grid {
                    let (a, b) = at(n);
                    out.push(cmd.with_op(axis.leading(), a, b));
                    let (a, b) = at(n - 1);
                    out.push(cmd.with_op(axis.trailing(), a, b));
                    out.push(cmd.with_op(LineOp::InnerGrid, cmd.start, cmd.end));
                }
            }
            op if straddles && (op == LineOp::InnerGrid || op == axis.leading()) => {
                let (a, b) = at(n - 1);
                out.push(cmd.with_op(axis.trailing(), a, b));
                let (a, b) = at(n);
                out.push(cmd.with_op(axis.leading(), a, b));
                out.push(cmd.clone());
            }
            op if op == axis.trailing() && s < n && e >= n - 1 => {
                let (a, b) = at(n);
                out.push(cmd.with_op(axis.leading(), a, b));
                out.push(cmd.clone());
            }
            _ => out.push(cmd.clone()),
        }
    }
    out
}

/// Commands that carry a cell range and can be moved between fragments.
pub trait CellRange: Clone {
    fn range(&self) -> (CellRef, CellRef);
    fn with_range(&self, start: CellRef, end: CellRef) -> Self;
}

impl CellRange for LineCommand {
    fn range(&self) -> (CellRef, CellRef) {
        (self.start, self.end)
    }

    fn with_range(&self, start: CellRef, end: CellRef) -> Self {
        self.with_op(self.op, start, end)
    }
}

impl CellRange for BackgroundCommand {
    fn range(&self) -> (CellRef, CellRef) {
        (self.start, self.end)
    }

    fn with_range(&self, start: CellRef, end: CellRef) -> Self {
        Self {
            start,
            end,
            color: self.color,
        }
    }
}

/// Commands for the part before index `n`.
pub fn keep_before<T: CellRange>(commands: &[T], axis: Axis, n: i32) -> Vec<T> {
    commands
        .iter()
        .filter_map(|cmd| {
            let (start, end) = cmd.range();
            if axis.get(start) >= n {
                return None;
            }
            let end = if axis.get(end) >= n { axis.set(end, n - 1) } else { end };
            Some(cmd.with_range(start, end))
        })
        .collect()
}

/// Commands for the part from index `n` on, where the first `repeat`
/// indices are copies of the leading lines of the table.
pub fn keep_after<T: CellRange>(commands: &[T], axis: Axis, n: i32, repeat: i32) -> Vec<T> {
    commands
        .iter()
        .filter_map(|cmd| {
            let (start, end) = cmd.range();
            let (s, e) = (axis.get(start), axis.get(end));
            let (s, e) = if repeat == 0 {
                if (0..n).contains(&e) {
                    return None;
                }
                let s = if (0..n).contains(&s) { 0 } else if s >= n { s - n } else { s };
                (s, if e >= n { e - n } else { e })
            } else {
                if (repeat..n).contains(&s) && (0..n).contains(&e) {
                    return None;
                }
                let shift = |i: i32| {
                    if (repeat..n).contains(&i) {
                        repeat
                    } else if i >= n {
                        i + repeat - n
                    } else {
                        i
                    }
                };
                (shift(s), shift(e))
            };
            Some(cmd.with_range(axis.set(start, s), axis.set(end, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(op: LineOp, start: CellRef, end: CellRef) -> LineCommand {
        LineCommand::new(op, start, end, 0.25, Color::LIGHT_GREY)
    }

    fn ops(lines: &[LineCommand]) -> Vec<(LineOp, CellRef, CellRef)> {
        lines.iter().map(|l| (l.op, l.start, l.end)).collect()
    }

    #[test]
    fn negative_indices_resolve_against_the_grid() {
        let mut style = TableStyle::new();
        style.line(LineOp::LineAfter, (0, 0), (-2, -1), 0.25, Color::LIGHT_GREY);
        style.align((-1, 1), (-1, -1), HAlign::Right);
        let resolved = style.resolve(4, 3);
        assert_eq!(ops(&resolved.lines), vec![(LineOp::LineAfter, (0, 0), (2, 2))]);
        assert_eq!(resolved.cells[0][3].h_align, HAlign::Left);
        assert_eq!(resolved.cells[1][3].h_align, HAlign::Right);
        assert_eq!(resolved.cells[2][3].h_align, HAlign::Right);
    }

    #[test]
    fn later_commands_win() {
        let mut style = TableStyle::new();
        style.align((0, 0), (-1, -1), HAlign::Right);
        style.align((0, 0), (0, 0), HAlign::Center);
        style.padding((0, 0), (-1, -1), PaddingSide::Left, 2.0);
        let resolved = style.resolve(2, 2);
        assert_eq!(resolved.cells[0][0].h_align, HAlign::Center);
        assert_eq!(resolved.cells[1][1].h_align, HAlign::Right);
        assert!(resolved.cells.iter().flatten().all(|c| c.left_padding == 2.0));
    }

    #[test]
    fn grid_across_a_column_cut_becomes_edges() {
        let lines = lines_at_cut(&[line(LineOp::Grid, (0, 0), (5, 3))], Axis::Column, 2);
        assert_eq!(
            ops(&lines),
            vec![
                (LineOp::LineBefore, (0, 0), (0, 3)),
                (LineOp::LineAfter, (5, 0), (5, 3)),
                (LineOp::LineAbove, (0, 0), (5, 0)),
                (LineOp::LineBelow, (0, 3), (5, 3)),
                (LineOp::LineBefore, (2, 0), (2, 3)),
                (LineOp::LineAfter, (1, 0), (1, 3)),
                (LineOp::InnerGrid, (0, 0), (5, 3)),
            ]
        );
    }

    #[test]
    fn trailing_edge_at_the_cut_is_mirrored() {
        let lines = lines_at_cut(&[line(LineOp::LineBelow, (0, 0), (3, 4))], Axis::Row, 3);
        assert_eq!(
            ops(&lines),
            vec![
                (LineOp::LineAbove, (0, 3), (3, 3)),
                (LineOp::LineBelow, (0, 0), (3, 4)),
            ]
        );
        // Entirely before the cut: untouched.
        let lines = lines_at_cut(&[line(LineOp::LineBelow, (0, 0), (3, 0))], Axis::Row, 3);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn left_part_clamps_and_drops() {
        let cmds = vec![
            line(LineOp::LineAfter, (0, 0), (4, 2)),
            line(LineOp::LineBefore, (3, 0), (3, 2)),
        ];
        let kept = keep_before(&cmds, Axis::Column, 2);
        assert_eq!(ops(&kept), vec![(LineOp::LineAfter, (0, 0), (1, 2))]);
    }

    #[test]
    fn right_part_shifts_without_repeats() {
        let cmds = vec![
            line(LineOp::LineAfter, (0, 0), (4, 2)),
            line(LineOp::LineBefore, (1, 0), (1, 2)),
            line(LineOp::LineBefore, (3, 0), (3, 2)),
        ];
        let kept = keep_after(&cmds, Axis::Column, 2, 0);
        assert_eq!(
            ops(&kept),
            vec![
                (LineOp::LineAfter, (0, 0), (2, 2)),
                (LineOp::LineBefore, (1, 0), (1, 2)),
            ]
        );
    }

    #[test]
    fn right_part_keeps_repeated_header() {
        let cmds = vec![
            line(LineOp::LineBelow, (0, 0), (3, 0)),
            line(LineOp::LineBelow, (0, 1), (3, 8)),
            line(LineOp::LineBelow, (0, 2), (3, 3)),
        ];
        let kept = keep_after(&cmds, Axis::Row, 5, 1);
        assert_eq!(
            ops(&kept),
            vec![
                (LineOp::LineBelow, (0, 0), (3, 0)),
                (LineOp::LineBelow, (0, 1), (3, 4)),
            ]
        );
    }

    #[test]
    fn alignment_names_parse() {
        assert_eq!(VAlign::parse("middle"), Some(VAlign::Middle));
        assert_eq!(HAlign::parse("RIGHT"), Some(HAlign::Right));
        assert_eq!(VAlign::parse("sideways"), None);
    }
}
