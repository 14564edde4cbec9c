use crate::bitmap::RasterImage;
use crate::canvas::Canvas;
use crate::types::{Color, Pt};
use std::collections::HashMap;
use std::sync::Arc;

/// 2x3 affine matrix `[a b c d e f]` in PDF order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub const fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub const fn translate(tx: f32, ty: f32) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: tx,
            f: ty,
        }
    }

    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: sy,
            e: 0.0,
            f: 0.0,
        }
    }

    pub fn rotate(deg: f32) -> Self {
        let rad = deg.to_radians();
        let s = libm::sinf(rad);
        let c = libm::cosf(rad);
        Self {
            a: c,
            b: s,
            c: -s,
            d: c,
            e: 0.0,
            f: 0.0,
        }
    }

    /// `self * other`: `other` is applied to a point first.
    pub fn mul(self, other: Self) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn inverse(self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        let inv = 1.0 / det;
        Some(Self {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }

    pub fn is_identity(self) -> bool {
        self == Self::identity()
    }
}

/// Axis-aligned box given by two corners, `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoxRect {
    pub fn from_corners(ax: f32, ay: f32, bx: f32, by: f32) -> Self {
        Self {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    /// Overlap of two boxes; `None` when they do not share any area.
    pub fn intersect(&self, other: &BoxRect) -> Option<BoxRect> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
            return None;
        }
        Some(BoxRect { x0, y0, x1, y1 })
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSeg {
    MoveTo,
    LineTo,
    /// Consumes three points: two control points and the end point.
    CurveTo,
    Close,
}

/// Point buffer plus one tag per segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathData {
    pub points: Vec<(f32, f32)>,
    pub segs: Vec<PathSeg>,
    pub explicitly_closed: bool,
}

impl PathData {
    pub fn move_to(&mut self, x: f32, y: f32) {
        self.points.push((x, y));
        self.segs.push(PathSeg::MoveTo);
    }

    pub fn line_to(&mut self, x: f32, y: f32) {
        self.points.push((x, y));
        self.segs.push(PathSeg::LineTo);
    }

    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.points.extend_from_slice(&[(x1, y1), (x2, y2), (x, y)]);
        self.segs.push(PathSeg::CurveTo);
    }

    pub fn close(&mut self) {
        self.segs.push(PathSeg::Close);
    }

    pub fn current_point(&self) -> (f32, f32) {
        self.points.last().copied().unwrap_or((0.0, 0.0))
    }

    pub fn is_closed(&self) -> bool {
        self.segs.last() == Some(&PathSeg::Close)
    }

    pub fn polygon(points: &[(f32, f32)], close: bool) -> PathData {
        let mut path = PathData::default();
        for (i, (x, y)) in points.iter().enumerate() {
            if i == 0 {
                path.move_to(*x, *y);
            } else {
                path.line_to(*x, *y);
            }
        }
        if close && !points.is_empty() {
            path.close();
        }
        path
    }
}

/// Resolved paint. Colors carry the composed opacity as alpha.
#[derive(Debug, Clone, PartialEq)]
pub struct Paint {
    pub fill: Option<Color>,
    pub stroke: Option<Color>,
    pub stroke_width: f32,
    pub dash: Vec<f32>,
}

impl Default for Paint {
    fn default() -> Self {
        Self {
            fill: None,
            stroke: None,
            stroke_width: 0.0,
            dash: Vec::new(),
        }
    }
}

impl Paint {
    fn visible_fill(&self) -> Option<Color> {
        self.fill.filter(|c| c.a > 0.0)
    }

    fn visible_stroke(&self) -> Option<Color> {
        self.stroke.filter(|c| c.a > 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

impl TextAnchor {
    pub fn parse(value: Option<&str>) -> TextAnchor {
        match value.map(str::trim) {
            Some("middle") => TextAnchor::Middle,
            Some("end") => TextAnchor::End,
            Some("start") | None => TextAnchor::Start,
            Some(other) => {
                log::warn!("unsupported text-anchor {other:?}, using start");
                TextAnchor::Start
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub font: String,
    pub text: String,
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        rx: f32,
        ry: f32,
        paint: Paint,
    },
    Polygon {
        points: Vec<(f32, f32)>,
        paint: Paint,
    },
    Polyline {
        points: Vec<(f32, f32)>,
        paint: Paint,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        paint: Paint,
    },
    Circle {
        cx: f32,
        cy: f32,
        r: f32,
        paint: Paint,
    },
    Path {
        data: PathData,
        paint: Paint,
    },
    Text {
        x: f32,
        y: f32,
        font_size: f32,
        anchor: TextAnchor,
        fill: Color,
        runs: Vec<TextRun>,
    },
    Image {
        width: f32,
        height: f32,
        clip: Option<BoxRect>,
        opacity: f32,
        image: Arc<RasterImage>,
    },
}

impl Shape {
    fn text_width(runs: &[TextRun]) -> f32 {
        runs.iter().map(|r| r.width).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Clip {
    Rect(BoxRect),
    /// Key into the scene's clip registry.
    Ref(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Group(Group),
    Shape(Shape),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub transform: Matrix,
    pub clip: Option<Clip>,
    pub children: Vec<Node>,
}

impl Group {
    pub fn with_transform(transform: Matrix) -> Self {
        Self {
            transform,
            ..Self::default()
        }
    }

    pub fn push(&mut self, node: Node) {
        self.children.push(node);
    }

    pub fn shape_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                Node::Group(group) => group.shape_count(),
                Node::Shape(_) => 1,
            })
            .sum()
    }
}

/// Clip geometry keyed by element id, filled while walking the markup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipRegistry {
    paths: HashMap<String, Vec<Node>>,
}

impl ClipRegistry {
    pub fn register(&mut self, id: impl Into<String>, nodes: Vec<Node>) {
        self.paths.insert(id.into(), nodes);
    }

    pub fn get(&self, id: &str) -> Option<&[Node]> {
        self.paths.get(id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.paths.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: f32,
    pub height: f32,
    pub root: Group,
    pub clips: ClipRegistry,
}

fn pt(v: f32) -> Pt {
    Pt::from_f32(v)
}

impl Scene {
    /// Draws the scene with its bottom-left corner at `(x, y)`.
    pub fn draw(&self, canvas: &mut Canvas, x: f32, y: f32, scale: f32) {
        canvas.save_state();
        canvas.concat_matrix(scale, 0.0, 0.0, scale, x, y);
        self.draw_group(canvas, &self.root);
        canvas.restore_state();
    }

    fn draw_group(&self, canvas: &mut Canvas, group: &Group) {
        canvas.save_state();
        if !group.transform.is_identity() {
            let m = group.transform;
            canvas.concat_matrix(m.a, m.b, m.c, m.d, m.e, m.f);
        }
        match &group.clip {
            Some(Clip::Rect(rect)) => {
                canvas.clip_rect(pt(rect.x0), pt(rect.y0), pt(rect.width()), pt(rect.height()));
            }
            Some(Clip::Ref(id)) => match self.clips.get(id) {
                Some(nodes) => {
                    for node in nodes {
                        emit_clip_geometry(canvas, node, Matrix::identity());
                    }
                    canvas.clip_path(false);
                }
                None => log::debug!("clip path #{id} is not registered, drawing unclipped"),
            },
            None => {}
        }
        for child in &group.children {
            match child {
                Node::Group(inner) => self.draw_group(canvas, inner),
                Node::Shape(shape) => draw_shape(canvas, shape),
            }
        }
        canvas.restore_state();
    }
}

fn emit_path(canvas: &mut Canvas, data: &PathData, m: Matrix) {
    let mut points = data.points.iter().map(|(x, y)| m.apply(*x, *y));
    for seg in &data.segs {
        match seg {
            PathSeg::MoveTo => {
                if let Some((x, y)) = points.next() {
                    canvas.move_to(pt(x), pt(y));
                }
            }
            PathSeg::LineTo => {
                if let Some((x, y)) = points.next() {
                    canvas.line_to(pt(x), pt(y));
                }
            }
            PathSeg::CurveTo => {
                if let (Some(c1), Some(c2), Some(end)) = (points.next(), points.next(), points.next())
                {
                    canvas.curve_to(pt(c1.0), pt(c1.1), pt(c2.0), pt(c2.1), pt(end.0), pt(end.1));
                }
            }
            PathSeg::Close => canvas.close_path(),
        }
    }
}

const KAPPA: f32 = 0.552_284_8;

fn ellipse_path(cx: f32, cy: f32, rx: f32, ry: f32) -> PathData {
    let ox = rx * KAPPA;
    let oy = ry * KAPPA;
    let mut path = PathData::default();
    path.move_to(cx + rx, cy);
    path.curve_to(cx + rx, cy + oy, cx + ox, cy + ry, cx, cy + ry);
    path.curve_to(cx - ox, cy + ry, cx - rx, cy + oy, cx - rx, cy);
    path.curve_to(cx - rx, cy - oy, cx - ox, cy - ry, cx, cy - ry);
    path.curve_to(cx + ox, cy - ry, cx + rx, cy - oy, cx + rx, cy);
    path.close();
    path
}

fn rounded_rect_path(x: f32, y: f32, w: f32, h: f32, rx: f32, ry: f32) -> PathData {
    let rx = rx.min(w / 2.0);
    let ry = ry.min(h / 2.0);
    let ox = rx * KAPPA;
    let oy = ry * KAPPA;
    let mut path = PathData::default();
    path.move_to(x + rx, y);
    path.line_to(x + w - rx, y);
    path.curve_to(x + w - rx + ox, y, x + w, y + ry - oy, x + w, y + ry);
    path.line_to(x + w, y + h - ry);
    path.curve_to(x + w, y + h - ry + oy, x + w - rx + ox, y + h, x + w - rx, y + h);
    path.line_to(x + rx, y + h);
    path.curve_to(x + rx - ox, y + h, x, y + h - ry + oy, x, y + h - ry);
    path.line_to(x, y + ry);
    path.curve_to(x, y + ry - oy, x + rx - ox, y, x + rx, y);
    path.close();
    path
}

/// Outline of a shape as path data in the shape's own space.
fn shape_outline(shape: &Shape) -> Option<PathData> {
    match shape {
        Shape::Rect {
            x,
            y,
            width,
            height,
            rx,
            ry,
            ..
        } => {
            if *rx > 0.0 || *ry > 0.0 {
                let rx = if *rx > 0.0 { *rx } else { *ry };
                let ry = if *ry > 0.0 { *ry } else { rx };
                Some(rounded_rect_path(*x, *y, *width, *height, rx, ry))
            } else {
                Some(PathData::polygon(
                    &[
                        (*x, *y),
                        (x + width, *y),
                        (x + width, y + height),
                        (*x, y + height),
                    ],
                    true,
                ))
            }
        }
        Shape::Polygon { points, .. } => Some(PathData::polygon(points, true)),
        Shape::Polyline { points, .. } => Some(PathData::polygon(points, false)),
        Shape::Line { x1, y1, x2, y2, .. } => {
            Some(PathData::polygon(&[(*x1, *y1), (*x2, *y2)], false))
        }
        Shape::Circle { cx, cy, r, .. } => Some(ellipse_path(*cx, *cy, *r, *r)),
        Shape::Path { data, .. } => Some(data.clone()),
        Shape::Text { .. } | Shape::Image { .. } => None,
    }
}

fn emit_clip_geometry(canvas: &mut Canvas, node: &Node, m: Matrix) {
    match node {
        Node::Group(group) => {
            let m = m.mul(group.transform);
            for child in &group.children {
                emit_clip_geometry(canvas, child, m);
            }
        }
        Node::Shape(shape) => {
            if let Some(outline) = shape_outline(shape) {
                emit_path(canvas, &outline, m);
            }
        }
    }
}

fn draw_shape(canvas: &mut Canvas, shape: &Shape) {
    match shape {
        Shape::Text {
            x,
            y,
            font_size,
            anchor,
            fill,
            runs,
        } => draw_text(canvas, *x, *y, *font_size, *anchor, *fill, runs),
        Shape::Image {
            width,
            height,
            clip,
            opacity,
            image,
        } => {
            canvas.save_state();
            if let Some(clip) = clip {
                canvas.clip_rect(pt(clip.x0), pt(clip.y0), pt(clip.width()), pt(clip.height()));
            }
            // Local space is y-down; paint the bitmap upright.
            canvas.concat_matrix(1.0, 0.0, 0.0, -1.0, 0.0, *height);
            canvas.set_opacity(*opacity, *opacity);
            canvas.draw_image(Pt::ZERO, Pt::ZERO, pt(*width), pt(*height), image);
            canvas.restore_state();
        }
        Shape::Rect { paint, .. }
        | Shape::Polygon { paint, .. }
        | Shape::Circle { paint, .. }
        | Shape::Path { paint, .. } => {
            if let Some(outline) = shape_outline(shape) {
                paint_path(canvas, &outline, paint, true);
            }
        }
        Shape::Polyline { paint, .. } | Shape::Line { paint, .. } => {
            if let Some(outline) = shape_outline(shape) {
                paint_path(canvas, &outline, paint, false);
            }
        }
    }
}

fn paint_path(canvas: &mut Canvas, data: &PathData, paint: &Paint, fillable: bool) {
    let fill = if fillable { paint.visible_fill() } else { None };
    let stroke = paint.visible_stroke();
    if fill.is_none() && stroke.is_none() {
        return;
    }
    canvas.set_opacity(
        fill.map(|c| c.a).unwrap_or(1.0),
        stroke.map(|c| c.a).unwrap_or(1.0),
    );
    if let Some(color) = fill {
        canvas.set_fill_color(color);
    }
    if let Some(color) = stroke {
        canvas.set_stroke_color(color);
        canvas.set_line_width(pt(paint.stroke_width));
        canvas.set_dash(paint.dash.iter().map(|v| pt(*v)).collect(), Pt::ZERO);
    }
    emit_path(canvas, data, Matrix::identity());
    match (fill.is_some(), stroke.is_some()) {
        (true, true) => canvas.fill_stroke(),
        (true, false) => canvas.fill(),
        _ => canvas.stroke(),
    }
}

fn draw_text(
    canvas: &mut Canvas,
    x: f32,
    y: f32,
    font_size: f32,
    anchor: TextAnchor,
    fill: Color,
    runs: &[TextRun],
) {
    if runs.is_empty() {
        return;
    }
    let width = Shape::text_width(runs);
    let mut cursor = match anchor {
        TextAnchor::Start => x,
        TextAnchor::Middle => x - width * 0.5,
        TextAnchor::End => x - width,
    };
    canvas.set_opacity(fill.a, 1.0);
    canvas.set_fill_color(fill);
    canvas.set_font_size(pt(font_size));
    for run in runs {
        canvas.set_font_name(&run.font);
        canvas.draw_string(pt(cursor), pt(y), run.text.clone());
        cursor += run.width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::types::Size;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn rotate_about_point_matches_reference() {
        let m = Matrix::translate(0.0, 10.0)
            .mul(Matrix::rotate(90.0))
            .mul(Matrix::translate(0.0, -10.0));
        let expected = [0.0, 1.0, -1.0, 0.0, 10.0, 10.0];
        let actual = [m.a, m.b, m.c, m.d, m.e, m.f];
        for (a, e) in actual.iter().zip(expected) {
            assert!(close(*a, e), "{actual:?}");
        }
    }

    #[test]
    fn inverse_round_trips_a_point() {
        let m = Matrix::translate(5.0, -3.0).mul(Matrix::scale(2.0, -1.0));
        let inv = m.inverse().unwrap();
        let (x, y) = m.apply(7.0, 11.0);
        let (bx, by) = inv.apply(x, y);
        assert!(close(bx, 7.0) && close(by, 11.0));
        assert!(Matrix::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn box_intersection_rejects_touching_edges() {
        let a = BoxRect::from_corners(0.0, 0.0, 10.0, 10.0);
        let b = BoxRect::from_corners(5.0, 5.0, 15.0, 15.0);
        assert_eq!(a.intersect(&b), Some(BoxRect::from_corners(5.0, 5.0, 10.0, 10.0)));
        let c = BoxRect::from_corners(10.0, 0.0, 20.0, 10.0);
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn referenced_clip_becomes_a_single_clip_path() {
        let mut clips = ClipRegistry::default();
        clips.register(
            "c",
            vec![
                Node::Shape(Shape::Rect {
                    x: 0.0,
                    y: 0.0,
                    width: 5.0,
                    height: 5.0,
                    rx: 0.0,
                    ry: 0.0,
                    paint: Paint::default(),
                }),
                Node::Shape(Shape::Circle {
                    cx: 10.0,
                    cy: 10.0,
                    r: 2.0,
                    paint: Paint::default(),
                }),
            ],
        );
        let mut root = Group::default();
        root.push(Node::Group(Group {
            clip: Some(Clip::Ref("c".into())),
            ..Group::default()
        }));
        let scene = Scene {
            width: 20.0,
            height: 20.0,
            root,
            clips,
        };
        let mut canvas = Canvas::new(Size::new(100.0, 100.0));
        scene.draw(&mut canvas, 0.0, 0.0, 1.0);
        let clip_ops = canvas
            .current_commands()
            .iter()
            .filter(|c| matches!(c, Command::ClipPath { .. }))
            .count();
        assert_eq!(clip_ops, 1);
    }

    #[test]
    fn transparent_paint_draws_nothing() {
        let mut canvas = Canvas::new(Size::new(100.0, 100.0));
        draw_shape(
            &mut canvas,
            &Shape::Polygon {
                points: vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)],
                paint: Paint {
                    fill: Some(Color::rgba(1.0, 0.0, 0.0, 0.0)),
                    ..Paint::default()
                },
            },
        );
        assert!(canvas.is_current_empty());
    }
}
