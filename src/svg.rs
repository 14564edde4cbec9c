use crate::bitmap::RasterImage;
use crate::error::ReportError;
use crate::font::FontManager;
use crate::scene::{
    BoxRect, Clip, ClipRegistry, Group, Matrix, Node, Paint, PathData, Scene, Shape, TextAnchor,
    TextRun,
};
use crate::types::Color;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

// Chart markup subset renderer.
//
// Supported:
// - <svg> root (width/height from style or attributes, viewBox clip)
// - <g>, <defs>, <clipPath> (rect, polygon, circle, path children)
// - <rect>, <polygon>, <polyline>, <line>, <circle>, <path>, <text>/<tspan>, <image>
// - path commands M/m, L/l, H/h, V/v, C/c, Z/z and absolute circular A
// - transform="" with translate, scale, rotate, matrix
//
// Anything else is skipped with a debug log.

const SVG_NS: &str = "http://www.w3.org/2000/svg";
const DEFAULT_WIDTH: f32 = 600.0;
const DEFAULT_HEIGHT: f32 = 400.0;
const DEFAULT_FONT_SIZE: f32 = 10.0;
const IGNORED_CLASSES: [&str; 2] = ["highcharts-tooltip", "highcharts-tracker"];
// ~5 segments per degree of arc.
const ARC_SEGMENTS_PER_RADIAN: f64 = 286.0;
const CLOSE_TOLERANCE: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Svg,
    G,
    Defs,
    ClipPath,
    Rect,
    Polygon,
    Polyline,
    Circle,
    Text,
    Path,
    Image,
    Line,
    Unsupported,
}

impl ElementKind {
    fn of(node: roxmltree::Node<'_, '_>) -> Self {
        if node
            .tag_name()
            .namespace()
            .is_some_and(|ns| ns != SVG_NS)
        {
            return ElementKind::Unsupported;
        }
        match node.tag_name().name().to_ascii_lowercase().as_str() {
            "svg" => ElementKind::Svg,
            "g" => ElementKind::G,
            "defs" => ElementKind::Defs,
            "clippath" => ElementKind::ClipPath,
            "rect" => ElementKind::Rect,
            "polygon" => ElementKind::Polygon,
            "polyline" => ElementKind::Polyline,
            "circle" => ElementKind::Circle,
            "text" => ElementKind::Text,
            "path" => ElementKind::Path,
            "image" => ElementKind::Image,
            "line" => ElementKind::Line,
            _ => ElementKind::Unsupported,
        }
    }

    fn produces_clip_geometry(self) -> bool {
        matches!(
            self,
            ElementKind::Rect | ElementKind::Polygon | ElementKind::Circle | ElementKind::Path
        )
    }

    fn attribute_tables(self) -> &'static [&'static [AttrSpec]] {
        match self {
            ElementKind::Rect => &[RECT_ATTRS, SOLID_SHAPE_ATTRS, LINE_SHAPE_ATTRS],
            ElementKind::Polygon | ElementKind::Polyline => {
                &[POINTS_ATTRS, SOLID_SHAPE_ATTRS, LINE_SHAPE_ATTRS]
            }
            ElementKind::Line => &[LINE_ATTRS, SOLID_SHAPE_ATTRS, LINE_SHAPE_ATTRS],
            ElementKind::Circle => &[CIRCLE_ATTRS, SOLID_SHAPE_ATTRS, LINE_SHAPE_ATTRS],
            ElementKind::Path => &[SOLID_SHAPE_ATTRS, LINE_SHAPE_ATTRS],
            ElementKind::Text => &[TEXT_ATTRS],
            ElementKind::Image => &[IMAGE_ATTRS],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Float,
    Color,
    Text,
    IntList,
    Points,
}

#[derive(Debug, Clone, Copy)]
struct AttrSpec {
    source: &'static str,
    target: &'static str,
    kind: ValueKind,
    // Floats without a default are reported missing when absent.
    default: Option<f32>,
}

const fn attr(source: &'static str, kind: ValueKind, default: Option<f32>) -> AttrSpec {
    AttrSpec {
        source,
        target: source,
        kind,
        default,
    }
}

const LINE_SHAPE_ATTRS: &[AttrSpec] = &[
    attr("stroke", ValueKind::Color, None),
    attr("stroke-width", ValueKind::Float, Some(0.0)),
    attr("stroke-opacity", ValueKind::Float, Some(1.0)),
    attr("stroke-dasharray", ValueKind::IntList, None),
];

const SOLID_SHAPE_ATTRS: &[AttrSpec] = &[
    attr("fill", ValueKind::Color, None),
    attr("fill-opacity", ValueKind::Float, Some(1.0)),
];

const RECT_ATTRS: &[AttrSpec] = &[
    attr("x", ValueKind::Float, Some(0.0)),
    attr("y", ValueKind::Float, Some(0.0)),
    attr("width", ValueKind::Float, Some(0.0)),
    attr("height", ValueKind::Float, Some(0.0)),
    attr("rx", ValueKind::Float, Some(0.0)),
    attr("ry", ValueKind::Float, Some(0.0)),
];

const POINTS_ATTRS: &[AttrSpec] = &[attr("points", ValueKind::Points, None)];

const LINE_ATTRS: &[AttrSpec] = &[
    attr("x1", ValueKind::Float, None),
    attr("y1", ValueKind::Float, None),
    attr("x2", ValueKind::Float, None),
    attr("y2", ValueKind::Float, None),
];

const CIRCLE_ATTRS: &[AttrSpec] = &[
    attr("cx", ValueKind::Float, Some(0.0)),
    attr("cy", ValueKind::Float, Some(0.0)),
    attr("r", ValueKind::Float, Some(0.0)),
];

const TEXT_ATTRS: &[AttrSpec] = &[
    attr("x", ValueKind::Float, Some(0.0)),
    attr("y", ValueKind::Float, Some(0.0)),
    attr("text-anchor", ValueKind::Text, None),
    attr("font-size", ValueKind::Text, None),
    AttrSpec {
        source: "color",
        target: "fill",
        kind: ValueKind::Color,
        default: None,
    },
    attr("fill", ValueKind::Color, None),
];

const IMAGE_ATTRS: &[AttrSpec] = &[
    attr("x", ValueKind::Float, Some(0.0)),
    attr("y", ValueKind::Float, Some(0.0)),
    attr("width", ValueKind::Float, Some(0.0)),
    attr("height", ValueKind::Float, Some(0.0)),
    attr("href", ValueKind::Text, None),
    attr("opacity", ValueKind::Float, Some(1.0)),
];

#[derive(Debug, Clone, PartialEq)]
enum AttrValue {
    Float(f32),
    Color(Color),
    Text(String),
    List(Vec<f32>),
    Points(Vec<(f32, f32)>),
}

#[derive(Debug, Default)]
struct Attributes {
    values: HashMap<&'static str, AttrValue>,
}

impl Attributes {
    fn float(&self, key: &str) -> Option<f32> {
        match self.values.get(key) {
            Some(AttrValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    fn color(&self, key: &str) -> Option<Color> {
        match self.values.get(key) {
            Some(AttrValue::Color(c)) => Some(*c),
            _ => None,
        }
    }

    fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(AttrValue::Text(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    fn list(&self, key: &str) -> Vec<f32> {
        match self.values.get(key) {
            Some(AttrValue::List(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    fn points(&self, key: &str) -> Option<&[(f32, f32)]> {
        match self.values.get(key) {
            Some(AttrValue::Points(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn paint(&self) -> Paint {
        Paint {
            fill: self.color("fill"),
            stroke: self.color("stroke"),
            stroke_width: self.float("stroke-width").unwrap_or(0.0),
            dash: self.list("stroke-dasharray"),
        }
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (key, value) = decl.split_once(':').unwrap_or((decl, ""));
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Raw attribute pool. Inline style goes in first, so an explicit
/// attribute of the same name replaces the style value.
fn attribute_pool(node: roxmltree::Node<'_, '_>) -> HashMap<String, String> {
    let mut pool = HashMap::new();
    if let Some(style) = node.attribute("style") {
        for (key, value) in parse_style(style) {
            if !key.starts_with('-') {
                pool.insert(key, value);
            }
        }
    }
    for attribute in node.attributes() {
        if attribute.name() == "style" {
            continue;
        }
        pool.insert(attribute.name().to_string(), attribute.value().to_string());
    }
    pool
}

fn parse_float(value: &str) -> Option<f32> {
    value.replace("px", "").trim().parse::<f32>().ok()
}

fn parse_color(value: &str) -> Option<Color> {
    if value.contains("none") {
        return None;
    }
    match Color::parse(value) {
        Some(color) => Some(color),
        None => {
            log::warn!("unrecognized color {value:?}, using black");
            Some(Color::BLACK)
        }
    }
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?").expect("valid number regex")
    })
}

fn parse_numbers(value: &str) -> Vec<f32> {
    number_regex()
        .find_iter(value)
        .filter_map(|m| m.as_str().parse::<f32>().ok())
        .collect()
}

fn first_number(value: &str) -> Option<f32> {
    parse_numbers(value).into_iter().next()
}

fn resolve_attributes(
    pool: &HashMap<String, String>,
    tables: &[&'static [AttrSpec]],
) -> Attributes {
    let mut attrs = Attributes::default();
    for spec in tables.iter().flat_map(|t| t.iter()) {
        let raw = pool
            .get(spec.source)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty());
        let value = match spec.kind {
            ValueKind::Float => match raw {
                Some(raw) => match parse_float(raw) {
                    Some(v) => Some(AttrValue::Float(v)),
                    None => {
                        log::warn!("invalid number {raw:?} for {}", spec.source);
                        spec.default.map(AttrValue::Float)
                    }
                },
                None => spec.default.map(AttrValue::Float),
            },
            ValueKind::Color => parse_color(raw.unwrap_or("none")).map(AttrValue::Color),
            ValueKind::Text => raw.map(|v| AttrValue::Text(v.to_string())),
            ValueKind::IntList => raw
                .filter(|v| *v != "none")
                .map(|v| AttrValue::List(parse_numbers(v).into_iter().map(f32::trunc).collect())),
            ValueKind::Points => raw.filter(|v| *v != "none").map(|v| {
                let numbers = parse_numbers(v);
                AttrValue::Points(numbers.chunks_exact(2).map(|p| (p[0], p[1])).collect())
            }),
        };
        if let Some(value) = value {
            attrs.values.insert(spec.target, value);
        }
    }

    for (color_key, opacity_key) in [("stroke", "stroke-opacity"), ("fill", "fill-opacity")] {
        // rgba(..) carries its own alpha, which wins over the opacity attribute.
        let inline_alpha = pool
            .get(color_key)
            .is_some_and(|v| v.trim_start().starts_with("rgba"));
        if inline_alpha {
            continue;
        }
        if let (Some(color), Some(opacity)) = (attrs.color(color_key), attrs.float(opacity_key)) {
            attrs
                .values
                .insert(color_key, AttrValue::Color(color.with_alpha(color.a * opacity)));
        }
    }
    attrs
}

fn is_hidden(pool: &HashMap<String, String>) -> bool {
    let visibility = pool.get("visibility").map(|v| v.trim());
    let display = pool.get("display").map(|v| v.trim());
    visibility == Some("hidden") || display == Some("none")
}

fn has_ignored_class(node: roxmltree::Node<'_, '_>) -> bool {
    node.attribute("class").is_some_and(|class| {
        class
            .split_whitespace()
            .any(|c| IGNORED_CLASSES.contains(&c))
    })
}

fn clip_reference<'a>(node: roxmltree::Node<'a, '_>) -> Option<&'a str> {
    let value = node.attribute("clip-path")?;
    let (_, rest) = value.split_once('#')?;
    let id = rest.split(')').next()?.trim();
    (!id.is_empty()).then_some(id)
}

fn transform_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+)\s*\(([^)]*)\)").expect("valid transform regex"))
}

/// Parses a transform list into one matrix. Unknown functions are ignored.
pub fn parse_transform(input: &str) -> Matrix {
    let mut out = Matrix::identity();
    for caps in transform_regex().captures_iter(input) {
        let name = &caps[1];
        let args = parse_numbers(&caps[2]);
        let m = match (name, args.as_slice()) {
            ("translate", [tx]) => Matrix::translate(*tx, 0.0),
            ("translate", [tx, ty]) => Matrix::translate(*tx, *ty),
            ("rotate", [deg]) => Matrix::rotate(*deg),
            ("rotate", [deg, cx, cy]) => Matrix::translate(*cx, *cy)
                .mul(Matrix::rotate(*deg))
                .mul(Matrix::translate(-cx, -cy)),
            ("scale", [s]) => Matrix::scale(*s, *s),
            ("scale", [sx, sy]) => Matrix::scale(*sx, *sy),
            ("matrix", [a, b, c, d, e, f]) => Matrix {
                a: *a,
                b: *b,
                c: *c,
                d: *d,
                e: *e,
                f: *f,
            },
            ("translate" | "rotate" | "scale" | "matrix", _) => {
                log::warn!("{name} given {} arguments, ignoring", args.len());
                continue;
            }
            _ => {
                log::debug!("unknown transform type {name}");
                continue;
            }
        };
        out = out.mul(m);
    }
    out
}

fn path_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[a-zA-Z]|[+-]?(?:\d+(?:\.\d+)?|\.\d+)(?:[eE][+-]?\d+)?")
            .expect("valid path token regex")
    })
}

/// Interprets path data into points plus segment tags. Malformed commands are
/// logged and dropped; the rest of the path is kept.
pub fn parse_path_data(d: &str) -> PathData {
    let tokens: Vec<&str> = path_token_regex()
        .find_iter(d)
        .map(|m| m.as_str())
        .collect();
    let is_command = |t: &str| t.chars().next().is_some_and(|c| c.is_ascii_alphabetic());

    let mut path = PathData::default();
    let mut i = 0;
    while i < tokens.len() {
        if !is_command(tokens[i]) {
            i += 1;
            continue;
        }
        let command = tokens[i].chars().next().unwrap_or(' ');
        let end = (i + 1..tokens.len())
            .find(|&j| is_command(tokens[j]))
            .unwrap_or(tokens.len());
        let args: Vec<f32> = tokens[i + 1..end]
            .iter()
            .filter_map(|t| t.parse::<f32>().ok())
            .collect();
        apply_path_command(&mut path, command, &args);
        i = end;
    }
    path
}

fn apply_path_command(path: &mut PathData, command: char, args: &[f32]) {
    let relative = command.is_ascii_lowercase();
    match command {
        'Z' | 'z' => {
            path.close();
            path.explicitly_closed = true;
        }
        'M' | 'm' | 'L' | 'l' => {
            if args.len() < 2 {
                log::warn!("path command {command} requires 2 arguments, got {}", args.len());
                return;
            }
            for (k, pair) in args.chunks(2).enumerate() {
                let [x, y] = pair else {
                    log::warn!("path command {command} has a dangling argument");
                    break;
                };
                let (x0, y0) = if relative {
                    path.current_point()
                } else {
                    (0.0, 0.0)
                };
                if k == 0 && matches!(command, 'M' | 'm') {
                    path.move_to(x0 + x, y0 + y);
                } else {
                    path.line_to(x0 + x, y0 + y);
                }
            }
        }
        'H' | 'h' | 'V' | 'v' => {
            if args.is_empty() {
                log::warn!("path command {command} requires 1 argument");
                return;
            }
            for v in args {
                let (x0, y0) = path.current_point();
                match command {
                    'H' => path.line_to(*v, y0),
                    'h' => path.line_to(x0 + v, y0),
                    'V' => path.line_to(x0, *v),
                    _ => path.line_to(x0, y0 + v),
                }
            }
        }
        'C' | 'c' => {
            if args.len() < 6 || args.len() % 6 != 0 {
                log::error!(
                    "path command {command} requires a multiple of 6 arguments, got {}",
                    args.len()
                );
                return;
            }
            for chunk in args.chunks_exact(6) {
                let (x0, y0) = if relative {
                    path.current_point()
                } else {
                    (0.0, 0.0)
                };
                path.curve_to(
                    x0 + chunk[0],
                    y0 + chunk[1],
                    x0 + chunk[2],
                    y0 + chunk[3],
                    x0 + chunk[4],
                    y0 + chunk[5],
                );
            }
        }
        'A' => {
            if args.len() < 7 {
                log::warn!("path command A requires 7 arguments, got {}", args.len());
                return;
            }
            for chunk in args.chunks(7) {
                let [rx, ry, _rotation, large, sweep, x, y] = chunk else {
                    log::warn!("path command A has {} dangling arguments", chunk.len());
                    break;
                };
                if rx != ry {
                    log::warn!("elliptical arcs are not supported (rx={rx}, ry={ry})");
                    break;
                }
                match arc_points(
                    path.current_point(),
                    (*x, *y),
                    *rx,
                    *large as i32 == 1,
                    *sweep as i32 == 1,
                ) {
                    Ok(points) => {
                        for (px, py) in points {
                            path.line_to(px, py);
                        }
                    }
                    Err(message) => {
                        log::warn!("dropping arc command: {message}");
                        break;
                    }
                }
            }
        }
        other => log::warn!("unhandled path command {other}"),
    }
}

/// Polyline approximation of a circular arc from `p0` to `p1`, excluding `p0`.
/// Coincident endpoints yield no points.
pub fn arc_points(
    p0: (f32, f32),
    p1: (f32, f32),
    radius: f32,
    large_arc: bool,
    sweep: bool,
) -> Result<Vec<(f32, f32)>, String> {
    if p0 == p1 {
        return Ok(Vec::new());
    }
    let radius = radius as f64;
    if radius <= 0.0 {
        return Err(format!("radius {radius} is not positive"));
    }
    let (x0, y0) = (p0.0 as f64, p0.1 as f64);
    let (x1, y1) = (p1.0 as f64, p1.1 as f64);
    let mid = ((x1 - x0) / 2.0 + x0, (y1 - y0) / 2.0 + y0);
    let half_chord = libm::hypot(mid.1 - y0, mid.0 - x0);
    if half_chord > radius {
        return Err(format!("arc delta {half_chord} exceeds radius {radius}"));
    }
    if half_chord <= 0.0 {
        return Err(format!("arc delta {half_chord} is not positive"));
    }

    let norm = ((mid.0 - x0) / half_chord, (mid.1 - y0) / half_chord);
    // Perpendicular towards the center, chosen by the flag combination.
    let toward_center = if large_arc != sweep {
        (-norm.1, norm.0)
    } else {
        (norm.1, -norm.0)
    };
    let adjacent = libm::sqrt(radius * radius - half_chord * half_chord);
    let center = (
        mid.0 + toward_center.0 * adjacent,
        mid.1 + toward_center.1 * adjacent,
    );

    let start = libm::atan2(y0 - center.1, x0 - center.0);
    let end = libm::atan2(y1 - center.1, x1 - center.0);
    let mut sweep_angle = end - start;
    if sweep && sweep_angle < 0.0 {
        sweep_angle += 2.0 * std::f64::consts::PI;
    } else if !sweep && sweep_angle > 0.0 {
        sweep_angle -= 2.0 * std::f64::consts::PI;
    }

    let segments = ((sweep_angle * ARC_SEGMENTS_PER_RADIAN).abs() as usize).max(5);
    let step = sweep_angle / segments as f64;
    Ok((1..=segments)
        .map(|j| {
            let gamma = start + step * j as f64;
            (
                (center.0 + radius * libm::cos(gamma)) as f32,
                (center.1 + radius * libm::sin(gamma)) as f32,
            )
        })
        .collect())
}

fn canvas_size(root: roxmltree::Node<'_, '_>) -> (f32, f32) {
    let style: HashMap<String, String> = root
        .attribute("style")
        .map(|s| parse_style(s).into_iter().collect())
        .unwrap_or_default();
    let dimension = |key: &str| {
        style
            .get(key)
            .and_then(|v| parse_float(v))
            .filter(|v| *v > 0.0)
            .or_else(|| root.attribute(key).and_then(parse_float).filter(|v| *v > 0.0))
    };
    let width = dimension("width").unwrap_or_else(|| {
        log::info!("markup width is undefined, using {DEFAULT_WIDTH}");
        DEFAULT_WIDTH
    });
    let height = dimension("height").unwrap_or_else(|| {
        log::warn!("markup height is undefined, using {DEFAULT_HEIGHT}");
        DEFAULT_HEIGHT
    });
    (width, height)
}

fn parse_view_box(value: &str) -> Option<BoxRect> {
    let numbers = parse_numbers(value);
    let [x, y, w, h] = numbers.as_slice() else {
        return None;
    };
    Some(BoxRect::from_corners(*x, *y, x + w, y + h))
}

/// Renders chart markup into a scene graph. Only a markup parse failure is
/// an error; unsupported content is skipped.
pub fn render_svg(markup: &str, fonts: &FontManager) -> Result<Scene, ReportError> {
    let doc = roxmltree::Document::parse(markup)
        .map_err(|err| ReportError::Markup(err.to_string()))?;
    let root = doc.root_element();
    let (width, height) = canvas_size(root);
    let mut renderer = SvgRenderer {
        fonts,
        height,
        width,
        view_box: None,
        clips: ClipRegistry::default(),
    };
    let mut scene_root = Group::default();
    renderer.render_element(root, &mut scene_root, Matrix::identity(), false);
    log::debug!(
        "rendered markup {width}x{height} shapes={} clips={}",
        scene_root.shape_count(),
        renderer.clips.len()
    );
    Ok(Scene {
        width,
        height,
        root: scene_root,
        clips: renderer.clips,
    })
}

struct SvgRenderer<'f> {
    fonts: &'f FontManager,
    width: f32,
    height: f32,
    view_box: Option<BoxRect>,
    clips: ClipRegistry,
}

impl SvgRenderer<'_> {
    fn render_element(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        parent: &mut Group,
        ctm: Matrix,
        clip_mode: bool,
    ) {
        if !node.is_element() {
            return;
        }
        let pool = attribute_pool(node);
        if is_hidden(&pool) {
            return;
        }
        if has_ignored_class(node) {
            log::debug!("ignoring element with class {:?}", node.attribute("class"));
            return;
        }
        let kind = ElementKind::of(node);
        if kind == ElementKind::Unsupported || (clip_mode && !kind.produces_clip_geometry()) {
            log::debug!(
                "skipping unsupported element <{}> clip_mode={clip_mode}",
                node.tag_name().name()
            );
            return;
        }

        let transform = match kind {
            ElementKind::Svg | ElementKind::ClipPath => Matrix::identity(),
            _ => node
                .attribute("transform")
                .map(parse_transform)
                .unwrap_or_default(),
        };
        let element_ctm = ctm.mul(transform);

        let clip = match clip_reference(node) {
            Some(id) if self.clips.contains(id) => Some(Clip::Ref(id.to_string())),
            Some(id) => {
                log::debug!("clip path #{id} is not defined yet, rendering unclipped");
                None
            }
            None => None,
        };

        let Some(content) = self.render_kind(node, kind, &pool, element_ctm, clip_mode) else {
            return;
        };
        if transform.is_identity() && clip.is_none() {
            parent.push(content);
        } else {
            parent.push(Node::Group(Group {
                transform,
                clip,
                children: vec![content],
            }));
        }
    }

    fn render_children(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        group: &mut Group,
        ctm: Matrix,
        clip_mode: bool,
    ) {
        for child in node.children() {
            self.render_element(child, group, ctm, clip_mode);
        }
    }

    fn render_kind(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        kind: ElementKind,
        pool: &HashMap<String, String>,
        ctm: Matrix,
        clip_mode: bool,
    ) -> Option<Node> {
        let attrs = resolve_attributes(pool, kind.attribute_tables());
        match kind {
            ElementKind::Svg => {
                let view_box = node
                    .attribute("viewBox")
                    .and_then(parse_view_box)
                    .unwrap_or_else(|| BoxRect::from_corners(0.0, 0.0, self.width, self.height));
                self.view_box = Some(view_box);
                let mut wrapper = Group {
                    transform: Matrix::translate(0.0, self.height).mul(Matrix::scale(1.0, -1.0)),
                    clip: Some(Clip::Rect(view_box)),
                    children: Vec::new(),
                };
                self.render_children(node, &mut wrapper, Matrix::identity(), clip_mode);
                Some(Node::Group(wrapper))
            }
            ElementKind::G => {
                let mut group = Group::default();
                self.render_children(node, &mut group, ctm, clip_mode);
                Some(Node::Group(group))
            }
            ElementKind::Defs => {
                let mut scratch = Group::default();
                self.render_children(node, &mut scratch, ctm, clip_mode);
                None
            }
            ElementKind::ClipPath => {
                let mut scratch = Group::default();
                self.render_children(node, &mut scratch, Matrix::identity(), true);
                match node.attribute("id") {
                    Some(id) => self.clips.register(id, scratch.children),
                    None => log::warn!("clipPath without id ignored"),
                }
                None
            }
            ElementKind::Rect => {
                let x = attrs.float("x").unwrap_or(0.0);
                let y = attrs.float("y").unwrap_or(0.0);
                let mut width = attrs.float("width").unwrap_or(0.0);
                let mut height = attrs.float("height").unwrap_or(0.0);
                if width == 0.0 {
                    width = 0.1;
                }
                if height == 0.0 {
                    height = 0.1;
                }
                if clip_mode {
                    let corners = [(x, y), (x + width, y), (x + width, y + height), (x, y + height)];
                    return Some(clip_path_node(PathData::polygon(&corners, true)));
                }
                Some(Node::Shape(Shape::Rect {
                    x,
                    y,
                    width,
                    height,
                    rx: attrs.float("rx").unwrap_or(0.0),
                    ry: attrs.float("ry").unwrap_or(0.0),
                    paint: attrs.paint(),
                }))
            }
            ElementKind::Polygon | ElementKind::Polyline => {
                let Some(points) = attrs.points("points").filter(|p| !p.is_empty()) else {
                    log::warn!("<{}> without points skipped", node.tag_name().name());
                    return None;
                };
                let points = points.to_vec();
                if clip_mode {
                    return Some(clip_path_node(PathData::polygon(&points, true)));
                }
                let paint = attrs.paint();
                Some(Node::Shape(if kind == ElementKind::Polygon {
                    Shape::Polygon { points, paint }
                } else {
                    Shape::Polyline { points, paint }
                }))
            }
            ElementKind::Line => {
                let coords = ["x1", "y1", "x2", "y2"].map(|k| attrs.float(k));
                let [Some(x1), Some(y1), Some(x2), Some(y2)] = coords else {
                    log::error!("missing coordinate attributes for <line>");
                    return None;
                };
                Some(Node::Shape(Shape::Line {
                    x1,
                    y1,
                    x2,
                    y2,
                    paint: attrs.paint(),
                }))
            }
            ElementKind::Circle => {
                let cx = attrs.float("cx").unwrap_or(0.0);
                let cy = attrs.float("cy").unwrap_or(0.0);
                let r = attrs.float("r").unwrap_or(0.0);
                if clip_mode {
                    let points: Vec<(f32, f32)> = std::iter::once((cx + r, cy))
                        .chain((0..180).map(|i| {
                            let rad = ((i * 2) as f32).to_radians();
                            (cx + r * libm::cosf(rad), cy + r * libm::sinf(rad))
                        }))
                        .collect();
                    return Some(clip_path_node(PathData::polygon(&points, true)));
                }
                Some(Node::Shape(Shape::Circle {
                    cx,
                    cy,
                    r,
                    paint: attrs.paint(),
                }))
            }
            ElementKind::Path => {
                let Some(d) = node.attribute("d") else {
                    log::warn!("path has no \"d\" attribute, ignoring");
                    return None;
                };
                let mut data = parse_path_data(d);
                if data.points.is_empty() {
                    return None;
                }
                let paint = attrs.paint();
                if data.points.len() > 2 && !data.explicitly_closed && !data.is_closed() {
                    let first = data.points[0];
                    let last = data.points[data.points.len() - 1];
                    let same = (first.0 - last.0).abs() <= CLOSE_TOLERANCE
                        && (first.1 - last.1).abs() <= CLOSE_TOLERANCE;
                    if same || paint.fill.is_some_and(|fill| fill.a > 0.0) {
                        data.close();
                    }
                }
                Some(Node::Shape(Shape::Path { data, paint }))
            }
            ElementKind::Text => self.render_text(node, pool, &attrs),
            ElementKind::Image => self.render_image(&attrs, ctm),
            ElementKind::Unsupported => None,
        }
    }

    fn text_shape(&self, text: &str, y: f32, font_size: f32, anchor: TextAnchor, fill: Color) -> Shape {
        let runs = self
            .fonts
            .segment(text)
            .into_iter()
            .map(|run| TextRun {
                font: self
                    .fonts
                    .face(run.font)
                    .map(|f| f.name().to_string())
                    .unwrap_or_default(),
                width: self.fonts.text_width(&run.text, font_size),
                text: run.text,
            })
            .collect();
        Shape::Text {
            x: 0.0,
            y,
            font_size,
            anchor,
            fill,
            runs,
        }
    }

    fn render_text(
        &self,
        node: roxmltree::Node<'_, '_>,
        pool: &HashMap<String, String>,
        attrs: &Attributes,
    ) -> Option<Node> {
        let font_size = attrs
            .text("font-size")
            .and_then(first_number)
            .unwrap_or(DEFAULT_FONT_SIZE);
        let anchor = TextAnchor::parse(attrs.text("text-anchor"));
        let fill = attrs.color("fill").unwrap_or(Color::BLACK);

        let own_text = node
            .text()
            .map(|t| t.trim_matches([' ', '\n', '\t', '\r']))
            .filter(|t| !t.is_empty());
        let spans: Vec<_> = node.children().filter(|c| c.is_element()).collect();
        if own_text.is_none() && spans.is_empty() {
            log::warn!("text element without text skipped");
            return None;
        }

        let x = attrs.float("x").unwrap_or(0.0);
        let y = attrs.float("y").unwrap_or(0.0);
        // Re-flip so glyphs read upright under the global flip.
        let flip_y = -1.0f32;
        let mut group =
            Group::with_transform(Matrix::translate(x, y).mul(Matrix::scale(1.0, flip_y)));

        if let Some(text) = own_text {
            let before_edge = pool
                .get("dominant-baseline")
                .is_some_and(|v| v.trim() == "text-before-edge");
            let baseline = if before_edge { -font_size } else { 0.0 };
            group.push(Node::Shape(
                self.text_shape(text, baseline, font_size, anchor, fill),
            ));
        }

        let mut y_local = 0.0f32;
        for span in spans {
            if let Some(dy) = span.attribute("dy").and_then(first_number) {
                y_local += dy / flip_y;
            }
            let Some(text) = span.text().filter(|t| !t.is_empty()) else {
                continue;
            };
            group.push(Node::Shape(
                self.text_shape(text, y_local, font_size, anchor, fill),
            ));
        }
        Some(Node::Group(group))
    }

    fn render_image(&self, attrs: &Attributes, ctm: Matrix) -> Option<Node> {
        let x = attrs.float("x").unwrap_or(0.0);
        let y = attrs.float("y").unwrap_or(0.0);
        let width = attrs.float("width").unwrap_or(0.0);
        let height = attrs.float("height").unwrap_or(0.0);
        let Some(href) = attrs.text("href") else {
            log::warn!("image without href skipped");
            return None;
        };
        let image = match RasterImage::from_data_uri(href) {
            Some(Ok(image)) => Arc::new(image),
            Some(Err(err)) => {
                log::warn!("undecodable inline image skipped: {err}");
                return None;
            }
            None => {
                log::warn!("external image reference skipped: {href:.64}");
                return None;
            }
        };

        let local = ctm.mul(Matrix::translate(x, y));
        let clip = match self.view_box {
            Some(view_box) => {
                let Some(inverse) = local.inverse() else {
                    log::warn!("image transform is not invertible, skipped");
                    return None;
                };
                let (ax, ay) = inverse.apply(view_box.x0, view_box.y0);
                let (bx, by) = inverse.apply(view_box.x1, view_box.y1);
                let visible = BoxRect::from_corners(ax, ay, bx, by);
                let bounds = BoxRect::from_corners(0.0, 0.0, width, height);
                match bounds.intersect(&visible) {
                    Some(clip) => Some(clip),
                    None => {
                        log::debug!("image lies outside the view box, skipped");
                        return None;
                    }
                }
            }
            None => None,
        };

        let mut group = Group::with_transform(Matrix::translate(x, y));
        group.push(Node::Shape(Shape::Image {
            width,
            height,
            clip,
            opacity: attrs.float("opacity").unwrap_or(1.0).clamp(0.0, 1.0),
            image,
        }));
        Some(Node::Group(group))
    }
}

fn clip_path_node(data: PathData) -> Node {
    Node::Shape(Shape::Path {
        data,
        paint: Paint::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn render(markup: &str) -> Scene {
        render_svg(markup, &FontManager::new()).unwrap()
    }

    fn shapes(group: &Group) -> Vec<&Shape> {
        let mut out = Vec::new();
        for child in &group.children {
            match child {
                Node::Group(inner) => out.extend(shapes(inner)),
                Node::Shape(shape) => out.push(shape),
            }
        }
        out
    }

    fn wrapper(scene: &Scene) -> &Group {
        match &scene.root.children[0] {
            Node::Group(group) => group,
            other => panic!("expected wrapper group, got {other:?}"),
        }
    }

    #[test]
    fn replaying_a_path_is_deterministic() {
        let d = "M10 10 L20,20 l5-5 h3 v-2 C 1 2 3 4 5 6 A 5 5 0 0 1 15 6 Z";
        assert_eq!(parse_path_data(d), parse_path_data(d));
    }

    #[test]
    fn quarter_arc_stays_on_the_circle() {
        let points = arc_points((10.0, 0.0), (0.0, 10.0), 10.0, false, true).unwrap();
        assert!(points.len() >= 5);
        for (x, y) in &points {
            let distance = (x * x + y * y).sqrt();
            assert!((distance - 10.0).abs() < 1e-3, "({x}, {y}) at {distance}");
        }
        let last = points[points.len() - 1];
        assert!((last.0 - 0.0).abs() < 1e-3 && (last.1 - 10.0).abs() < 1e-3);

        let path = parse_path_data("M10 0 A10 10 0 0 1 0 10");
        assert_eq!(path.points[0], (10.0, 0.0));
    }

    #[test]
    fn invalid_arc_drops_only_that_command() {
        assert!(arc_points((0.0, 0.0), (100.0, 0.0), 5.0, false, true).is_err());
        assert!(arc_points((0.0, 0.0), (1.0, 0.0), 0.0, false, true).is_err());
        assert_eq!(arc_points((1.0, 1.0), (1.0, 1.0), 5.0, false, true), Ok(Vec::new()));

        let path = parse_path_data("M0 0 A5 5 0 0 1 100 0 L10 10");
        assert_eq!(path.points, vec![(0.0, 0.0), (10.0, 10.0)]);
        let elliptic = parse_path_data("M0 0 A5 6 0 0 1 4 0 L1 1");
        assert_eq!(elliptic.points, vec![(0.0, 0.0), (1.0, 1.0)]);
    }

    #[test]
    fn relative_commands_follow_the_last_point() {
        let path = parse_path_data("M10 10 l5 0 5 0 v5 h-20");
        assert_eq!(
            path.points,
            vec![(10.0, 10.0), (15.0, 10.0), (20.0, 10.0), (20.0, 15.0), (0.0, 15.0)]
        );
        let implicit = parse_path_data("M0 0 1 1 2 2");
        assert_eq!(implicit.segs.len(), 3);
    }

    #[test]
    fn unseparated_numbers_tokenize() {
        let path = parse_path_data("M1.5-2L3.25.5");
        assert_eq!(path.points, vec![(1.5, -2.0), (3.25, 0.5)]);
    }

    #[test]
    fn cubic_with_wrong_argument_count_is_dropped() {
        let path = parse_path_data("M0 0 C1 2 3 4 5 L9 9");
        assert_eq!(path.points, vec![(0.0, 0.0), (9.0, 9.0)]);
        let relative = parse_path_data("M1 1 c1 1 2 2 3 3");
        assert_eq!(relative.points[3], (4.0, 4.0));
    }

    #[test]
    fn filled_paths_are_auto_closed() {
        let scene = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
                 <path d="M0 0 L5 0 L5 5" fill="red"/>
                 <path d="M0 0 L5 0 L5 5" stroke="red"/>
                 <path d="M0 0 L5 0 L5 5" fill="red" fill-opacity="0" stroke="red"/>
                 <path d="M0 0 L5 0 L5 5" fill="rgba(255, 0, 0, 0)" stroke="red"/>
               </svg>"#,
        );
        let found = shapes(wrapper(&scene));
        let closed: Vec<bool> = found
            .iter()
            .map(|s| match s {
                Shape::Path { data, .. } => data.is_closed(),
                _ => false,
            })
            .collect();
        assert_eq!(closed, vec![true, false, false, false]);
    }

    #[test]
    fn scene_is_flipped_and_clipped_to_the_view_box() {
        let scene = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100" viewBox="10 10 50 40">
                 <rect x="0" y="0" width="5" height="0"/>
               </svg>"#,
        );
        let wrap = wrapper(&scene);
        assert_eq!(
            wrap.transform,
            Matrix::translate(0.0, 100.0).mul(Matrix::scale(1.0, -1.0))
        );
        assert_eq!(
            wrap.clip,
            Some(Clip::Rect(BoxRect::from_corners(10.0, 10.0, 60.0, 50.0)))
        );
        match shapes(wrap)[0] {
            Shape::Rect { height, .. } => assert!((height - 0.1).abs() < 1e-6),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn size_falls_back_to_defaults_and_style() {
        let scene = render(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#);
        assert_eq!((scene.width, scene.height), (600.0, 400.0));
        let styled = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg" style="width: 320px; height: 240px" width="10"/>"#,
        );
        assert_eq!((styled.width, styled.height), (320.0, 240.0));
    }

    #[test]
    fn unknown_elements_are_skipped_and_parse_errors_surface() {
        let scene = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><filter/><circle r="3"/><foo/></svg>"#,
        );
        assert_eq!(shapes(wrapper(&scene)).len(), 1);
        assert!(matches!(
            render_svg("<svg", &FontManager::new()),
            Err(ReportError::Markup(_))
        ));
    }

    #[test]
    fn explicit_attribute_wins_over_inline_style() {
        let scene = render(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
                  <rect width="5" height="5" fill="#ff0000" style="fill: #0000ff; -hc-x: 1"/>
                  <rect width="5" height="5" style="fill: #0000ff"/>
                </svg>"##,
        );
        let fills: Vec<Option<Color>> = shapes(wrapper(&scene))
            .iter()
            .map(|s| match s {
                Shape::Rect { paint, .. } => paint.fill,
                _ => None,
            })
            .collect();
        assert_eq!(
            fills,
            vec![Some(Color::rgb(1.0, 0.0, 0.0)), Some(Color::rgb(0.0, 0.0, 1.0))]
        );
    }

    #[test]
    fn inline_alpha_overrides_opacity_attribute() {
        let scene = render(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
                  <circle r="2" fill="rgba(0, 0, 0, 0.5)" fill-opacity="0.2"/>
                  <circle r="2" fill="#000" fill-opacity="0.2"/>
                </svg>"##,
        );
        let alphas: Vec<f32> = shapes(wrapper(&scene))
            .iter()
            .filter_map(|s| match s {
                Shape::Circle { paint, .. } => paint.fill.map(|c| c.a),
                _ => None,
            })
            .collect();
        assert_eq!(alphas.len(), 2);
        assert!((alphas[0] - 0.5).abs() < 1e-6);
        assert!((alphas[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn hidden_and_tooltip_elements_are_skipped() {
        let scene = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
                 <rect width="1" height="1" visibility="hidden"/>
                 <rect width="1" height="1" style="display: none"/>
                 <g class="highcharts-tooltip"><rect width="1" height="1"/></g>
                 <rect width="1" height="1"/>
               </svg>"#,
        );
        assert_eq!(shapes(wrapper(&scene)).len(), 1);
    }

    #[test]
    fn clip_references_resolve_only_backwards() {
        let scene = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
                 <rect width="1" height="1" clip-path="url(#late)"/>
                 <defs>
                   <clipPath id="late"><rect width="4" height="4"/><text>x</text></clipPath>
                 </defs>
                 <rect width="1" height="1" clip-path="url(#late)" transform="translate(2 3)"/>
               </svg>"#,
        );
        let wrap = wrapper(&scene);
        assert!(matches!(wrap.children[0], Node::Shape(Shape::Rect { .. })));
        match &wrap.children[1] {
            Node::Group(group) => {
                assert_eq!(group.clip, Some(Clip::Ref("late".into())));
                assert_eq!(group.transform, Matrix::translate(2.0, 3.0));
            }
            other => panic!("expected clipped group, got {other:?}"),
        }
        assert_eq!(scene.clips.get("late").map(<[Node]>::len), Some(1));
    }

    #[test]
    fn tspans_accumulate_relative_offsets() {
        let scene = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
                 <text x="5" y="7" font-size="12px" text-anchor="middle">
                   <tspan>a</tspan><tspan dy="14">b</tspan><tspan dy="14">c</tspan>
                 </text>
               </svg>"#,
        );
        let ys: Vec<f32> = shapes(wrapper(&scene))
            .iter()
            .filter_map(|s| match s {
                Shape::Text {
                    y,
                    font_size,
                    anchor,
                    ..
                } => {
                    assert_eq!(*font_size, 12.0);
                    assert_eq!(*anchor, TextAnchor::Middle);
                    Some(*y)
                }
                _ => None,
            })
            .collect();
        assert_eq!(ys, vec![0.0, -14.0, -28.0]);
    }

    #[test]
    fn before_edge_baseline_shifts_main_text() {
        let scene = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
                 <text font-size="9" dominant-baseline="text-before-edge">Title</text>
               </svg>"#,
        );
        match shapes(wrapper(&scene))[0] {
            Shape::Text { y, runs, .. } => {
                assert_eq!(*y, -9.0);
                assert_eq!(runs[0].text, "Title");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transform_functions_compose_in_order() {
        assert_eq!(parse_transform("translate(10)"), Matrix::translate(10.0, 0.0));
        let m = parse_transform("scale(2,3) translate(10,-30) rotate(90 0 10)");
        let expected = [0.0, 3.0, -2.0, 0.0, 40.0, -60.0];
        let actual = [m.a, m.b, m.c, m.d, m.e, m.f];
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-4, "{actual:?}");
        }
        assert_eq!(parse_transform("skewX(20) translate(1 2 3)"), Matrix::identity());
    }

    #[test]
    fn images_are_clipped_to_the_view_box() {
        let png = crate::bitmap::tiny_png(4, 4);
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let markup = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="100" height="100">
                 <image x="80" y="80" width="40" height="40" xlink:href="{uri}"/>
                 <image x="200" y="200" width="10" height="10" xlink:href="{uri}"/>
                 <image x="0" y="0" width="10" height="10" xlink:href="chart.png"/>
               </svg>"#
        );
        let scene = render(&markup);
        let images: Vec<&Shape> = shapes(wrapper(&scene));
        assert_eq!(images.len(), 1);
        match images[0] {
            Shape::Image { clip, .. } => {
                assert_eq!(*clip, Some(BoxRect::from_corners(0.0, 0.0, 20.0, 20.0)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn line_without_coordinates_is_skipped() {
        let scene = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><line x1="0" y1="0" x2="4"/><line x1="0" y1="0" x2="4" y2="4" stroke="black"/></svg>"#,
        );
        assert_eq!(shapes(wrapper(&scene)).len(), 1);
    }
}
