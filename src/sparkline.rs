use crate::canvas::Canvas;
use crate::flowable::{BlockAlign, Flowable};
use crate::table_data::SPARKLINE_SENTINEL;
use crate::types::{Color, INCH, Pt, Size};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub const SPARKLINE_HEIGHT: f32 = 0.2 * INCH;
const SPARKLINE_MARGIN: f32 = 0.1 * INCH;
const MIN_WIDTH: f32 = INCH;
const MAX_WIDTH: f32 = 2.0 * INCH;
const BAR_MAX_STEP: f32 = 3.0;
const DISCRETE_TICK: f32 = 1.25;

const DEFAULT_LINE_COLOR: &str = "#5cc05c";
const DEFAULT_BAR_COLOR: &str = "#006d9c";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparklineKind {
    Line,
    Bar,
    Discrete,
    /// Unknown chart types keep their cell size but draw nothing.
    Empty,
}

fn registry() -> &'static HashMap<&'static str, SparklineKind> {
    static REGISTRY: OnceLock<HashMap<&'static str, SparklineKind>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        HashMap::from([
            ("line", SparklineKind::Line),
            ("bar", SparklineKind::Bar),
            ("discrete", SparklineKind::Discrete),
            // Drawn as lines until they get their own renderers.
            ("tristate", SparklineKind::Line),
            ("bullet", SparklineKind::Line),
            ("pie", SparklineKind::Line),
            ("box", SparklineKind::Line),
        ])
    })
}

impl SparklineKind {
    pub fn from_options(options: &Map<String, Value>) -> SparklineKind {
        let Some(name) = options.get("type").and_then(Value::as_str) else {
            return SparklineKind::Line;
        };
        match registry().get(name) {
            Some(kind) => *kind,
            None => {
                log::warn!("unsupported sparkline type {name:?}; cell left blank");
                SparklineKind::Empty
            }
        }
    }
}

/// Options used when a column has no sparkline format of its own.
pub fn default_options() -> Map<String, Value> {
    let mut options = Map::new();
    options.insert("type".into(), Value::from("line"));
    options.insert("lineColor".into(), Value::from(DEFAULT_LINE_COLOR));
    options
}

/// Values after the sentinel in a comma separated payload. Empty items count
/// as zero.
pub fn parse_values(payload: &str) -> Vec<f64> {
    payload
        .split(',')
        .skip(1)
        .filter_map(|item| {
            let item = item.trim();
            let item = if item.is_empty() { "0" } else { item };
            match item.parse::<f64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    log::warn!("sparkline value {item:?} is not a number; skipped");
                    None
                }
            }
        })
        .collect()
}

pub fn is_sparkline(text: &str) -> bool {
    text.contains(SPARKLINE_SENTINEL)
}

/// Small inline chart drawn inside a table cell.
#[derive(Debug, Clone)]
pub struct Sparkline {
    kind: SparklineKind,
    values: Arc<Vec<f64>>,
    options: Arc<Map<String, Value>>,
    width: f32,
}

impl Sparkline {
    pub fn new(payload: &str, options: Map<String, Value>) -> Self {
        let values = parse_values(payload);
        let width = (values.len() as f32 / 50.0 * INCH).min(MAX_WIDTH).max(MIN_WIDTH);
        Self {
            kind: SparklineKind::from_options(&options),
            values: Arc::new(values),
            options: Arc::new(options),
            width,
        }
    }

    pub fn kind(&self) -> SparklineKind {
        self.kind
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn is_numeric(&self) -> bool {
        false
    }

    fn color(&self, key: &str, fallback: &str) -> Color {
        self.options
            .get(key)
            .and_then(Value::as_str)
            .and_then(Color::parse)
            .or_else(|| Color::parse(fallback))
            .unwrap_or(Color::BLACK)
    }

    /// Bar colour from `colorMap` entries keyed `"min:max"` (either bound may
    /// be omitted) or a single exact value.
    fn mapped_color(&self, value: f64) -> Option<Color> {
        let map = self.options.get("colorMap")?.as_object()?;
        map.iter().find_map(|(range, color)| {
            let matched = match range.split_once(':') {
                Some((lo, hi)) => {
                    let lo = lo.trim().parse::<i64>().ok();
                    let hi = hi.trim().parse::<i64>().ok();
                    lo.is_none_or(|lo| value >= lo as f64) && hi.is_none_or(|hi| value <= hi as f64)
                }
                None => range.trim().parse::<i64>().is_ok_and(|exact| value == exact as f64),
            };
            if matched { color.as_str().and_then(Color::parse) } else { None }
        })
    }

    /// Heights above the baseline for each value, within `height`.
    fn scaled(&self, height: f32) -> Vec<f32> {
        let min = self.values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        self.values
            .iter()
            .map(|v| {
                if range == 0.0 {
                    height / 2.0
                } else {
                    ((v - min) / range) as f32 * height
                }
            })
            .collect()
    }

    fn draw_line(&self, canvas: &mut Canvas, x: f32, y: f32, width: f32, points: &[f32]) {
        let delta = width / (points.len() - 1) as f32;
        let xs: Vec<f32> = (0..points.len())
            .map(|i| x + i as f32 * delta + SPARKLINE_MARGIN)
            .collect();
        if let Some(fill) = self
            .options
            .get("fillColor")
            .and_then(Value::as_str)
            .and_then(Color::parse)
        {
            canvas.set_fill_color(fill);
            canvas.move_to(pt(xs[0]), pt(y));
            for (px, py) in xs.iter().zip(points) {
                canvas.line_to(pt(*px), pt(y + py));
            }
            canvas.line_to(pt(x + width + SPARKLINE_MARGIN), pt(y));
            canvas.close_path();
            canvas.fill();
        }
        canvas.set_stroke_color(self.color("lineColor", DEFAULT_LINE_COLOR));
        for i in 1..points.len() {
            canvas.line(
                pt(xs[i - 1]),
                pt(y + points[i - 1]),
                pt(xs[i]),
                pt(y + points[i]),
            );
        }
    }

    fn draw_bars(&self, canvas: &mut Canvas, x: f32, y: f32, width: f32, points: &[f32]) {
        let delta = (width / (points.len() - 1) as f32).min(BAR_MAX_STEP);
        let mut color = self.color("barColor", DEFAULT_BAR_COLOR);
        for (i, (value, height)) in self.values.iter().zip(points).enumerate() {
            if let Some(mapped) = self.mapped_color(*value) {
                color = mapped;
            }
            canvas.set_fill_color(color);
            let bx = x + i as f32 * delta + SPARKLINE_MARGIN;
            canvas.draw_rect(pt(bx + 0.4), pt(y + 1.0), pt(delta - 0.8), pt(height.max(0.4)));
        }
    }

    fn draw_discrete(&self, canvas: &mut Canvas, x: f32, y: f32, width: f32, points: &[f32]) {
        let delta = (width / (points.len() - 1) as f32).min(BAR_MAX_STEP);
        canvas.set_line_width(pt(0.6));
        canvas.set_stroke_color(self.color("lineColor", DEFAULT_LINE_COLOR));
        for (i, height) in points.iter().enumerate() {
            let lx = x + i as f32 * delta + SPARKLINE_MARGIN;
            canvas.line(
                pt(lx),
                pt(y + height - DISCRETE_TICK),
                pt(lx),
                pt(y + height + DISCRETE_TICK),
            );
        }
    }
}

fn pt(value: f32) -> Pt {
    Pt::from_f32(value)
}

impl Flowable for Sparkline {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size {
        Size {
            width: pt(self.width).min(avail_width),
            height: pt(SPARKLINE_HEIGHT).min(avail_height),
        }
    }

    fn split(&self, _avail_width: Pt, _avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        if self.values.len() < 2 || self.kind == SparklineKind::Empty {
            return;
        }
        let width = self.width.min(avail_width.to_f32()) - 2.0 * SPARKLINE_MARGIN;
        if width <= 0.0 {
            return;
        }
        let points = self.scaled(SPARKLINE_HEIGHT);
        let (x, y) = (x.to_f32(), y.to_f32());
        canvas.save_state();
        match self.kind {
            SparklineKind::Line => self.draw_line(canvas, x, y, width, &points),
            SparklineKind::Bar => self.draw_bars(canvas, x, y, width, &points),
            SparklineKind::Discrete => self.draw_discrete(canvas, x, y, width, &points),
            SparklineKind::Empty => {}
        }
        canvas.restore_state();
    }

    fn h_align(&self) -> BlockAlign {
        BlockAlign::Left
    }
}
