use crate::bitmap::RasterImage;
use crate::canvas::Canvas;
use crate::font::FontManager;
use crate::scene::Scene;
use crate::types::{Color, Pt, Size};
use std::sync::{Arc, Mutex};

/// Horizontal placement of a block narrower than its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockAlign {
    Left,
    #[default]
    Center,
    Right,
}

impl BlockAlign {
    pub fn parse(value: &str) -> BlockAlign {
        match value.trim().to_ascii_lowercase().as_str() {
            "left" => BlockAlign::Left,
            "right" => BlockAlign::Right,
            _ => BlockAlign::Center,
        }
    }

    pub fn offset(self, avail_width: Pt, width: Pt) -> Pt {
        let slack = (avail_width - width).max(Pt::ZERO);
        match self {
            BlockAlign::Left => Pt::ZERO,
            BlockAlign::Center => slack.mul_ratio(1, 2),
            BlockAlign::Right => slack,
        }
    }
}

/// Frame-level requests made by blocks that draw nothing themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpaceRequest {
    /// Start a new frame unless the current one is still empty.
    PageBreak,
    /// Start a new frame when less than this height remains.
    Conditional(Pt),
    /// Leave this gap, or start a new frame when it does not fit. Nothing at
    /// the top of a frame.
    Between(Pt),
}

pub trait Flowable: FlowableClone + Send + Sync {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size;

    /// Replacement blocks for a block that does not fit, in story order.
    /// `None` means the block cannot be divided.
    fn split(&self, avail_width: Pt, avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>>;

    /// Draws with the block's bottom-left corner at `(x, y)`.
    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, avail_height: Pt);

    fn space_request(&self) -> Option<SpaceRequest> {
        None
    }

    fn h_align(&self) -> BlockAlign {
        BlockAlign::Center
    }

    fn debug_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub trait FlowableClone {
    fn clone_box(&self) -> Box<dyn Flowable>;
}

impl<T> FlowableClone for T
where
    T: 'static + Flowable + Clone,
{
    fn clone_box(&self) -> Box<dyn Flowable> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Flowable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[derive(Debug, Clone)]
pub struct Spacer {
    height: Pt,
}

impl Spacer {
    pub fn new(height: f32) -> Self {
        Self {
            height: Pt::from_f32(height.max(0.0)),
        }
    }
}

impl Flowable for Spacer {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: avail_width,
            height: self.height,
        }
    }

    fn split(&self, _avail_width: Pt, _avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        // A spacer that does not fit is dropped at the frame end.
        Some(Vec::new())
    }

    fn draw(&self, _canvas: &mut Canvas, _x: Pt, _y: Pt, _avail_width: Pt, _avail_height: Pt) {}
}

#[derive(Debug, Clone, Default)]
pub struct PageBreak;

impl Flowable for PageBreak {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        Size::new(0.0, 0.0)
    }

    fn split(&self, _avail_width: Pt, _avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        None
    }

    fn draw(&self, _canvas: &mut Canvas, _x: Pt, _y: Pt, _avail_width: Pt, _avail_height: Pt) {}

    fn space_request(&self) -> Option<SpaceRequest> {
        Some(SpaceRequest::PageBreak)
    }
}

/// Breaks to a new frame only if less than `height` is left.
#[derive(Debug, Clone)]
pub struct CondPageBreak {
    height: Pt,
}

impl CondPageBreak {
    pub fn new(height: f32) -> Self {
        Self {
            height: Pt::from_f32(height),
        }
    }

    pub fn height(&self) -> Pt {
        self.height
    }
}

impl Flowable for CondPageBreak {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        Size::new(0.0, 0.0)
    }

    fn split(&self, _avail_width: Pt, _avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        None
    }

    fn draw(&self, _canvas: &mut Canvas, _x: Pt, _y: Pt, _avail_width: Pt, _avail_height: Pt) {}

    fn space_request(&self) -> Option<SpaceRequest> {
        Some(SpaceRequest::Conditional(self.height))
    }
}

/// Either a full `height` gap or a frame break, never a partial gap.
#[derive(Debug, Clone)]
pub struct EnsureSpaceBetween {
    height: Pt,
}

impl EnsureSpaceBetween {
    pub fn new(height: f32) -> Self {
        Self {
            height: Pt::from_f32(height.max(0.0)),
        }
    }
}

impl Flowable for EnsureSpaceBetween {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: Pt::ZERO,
            height: self.height,
        }
    }

    fn split(&self, _avail_width: Pt, _avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        None
    }

    fn draw(&self, _canvas: &mut Canvas, _x: Pt, _y: Pt, _avail_width: Pt, _avail_height: Pt) {}

    fn space_request(&self) -> Option<SpaceRequest> {
        Some(SpaceRequest::Between(self.height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphStyle {
    pub font_size: f32,
    pub leading: f32,
    pub left_indent: f32,
    pub space_before: f32,
    pub align: TextAlign,
    pub color: Color,
    pub bullet: Option<String>,
    pub bullet_indent: f32,
}

impl Default for ParagraphStyle {
    fn default() -> Self {
        Self::normal()
    }
}

impl ParagraphStyle {
    pub fn normal() -> Self {
        Self {
            font_size: 10.0,
            leading: 12.0,
            left_indent: 0.0,
            space_before: 0.0,
            align: TextAlign::Left,
            color: Color::BLACK,
            bullet: None,
            bullet_indent: 0.0,
        }
    }

    pub fn title() -> Self {
        Self {
            font_size: 18.0,
            leading: 22.0,
            space_before: 6.0,
            align: TextAlign::Center,
            ..Self::normal()
        }
    }

    pub fn bullet(bullet: impl Into<String>) -> Self {
        Self {
            left_indent: 18.0,
            space_before: 3.0,
            bullet: Some(bullet.into()),
            bullet_indent: 6.0,
            ..Self::normal()
        }
    }

    /// Column-range captions above split tables.
    pub fn caption() -> Self {
        Self {
            font_size: 8.0,
            left_indent: 2.0,
            space_before: 3.0,
            ..Self::normal()
        }
    }
}

#[derive(Debug, Default)]
struct LineCache {
    entries: Vec<(i64, Arc<Vec<(String, f32)>>)>,
}

/// Word-wrapped plain text in one style.
#[derive(Debug, Clone)]
pub struct Paragraph {
    text: String,
    style: ParagraphStyle,
    fonts: Arc<FontManager>,
    // Continuations drop the bullet and the leading space.
    continued: bool,
    line_cache: Arc<Mutex<LineCache>>,
}

impl Paragraph {
    pub fn new(text: impl Into<String>, style: ParagraphStyle, fonts: Arc<FontManager>) -> Self {
        Self {
            text: text.into(),
            style,
            fonts,
            continued: false,
            line_cache: Arc::new(Mutex::new(LineCache::default())),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn style(&self) -> &ParagraphStyle {
        &self.style
    }

    fn space_before(&self) -> f32 {
        if self.continued {
            0.0
        } else {
            self.style.space_before
        }
    }

    fn lines(&self, avail_width: Pt) -> Arc<Vec<(String, f32)>> {
        let text_width = (avail_width.to_f32() - self.style.left_indent).max(1.0);
        let key = Pt::from_f32(text_width).to_milli_i64();
        if let Ok(cache) = self.line_cache.lock() {
            if let Some((_, lines)) = cache.entries.iter().find(|(k, _)| *k == key) {
                return lines.clone();
            }
        }
        let lines = Arc::new(self.layout_lines(text_width));
        if let Ok(mut cache) = self.line_cache.lock() {
            cache.entries.push((key, lines.clone()));
            if cache.entries.len() > 4 {
                cache.entries.remove(0);
            }
        }
        lines
    }

    fn layout_lines(&self, max_width: f32) -> Vec<(String, f32)> {
        let size = self.style.font_size;
        let space = self.fonts.text_width(" ", size);
        let mut lines = Vec::new();
        for segment in self.text.split('\n') {
            let mut current = String::new();
            let mut current_width = 0.0f32;
            for word in segment.split_whitespace() {
                let word_width = self.fonts.text_width(word, size);
                if current.is_empty() {
                    current.push_str(word);
                    current_width = word_width;
                } else if current_width + space + word_width <= max_width {
                    current.push(' ');
                    current.push_str(word);
                    current_width += space + word_width;
                } else {
                    lines.push((std::mem::take(&mut current), current_width));
                    current.push_str(word);
                    current_width = word_width;
                }
            }
            lines.push((current, current_width));
        }
        lines
    }

    fn with_text(&self, text: String, continued: bool) -> Paragraph {
        Paragraph {
            text,
            style: self.style.clone(),
            fonts: self.fonts.clone(),
            continued,
            line_cache: Arc::new(Mutex::new(LineCache::default())),
        }
    }
}

impl Flowable for Paragraph {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let lines = self.lines(avail_width);
        Size::new(
            avail_width.to_f32(),
            self.space_before() + lines.len() as f32 * self.style.leading,
        )
    }

    fn split(&self, avail_width: Pt, avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        let lines = self.lines(avail_width);
        let usable = avail_height.to_f32() - self.space_before();
        let fit = (usable / self.style.leading).floor();
        if fit < 1.0 || fit as usize >= lines.len() {
            return None;
        }
        let split_at = fit as usize;
        let join = |part: &[(String, f32)]| {
            part.iter()
                .map(|(text, _)| text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        };
        let first = self.with_text(join(&lines[..split_at]), self.continued);
        let second = self.with_text(join(&lines[split_at..]), true);
        Some(vec![Box::new(first), Box::new(second)])
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let lines = self.lines(avail_width);
        let style = &self.style;
        let text_x = x + Pt::from_f32(style.left_indent);
        let text_width = avail_width - Pt::from_f32(style.left_indent);
        let mut top = y + Pt::from_f32(lines.len() as f32 * style.leading);

        canvas.save_state();
        canvas.set_fill_color(style.color);
        for (idx, (line, width)) in lines.iter().enumerate() {
            // Baseline at the font size below the line top, leading below that.
            let baseline = top - Pt::from_f32(style.font_size);
            if idx == 0 && !self.continued {
                if let Some(bullet) = &style.bullet {
                    let bx = x + Pt::from_f32(style.bullet_indent);
                    self.fonts.draw_text(canvas, bx, baseline, bullet, style.font_size);
                }
            }
            let offset = match style.align {
                TextAlign::Left => Pt::ZERO,
                TextAlign::Center => (text_width - Pt::from_f32(*width)).max(Pt::ZERO).mul_ratio(1, 2),
                TextAlign::Right => (text_width - Pt::from_f32(*width)).max(Pt::ZERO),
            };
            if !line.is_empty() {
                self.fonts
                    .draw_text(canvas, text_x + offset, baseline, line, style.font_size);
            }
            top -= Pt::from_f32(style.leading);
        }
        canvas.restore_state();
    }

    fn h_align(&self) -> BlockAlign {
        BlockAlign::Left
    }
}

/// Vector drawing scaled down to fit the frame.
#[derive(Debug, Clone)]
pub struct SvgFlowable {
    scene: Arc<Scene>,
}

impl SvgFlowable {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene: Arc::new(scene),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scale_for(&self, avail_width: Pt, avail_height: Pt) -> f32 {
        let (w, h) = (self.scene.width, self.scene.height);
        let avail_width = avail_width.to_f32();
        let avail_height = avail_height.to_f32();
        let mut scale = 1.0f32;
        if w > avail_width && w > 0.0 {
            scale = avail_width / w;
        }
        if scale * h > avail_height && h > 0.0 {
            scale = avail_height / h;
        }
        scale
    }
}

impl Flowable for SvgFlowable {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size {
        let scale = self.scale_for(avail_width, avail_height);
        Size::new(self.scene.width * scale, self.scene.height * scale)
    }

    fn split(&self, _avail_width: Pt, _avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, avail_height: Pt) {
        let scale = self.scale_for(avail_width, avail_height);
        self.scene.draw(canvas, x.to_f32(), y.to_f32(), scale);
    }
}

/// Raster image; one pixel maps to one point unless a size is given.
#[derive(Debug, Clone)]
pub struct ImageFlowable {
    image: Arc<RasterImage>,
    width: f32,
    height: f32,
    align: BlockAlign,
}

impl ImageFlowable {
    /// With only one dimension given the other follows the aspect ratio.
    pub fn new(image: Arc<RasterImage>, width: Option<f32>, height: Option<f32>) -> Self {
        let natural_w = image.width().max(1) as f32;
        let natural_h = image.height().max(1) as f32;
        let (width, height) = match (width, height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, w * natural_h / natural_w),
            (None, Some(h)) => (h * natural_w / natural_h, h),
            (None, None) => (natural_w, natural_h),
        };
        Self {
            image,
            width: width.max(0.0),
            height: height.max(0.0),
            align: BlockAlign::Center,
        }
    }

    pub fn with_align(mut self, align: BlockAlign) -> Self {
        self.align = align;
        self
    }

    fn fitted(&self, avail_width: Pt, avail_height: Pt) -> (f32, f32) {
        let mut scale = 1.0f32;
        if self.width > avail_width.to_f32() && self.width > 0.0 {
            scale = avail_width.to_f32() / self.width;
        }
        if self.height * scale > avail_height.to_f32() && self.height > 0.0 {
            scale = avail_height.to_f32() / self.height;
        }
        (self.width * scale, self.height * scale)
    }
}

impl Flowable for ImageFlowable {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size {
        let (w, h) = self.fitted(avail_width, avail_height);
        Size::new(w, h)
    }

    fn split(&self, _avail_width: Pt, _avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, avail_height: Pt) {
        let (w, h) = self.fitted(avail_width, avail_height);
        canvas.draw_image(x, y, Pt::from_f32(w), Pt::from_f32(h), &self.image);
    }

    fn h_align(&self) -> BlockAlign {
        self.align
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;

    fn fonts() -> Arc<FontManager> {
        FontManager::shared_default()
    }

    #[test]
    fn paragraph_wraps_words() {
        let p = Paragraph::new("lorem ipsum dolor sit amet", ParagraphStyle::normal(), fonts());
        let narrow = p.wrap(Pt::from_f32(60.0), Pt::from_f32(1000.0));
        let wide = p.wrap(Pt::from_f32(600.0), Pt::from_f32(1000.0));
        assert!(narrow.height > wide.height);
        assert_eq!(wide.height, Pt::from_f32(12.0));
    }

    #[test]
    fn paragraph_splits_on_line_boundaries() {
        let text = (0..10).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let p = Paragraph::new(text, ParagraphStyle::normal(), fonts());
        let parts = p.split(Pt::from_f32(300.0), Pt::from_f32(40.0)).unwrap();
        assert_eq!(parts.len(), 2);
        let first = parts[0].wrap(Pt::from_f32(300.0), Pt::from_f32(40.0));
        assert_eq!(first.height, Pt::from_f32(36.0));
        assert!(p.split(Pt::from_f32(300.0), Pt::from_f32(5.0)).is_none());
    }

    #[test]
    fn bullet_is_drawn_once() {
        let p = Paragraph::new("item", ParagraphStyle::bullet("-"), fonts());
        let mut canvas = Canvas::new(Size::new(200.0, 200.0));
        p.draw(&mut canvas, Pt::ZERO, Pt::ZERO, Pt::from_f32(200.0), Pt::from_f32(200.0));
        let strings: Vec<_> = canvas
            .current_commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(strings, vec!["-".to_string(), "item".to_string()]);
    }

    #[test]
    fn svg_scales_down_to_width_then_height() {
        let scene = crate::svg::render_svg(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="1000" height="500"></svg>"#,
            &fonts(),
        )
        .unwrap();
        let flowable = SvgFlowable::new(scene);
        assert_eq!(flowable.scale_for(Pt::from_f32(500.0), Pt::from_f32(1000.0)), 0.5);
        assert_eq!(flowable.scale_for(Pt::from_f32(500.0), Pt::from_f32(100.0)), 0.2);
        assert_eq!(flowable.scale_for(Pt::from_f32(2000.0), Pt::from_f32(1000.0)), 1.0);
    }

    #[test]
    fn image_keeps_aspect_ratio() {
        let image = Arc::new(RasterImage::from_bytes(&crate::bitmap::tiny_png(4, 2)).unwrap());
        let flowable = ImageFlowable::new(image, Some(40.0), None);
        let size = flowable.wrap(Pt::from_f32(100.0), Pt::from_f32(100.0));
        assert_eq!(size, Size::new(40.0, 20.0));
        let size = flowable.wrap(Pt::from_f32(20.0), Pt::from_f32(100.0));
        assert_eq!(size, Size::new(20.0, 10.0));
    }

    #[test]
    fn space_requests() {
        assert_eq!(PageBreak.space_request(), Some(SpaceRequest::PageBreak));
        assert_eq!(
            EnsureSpaceBetween::new(36.0).space_request(),
            Some(SpaceRequest::Between(Pt::from_f32(36.0)))
        );
        assert_eq!(CondPageBreak::new(10.0).height(), Pt::from_f32(10.0));
    }
}
