use crate::bitmap::RasterImage;
use crate::canvas::Canvas;
use crate::doc_context::DocContext;
use crate::error::ReportError;
use crate::font::FontManager;
use crate::scene::Scene;
use crate::settings::{PageElement, PageElements, Section, Side, Slot};
use crate::svg::render_svg;
use crate::types::{Color, INCH, Pt, Rect};
use std::sync::Arc;

const LOGO_OFFSET: f32 = 14.0;
const TEXT_OFFSET: f32 = 14.0;
const TEXT_BAND: f32 = 0.25 * INCH;
const CUSTOM_LOGO_HEIGHT: f32 = 45.0;

const PAGINATION_SIZE: f32 = 12.0;
const TIMESTAMP_SIZE: f32 = 9.0;
const TITLE_SIZE: f32 = 11.0;
pub const MIN_TEXT_SIZE: f32 = 8.0;
const TEXT_GUTTER: f32 = 20.0;
const DESCRIPTION_MAX_LINES: usize = 2;
const LEADING_FACTOR: f32 = 1.2;

const RULE_COLOR: Color = Color::grey(0.8);
const TEXT_STROKE: Color = Color::grey(0.5);
const TEXT_FILL: Color = Color::grey(0.586);

pub const ELLIPSIS: &str = "...";

// Built-in mark; `{scale}` is replaced with the paper's logo scale.
const BUILTIN_LOGO_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="87" height="26" viewBox="0 0 263 78">
  <g transform="scale({scale})">
    <rect x="4" y="14" width="50" height="50" fill="#3c444d"/>
    <path d="M70 14 L112 39 L70 64 L70 52 L92 39 L70 26 Z" fill="#65a637"/>
    <rect x="124" y="30" width="130" height="18" fill="#3c444d"/>
  </g>
</svg>"##;

/// Markup of the built-in logo at `scale`.
pub fn builtin_logo_svg(scale: f32) -> String {
    BUILTIN_LOGO_SVG.replace("{scale}", &format!("{scale}"))
}

/// Image placed by the `logo` page element.
#[derive(Debug, Clone)]
pub enum Logo {
    Image(Arc<RasterImage>),
    Drawing(Arc<Scene>),
}

impl Logo {
    pub fn builtin(scale: f32, fonts: &FontManager) -> Result<Logo, ReportError> {
        let scene = render_svg(&builtin_logo_svg(scale), fonts)?;
        Ok(Logo::Drawing(Arc::new(scene)))
    }

    /// Custom images taller than 45pt are scaled down to 45pt.
    pub fn size(&self) -> (f32, f32) {
        match self {
            Logo::Image(image) => {
                let (w, h) = (image.width() as f32, image.height() as f32);
                let ratio = if h > CUSTOM_LOGO_HEIGHT {
                    CUSTOM_LOGO_HEIGHT / h
                } else {
                    1.0
                };
                (w * ratio, h * ratio)
            }
            Logo::Drawing(scene) => (scene.width, scene.height),
        }
    }
}

/// Truncates to `max_chars` characters and appends an ellipsis.
pub fn ellipsize(text: &str, max_chars: usize) -> String {
    if text.is_empty() {
        return String::new();
    }
    if max_chars == 0 {
        return ELLIPSIS.to_string();
    }
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Greedy word wrap to at most `width` characters per line. Words longer
/// than a line are broken.
pub fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_len = 0usize;
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        loop {
            let sep = usize::from(line_len > 0);
            if line_len + sep + word.len() <= width {
                if sep == 1 {
                    line.push(' ');
                }
                line.extend(word.iter());
                line_len += sep + word.len();
                break;
            }
            if line_len > 0 {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
                continue;
            }
            let rest = word.split_off(width);
            lines.push(word.iter().collect());
            word = rest;
            if word.is_empty() {
                break;
            }
        }
    }
    if line_len > 0 {
        lines.push(line);
    }
    lines
}

/// Text shrunk, wrapped and ellipsized to fit a header or footer slot.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedText {
    pub lines: Vec<String>,
    pub font_size: f32,
    pub width: f32,
}

impl FittedText {
    /// Steps the font size down to 8pt, then trims the text, until it fits
    /// `max_lines` lines of `max_width`. Without a positive width the text
    /// stays on one line at its requested size.
    pub fn fit(
        fonts: &FontManager,
        text: &str,
        font_size: f32,
        max_width: Option<f32>,
        max_lines: usize,
    ) -> FittedText {
        if text.is_empty() {
            return FittedText {
                lines: Vec::new(),
                font_size,
                width: 0.0,
            };
        }
        let mut text = text.to_string();
        let mut size = font_size;
        let mut width = fonts.text_width(&text, size);
        let max_width = max_width.filter(|w| *w > 0.0);

        let lines = match max_width {
            Some(max_width) if max_lines > 0 => {
                let limit = max_width * max_lines as f32;
                while width >= limit {
                    if size <= MIN_TEXT_SIZE {
                        let shorter = ellipsize(&text, text.chars().count().saturating_sub(4));
                        if shorter == text {
                            break;
                        }
                        text = shorter;
                    } else {
                        size -= 1.0;
                    }
                    width = fonts.text_width(&text, size);
                }
                if width <= 0.0 {
                    vec![text]
                } else {
                    let per_char = width / text.chars().count() as f32;
                    let per_line = (max_width / per_char).ceil() as usize;
                    let mut lines = wrap_words(&text, per_line);
                    lines.truncate(max_lines);
                    lines
                }
            }
            _ => vec![text],
        };
        let width = if lines.len() == 1 {
            width
        } else {
            max_width.unwrap_or(width)
        };
        FittedText {
            lines,
            font_size: size,
            width,
        }
    }
}

fn slot_x(slot: Slot, content: &Rect, width: f32) -> f32 {
    let left = content.x.to_f32();
    let doc_width = content.width.to_f32();
    match slot.side() {
        Side::Left => left,
        Side::Center => left + doc_width / 2.0 - width / 2.0,
        Side::Right => left + doc_width - width,
    }
}

/// Draws the header and footer rules and page elements on every page.
#[derive(Debug, Clone)]
pub struct PageDecorator {
    elements: PageElements,
    show_header: bool,
    show_footer: bool,
    title: String,
    description: String,
    timestamp: String,
    logo: Option<Logo>,
    fonts: Arc<FontManager>,
}

struct SectionSpace {
    width: f32,
    offset: f32,
}

impl PageDecorator {
    pub fn new(elements: PageElements, fonts: Arc<FontManager>) -> Self {
        Self {
            elements,
            show_header: false,
            show_footer: true,
            title: String::new(),
            description: String::new(),
            timestamp: String::new(),
            logo: None,
            fonts,
        }
    }

    pub fn with_sections(mut self, show_header: bool, show_footer: bool) -> Self {
        self.show_header = show_header;
        self.show_footer = show_footer;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    pub fn with_logo(mut self, logo: Option<Logo>) -> Self {
        self.logo = logo;
        self
    }

    pub fn elements(&self) -> &PageElements {
        &self.elements
    }

    pub fn draw(&self, canvas: &mut Canvas, ctx: &DocContext) {
        let content = ctx.content;
        let left = content.x;
        let right = content.x + content.width;
        canvas.save_state();
        if self.show_footer {
            canvas.set_stroke_color(RULE_COLOR);
            canvas.set_line_width(Pt::from_f32(1.0));
            canvas.line(left, content.y, right, content.y);
        }
        if self.show_header {
            canvas.set_stroke_color(RULE_COLOR);
            canvas.set_line_width(Pt::from_f32(1.0));
            canvas.line(left, content.top(), right, content.top());
        }

        let doc_width = content.width.to_f32();
        let mut header = SectionSpace {
            width: doc_width,
            offset: 0.0,
        };
        let mut footer = SectionSpace {
            width: doc_width,
            offset: 0.0,
        };
        for element in PageElement::DRAW_ORDER {
            for &slot in self.elements.slots(element) {
                let space = match slot.section() {
                    Section::Header => &mut header,
                    Section::Footer => &mut footer,
                };
                let max_width = (space.width - TEXT_GUTTER).max(0.0);
                let width = match element {
                    PageElement::Logo => self.draw_logo(canvas, slot, &content),
                    PageElement::Pagination => {
                        let text = format!("Page {}", ctx.page_number);
                        let fitted = FittedText::fit(&self.fonts, &text, PAGINATION_SIZE, None, 1);
                        self.draw_text(canvas, slot, &content, &fitted, TEXT_BAND);
                        fitted.width
                    }
                    PageElement::Timestamp => {
                        let fitted =
                            FittedText::fit(&self.fonts, &self.timestamp, TIMESTAMP_SIZE, None, 1);
                        self.draw_text(canvas, slot, &content, &fitted, 0.0);
                        // the timestamp never narrows the remaining space
                        0.0
                    }
                    PageElement::Title => {
                        let fitted =
                            FittedText::fit(&self.fonts, &self.title, TITLE_SIZE, Some(max_width), 1);
                        self.draw_text(canvas, slot, &content, &fitted, TEXT_BAND);
                        fitted.width
                    }
                    PageElement::Description => {
                        let fitted = FittedText::fit(
                            &self.fonts,
                            &self.description,
                            TITLE_SIZE,
                            Some(max_width),
                            DESCRIPTION_MAX_LINES,
                        );
                        self.draw_text(canvas, slot, &content, &fitted, TEXT_BAND);
                        fitted.width
                    }
                };
                match slot.side() {
                    Side::Left | Side::Right => {
                        space.offset = space.offset.max(width);
                        space.width = doc_width - 2.0 * space.offset;
                    }
                    Side::Center => space.width = (doc_width - width) / 2.0,
                }
                log::debug!(
                    "page {}: {element} at {} width {width}",
                    ctx.page_number,
                    slot.key()
                );
            }
        }
        canvas.restore_state();
    }

    fn draw_logo(&self, canvas: &mut Canvas, slot: Slot, content: &Rect) -> f32 {
        let Some(logo) = &self.logo else {
            return 0.0;
        };
        let (width, height) = logo.size();
        let x = slot_x(slot, content, width);
        let y = match slot.section() {
            Section::Footer => content.y.to_f32() - height - LOGO_OFFSET,
            Section::Header => content.top().to_f32() + LOGO_OFFSET,
        };
        canvas.save_state();
        match logo {
            Logo::Image(image) => canvas.draw_image(
                Pt::from_f32(x),
                Pt::from_f32(y),
                Pt::from_f32(width),
                Pt::from_f32(height),
                image,
            ),
            Logo::Drawing(scene) => scene.draw(canvas, x, y, 1.0),
        }
        canvas.restore_state();
        width
    }

    /// Text baselines sit `band` plus the element offset outside the rule.
    fn draw_text(
        &self,
        canvas: &mut Canvas,
        slot: Slot,
        content: &Rect,
        fitted: &FittedText,
        band: f32,
    ) {
        if fitted.lines.is_empty() {
            return;
        }
        let x = slot_x(slot, content, fitted.width);
        let y = match slot.section() {
            Section::Footer => content.y.to_f32() - band - TEXT_OFFSET,
            Section::Header => content.top().to_f32() + band + TEXT_OFFSET,
        };
        canvas.set_stroke_color(TEXT_STROKE);
        canvas.set_fill_color(TEXT_FILL);
        let leading = fitted.font_size * LEADING_FACTOR;
        for (i, line) in fitted.lines.iter().enumerate() {
            let baseline = y - leading * i as f32;
            self.fonts.draw_text(
                canvas,
                Pt::from_f32(x),
                Pt::from_f32(baseline),
                line,
                fitted.font_size,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::settings::PdfSettings;
    use crate::types::Size;

    fn letter_context(page_number: usize) -> DocContext {
        let size = Size::from_inches(8.5, 11.0);
        let content = crate::types::Margins::all(INCH).content_rect(size);
        DocContext::new(page_number, "report", size, content)
    }

    fn drawn_strings(canvas: &Canvas) -> Vec<String> {
        canvas
            .current_commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn ellipsize_keeps_a_prefix() {
        assert_eq!(ellipsize("quarterly", 4), "quar...");
        assert_eq!(ellipsize("abc", 0), "...");
        assert_eq!(ellipsize("abc", 5), "abc");
        assert_eq!(ellipsize("", 3), "");
    }

    #[test]
    fn wrap_breaks_on_words_and_long_words() {
        assert_eq!(wrap_words("alpha beta gamma", 10), vec!["alpha beta", "gamma"]);
        assert_eq!(wrap_words("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert!(wrap_words("   ", 4).is_empty());
    }

    #[test]
    fn long_titles_shrink_then_ellipsize() {
        let fonts = FontManager::new();
        let title = "Weekly availability summary for every production cluster";
        let fitted = FittedText::fit(&fonts, title, TITLE_SIZE, Some(100.0), 1);
        assert_eq!(fitted.font_size, MIN_TEXT_SIZE);
        assert_eq!(fitted.lines.len(), 1);
        assert!(fitted.lines[0].ends_with(ELLIPSIS));
        assert!(fitted.width < 100.0);
    }

    #[test]
    fn short_titles_are_untouched() {
        let fonts = FontManager::new();
        let fitted = FittedText::fit(&fonts, "Errors", TITLE_SIZE, Some(300.0), 1);
        assert_eq!(fitted.font_size, TITLE_SIZE);
        assert_eq!(fitted.lines, vec!["Errors".to_string()]);
        assert_eq!(fitted.width, fonts.text_width("Errors", TITLE_SIZE));
    }

    #[test]
    fn descriptions_wrap_to_two_lines_at_full_width() {
        let fonts = FontManager::new();
        let text = "Counts of failed logins grouped by source address and user";
        let fitted = FittedText::fit(&fonts, text, TITLE_SIZE, Some(200.0), 2);
        assert_eq!(fitted.lines.len(), 2);
        assert_eq!(fitted.width, 200.0);
    }

    #[test]
    fn zero_width_keeps_one_line() {
        let fonts = FontManager::new();
        let fitted = FittedText::fit(&fonts, "Title", TITLE_SIZE, Some(0.0), 1);
        assert_eq!(fitted.lines.len(), 1);
        assert_eq!(fitted.font_size, TITLE_SIZE);
    }

    #[test]
    fn only_the_title_is_drawn_when_both_share_the_footer() {
        let settings = PdfSettings::default()
            .with_slot(Slot::FooterLeft, "title")
            .with_slot(Slot::FooterCenter, "description")
            .with_slot(Slot::FooterRight, "pagination");
        let decorator = PageDecorator::new(settings.page_elements(), FontManager::shared_default())
            .with_title("Firewall")
            .with_description("Blocked connections");
        let mut canvas = Canvas::new(Size::from_inches(8.5, 11.0));
        decorator.draw(&mut canvas, &letter_context(3));
        assert_eq!(drawn_strings(&canvas), vec!["Page 3", "Firewall"]);
    }

    #[test]
    fn footer_rule_sits_on_the_content_edge() {
        let decorator = PageDecorator::new(PageElements::default(), FontManager::shared_default());
        let mut canvas = Canvas::new(Size::from_inches(8.5, 11.0));
        decorator.draw(&mut canvas, &letter_context(1));
        let rule = canvas.current_commands().iter().find_map(|c| match c {
            Command::MoveTo { x, y } => Some((x.to_f32(), y.to_f32())),
            _ => None,
        });
        assert_eq!(rule, Some((INCH, INCH)));
    }

    #[test]
    fn pagination_on_the_right_ends_at_the_margin() {
        let settings = PdfSettings::default().with_slot(Slot::FooterRight, "pagination");
        let fonts = FontManager::shared_default();
        let decorator = PageDecorator::new(settings.page_elements(), fonts.clone());
        let mut canvas = Canvas::new(Size::from_inches(8.5, 11.0));
        decorator.draw(&mut canvas, &letter_context(12));
        let (x, y) = canvas
            .current_commands()
            .iter()
            .find_map(|c| match c {
                Command::DrawString { x, y, .. } => Some((x.to_f32(), y.to_f32())),
                _ => None,
            })
            .unwrap();
        let width = fonts.text_width("Page 12", PAGINATION_SIZE);
        assert!((x + width - 7.5 * INCH).abs() < 0.01);
        assert!((y - (0.75 * INCH - TEXT_OFFSET)).abs() < 0.01);
    }

    #[test]
    fn builtin_logo_renders() {
        let logo = Logo::builtin(0.33, &FontManager::new()).unwrap();
        assert_eq!(logo.size(), (87.0, 26.0));
    }
}
