use crate::canvas::Canvas;
use crate::flowable::Flowable;
use crate::font::FontManager;
use crate::types::{Pt, Size};
use regex::Regex;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

pub const TABLE_FONT_SIZE: f32 = 6.0;
/// Default cap on the wrapped height of one cell.
pub const DEFAULT_MAX_CELL_HEIGHT: f32 = 100.0;

const LAYOUT_CACHE_ENTRIES: usize = 8;

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+|\W").expect("valid token regex"))
}

/// Result of wrapping a text block to one width.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<String>,
    pub width: f32,
    pub height: f32,
    pub truncated: bool,
}

#[derive(Debug, Default)]
struct LayoutCache {
    entries: Vec<(i64, Arc<TextLayout>)>,
}

impl LayoutCache {
    fn get(&self, key: i64) -> Option<Arc<TextLayout>> {
        self.entries
            .iter()
            .find_map(|(k, v)| if *k == key { Some(v.clone()) } else { None })
    }

    fn insert(&mut self, key: i64, layout: Arc<TextLayout>) {
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, layout));
        if self.entries.len() > LAYOUT_CACHE_ENTRIES {
            self.entries.remove(0);
        }
    }
}

/// Plain text that wraps hard at the available width, breaking inside words
/// when a word cannot fit on a line of its own.
#[derive(Debug, Clone)]
pub struct TableText {
    text: String,
    source_lines: Vec<String>,
    fonts: Arc<FontManager>,
    font_size: f32,
    max_cell_height: f32,
    natural_width: f32,
    numeric: bool,
    layout_cache: Arc<Mutex<LayoutCache>>,
}

impl TableText {
    pub fn new(text: impl Into<String>, fonts: Arc<FontManager>) -> Self {
        Self::with_options(text, fonts, TABLE_FONT_SIZE, DEFAULT_MAX_CELL_HEIGHT)
    }

    pub fn with_options(
        text: impl Into<String>,
        fonts: Arc<FontManager>,
        font_size: f32,
        max_cell_height: f32,
    ) -> Self {
        let text = text.into();
        let source_lines: Vec<String> = text.lines().map(str::to_string).collect();
        let natural_width = source_lines
            .iter()
            .map(|line| fonts.text_width(line, font_size))
            .fold(0.0, f32::max);
        let numeric = !source_lines.is_empty()
            && source_lines
                .iter()
                .all(|line| line.trim().parse::<f64>().is_ok());
        Self {
            text,
            source_lines,
            fonts,
            font_size,
            max_cell_height,
            natural_width,
            numeric,
            layout_cache: Arc::new(Mutex::new(LayoutCache::default())),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Width of the widest unwrapped line.
    pub fn natural_width(&self) -> f32 {
        self.natural_width
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    pub fn line_height(&self) -> f32 {
        self.font_size + 2.0
    }

    /// Wrapped lines for `avail_width`; cached per width.
    pub fn layout(&self, avail_width: f32) -> Arc<TextLayout> {
        let key = Pt::from_f32(avail_width).to_milli_i64();
        if let Ok(cache) = self.layout_cache.lock() {
            if let Some(layout) = cache.get(key) {
                return layout;
            }
        }
        let layout = Arc::new(self.wrap_lines(avail_width));
        if let Ok(mut cache) = self.layout_cache.lock() {
            cache.insert(key, layout.clone());
        }
        layout
    }

    /// Draws `layout` with its top edge at `top`.
    pub fn draw_layout(&self, canvas: &mut Canvas, x: Pt, top: Pt, layout: &TextLayout) {
        let line_height = self.line_height();
        // Baseline sits at the bottom of each line box, like the cell metrics assume.
        for (idx, line) in layout.lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let baseline = top - Pt::from_f32((idx + 1) as f32 * line_height);
            self.fonts.draw_text(canvas, x, baseline, line, self.font_size);
        }
    }

    fn width_of(&self, text: &str) -> f32 {
        self.fonts.text_width(text, self.font_size)
    }

    fn wrap_lines(&self, avail_width: f32) -> TextLayout {
        let line_height = self.line_height();
        let mut lines: Vec<String> = Vec::new();
        let mut width = 0.0f32;
        let mut last_source = 0usize;
        let space_width = self.width_of(" ");

        for (idx, source) in self.source_lines.iter().enumerate() {
            last_source = idx;
            let source_width = self.width_of(source);
            if source_width <= avail_width {
                lines.push(source.clone());
                width = width.max(source_width);
            } else {
                let mut tokens: VecDeque<String> = token_regex()
                    .find_iter(source)
                    .map(|m| m.as_str().to_string())
                    .collect();
                while !tokens.is_empty() && (lines.len() as f32 * line_height) < self.max_cell_height {
                    let line = self.fill_line(&mut tokens, avail_width, space_width);
                    width = width.max(self.width_of(&line));
                    lines.push(line);
                }
            }
            if lines.len() as f32 * line_height >= self.max_cell_height {
                break;
            }
        }

        let mut truncated = false;
        if last_source + 1 < self.source_lines.len() {
            let shown = 100.0 * last_source as f32 / self.source_lines.len() as f32;
            log::info!("truncated cell contents, {shown:.1}% shown");
            lines.push(format!("... Truncated. {shown:.1}% shown."));
            truncated = true;
        }

        TextLayout {
            height: lines.len() as f32 * line_height,
            lines,
            width,
            truncated,
        }
    }

    /// Pulls tokens into one output line. Always consumes at least one
    /// character so wrapping terminates for any width.
    fn fill_line(&self, tokens: &mut VecDeque<String>, avail_width: f32, space_width: f32) -> String {
        let mut line = String::new();
        let mut placed = 0usize;
        let mut remaining = avail_width;

        while let Some(token) = tokens.pop_front() {
            let token = if token == "\t" { " ".to_string() } else { token };
            let mut token_width = self.width_of(&token);
            if placed > 0 {
                token_width += space_width;
            }

            if token_width <= remaining {
                line.push_str(&token);
                placed += 1;
                remaining -= token_width;
                continue;
            }
            if token_width <= avail_width && placed > 0 {
                tokens.push_front(token);
                break;
            }

            let split = self.break_index(&token, remaining);
            let split = if split == 0 && placed == 0 {
                token.chars().next().map(char::len_utf8).unwrap_or(token.len())
            } else {
                split
            };
            if split == 0 {
                tokens.push_front(token);
                break;
            }
            line.push_str(&token[..split]);
            if split < token.len() {
                tokens.push_front(token[split..].to_string());
            }
            break;
        }
        line
    }

    /// Byte index of the longest prefix of `word` that stays strictly
    /// narrower than `avail_width`.
    fn break_index(&self, word: &str, avail_width: f32) -> usize {
        let mut used = 0.0;
        for (idx, ch) in word.char_indices() {
            let w = self.fonts.char_width(ch, self.font_size);
            if used + w >= avail_width {
                return idx;
            }
            used += w;
        }
        word.len()
    }
}

impl Flowable for TableText {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let layout = self.layout(avail_width.to_f32());
        Size::new(layout.width, layout.height)
    }

    fn split(&self, _avail_width: Pt, _avail_height: Pt) -> Option<Vec<Box<dyn Flowable>>> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let layout = self.layout(avail_width.to_f32());
        canvas.save_state();
        canvas.set_fill_color(crate::types::Color::BLACK);
        self.draw_layout(canvas, x, y + Pt::from_f32(layout.height), &layout);
        canvas.restore_state();
    }

    fn h_align(&self) -> crate::flowable::BlockAlign {
        crate::flowable::BlockAlign::Left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> TableText {
        TableText::new(value, FontManager::shared_default())
    }

    #[test]
    fn short_lines_are_kept_whole() {
        let t = text("alpha\nbeta");
        let layout = t.layout(200.0);
        assert_eq!(layout.lines, vec!["alpha", "beta"]);
        assert_eq!(layout.height, 16.0);
        assert!((layout.width - t.natural_width()).abs() < 1e-4);
    }

    #[test]
    fn long_words_are_broken_inside() {
        let t = text("abcdefghijklmnopqrstuvwxyz");
        let layout = t.layout(30.0);
        assert!(layout.lines.len() > 1);
        assert_eq!(layout.lines.concat(), "abcdefghijklmnopqrstuvwxyz");
        for line in &layout.lines {
            assert!(FontManager::shared_default().text_width(line, TABLE_FONT_SIZE) < 30.0);
        }
    }

    #[test]
    fn wrapping_terminates_for_tiny_widths() {
        let t = text("WWWW WWWW");
        let layout = t.layout(0.5);
        assert_eq!(layout.lines.concat(), "WWWW WWWW");
    }

    #[test]
    fn words_move_to_next_line_before_breaking() {
        let t = text("one two three four five six");
        let layout = t.layout(40.0);
        assert!(layout.lines.len() >= 2);
        assert!(layout.lines.iter().all(|l| !l.is_empty()));
    }

    #[test]
    fn tall_content_is_truncated_with_trailer() {
        let body: Vec<String> = (0..40).map(|i| format!("row {i}")).collect();
        let t = TableText::with_options(body.join("\n"), FontManager::shared_default(), 6.0, 80.0);
        let layout = t.layout(200.0);
        assert!(layout.truncated);
        assert_eq!(layout.lines.len(), 11);
        assert_eq!(layout.lines.last().unwrap(), "... Truncated. 22.5% shown.");
    }

    #[test]
    fn numeric_detection() {
        assert!(text("12.5").is_numeric());
        assert!(text("1e3\n-4").is_numeric());
        assert!(!text("12 apples").is_numeric());
        assert!(!text("").is_numeric());
    }

    #[test]
    fn layout_is_cached_per_width() {
        let t = text("cache me please");
        let a = t.layout(20.0);
        let b = t.layout(20.0);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
