use crate::canvas::Canvas;
use crate::error::ReportError;
use crate::types::Pt;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

pub const STANDARD_FONT: &str = "Helvetica";

const TEXT_WIDTH_CACHE_LIMIT: usize = 20_000;
// Average advance used for characters no registered face covers.
const MISSING_WIDTH: u16 = 600;

// Helvetica advances (1/1000 em) for U+0020..=U+007E.
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

// Helvetica advances for U+00A0..=U+00FF.
const HELVETICA_LATIN1: [u16; 96] = [
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333, 400, 584, 333,
    333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611, 667, 667, 667, 667, 667, 667,
    1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, 722, 722, 778, 778, 778, 778, 778, 584, 778,
    722, 722, 722, 722, 667, 667, 611, 556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556,
    278, 278, 278, 278, 556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556,
    500,
];

// WinAnsi code points 0x80..=0x9F that differ from Latin-1: (char, code, advance).
const WIN_ANSI_SPECIALS: [(char, u8, u16); 27] = [
    ('€', 0x80, 556),
    ('‚', 0x82, 222),
    ('ƒ', 0x83, 556),
    ('„', 0x84, 333),
    ('…', 0x85, 1000),
    ('†', 0x86, 556),
    ('‡', 0x87, 556),
    ('ˆ', 0x88, 333),
    ('‰', 0x89, 1000),
    ('Š', 0x8A, 667),
    ('‹', 0x8B, 333),
    ('Œ', 0x8C, 1000),
    ('Ž', 0x8E, 611),
    ('‘', 0x91, 222),
    ('’', 0x92, 222),
    ('“', 0x93, 333),
    ('”', 0x94, 333),
    ('•', 0x95, 350),
    ('–', 0x96, 556),
    ('—', 0x97, 1000),
    ('˜', 0x98, 333),
    ('™', 0x99, 1000),
    ('š', 0x9A, 500),
    ('›', 0x9B, 333),
    ('œ', 0x9C, 944),
    ('ž', 0x9E, 500),
    ('Ÿ', 0x9F, 667),
];

/// WinAnsi byte for `ch`, if the standard font can encode it.
pub fn win_ansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    if (0x20..=0x7E).contains(&code) || (0xA0..=0xFF).contains(&code) {
        return Some(code as u8);
    }
    WIN_ANSI_SPECIALS
        .iter()
        .find(|(c, _, _)| *c == ch)
        .map(|(_, byte, _)| *byte)
}

fn helvetica_advance(ch: char) -> Option<u16> {
    let code = ch as u32;
    match code {
        0x20..=0x7E => Some(HELVETICA_ASCII[(code - 0x20) as usize]),
        0xA0..=0xFF => Some(HELVETICA_LATIN1[(code - 0xA0) as usize]),
        _ => WIN_ANSI_SPECIALS
            .iter()
            .find(|(c, _, _)| *c == ch)
            .map(|(_, _, w)| *w),
    }
}

#[derive(Debug)]
pub struct TrueTypeFace {
    name: String,
    data: Arc<Vec<u8>>,
    // char -> (glyph id, advance in 1/1000 em)
    glyphs: HashMap<char, (u16, u16)>,
    ascent: i16,
    descent: i16,
    cap_height: i16,
    italic_angle: i16,
    bbox: (i16, i16, i16, i16),
}

impl TrueTypeFace {
    fn parse(data: Vec<u8>) -> Result<Self, ReportError> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| ReportError::Font(format!("invalid font data: {err}")))?;
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let scaled = |v: i16| (v as f32 * scale).round() as i16;

        let mut glyphs = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    let Some(ch) = char::from_u32(cp) else {
                        return;
                    };
                    if glyphs.contains_key(&ch) {
                        return;
                    }
                    if let Some(gid) = face.glyph_index(ch) {
                        let advance = face.glyph_hor_advance(gid).unwrap_or(0);
                        let advance = (advance as f32 * scale).round() as u16;
                        glyphs.insert(ch, (gid.0, advance));
                    }
                });
            }
        }

        let bbox = face.global_bounding_box();
        let ascent = scaled(face.ascender());
        let name = postscript_name(&face).unwrap_or_else(|| "EmbeddedFont".to_string());
        Ok(Self {
            name,
            glyphs,
            ascent,
            descent: scaled(face.descender()),
            cap_height: face.capital_height().map(scaled).unwrap_or(ascent),
            italic_angle: face.italic_angle().map(|v| v.round() as i16).unwrap_or(0),
            bbox: (
                scaled(bbox.x_min),
                scaled(bbox.y_min),
                scaled(bbox.x_max),
                scaled(bbox.y_max),
            ),
            data: Arc::new(data),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn glyph(&self, ch: char) -> Option<(u16, u16)> {
        self.glyphs.get(&ch).copied()
    }

    pub fn ascent(&self) -> i16 {
        self.ascent
    }

    pub fn descent(&self) -> i16 {
        self.descent
    }

    pub fn cap_height(&self) -> i16 {
        self.cap_height
    }

    pub fn italic_angle(&self) -> i16 {
        self.italic_angle
    }

    pub fn bbox(&self) -> (i16, i16, i16, i16) {
        self.bbox
    }
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;
    let mut family = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME => return Some(sanitize_font_name(&name)),
            name_id::FAMILY if family.is_none() => family = Some(name),
            _ => {}
        }
    }
    family.map(|name| sanitize_font_name(&name))
}

fn sanitize_font_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[derive(Debug)]
pub enum FontFace {
    Standard,
    TrueType(TrueTypeFace),
}

impl FontFace {
    pub fn name(&self) -> &str {
        match self {
            FontFace::Standard => STANDARD_FONT,
            FontFace::TrueType(face) => face.name(),
        }
    }

    fn advance(&self, ch: char) -> Option<u16> {
        match self {
            FontFace::Standard => helvetica_advance(ch),
            FontFace::TrueType(face) => face.glyph(ch).map(|(_, advance)| advance),
        }
    }
}

/// A maximal run of text drawn with one face.
#[derive(Debug, Clone, PartialEq)]
pub struct FontRun {
    pub font: usize,
    pub text: String,
}

/// Ordered set of faces plus a code point to face index map. The first face
/// that covers a code point wins. Face 0 is always the standard font and
/// also receives every character no face covers.
#[derive(Debug)]
pub struct FontManager {
    faces: Vec<FontFace>,
    code_points: HashMap<char, usize>,
    width_cache: RwLock<HashMap<(String, i64), f32>>,
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FontManager {
    pub fn new() -> Self {
        Self {
            faces: vec![FontFace::Standard],
            code_points: HashMap::new(),
            width_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide manager holding only the standard font.
    pub fn shared_default() -> Arc<FontManager> {
        static SHARED: OnceLock<Arc<FontManager>> = OnceLock::new();
        SHARED.get_or_init(|| Arc::new(FontManager::new())).clone()
    }

    /// Adds a TrueType face behind the already registered ones and returns
    /// its name. Only code points no earlier face covers are routed to it.
    pub fn register_truetype(&mut self, data: Vec<u8>) -> Result<String, ReportError> {
        let face = TrueTypeFace::parse(data)?;
        let index = self.faces.len();
        let mut added = 0usize;
        for &ch in face.glyphs.keys() {
            if helvetica_advance(ch).is_some() || self.code_points.contains_key(&ch) {
                continue;
            }
            self.code_points.insert(ch, index);
            added += 1;
        }
        let name = face.name().to_string();
        log::info!("registered font {name} covering {added} additional code points");
        self.faces.push(FontFace::TrueType(face));
        if let Ok(mut cache) = self.width_cache.write() {
            cache.clear();
        }
        Ok(name)
    }

    pub fn faces(&self) -> &[FontFace] {
        &self.faces
    }

    pub fn face(&self, index: usize) -> Option<&FontFace> {
        self.faces.get(index)
    }

    pub fn face_index(&self, name: &str) -> Option<usize> {
        self.faces.iter().position(|face| face.name() == name)
    }

    fn font_for_char(&self, ch: char) -> usize {
        if helvetica_advance(ch).is_some() {
            return 0;
        }
        self.code_points.get(&ch).copied().unwrap_or(0)
    }

    /// Splits `text` into runs of consecutive characters served by the same face.
    pub fn segment(&self, text: &str) -> Vec<FontRun> {
        let mut runs: Vec<FontRun> = Vec::new();
        for ch in text.chars() {
            let font = self.font_for_char(ch);
            match runs.last_mut() {
                Some(run) if run.font == font => run.text.push(ch),
                _ => runs.push(FontRun {
                    font,
                    text: ch.to_string(),
                }),
            }
        }
        runs
    }

    pub fn char_width(&self, ch: char, font_size: f32) -> f32 {
        let face = &self.faces[self.font_for_char(ch)];
        let advance = face.advance(ch).unwrap_or(MISSING_WIDTH);
        advance as f32 * font_size / 1000.0
    }

    pub fn text_width(&self, text: &str, font_size: f32) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        let key = (text.to_string(), (font_size * 1000.0).round() as i64);
        if let Ok(cache) = self.width_cache.read() {
            if let Some(width) = cache.get(&key) {
                return *width;
            }
        }
        let width: f32 = text.chars().map(|ch| self.char_width(ch, font_size)).sum();
        if let Ok(mut cache) = self.width_cache.write() {
            if cache.len() > TEXT_WIDTH_CACHE_LIMIT {
                cache.clear();
            }
            cache.insert(key, width);
        }
        width
    }

    /// Draws `text` starting at `(x, y)`, switching faces between runs.
    /// Returns the advance width.
    pub fn draw_text(&self, canvas: &mut Canvas, x: Pt, y: Pt, text: &str, font_size: f32) -> f32 {
        canvas.set_font_size(Pt::from_f32(font_size));
        let mut cursor = x;
        let mut advance = 0.0;
        for run in self.segment(text) {
            let face = &self.faces[run.font];
            canvas.set_font_name(face.name());
            let width = self.text_width(&run.text, font_size);
            canvas.draw_string(cursor, y, run.text);
            cursor += Pt::from_f32(width);
            advance += width;
        }
        advance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helvetica_widths_match_afm() {
        let fonts = FontManager::new();
        assert!((fonts.text_width("A", 10.0) - 6.67).abs() < 1e-4);
        assert!((fonts.text_width("ii", 1000.0) - 444.0).abs() < 1e-3);
        assert_eq!(fonts.text_width("", 10.0), 0.0);
    }

    #[test]
    fn uncovered_characters_fall_back_to_standard_face() {
        let fonts = FontManager::new();
        let runs = fonts.segment("ab\u{4e2d}c");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].font, 0);
        assert!((fonts.char_width('\u{4e2d}', 10.0) - 6.0).abs() < 1e-4);
    }

    #[test]
    fn cached_width_is_stable() {
        let fonts = FontManager::shared_default();
        let first = fonts.text_width("Page 12", 12.0);
        let second = fonts.text_width("Page 12", 12.0);
        assert_eq!(first, second);
    }

    #[test]
    fn win_ansi_covers_specials() {
        assert_eq!(win_ansi_byte('€'), Some(0x80));
        assert_eq!(win_ansi_byte('é'), Some(0xE9));
        assert_eq!(win_ansi_byte('\u{4e2d}'), None);
    }

    #[test]
    fn draw_text_emits_one_string_per_run() {
        let fonts = FontManager::new();
        let mut canvas = Canvas::new(crate::types::Size::new(100.0, 100.0));
        let advance = fonts.draw_text(&mut canvas, Pt::ZERO, Pt::ZERO, "abc", 10.0);
        assert!((advance - fonts.text_width("abc", 10.0)).abs() < 1e-4);
        let strings = canvas
            .current_commands()
            .iter()
            .filter(|c| matches!(c, crate::canvas::Command::DrawString { .. }))
            .count();
        assert_eq!(strings, 1);
    }

    #[test]
    fn rejects_invalid_font_bytes() {
        let mut fonts = FontManager::new();
        assert!(fonts.register_truetype(vec![0, 1, 2, 3]).is_err());
    }
}
