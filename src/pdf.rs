use crate::bitmap::{PixelData, RasterImage};
use crate::canvas::{Command, Document, Page};
use crate::error::ReportError;
use crate::font::{FontFace, FontManager, STANDARD_FONT, TrueTypeFace, win_ansi_byte};
use crate::types::{Color, Pt};
use lopdf::{
    Dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId,
    Stream as LoStream, dictionary,
};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

const PDF_VERSION: &str = "1.4";
const PRODUCER: &str = "pagecraft";

/// Document information dictionary entries.
#[derive(Debug, Clone, Default)]
pub struct PdfInfo {
    pub title: String,
    pub subject: String,
}

/// A face referenced by at least one page, with the glyphs it draws.
struct UsedFont {
    resource: String,
    face: usize,
    glyphs: BTreeMap<u16, char>,
}

/// Resource names shared by every page's content stream.
struct Resources {
    fonts: BTreeMap<String, UsedFont>,
    states: BTreeMap<(i64, i64), String>,
}

impl Resources {
    fn collect(document: &Document, fonts: &FontManager) -> Self {
        let mut used: BTreeMap<String, UsedFont> = BTreeMap::new();
        let mut states: BTreeSet<(i64, i64)> = BTreeSet::new();
        for page in &document.pages {
            let mut current = STANDARD_FONT.to_string();
            for cmd in &page.commands {
                match cmd {
                    Command::SetFontName(name) => current = name.clone(),
                    Command::SetOpacity { fill, stroke } => {
                        states.insert((alpha_milli(*fill), alpha_milli(*stroke)));
                    }
                    Command::DrawString { text, .. } => {
                        let face = fonts.face_index(&current).unwrap_or(0);
                        let key = fonts.face(face).map(FontFace::name).unwrap_or(STANDARD_FONT);
                        let next = used.len() + 1;
                        let entry = used.entry(key.to_string()).or_insert_with(|| UsedFont {
                            resource: format!("F{next}"),
                            face,
                            glyphs: BTreeMap::new(),
                        });
                        if let Some(FontFace::TrueType(tt)) = fonts.face(face) {
                            for ch in text.chars() {
                                if let Some((gid, _)) = tt.glyph(ch) {
                                    entry.glyphs.entry(gid).or_insert(ch);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        let states = states
            .into_iter()
            .enumerate()
            .map(|(i, key)| (key, format!("GS{}", i + 1)))
            .collect();
        Self {
            fonts: used,
            states,
        }
    }

    fn font(&self, name: &str) -> Option<&UsedFont> {
        self.fonts
            .get(name)
            .or_else(|| self.fonts.get(STANDARD_FONT))
    }
}

fn alpha_milli(value: f32) -> i64 {
    (value.clamp(0.0, 1.0) * 1000.0).round() as i64
}

/// Serializes a laid-out document as PDF bytes. Page coordinates are already
/// PDF-native, so commands are written without any flip.
pub fn write_pdf(
    document: &Document,
    fonts: &FontManager,
    info: &PdfInfo,
) -> Result<Vec<u8>, ReportError> {
    let resources = Resources::collect(document, fonts);
    let contents: Vec<Vec<u8>> = document
        .pages
        .par_iter()
        .map(|page| render_page(page, &resources, fonts).into_bytes())
        .collect();

    let mut doc = LoDocument::with_version(PDF_VERSION);
    let pages_id = doc.new_object_id();

    let mut font_dict = Dictionary::new();
    for used in resources.fonts.values() {
        let id = match fonts.face(used.face) {
            Some(FontFace::TrueType(face)) => add_truetype_font(&mut doc, face, &used.glyphs),
            _ => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => STANDARD_FONT,
                "Encoding" => "WinAnsiEncoding",
            }),
        };
        font_dict.set(used.resource.as_bytes().to_vec(), id);
    }

    let mut xobjects = Dictionary::new();
    for (name, image) in &document.images {
        let id = add_image(&mut doc, image);
        xobjects.set(name.as_bytes().to_vec(), id);
    }

    let mut gs_dict = Dictionary::new();
    for ((fill, stroke), name) in &resources.states {
        let id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => LoObject::Real(*fill as f32 / 1000.0),
            "CA" => LoObject::Real(*stroke as f32 / 1000.0),
        });
        gs_dict.set(name.as_bytes().to_vec(), id);
    }

    let resources_id = doc.add_object(dictionary! {
        "Font" => font_dict,
        "XObject" => xobjects,
        "ExtGState" => gs_dict,
    });

    let media_box: Vec<LoObject> = vec![
        0.into(),
        0.into(),
        LoObject::Real(document.page_size.width.to_f32()),
        LoObject::Real(document.page_size.height.to_f32()),
    ];
    let mut kids: Vec<LoObject> = Vec::with_capacity(contents.len());
    for content in contents {
        let content_id = doc.add_object(LoStream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => media_box.clone(),
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let created = chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string();
    let info_id = doc.add_object(dictionary! {
        "Title" => LoObject::string_literal(info.title.as_str()),
        "Subject" => LoObject::string_literal(info.subject.as_str()),
        "Producer" => LoObject::string_literal(PRODUCER),
        "CreationDate" => LoObject::string_literal(created),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    log::debug!(
        "wrote pdf: {} pages, {} fonts, {} images, {} bytes",
        count,
        resources.fonts.len(),
        document.images.len(),
        out.len()
    );
    Ok(out)
}

fn add_truetype_font(
    doc: &mut LoDocument,
    face: &TrueTypeFace,
    glyphs: &BTreeMap<u16, char>,
) -> LoObjectId {
    let name = face.name().to_string();
    let data = face.data().to_vec();
    let length = data.len() as i64;
    let file_id = doc.add_object(LoStream::new(dictionary! { "Length1" => length }, data));
    let (x0, y0, x1, y1) = face.bbox();
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => name.as_str(),
        "Flags" => 32,
        "FontBBox" => [x0, y0, x1, y1].map(|v| LoObject::Integer(i64::from(v))).to_vec(),
        "ItalicAngle" => i64::from(face.italic_angle()),
        "Ascent" => i64::from(face.ascent()),
        "Descent" => i64::from(face.descent()),
        "CapHeight" => i64::from(face.cap_height()),
        "StemV" => 80,
        "FontFile2" => file_id,
    });

    let mut widths: Vec<LoObject> = Vec::with_capacity(glyphs.len() * 2);
    for (gid, ch) in glyphs {
        let advance = face.glyph(*ch).map(|(_, adv)| adv).unwrap_or(0);
        widths.push(i64::from(*gid).into());
        widths.push(vec![i64::from(advance).into()].into());
    }
    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => name.as_str(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => LoObject::string_literal("Adobe"),
            "Ordering" => LoObject::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "W" => widths,
        "CIDToGIDMap" => "Identity",
    });
    let to_unicode_id = doc.add_object(LoStream::new(
        dictionary! {},
        to_unicode_cmap(glyphs).into_bytes(),
    ));
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => name.as_str(),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![cid_font_id.into()],
        "ToUnicode" => to_unicode_id,
    })
}

fn add_image(doc: &mut LoDocument, image: &Arc<RasterImage>) -> LoObjectId {
    let width = i64::from(image.width());
    let height = i64::from(image.height());
    match image.pixels() {
        PixelData::Jpeg { data, gray } => {
            let color_space = if *gray { "DeviceGray" } else { "DeviceRGB" };
            let stream = LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                data.clone(),
            )
            .with_compression(false);
            doc.add_object(stream)
        }
        PixelData::Rgb { data, alpha } => {
            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            };
            if let Some(alpha) = alpha {
                let smask_id = doc.add_object(LoStream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width,
                        "Height" => height,
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => 8,
                    },
                    alpha.clone(),
                ));
                dict.set("SMask", smask_id);
            }
            doc.add_object(LoStream::new(dict, data.clone()))
        }
    }
}

fn render_page(page: &Page, resources: &Resources, fonts: &FontManager) -> String {
    let mut out = String::new();
    let mut font_name = STANDARD_FONT.to_string();
    let mut font_size = Pt::from_f32(12.0);

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::ConcatMatrix { a, b, c, d, e, f } => {
                let _ = writeln!(
                    out,
                    "{} {} {} {} {} {} cm",
                    fmt(*a),
                    fmt(*b),
                    fmt(*c),
                    fmt(*d),
                    fmt(*e),
                    fmt(*f)
                );
            }
            Command::SetFillColor(color) => out.push_str(&color_op(*color, "rg")),
            Command::SetStrokeColor(color) => out.push_str(&color_op(*color, "RG")),
            Command::SetLineWidth(width) => {
                let _ = writeln!(out, "{} w", fmt_pt(*width));
            }
            Command::SetLineCap(cap) => {
                let _ = writeln!(out, "{cap} J");
            }
            Command::SetDash { pattern, phase } => {
                let items: Vec<String> = pattern.iter().map(|v| fmt_pt(*v)).collect();
                let _ = writeln!(out, "[{}] {} d", items.join(" "), fmt_pt(*phase));
            }
            Command::SetOpacity { fill, stroke } => {
                let key = (alpha_milli(*fill), alpha_milli(*stroke));
                if let Some(name) = resources.states.get(&key) {
                    let _ = writeln!(out, "/{name} gs");
                }
            }
            Command::SetFontName(name) => font_name = name.clone(),
            Command::SetFontSize(size) => font_size = *size,
            Command::ClipRect {
                x,
                y,
                width,
                height,
            } => {
                let _ = writeln!(
                    out,
                    "{} {} {} {} re W n",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                );
            }
            Command::ClipPath { evenodd } => {
                out.push_str(if *evenodd { "W* n\n" } else { "W n\n" });
            }
            Command::MoveTo { x, y } => {
                let _ = writeln!(out, "{} {} m", fmt_pt(*x), fmt_pt(*y));
            }
            Command::LineTo { x, y } => {
                let _ = writeln!(out, "{} {} l", fmt_pt(*x), fmt_pt(*y));
            }
            Command::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                let _ = writeln!(
                    out,
                    "{} {} {} {} {} {} c",
                    fmt_pt(*x1),
                    fmt_pt(*y1),
                    fmt_pt(*x2),
                    fmt_pt(*y2),
                    fmt_pt(*x),
                    fmt_pt(*y)
                );
            }
            Command::ClosePath => out.push_str("h\n"),
            Command::Fill => out.push_str("f\n"),
            Command::Stroke => out.push_str("S\n"),
            Command::FillStroke => out.push_str("B\n"),
            Command::DrawString { x, y, text } => {
                let Some(font) = resources.font(&font_name) else {
                    continue;
                };
                let encoded = match fonts.face(font.face) {
                    Some(FontFace::TrueType(face)) => encode_cid_hex(face, text),
                    _ => format!("({})", encode_win_ansi(text)),
                };
                let _ = writeln!(
                    out,
                    "BT /{} {} Tf {} {} Td {} Tj ET",
                    font.resource,
                    fmt_pt(font_size),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    encoded
                );
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                let _ = writeln!(
                    out,
                    "{} {} {} {} re f",
                    fmt_pt(*x),
                    fmt_pt(*y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                );
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let _ = writeln!(
                    out,
                    "q {} 0 0 {} {} {} cm /{} Do Q",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(*y),
                    resource_id
                );
            }
        }
    }
    out
}

/// Literal-string body for the standard font. Characters outside WinAnsi
/// become `?`.
fn encode_win_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = win_ansi_byte(ch).unwrap_or_else(|| {
            replaced += 1;
            b'?'
        });
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if b < 0x20 || b >= 0x7f => {
                let _ = write!(out, "\\{b:03o}");
            }
            b => out.push(b as char),
        }
    }
    if replaced > 0 {
        log::debug!("{replaced} characters not encodable in WinAnsi were replaced");
    }
    out
}

fn encode_cid_hex(face: &TrueTypeFace, text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 4 + 2);
    out.push('<');
    for ch in text.chars() {
        let gid = face.glyph(ch).map(|(gid, _)| gid).unwrap_or(0);
        let _ = write!(out, "{gid:04X}");
    }
    out.push('>');
    out
}

fn to_unicode_cmap(glyphs: &BTreeMap<u16, char>) -> String {
    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");
    let entries: Vec<(&u16, &char)> = glyphs.iter().collect();
    for chunk in entries.chunks(100) {
        let _ = writeln!(out, "{} beginbfchar", chunk.len());
        for (gid, ch) in chunk {
            let mut units = [0u16; 2];
            let hex: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{u:04X}"))
                .collect();
            let _ = writeln!(out, "<{gid:04X}> <{hex}>");
        }
        out.push_str("endbfchar\n");
    }
    out.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    out
}

fn color_op(color: Color, op: &str) -> String {
    format!(
        "{} {} {} {op}\n",
        fmt(color.r.clamp(0.0, 1.0)),
        fmt(color.g.clamp(0.0, 1.0)),
        fmt(color.b.clamp(0.0, 1.0))
    )
}

fn fmt(value: f32) -> String {
    format_milli(Pt::from_f32(value).to_milli_i64())
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let (int_part, frac_part) = (abs / 1000, abs % 1000);
    if frac_part == 0 {
        return format!("{sign}{int_part}");
    }
    let frac = format!("{frac_part:03}");
    format!("{sign}{int_part}.{}", frac.trim_end_matches('0'))
}
