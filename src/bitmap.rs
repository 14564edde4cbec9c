use crate::error::ReportError;
use base64::Engine;
use image::GenericImageView;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    /// Original JPEG stream, embedded as-is (DCTDecode).
    Jpeg { data: Vec<u8>, gray: bool },
    /// Raw 8-bit RGB samples with an optional 8-bit soft mask.
    Rgb { data: Vec<u8>, alpha: Option<Vec<u8>> },
}

/// Decoded raster image ready to be placed on a canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    id: String,
    width: u32,
    height: u32,
    pixels: PixelData,
}

impl RasterImage {
    pub fn from_bytes(data: &[u8]) -> Result<Self, ReportError> {
        let format = image::guess_format(data)?;
        let decoded = image::load_from_memory(data)?;
        let (width, height) = decoded.dimensions();
        let id = content_id(data);

        if format == image::ImageFormat::Jpeg {
            let gray = matches!(
                decoded.color(),
                image::ColorType::L8 | image::ColorType::La8
            );
            return Ok(Self {
                id,
                width,
                height,
                pixels: PixelData::Jpeg {
                    data: data.to_vec(),
                    gray,
                },
            });
        }

        let rgba = decoded.to_rgba8();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        let mut has_alpha = false;
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            if a != 255 {
                has_alpha = true;
            }
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }
        Ok(Self {
            id,
            width,
            height,
            pixels: PixelData::Rgb {
                data: rgb,
                alpha: has_alpha.then_some(alpha),
            },
        })
    }

    /// Decodes a `data:` URI. Returns `None` for anything that is not one.
    pub fn from_data_uri(uri: &str) -> Option<Result<Self, ReportError>> {
        let (mime, data) = parse_data_uri(uri)?;
        log::debug!("decoding inline image mime={mime} bytes={}", data.len());
        Some(Self::from_bytes(&data))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &PixelData {
        &self.pixels
    }
}

fn content_id(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("Im{hex}")
}

fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data_part) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains("base64") {
        let cleaned: String = data_part.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(cleaned)
            .ok()?
    } else {
        data_part.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
pub(crate) fn tiny_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 128]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_with_soft_mask() {
        let image = RasterImage::from_bytes(&tiny_png(3, 2)).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
        match image.pixels() {
            PixelData::Rgb { data, alpha } => {
                assert_eq!(data.len(), 18);
                assert_eq!(alpha.as_ref().map(Vec::len), Some(6));
            }
            other => panic!("unexpected pixels {other:?}"),
        }
        assert!(image.id().starts_with("Im"));
    }

    #[test]
    fn decodes_base64_data_uri() {
        let png = tiny_png(1, 1);
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let image = RasterImage::from_data_uri(&uri).unwrap().unwrap();
        assert_eq!(image.width(), 1);
        assert!(RasterImage::from_data_uri("logo.png").is_none());
    }

    #[test]
    fn same_bytes_share_an_id() {
        let png = tiny_png(2, 2);
        let a = RasterImage::from_bytes(&png).unwrap();
        let b = RasterImage::from_bytes(&png).unwrap();
        assert_eq!(a.id(), b.id());
    }
}
