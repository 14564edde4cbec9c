use crate::error::ReportError;
use crate::types::Size;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_LOGO_SCALE: f32 = 0.33;
const SMALL_LOGO_SCALE: f32 = 0.20;

/// Named paper sizes. `-landscape` variants swap width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaperFormat {
    Letter,
    Legal,
    ElevenSeventeen,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
}

/// A paper size plus orientation, as named in report settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PaperSize {
    pub format: PaperFormat,
    pub landscape: bool,
}

impl PaperFormat {
    fn portrait(self) -> Size {
        match self {
            PaperFormat::Letter => Size::from_inches(8.5, 11.0),
            PaperFormat::Legal => Size::from_inches(8.5, 14.0),
            PaperFormat::ElevenSeventeen | PaperFormat::Tabloid => Size::from_inches(11.0, 17.0),
            PaperFormat::Ledger => Size::from_inches(11.0, 17.0).landscape(),
            PaperFormat::A0 => Size::from_mm(841.0, 1189.0),
            PaperFormat::A1 => Size::from_mm(594.0, 841.0),
            PaperFormat::A2 => Size::from_mm(420.0, 594.0),
            PaperFormat::A3 => Size::from_mm(297.0, 420.0),
            PaperFormat::A4 => Size::from_mm(210.0, 297.0),
            PaperFormat::A5 => Size::from_mm(148.0, 210.0),
        }
    }

    fn name(self) -> &'static str {
        match self {
            PaperFormat::Letter => "letter",
            PaperFormat::Legal => "legal",
            PaperFormat::ElevenSeventeen => "eleven-seventeen",
            PaperFormat::Tabloid => "tabloid",
            PaperFormat::Ledger => "ledger",
            PaperFormat::A0 => "a0",
            PaperFormat::A1 => "a1",
            PaperFormat::A2 => "a2",
            PaperFormat::A3 => "a3",
            PaperFormat::A4 => "a4",
            PaperFormat::A5 => "a5",
        }
    }
}

impl PaperSize {
    pub const LETTER: PaperSize = PaperSize {
        format: PaperFormat::Letter,
        landscape: false,
    };

    pub fn size(&self) -> Size {
        let size = self.format.portrait();
        if self.landscape { size.landscape() } else { size }
    }

    /// Scale applied to the built-in logo drawing.
    pub fn logo_scale(&self) -> f32 {
        if self.format == PaperFormat::A5 && !self.landscape {
            SMALL_LOGO_SCALE
        } else {
            DEFAULT_LOGO_SCALE
        }
    }
}

impl Default for PaperSize {
    fn default() -> Self {
        PaperSize::LETTER
    }
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format.name())?;
        if self.landscape {
            f.write_str("-landscape")?;
        }
        Ok(())
    }
}

impl FromStr for PaperSize {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = value.trim().to_ascii_lowercase();
        let (base, landscape) = match name.strip_suffix("-landscape") {
            Some(base) => (base, true),
            None => (name.as_str(), false),
        };
        let format = match base {
            "letter" => PaperFormat::Letter,
            "legal" => PaperFormat::Legal,
            "eleven-seventeen" => PaperFormat::ElevenSeventeen,
            "tabloid" => PaperFormat::Tabloid,
            "ledger" => PaperFormat::Ledger,
            "a0" => PaperFormat::A0,
            "a1" => PaperFormat::A1,
            "a2" => PaperFormat::A2,
            "a3" => PaperFormat::A3,
            "a4" => PaperFormat::A4,
            "a5" => PaperFormat::A5,
            _ => return Err(ReportError::UnknownPaperSize(value.to_string())),
        };
        Ok(PaperSize { format, landscape })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_orientation() {
        let paper: PaperSize = "A4-Landscape".parse().unwrap();
        assert_eq!(paper.format, PaperFormat::A4);
        assert!(paper.landscape);
        let size = paper.size();
        assert!(size.width > size.height);
        assert_eq!(paper.to_string(), "a4-landscape");
    }

    #[test]
    fn letter_is_eight_and_a_half_by_eleven() {
        let size = PaperSize::default().size();
        assert_eq!(size.width.to_f32(), 612.0);
        assert_eq!(size.height.to_f32(), 792.0);
    }

    #[test]
    fn ledger_is_tabloid_turned() {
        let tabloid: PaperSize = "tabloid".parse().unwrap();
        let ledger: PaperSize = "ledger".parse().unwrap();
        assert_eq!(tabloid.size().width, ledger.size().height);
        let turned: PaperSize = "ledger-landscape".parse().unwrap();
        assert_eq!(turned.size(), ledger.size());
    }

    #[test]
    fn only_portrait_a5_shrinks_the_logo() {
        let a5: PaperSize = "a5".parse().unwrap();
        let a5_wide: PaperSize = "a5-landscape".parse().unwrap();
        assert_eq!(a5.logo_scale(), 0.20);
        assert_eq!(a5_wide.logo_scale(), DEFAULT_LOGO_SCALE);
    }

    #[test]
    fn unknown_names_are_errors() {
        assert!(matches!(
            "b5".parse::<PaperSize>(),
            Err(ReportError::UnknownPaperSize(name)) if name == "b5"
        ));
    }
}
