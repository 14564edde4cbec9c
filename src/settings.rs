use crate::error::ReportError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const HEADER_ENABLED: &str = "pdf.header_enabled";
pub const FOOTER_ENABLED: &str = "pdf.footer_enabled";
pub const LOGO_PATH: &str = "pdf.logo_path";
pub const HTML_IMAGE_RENDERING: &str = "pdf.html_image_rendering";

/// One of the six places a page element can be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    HeaderLeft,
    HeaderCenter,
    HeaderRight,
    FooterLeft,
    FooterCenter,
    FooterRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    Footer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Center,
    Right,
}

impl Slot {
    pub const ALL: [Slot; 6] = [
        Slot::HeaderLeft,
        Slot::HeaderCenter,
        Slot::HeaderRight,
        Slot::FooterLeft,
        Slot::FooterCenter,
        Slot::FooterRight,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Slot::HeaderLeft => "pdf.header_left",
            Slot::HeaderCenter => "pdf.header_center",
            Slot::HeaderRight => "pdf.header_right",
            Slot::FooterLeft => "pdf.footer_left",
            Slot::FooterCenter => "pdf.footer_center",
            Slot::FooterRight => "pdf.footer_right",
        }
    }

    pub fn section(self) -> Section {
        match self {
            Slot::HeaderLeft | Slot::HeaderCenter | Slot::HeaderRight => Section::Header,
            _ => Section::Footer,
        }
    }

    pub fn side(self) -> Side {
        match self {
            Slot::HeaderLeft | Slot::FooterLeft => Side::Left,
            Slot::HeaderCenter | Slot::FooterCenter => Side::Center,
            Slot::HeaderRight | Slot::FooterRight => Side::Right,
        }
    }
}

/// Things a header or footer slot can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageElement {
    Logo,
    Pagination,
    Timestamp,
    Title,
    Description,
}

impl PageElement {
    /// Order in which elements claim space within a section.
    pub const DRAW_ORDER: [PageElement; 5] = [
        PageElement::Logo,
        PageElement::Pagination,
        PageElement::Timestamp,
        PageElement::Title,
        PageElement::Description,
    ];
}

impl FromStr for PageElement {
    type Err = ReportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "logo" => Ok(PageElement::Logo),
            "pagination" => Ok(PageElement::Pagination),
            "timestamp" => Ok(PageElement::Timestamp),
            "title" => Ok(PageElement::Title),
            "description" => Ok(PageElement::Description),
            other => Err(ReportError::InvalidConfiguration(format!(
                "unknown page element {other:?}"
            ))),
        }
    }
}

impl fmt::Display for PageElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageElement::Logo => "logo",
            PageElement::Pagination => "pagination",
            PageElement::Timestamp => "timestamp",
            PageElement::Title => "title",
            PageElement::Description => "description",
        };
        f.write_str(name)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ReportError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        _ => Err(ReportError::InvalidConfiguration(format!(
            "{key} expects a boolean, got {value:?}"
        ))),
    }
}

/// Report-level PDF settings read from flat `pdf.*` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfSettings {
    pub header_enabled: bool,
    pub footer_enabled: bool,
    pub slots: HashMap<Slot, String>,
    pub logo_path: Option<String>,
    pub html_image_rendering: bool,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            header_enabled: false,
            footer_enabled: true,
            slots: HashMap::new(),
            logo_path: None,
            html_image_rendering: true,
        }
    }
}

impl PdfSettings {
    /// Reads settings from a flat key/value map. Unknown keys are ignored;
    /// malformed booleans are rejected.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ReportError> {
        let mut settings = Self::default();
        if let Some(value) = map.get(HEADER_ENABLED) {
            settings.header_enabled = parse_bool(HEADER_ENABLED, value)?;
        }
        if let Some(value) = map.get(FOOTER_ENABLED) {
            settings.footer_enabled = parse_bool(FOOTER_ENABLED, value)?;
        }
        if let Some(value) = map.get(HTML_IMAGE_RENDERING) {
            settings.html_image_rendering = parse_bool(HTML_IMAGE_RENDERING, value)?;
        }
        settings.logo_path = map
            .get(LOGO_PATH)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        for slot in Slot::ALL {
            if let Some(value) = map.get(slot.key()) {
                settings.slots.insert(slot, value.clone());
            }
        }
        Ok(settings)
    }

    pub fn with_slot(mut self, slot: Slot, value: impl Into<String>) -> Self {
        self.slots.insert(slot, value.into());
        self
    }

    fn section_enabled(&self, section: Section) -> bool {
        match section {
            Section::Header => self.header_enabled,
            Section::Footer => self.footer_enabled,
        }
    }

    /// Resolves the slot settings into where each element is drawn.
    ///
    /// Title and description keep at most one slot per section, the first
    /// configured one. When both would be shown in the same section the
    /// description is dropped everywhere.
    pub fn page_elements(&self) -> PageElements {
        let mut placements: Vec<(PageElement, Vec<Slot>)> = Vec::new();
        for slot in Slot::ALL {
            if !self.section_enabled(slot.section()) {
                continue;
            }
            let Some(value) = self.slots.get(&slot) else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() || value.eq_ignore_ascii_case("none") {
                continue;
            }
            for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if name.eq_ignore_ascii_case("none") {
                    continue;
                }
                let element = match name.parse::<PageElement>() {
                    Ok(element) => element,
                    Err(err) => {
                        log::warn!("{}: {err}", slot.key());
                        continue;
                    }
                };
                match placements.iter_mut().find(|(e, _)| *e == element) {
                    Some((_, slots)) => {
                        if !slots.contains(&slot) {
                            slots.push(slot);
                        }
                    }
                    None => placements.push((element, vec![slot])),
                }
            }
        }

        for (element, slots) in placements.iter_mut() {
            if matches!(element, PageElement::Title | PageElement::Description) {
                let mut seen: Vec<Section> = Vec::new();
                slots.retain(|slot| {
                    if seen.contains(&slot.section()) {
                        false
                    } else {
                        seen.push(slot.section());
                        true
                    }
                });
            }
        }

        let mut elements = PageElements { placements };
        let title = elements.slots(PageElement::Title).to_vec();
        let description = elements.slots(PageElement::Description).to_vec();
        let shares_section = title
            .iter()
            .any(|t| description.iter().any(|d| d.section() == t.section()));
        if shares_section {
            log::debug!("title and description share a section, dropping description");
            elements
                .placements
                .retain(|(e, _)| *e != PageElement::Description);
        }
        elements
    }
}

/// Normalized element placement for every page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageElements {
    placements: Vec<(PageElement, Vec<Slot>)>,
}

impl PageElements {
    pub fn slots(&self, element: PageElement) -> &[Slot] {
        self.placements
            .iter()
            .find(|(e, _)| *e == element)
            .map(|(_, slots)| slots.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, element: PageElement) -> bool {
        !self.slots(element).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.iter().all(|(_, slots)| slots.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_show_only_the_footer() {
        let settings = PdfSettings::from_map(&HashMap::new()).unwrap();
        assert!(settings.footer_enabled);
        assert!(!settings.header_enabled);
        assert!(settings.page_elements().is_empty());
    }

    #[test]
    fn disabled_sections_are_ignored() {
        let settings = PdfSettings::from_map(&map(&[
            ("pdf.header_center", "title"),
            ("pdf.footer_right", "pagination"),
        ]))
        .unwrap();
        let elements = settings.page_elements();
        assert!(!elements.contains(PageElement::Title));
        assert_eq!(elements.slots(PageElement::Pagination), &[Slot::FooterRight]);
    }

    #[test]
    fn title_wins_over_description_in_the_same_footer() {
        let settings = PdfSettings::from_map(&map(&[
            ("pdf.footer_left", "title"),
            ("pdf.footer_right", "description"),
        ]))
        .unwrap();
        let elements = settings.page_elements();
        assert_eq!(elements.slots(PageElement::Title), &[Slot::FooterLeft]);
        assert!(!elements.contains(PageElement::Description));
    }

    #[test]
    fn title_wins_over_description_in_one_slot() {
        let settings = PdfSettings::default().with_slot(Slot::FooterCenter, "title,description");
        let elements = settings.page_elements();
        assert_eq!(elements.slots(PageElement::Title), &[Slot::FooterCenter]);
        assert!(elements.slots(PageElement::Description).is_empty());
    }

    #[test]
    fn description_survives_in_another_section() {
        let settings = PdfSettings::from_map(&map(&[
            ("pdf.header_enabled", "yes"),
            ("pdf.header_center", "description"),
            ("pdf.footer_left", "title"),
        ]))
        .unwrap();
        let elements = settings.page_elements();
        assert_eq!(elements.slots(PageElement::Description), &[Slot::HeaderCenter]);
    }

    #[test]
    fn duplicate_titles_keep_the_first_slot() {
        let settings = PdfSettings::from_map(&map(&[
            ("pdf.footer_center", "title, pagination"),
            ("pdf.footer_right", "title"),
        ]))
        .unwrap();
        let elements = settings.page_elements();
        assert_eq!(elements.slots(PageElement::Title), &[Slot::FooterCenter]);
        assert_eq!(elements.slots(PageElement::Pagination), &[Slot::FooterCenter]);
    }

    #[test]
    fn unknown_elements_and_none_are_skipped() {
        let settings = PdfSettings::from_map(&map(&[
            ("pdf.footer_left", "none"),
            ("pdf.footer_center", "sparkles,logo"),
        ]))
        .unwrap();
        let elements = settings.page_elements();
        assert_eq!(elements.slots(PageElement::Logo), &[Slot::FooterCenter]);
        assert!(elements.slots(PageElement::Timestamp).is_empty());
    }

    #[test]
    fn malformed_booleans_are_rejected() {
        let err = PdfSettings::from_map(&map(&[("pdf.footer_enabled", "sometimes")]));
        assert!(matches!(err, Err(ReportError::InvalidConfiguration(_))));
        let ok = PdfSettings::from_map(&map(&[("pdf.footer_enabled", "OFF")])).unwrap();
        assert!(!ok.footer_enabled);
    }
}
