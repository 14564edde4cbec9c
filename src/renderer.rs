use crate::bitmap::RasterImage;
use crate::canvas::Document;
use crate::decorations::{Logo, PageDecorator};
use crate::doc_template::DocTemplate;
use crate::error::ReportError;
use crate::flowable::{
    BlockAlign, CondPageBreak, EnsureSpaceBetween, Flowable, ImageFlowable, Paragraph,
    ParagraphStyle, SvgFlowable,
};
use crate::font::FontManager;
use crate::metrics::DocumentMetrics;
use crate::page_template::PageTemplate;
use crate::paper::PaperSize;
use crate::pdf::{PdfInfo, write_pdf};
use crate::settings::PdfSettings;
use crate::svg::render_svg;
use crate::table_builder::{TableBuilder, TableOptions};
use crate::table_data::TableData;
use crate::table_text::TableText;
use crate::types::{INCH, Margins, Size};
use std::path::Path;
use std::sync::Arc;

pub const PAGE_MARGIN: f32 = INCH;
pub const DEFAULT_SPACE_BETWEEN: f32 = 0.5 * INCH;
pub const MIN_HEIGHT_SINGLE_VALUE: f32 = 2.0 * INCH;
const MIN_HEIGHT_TABLE_AND_CHART: f32 = 4.0 * INCH;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What the next visualization on the page is, for page-break reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelKind {
    SingleValue,
    TableOrChart,
}

impl From<&str> for PanelKind {
    /// `"single"` is a single-value panel; every other panel type reserves
    /// table and chart room.
    fn from(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("single") {
            PanelKind::SingleValue
        } else {
            PanelKind::TableOrChart
        }
    }
}

/// Everything a render needs up front. Built once, then handed to
/// [`PdfRenderer::new`].
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub title: String,
    pub description: String,
    pub timestamp: Option<String>,
    pub paper: PaperSize,
    pub settings: PdfSettings,
    pub include_logo: bool,
    pub logo: Option<Vec<u8>>,
    pub fonts: Arc<FontManager>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            timestamp: None,
            paper: PaperSize::default(),
            settings: PdfSettings::default(),
            include_logo: true,
            logo: None,
            fonts: FontManager::shared_default(),
        }
    }
}

impl RendererConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn paper(mut self, paper: PaperSize) -> Self {
        self.paper = paper;
        self
    }

    pub fn settings(mut self, settings: PdfSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn include_logo(mut self, include: bool) -> Self {
        self.include_logo = include;
        self
    }

    /// Custom logo image (PNG or JPEG bytes).
    pub fn logo(mut self, bytes: Vec<u8>) -> Self {
        self.logo = Some(bytes);
        self
    }

    pub fn fonts(mut self, fonts: Arc<FontManager>) -> Self {
        self.fonts = fonts;
        self
    }
}

/// Collects a story of blocks for one report and renders it to PDF.
pub struct PdfRenderer {
    config: RendererConfig,
    story: Vec<Box<dyn Flowable>>,
    page_size: Size,
    min_height_table_and_chart: f32,
}

impl PdfRenderer {
    pub fn new(config: RendererConfig) -> Self {
        let page_size = config.paper.size();
        let min_height_table_and_chart =
            MIN_HEIGHT_TABLE_AND_CHART.min(page_size.height.to_f32() - 2.0 * PAGE_MARGIN - 5.0);
        log::debug!(
            "renderer for {:?} on {} ({}x{})",
            config.title,
            config.paper,
            page_size.width.to_f32(),
            page_size.height.to_f32()
        );
        Self {
            config,
            story: Vec::new(),
            page_size,
            min_height_table_and_chart,
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn block_count(&self) -> usize {
        self.story.len()
    }

    /// Size of the content box inside the page margins.
    pub fn content_size(&self) -> Size {
        Margins::all(PAGE_MARGIN).content_rect(self.page_size).size()
    }

    fn push(&mut self, block: impl Flowable + 'static) {
        self.story.push(Box::new(block));
    }

    /// Starts a new page unless enough room is left for the next visualization.
    /// A single-value panel needs less room than tables and charts.
    pub fn conditional_page_break(&mut self, kinds: &[PanelKind]) {
        let height = self.reserved_height(kinds);
        self.push(CondPageBreak::new(height));
    }

    fn reserved_height(&self, kinds: &[PanelKind]) -> f32 {
        if kinds.contains(&PanelKind::SingleValue) {
            MIN_HEIGHT_SINGLE_VALUE
        } else {
            self.min_height_table_and_chart
        }
    }

    pub fn space_between(&mut self, height: Option<f32>) {
        self.push(EnsureSpaceBetween::new(height.unwrap_or(DEFAULT_SPACE_BETWEEN)));
    }

    pub fn render_text(&mut self, text: &str) {
        let block = Paragraph::new(text, ParagraphStyle::normal(), self.config.fonts.clone());
        self.push(block);
    }

    pub fn render_bullet_text(&mut self, text: &str, bullet: &str) {
        let block = Paragraph::new(text, ParagraphStyle::bullet(bullet), self.config.fonts.clone());
        self.push(block);
    }

    /// Text drawn as-is at the table font size, hard-wrapped to the frame.
    pub fn render_text_no_formatting(&mut self, text: &str) {
        self.push(TableText::new(text, self.config.fonts.clone()));
    }

    /// Adds a table sized to the page content box.
    pub fn render_table(&mut self, data: TableData, mut options: TableOptions) {
        options.table_size = self.content_size();
        let table = TableBuilder::new(data, self.config.fonts.clone(), options).build();
        log::debug!(
            "table {}x{} ({}x{} pt)",
            table.column_count(),
            table.row_count(),
            table.width(),
            table.height()
        );
        self.push(table);
    }

    /// Adds a chart, preceded by its title when there is one. Invalid markup
    /// leaves the story untouched and is returned to the caller.
    pub fn render_svg_string(&mut self, markup: &str, title: Option<&str>) -> Result<(), ReportError> {
        let scene = match render_svg(markup, &self.config.fonts) {
            Ok(scene) => scene,
            Err(err) => {
                log::error!("skipping chart {title:?}: {err}");
                return Err(err);
            }
        };
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            let heading = Paragraph::new(title, ParagraphStyle::title(), self.config.fonts.clone());
            self.push(heading);
        }
        self.push(SvgFlowable::new(scene));
        Ok(())
    }

    /// Adds a raster image. With only one of `width`/`height` the other keeps
    /// the aspect ratio.
    pub fn render_image(
        &mut self,
        bytes: &[u8],
        width: Option<f32>,
        height: Option<f32>,
        align: BlockAlign,
    ) -> Result<(), ReportError> {
        let image = RasterImage::from_bytes(bytes)?;
        self.push(ImageFlowable::new(Arc::new(image), width, height).with_align(align));
        Ok(())
    }

    fn logo(&self) -> Option<Logo> {
        if !self.config.include_logo {
            return None;
        }
        if let Some(bytes) = &self.config.logo {
            match RasterImage::from_bytes(bytes) {
                Ok(image) => return Some(Logo::Image(Arc::new(image))),
                Err(err) => log::warn!("custom logo unusable, using the built-in one: {err}"),
            }
        }
        match Logo::builtin(self.config.paper.logo_scale(), &self.config.fonts) {
            Ok(logo) => Some(logo),
            Err(err) => {
                log::error!("built-in logo failed to render: {err}");
                None
            }
        }
    }

    fn decorator(&self) -> PageDecorator {
        let settings = &self.config.settings;
        let timestamp = self
            .config
            .timestamp
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format(TIMESTAMP_FORMAT).to_string());
        PageDecorator::new(settings.page_elements(), self.config.fonts.clone())
            .with_sections(settings.header_enabled, settings.footer_enabled)
            .with_title(self.config.title.clone())
            .with_description(self.config.description.clone())
            .with_timestamp(timestamp)
            .with_logo(self.logo())
    }

    /// Lays out the story without serializing it.
    pub fn build(self) -> Result<(Document, DocumentMetrics), ReportError> {
        let decorator = Arc::new(self.decorator());
        let template = PageTemplate::new("report", self.page_size)
            .with_margins(Margins::all(PAGE_MARGIN))
            .set_on_page(move |canvas, ctx| decorator.draw(canvas, ctx));
        let mut doc = DocTemplate::new(vec![template]);
        doc.extend(self.story);
        let (document, metrics) = doc.build_with_metrics()?;
        log::info!(
            "laid out {} blocks on {} pages in {:.1} ms",
            metrics.block_count(),
            metrics.page_count(),
            metrics.total_render_ms
        );
        Ok((document, metrics))
    }

    pub fn save(self) -> Result<Vec<u8>, ReportError> {
        let info = PdfInfo {
            title: self.config.title.clone(),
            subject: self.config.description.clone(),
        };
        let fonts = self.config.fonts.clone();
        let (document, _) = self.build()?;
        write_pdf(&document, &fonts, &info)
    }

    pub fn save_to_path(self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let bytes = self.save()?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }
}
