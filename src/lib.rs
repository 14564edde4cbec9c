mod bitmap;
mod canvas;
mod column_sizer;
mod decorations;
mod doc_context;
mod doc_template;
mod error;
mod flowable;
mod font;
mod frame;
mod metrics;
mod overlay;
mod page_template;
mod paper;
mod pdf;
mod renderer;
mod scene;
mod settings;
mod sparkline;
mod svg;
mod table;
mod table_builder;
mod table_data;
mod table_style;
mod table_text;
mod types;

pub use bitmap::{PixelData, RasterImage};
pub use canvas::{Canvas, Command, Document, Page};
pub use column_sizer::{ColumnPlan, allocate, plan as plan_columns};
pub use decorations::{FittedText, Logo, PageDecorator, ellipsize};
pub use doc_context::DocContext;
pub use doc_template::DocTemplate;
pub use error::ReportError;
pub use flowable::{
    BlockAlign, CondPageBreak, EnsureSpaceBetween, Flowable, ImageFlowable, PageBreak, Paragraph,
    ParagraphStyle, Spacer, SpaceRequest, SvgFlowable, TextAlign,
};
pub use font::{FontFace, FontManager, FontRun, STANDARD_FONT};
pub use frame::{AddResult, Frame};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use overlay::{ColoredCell, DataOverlay, OverlayMode, strict_parse_float};
pub use page_template::{OnPageCallback, PageTemplate};
pub use paper::{PaperFormat, PaperSize};
pub use pdf::{PdfInfo, write_pdf};
pub use renderer::{
    DEFAULT_SPACE_BETWEEN, MIN_HEIGHT_SINGLE_VALUE, PAGE_MARGIN, PanelKind, PdfRenderer,
    RendererConfig,
};
pub use scene::{BoxRect, Clip, ClipRegistry, Group, Matrix, Node, Paint, PathData, PathSeg, Scene, Shape};
pub use settings::{PageElement, PageElements, PdfSettings, Section, Side, Slot};
pub use sparkline::{Sparkline, SparklineKind};
pub use svg::{arc_points, parse_path_data, parse_transform, render_svg};
pub use table::{CellContent, ColumnRange, TableFragment};
pub use table_builder::{FieldFormats, TableBuilder, TableOptions};
pub use table_data::{CellValue, TableData, TimeFormat};
pub use table_style::{
    BackgroundCommand, CellStyle, HAlign, LineCommand, LineOp, StyleCommand, TableStyle, VAlign,
};
pub use table_text::{TABLE_FONT_SIZE, TableText};
pub use types::{Color, INCH, Margins, Pt, Rect, Size};
