use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("markup parse error: {0}")]
    Markup(String),
    #[error("no page template available")]
    MissingPageTemplate,
    #[error("block cannot fit on any page: {0}")]
    UnplaceableBlock(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("unknown paper size: {0}")]
    UnknownPaperSize(String),
    #[error("font error: {0}")]
    Font(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
