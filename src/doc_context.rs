use crate::types::{Rect, Size};

/// What page decorations know about the page being started.
#[derive(Debug, Clone)]
pub struct DocContext {
    pub page_number: usize,
    pub template_name: String,
    pub page_size: Size,
    pub content: Rect,
}

impl DocContext {
    pub fn new(page_number: usize, template_name: impl Into<String>, page_size: Size, content: Rect) -> Self {
        Self {
            page_number,
            template_name: template_name.into(),
            page_size,
            content,
        }
    }
}
