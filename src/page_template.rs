use crate::canvas::Canvas;
use crate::doc_context::DocContext;
use crate::frame::Frame;
use crate::types::{Margins, Pt, Rect, Size};
use std::sync::Arc;

pub type OnPageCallback = Arc<dyn Fn(&mut Canvas, &DocContext) + Send + Sync>;

#[derive(Clone)]
pub struct PageTemplate {
    pub name: String,
    pub page_size: Size,
    frames: Vec<Rect>,
    on_page: Option<OnPageCallback>,
}

impl PageTemplate {
    pub fn new(name: impl Into<String>, page_size: Size) -> Self {
        Self {
            name: name.into(),
            page_size,
            frames: Vec::new(),
            on_page: None,
        }
    }

    pub fn with_frame(mut self, rect: Rect) -> Self {
        self.frames.push(rect);
        self
    }

    /// Single frame covering the page minus `margins`.
    pub fn with_margins(self, margins: Margins) -> Self {
        let rect = margins.content_rect(self.page_size);
        self.with_frame(rect)
    }

    pub fn set_on_page<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Canvas, &DocContext) + Send + Sync + 'static,
    {
        self.on_page = Some(Arc::new(callback));
        self
    }

    pub fn on_page(&self) -> Option<&OnPageCallback> {
        self.on_page.as_ref()
    }

    /// Union of the frames, used as the content box handed to decorations.
    pub fn content_rect(&self) -> Rect {
        let Some(first) = self.frames.first() else {
            return Rect {
                x: Pt::ZERO,
                y: Pt::ZERO,
                width: self.page_size.width,
                height: self.page_size.height,
            };
        };
        let mut x0 = first.x;
        let mut y0 = first.y;
        let mut x1 = first.x + first.width;
        let mut y1 = first.top();
        for rect in &self.frames[1..] {
            x0 = x0.min(rect.x);
            y0 = y0.min(rect.y);
            x1 = x1.max(rect.x + rect.width);
            y1 = y1.max(rect.top());
        }
        Rect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    pub fn instantiate_frames(&self) -> Vec<Frame> {
        self.frames.iter().map(|rect| Frame::new(*rect)).collect()
    }
}
