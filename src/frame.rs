use crate::canvas::Canvas;
use crate::flowable::{Flowable, SpaceRequest};
use crate::types::{Pt, Rect};

pub enum AddResult {
    Placed,
    /// The block was divided; the parts go back to the front of the story.
    Split(Vec<Box<dyn Flowable>>),
    /// Nothing fits here; retry the block in the next frame.
    Overflow(Box<dyn Flowable>),
    /// The block asked for a new frame and has been consumed.
    FrameBreak,
}

/// Fills a rectangle top-down. `cursor_y` is the height used so far.
pub struct Frame {
    rect: Rect,
    cursor_y: Pt,
}

impl Frame {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            cursor_y: Pt::ZERO,
        }
    }

    pub fn remaining_height(&self) -> Pt {
        (self.rect.height - self.cursor_y).max(Pt::ZERO)
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn is_empty(&self) -> bool {
        self.cursor_y <= Pt::ZERO
    }

    pub fn add(&mut self, flowable: Box<dyn Flowable>, canvas: &mut Canvas) -> AddResult {
        let avail_width = self.rect.width;
        let avail_height = self.remaining_height();

        if let Some(request) = flowable.space_request() {
            return self.apply_space_request(request, avail_height);
        }

        let size = flowable.wrap(avail_width, avail_height);
        if size.width <= avail_width && size.height <= avail_height {
            self.place(flowable.as_ref(), canvas, size.width, size.height);
            return AddResult::Placed;
        }

        if let Some(parts) = flowable.split(avail_width, avail_height) {
            if !parts.is_empty() {
                return AddResult::Split(parts);
            }
            // Nothing left to place, e.g. a spacer at the frame end.
            return AddResult::Placed;
        }

        if self.is_empty() {
            log::warn!(
                "{} ({}x{}pt) is larger than its frame ({}x{}pt); drawn anyway",
                flowable.debug_name(),
                size.width.to_f32(),
                size.height.to_f32(),
                avail_width.to_f32(),
                avail_height.to_f32()
            );
            self.place(flowable.as_ref(), canvas, size.width.min(avail_width), size.height);
            self.cursor_y = self.rect.height;
            return AddResult::Placed;
        }

        AddResult::Overflow(flowable)
    }

    fn apply_space_request(&mut self, request: SpaceRequest, avail_height: Pt) -> AddResult {
        match request {
            SpaceRequest::PageBreak if self.is_empty() => AddResult::Placed,
            SpaceRequest::PageBreak => AddResult::FrameBreak,
            SpaceRequest::Conditional(height) => {
                if avail_height < height && !self.is_empty() {
                    AddResult::FrameBreak
                } else {
                    AddResult::Placed
                }
            }
            SpaceRequest::Between(_) if self.is_empty() => AddResult::Placed,
            SpaceRequest::Between(height) => {
                if avail_height < height {
                    AddResult::FrameBreak
                } else {
                    self.cursor_y += height;
                    AddResult::Placed
                }
            }
        }
    }

    fn place(&mut self, flowable: &dyn Flowable, canvas: &mut Canvas, width: Pt, height: Pt) {
        let x = self.rect.x + flowable.h_align().offset(self.rect.width, width);
        let y = self.rect.top() - self.cursor_y - height;
        flowable.draw(canvas, x, y, self.rect.width, self.remaining_height());
        self.cursor_y += height;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowable::{CondPageBreak, EnsureSpaceBetween, PageBreak, Spacer};
    use crate::types::Size;

    fn frame() -> Frame {
        Frame::new(Rect {
            x: Pt::from_f32(10.0),
            y: Pt::from_f32(10.0),
            width: Pt::from_f32(100.0),
            height: Pt::from_f32(100.0),
        })
    }

    fn canvas() -> Canvas {
        Canvas::new(Size::new(120.0, 120.0))
    }

    #[test]
    fn page_break_at_top_is_a_no_op() {
        let mut frame = frame();
        let mut canvas = canvas();
        assert!(matches!(frame.add(Box::new(PageBreak), &mut canvas), AddResult::Placed));
        frame.add(Box::new(Spacer::new(10.0)), &mut canvas);
        assert!(matches!(frame.add(Box::new(PageBreak), &mut canvas), AddResult::FrameBreak));
    }

    #[test]
    fn conditional_break_checks_remaining_height() {
        let mut frame = frame();
        let mut canvas = canvas();
        frame.add(Box::new(Spacer::new(60.0)), &mut canvas);
        assert!(matches!(frame.add(Box::new(CondPageBreak::new(30.0)), &mut canvas), AddResult::Placed));
        assert!(matches!(
            frame.add(Box::new(CondPageBreak::new(50.0)), &mut canvas),
            AddResult::FrameBreak
        ));
    }

    #[test]
    fn space_between_is_all_or_nothing() {
        let mut frame = frame();
        let mut canvas = canvas();
        frame.add(Box::new(EnsureSpaceBetween::new(36.0)), &mut canvas);
        assert!(frame.is_empty());
        frame.add(Box::new(Spacer::new(50.0)), &mut canvas);
        frame.add(Box::new(EnsureSpaceBetween::new(36.0)), &mut canvas);
        assert_eq!(frame.remaining_height(), Pt::from_f32(14.0));
        assert!(matches!(
            frame.add(Box::new(EnsureSpaceBetween::new(36.0)), &mut canvas),
            AddResult::FrameBreak
        ));
    }

    #[test]
    fn oversized_block_is_forced_into_an_empty_frame() {
        let mut frame = frame();
        let mut canvas = canvas();
        frame.add(Box::new(Spacer::new(150.0)), &mut canvas);
        // Spacers vanish instead of being forced.
        assert!(frame.is_empty());
        frame.add(Box::new(Spacer::new(20.0)), &mut canvas);
        assert!(matches!(frame.add(Box::new(PageBreak), &mut canvas), AddResult::FrameBreak));
    }
}
