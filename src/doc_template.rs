use crate::canvas::{Canvas, Document};
use crate::doc_context::DocContext;
use crate::error::ReportError;
use crate::flowable::Flowable;
use crate::frame::{AddResult, Frame};
use crate::metrics::{DocumentMetrics, PageMetrics};
use crate::page_template::PageTemplate;
use std::collections::VecDeque;
use std::time::Instant;

/// Splits that place nothing in a row before the story is declared stuck.
const MAX_STALLED_SPLITS: usize = 64;

/// Page n uses template n-1; the last template repeats.
fn select_template(page_templates: &[PageTemplate], page_number: usize) -> &PageTemplate {
    let idx = page_number.saturating_sub(1).min(page_templates.len() - 1);
    &page_templates[idx]
}

struct PageState<'a> {
    templates: &'a [PageTemplate],
    canvas: Canvas,
    page_number: usize,
    frames: Vec<Frame>,
    frame_index: usize,
    blocks: usize,
    started: Instant,
    metrics: DocumentMetrics,
}

impl<'a> PageState<'a> {
    fn start(templates: &'a [PageTemplate]) -> Self {
        let template = select_template(templates, 1);
        let mut state = Self {
            templates,
            canvas: Canvas::new(template.page_size),
            page_number: 1,
            frames: Vec::new(),
            frame_index: 0,
            blocks: 0,
            started: Instant::now(),
            metrics: DocumentMetrics::default(),
        };
        state.begin_page();
        state
    }

    fn begin_page(&mut self) {
        let template = select_template(self.templates, self.page_number);
        self.frames = template.instantiate_frames();
        self.frame_index = 0;
        self.blocks = 0;
        self.started = Instant::now();
        if let Some(callback) = template.on_page() {
            let context = DocContext::new(
                self.page_number,
                &template.name,
                template.page_size,
                template.content_rect(),
            );
            callback(&mut self.canvas, &context);
        }
    }

    fn finish_page(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.total_render_ms += elapsed;
        self.metrics.pages.push(PageMetrics {
            page_number: self.page_number,
            render_ms: elapsed,
            command_count: self.canvas.current_command_count(),
            block_count: self.blocks,
        });
        self.canvas.show_page();
    }

    fn next_frame(&mut self, reason: &str) {
        self.frame_index += 1;
        if self.frame_index < self.frames.len() {
            log::debug!("page {}: frame break ({reason})", self.page_number);
            return;
        }
        log::debug!(
            "page break {} -> {} ({reason})",
            self.page_number,
            self.page_number + 1
        );
        self.finish_page();
        self.page_number += 1;
        self.begin_page();
    }
}

/// Lays a story of blocks out over pages cut from page templates.
pub struct DocTemplate {
    page_templates: Vec<PageTemplate>,
    story: Vec<Box<dyn Flowable>>,
}

impl DocTemplate {
    pub fn new(page_templates: Vec<PageTemplate>) -> Self {
        Self {
            page_templates,
            story: Vec::new(),
        }
    }

    pub fn add_flowable(&mut self, flowable: Box<dyn Flowable>) {
        self.story.push(flowable);
    }

    pub fn extend<I>(&mut self, flowables: I)
    where
        I: IntoIterator<Item = Box<dyn Flowable>>,
    {
        self.story.extend(flowables);
    }

    pub fn build(self) -> Result<Document, ReportError> {
        Ok(self.build_with_metrics()?.0)
    }

    pub fn build_with_metrics(self) -> Result<(Document, DocumentMetrics), ReportError> {
        if self.page_templates.is_empty() {
            return Err(ReportError::MissingPageTemplate);
        }
        if self
            .page_templates
            .iter()
            .any(|t| t.instantiate_frames().is_empty())
        {
            return Err(ReportError::MissingPageTemplate);
        }

        let mut state = PageState::start(&self.page_templates);
        let mut story: VecDeque<Box<dyn Flowable>> = self.story.into_iter().collect();
        let mut stalled_splits = 0usize;

        while let Some(current) = story.pop_front() {
            let name = current.debug_name();
            let frame = &mut state.frames[state.frame_index];
            let frame_was_empty = frame.is_empty();
            match frame.add(current, &mut state.canvas) {
                AddResult::Placed => {
                    state.blocks += 1;
                    stalled_splits = 0;
                }
                AddResult::FrameBreak => {
                    stalled_splits = 0;
                    state.next_frame("requested");
                }
                AddResult::Split(parts) => {
                    stalled_splits += 1;
                    if stalled_splits > MAX_STALLED_SPLITS {
                        return Err(ReportError::UnplaceableBlock(format!(
                            "{name} keeps splitting without placing anything"
                        )));
                    }
                    log::debug!("page {}: split {name} into {} parts", state.page_number, parts.len());
                    for part in parts.into_iter().rev() {
                        story.push_front(part);
                    }
                }
                AddResult::Overflow(block) => {
                    if frame_was_empty {
                        // Frame::add forces blocks into empty frames, so this
                        // only happens when a frame has no room at all.
                        return Err(ReportError::UnplaceableBlock(name.to_string()));
                    }
                    story.push_front(block);
                    state.next_frame("overflow");
                }
            }
        }

        state.finish_page();
        let metrics = state.metrics;
        Ok((state.canvas.finish_without_show(), metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowable::{PageBreak, Paragraph, ParagraphStyle, Spacer};
    use crate::font::FontManager;
    use crate::types::{Margins, Size};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn template() -> PageTemplate {
        PageTemplate::new("page", Size::new(200.0, 200.0)).with_margins(Margins::all(20.0))
    }

    #[test]
    fn missing_templates_are_an_error() {
        let doc = DocTemplate::new(Vec::new());
        assert!(matches!(doc.build(), Err(ReportError::MissingPageTemplate)));
    }

    #[test]
    fn page_breaks_start_new_pages_but_not_at_the_top() {
        let fonts = FontManager::shared_default();
        let mut doc = DocTemplate::new(vec![template()]);
        doc.add_flowable(Box::new(PageBreak));
        doc.add_flowable(Box::new(Paragraph::new("one", ParagraphStyle::normal(), fonts.clone())));
        doc.add_flowable(Box::new(PageBreak));
        doc.add_flowable(Box::new(Paragraph::new("two", ParagraphStyle::normal(), fonts)));
        let document = doc.build().unwrap();
        assert_eq!(document.pages.len(), 2);
    }

    #[test]
    fn overflow_moves_blocks_to_the_next_page() {
        // Five unsplittable 40pt blocks against a 160pt frame.
        let mut doc = DocTemplate::new(vec![template()]);
        for _ in 0..5 {
            doc.add_flowable(Box::new(crate::table_text::TableText::new(
                "a\nb\nc\nd\ne",
                FontManager::shared_default(),
            )));
        }
        let (_, metrics) = doc.build_with_metrics().unwrap();
        assert_eq!(metrics.page_count(), 2);
        assert_eq!(metrics.pages[0].block_count, 4);
    }

    #[test]
    fn long_paragraphs_split_across_pages() {
        let text = (0..40).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let mut doc = DocTemplate::new(vec![template()]);
        doc.add_flowable(Box::new(Paragraph::new(
            text,
            ParagraphStyle::normal(),
            FontManager::shared_default(),
        )));
        // 160pt frames hold 13 lines of 12pt leading.
        let (document, metrics) = doc.build_with_metrics().unwrap();
        assert_eq!(document.pages.len(), 4);
        assert_eq!(metrics.block_count(), 4);
    }

    #[test]
    fn on_page_runs_once_per_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let template = template().set_on_page(move |_, ctx| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(ctx.content.width.to_f32(), 160.0);
        });
        let mut doc = DocTemplate::new(vec![template]);
        doc.add_flowable(Box::new(Spacer::new(10.0)));
        doc.add_flowable(Box::new(PageBreak));
        doc.add_flowable(Box::new(Spacer::new(10.0)));
        doc.build().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
