//! Column width allocation under a hard width budget.
//!
//! Widths are settled in four passes. Each pass only touches columns that an
//! earlier pass left unfixed, so the order of the passes matters:
//!
//! 1. simple proportional (all-or-nothing, every column must reach its max),
//! 2. max-width pass against the fair share, repeated until nothing changes,
//! 3. lenient proportional (may go below max, never below min),
//! 4. remainder split evenly, floored at each column's min.

/// Smallest width handed back for any column, even when the budget is gone.
pub const MIN_COLUMN_WIDTH: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub min_widths: Vec<f32>,
    pub max_widths: Vec<f32>,
    pub widths: Vec<f32>,
}

impl ColumnPlan {
    pub fn total_width(&self) -> f32 {
        self.widths.iter().sum()
    }
}

/// Allocates final widths for `min_widths.len()` columns.
///
/// `padding` is charged once per column on top of its width.
pub fn allocate(min_widths: &[f32], max_widths: &[f32], budget: f32, padding: f32) -> Vec<f32> {
    let mut sizer = ColumnSizer::new(min_widths, max_widths, budget, padding);
    sizer.run();
    sizer.finish()
}

pub fn plan(min_widths: &[f32], max_widths: &[f32], budget: f32, padding: f32) -> ColumnPlan {
    ColumnPlan {
        min_widths: min_widths.to_vec(),
        max_widths: max_widths.to_vec(),
        widths: allocate(min_widths, max_widths, budget, padding),
    }
}

struct ColumnSizer<'a> {
    min_widths: &'a [f32],
    max_widths: &'a [f32],
    budget: f32,
    padding: f32,
    widths: Vec<Option<f32>>,
}

impl<'a> ColumnSizer<'a> {
    fn new(min_widths: &'a [f32], max_widths: &'a [f32], budget: f32, padding: f32) -> Self {
        if min_widths.len() != max_widths.len() {
            log::warn!(
                "column sizer: {} min widths vs {} max widths; extra entries ignored",
                min_widths.len(),
                max_widths.len()
            );
        }
        let count = min_widths.len().min(max_widths.len());
        Self {
            min_widths: &min_widths[..count],
            max_widths: &max_widths[..count],
            budget: if budget.is_finite() { budget } else { 0.0 },
            padding: if padding.is_finite() { padding } else { 0.0 },
            widths: vec![None; count],
        }
    }

    fn run(&mut self) {
        if self.unfixed_count() > 1 {
            self.allocate_proportional(false);
        }
        if self.unfixed_count() > 1 {
            self.allocate_by_max();
        }
        if self.unfixed_count() > 1 {
            self.allocate_proportional(true);
        }
        if self.unfixed_count() > 0 {
            self.allocate_remaining();
        }
        log::debug!("column sizer: budget={} widths={:?}", self.budget, self.widths);
    }

    fn finish(self) -> Vec<f32> {
        self.widths
            .into_iter()
            .map(|w| w.unwrap_or(0.0).max(MIN_COLUMN_WIDTH))
            .collect()
    }

    fn unfixed_count(&self) -> usize {
        self.widths.iter().filter(|w| w.is_none()).count()
    }

    fn available(&self) -> f32 {
        let fixed: f32 = self.widths.iter().flatten().sum();
        let padding = self.widths.len() as f32 * self.padding;
        (self.budget - padding - fixed).max(0.0)
    }

    fn fair_share(&self) -> f32 {
        match self.unfixed_count() {
            0 => 0.0,
            n => self.available() / n as f32,
        }
    }

    fn allocate_proportional(&mut self, allow_less_than_max: bool) {
        let available = self.available();
        let total_max: f32 = self
            .widths
            .iter()
            .zip(self.max_widths)
            .filter(|(w, _)| w.is_none())
            .map(|(_, max)| *max)
            .sum();

        let mut next = self.widths.clone();
        for (idx, slot) in next.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let share = if total_max > 0.0 {
                self.max_widths[idx] / total_max * available
            } else {
                0.0
            };
            if !allow_less_than_max && self.max_widths[idx] > share {
                return;
            }
            *slot = Some(share.max(self.min_widths[idx]));
        }
        self.widths = next;
    }

    fn allocate_by_max(&mut self) {
        let mut fixed_any = true;
        while fixed_any && self.unfixed_count() > 0 {
            fixed_any = false;
            let fair = self.fair_share();
            for idx in 0..self.widths.len() {
                if self.widths[idx].is_none() && self.max_widths[idx] <= fair {
                    self.widths[idx] = Some(self.max_widths[idx].max(self.min_widths[idx]));
                    fixed_any = true;
                }
            }
        }
    }

    fn allocate_remaining(&mut self) {
        let fair = self.fair_share();
        for idx in 0..self.widths.len() {
            if self.widths[idx].is_none() {
                self.widths[idx] = Some(fair.max(self.min_widths[idx]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(actual: &[f32], expected: &[f32]) -> bool {
        actual.len() == expected.len()
            && actual
                .iter()
                .zip(expected)
                .all(|(a, b)| (a - b).abs() < 1e-3)
    }

    #[test]
    fn everything_fits_at_max() {
        let widths = allocate(&[10.0, 10.0, 10.0], &[100.0, 100.0, 100.0], 300.0, 0.0);
        assert!(close(&widths, &[100.0, 100.0, 100.0]), "{widths:?}");
    }

    #[test]
    fn narrow_columns_fixed_at_max_and_wide_one_gets_rest() {
        let widths = allocate(&[0.0, 0.0, 0.0], &[500.0, 10.0, 10.0], 60.0, 0.0);
        assert!(close(&widths, &[40.0, 10.0, 10.0]), "{widths:?}");
    }

    #[test]
    fn lenient_pass_respects_minimums() {
        // Neither column fits at max, so the proportional share wins but
        // never drops below the required width.
        let widths = allocate(&[50.0, 5.0], &[300.0, 100.0], 120.0, 0.0);
        assert!(close(&widths, &[90.0, 30.0]), "{widths:?}");
        let widths = allocate(&[100.0, 5.0], &[300.0, 100.0], 120.0, 0.0);
        assert!(close(&widths, &[100.0, 30.0]), "{widths:?}");
    }

    #[test]
    fn padding_is_charged_per_column() {
        let widths = allocate(&[0.0, 0.0], &[100.0, 100.0], 208.0, 4.0);
        assert!(close(&widths, &[100.0, 100.0]), "{widths:?}");
        let total: f32 = widths.iter().sum::<f32>() + 2.0 * 4.0;
        assert!(total <= 208.0 + 1e-3);
    }

    #[test]
    fn starved_budget_clamps_to_floor() {
        let widths = allocate(&[0.0, 0.0, 0.0], &[50.0, 50.0, 50.0], -20.0, 4.0);
        assert_eq!(widths, vec![MIN_COLUMN_WIDTH; 3]);
    }

    #[test]
    fn single_column_takes_the_remainder() {
        let widths = allocate(&[10.0], &[1000.0], 200.0, 4.0);
        assert!(close(&widths, &[196.0]), "{widths:?}");
    }

    #[test]
    fn zero_max_widths_do_not_produce_nan() {
        let widths = allocate(&[0.0, 0.0], &[0.0, 0.0], 100.0, 0.0);
        assert!(widths.iter().all(|w| w.is_finite() && *w >= MIN_COLUMN_WIDTH));
    }

    #[test]
    fn proportional_pass_hands_out_the_whole_budget() {
        let plan = plan(&[0.0, 0.0], &[20.0, 30.0], 100.0, 0.0);
        assert!(close(&plan.widths, &[40.0, 60.0]), "{:?}", plan.widths);
        assert!((plan.total_width() - 100.0).abs() < 1e-3);
    }
}
