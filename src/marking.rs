//! Selection of elements for refinement from error indicators.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkingStrategy {
    /// Mark every element whose indicator is at least `θ` times the largest indicator.
    Garu,
    /// Mark the `⌈θ n⌉` elements with the largest indicators.
    Puca,
    /// Mark the smallest set of largest indicators whose sum is at least `θ` times the total
    /// (Dörfler marking).
    Bulk,
}

impl Default for MarkingStrategy {
    fn default() -> Self {
        Self::Bulk
    }
}

/// Marks elements according to `strategy`, with `theta` in `[0, 1]`.
pub fn mark_elements(indicators: &[f64], strategy: MarkingStrategy, theta: f64) -> Vec<bool> {
    let n = indicators.len();
    let mut marked = vec![false; n];
    if n == 0 {
        return marked;
    }
    let theta = theta.clamp(0.0, 1.0);

    match strategy {
        MarkingStrategy::Garu => {
            let max = indicators
                .iter()
                .copied()
                .map(OrderedFloat)
                .max()
                .map(|m| m.0)
                .unwrap_or(0.0);
            let threshold = theta * max;
            for (mark, &indicator) in marked.iter_mut().zip(indicators) {
                *mark = indicator >= threshold;
            }
        }
        MarkingStrategy::Puca => {
            let count = (theta * n as f64).ceil() as usize;
            for i in sorted_descending(indicators).into_iter().take(count) {
                marked[i] = true;
            }
        }
        MarkingStrategy::Bulk => {
            let total: f64 = indicators.iter().sum();
            if total <= 0.0 {
                return marked;
            }
            let target = theta * total;
            let mut accumulated = 0.0;
            for i in sorted_descending(indicators) {
                if accumulated >= target {
                    break;
                }
                marked[i] = true;
                accumulated += indicators[i];
            }
        }
    }
    marked
}

/// Indices sorted by decreasing indicator. Ties keep their original order.
fn sorted_descending(indicators: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..indicators.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(indicators[i])));
    order
}
