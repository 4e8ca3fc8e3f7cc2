#![deny(warnings)]

//! Planner: formation-count search, composition overrides and the
//! optimize session tying the allocation engine together.

pub mod display;
pub mod overrides;
pub mod session;

pub use display::{display_percentages, PercentSplit};
pub use overrides::{parse_override, OverrideError};
pub use session::{Plan, PlanError, PlanSummary, PlannerSession, TargetSource};

use muster_alloc::{build_formations, build_rally_for};
use muster_core::{CompositionFraction, Leftover, RallyMode, Stock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Score and fill statistics for one candidate formation count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Candidate number of formations.
    pub formations: u32,
    /// Occupied units divided by capacity, per slot.
    pub fill_ratios: Vec<f64>,
    pub min_fill: f64,
    pub avg_fill: f64,
    /// Slots whose fill ratio reaches the threshold.
    pub full_slots: u32,
    pub leftover: Leftover,
    pub score: f64,
}

/// Fixed inputs of a formation-count search.
#[derive(Clone, Debug, PartialEq)]
pub struct MarchSearch {
    pub fractions: CompositionFraction,
    pub rally_size: u64,
    pub capacity: u64,
    /// Stock before the rally; every candidate starts from a fresh copy.
    pub stock: Stock,
    pub fill_threshold: f64,
    pub rally_mode: RallyMode,
}

impl MarchSearch {
    /// Build the rally and `formations` packs on a copy of the stock and
    /// score the outcome.
    pub fn evaluate(&self, formations: u32) -> Recommendation {
        let mut stock = self.stock;
        build_rally_for(self.rally_mode, &self.fractions, self.rally_size, &mut stock);
        let plan = build_formations(&mut stock, formations as usize, self.capacity);

        let cap = self.capacity.max(1) as f64;
        let fill_ratios: Vec<f64> = plan.packs.iter().map(|p| p.total() as f64 / cap).collect();
        let min_fill = fill_ratios.iter().copied().fold(f64::INFINITY, f64::min);
        let min_fill = if min_fill.is_finite() { min_fill } else { 0.0 };
        let avg_fill = if fill_ratios.is_empty() {
            0.0
        } else {
            fill_ratios.iter().sum::<f64>() / fill_ratios.len() as f64
        };
        let full_slots = fill_ratios
            .iter()
            .filter(|&&r| r >= self.fill_threshold)
            .count() as u32;
        let score = score(
            full_slots,
            min_fill,
            avg_fill,
            &plan.leftover,
            self.fill_threshold,
        );
        debug!(formations, full_slots, min_fill, avg_fill, score, "candidate scored");
        Recommendation {
            formations,
            fill_ratios,
            min_fill,
            avg_fill,
            full_slots,
            leftover: plan.leftover,
            score,
        }
    }

    /// Best candidate among `1..=max_formations` (at least one candidate is
    /// always examined). Ties go to the smaller count.
    pub fn recommend(&self, max_formations: u32) -> Recommendation {
        let mut best = self.evaluate(1);
        for n in 2..=max_formations {
            let cand = self.evaluate(n);
            if cand.score > best.score {
                best = cand;
            }
        }
        info!(
            formations = best.formations,
            full_slots = best.full_slots,
            min_fill = best.min_fill,
            "recommended formation count"
        );
        best
    }
}

/// Lexicographic-by-magnitude score: full slots dominate, then the worst
/// slot's fill, then average fill, then waste (cavalry waste counts 3x).
pub fn score(
    full_slots: u32,
    min_fill: f64,
    avg_fill: f64,
    leftover: &Leftover,
    fill_threshold: f64,
) -> f64 {
    let waste = leftover.total() as f64 + 3.0 * leftover.cav as f64;
    full_slots as f64 * 1e9 + (min_fill * fill_threshold) * 1e6 + avg_fill * 1e3 - waste
}
