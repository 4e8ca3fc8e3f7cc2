//! Optimize session: owns the pinned composition across optimize calls.

use crate::display::{display_percentages, PercentSplit};
use crate::overrides::parse_override;
use crate::{MarchSearch, Recommendation};
use muster_alloc::{
    build_formations, build_rally_for, enforce_bounds, optimal_for_weights, relative_damage,
    DamageWeights, FormationPlan,
};
use muster_core::{
    validate_input, validate_tuning, CombatTuning, CompositionFraction, EffectivePower,
    FormationPack, Leftover, PlanInput, RallyAllocation, ValidationError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Errors produced by [`PlannerSession`].
#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Damage weights are all zero or overflow, so no optimum exists.
    #[error("unit powers are zero or overflow; composition optimum is undefined")]
    DegeneratePower,
}

/// Where the target composition of a plan came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    /// Bounded projection of the closed-form optimum.
    Theoretical,
    /// Parsed from the override text of this call.
    Override,
    /// Reused from an earlier override.
    Pinned,
    /// Override text was rejected; the bounded theoretical best is used for
    /// this plan only.
    Fallback,
}

/// Unit counts and totals for the built plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Stock before the rally.
    pub stock_before: u64,
    pub rally_total: u64,
    /// Units the rally asked for but stock could not supply.
    pub rally_shortfall: u64,
    /// Units placed across all formations.
    pub placed: u64,
    /// `stock_before` minus leftover.
    pub stock_used: u64,
}

/// Result of one optimize cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub powers: EffectivePower,
    pub tier_coef: f64,
    pub weights: DamageWeights,
    /// Unbounded closed-form optimum.
    pub theoretical: CompositionFraction,
    /// Bounded composition the rally and formations were built from.
    pub target: CompositionFraction,
    pub source: TargetSource,
    pub percentages: PercentSplit,
    /// Damage of `target` relative to `theoretical`, in (0,1].
    pub efficiency: f64,
    pub rally: RallyAllocation,
    pub packs: Vec<FormationPack>,
    pub leftover: Leftover,
    pub recommendation: Recommendation,
    pub summary: PlanSummary,
}

/// Planner state carried between optimize calls.
///
/// A valid override pins its composition: later calls without override text
/// keep using it until [`PlannerSession::reset_to_theoretical`] is called.
/// A rejected override leaves the pin in place and plans that one call from
/// the theoretical best ([`TargetSource::Fallback`]).
#[derive(Clone, Debug)]
pub struct PlannerSession {
    tuning: CombatTuning,
    last_best: Option<CompositionFraction>,
    user_override: bool,
}

impl PlannerSession {
    pub fn new(tuning: CombatTuning) -> Result<Self, PlanError> {
        validate_tuning(&tuning)?;
        Ok(Self {
            tuning,
            last_best: None,
            user_override: false,
        })
    }

    pub fn tuning(&self) -> &CombatTuning {
        &self.tuning
    }

    /// Target composition of the most recent plan that did not fall back.
    pub fn last_best(&self) -> Option<CompositionFraction> {
        self.last_best
    }

    pub fn is_overridden(&self) -> bool {
        self.user_override
    }

    /// Forget any pinned override; the next plan uses the theoretical best.
    pub fn reset_to_theoretical(&mut self) {
        self.last_best = None;
        self.user_override = false;
    }

    /// Damage weights for `input`, sanitizing stats first.
    pub fn weights(&self, input: &PlanInput) -> (EffectivePower, f64, DamageWeights) {
        let powers = input.stats.sanitized().powers();
        let tier_coef = self.tuning.tier_coefficient(&input.tier);
        let weights = DamageWeights::new(&powers, tier_coef, self.tuning.k_inf);
        (powers, tier_coef, weights)
    }

    /// Run one optimize cycle: choose the target composition, build the
    /// rally and formations, and search for the best formation count.
    pub fn optimize(&mut self, input: &PlanInput) -> Result<Plan, PlanError> {
        let mut checked = input.clone();
        checked.stats = input.stats.sanitized();
        validate_input(&checked)?;

        let (powers, tier_coef, weights) = self.weights(&checked);
        if weights.is_degenerate() {
            return Err(PlanError::DegeneratePower);
        }
        let theoretical = optimal_for_weights(&weights);
        let (target, source) = self.choose_target(input, enforce_bounds(theoretical));
        if source != TargetSource::Fallback {
            self.last_best = Some(target);
        }

        let best_damage = relative_damage(&theoretical, &weights);
        let efficiency = if best_damage > 0.0 {
            relative_damage(&target, &weights) / best_damage
        } else {
            0.0
        };

        let mut stock = input.stock;
        let rally = build_rally_for(input.rally_mode, &target, input.rally_size, &mut stock);
        let FormationPlan { packs, leftover } =
            build_formations(&mut stock, input.formations as usize, input.capacity);

        let search = MarchSearch {
            fractions: target,
            rally_size: input.rally_size,
            capacity: input.capacity,
            stock: input.stock,
            fill_threshold: self.tuning.fill_threshold,
            rally_mode: input.rally_mode,
        };
        let recommendation = search.recommend(input.search_bound());

        let stock_before = input.stock.total();
        let placed: u64 = packs.iter().map(|p| p.total()).sum();
        let summary = PlanSummary {
            stock_before,
            rally_total: rally.total(),
            rally_shortfall: input.rally_size.saturating_sub(rally.total()),
            placed,
            stock_used: stock_before.saturating_sub(leftover.total()),
        };
        if summary.rally_shortfall > 0 {
            warn!(
                requested = input.rally_size,
                built = summary.rally_total,
                "rally limited by stock"
            );
        }
        info!(
            ?source,
            composition = %display_percentages(&target),
            formations = packs.len(),
            recommended = recommendation.formations,
            "plan built"
        );

        Ok(Plan {
            powers,
            tier_coef,
            weights,
            theoretical,
            target,
            source,
            percentages: display_percentages(&target),
            efficiency,
            rally,
            packs,
            leftover,
            recommendation,
            summary,
        })
    }

    fn choose_target(
        &mut self,
        input: &PlanInput,
        bounded_best: CompositionFraction,
    ) -> (CompositionFraction, TargetSource) {
        let text = input
            .composition_override
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        match text {
            Some(text) => match parse_override(text) {
                Ok(f) => {
                    self.user_override = true;
                    (enforce_bounds(f), TargetSource::Override)
                }
                Err(e) => {
                    warn!(%e, text, "composition override rejected; using theoretical best");
                    (bounded_best, TargetSource::Fallback)
                }
            },
            None => match (self.user_override, self.last_best) {
                (true, Some(pinned)) => (pinned, TargetSource::Pinned),
                _ => (bounded_best, TargetSource::Theoretical),
            },
        }
    }
}
