//! Closed-form composition optimum and bound projection.
//!
//! Damage of a composition is modelled as `α√fin + β√fcav + γ√farc`.
//! Maximizing it subject to `fin + fcav + farc = 1` gives, via Lagrange
//! multipliers, `f_x ∝ weight_x²`.

use muster_core::{CompositionBounds, CompositionFraction, EffectivePower};
use serde::{Deserialize, Serialize};

/// Weights of the damage model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DamageWeights {
    /// Infantry weight, `power_inf / k_inf`.
    pub alpha: f64,
    /// Cavalry weight, `power_cav`.
    pub beta: f64,
    /// Archer weight, `tier_coef * power_arc`.
    pub gamma: f64,
}

impl DamageWeights {
    pub fn new(power: &EffectivePower, tier_coef: f64, k_inf: f64) -> Self {
        Self {
            alpha: power.inf / k_inf,
            beta: power.cav,
            gamma: tier_coef * power.arc,
        }
    }

    /// True when the squared weights do not sum to a positive finite value,
    /// i.e. the optimum would divide by zero.
    pub fn is_degenerate(&self) -> bool {
        let sum = self.alpha * self.alpha + self.beta * self.beta + self.gamma * self.gamma;
        !(sum.is_finite() && sum > 0.0)
    }
}

/// Damage-maximizing composition for the given powers.
///
/// All-zero powers yield NaN fractions; callers guard with
/// [`DamageWeights::is_degenerate`].
pub fn optimal_fractions(
    power: &EffectivePower,
    tier_coef: f64,
    k_inf: f64,
) -> CompositionFraction {
    optimal_for_weights(&DamageWeights::new(power, tier_coef, k_inf))
}

/// Damage-maximizing composition for precomputed weights.
pub fn optimal_for_weights(w: &DamageWeights) -> CompositionFraction {
    let a2 = w.alpha * w.alpha;
    let b2 = w.beta * w.beta;
    let c2 = w.gamma * w.gamma;
    let sum = a2 + b2 + c2;
    CompositionFraction::new(a2 / sum, b2 / sum, c2 / sum)
}

/// Project a composition onto the standard bounds.
pub fn enforce_bounds(f: CompositionFraction) -> CompositionFraction {
    enforce_bounds_with(f, &CompositionBounds::STANDARD)
}

/// Project a composition onto `bounds`.
///
/// Infantry is clamped first, cavalry is only ever raised to its floor, and
/// archers take whatever is left. If infantry plus cavalry over-subscribe the
/// total, cavalry gives way so that archers land on exactly zero.
pub fn enforce_bounds_with(
    f: CompositionFraction,
    bounds: &CompositionBounds,
) -> CompositionFraction {
    let fin = f.fin.max(bounds.inf_min).min(bounds.inf_max);
    let mut fcav = f.fcav.max(bounds.cav_min);
    let mut farc = 1.0 - fin - fcav;
    if farc < 0.0 {
        fcav = bounds.cav_min.max(1.0 - fin);
        farc = 1.0 - fin - fcav;
        if farc < 0.0 {
            farc = 0.0;
            fcav = 1.0 - fin;
        }
    }

    let sum = fin + fcav + farc;
    if !(sum > 0.0) {
        return CompositionFraction::new(
            bounds.inf_min,
            bounds.cav_min,
            1.0 - bounds.inf_min - bounds.cav_min,
        );
    }
    CompositionFraction::new(fin / sum, fcav / sum, farc / sum)
}

/// Damage of composition `f` under weights `w` (negative shares count as 0).
pub fn relative_damage(f: &CompositionFraction, w: &DamageWeights) -> f64 {
    w.alpha * f.fin.max(0.0).sqrt()
        + w.beta * f.fcav.max(0.0).sqrt()
        + w.gamma * f.farc.max(0.0).sqrt()
}

/// One lattice point of the composition simplex.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimplexSample {
    pub fraction: CompositionFraction,
    /// Absolute damage at this point.
    pub damage: f64,
    /// Damage divided by the best sampled damage, in [0,1].
    pub relative: f64,
}

/// Sample the simplex on a `steps`-lattice (`fin = i/steps`, `fcav = j/steps`).
///
/// Points are ordered by infantry step, then cavalry step.
pub fn sample_simplex(w: &DamageWeights, steps: u32) -> Vec<SimplexSample> {
    let steps = steps.max(1);
    let n = steps as f64;
    let mut out = Vec::with_capacity(((steps as usize + 1) * (steps as usize + 2)) / 2);
    for i in 0..=steps {
        for j in 0..=(steps - i) {
            let fin = i as f64 / n;
            let fcav = j as f64 / n;
            let fraction = CompositionFraction::new(fin, fcav, (1.0 - fin - fcav).max(0.0));
            out.push(SimplexSample {
                fraction,
                damage: relative_damage(&fraction, w),
                relative: 0.0,
            });
        }
    }
    let vmax = out.iter().map(|s| s.damage).fold(0.0f64, f64::max);
    let denom = if vmax > 0.0 { vmax } else { 1.0 };
    for s in &mut out {
        s.relative = s.damage / denom;
    }
    out
}
