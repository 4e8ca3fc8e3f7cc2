#![deny(warnings)]

//! Core domain models and invariants for Muster.
//!
//! This crate defines the serializable value types shared by the allocation
//! engine and the planner, the combat model that turns raw attack/lethality
//! bonuses into effective power, and validation helpers for planner inputs.

use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use thiserror::Error;
use tracing::trace;

/// Tolerance used when scaling a fraction to whole units, so that products
/// such as `0.1 * 30` do not round up past the exact integer.
const UNIT_EPS: f64 = 1e-9;

/// The three unit types a march is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// Foot soldiers.
    Infantry,
    /// Mounted units.
    Cavalry,
    /// Ranged units.
    Archers,
}

impl UnitKind {
    /// All kinds in display order.
    pub const ALL: [UnitKind; 3] = [UnitKind::Infantry, UnitKind::Cavalry, UnitKind::Archers];

    /// Order in which deficits are covered and surpluses trimmed.
    pub const FILL_PRIORITY: [UnitKind; 3] =
        [UnitKind::Archers, UnitKind::Cavalry, UnitKind::Infantry];

    /// Short upper-case label, e.g. "INF".
    pub fn label(self) -> &'static str {
        match self {
            UnitKind::Infantry => "INF",
            UnitKind::Cavalry => "CAV",
            UnitKind::Archers => "ARC",
        }
    }
}

/// Integer unit counts per type.
///
/// The same triple models available stock, a rally allocation, a single
/// formation pack and the leftover after packing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Troops {
    /// Infantry count.
    #[serde(default)]
    pub inf: u64,
    /// Cavalry count.
    #[serde(default)]
    pub cav: u64,
    /// Archer count.
    #[serde(default)]
    pub arc: u64,
}

/// Units available for allocation; decremented in place by the builders.
pub type Stock = Troops;
/// Units assigned to the rally.
pub type RallyAllocation = Troops;
/// Units assigned to one formation slot.
pub type FormationPack = Troops;
/// Units left unassigned after packing.
pub type Leftover = Troops;

impl Troops {
    /// The empty triple.
    pub const ZERO: Troops = Troops {
        inf: 0,
        cav: 0,
        arc: 0,
    };

    pub const fn new(inf: u64, cav: u64, arc: u64) -> Self {
        Self { inf, cav, arc }
    }

    /// Sum of all three counts, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.inf.saturating_add(self.cav).saturating_add(self.arc)
    }

    pub fn get(&self, kind: UnitKind) -> u64 {
        match kind {
            UnitKind::Infantry => self.inf,
            UnitKind::Cavalry => self.cav,
            UnitKind::Archers => self.arc,
        }
    }

    pub fn get_mut(&mut self, kind: UnitKind) -> &mut u64 {
        match kind {
            UnitKind::Infantry => &mut self.inf,
            UnitKind::Cavalry => &mut self.cav,
            UnitKind::Archers => &mut self.arc,
        }
    }

    /// Remove up to `wanted` units of `kind`, returning how many were taken.
    pub fn take(&mut self, kind: UnitKind, wanted: u64) -> u64 {
        let slot = self.get_mut(kind);
        let taken = wanted.min(*slot);
        *slot -= taken;
        taken
    }

    /// Component-wise subtraction, `None` if any component would go negative.
    pub fn checked_sub(self, other: Troops) -> Option<Troops> {
        Some(Troops {
            inf: self.inf.checked_sub(other.inf)?,
            cav: self.cav.checked_sub(other.cav)?,
            arc: self.arc.checked_sub(other.arc)?,
        })
    }

    /// Component-wise subtraction clamped at zero.
    pub fn saturating_sub(self, other: Troops) -> Troops {
        Troops {
            inf: self.inf.saturating_sub(other.inf),
            cav: self.cav.saturating_sub(other.cav),
            arc: self.arc.saturating_sub(other.arc),
        }
    }

    /// Component-wise minimum.
    pub fn min(self, other: Troops) -> Troops {
        Troops {
            inf: self.inf.min(other.inf),
            cav: self.cav.min(other.cav),
            arc: self.arc.min(other.arc),
        }
    }
}

impl Add for Troops {
    type Output = Troops;

    fn add(self, rhs: Troops) -> Troops {
        Troops {
            inf: self.inf.saturating_add(rhs.inf),
            cav: self.cav.saturating_add(rhs.cav),
            arc: self.arc.saturating_add(rhs.arc),
        }
    }
}

impl AddAssign for Troops {
    fn add_assign(&mut self, rhs: Troops) {
        *self = *self + rhs;
    }
}

impl Sum for Troops {
    fn sum<I: Iterator<Item = Troops>>(iter: I) -> Troops {
        iter.fold(Troops::ZERO, |acc, t| acc + t)
    }
}

impl<'a> Sum<&'a Troops> for Troops {
    fn sum<I: Iterator<Item = &'a Troops>>(iter: I) -> Troops {
        iter.fold(Troops::ZERO, |acc, t| acc + *t)
    }
}

/// Attack and lethality bonuses of one unit type, in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatPair {
    /// Attack bonus in percent (e.g. 250.0 = +250%).
    #[serde(default)]
    pub attack_pct: f64,
    /// Lethality bonus in percent.
    #[serde(default)]
    pub lethality_pct: f64,
}

impl StatPair {
    pub const fn new(attack_pct: f64, lethality_pct: f64) -> Self {
        Self {
            attack_pct,
            lethality_pct,
        }
    }

    /// Copy with negative or non-finite percentages replaced by zero.
    pub fn sanitized(self) -> Self {
        fn clean(v: f64) -> f64 {
            if v.is_finite() && v > 0.0 {
                v
            } else {
                0.0
            }
        }
        Self {
            attack_pct: clean(self.attack_pct),
            lethality_pct: clean(self.lethality_pct),
        }
    }

    pub fn power(&self) -> f64 {
        effective_power(self.attack_pct, self.lethality_pct)
    }
}

/// Effective power of one unit type: `(1 + atk/100) * (1 + leth/100)`.
///
/// For non-negative bonuses the result is at least 1.
pub fn effective_power(attack_pct: f64, lethality_pct: f64) -> f64 {
    (1.0 + attack_pct / 100.0) * (1.0 + lethality_pct / 100.0)
}

/// Stat pairs for all three unit types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatStats {
    #[serde(default)]
    pub inf: StatPair,
    #[serde(default)]
    pub cav: StatPair,
    #[serde(default)]
    pub arc: StatPair,
}

impl CombatStats {
    pub fn sanitized(self) -> Self {
        Self {
            inf: self.inf.sanitized(),
            cav: self.cav.sanitized(),
            arc: self.arc.sanitized(),
        }
    }

    /// Effective power per unit type.
    pub fn powers(&self) -> EffectivePower {
        EffectivePower {
            inf: self.inf.power(),
            cav: self.cav.power(),
            arc: self.arc.power(),
        }
    }
}

/// Effective power per unit type, derived from [`CombatStats`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectivePower {
    pub inf: f64,
    pub cav: f64,
    pub arc: f64,
}

/// Share of each unit type in a composition.
///
/// Produced triples sum to 1 within floating tolerance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionFraction {
    /// Infantry share.
    pub fin: f64,
    /// Cavalry share.
    pub fcav: f64,
    /// Archer share.
    pub farc: f64,
}

impl CompositionFraction {
    pub const fn new(fin: f64, fcav: f64, farc: f64) -> Self {
        Self { fin, fcav, farc }
    }

    pub fn sum(&self) -> f64 {
        self.fin + self.fcav + self.farc
    }

    pub fn is_finite(&self) -> bool {
        self.fin.is_finite() && self.fcav.is_finite() && self.farc.is_finite()
    }

    pub fn get(&self, kind: UnitKind) -> f64 {
        match kind {
            UnitKind::Infantry => self.fin,
            UnitKind::Cavalry => self.fcav,
            UnitKind::Archers => self.farc,
        }
    }
}

/// Hard percentage bounds on a composition. Archers take the remainder.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionBounds {
    /// Lowest infantry share.
    pub inf_min: f64,
    /// Highest infantry share.
    pub inf_max: f64,
    /// Lowest cavalry share.
    pub cav_min: f64,
}

impl CompositionBounds {
    /// The bounds every march must respect.
    pub const STANDARD: CompositionBounds = CompositionBounds {
        inf_min: 0.075,
        inf_max: 0.10,
        cav_min: 0.10,
    };

    /// Whole-unit infantry floor for a group of `size`.
    pub fn inf_min_units(&self, size: u64) -> u64 {
        units_ceil(self.inf_min, size)
    }

    /// Whole-unit infantry ceiling for a group of `size`.
    pub fn inf_max_units(&self, size: u64) -> u64 {
        units_floor(self.inf_max, size)
    }

    /// Whole-unit cavalry floor for a group of `size`.
    pub fn cav_min_units(&self, size: u64) -> u64 {
        units_ceil(self.cav_min, size)
    }
}

/// `ceil(frac * size)` with a small tolerance against binary rounding noise.
pub fn units_ceil(frac: f64, size: u64) -> u64 {
    let v = frac * size as f64;
    if !(v > 0.0) {
        return 0;
    }
    (v - UNIT_EPS).ceil().max(0.0) as u64
}

/// `floor(frac * size)` with a small tolerance against binary rounding noise.
pub fn units_floor(frac: f64, size: u64) -> u64 {
    let v = frac * size as f64;
    if !(v > 0.0) {
        return 0;
    }
    (v + UNIT_EPS).floor() as u64
}

/// Replace en-dashes with hyphens and upper-case the label.
pub fn normalize_tier(label: &str) -> String {
    label.replace('\u{2013}', "-").to_uppercase()
}

/// Game balance constants feeding the optimizer and the recommender.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatTuning {
    /// Divisor applied to infantry power before optimization.
    pub k_inf: f64,
    /// Tier label (normalized) that selects `low_tier_coef`.
    pub low_tier_token: String,
    /// Archer coefficient for the low tier band.
    pub low_tier_coef: f64,
    /// Archer coefficient for every other tier.
    pub high_tier_coef: f64,
    /// Fill ratio at which a formation counts as full.
    pub fill_threshold: f64,
}

impl Default for CombatTuning {
    fn default() -> Self {
        Self {
            k_inf: 1.40,
            low_tier_token: "T1-T6".to_string(),
            low_tier_coef: 4.4 / 3.0,
            high_tier_coef: 2.78 / 1.40,
            fill_threshold: 0.923,
        }
    }
}

impl CombatTuning {
    /// Archer coefficient for a free-text tier label.
    ///
    /// Unrecognized labels fall through to the high-tier constant.
    pub fn tier_coefficient(&self, tier_label: &str) -> f64 {
        let tier = normalize_tier(tier_label);
        let low = tier == normalize_tier(&self.low_tier_token);
        trace!(%tier, low, "tier coefficient");
        if low {
            self.low_tier_coef
        } else {
            self.high_tier_coef
        }
    }
}

/// How the rally turns a target composition into unit counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RallyMode {
    /// Round and clamp to the composition bounds.
    #[default]
    Bounded,
    /// Largest-remainder apportionment of the raw fractions, no bounds.
    Proportional,
}

/// Everything the planner needs for one optimize cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanInput {
    /// Attack/lethality bonuses.
    #[serde(default)]
    pub stats: CombatStats,
    /// Free-text tier label, e.g. "T1–T6".
    #[serde(default)]
    pub tier: String,
    /// Units available before the rally.
    #[serde(default)]
    pub stock: Stock,
    /// Units the rally should take (0 = no rally).
    #[serde(default)]
    pub rally_size: u64,
    /// Per-formation capacity (>= 1).
    pub capacity: u64,
    /// Number of formations to build (>= 1).
    pub formations: u32,
    /// Upper bound for the formation-count search; defaults to `formations`.
    #[serde(default)]
    pub max_formations: Option<u32>,
    /// Optional composition override such as "10/20/70".
    #[serde(default)]
    pub composition_override: Option<String>,
    #[serde(default)]
    pub rally_mode: RallyMode,
}

impl PlanInput {
    /// Upper bound used by the formation-count search.
    pub fn search_bound(&self) -> u32 {
        self.max_formations.unwrap_or(self.formations)
    }
}

/// Largest formation count accepted for building or for the search bound.
pub const MAX_FORMATIONS: u32 = 1_000;

/// Validation errors for planner inputs and tuning.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Numeric field must be finite.
    #[error("non-finite numeric value in {0}")]
    NonFinite(&'static str),
    /// Formation capacity must be at least 1.
    #[error("formation capacity must be >= 1")]
    ZeroCapacity,
    /// At least one formation must be requested.
    #[error("formation count must be >= 1")]
    ZeroFormations,
    /// Search bound for the recommender must be at least 1.
    #[error("max formation count must be >= 1")]
    ZeroSearchBound,
    /// Formation count or search bound above [`MAX_FORMATIONS`].
    #[error("formation count {0} exceeds the limit of {max}", max = MAX_FORMATIONS)]
    TooManyFormations(u32),
    /// Tuning constant outside its valid range.
    #[error("invalid tuning value: {0}")]
    InvalidTuning(&'static str),
}

/// Validate balance constants.
pub fn validate_tuning(t: &CombatTuning) -> Result<(), ValidationError> {
    if !(t.k_inf.is_finite() && t.k_inf > 0.0) {
        return Err(ValidationError::InvalidTuning("k_inf must be > 0"));
    }
    if !(t.low_tier_coef.is_finite() && t.low_tier_coef >= 0.0)
        || !(t.high_tier_coef.is_finite() && t.high_tier_coef >= 0.0)
    {
        return Err(ValidationError::InvalidTuning(
            "tier coefficients must be >= 0",
        ));
    }
    if !(t.fill_threshold > 0.0 && t.fill_threshold <= 1.0) {
        return Err(ValidationError::InvalidTuning(
            "fill_threshold must be within (0,1]",
        ));
    }
    Ok(())
}

/// Validate a plan input. Stats are expected to be sanitized already.
pub fn validate_input(input: &PlanInput) -> Result<(), ValidationError> {
    let s = &input.stats;
    let pairs = [
        ("infantry stats", s.inf),
        ("cavalry stats", s.cav),
        ("archer stats", s.arc),
    ];
    for (name, pair) in pairs {
        if !(pair.attack_pct.is_finite() && pair.lethality_pct.is_finite()) {
            return Err(ValidationError::NonFinite(name));
        }
    }
    if input.capacity == 0 {
        return Err(ValidationError::ZeroCapacity);
    }
    if input.formations == 0 {
        return Err(ValidationError::ZeroFormations);
    }
    if input.max_formations == Some(0) {
        return Err(ValidationError::ZeroSearchBound);
    }
    for n in [input.formations, input.search_bound()] {
        if n > MAX_FORMATIONS {
            return Err(ValidationError::TooManyFormations(n));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input() -> PlanInput {
        PlanInput {
            stats: CombatStats {
                inf: StatPair::new(300.0, 250.0),
                cav: StatPair::new(320.0, 260.0),
                arc: StatPair::new(310.0, 270.0),
            },
            tier: "T10".to_string(),
            stock: Troops::new(20_000, 40_000, 140_000),
            rally_size: 10_000,
            capacity: 5_000,
            formations: 5,
            max_formations: Some(6),
            composition_override: None,
            rally_mode: RallyMode::Bounded,
        }
    }

    #[test]
    fn power_is_product_of_bonuses() {
        assert!((effective_power(0.0, 0.0) - 1.0).abs() < 1e-12);
        assert!((effective_power(100.0, 50.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn tier_label_normalization() {
        let t = CombatTuning::default();
        assert_eq!(normalize_tier("t1\u{2013}t6"), "T1-T6");
        assert_eq!(t.tier_coefficient("T1\u{2013}T6"), t.low_tier_coef);
        assert_eq!(t.tier_coefficient("t1-t6"), t.low_tier_coef);
        assert_eq!(t.tier_coefficient("T7\u{2013}TG2"), t.high_tier_coef);
        assert_eq!(t.tier_coefficient("garbage"), t.high_tier_coef);
        assert_eq!(t.tier_coefficient(""), t.high_tier_coef);
    }

    #[test]
    fn troops_take_and_sub() {
        let mut s = Troops::new(5, 10, 0);
        assert_eq!(s.take(UnitKind::Infantry, 8), 5);
        assert_eq!(s.take(UnitKind::Cavalry, 3), 3);
        assert_eq!(s, Troops::new(0, 7, 0));
        assert_eq!(Troops::new(1, 1, 1).checked_sub(Troops::new(2, 0, 0)), None);
        assert_eq!(
            Troops::new(1, 1, 1).saturating_sub(Troops::new(2, 0, 0)),
            Troops::new(0, 1, 1)
        );
        let packs = [Troops::new(1, 2, 3), Troops::new(4, 5, 6)];
        assert_eq!(packs.iter().sum::<Troops>(), Troops::new(5, 7, 9));
    }

    #[test]
    fn unit_scaling_ignores_float_noise() {
        assert_eq!(units_ceil(0.1, 30), 3);
        assert_eq!(units_floor(0.1, 30), 3);
        let b = CompositionBounds::STANDARD;
        assert_eq!(b.inf_min_units(100), 8);
        assert_eq!(b.inf_max_units(100), 10);
        assert_eq!(b.cav_min_units(100), 10);
        assert_eq!(b.inf_min_units(0), 0);
    }

    #[test]
    fn sanitize_drops_bad_stats() {
        let s = StatPair::new(f64::NAN, -5.0).sanitized();
        assert_eq!(s, StatPair::new(0.0, 0.0));
        let s = StatPair::new(12.5, f64::INFINITY).sanitized();
        assert_eq!(s, StatPair::new(12.5, 0.0));
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        let ok = input();
        validate_input(&ok).unwrap();
        let mut bad = input();
        bad.capacity = 0;
        assert_eq!(validate_input(&bad), Err(ValidationError::ZeroCapacity));
        let mut bad = input();
        bad.formations = 0;
        assert_eq!(validate_input(&bad), Err(ValidationError::ZeroFormations));
        let mut bad = input();
        bad.max_formations = Some(0);
        assert_eq!(validate_input(&bad), Err(ValidationError::ZeroSearchBound));
        let mut bad = input();
        bad.max_formations = Some(4_000_000_000);
        assert_eq!(
            validate_input(&bad),
            Err(ValidationError::TooManyFormations(4_000_000_000))
        );
        let mut bad = input();
        bad.formations = MAX_FORMATIONS + 1;
        bad.max_formations = None;
        assert_eq!(
            validate_input(&bad),
            Err(ValidationError::TooManyFormations(MAX_FORMATIONS + 1))
        );
        let mut edge = input();
        edge.formations = MAX_FORMATIONS;
        edge.max_formations = Some(MAX_FORMATIONS);
        validate_input(&edge).unwrap();
        let mut bad = input();
        bad.stats.cav.attack_pct = f64::NAN;
        assert_eq!(
            validate_input(&bad),
            Err(ValidationError::NonFinite("cavalry stats"))
        );
    }

    #[test]
    fn tuning_validation() {
        validate_tuning(&CombatTuning::default()).unwrap();
        let t = CombatTuning {
            k_inf: 0.0,
            ..CombatTuning::default()
        };
        assert!(validate_tuning(&t).is_err());
        let t = CombatTuning {
            fill_threshold: 1.5,
            ..CombatTuning::default()
        };
        assert!(validate_tuning(&t).is_err());
    }

    #[test]
    fn scenario_yaml_roundtrip() {
        let yaml = r#"
stats:
  inf: { attack_pct: 300, lethality_pct: 250 }
  cav: { attack_pct: 320 }
tier: "T1–T6"
stock: { inf: 100, cav: 200, arc: 700 }
rally_size: 50
capacity: 300
formations: 3
rally_mode: proportional
"#;
        let p: PlanInput = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.stats.cav.lethality_pct, 0.0);
        assert_eq!(p.stats.arc, StatPair::default());
        assert_eq!(p.stock.total(), 1000);
        assert_eq!(p.rally_mode, RallyMode::Proportional);
        assert_eq!(p.search_bound(), 3);
        let s = serde_json::to_string(&p).unwrap();
        let back: PlanInput = serde_json::from_str(&s).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn tuning_defaults_fill_missing_fields() {
        let t: CombatTuning = serde_yaml::from_str("k_inf: 3.0\n").unwrap();
        assert_eq!(t.k_inf, 3.0);
        assert_eq!(t.low_tier_token, "T1-T6");
        assert_eq!(t.fill_threshold, 0.923);
    }

    proptest! {
        #[test]
        fn power_at_least_one(atk in 0.0f64..5_000.0, leth in 0.0f64..5_000.0) {
            prop_assert!(effective_power(atk, leth) >= 1.0);
        }

        #[test]
        fn scaled_bounds_are_ordered(size in 40u64..1_000_000) {
            let b = CompositionBounds::STANDARD;
            prop_assert!(b.inf_min_units(size) <= b.inf_max_units(size));
            prop_assert!(b.inf_max_units(size) + b.cav_min_units(size) <= size);
        }
    }
}
