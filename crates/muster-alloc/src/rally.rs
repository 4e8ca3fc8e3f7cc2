//! Rally allocation: turn a target composition into whole units taken from stock.

use muster_core::{
    CompositionBounds, CompositionFraction, RallyAllocation, RallyMode, Stock, Troops, UnitKind,
};
use tracing::debug;

/// `round(frac * size)`, with NaN and negative products mapped to 0.
fn round_units(frac: f64, size: u64) -> u64 {
    let v = frac * size as f64;
    if !(v > 0.0) {
        return 0;
    }
    v.round().min(size as f64) as u64
}

/// Build the rally using `mode`, consuming `stock`.
pub fn build_rally_for(
    mode: RallyMode,
    fractions: &CompositionFraction,
    rally_size: u64,
    stock: &mut Stock,
) -> RallyAllocation {
    match mode {
        RallyMode::Bounded => build_rally(fractions, rally_size, stock),
        RallyMode::Proportional => build_rally_proportional(fractions, rally_size, stock),
    }
}

/// Build a rally of `rally_size` units under the standard composition bounds.
///
/// The result sums to `rally_size` whenever `stock` holds at least that many
/// units in total, and to the whole stock otherwise. The allocation is
/// subtracted from `stock`.
pub fn build_rally(
    fractions: &CompositionFraction,
    rally_size: u64,
    stock: &mut Stock,
) -> RallyAllocation {
    if rally_size == 0 {
        return Troops::ZERO;
    }
    let bounds = CompositionBounds::STANDARD;
    let i_min = bounds.inf_min_units(rally_size);
    let i_max = bounds.inf_max_units(rally_size);
    let c_min = bounds.cav_min_units(rally_size);

    // Infantry ceiling wins over the floor for tiny rallies where they cross.
    let inf = round_units(fractions.fin, rally_size).max(i_min).min(i_max);
    let mut cav = round_units(fractions.fcav, rally_size).max(c_min);
    // inf <= i_max <= rally_size, so the room left after infantry is exact.
    let after_inf = rally_size - inf;
    if cav > after_inf {
        cav = c_min.max(after_inf);
    }
    let arc = after_inf.saturating_sub(cav);
    let target = Troops::new(inf, cav, arc);

    let mut rally = target.min(*stock);
    let mut spare = stock.saturating_sub(rally);

    let mut deficit = rally_size.saturating_sub(rally.total());
    for kind in UnitKind::FILL_PRIORITY {
        if deficit == 0 {
            break;
        }
        let room = match kind {
            UnitKind::Infantry => i_max.saturating_sub(rally.inf),
            _ => deficit,
        };
        let got = spare.take(kind, deficit.min(room));
        *rally.get_mut(kind) += got;
        deficit -= got;
    }
    if deficit > 0 {
        // Only infantry can remain; exceed its ceiling rather than underfill.
        let got = spare.take(UnitKind::Infantry, deficit);
        rally.inf += got;
        deficit -= got;
    }

    let surplus = rally.total().saturating_sub(rally_size);
    if surplus > 0 {
        trim_surplus(&mut rally, surplus, i_min, c_min);
    }

    *stock = stock.saturating_sub(rally);
    debug!(
        rally_size,
        ?target,
        ?rally,
        shortfall = deficit,
        "rally built"
    );
    rally
}

/// Remove `surplus` units, archers first. Floors are respected on the first
/// pass and released on the second.
fn trim_surplus(rally: &mut Troops, mut surplus: u64, i_min: u64, c_min: u64) {
    let floor = |kind: UnitKind| match kind {
        UnitKind::Infantry => i_min,
        UnitKind::Cavalry => c_min,
        UnitKind::Archers => 0,
    };
    for respect_floors in [true, false] {
        for kind in UnitKind::FILL_PRIORITY {
            if surplus == 0 {
                return;
            }
            let min = if respect_floors { floor(kind) } else { 0 };
            let have = rally.get_mut(kind);
            let cut = have.saturating_sub(min).min(surplus);
            *have -= cut;
            surplus -= cut;
        }
    }
}

/// Split `total` in proportion to `weights`, never exceeding `caps`.
///
/// Largest-remainder rounding keeps every round sum-preserving; whatever a
/// capped type cannot take is redistributed among the types that still have
/// room. Types with zero weight or zero cap receive nothing.
pub fn apportion_with_caps(total: u64, weights: &CompositionFraction, caps: Troops) -> Troops {
    let mut caps = caps;
    let mut out = Troops::ZERO;
    let usable = |k: UnitKind, caps: &Troops| {
        let w = weights.get(k);
        caps.get(k) > 0 && w.is_finite() && w > 0.0
    };
    let mut active: Vec<UnitKind> = UnitKind::ALL
        .into_iter()
        .filter(|&k| usable(k, &caps))
        .collect();
    let mut remaining = total;

    while remaining > 0 && !active.is_empty() {
        let sum_w: f64 = active.iter().map(|&k| weights.get(k)).sum();
        if !(sum_w > 0.0) {
            break;
        }
        let raw: Vec<f64> = active
            .iter()
            .map(|&k| remaining as f64 * weights.get(k) / sum_w)
            .collect();
        let mut base: Vec<u64> = raw.iter().map(|r| r.floor() as u64).collect();
        let assigned = base.iter().fold(0u64, |acc, &b| acc.saturating_add(b));
        // At most one extra unit per type; float noise is picked up next round.
        let rem = remaining.saturating_sub(assigned).min(active.len() as u64);

        let mut order: Vec<usize> = (0..active.len()).collect();
        // Stable sort: equal remainders keep infantry/cavalry/archer order.
        order.sort_by(|&a, &b| {
            let fa = raw[a] - base[a] as f64;
            let fb = raw[b] - base[b] as f64;
            fb.total_cmp(&fa)
        });
        for &idx in order.iter().take(rem as usize) {
            base[idx] = base[idx].saturating_add(1);
        }

        let mut still_active = Vec::with_capacity(active.len());
        for (idx, &k) in active.iter().enumerate() {
            let give = base[idx].min(caps.get(k)).min(remaining);
            *out.get_mut(k) += give;
            *caps.get_mut(k) -= give;
            remaining -= give;
            if usable(k, &caps) {
                still_active.push(k);
            }
        }
        active = still_active;
    }
    out
}

/// Build a rally proportional to the raw `fractions`, without composition
/// bounds, consuming `stock`.
pub fn build_rally_proportional(
    fractions: &CompositionFraction,
    rally_size: u64,
    stock: &mut Stock,
) -> RallyAllocation {
    if rally_size == 0 {
        return Troops::ZERO;
    }
    let rally = apportion_with_caps(rally_size, fractions, *stock);
    *stock = stock.saturating_sub(rally);
    debug!(rally_size, ?rally, "proportional rally built");
    rally
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frac(fin: f64, fcav: f64, farc: f64) -> CompositionFraction {
        CompositionFraction::new(fin, fcav, farc)
    }

    #[test]
    fn rally_matches_target_with_ample_stock() {
        let mut stock = Troops::new(1000, 1000, 1000);
        let rally = build_rally(&frac(0.10, 0.20, 0.70), 100, &mut stock);
        assert_eq!(rally, Troops::new(10, 20, 70));
        assert_eq!(stock, Troops::new(990, 980, 930));
    }

    #[test]
    fn zero_rally_leaves_stock_alone() {
        let mut stock = Troops::new(5, 5, 5);
        assert_eq!(build_rally(&frac(0.1, 0.2, 0.7), 0, &mut stock), Troops::ZERO);
        assert_eq!(stock, Troops::new(5, 5, 5));
    }

    #[test]
    fn infantry_is_clamped_into_band() {
        let mut stock = Troops::new(1000, 1000, 1000);
        let rally = build_rally(&frac(0.5, 0.05, 0.45), 200, &mut stock);
        assert_eq!(rally.inf, 20);
        assert_eq!(rally.cav, 20);
        assert_eq!(rally.arc, 160);

        let mut stock = Troops::new(1000, 1000, 1000);
        let rally = build_rally(&frac(0.0, 0.3, 0.7), 200, &mut stock);
        assert_eq!(rally.inf, 15);
        assert_eq!(rally.total(), 200);
    }

    #[test]
    fn archer_shortage_is_covered_by_cavalry_then_infantry() {
        let mut stock = Troops::new(1000, 1000, 10);
        let rally = build_rally(&frac(0.10, 0.20, 0.70), 100, &mut stock);
        assert_eq!(rally, Troops::new(10, 80, 10));
        assert_eq!(stock, Troops::new(990, 920, 0));
    }

    #[test]
    fn infantry_only_stock_still_fills_rally() {
        let mut stock = Troops::new(500, 0, 0);
        let rally = build_rally(&frac(0.10, 0.20, 0.70), 100, &mut stock);
        assert_eq!(rally, Troops::new(100, 0, 0));
        assert_eq!(stock, Troops::new(400, 0, 0));
    }

    #[test]
    fn short_stock_gives_everything() {
        let mut stock = Troops::new(3, 4, 5);
        let rally = build_rally(&frac(0.10, 0.20, 0.70), 100, &mut stock);
        assert_eq!(rally, Troops::new(3, 4, 5));
        assert_eq!(stock, Troops::ZERO);
    }

    #[test]
    fn tiny_rally_prefers_infantry_ceiling() {
        let mut stock = Troops::new(10, 10, 10);
        let rally = build_rally(&frac(0.10, 0.20, 0.70), 5, &mut stock);
        assert_eq!(rally.inf, 0);
        assert_eq!(rally.total(), 5);
    }

    #[test]
    fn huge_rally_size_takes_whole_stock() {
        let mut stock = Troops::new(10, 10, 10);
        let rally = build_rally(&frac(0.075, 0.925, 0.0), u64::MAX, &mut stock);
        assert_eq!(rally, Troops::new(10, 10, 10));
        assert_eq!(stock, Troops::ZERO);

        let mut stock = Troops::new(u64::MAX / 4, u64::MAX / 4, u64::MAX / 4);
        let rally = build_rally(&frac(0.10, 0.20, 0.70), u64::MAX, &mut stock);
        assert_eq!(rally.total(), 3 * (u64::MAX / 4));
        assert_eq!(rally + stock, Troops::new(u64::MAX / 4, u64::MAX / 4, u64::MAX / 4));
    }

    #[test]
    fn huge_proportional_rally_is_capped_by_stock() {
        let out = apportion_with_caps(u64::MAX, &frac(0.1, 0.2, 0.7), Troops::new(10, 20, 30));
        assert_eq!(out, Troops::new(10, 20, 30));
        let mut stock = Troops::new(5, 0, 7);
        let rally = build_rally_proportional(&frac(0.5, 0.0, 0.5), u64::MAX, &mut stock);
        assert_eq!(rally, Troops::new(5, 0, 7));
        assert_eq!(stock, Troops::ZERO);
    }

    #[test]
    fn trim_respects_floors_first() {
        let mut r = Troops::new(10, 30, 5);
        trim_surplus(&mut r, 20, 8, 10);
        assert_eq!(r, Troops::new(10, 15, 0));
        let mut r = Troops::new(10, 10, 0);
        trim_surplus(&mut r, 5, 8, 10);
        assert_eq!(r, Troops::new(8, 7, 0));
    }

    #[test]
    fn apportion_largest_remainder() {
        let out = apportion_with_caps(
            10,
            &frac(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0),
            Troops::new(100, 100, 100),
        );
        assert_eq!(out.total(), 10);
        // Equal remainders: first type in order gets the extra unit.
        assert_eq!(out, Troops::new(4, 3, 3));
    }

    #[test]
    fn apportion_redistributes_capped_share() {
        let out = apportion_with_caps(100, &frac(0.5, 0.25, 0.25), Troops::new(10, 1000, 1000));
        assert_eq!(out.inf, 10);
        assert_eq!(out.total(), 100);
        assert_eq!(out.cav, 45);
        assert_eq!(out.arc, 45);
    }

    #[test]
    fn apportion_skips_zero_weights() {
        let out = apportion_with_caps(50, &frac(0.0, 1.0, 0.0), Troops::new(100, 20, 100));
        assert_eq!(out, Troops::new(0, 20, 0));
    }

    #[test]
    fn proportional_rally_consumes_stock() {
        let mut stock = Troops::new(100, 100, 100);
        let rally =
            build_rally_for(RallyMode::Proportional, &frac(0.5, 0.3, 0.2), 10, &mut stock);
        assert_eq!(rally, Troops::new(5, 3, 2));
        assert_eq!(stock, Troops::new(95, 97, 98));
    }

    proptest! {
        #[test]
        fn rally_sum_law(
            inf in 0u64..5_000,
            cav in 0u64..5_000,
            arc in 0u64..5_000,
            size in 0u64..12_000,
            fin in 0.0f64..1.0,
            fcav in 0.0f64..1.0,
        ) {
            let before = Troops::new(inf, cav, arc);
            let mut stock = before;
            let farc = (1.0 - fin - fcav).max(0.0);
            let rally = build_rally(&frac(fin, fcav, farc), size, &mut stock);
            prop_assert_eq!(rally.total(), size.min(before.total()));
            prop_assert_eq!(rally + stock, before);
        }

        #[test]
        fn bounded_rally_respects_scaled_bounds(
            size in 40u64..10_000,
            fin in 0.0f64..1.0,
            fcav in 0.0f64..1.0,
        ) {
            let mut stock = Troops::new(size, size, size);
            let farc = (1.0 - fin - fcav).max(0.0);
            let rally = build_rally(&frac(fin, fcav, farc), size, &mut stock);
            let b = CompositionBounds::STANDARD;
            prop_assert_eq!(rally.total(), size);
            prop_assert!(rally.inf >= b.inf_min_units(size));
            prop_assert!(rally.inf <= b.inf_max_units(size));
            prop_assert!(rally.cav >= b.cav_min_units(size));
        }

        #[test]
        fn apportion_never_exceeds_caps(
            total in 0u64..10_000,
            inf in 0u64..4_000,
            cav in 0u64..4_000,
            arc in 0u64..4_000,
            wi in 0.01f64..1.0,
            wc in 0.01f64..1.0,
            wa in 0.01f64..1.0,
        ) {
            let caps = Troops::new(inf, cav, arc);
            let out = apportion_with_caps(total, &frac(wi, wc, wa), caps);
            prop_assert!(out.inf <= inf && out.cav <= cav && out.arc <= arc);
            prop_assert_eq!(out.total(), total.min(caps.total()));
        }
    }
}
