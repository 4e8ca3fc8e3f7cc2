//! Formation packing: spread the post-rally stock across equal-capacity slots.

use muster_core::{CompositionBounds, FormationPack, Leftover, Stock, Troops, UnitKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ordered formation packs plus whatever stock could not be placed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationPlan {
    pub packs: Vec<FormationPack>,
    pub leftover: Leftover,
}

impl FormationPlan {
    /// Units placed across all packs.
    pub fn placed(&self) -> u64 {
        self.packs.iter().map(Troops::total).sum()
    }
}

/// Distribute `supply` one unit per slot per pass, in index order, never
/// exceeding `caps[i]` for slot `i`.
///
/// Computed in closed form: after `L` complete passes every slot holds
/// `min(cap, L)`, and the partial pass `L + 1` goes to the lowest-indexed
/// slots whose cap exceeds `L`. The result equals the one-unit-at-a-time
/// loop, including which slots receive the last partial pass.
pub fn fill_round_robin(supply: u64, caps: &[u64]) -> Vec<u64> {
    if supply == 0 || caps.is_empty() {
        return vec![0; caps.len()];
    }
    let total_cap = caps.iter().fold(0u64, |acc, &c| acc.saturating_add(c));
    if supply >= total_cap {
        return caps.to_vec();
    }

    let filled_at = |level: u64| {
        caps.iter()
            .fold(0u64, |acc, &c| acc.saturating_add(c.min(level)))
    };
    // filled_at(lo) <= supply < filled_at(hi)
    let mut lo = 0u64;
    let mut hi = caps.iter().copied().max().unwrap_or(0);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        if filled_at(mid) <= supply {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let mut rest = supply - filled_at(lo);
    let mut out: Vec<u64> = caps.iter().map(|&c| c.min(lo)).collect();
    for (slot, &cap) in out.iter_mut().zip(caps) {
        if rest == 0 {
            break;
        }
        if cap > lo {
            *slot += 1;
            rest -= 1;
        }
    }
    out
}

/// Round-robin `kind` from `stock` into `packs`, each slot limited by `room`.
fn spread<F>(stock: &mut Stock, packs: &mut [FormationPack], kind: UnitKind, room: F) -> u64
where
    F: Fn(&FormationPack) -> u64,
{
    let caps: Vec<u64> = packs.iter().map(&room).collect();
    let given = fill_round_robin(stock.get(kind), &caps);
    let mut placed = 0u64;
    for (pack, g) in packs.iter_mut().zip(given) {
        *pack.get_mut(kind) += g;
        placed += g;
    }
    stock.take(kind, placed)
}

/// Pack `stock` into `slot_count` formations of `capacity` units each.
///
/// Stages, each drawing from `stock`:
/// 1. reserve the infantry and cavalry minimums slot by slot,
/// 2. round-robin archers into the free capacity,
/// 3. round-robin cavalry into what remains,
/// 4. round-robin infantry, limited per slot to the infantry maximum.
///
/// No pack ever exceeds `capacity`. Unplaced units are returned as leftover
/// and remain in `stock`.
pub fn build_formations(stock: &mut Stock, slot_count: usize, capacity: u64) -> FormationPlan {
    let mut packs = vec![Troops::ZERO; slot_count];
    if slot_count == 0 || capacity == 0 {
        return FormationPlan {
            packs,
            leftover: *stock,
        };
    }
    let bounds = CompositionBounds::STANDARD;
    let inf_reserve = bounds.inf_min_units(capacity);
    let cav_reserve = bounds.cav_min_units(capacity);
    let inf_max = bounds.inf_max_units(capacity);
    let free = |p: &FormationPack| capacity.saturating_sub(p.total());

    for pack in packs.iter_mut() {
        pack.inf = stock.take(UnitKind::Infantry, inf_reserve.min(free(pack)));
        pack.cav = stock.take(UnitKind::Cavalry, cav_reserve.min(free(pack)));
    }
    let reserved: Troops = packs.iter().sum();

    let arc = spread(stock, &mut packs, UnitKind::Archers, free);
    let cav = spread(stock, &mut packs, UnitKind::Cavalry, free);
    let inf = spread(stock, &mut packs, UnitKind::Infantry, |p| {
        free(p).min(inf_max.saturating_sub(p.inf))
    });

    debug!(
        slot_count,
        capacity,
        ?reserved,
        arc,
        cav,
        inf,
        leftover = ?stock,
        "formations packed"
    );
    FormationPlan {
        packs,
        leftover: *stock,
    }
}
