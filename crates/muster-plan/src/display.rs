//! Whole-number percentages for showing a composition.

use muster_core::CompositionFraction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer percentages that always sum to exactly 100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentSplit {
    pub inf: u32,
    pub cav: u32,
    pub arc: u32,
}

impl fmt::Display for PercentSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.inf, self.cav, self.arc)
    }
}

fn whole_percent(frac: f64) -> u32 {
    let v = (frac * 100.0).round();
    if v > 0.0 {
        v.min(100.0) as u32
    } else {
        0
    }
}

/// Round infantry and cavalry, give archers the remainder.
///
/// When the rounded infantry and cavalry overshoot 100, the larger of the
/// two (infantry on a tie) absorbs the excess.
pub fn display_percentages(f: &CompositionFraction) -> PercentSplit {
    let mut inf = whole_percent(f.fin);
    let mut cav = whole_percent(f.fcav);
    if inf + cav > 100 {
        let over = inf + cav - 100;
        if inf >= cav {
            inf -= over;
        } else {
            cav -= over;
        }
    }
    PercentSplit {
        inf,
        cav,
        arc: 100 - inf - cav,
    }
}
