//! Zig-zag trend analysis over pivot sequences.

use serde::{Deserialize, Serialize};

use crate::models::Pivot;

/// Ascending pivot pairs required on each side for an uptrend
/// (3 pairs = 4 consecutive ascending pivots).
pub const REQUIRED_PAIRS: usize = 3;

/// Result of trend analysis, with a reason string suitable for the
/// signal-check payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    /// Both ascending-pair counts reached [`REQUIRED_PAIRS`].
    pub is_uptrend: bool,
    /// Consecutive higher-low pairs at the end of the pivot-low sequence.
    pub higher_lows: usize,
    /// Consecutive higher-high pairs at the end of the pivot-high sequence.
    pub higher_highs: usize,
    /// Human-readable explanation.
    pub reason: String,
}

/// Analyze the pivot sequences for a zig-zag uptrend.
pub fn analyze(lows: &[Pivot], highs: &[Pivot]) -> TrendAnalysis {
    let higher_lows = ascending_suffix_pairs(lows);
    let higher_highs = ascending_suffix_pairs(highs);
    let is_uptrend = higher_lows >= REQUIRED_PAIRS && higher_highs >= REQUIRED_PAIRS;

    let reason = if is_uptrend {
        format!("Uptrend confirmed: {higher_lows} higher lows + {higher_highs} higher highs")
    } else {
        let mut missing = Vec::new();
        if higher_lows < REQUIRED_PAIRS {
            missing.push(format!("higher lows ({higher_lows}/{REQUIRED_PAIRS})"));
        }
        if higher_highs < REQUIRED_PAIRS {
            missing.push(format!("higher highs ({higher_highs}/{REQUIRED_PAIRS})"));
        }
        format!("No uptrend: insufficient {}", missing.join(", "))
    };

    TrendAnalysis {
        is_uptrend,
        higher_lows,
        higher_highs,
        reason,
    }
}

/// Length of the longest strictly ascending suffix, counted in adjacent
/// pairs. `[10, 12, 11, 13, 15]` yields 2 (15 > 13 > 11, broken at 12 > 11).
fn ascending_suffix_pairs(pivots: &[Pivot]) -> usize {
    let mut count = 0;
    for i in (1..pivots.len()).rev() {
        if pivots[i].price > pivots[i - 1].price {
            count += 1;
        } else {
            break;
        }
    }
    count
}
