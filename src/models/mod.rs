//! Core data model: bars, pivots, support zones, and signals.

mod bar;
mod pivot;
mod signal;

pub use bar::Bar;
pub use pivot::{Pivot, PivotKind, SupportZone};
pub use signal::{Signal, SignalStatus, SignalType};
