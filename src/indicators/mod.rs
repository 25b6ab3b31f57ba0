// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free recurrences, one family per file. Every family that
// carries state across bars takes an explicit seed so the same code serves
// full-history and incremental computation.

pub mod candle_direction;
pub mod diff;
pub mod ema;
pub mod tie_point;

pub use candle_direction::{candle_directions, direction_step, MacdParams};
pub use diff::diffs;
pub use ema::{ema_of_closes, ema_step, smoothing, EmaSeed};
pub use tie_point::{midpoint, tie_points, TiePointState};
