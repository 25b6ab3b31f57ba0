pub mod bar_source;
pub mod grouper;

pub use bar_source::{BarSource, MemoryBarSource};
pub use grouper::{bucket_secs, bucket_start, group_bars};
