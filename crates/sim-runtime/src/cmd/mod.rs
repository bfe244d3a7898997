mod check;
mod start;

pub use check::{CheckArgs, run_check};
pub use start::{StartArgs, run_start};
