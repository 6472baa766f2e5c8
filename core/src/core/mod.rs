//! Cross-cutting primitives: quantity conventions, wall-clock helpers and
//! cooperative cancellation.

pub mod cancel;
pub mod time;
pub mod units;
