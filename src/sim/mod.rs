/// Monthly budget bookkeeping.
pub mod budget;
/// Wall-clock and monotonic time sources.
pub mod clock;
pub mod control;
pub mod engine;
pub mod kpi;
pub mod node;
pub mod peers;
/// Quarter-of-day priority and shed-permission schedules.
pub mod schedule;
pub mod shedder;
pub mod sync;
pub mod types;
