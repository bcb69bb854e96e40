//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `PricePoller`: Polls held symbols, detects moves and fans alerts out

mod price_poller;

pub use price_poller::{CycleReport, PricePoller, PricePollerConfig, ReportHook};
