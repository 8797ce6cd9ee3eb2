//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod clock;
mod store;
mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{StateStore, StoreError, WindowAdmission, WindowOutcome};
pub use telemetry::{DecisionOutcome, NoopTelemetry, TelemetrySink};
