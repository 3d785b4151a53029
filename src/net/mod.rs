//! Network reachability subsystem.

pub mod monitor;

pub use monitor::{AvailabilityMonitor, Subscription};
