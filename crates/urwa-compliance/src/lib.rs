//! Compliance gate: robots.txt and domain blacklist.
//!
//! Every scrape passes through here before any state is touched. Robots
//! files are fetched once per domain and cached (failures cached shorter,
//! as permissive); the blacklist is an in-memory set checked first.

mod gate;
mod robots;

pub use gate::{ComplianceGate, Decision, DenyReason};
pub use robots::{RobotsManager, RobotsVerdict};
