pub mod diff;
pub mod snapshot;
pub mod timestamp;
