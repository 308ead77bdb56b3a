//! Small filesystem helpers shared by the disk-backed stores.

pub mod fs;

pub use fs::write_atomic;
