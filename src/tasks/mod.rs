//! Background Tasks Module
//!
//! Contains the background work a cache runs for its whole lifetime.
//!
//! # Tasks
//! - Evictor: sweeps expired entries on an interval, or flushes daily

mod evictor;

pub(crate) use evictor::spawn_evictor;
pub use evictor::FLUSH_PERIOD;
