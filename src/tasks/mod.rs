//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is open.
//!
//! # Tasks
//! - Expiry Sweep: Purges expired cache entries at the configured interval

mod sweeper;

pub(crate) use sweeper::{spawn_expiry_sweeper, SweeperHandle};
