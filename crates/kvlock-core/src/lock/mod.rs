//! Store-backed lock protocol
//!
//! This module provides:
//! - Lock data model (`LockRecord`, `LockOptions`)
//! - Acquire/release API (`LockManager`)

mod manager;
mod model;

pub use manager::*;
pub use model::*;
