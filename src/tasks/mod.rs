// src/tasks/mod.rs

//! Scheduled work spawned on behalf of the filter session.
//! Currently only the backfill continuation.

pub mod backfill;
