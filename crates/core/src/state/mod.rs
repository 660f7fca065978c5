//! Turn state management.
//!
//! This module provides:
//! - Turn seeding and stage entry under the global iteration ceiling
//! - Checkpoint stores keeping session state between turns

pub mod checkpoint;
pub mod turn;

pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore,
};
