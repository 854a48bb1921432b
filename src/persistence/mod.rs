//! State carried between invocations

pub mod state_store;

pub use state_store::{CycleLock, PersistedStates, StateStore};
