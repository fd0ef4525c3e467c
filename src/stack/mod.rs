//! Protocol stack implementations.
//!
//! Concrete implementations of the domain-level `ProtocolStack` seam. The
//! production stack is supplied by the hosting process; the in-memory stack
//! here is the reference used by tests and demos.

mod memory;

pub use memory::{create_memory_stack, group_created_for, spawn_loopback, MemoryOutbox};
