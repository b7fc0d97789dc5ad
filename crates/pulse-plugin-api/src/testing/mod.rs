//! Testing utilities for control plane and plugin developers
//!
//! In-memory stand-ins for the supervisor, plugin clients and event sink.

pub mod mocks;

pub use mocks::{MockCollector, MockPublisher, MockSupervisor, Published, RecordingEmitter};
