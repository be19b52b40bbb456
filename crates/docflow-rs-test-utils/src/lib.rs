//! Test helpers shared across Docflow crates.

pub mod backends;
pub mod kv;
pub mod payload;

pub use backends::{FailingBackend, backend_matrix};
pub use kv::{FailingKeyValue, FakeKeyValue};
pub use payload::values;
