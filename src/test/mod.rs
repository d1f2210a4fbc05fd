//! Test doubles shared by the unit tests.

mod runtime;

pub use heap::ForeignHeap;
pub use runtime::{FakeRuntime, Handler};
