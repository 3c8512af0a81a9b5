//! The radix store: spec.md §2 core A, fully specified in §3 and §4.1.

mod node;
mod store;

pub use node::Destructor;
pub use store::Store;
