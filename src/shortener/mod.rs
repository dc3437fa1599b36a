//! Short code allocation, resolution and the link model.

mod allocator;
pub mod code;
mod link;

pub use allocator::CodeAllocator;
pub use link::{compose_short_url, ShortLink};
