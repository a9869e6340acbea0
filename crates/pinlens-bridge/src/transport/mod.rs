//! Cross-context transport layer.

pub mod link;

pub use link::{Delivery, LinkEndpoint};
