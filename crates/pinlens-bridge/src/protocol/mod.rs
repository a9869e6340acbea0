//! Channel protocol: readiness handshake, request batching, and delivery
//! validation.

pub mod handshake;
pub mod validator;

pub use handshake::{ChannelState, RequestAction, StatsRequester};
pub use validator::validate_delivery;
