//! Registry-feed boundary: the client seam and the acquisition step.

pub mod acquire;
pub mod client;

pub use client::{RegistryFeed, SoapFeedClient};
