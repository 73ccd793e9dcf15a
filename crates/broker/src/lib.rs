//! Redis-backed pub/sub fabric and presence refcounting.
//!
//! One [`Broker`] per process: a multiplexed command connection for publishes
//! and counter updates, plus a dedicated pub/sub connection handed to the
//! gateway's subscriber task. When no broker is configured the hub runs in
//! single-node mode and [`PresenceCounter`] degrades to treating every bind
//! as a presence edge.

pub mod client;
pub mod error;
pub mod presence;

pub use {
    client::Broker,
    error::{Error, Result},
    presence::PresenceCounter,
};
