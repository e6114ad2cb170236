#![forbid(unsafe_code)]

//! `carta-net`
//!
//! HTTP transport capability for the carta file-source subsystem.
//!
//! The subsystem never talks to the network directly; it consumes the
//! [`Net`] trait, injected at construction time. [`HttpClient`] is the
//! reqwest-backed implementation. Timeout policy is a property of this
//! capability ([`NetOptions`]), not of the file sources that consume it.
//!
//! This crate classifies failures as retryable or terminal
//! ([`NetError::is_retryable`]) but never retries by itself.

mod client;
mod error;
mod traits;
mod types;

pub use crate::{
    client::HttpClient,
    error::{NetError, NetResult},
    traits::{HttpResponse, Net},
    types::{Headers, NetOptions},
};

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    //! Unimock API for the [`Net`](crate::Net) trait, for use by
    //! dependent crates' tests (enable the `mock` feature).
    pub use crate::traits::NetMock;
}
