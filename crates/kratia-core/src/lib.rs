//! Core types and trait definitions for Kratia's governance layer.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The engine, storage backends and the HTTP surface all depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod eligibility;
pub mod error;
pub mod forum;
pub mod member;
pub mod notification;
pub mod settings;
pub mod store;
pub mod votation;

pub use error::{Error, ErrorKind, Result};
