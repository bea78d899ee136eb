//! Core library for arena-cards
//!
//! This crate implements the **Functional Core** of the arena-cards
//! application: pure transformation functions with zero I/O. The companion
//! `arena-cards` binary crate is the Imperative Shell — it owns HTTP, the
//! file system, and terminal output, and calls into this crate for every
//! decision that can be made on data alone.
//!
//! All functions here are deterministic and tested with fixture data — no
//! mocking, no network.
//!
//! # Module Organization
//!
//! - [`arena`]: are.na API models, channel-membership aggregation, block
//!   normalization, and image payload sniffing
//! - [`typst`]: typst string escaping, the markdown-subset content
//!   converter, and the card layout emitter

pub mod arena;
pub mod typst;
