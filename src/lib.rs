//! # muxtun
//!
//! A TCP tunnel that carries many forwarded connections over one long-lived
//! carrier connection, optionally encrypted.
//!
//! ## Architecture Overview
//!
//! ```text
//!  local apps          client                         server            target
//!  ──────────▶ ┌──────────────────┐   carrier   ┌──────────────────┐ ──────────▶
//!  ──────────▶ │ Relay per conn   │════════════▶│ Relay per stream │ ──────────▶
//!  ──────────▶ │ Session (open)   │  16-byte IV │ Session (accept) │ ──────────▶
//!              │ SecureStream     │  + AES-CFB  │ SecureStream     │
//!              └──────────────────┘             └──────────────────┘
//! ```
//!
//! - [`transport`]: carriers (TCP) and the [`transport::SecureStream`] cipher
//!   wrapper
//! - [`handshake`]: the cleartext IV sent at the start of each carrier
//! - [`session`]: the multiplexer seam and its yamux implementation
//! - [`relay`]: bidirectional copy between two streams
//! - [`client`] / [`server`]: the two lifecycles
//! - [`observe`] / [`metrics`]: event reporting and counters
//!
//! ## Wire format
//!
//! With encryption on, a carrier starts with the client's 16-byte IV in
//! cleartext. Everything after it, in both directions, is the multiplexer's
//! byte stream under AES-256-CFB keyed with SHA-256 of the passphrase, one
//! keystream per direction. With encryption off, the carrier carries the
//! multiplexer's bytes directly.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod metrics;
pub mod observe;
pub mod relay;
pub mod server;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
