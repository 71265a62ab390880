//! # bulwark-github
//!
//! Outbound HTTP clients for Bulwark: the GitHub REST API and the AI
//! provider messages API, plus credential pre-flight.
//!
//! Clients never retry on their own. Wrap each call in a
//! `bulwark_resilience::Operation` and run it through the invoker.

pub mod ai;
pub mod auth;
mod client;
pub mod headers;

pub use ai::{extract_reply, AiClient, AiReply};
pub use auth::Credentials;
pub use client::GitHubClient;
