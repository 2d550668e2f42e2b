//! REST API client module for the card quest backend.
//!
//! This module provides the `ApiClient` for communicating with the
//! backend's authentication and progress endpoints.
//!
//! Authenticated endpoints use JWT bearer tokens; the client refreshes a
//! stale access token transparently, collapsing concurrent refreshes into
//! a single request.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
