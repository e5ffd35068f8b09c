//! CRPT API - Rate-Limited Document Registration Client
//!
//! This crate implements a client for the CRPT document registration API.
//! Outbound calls pass through an [`AdmissionGate`](gate::AdmissionGate), a
//! fixed-window throttle that makes excess callers wait for the next window
//! instead of failing.

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod gate;
