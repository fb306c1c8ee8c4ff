//! Reportgate - Email-Gated Report Downloads
//!
//! This crate implements a small HTTP service that hands out a report
//! download link in exchange for an email address. Each client address may
//! request the link a limited number of times per fixed window; granted
//! downloads are logged and confirmed by mail on a best-effort basis.

pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod mail;
pub mod ratelimit;
