//! Blitz - A sponsorship marketplace
//!
//! This library connects local businesses with creators and events:
//! listings, applications, matching, messaging and simulated payments.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
