//! Spindle Records storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod batch;
pub mod cache;
pub mod config;
pub mod db;
pub mod discogs;
pub mod error;
pub mod models;
pub mod retry;
pub mod routes;
pub mod services;
pub mod state;
pub mod stripe;
