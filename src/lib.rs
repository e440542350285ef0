// src/lib.rs

//! Curator library: idempotent sync of curated articles into review tickets.

pub mod error;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod sources;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;
