//! AnimeciX backend.

pub mod client;
pub mod types;

pub use client::{AnimeCixClient, DEFAULT_BASE_URL};
