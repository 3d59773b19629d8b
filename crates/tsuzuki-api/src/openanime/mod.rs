//! OpenAnime backend. Episodes come in several fansub releases.

pub mod client;
pub mod types;

pub use client::{OpenAnimeClient, DEFAULT_BASE_URL};
