//! Anime stream sources.
//!
//! [`AnimeSource`] is the capability every backend provides; [`AnySource`]
//! selects one at runtime.

pub mod animecix;
pub mod error;
pub mod openanime;
pub mod source;
pub mod traits;

pub use error::SourceError;
pub use source::{AnySource, SourceUrls};
pub use traits::{
    AnimeSource, Episode, EpisodeExtra, EpisodeNumber, Fansub, FansubCatalog, FansubRelease,
    SeasonInfo, Series, SeriesRef, SourceKind, Stream, StreamSet,
};
