pub mod media;

pub use media::{MediaItem, MediaKind, MediaReference};
