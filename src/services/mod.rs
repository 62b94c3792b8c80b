pub mod media;

pub use media::{MediaConfig, MediaContext, MediaError, MediaResolver, PlaybackCoordinator, ProxyHealthTracker};
