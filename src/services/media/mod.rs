// 媒体模块 - 媒体引用解析、缓存与播放协调
//
// 本模块提供信息流客户端的媒体解析层，包括：
// - 媒体引用提取与提供方识别
// - URL 解析（代理 / 直连 / 本地路径 / 占位图）与解析缓存
// - 代理健康追踪（持久化）
// - 单一活动视频的播放协调
// - 有界并发的预加载
// - 定期缓存刷新

pub mod config;
pub mod context;
pub mod error;
pub mod extractor;
pub mod health;
pub mod path;
pub mod playback;
pub mod preload;
pub mod refresh;
pub mod resolver;
pub mod state_store;
pub mod url_detector;
pub mod video_thumbnail;

pub use config::{MediaConfig, PlaceholderConfig, RecordFallback};
pub use context::MediaContext;
pub use error::{MediaError, ProbeError, ResolveError, StoreError};
pub use extractor::ReferenceExtractor;
pub use health::{ProxyHealth, ProxyHealthTracker};
pub use path::MediaPath;
pub use playback::{HandleId, MediaHandle, PlaybackCoordinator};
pub use preload::{
    EngineFamily, FeedPreloader, HttpProbe, MediaProbe, PreloadManager, PreloadMode, PreloadSettings,
    PreloadState, PreloadTask, Readiness, SinglePreload, StoryPreloader,
};
pub use refresh::{CacheRefresher, RefreshReport};
pub use resolver::MediaResolver;
pub use state_store::{JsonFileStore, MemoryStore, StateStore, LAST_REFRESH_KEY, PROXY_HEALTH_KEY};
pub use url_detector::{ProviderKind, UrlDetector};
pub use video_thumbnail::{ContainerFormat, TranscodeTransform, Viewport, ViewportClass};
