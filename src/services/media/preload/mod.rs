// 预加载模块
//
// 三种预加载器共享同一个管理器：
// - 信息流（向前 3 条）
// - 快拍（向前 2 条，打开时暂停信息流视频）
// - 单条目（带就绪检查）

pub mod feed;
pub mod manager;
pub mod probe;
pub mod single;
pub mod story;

pub use feed::FeedPreloader;
pub use manager::{PreloadManager, PreloadSettings, PreloadState, PreloadTask};
pub use probe::{EngineFamily, HttpProbe, MediaProbe, PreloadMode};
pub use single::{Readiness, SinglePreload};
pub use story::StoryPreloader;
