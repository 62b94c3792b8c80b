// 信息流预加载 - 滚动时预热下方的帖子媒体

use crate::models::MediaItem;
use crate::services::media::preload::manager::{PreloadManager, PreloadSettings, PreloadTask};
use crate::services::media::preload::probe::MediaProbe;
use crate::services::media::resolver::MediaResolver;
use std::sync::Arc;

/// 信息流预加载器（默认向前 3 条）
pub struct FeedPreloader<P: MediaProbe> {
    manager: PreloadManager<P>,
}

impl<P: MediaProbe> FeedPreloader<P> {
    pub fn new(resolver: Arc<MediaResolver>, probe: Arc<P>) -> Self {
        Self::with_settings(resolver, probe, PreloadSettings::feed())
    }

    pub fn with_settings(resolver: Arc<MediaResolver>, probe: Arc<P>, settings: PreloadSettings) -> Self {
        Self {
            manager: PreloadManager::new(resolver, probe, settings),
        }
    }

    /// 可见位置变化时调用
    pub fn on_visible(&self, posts: &[MediaItem], visible_index: usize) {
        self.manager.update_window(posts, visible_index);
    }

    pub fn active_tasks(&self) -> Vec<PreloadTask> {
        self.manager.active_tasks()
    }

    pub fn manager(&self) -> &PreloadManager<P> {
        &self.manager
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
