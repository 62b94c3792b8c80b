// 快拍预加载 - 快拍查看器中预热后续快拍
//
// 打开查看器时先暂停信息流中的全部视频，避免两处同时出声。

use crate::models::MediaItem;
use crate::services::media::playback::PlaybackCoordinator;
use crate::services::media::preload::manager::{PreloadManager, PreloadSettings, PreloadTask};
use crate::services::media::preload::probe::MediaProbe;
use crate::services::media::resolver::MediaResolver;
use std::sync::Arc;
use tracing::debug;

/// 快拍预加载器（默认向前 2 条）
pub struct StoryPreloader<P: MediaProbe> {
    manager: PreloadManager<P>,
    coordinator: Arc<PlaybackCoordinator>,
}

impl<P: MediaProbe> StoryPreloader<P> {
    pub fn new(resolver: Arc<MediaResolver>, probe: Arc<P>, coordinator: Arc<PlaybackCoordinator>) -> Self {
        Self::with_settings(resolver, probe, coordinator, PreloadSettings::story())
    }

    pub fn with_settings(
        resolver: Arc<MediaResolver>,
        probe: Arc<P>,
        coordinator: Arc<PlaybackCoordinator>,
        settings: PreloadSettings,
    ) -> Self {
        Self {
            manager: PreloadManager::new(resolver, probe, settings),
            coordinator,
        }
    }

    /// 打开查看器
    ///
    /// 暂停信息流视频并开始预热起始快拍之后的条目，返回被暂停的视频数。
    pub fn open_viewer(&self, stories: &[MediaItem], start: usize) -> usize {
        let paused = self.coordinator.pause_all_feed_videos();
        debug!("打开快拍查看器，起始位置 {}", start);
        self.manager.update_window(stories, start);
        paused
    }

    /// 切换到下一条（或任意一条）快拍
    pub fn advance(&self, stories: &[MediaItem], current: usize) {
        self.manager.update_window(stories, current);
    }

    /// 关闭查看器，回收全部预加载任务
    pub fn close_viewer(&self) {
        self.manager.clear();
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
