// 单条目预加载 - 详情页等只需要预热一条媒体的场景
//
// 创建后固定延迟检查一次加载是否真正推进。

use crate::models::MediaItem;
use crate::services::media::preload::manager::{PreloadManager, PreloadSettings, PreloadState, PreloadTask};
use crate::services::media::preload::probe::MediaProbe;
use crate::services::media::resolver::MediaResolver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 就绪检查延迟
pub const READINESS_CHECK_DELAY: Duration = Duration::from_millis(1500);

/// 就绪检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// 已加载完成
    Progressed,
    /// 仍在排队或加载中
    Stalled,
    /// 加载失败、已被回收或没有可预加载的地址
    Failed,
}

impl Readiness {
    fn from_task(task: Option<&PreloadTask>) -> Self {
        match task.map(|task| task.state) {
            Some(PreloadState::Ready) => Readiness::Progressed,
            Some(PreloadState::Queued) | Some(PreloadState::Loading) => Readiness::Stalled,
            Some(PreloadState::Failed) | None => Readiness::Failed,
        }
    }
}

/// 单条目预加载
///
/// 丢弃时取消预加载任务与就绪检查。
pub struct SinglePreload<P: MediaProbe> {
    manager: Arc<PreloadManager<P>>,
    item_id: String,
    readiness: watch::Receiver<Option<Readiness>>,
    check: JoinHandle<()>,
}

impl<P: MediaProbe> SinglePreload<P> {
    /// 开始预加载
    pub fn start(resolver: Arc<MediaResolver>, probe: Arc<P>, item: &MediaItem) -> Self {
        Self::with_settings(resolver, probe, item, PreloadSettings::single())
    }

    pub fn with_settings(
        resolver: Arc<MediaResolver>,
        probe: Arc<P>,
        item: &MediaItem,
        settings: PreloadSettings,
    ) -> Self {
        let manager = Arc::new(PreloadManager::new(resolver, probe, settings));
        manager.preload(item);

        let (tx, readiness) = watch::channel(None);
        let check_manager = Arc::clone(&manager);
        let item_id = item.id.clone();
        let check_id = item_id.clone();

        let check = tokio::spawn(async move {
            tokio::time::sleep(READINESS_CHECK_DELAY).await;
            let result = Readiness::from_task(check_manager.task(&check_id).as_ref());
            match result {
                Readiness::Progressed => debug!("单条目预加载已就绪: {}", check_id),
                other => warn!("单条目预加载未就绪: {} ({:?})", check_id, other),
            }
            let _ = tx.send(Some(result));
        });

        Self {
            manager,
            item_id,
            readiness,
            check,
        }
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn task(&self) -> Option<PreloadTask> {
        self.manager.task(&self.item_id)
    }

    /// 就绪检查结果（检查尚未执行时为 `None`）
    pub fn readiness(&self) -> Option<Readiness> {
        *self.readiness.borrow()
    }

    /// 等待就绪检查完成
    pub async fn wait_readiness(&self) -> Readiness {
        let mut rx = self.readiness.clone();
        loop {
            if let Some(result) = *rx.borrow_and_update() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Readiness::Failed;
            }
        }
    }
}

impl<P: MediaProbe> Drop for SinglePreload<P> {
    fn drop(&mut self) {
        self.check.abort();
        self.manager.clear();
    }
}
