// 播放协调器 - 保证同一时间只有一个视频在播放
//
// 所有带视频的界面（信息流、快拍、详情弹窗）都通过协调器登记播放，
// 协调器负责在切换当前视频前暂停上一个。
//
// `MediaHandle::pause` 总是在锁外调用，实现方可以在其中回调协调器。

use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// 播放句柄 ID
pub type HandleId = u64;

/// 可播放媒体元素的句柄
pub trait MediaHandle: Send + Sync {
    /// 句柄唯一标识
    fn id(&self) -> HandleId;

    /// 暂停播放
    fn pause(&self);
}

/// 播放协调器
#[derive(Default)]
pub struct PlaybackCoordinator {
    /// 当前播放的句柄
    current: Mutex<Option<Arc<dyn MediaHandle>>>,

    /// 信息流中登记的视频（弱引用，界面卸载后自动失效）
    feed_handles: Mutex<Vec<Weak<dyn MediaHandle>>>,
}

impl PlaybackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设为当前视频
    ///
    /// 如果已有不同的当前视频，先暂停它再记录新的句柄；并发调用时最后调用者胜出。
    pub fn set_current_video(&self, handle: Arc<dyn MediaHandle>) {
        loop {
            let previous = {
                let mut current = match self.current.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let previous = match current.as_ref() {
                    Some(prev) if prev.id() != handle.id() => Some(Arc::clone(prev)),
                    _ => None,
                };
                match previous {
                    Some(previous) => previous,
                    None => {
                        *current = Some(handle);
                        return;
                    }
                }
            };

            debug!("切换当前视频: {} -> {}", previous.id(), handle.id());
            previous.pause();

            let mut current = match self.current.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // 暂停期间没有其他界面抢占，直接记录
            if current.as_ref().map(|h| h.id()) == Some(previous.id()) {
                *current = Some(handle);
                return;
            }
            // 否则继续循环，暂停抢占者
        }
    }

    /// 当前视频
    pub fn current_video(&self) -> Option<Arc<dyn MediaHandle>> {
        self.current.lock().ok().and_then(|current| current.clone())
    }

    /// 暂停当前视频
    ///
    /// 只有调用者本身就是当前视频时才清空当前槽位，
    /// 避免后台界面清掉仍然有效的当前视频。
    pub fn pause_current_video(&self, caller: Option<HandleId>) {
        let handle = {
            let mut current = match self.current.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let handle = current.clone();
            if let (Some(h), Some(caller)) = (handle.as_ref(), caller) {
                if h.id() == caller {
                    *current = None;
                }
            }
            handle
        };

        if let Some(handle) = handle {
            handle.pause();
        }
    }

    /// 界面卸载时释放句柄（不暂停）
    pub fn release(&self, id: HandleId) {
        if let Ok(mut current) = self.current.lock() {
            if current.as_ref().map(|h| h.id()) == Some(id) {
                *current = None;
            }
        }
        self.unregister_feed_video(id);
    }

    /// 登记信息流视频
    pub fn register_feed_video(&self, handle: &Arc<dyn MediaHandle>) {
        if let Ok(mut handles) = self.feed_handles.lock() {
            handles.retain(|h| h.upgrade().map_or(false, |h| h.id() != handle.id()));
            handles.push(Arc::downgrade(handle));
        }
    }

    pub fn unregister_feed_video(&self, id: HandleId) {
        if let Ok(mut handles) = self.feed_handles.lock() {
            handles.retain(|h| h.upgrade().map_or(false, |h| h.id() != id));
        }
    }

    /// 暂停全部信息流视频（打开弹窗或快拍时调用）
    ///
    /// 不论是否为当前视频，逐个暂停所有仍存活的信息流视频，返回暂停的数量。
    pub fn pause_all_feed_videos(&self) -> usize {
        let handles: Vec<Arc<dyn MediaHandle>> = match self.feed_handles.lock() {
            Ok(mut handles) => {
                handles.retain(|h| h.strong_count() > 0);
                handles.iter().filter_map(Weak::upgrade).collect()
            }
            Err(_) => Vec::new(),
        };

        for handle in &handles {
            handle.pause();
        }
        debug!("已暂停 {} 个信息流视频", handles.len());
        handles.len()
    }
}
