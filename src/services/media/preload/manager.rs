// 预加载管理器 - 为即将展示的条目提前拉取媒体
//
// 本模块负责：
// - 跟踪当前位置之后固定大小的前向窗口
// - 限制同时进行的加载数，超出的任务短暂排队
// - 每个任务在固定存活时间后强制回收
// - 窗口移动时立即回收移出窗口的任务
// - 加载失败的条目在离开窗口前不再重试
//
// 预加载失败只记录日志，不影响前台渲染。
// 回收任务时直接丢弃其 future，不关心进行中请求的结果。

use crate::models::{MediaItem, MediaKind};
use crate::services::media::preload::probe::{EngineFamily, MediaProbe, PreloadMode};
use crate::services::media::resolver::MediaResolver;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 默认同时加载数
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// 默认任务存活时间
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// 排队任务等待许可前的延迟
pub const DEFAULT_QUEUE_DELAY: Duration = Duration::from_millis(150);

/// 预加载参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadSettings {
    /// 前向窗口大小
    pub window: usize,

    /// 同时加载数上限
    pub max_concurrent: usize,

    /// 任务存活时间（无论加载结果如何）
    pub ttl: Duration,

    /// 排队延迟
    pub queue_delay: Duration,

    /// 渲染引擎家族，决定视频的预加载模式
    pub engine: EngineFamily,
}

impl PreloadSettings {
    pub fn with_window(window: usize) -> Self {
        Self {
            window,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            ttl: DEFAULT_TTL,
            queue_delay: DEFAULT_QUEUE_DELAY,
            engine: EngineFamily::Other,
        }
    }

    /// 信息流：向前 3 条
    pub fn feed() -> Self {
        Self::with_window(3)
    }

    /// 快拍：向前 2 条
    pub fn story() -> Self {
        Self::with_window(2)
    }

    /// 单条目
    pub fn single() -> Self {
        Self::with_window(1)
    }

    pub fn engine(mut self, engine: EngineFamily) -> Self {
        self.engine = engine;
        self
    }
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self::feed()
    }
}

/// 预加载任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadState {
    /// 等待加载许可
    Queued,
    /// 加载中
    Loading,
    /// 加载完成（等待被使用或过期）
    Ready,
    /// 加载失败（等待过期）
    Failed,
}

/// 预加载任务
#[derive(Debug, Clone)]
pub struct PreloadTask {
    pub id: Uuid,
    pub item_id: String,
    pub url: String,
    pub kind: MediaKind,
    pub created_at: DateTime<Utc>,
    pub state: PreloadState,
}

struct TaskEntry {
    task: PreloadTask,
    token: CancellationToken,
}

type TaskMap = Arc<Mutex<HashMap<String, TaskEntry>>>;

/// 加载失败的条目 ID
type FailedSet = Arc<Mutex<HashSet<String>>>;

fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// 更新任务状态（任务已被回收或替换时忽略）
fn set_state(tasks: &TaskMap, item_id: &str, task_id: Uuid, state: PreloadState) {
    if let Some(entry) = lock(tasks).get_mut(item_id) {
        if entry.task.id == task_id {
            entry.task.state = state;
        }
    }
}

/// 标记任务失败并记录条目（任务已被回收或替换时忽略）
fn mark_failed(tasks: &TaskMap, failed: &FailedSet, item_id: &str, task_id: Uuid) {
    let mut tasks = lock(tasks);
    if let Some(entry) = tasks.get_mut(item_id) {
        if entry.task.id == task_id {
            entry.task.state = PreloadState::Failed;
            lock(failed).insert(item_id.to_string());
        }
    }
}

/// 预加载管理器
///
/// 必须在 tokio 运行时中使用。管理器被丢弃时取消全部任务。
pub struct PreloadManager<P: MediaProbe> {
    resolver: Arc<MediaResolver>,
    probe: Arc<P>,
    settings: PreloadSettings,

    /// 加载并发控制
    semaphore: Arc<Semaphore>,

    /// 按条目 ID 索引的活动任务
    tasks: TaskMap,

    /// 加载失败的条目，任务过期后仍保留，条目离开窗口时清除
    failed: FailedSet,

    /// 任务追踪（用于关闭时等待全部任务退出）
    tracker: TaskTracker,

    /// 根取消令牌，每个任务持有其子令牌
    shutdown: CancellationToken,
}

impl<P: MediaProbe> PreloadManager<P> {
    pub fn new(resolver: Arc<MediaResolver>, probe: Arc<P>, settings: PreloadSettings) -> Self {
        Self {
            resolver,
            probe,
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            settings,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            failed: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &PreloadSettings {
        &self.settings
    }

    pub fn resolver(&self) -> &Arc<MediaResolver> {
        &self.resolver
    }

    /// 更新前向窗口
    ///
    /// 保留位置 `current + 1 ..= current + window` 的任务，立即回收窗口外的任务，
    /// 为新进入窗口的条目创建任务。离开窗口的条目同时清除失败记录，再次进入时重新加载。
    pub fn update_window(&self, items: &[MediaItem], current: usize) {
        let start = current.saturating_add(1).min(items.len());
        let end = current
            .saturating_add(self.settings.window)
            .saturating_add(1)
            .min(items.len());
        let window = &items[start..end];

        let wanted: HashSet<&str> = window.iter().map(|item| item.id.as_str()).collect();

        let stale: Vec<String> = lock(&self.tasks)
            .keys()
            .filter(|id| !wanted.contains(id.as_str()))
            .cloned()
            .collect();
        for item_id in stale {
            self.evict(&item_id);
        }
        lock(&self.failed).retain(|item_id| wanted.contains(item_id.as_str()));

        for item in window {
            self.preload(item);
        }
    }

    /// 为单个条目创建预加载任务
    ///
    /// 已有任务时返回原任务 ID；解析结果为占位图、条目此前加载失败或管理器已关闭时不创建任务。
    pub fn preload(&self, item: &MediaItem) -> Option<Uuid> {
        if self.shutdown.is_cancelled() {
            return None;
        }

        if lock(&self.failed).contains(&item.id) {
            debug!("条目 {} 此前预加载失败，跳过", item.id);
            return None;
        }

        if let Some(entry) = lock(&self.tasks).get(&item.id) {
            return Some(entry.task.id);
        }

        let url = self.resolver.resolve(&item.media, item.kind);
        if self.resolver.is_placeholder(&url) {
            debug!("条目 {} 解析为占位图，跳过预加载", item.id);
            return None;
        }

        let task = PreloadTask {
            id: Uuid::new_v4(),
            item_id: item.id.clone(),
            url,
            kind: item.kind,
            created_at: Utc::now(),
            state: PreloadState::Queued,
        };
        let token = self.shutdown.child_token();
        let mode = PreloadMode::for_engine(self.settings.engine, item.kind);
        let task_id = task.id;

        let job = TaskJob {
            probe: Arc::clone(&self.probe),
            semaphore: Arc::clone(&self.semaphore),
            tasks: Arc::clone(&self.tasks),
            failed: Arc::clone(&self.failed),
            settings: self.settings,
            task_id,
            item_id: item.id.clone(),
            url: task.url.clone(),
            kind: item.kind,
            mode,
            token: token.clone(),
        };

        {
            let mut tasks = lock(&self.tasks);
            // 并发调用时可能已被其他调用者创建
            if let Some(entry) = tasks.get(&item.id) {
                return Some(entry.task.id);
            }
            tasks.insert(item.id.clone(), TaskEntry { task, token });
        }

        debug!("创建预加载任务: {} ({})", item.id, task_id);
        self.tracker.spawn(job.run());
        Some(task_id)
    }

    /// 回收条目的预加载任务，返回是否存在该任务
    pub fn evict(&self, item_id: &str) -> bool {
        let removed = lock(&self.tasks).remove(item_id);
        match removed {
            Some(entry) => {
                entry.token.cancel();
                debug!("回收预加载任务: {} ({:?})", item_id, entry.task.state);
                true
            }
            None => false,
        }
    }

    /// 回收全部任务并清除失败记录（管理器仍可继续使用）
    pub fn clear(&self) {
        lock(&self.failed).clear();
        let drained: Vec<TaskEntry> = lock(&self.tasks).drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            entry.token.cancel();
        }
        if !drained.is_empty() {
            debug!("回收全部预加载任务，共 {} 个", drained.len());
        }
    }

    /// 当前活动任务（按创建时间排序）
    pub fn active_tasks(&self) -> Vec<PreloadTask> {
        let mut tasks: Vec<PreloadTask> = lock(&self.tasks)
            .values()
            .map(|entry| entry.task.clone())
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        tasks
    }

    pub fn task(&self, item_id: &str) -> Option<PreloadTask> {
        lock(&self.tasks).get(item_id).map(|entry| entry.task.clone())
    }

    pub fn is_preloading(&self, item_id: &str) -> bool {
        lock(&self.tasks).contains_key(item_id)
    }

    /// 条目是否加载失败且尚未离开窗口
    pub fn has_failed(&self, item_id: &str) -> bool {
        lock(&self.failed).contains(item_id)
    }

    /// 关闭管理器：取消全部任务并等待其退出
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.clear();
        self.tracker.close();
        self.tracker.wait().await;
        info!("预加载管理器已关闭");
    }
}

impl<P: MediaProbe> Drop for PreloadManager<P> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.tracker.close();
    }
}

/// 单个预加载任务的执行上下文
struct TaskJob<P: MediaProbe> {
    probe: Arc<P>,
    semaphore: Arc<Semaphore>,
    tasks: TaskMap,
    failed: FailedSet,
    settings: PreloadSettings,
    task_id: Uuid,
    item_id: String,
    url: String,
    kind: MediaKind,
    mode: PreloadMode,
    token: CancellationToken,
}

impl<P: MediaProbe> TaskJob<P> {
    async fn run(self) {
        let expiry = tokio::time::sleep(self.settings.ttl);
        tokio::pin!(expiry);

        tokio::select! {
            _ = self.token.cancelled() => return,
            _ = &mut expiry => {
                self.expire();
                return;
            }
            _ = self.load() => {}
        }

        // 加载结束后保留到过期或被回收
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = &mut expiry => self.expire(),
        }
    }

    async fn load(&self) {
        let _permit = match self.acquire().await {
            Some(permit) => permit,
            None => {
                set_state(&self.tasks, &self.item_id, self.task_id, PreloadState::Failed);
                return;
            }
        };

        set_state(&self.tasks, &self.item_id, self.task_id, PreloadState::Loading);

        match self.probe.load(&self.url, self.kind, self.mode).await {
            Ok(bytes) => {
                debug!("预加载成功: {} ({} 字节)", self.url, bytes);
                set_state(&self.tasks, &self.item_id, self.task_id, PreloadState::Ready);
            }
            Err(e) => {
                warn!("预加载失败: {} - 错误: {}", self.url, e);
                mark_failed(&self.tasks, &self.failed, &self.item_id, self.task_id);
            }
        }
    }

    /// 获取加载许可；没有空闲许可时先排队等待一小段时间
    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(TryAcquireError::Closed) => None,
            Err(TryAcquireError::NoPermits) => {
                tokio::time::sleep(self.settings.queue_delay).await;
                Arc::clone(&self.semaphore).acquire_owned().await.ok()
            }
        }
    }

    fn expire(&self) {
        let mut tasks = lock(&self.tasks);
        let current = tasks
            .get(&self.item_id)
            .map_or(false, |entry| entry.task.id == self.task_id);
        if current {
            tasks.remove(&self.item_id);
            debug!("预加载任务过期: {} ({})", self.item_id, self.task_id);
        }
    }
}
