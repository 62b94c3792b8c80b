// 缓存刷新 - 定期让已解析的媒体地址重新生效
//
// 刷新会设置新的缓存破坏标记，清空解析缓存，并重新解析之前解析过的全部引用，
// 使浏览器端对后端地址的 HTTP 缓存失效。
// 上次刷新时间持久化保存，进程重启后仍按阈值判断是否需要刷新。

use crate::services::media::error::MediaError;
use crate::services::media::resolver::MediaResolver;
use crate::services::media::state_store::{StateStore, LAST_REFRESH_KEY};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 一次刷新的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// 重新解析的引用数
    pub refreshed: usize,

    /// 新的缓存破坏标记
    pub stamp: String,

    pub refreshed_at: DateTime<Utc>,
}

/// 缓存刷新器
pub struct CacheRefresher {
    resolver: Arc<MediaResolver>,
    store: Arc<dyn StateStore>,
    threshold: Duration,
}

impl CacheRefresher {
    pub fn new(resolver: Arc<MediaResolver>, store: Arc<dyn StateStore>, threshold: Duration) -> Self {
        Self {
            resolver,
            store,
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// 上次刷新时间
    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.store.get_timestamp(LAST_REFRESH_KEY).await
    }

    /// 从未刷新过或距上次刷新已超过阈值
    pub async fn is_stale(&self) -> bool {
        match self.last_refresh().await {
            Some(last) => {
                let elapsed = Utc::now().signed_duration_since(last);
                elapsed.to_std().map_or(false, |elapsed| elapsed >= self.threshold)
            }
            None => true,
        }
    }

    /// 立即刷新
    pub async fn refresh(&self) -> Result<RefreshReport, MediaError> {
        let keys = self.resolver.cached_keys();
        let now = Utc::now();
        let stamp = now.timestamp_millis().to_string();

        // 先换标记再清空，清空之后写入的条目都带新标记
        self.resolver.set_cache_bust(Some(stamp.clone()));
        self.resolver.invalidate_all();

        for (candidate, kind) in &keys {
            self.resolver.resolve_str(candidate, *kind);
        }

        self.store.set_timestamp(LAST_REFRESH_KEY, now).await?;

        info!("媒体缓存刷新完成，重新解析 {} 个引用", keys.len());
        Ok(RefreshReport {
            refreshed: keys.len(),
            stamp,
            refreshed_at: now,
        })
    }

    /// 超过阈值时刷新，否则什么也不做
    pub async fn refresh_if_stale(&self) -> Result<Option<RefreshReport>, MediaError> {
        if !self.is_stale().await {
            debug!("媒体缓存未过期，跳过刷新");
            return Ok(None);
        }
        self.refresh().await.map(Some)
    }

    /// 启动定期刷新任务
    pub async fn start(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            if let Err(e) = self.refresh_if_stale().await {
                error!("媒体缓存刷新失败: {}", e);
            }
        }
    }
}
