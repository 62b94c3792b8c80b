// 代理健康追踪器 - 记录后端代理是否可用
//
// 本模块负责：
// - 持久化代理健康标记，进程重启后保留
// - 通过探测请求切换健康状态
// - 接收代理地址加载失败的上报
//
// 状态只有两个：healthy / unhealthy。
// 不健康只能由显式探测成功恢复，加载成功不会自动恢复。

use crate::services::media::error::{MediaError, ProbeError};
use crate::services::media::path::MediaPath;
use crate::services::media::state_store::{StateStore, PROXY_HEALTH_KEY};
use crate::services::media::MediaConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 代理健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyHealth {
    Healthy,
    Unhealthy,
}

impl ProxyHealth {
    fn from_flag(healthy: bool) -> Self {
        if healthy {
            ProxyHealth::Healthy
        } else {
            ProxyHealth::Unhealthy
        }
    }

    fn is_healthy(self) -> bool {
        self == ProxyHealth::Healthy
    }
}

/// 代理健康追踪器
///
/// 解析器在分支时同步读取内存中的标记；每次状态切换都会立刻写入持久存储，
/// 并递增健康代数，使依赖旧状态的解析缓存失效。
pub struct ProxyHealthTracker {
    /// 当前是否健康（同步读取）
    healthy: AtomicBool,

    /// 状态切换次数
    generation: AtomicU64,

    /// 切换与持久化在同一把锁内完成，保证落盘顺序与内存一致
    transition_lock: Mutex<()>,

    /// 持久存储
    store: Arc<dyn StateStore>,

    /// HTTP 客户端
    client: Client,

    /// 探测地址
    probe_url: String,

    /// 云盘代理地址前缀，用于识别加载失败的地址是否走了代理
    drive_proxy_prefix: String,
}

impl ProxyHealthTracker {
    /// 从持久存储恢复健康状态
    ///
    /// 没有记录时视为健康。
    pub async fn load(config: &MediaConfig, store: Arc<dyn StateStore>) -> Result<Self, MediaError> {
        let client = Client::builder()
            .timeout(config.probe_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| MediaError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        let healthy = store.get_bool(PROXY_HEALTH_KEY).await.unwrap_or(true);
        info!("恢复代理健康状态: {:?}", ProxyHealth::from_flag(healthy));

        let probe_url = MediaPath::provider_proxy_url(
            &config.api_base_url,
            &config.drive_provider,
            &config.probe_file_id,
            "thumbnail",
        );
        let drive_proxy_prefix = format!(
            "{}/proxy/{}/",
            config.api_base_url.trim_end_matches('/'),
            config.drive_provider
        );

        Ok(Self {
            healthy: AtomicBool::new(healthy),
            generation: AtomicU64::new(0),
            transition_lock: Mutex::new(()),
            store,
            client,
            probe_url,
            drive_proxy_prefix,
        })
    }

    pub fn state(&self) -> ProxyHealth {
        ProxyHealth::from_flag(self.is_healthy())
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// 健康代数：每次状态切换加一
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn probe_url(&self) -> &str {
        &self.probe_url
    }

    /// 地址是否为云盘代理地址
    pub fn is_proxied_drive_url(&self, url: &str) -> bool {
        url.starts_with(&self.drive_proxy_prefix)
    }

    /// 执行一次探测并据此切换状态
    ///
    /// 任何非成功状态码、网络错误或超时都会把状态切换为不健康。
    pub async fn probe(&self) -> ProxyHealth {
        match self.send_probe().await {
            Ok(()) => {
                debug!("代理探测成功: {}", self.probe_url);
                self.transition(ProxyHealth::Healthy).await;
            }
            Err(e) => {
                warn!("代理探测失败: {} - 错误: {}", self.probe_url, e);
                self.transition(ProxyHealth::Unhealthy).await;
            }
        }
        self.state()
    }

    /// 在后台执行探测，不阻塞调用方
    pub fn spawn_probe(self: &Arc<Self>) -> JoinHandle<ProxyHealth> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move { tracker.probe().await })
    }

    /// 上报媒体加载失败
    ///
    /// 只有走云盘代理的地址会把状态切换为不健康，返回是否发生了切换。
    pub async fn report_load_failure(&self, url: &str) -> bool {
        if !self.is_proxied_drive_url(url) {
            debug!("加载失败的地址未经过云盘代理，忽略: {}", url);
            return false;
        }
        warn!("代理地址加载失败: {}", url);
        self.transition(ProxyHealth::Unhealthy).await
    }

    async fn send_probe(&self) -> Result<(), ProbeError> {
        let response = self.client.get(&self.probe_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::HttpError(status.as_u16()));
        }
        Ok(())
    }

    /// 切换状态并立即持久化，返回状态是否真的发生了变化
    async fn transition(&self, to: ProxyHealth) -> bool {
        let _guard = self.transition_lock.lock().await;

        let target = to.is_healthy();
        if self
            .healthy
            .compare_exchange(!target, target, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.generation.fetch_add(1, Ordering::AcqRel);
        info!("代理健康状态切换为 {:?}", to);

        // 持久化失败不影响内存中的状态
        if let Err(e) = self.store.set(PROXY_HEALTH_KEY, Value::Bool(target)).await {
            warn!("持久化代理健康状态失败: {}", e);
        }
        true
    }
}
