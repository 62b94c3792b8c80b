// 持久化状态存储 - 客户端持久键值存储
//
// 本模块提供跨进程重启保留的小型键值状态，包括：
// - 代理健康标记
// - 上次批量缓存刷新时间
//
// 提供两种实现：JSON 文件存储（生产）与内存存储（测试/临时会话）

use crate::services::media::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

/// 代理健康标记的键
pub const PROXY_HEALTH_KEY: &str = "proxy_health";

/// 上次批量刷新时间的键（RFC3339 字符串）
pub const LAST_REFRESH_KEY: &str = "media_cache_last_refresh";

/// 持久键值存储
#[async_trait]
pub trait StateStore: Send + Sync {
    /// 读取键值，不存在返回 `None`
    async fn get(&self, key: &str) -> Option<Value>;

    /// 写入键值，写入成功即已落盘
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// 删除键值
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).await.and_then(|v| v.as_bool())
    }

    async fn get_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    async fn set_timestamp(&self, key: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.set(key, Value::String(at.to_rfc3339())).await
    }
}

/// JSON 文件存储
///
/// 所有键值保存在一个 JSON 对象文件中，每次写入都会整体落盘。
pub struct JsonFileStore {
    /// 状态文件路径
    path: PathBuf,

    /// 内存中的键值（使用读写锁保证线程安全）
    entries: Arc<RwLock<HashMap<String, Value>>>,

    /// 串行化落盘，快照与写文件在同一把锁内完成
    save_lock: Mutex<()>,
}

impl JsonFileStore {
    /// 从状态文件加载
    ///
    /// # 行为
    /// - 文件不存在：使用空状态并创建文件
    /// - 文件损坏：备份为 `*.json.backup` 后使用空状态
    ///
    /// # 示例
    /// ```no_run
    /// use feed_media::services::media::JsonFileStore;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = JsonFileStore::load("media_state.json").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let entries = if path.exists() {
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<HashMap<String, Value>>(&content) {
                    Ok(entries) => {
                        tracing::info!("成功加载媒体状态: {:?}", path);
                        entries
                    }
                    Err(e) => {
                        tracing::warn!("状态文件损坏，使用空状态: {}", e);
                        Self::backup_corrupted(&path).await;
                        HashMap::new()
                    }
                },
                Err(e) => {
                    tracing::warn!("读取状态文件失败，使用空状态: {}", e);
                    HashMap::new()
                }
            }
        } else {
            tracing::info!("状态文件不存在，使用空状态");
            HashMap::new()
        };

        let store = Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
            save_lock: Mutex::new(()),
        };

        if !store.path.exists() {
            store.save().await?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 保存全部键值到文件
    ///
    /// 先写入 `*.json.tmp` 再重命名覆盖，并发保存按顺序落盘，后一次保存总是包含更新的快照。
    pub async fn save(&self) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().await;

        let entries = self.entries.read().await;
        let json = serde_json::to_string_pretty(&*entries)?;
        drop(entries);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Write(format!("创建状态目录失败: {}", e)))?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .await
            .map_err(|e| StoreError::Write(format!("写入状态文件失败: {}", e)))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::Write(format!("替换状态文件失败: {}", e)))?;

        tracing::debug!("成功保存媒体状态: {:?}", self.path);
        Ok(())
    }

    /// 备份损坏的状态文件（失败不影响主流程）
    async fn backup_corrupted(path: &Path) {
        let backup_path = path.with_extension("json.backup");

        match fs::rename(path, &backup_path).await {
            Ok(_) => tracing::info!("已备份损坏的状态文件到: {:?}", backup_path),
            Err(e) => tracing::warn!("备份状态文件失败: {}", e),
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        self.save().await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.entries.write().await.remove(key);
        if removed.is_some() {
            self.save().await?;
        }
        Ok(())
    }
}

/// 内存存储（进程退出即丢失）
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
