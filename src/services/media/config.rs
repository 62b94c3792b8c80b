// 媒体解析配置
//
// 定义了解析层的全部可调参数，包括：
// - 后端 API / 静态资源地址
// - 同源白名单
// - 占位图路径
// - 解析缓存容量与刷新周期

use crate::models::MediaKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 媒体解析配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MediaConfig {
    /// 后端 API 根地址，代理接口挂在其下（如 `http://localhost:5000/api`）
    pub api_base_url: String,

    /// 后端静态资源根地址，`uploads/` 位于其下
    pub asset_base_url: String,

    /// 自有前端域名（同源白名单）
    pub frontend_hosts: Vec<String>,

    /// 云盘代理使用的提供方路径段
    pub drive_provider: String,

    /// 健康探测使用的合成文件 ID
    pub probe_file_id: String,

    /// 健康探测超时（秒）
    pub probe_timeout_secs: u64,

    /// 代理不可用时直连缩略图的宽度
    pub drive_thumbnail_width: u32,

    /// 占位图路径
    pub placeholders: PlaceholderConfig,

    /// 解析缓存最大条目数
    pub resolution_cache_capacity: u64,

    /// 结构化记录没有可识别字段时的回退策略
    pub record_fallback: RecordFallback,

    /// 批量缓存刷新阈值（秒）
    pub cache_refresh_interval_secs: u64,

    /// 持久化状态文件路径
    pub state_path: PathBuf,
}

/// 各媒体类型的默认占位图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub image: String,
    pub video: String,
    pub avatar: String,
}

/// 结构化记录中找不到任何可识别字段时使用哪张占位图
///
/// 现有数据依赖 `Avatar`：无论请求的媒体类型是什么都回退到默认头像。
/// `KindSpecific` 改为按请求类型回退，是否切换需要产品确认。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordFallback {
    #[default]
    Avatar,
    KindSpecific,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            asset_base_url: "http://localhost:5000".to_string(),
            frontend_hosts: vec!["localhost".to_string()],
            drive_provider: "google-drive".to_string(),
            probe_file_id: "health-check".to_string(),
            probe_timeout_secs: 5,
            drive_thumbnail_width: 1000,
            placeholders: PlaceholderConfig::default(),
            resolution_cache_capacity: 2048,
            record_fallback: RecordFallback::Avatar,
            cache_refresh_interval_secs: 60 * 60,
            state_path: PathBuf::from("media_state.json"),
        }
    }
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            image: "/images/default-post.png".to_string(),
            video: "/images/video-placeholder.png".to_string(),
            avatar: "/images/default-avatar.png".to_string(),
        }
    }
}

impl PlaceholderConfig {
    pub fn for_kind(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Image => &self.image,
            MediaKind::Video => &self.video,
            MediaKind::Avatar => &self.avatar,
        }
    }
}

impl MediaConfig {
    /// 从环境变量加载配置（会先读取 `.env`）
    ///
    /// 未设置或无法解析的变量保持默认值。
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = Self::default();

        if let Ok(url) = std::env::var("MEDIA_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Ok(url) = std::env::var("MEDIA_ASSET_BASE_URL") {
            config.asset_base_url = url;
        }
        if let Ok(hosts) = std::env::var("MEDIA_FRONTEND_HOSTS") {
            config.frontend_hosts = hosts
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
        }
        if let Ok(path) = std::env::var("MEDIA_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }
        if let Some(capacity) = std::env::var("MEDIA_CACHE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.resolution_cache_capacity = capacity;
        }
        if let Some(secs) = std::env::var("MEDIA_PROBE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.probe_timeout_secs = secs;
        }

        config
    }

    /// 同源白名单：前端域名 + 后端主机 + 本机地址
    pub fn same_origin_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .frontend_hosts
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();

        for base in [&self.api_base_url, &self.asset_base_url] {
            if let Some(host) = url::Url::parse(base)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            {
                hosts.push(host);
            }
        }

        hosts.extend(
            ["localhost", "127.0.0.1", "[::1]"]
                .iter()
                .map(|h| h.to_string()),
        );
        hosts.sort();
        hosts.dedup();
        hosts
    }

    pub fn placeholder(&self, kind: MediaKind) -> &str {
        self.placeholders.for_kind(kind)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn cache_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.cache_refresh_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MediaConfig::default();
        assert_eq!(config.drive_provider, "google-drive");
        assert_eq!(config.record_fallback, RecordFallback::Avatar);
        assert_eq!(config.cache_refresh_interval(), Duration::from_secs(3600));
        assert_eq!(config.placeholder(MediaKind::Avatar), "/images/default-avatar.png");
    }

    #[test]
    fn test_same_origin_hosts_include_backend_and_localhost() {
        let config = MediaConfig {
            api_base_url: "https://api.example.com/api".to_string(),
            asset_base_url: "https://cdn.example.com".to_string(),
            frontend_hosts: vec!["App.Example.com".to_string()],
            ..MediaConfig::default()
        };

        let hosts = config.same_origin_hosts();
        assert!(hosts.contains(&"app.example.com".to_string()));
        assert!(hosts.contains(&"api.example.com".to_string()));
        assert!(hosts.contains(&"cdn.example.com".to_string()));
        assert!(hosts.contains(&"127.0.0.1".to_string()));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MediaConfig =
            serde_json::from_str(r#"{ "api_base_url": "https://b.example/api" }"#).unwrap();
        assert_eq!(config.api_base_url, "https://b.example/api");
        assert_eq!(config.resolution_cache_capacity, 2048);
    }
}
