// 预加载探测 - 在后台提前拉取即将展示的媒体
//
// 本模块提供：
// - 预加载模式（仅元数据 / 完整拉取）及其按引擎的选择
// - 探测抽象 `MediaProbe`，预加载管理器只依赖该抽象
// - 基于 reqwest 的 HTTP 实现

use crate::models::MediaKind;
use crate::services::media::error::ProbeError;
use crate::services::media::MediaConfig;
use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// 仅元数据模式下请求的字节范围
pub const METADATA_RANGE_BYTES: u64 = 64 * 1024;

/// 预加载模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadMode {
    /// 只拉取文件头（足够解析时长、尺寸等元数据）
    Metadata,
    /// 完整拉取
    Full,
}

/// 渲染引擎家族
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFamily {
    Safari,
    Other,
}

impl EngineFamily {
    /// 根据 User-Agent 判断引擎家族
    ///
    /// Safari 家族包括桌面 Safari 以及 iOS 上所有浏览器（均使用同一内核）；
    /// Chrome、Android 浏览器的 UA 中同样带有 `Safari`，需要排除。
    pub fn detect(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();

        let ios = ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod");
        if ios {
            return EngineFamily::Safari;
        }

        let safari = ua.contains("safari")
            && !ua.contains("chrome")
            && !ua.contains("chromium")
            && !ua.contains("android")
            && !ua.contains("edg/");
        if safari {
            EngineFamily::Safari
        } else {
            EngineFamily::Other
        }
    }
}

impl PreloadMode {
    /// 选择预加载模式
    ///
    /// Safari 家族的仅元数据模式对于拖动预播不可靠，视频改为完整拉取；图片总是完整拉取。
    pub fn for_engine(engine: EngineFamily, kind: MediaKind) -> Self {
        match (kind, engine) {
            (MediaKind::Video, EngineFamily::Safari) => PreloadMode::Full,
            (MediaKind::Video, EngineFamily::Other) => PreloadMode::Metadata,
            _ => PreloadMode::Full,
        }
    }
}

/// 媒体探测
///
/// 预加载任务通过该抽象拉取媒体，返回读取到的字节数。
/// 任务取消时对应的 future 会被直接丢弃。
#[async_trait]
pub trait MediaProbe: Send + Sync + 'static {
    async fn load(&self, url: &str, kind: MediaKind, mode: PreloadMode) -> Result<u64, ProbeError>;
}

/// 基于 HTTP 的探测实现
pub struct HttpProbe {
    /// HTTP 客户端（带超时与连接池）
    client: Client,

    /// 相对地址的基准
    asset_base: Option<Url>,
}

impl HttpProbe {
    /// 创建探测器
    ///
    /// # 示例
    /// ```no_run
    /// use feed_media::services::media::{HttpProbe, MediaConfig};
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let probe = HttpProbe::new(&MediaConfig::default())?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: &MediaConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(config.probe_timeout())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ProbeError::NetworkError(format!("创建 HTTP 客户端失败: {}", e)))?;

        let asset_base = Url::parse(&format!("{}/", config.asset_base_url.trim_end_matches('/'))).ok();

        Ok(Self { client, asset_base })
    }

    /// 把相对地址补全为绝对地址
    fn absolute_url(&self, url: &str) -> Result<Url, ProbeError> {
        match Url::parse(url) {
            Ok(parsed) => Ok(parsed),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .asset_base
                .as_ref()
                .ok_or_else(|| ProbeError::InvalidUrl(url.to_string()))?
                .join(url.trim_start_matches('/'))
                .map_err(|e| ProbeError::InvalidUrl(format!("{}: {}", url, e))),
            Err(e) => Err(ProbeError::InvalidUrl(format!("{}: {}", url, e))),
        }
    }
}

#[async_trait]
impl MediaProbe for HttpProbe {
    async fn load(&self, url: &str, kind: MediaKind, mode: PreloadMode) -> Result<u64, ProbeError> {
        let target = self.absolute_url(url)?;
        debug!("开始预加载 {}: {} ({:?})", kind, target, mode);

        let mut request = self.client.get(target.as_str());
        if mode == PreloadMode::Metadata {
            request = request.header(RANGE, format!("bytes=0-{}", METADATA_RANGE_BYTES - 1));
        }

        let mut response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::HttpError(status.as_u16()));
        }

        // 服务端忽略 Range 时，仅元数据模式读满上限即停止
        let limit = match mode {
            PreloadMode::Metadata => Some(METADATA_RANGE_BYTES),
            PreloadMode::Full => None,
        };

        let mut received: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            received += chunk.len() as u64;
            if limit.map_or(false, |limit| received >= limit) {
                break;
            }
        }

        debug!("预加载完成: {} ({} 字节)", target, received);
        Ok(received)
    }
}
