// URL 检测器 - 识别媒体候选字符串的提供方
//
// 本模块负责：
// - 判断候选字符串属于哪类提供方（云盘、短视频站、同源、外部、本地路径）
// - 从云盘 URL 中提取文件 ID
// - 从短视频站 URL 中提取 11 位视频 ID

use crate::services::media::error::ResolveError;
use crate::services::media::MediaConfig;
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use url::Url;

lazy_static! {
    /// 带协议头的 URL
    static ref SCHEME_REGEX: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").expect("协议头正则表达式编译失败");

    /// 云盘文件 ID 匹配规则，按顺序尝试
    /// 1. 查询参数 `id=`（覆盖 `/uc?id=`、`/open?id=`）
    /// 2. `/d/<id>` 路径段（覆盖 `/file/d/<id>/view`）
    /// 3. 末尾的长不透明路径段
    static ref DRIVE_ID_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").expect("云盘 ID 正则表达式编译失败"),
        Regex::new(r"/d/([A-Za-z0-9_-]+)").expect("云盘 ID 正则表达式编译失败"),
        Regex::new(r"/([A-Za-z0-9_-]{25,})/?(?:[?#].*)?$").expect("云盘 ID 正则表达式编译失败"),
    ];

    /// 短视频站 ID 匹配规则，按顺序尝试：标准观看页、短链接、嵌入页
    static ref YOUTUBE_ID_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"^(?i:https?://)?(?i:www\.|m\.)?(?i:youtube\.com)/watch\?(?:[^#]*&)?v=([A-Za-z0-9_-]{11})")
            .expect("视频 ID 正则表达式编译失败"),
        Regex::new(r"^(?i:https?://)?(?i:youtu\.be)/([A-Za-z0-9_-]{11})")
            .expect("视频 ID 正则表达式编译失败"),
        Regex::new(r"^(?i:https?://)?(?i:www\.|m\.)?(?i:youtube\.com|youtube-nocookie\.com)/(?:embed|shorts|v)/([A-Za-z0-9_-]{11})")
            .expect("视频 ID 正则表达式编译失败"),
    ];
}

/// 云盘域名族
const DRIVE_HOSTS: [&str; 3] = [
    "drive.google.com",
    "docs.google.com",
    "drive.usercontent.google.com",
];

/// 候选字符串的提供方类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// 空字符串，无法解析
    None,
    /// 云盘托管文件
    GoogleDrive,
    /// 短视频站
    YouTube,
    /// 自有域名或本机地址，可直接使用
    SameOrigin,
    /// 外部域名，需要经过通用代理
    ForeignOrigin,
    /// 无协议头的相对路径
    LocalPath,
}

/// URL 检测器
///
/// 持有同源白名单，负责对候选字符串分类。
#[derive(Debug, Clone)]
pub struct UrlDetector {
    same_origin_hosts: Vec<String>,
}

impl UrlDetector {
    /// 使用给定的同源白名单创建检测器
    pub fn new<I, S>(same_origin_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            same_origin_hosts: same_origin_hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(config.same_origin_hosts())
    }

    /// 对候选字符串分类
    ///
    /// 检查顺序决定结果：云盘与短视频站优先于同源/外部判断。
    /// 无法解析的 URL 归为 `ProviderKind::None`，调用方会得到占位图。
    ///
    /// # 示例
    /// ```
    /// use feed_media::services::media::{ProviderKind, UrlDetector};
    ///
    /// let detector = UrlDetector::new(["app.example.com"]);
    /// assert_eq!(detector.classify("https://youtu.be/dQw4w9WgXcQ"), ProviderKind::YouTube);
    /// assert_eq!(detector.classify("https://app.example.com/a.png"), ProviderKind::SameOrigin);
    /// assert_eq!(detector.classify("avatars/u1.png"), ProviderKind::LocalPath);
    /// ```
    pub fn classify(&self, candidate: &str) -> ProviderKind {
        match self.try_classify(candidate) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!("候选 URL 无法分类: {} - {}", candidate, e);
                ProviderKind::None
            }
        }
    }

    /// 分类（保留解析错误，供解析器在边界处降级）
    pub(crate) fn try_classify(&self, candidate: &str) -> Result<ProviderKind, ResolveError> {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return Ok(ProviderKind::None);
        }

        let lower = candidate.to_ascii_lowercase();
        if lower.starts_with("data:") || lower.starts_with("blob:") {
            return Ok(ProviderKind::SameOrigin);
        }

        let candidate = Self::normalize(candidate);
        let candidate = candidate.as_ref();
        let parsed = if Self::has_scheme(candidate) {
            Url::parse(candidate)?
        } else {
            return Ok(ProviderKind::LocalPath);
        };

        let host = parsed
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| ResolveError::InvalidUrl(candidate.to_string()))?;

        if Self::is_drive_host(&host) {
            return Ok(ProviderKind::GoogleDrive);
        }

        if Self::extract_youtube_id(candidate).is_some() {
            return Ok(ProviderKind::YouTube);
        }

        if self.same_origin_hosts.iter().any(|h| *h == host) {
            return Ok(ProviderKind::SameOrigin);
        }

        Ok(ProviderKind::ForeignOrigin)
    }

    /// 规整候选字符串：去掉首尾空白，协议相对地址（`//host/...`）补全为 https
    pub fn normalize(candidate: &str) -> Cow<'_, str> {
        let candidate = candidate.trim();
        if candidate.starts_with("//") {
            Cow::Owned(format!("https:{}", candidate))
        } else {
            Cow::Borrowed(candidate)
        }
    }

    /// 是否带协议头（`scheme://`）
    pub fn has_scheme(candidate: &str) -> bool {
        SCHEME_REGEX.is_match(candidate)
    }

    /// 是否为云盘域名族
    pub fn is_drive_host(host: &str) -> bool {
        DRIVE_HOSTS.iter().any(|h| host.eq_ignore_ascii_case(h))
    }

    /// 从云盘 URL 中提取文件 ID
    ///
    /// # 示例
    /// ```
    /// use feed_media::services::media::UrlDetector;
    ///
    /// assert_eq!(
    ///     UrlDetector::extract_drive_file_id("https://drive.google.com/file/d/ABC123/view").as_deref(),
    ///     Some("ABC123")
    /// );
    /// ```
    pub fn extract_drive_file_id(url: &str) -> Option<String> {
        DRIVE_ID_PATTERNS.iter().find_map(|pattern| {
            pattern
                .captures(url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
    }

    /// 从短视频站 URL 中提取 11 位视频 ID
    pub fn extract_youtube_id(url: &str) -> Option<String> {
        let url = Self::normalize(url);
        let url = url.as_ref();
        YOUTUBE_ID_PATTERNS.iter().find_map(|pattern| {
            pattern
                .captures(url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
    }
}
