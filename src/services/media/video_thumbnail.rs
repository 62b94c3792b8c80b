// 视频缩略图 - 为视频引用推导封面图地址
//
// 推导顺序：
// 1. 后端提供的现成缩略图字段（优先，直接短路）
// 2. 短视频站原生缩略图
// 3. 转码服务地址上追加即时变换参数（按容器格式与视口尺寸选择）
// 4. 云盘视频走代理缩略图或原生缩略图
// 5. 视频占位图

use crate::models::{MediaKind, MediaReference};
use crate::services::media::extractor::ReferenceExtractor;
use crate::services::media::path::MediaPath;
use crate::services::media::resolver::MediaResolver;
use crate::services::media::url_detector::{ProviderKind, UrlDetector};
use url::Url;

/// 视口宽度分界（小于该值视为移动端）
const MOBILE_MAX_WIDTH: u32 = 768;

/// 转码服务域名
const TRANSCODE_HOST: &str = "res.cloudinary.com";

/// 转码服务上传路径段
const TRANSCODE_UPLOAD_SEGMENT: &str = "/video/upload/";

/// 视口类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportClass {
    Mobile,
    Desktop,
}

/// 当前视口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
}

impl Viewport {
    pub fn new(width: u32) -> Self {
        Self { width }
    }

    pub fn class(&self) -> ViewportClass {
        if self.width < MOBILE_MAX_WIDTH {
            ViewportClass::Mobile
        } else {
            ViewportClass::Desktop
        }
    }
}

/// 视频容器格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Webm,
    Other,
}

impl ContainerFormat {
    /// 根据 URL 路径扩展名判断
    pub fn from_url(url: &str) -> Self {
        let path = url.split(&['?', '#'][..]).next().unwrap_or(url);
        if path.to_ascii_lowercase().ends_with(".webm") {
            ContainerFormat::Webm
        } else {
            ContainerFormat::Other
        }
    }
}

/// 转码服务的即时变换参数
pub struct TranscodeTransform;

impl TranscodeTransform {
    /// 生成变换参数
    ///
    /// - webm 取首帧并输出渐进式 jpg，其余格式取第 1 秒
    /// - 移动端使用更小的宽度和更激进的压缩
    pub fn params(format: ContainerFormat, viewport: Viewport) -> String {
        let frame = match format {
            ContainerFormat::Webm => "so_0,f_jpg,fl_progressive",
            ContainerFormat::Other => "so_1,f_jpg",
        };
        let size = match viewport.class() {
            ViewportClass::Mobile => "w_480,q_auto:eco",
            ViewportClass::Desktop => "w_960,q_auto:good",
        };
        format!("{},{}", frame, size)
    }

    /// 是否为转码服务的视频地址
    ///
    /// 主机必须是转码域名本身或其子域名。
    pub fn is_transcode_url(url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .map_or(false, |host| {
                host == TRANSCODE_HOST || host.ends_with(&format!(".{}", TRANSCODE_HOST))
            })
            && url.contains(TRANSCODE_UPLOAD_SEGMENT)
    }

    /// 在上传路径段之后插入变换参数，并把扩展名替换为 `.jpg`
    ///
    /// # 示例
    /// ```
    /// use feed_media::services::media::{ContainerFormat, TranscodeTransform, Viewport};
    ///
    /// let url = "https://res.cloudinary.com/demo/video/upload/v1/clips/a.mp4";
    /// let params = TranscodeTransform::params(ContainerFormat::from_url(url), Viewport::new(1280));
    /// assert_eq!(
    ///     TranscodeTransform::apply(url, &params).as_deref(),
    ///     Some("https://res.cloudinary.com/demo/video/upload/so_1,f_jpg,w_960,q_auto:good/v1/clips/a.jpg")
    /// );
    /// ```
    pub fn apply(url: &str, params: &str) -> Option<String> {
        let url = url.split(&['?', '#'][..]).next().unwrap_or(url);
        let idx = url.find(TRANSCODE_UPLOAD_SEGMENT)? + TRANSCODE_UPLOAD_SEGMENT.len();
        let (prefix, rest) = url.split_at(idx);

        let rest = match rest.rfind('.') {
            Some(dot) if !rest[dot..].contains('/') => format!("{}.jpg", &rest[..dot]),
            _ => format!("{}.jpg", rest),
        };

        Some(format!("{}{}/{}", prefix, params, rest))
    }
}

impl MediaResolver {
    /// 推导视频缩略图地址
    ///
    /// # 参数
    /// - `video`: 视频引用
    /// - `ready_thumbnail`: 后端提供的现成缩略图字段（可能缺失）
    /// - `viewport`: 当前视口，用于选择转码尺寸
    pub fn video_thumbnail(
        &self,
        video: &MediaReference,
        ready_thumbnail: Option<&MediaReference>,
        viewport: Viewport,
    ) -> String {
        if let Some(thumbnail) = ready_thumbnail {
            if ReferenceExtractor::extract(thumbnail).map_or(false, |s| !s.trim().is_empty()) {
                return self.resolve(thumbnail, MediaKind::Image);
            }
        }

        let candidate = match ReferenceExtractor::extract(video) {
            Some(candidate) => UrlDetector::normalize(candidate),
            None => return self.placeholder(MediaKind::Video),
        };
        let candidate = candidate.as_ref();

        if let Some(video_id) = UrlDetector::extract_youtube_id(candidate) {
            return MediaPath::youtube_thumbnail_url(&video_id);
        }

        if TranscodeTransform::is_transcode_url(candidate) {
            let params = TranscodeTransform::params(ContainerFormat::from_url(candidate), viewport);
            if let Some(url) = TranscodeTransform::apply(candidate, &params) {
                return url;
            }
        }

        if self.detector().classify(candidate) == ProviderKind::GoogleDrive {
            match self.drive_url(candidate, "thumbnail") {
                Ok(url) => return url,
                Err(e) => tracing::debug!("视频缩略图解析失败: {}", e),
            }
        }

        self.placeholder(MediaKind::Video)
    }
}
