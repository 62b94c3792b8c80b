// 媒体路径管理
//
// 提供统一的媒体 URL 生成规则：代理地址、上传目录、提供方原生缩略图

use crate::models::MediaKind;

/// 媒体 URL 生成器
pub struct MediaPath;

impl MediaPath {
    /// 代理接口路径段
    const PROXY_DIR: &'static str = "proxy";

    /// 通用外部代理的提供方名
    const GENERIC_PROVIDER: &'static str = "generic";

    /// 上传目录
    const UPLOADS_DIR: &'static str = "uploads";

    /// 头像子目录
    const AVATARS_DIR: &'static str = "avatars";

    /// 缓存破坏参数名
    const CACHE_BUST_PARAM: &'static str = "v";

    /// 生成提供方文件代理地址
    ///
    /// 格式：`{api_base}/proxy/{provider}/{file_id}?type={proxy_type}`
    ///
    /// # 示例
    /// ```
    /// use feed_media::services::media::MediaPath;
    ///
    /// let url = MediaPath::provider_proxy_url("https://b.example/api/", "google-drive", "ABC", "image");
    /// assert_eq!(url, "https://b.example/api/proxy/google-drive/ABC?type=image");
    /// ```
    pub fn provider_proxy_url(
        api_base: &str,
        provider: &str,
        file_id: &str,
        proxy_type: &str,
    ) -> String {
        format!(
            "{}/{}/{}/{}?type={}",
            api_base.trim_end_matches('/'),
            Self::PROXY_DIR,
            provider,
            urlencoding::encode(file_id),
            proxy_type
        )
    }

    /// 生成通用外部代理地址
    ///
    /// 格式：`{api_base}/proxy/generic/{url_encoded}?type={kind}`
    pub fn generic_proxy_url(api_base: &str, url: &str, kind: MediaKind) -> String {
        format!(
            "{}/{}/{}/{}?type={}",
            api_base.trim_end_matches('/'),
            Self::PROXY_DIR,
            Self::GENERIC_PROVIDER,
            urlencoding::encode(url),
            kind.as_str()
        )
    }

    /// 生成本地上传文件地址
    ///
    /// - 图片/视频：`{asset_base}/uploads/{path}`
    /// - 头像：`{asset_base}/uploads/avatars/{path}`
    /// - 已经以 `uploads/` 开头的路径直接拼接到资源根
    pub fn upload_url(asset_base: &str, relative: &str, kind: MediaKind) -> String {
        let base = asset_base.trim_end_matches('/');
        let relative = relative.trim().trim_start_matches("./").trim_start_matches('/');

        if relative.starts_with("uploads/") {
            return format!("{}/{}", base, relative);
        }

        match kind {
            MediaKind::Avatar => format!(
                "{}/{}/{}/{}",
                base,
                Self::UPLOADS_DIR,
                Self::AVATARS_DIR,
                relative
            ),
            MediaKind::Image | MediaKind::Video => {
                format!("{}/{}/{}", base, Self::UPLOADS_DIR, relative)
            }
        }
    }

    /// 云盘原生缩略图地址（代理不可用时直连）
    pub fn drive_thumbnail_url(file_id: &str, width: u32) -> String {
        format!(
            "https://drive.google.com/thumbnail?id={}&sz=w{}",
            urlencoding::encode(file_id),
            width
        )
    }

    /// 短视频站静态缩略图地址
    pub fn youtube_thumbnail_url(video_id: &str) -> String {
        format!("https://img.youtube.com/vi/{}/hqdefault.jpg", video_id)
    }

    /// 追加缓存破坏参数
    ///
    /// 已存在的同名参数会被替换，片段标识保持在末尾。
    pub fn with_cache_bust(url: &str, stamp: &str) -> String {
        let (without_fragment, fragment) = match url.find('#') {
            Some(idx) => (&url[..idx], &url[idx..]),
            None => (url, ""),
        };

        let (path, query) = match without_fragment.find('?') {
            Some(idx) => (&without_fragment[..idx], Some(&without_fragment[idx + 1..])),
            None => (without_fragment, None),
        };

        let prefix = format!("{}=", Self::CACHE_BUST_PARAM);
        let bust = format!("{}{}", prefix, stamp);
        let mut params: Vec<&str> = query
            .map(|q| {
                q.split('&')
                    .filter(|p| !p.is_empty() && !p.starts_with(&prefix))
                    .collect()
            })
            .unwrap_or_default();
        params.push(&bust);

        format!("{}?{}{}", path, params.join("&"), fragment)
    }
}
