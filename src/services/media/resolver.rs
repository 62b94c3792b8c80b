// URL 解析器 - 把媒体引用解析为可直接渲染的 URL
//
// 本模块是解析层的核心，负责：
// - 提取候选字符串并分类提供方
// - 按提供方选择代理、原生缩略图、直连或本地路径
// - 根据代理健康状态切换云盘策略
// - 缓存解析结果（有界容量）
//
// 解析永远不会失败：任何内部错误都降级为对应类型的占位图。

use crate::models::{MediaKind, MediaReference};
use crate::services::media::error::ResolveError;
use crate::services::media::extractor::ReferenceExtractor;
use crate::services::media::health::ProxyHealthTracker;
use crate::services::media::path::MediaPath;
use crate::services::media::url_detector::{ProviderKind, UrlDetector};
use crate::services::media::{MediaConfig, RecordFallback};
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// 解析缓存条目
#[derive(Debug, Clone)]
struct CachedUrl {
    url: String,
    /// 依赖代理健康状态的结果记录当时的健康代数，代数变化后视为未命中
    health_generation: Option<u64>,
    /// 解析时的缓存破坏代数，标记更换后视为未命中
    bust_generation: u64,
}

/// 单次解析的结果
struct Resolved {
    url: String,
    health_sensitive: bool,
}

impl Resolved {
    fn fixed(url: String) -> Self {
        Self {
            url,
            health_sensitive: false,
        }
    }
}

/// URL 解析器
pub struct MediaResolver {
    config: Arc<MediaConfig>,
    detector: UrlDetector,
    health: Arc<ProxyHealthTracker>,
    cache: Cache<(String, MediaKind), CachedUrl>,
    cache_bust: RwLock<Option<String>>,
    bust_generation: AtomicU64,
}

impl MediaResolver {
    pub fn new(config: Arc<MediaConfig>, health: Arc<ProxyHealthTracker>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.resolution_cache_capacity)
            .build();

        Self {
            detector: UrlDetector::from_config(&config),
            config,
            health,
            cache,
            cache_bust: RwLock::new(None),
            bust_generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    pub fn detector(&self) -> &UrlDetector {
        &self.detector
    }

    pub fn health(&self) -> &Arc<ProxyHealthTracker> {
        &self.health
    }

    /// 解析媒体引用
    ///
    /// # 流程
    /// 1. 提取候选字符串；缺失时返回该类型的占位图
    /// 2. 查询解析缓存
    /// 3. 分类提供方并按提供方生成 URL
    /// 4. 写入缓存
    ///
    /// 结构化记录中没有任何可识别字段时，默认回退到头像占位图（与请求类型无关），
    /// 见 `RecordFallback`。
    pub fn resolve(&self, reference: &MediaReference, kind: MediaKind) -> String {
        match ReferenceExtractor::extract(reference) {
            Some(candidate) => self.resolve_str(candidate, kind),
            None if reference.is_record() => {
                debug!("{}", ResolveError::UnrecognizedRecord);
                match self.config.record_fallback {
                    RecordFallback::Avatar => self.placeholder(MediaKind::Avatar),
                    RecordFallback::KindSpecific => self.placeholder(kind),
                }
            }
            None => self.placeholder(kind),
        }
    }

    /// 解析已经提取好的候选字符串
    pub fn resolve_str(&self, candidate: &str, kind: MediaKind) -> String {
        let key = (candidate.to_string(), kind);

        if let Some(cached) = self.cache.get(&key) {
            let fresh = cached
                .health_generation
                .map_or(true, |generation| generation == self.health.generation())
                && cached.bust_generation == self.bust_generation();
            if fresh {
                return cached.url;
            }
            debug!("代理健康状态或缓存破坏标记已变化，重新解析: {}", candidate);
        }

        // 先读代数再解析，解析期间发生切换时条目会在下次读取时失效
        let generation = self.health.generation();
        let bust_generation = self.bust_generation();
        let resolved = match self.resolve_uncached(candidate, kind) {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!("解析失败，使用占位图: {} - {}", candidate, e);
                Resolved::fixed(self.placeholder(kind))
            }
        };

        self.cache.insert(
            key,
            CachedUrl {
                url: resolved.url.clone(),
                health_generation: resolved.health_sensitive.then_some(generation),
                bust_generation,
            },
        );
        resolved.url
    }

    /// 对应类型的占位图
    pub fn placeholder(&self, kind: MediaKind) -> String {
        self.config.placeholder(kind).to_string()
    }

    /// 地址是否为任意一种占位图
    pub fn is_placeholder(&self, url: &str) -> bool {
        let placeholders = &self.config.placeholders;
        url == placeholders.image || url == placeholders.video || url == placeholders.avatar
    }

    /// 当前缓存中的全部 `(候选字符串, 类型)`
    pub fn cached_keys(&self) -> Vec<(String, MediaKind)> {
        self.cache.iter().map(|(key, _)| (*key).clone()).collect()
    }

    pub fn cache_len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// 清空解析缓存
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    /// 设置缓存破坏标记
    ///
    /// 之后生成的后端地址（代理、上传目录）都会带上 `v=<stamp>`。
    /// 设置前写入的缓存条目在下次读取时视为未命中。
    pub fn set_cache_bust(&self, stamp: Option<String>) {
        if let Ok(mut guard) = self.cache_bust.write() {
            *guard = stamp;
        }
        // 先写标记再推进代数，读到旧代数的解析结果一定会被丢弃
        self.bust_generation.fetch_add(1, Ordering::SeqCst);
    }

    fn bust_generation(&self) -> u64 {
        self.bust_generation.load(Ordering::SeqCst)
    }

    pub fn cache_bust(&self) -> Option<String> {
        self.cache_bust.read().ok().and_then(|guard| guard.clone())
    }

    fn resolve_uncached(&self, candidate: &str, kind: MediaKind) -> Result<Resolved, ResolveError> {
        let candidate = UrlDetector::normalize(candidate);
        let candidate = candidate.as_ref();
        let provider = self.detector.try_classify(candidate)?;

        let resolved = match provider {
            ProviderKind::None => Resolved::fixed(self.placeholder(kind)),
            ProviderKind::GoogleDrive => {
                let url = self.drive_url(candidate, kind.proxy_type())?;
                Resolved {
                    url,
                    health_sensitive: true,
                }
            }
            ProviderKind::YouTube => {
                let video_id = UrlDetector::extract_youtube_id(candidate)
                    .ok_or_else(|| ResolveError::IdentifierNotFound(candidate.to_string()))?;
                Resolved::fixed(MediaPath::youtube_thumbnail_url(&video_id))
            }
            ProviderKind::SameOrigin => Resolved::fixed(candidate.to_string()),
            ProviderKind::ForeignOrigin => Resolved::fixed(self.bust(MediaPath::generic_proxy_url(
                &self.config.api_base_url,
                candidate,
                kind,
            ))),
            ProviderKind::LocalPath => Resolved::fixed(self.bust(MediaPath::upload_url(
                &self.config.asset_base_url,
                candidate,
                kind,
            ))),
        };

        Ok(resolved)
    }

    /// 云盘地址：代理健康时走代理，否则直连原生缩略图
    pub(crate) fn drive_url(&self, candidate: &str, proxy_type: &str) -> Result<String, ResolveError> {
        let file_id = UrlDetector::extract_drive_file_id(candidate)
            .ok_or_else(|| ResolveError::IdentifierNotFound(candidate.to_string()))?;

        if self.health.is_healthy() {
            Ok(self.bust(MediaPath::provider_proxy_url(
                &self.config.api_base_url,
                &self.config.drive_provider,
                &file_id,
                proxy_type,
            )))
        } else {
            Ok(MediaPath::drive_thumbnail_url(
                &file_id,
                self.config.drive_thumbnail_width,
            ))
        }
    }

    fn bust(&self, url: String) -> String {
        match self.cache_bust() {
            Some(stamp) => MediaPath::with_cache_bust(&url, &stamp),
            None => url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::media::state_store::MemoryStore;
    use proptest::prelude::*;
    use serde_json::json;

    const API: &str = "http://127.0.0.1:9/api";
    const ASSETS: &str = "http://127.0.0.1:9";

    fn config() -> MediaConfig {
        MediaConfig {
            api_base_url: API.to_string(),
            asset_base_url: ASSETS.to_string(),
            frontend_hosts: vec!["app.example.com".to_string()],
            probe_timeout_secs: 1,
            ..MediaConfig::default()
        }
    }

    async fn create_resolver_with(config: MediaConfig) -> MediaResolver {
        let config = Arc::new(config);
        let health = ProxyHealthTracker::load(&config, Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        MediaResolver::new(config, Arc::new(health))
    }

    async fn create_resolver() -> MediaResolver {
        create_resolver_with(config()).await
    }

    #[tokio::test]
    async fn test_absent_reference_uses_kind_placeholder() {
        let resolver = create_resolver().await;
        assert_eq!(resolver.resolve(&MediaReference::Absent, MediaKind::Image), "/images/default-post.png");
        assert_eq!(resolver.resolve(&MediaReference::Absent, MediaKind::Video), "/images/video-placeholder.png");
        assert_eq!(resolver.resolve(&MediaReference::Absent, MediaKind::Avatar), "/images/default-avatar.png");
    }

    #[tokio::test]
    async fn test_unrecognized_record_uses_avatar_placeholder() {
        let resolver = create_resolver().await;
        let record = MediaReference::from_value(json!({ "src": "x.png" }));

        for kind in [MediaKind::Image, MediaKind::Video, MediaKind::Avatar] {
            assert_eq!(resolver.resolve(&record, kind), "/images/default-avatar.png");
        }
    }

    #[tokio::test]
    async fn test_unrecognized_record_kind_specific_fallback() {
        let resolver = create_resolver_with(MediaConfig {
            record_fallback: RecordFallback::KindSpecific,
            ..config()
        })
        .await;
        let record = MediaReference::from_value(json!({ "src": "x.png" }));
        assert_eq!(resolver.resolve(&record, MediaKind::Video), "/images/video-placeholder.png");
    }

    #[tokio::test]
    async fn test_empty_string_uses_kind_placeholder() {
        let resolver = create_resolver().await;
        assert_eq!(resolver.resolve(&"".into(), MediaKind::Video), "/images/video-placeholder.png");
    }

    #[tokio::test]
    async fn test_drive_healthy_uses_proxy() {
        let resolver = create_resolver().await;
        let reference = MediaReference::from("https://drive.google.com/file/d/ABC123/view");

        assert_eq!(
            resolver.resolve(&reference, MediaKind::Image),
            format!("{}/proxy/google-drive/ABC123?type=image", API)
        );
        assert_eq!(
            resolver.resolve(&reference, MediaKind::Video),
            format!("{}/proxy/google-drive/ABC123?type=video", API)
        );
    }

    #[tokio::test]
    async fn test_cache_bust_change_invalidates_cached_entries() {
        let resolver = create_resolver().await;
        assert_eq!(
            resolver.resolve_str("photos/a.jpg", MediaKind::Image),
            format!("{}/uploads/photos/a.jpg", ASSETS)
        );

        // 只更换标记，不清空缓存
        resolver.set_cache_bust(Some("42".to_string()));
        assert_eq!(
            resolver.resolve_str("photos/a.jpg", MediaKind::Image),
            format!("{}/uploads/photos/a.jpg?v=42", ASSETS)
        );
    }

    #[tokio::test]
    async fn test_drive_without_identifier_uses_placeholder() {
        let resolver = create_resolver().await;
        let reference = MediaReference::from("https://drive.google.com/drive/my-drive");
        assert_eq!(resolver.resolve(&reference, MediaKind::Image), "/images/default-post.png");
    }

    #[tokio::test]
    async fn test_drive_switches_to_direct_after_failed_probe() {
        let resolver = create_resolver().await;
        let reference = MediaReference::from("https://drive.google.com/open?id=ABC123");

        let proxied = resolver.resolve(&reference, MediaKind::Image);
        assert!(proxied.starts_with(API));

        // 探测地址不可达，状态切换为不健康
        resolver.health().probe().await;
        assert!(!resolver.health().is_healthy());

        assert_eq!(
            resolver.resolve(&reference, MediaKind::Image),
            "https://drive.google.com/thumbnail?id=ABC123&sz=w1000"
        );
    }

    #[tokio::test]
    async fn test_youtube_shapes_share_thumbnail() {
        let resolver = create_resolver().await;
        let expected = "https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg";

        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
        ] {
            assert_eq!(resolver.resolve(&url.into(), MediaKind::Video), expected);
        }
    }

    #[tokio::test]
    async fn test_protocol_relative_urls_resolve_as_https() {
        let resolver = create_resolver().await;

        for url in ["//www.youtube.com/watch?v=dQw4w9WgXcQ", "//youtu.be/dQw4w9WgXcQ"] {
            assert_eq!(
                resolver.resolve(&url.into(), MediaKind::Video),
                "https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
            );
        }

        assert_eq!(
            resolver.resolve(&"//cdn.other.net/x.jpg".into(), MediaKind::Image),
            format!("{}/proxy/generic/https%3A%2F%2Fcdn.other.net%2Fx.jpg?type=image", API)
        );
        assert_eq!(
            resolver.resolve(&"//drive.google.com/file/d/ABC123/view".into(), MediaKind::Image),
            format!("{}/proxy/google-drive/ABC123?type=image", API)
        );
    }

    #[tokio::test]
    async fn test_same_origin_pass_through() {
        let resolver = create_resolver().await;
        let url = "https://app.example.com/static/banner.png";
        assert_eq!(resolver.resolve(&url.into(), MediaKind::Image), url);
    }

    #[tokio::test]
    async fn test_foreign_origin_goes_through_generic_proxy() {
        let resolver = create_resolver().await;
        let resolved = resolver.resolve(&"https://cdn.other.net/a.jpg".into(), MediaKind::Image);
        assert_eq!(
            resolved,
            format!("{}/proxy/generic/https%3A%2F%2Fcdn.other.net%2Fa.jpg?type=image", API)
        );
    }

    #[tokio::test]
    async fn test_local_path_templates() {
        let resolver = create_resolver().await;
        assert_eq!(
            resolver.resolve(&"photo.jpg".into(), MediaKind::Image),
            format!("{}/uploads/photo.jpg", ASSETS)
        );
        assert_eq!(
            resolver.resolve(&"u1.png".into(), MediaKind::Avatar),
            format!("{}/uploads/avatars/u1.png", ASSETS)
        );
    }

    #[tokio::test]
    async fn test_record_resolves_priority_key() {
        let resolver = create_resolver().await;
        let record = MediaReference::from_value(json!({ "secure_url": "https://app.example.com/x.jpg", "path": "y.jpg" }));
        assert_eq!(resolver.resolve(&record, MediaKind::Image), "https://app.example.com/x.jpg");
    }

    #[tokio::test]
    async fn test_invalid_url_degrades_to_placeholder() {
        let resolver = create_resolver().await;
        assert_eq!(
            resolver.resolve(&"http://exa mple.com/a.png".into(), MediaKind::Avatar),
            "/images/default-avatar.png"
        );
    }

    #[tokio::test]
    async fn test_cache_bust_applies_to_backend_urls_only() {
        let resolver = create_resolver().await;
        resolver.set_cache_bust(Some("77".to_string()));

        assert_eq!(
            resolver.resolve(&"photo.jpg".into(), MediaKind::Image),
            format!("{}/uploads/photo.jpg?v=77", ASSETS)
        );
        assert_eq!(
            resolver.resolve(&"https://youtu.be/dQw4w9WgXcQ".into(), MediaKind::Image),
            "https://img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
        );
        assert_eq!(
            resolver.resolve(&"https://app.example.com/a.png".into(), MediaKind::Image),
            "https://app.example.com/a.png"
        );
    }

    #[tokio::test]
    async fn test_cached_keys_and_invalidate() {
        let resolver = create_resolver().await;
        resolver.resolve(&"a.jpg".into(), MediaKind::Image);
        resolver.resolve(&"a.jpg".into(), MediaKind::Avatar);
        resolver.resolve(&"a.jpg".into(), MediaKind::Image);

        assert_eq!(resolver.cache_len(), 2);
        let mut keys = resolver.cached_keys();
        keys.sort_by_key(|(_, kind)| kind.as_str());
        assert_eq!(keys[0], ("a.jpg".to_string(), MediaKind::Avatar));

        resolver.invalidate_all();
        assert!(resolver.cached_keys().is_empty());
    }

    proptest! {
        #[test]
        fn prop_resolve_is_idempotent(candidate in "\\PC{0,40}", kind_idx in 0usize..3) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let resolver = rt.block_on(create_resolver());
            let kind = [MediaKind::Image, MediaKind::Video, MediaKind::Avatar][kind_idx];
            let reference = MediaReference::from(candidate);

            let first = resolver.resolve(&reference, kind);
            let second = resolver.resolve(&reference, kind);
            prop_assert_eq!(&first, &second);
            prop_assert!(!first.is_empty());
            // 解析本身从不发起探测
            prop_assert_eq!(resolver.health().generation(), 0);
        }
    }
}
