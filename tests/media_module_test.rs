// 媒体模块集成测试
//
// 使用本地 axum 服务模拟后端代理与上传目录，验证健康探测、解析切换与预加载请求

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use feed_media::models::{MediaItem, MediaKind, MediaReference};
use feed_media::services::media::{
    HttpProbe, JsonFileStore, MediaConfig, MediaContext, MediaHandle, MediaProbe, MemoryStore,
    PreloadMode, PreloadState, ProbeError, ProxyHealth, StateStore, PROXY_HEALTH_KEY,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const UPLOAD_SIZE: usize = 200 * 1024;

/// 模拟后端状态
#[derive(Clone, Default)]
struct Backend {
    proxy_down: Arc<AtomicBool>,
    proxy_hits: Arc<AtomicUsize>,
    ranges: Arc<Mutex<Vec<Option<String>>>>,
}

async fn proxy(State(backend): State<Backend>, Path((_provider, _id)): Path<(String, String)>) -> StatusCode {
    backend.proxy_hits.fetch_add(1, Ordering::SeqCst);
    if backend.proxy_down.load(Ordering::SeqCst) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn upload(
    State(backend): State<Backend>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Vec<u8>) {
    let range = headers
        .get("range")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    backend.ranges.lock().unwrap().push(range);

    if path.contains("missing") {
        return (StatusCode::NOT_FOUND, Vec::new());
    }
    // 故意忽略 Range，返回完整内容
    (StatusCode::OK, vec![0u8; UPLOAD_SIZE])
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// 启动模拟后端，返回根地址
async fn spawn_backend(backend: Backend) -> String {
    init_tracing();

    let app = Router::new()
        .route("/api/proxy/:provider/:id", get(proxy))
        .route("/uploads/*path", get(upload))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn config_for(base: &str) -> MediaConfig {
    MediaConfig {
        api_base_url: format!("{}/api", base),
        asset_base_url: base.to_string(),
        probe_timeout_secs: 2,
        ..MediaConfig::default()
    }
}

#[cfg(test)]
mod health_tests {
    use super::*;

    const DRIVE_URL: &str = "https://drive.google.com/file/d/FILE123/view";

    #[tokio::test]
    async fn test_probe_transitions_switch_resolution() {
        let backend = Backend::default();
        let base = spawn_backend(backend.clone()).await;
        let context = MediaContext::with_store(config_for(&base), Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        let resolver = context.resolver();
        let drive = MediaReference::from(DRIVE_URL);

        // 健康：走代理
        assert_eq!(context.health().probe().await, ProxyHealth::Healthy);
        assert_eq!(
            resolver.resolve(&drive, MediaKind::Image),
            format!("{}/api/proxy/google-drive/FILE123?type=image", base)
        );

        // 代理故障：探测失败后直连原生缩略图
        backend.proxy_down.store(true, Ordering::SeqCst);
        assert_eq!(context.health().probe().await, ProxyHealth::Unhealthy);
        assert_eq!(
            resolver.resolve(&drive, MediaKind::Image),
            "https://drive.google.com/thumbnail?id=FILE123&sz=w1000"
        );
        assert_eq!(context.store().get_bool(PROXY_HEALTH_KEY).await, Some(false));

        // 代理恢复：只有探测成功才恢复
        backend.proxy_down.store(false, Ordering::SeqCst);
        assert_eq!(
            resolver.resolve(&drive, MediaKind::Image),
            "https://drive.google.com/thumbnail?id=FILE123&sz=w1000"
        );
        assert_eq!(context.health().probe().await, ProxyHealth::Healthy);
        assert_eq!(
            resolver.resolve(&drive, MediaKind::Image),
            format!("{}/api/proxy/google-drive/FILE123?type=image", base)
        );
        assert_eq!(backend.proxy_hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_load_failure_persists_across_restart() {
        let backend = Backend::default();
        let base = spawn_backend(backend).await;
        let dir = tempfile::TempDir::new().unwrap();
        let state_path = dir.path().join("media_state.json");

        {
            let store = Arc::new(JsonFileStore::load(state_path.clone()).await.unwrap());
            let context = MediaContext::with_store(config_for(&base), store).await.unwrap();
            let proxied = context
                .resolver()
                .resolve(&MediaReference::from(DRIVE_URL), MediaKind::Video);
            assert!(context.health().report_load_failure(&proxied).await);
        }

        let store = Arc::new(JsonFileStore::load(state_path).await.unwrap());
        let context = MediaContext::with_store(config_for(&base), store).await.unwrap();
        assert_eq!(context.health().state(), ProxyHealth::Unhealthy);

        // 后台探测成功后恢复
        let (probe, refresh) = context.start_background();
        assert_eq!(probe.await.unwrap(), ProxyHealth::Healthy);
        refresh.abort();
    }
}

#[cfg(test)]
mod probe_tests {
    use super::*;

    #[tokio::test]
    async fn test_metadata_mode_sends_range() {
        let backend = Backend::default();
        let base = spawn_backend(backend.clone()).await;
        let probe = HttpProbe::new(&config_for(&base)).unwrap();

        let received = probe
            .load("/uploads/clips/a.mp4", MediaKind::Video, PreloadMode::Metadata)
            .await
            .unwrap();

        assert!(received >= 64 * 1024);
        assert_eq!(
            backend.ranges.lock().unwrap().as_slice(),
            &[Some("bytes=0-65535".to_string())]
        );
    }

    #[tokio::test]
    async fn test_full_mode_reads_everything() {
        let backend = Backend::default();
        let base = spawn_backend(backend.clone()).await;
        let probe = HttpProbe::new(&config_for(&base)).unwrap();

        let received = probe
            .load(&format!("{}/uploads/a.jpg", base), MediaKind::Image, PreloadMode::Full)
            .await
            .unwrap();

        assert_eq!(received, UPLOAD_SIZE as u64);
        assert_eq!(backend.ranges.lock().unwrap().as_slice(), &[None::<String>]);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let base = spawn_backend(Backend::default()).await;
        let probe = HttpProbe::new(&config_for(&base)).unwrap();

        let result = probe
            .load("/uploads/missing.jpg", MediaKind::Image, PreloadMode::Full)
            .await;
        assert!(matches!(result, Err(ProbeError::HttpError(404))));
    }
}

#[cfg(test)]
mod preload_tests {
    use super::*;

    struct Video {
        id: u64,
        paused: AtomicBool,
    }

    impl MediaHandle for Video {
        fn id(&self) -> u64 {
            self.id
        }

        fn pause(&self) {
            self.paused.store(true, Ordering::SeqCst);
        }
    }

    fn stories(count: usize) -> Vec<MediaItem> {
        (0..count)
            .map(|i| MediaItem::new(format!("story-{}", i), format!("stories/{}.jpg", i), MediaKind::Image))
            .collect()
    }

    #[tokio::test]
    async fn test_story_viewer_pauses_feed_and_preloads() {
        let backend = Backend::default();
        let base = spawn_backend(backend.clone()).await;
        let context = MediaContext::with_store(config_for(&base), Arc::new(MemoryStore::new()))
            .await
            .unwrap();

        let video = Arc::new(Video {
            id: 7,
            paused: AtomicBool::new(false),
        });
        let handle: Arc<dyn MediaHandle> = video.clone();
        context.playback().register_feed_video(&handle);
        context.playback().set_current_video(handle.clone());

        let viewer = context.story_preloader("");
        let list = stories(5);
        assert_eq!(viewer.open_viewer(&list, 0), 1);
        assert!(video.paused.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(800)).await;
        let tasks = viewer.active_tasks();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|task| task.state == PreloadState::Ready));
        assert_eq!(backend.ranges.lock().unwrap().len(), 2);

        viewer.close_viewer();
        assert!(viewer.active_tasks().is_empty());
        viewer.shutdown().await;
    }

    #[tokio::test]
    async fn test_feed_preloader_follows_scroll() {
        let base = spawn_backend(Backend::default()).await;
        let context = MediaContext::with_store(config_for(&base), Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        let feed = context.feed_preloader("");
        let posts = stories(10);

        feed.on_visible(&posts, 2);
        let mut ids: Vec<String> = feed.active_tasks().into_iter().map(|t| t.item_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["story-3", "story-4", "story-5"]);

        feed.on_visible(&posts, 5);
        let mut ids: Vec<String> = feed.active_tasks().into_iter().map(|t| t.item_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["story-6", "story-7", "story-8"]);

        feed.shutdown().await;
    }
}
