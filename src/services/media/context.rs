// 媒体上下文 - 解析层全部共享服务的显式集合
//
// 进程启动时构建一次，界面层通过它拿到解析器、播放协调器和预加载器。

use crate::models::MediaItem;
use crate::services::media::error::MediaError;
use crate::services::media::health::{ProxyHealth, ProxyHealthTracker};
use crate::services::media::playback::PlaybackCoordinator;
use crate::services::media::preload::{
    EngineFamily, FeedPreloader, HttpProbe, PreloadSettings, SinglePreload, StoryPreloader,
};
use crate::services::media::refresh::CacheRefresher;
use crate::services::media::resolver::MediaResolver;
use crate::services::media::state_store::{JsonFileStore, StateStore};
use crate::services::media::MediaConfig;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// 媒体上下文
#[derive(Clone)]
pub struct MediaContext {
    config: Arc<MediaConfig>,
    store: Arc<dyn StateStore>,
    health: Arc<ProxyHealthTracker>,
    resolver: Arc<MediaResolver>,
    playback: Arc<PlaybackCoordinator>,
    refresher: Arc<CacheRefresher>,
    probe: Arc<HttpProbe>,
}

impl MediaContext {
    /// 使用配置中的状态文件构建
    ///
    /// # 示例
    /// ```no_run
    /// use feed_media::models::MediaKind;
    /// use feed_media::services::media::{MediaConfig, MediaContext};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let context = MediaContext::new(MediaConfig::from_env()).await?;
    /// let url = context.resolver().resolve(&"avatars/u1.png".into(), MediaKind::Avatar);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: MediaConfig) -> Result<Self, MediaError> {
        let store = JsonFileStore::load(config.state_path.clone()).await?;
        Self::with_store(config, Arc::new(store)).await
    }

    /// 使用指定的持久存储构建
    pub async fn with_store(config: MediaConfig, store: Arc<dyn StateStore>) -> Result<Self, MediaError> {
        let config = Arc::new(config);
        let health = Arc::new(ProxyHealthTracker::load(&config, Arc::clone(&store)).await?);
        let resolver = Arc::new(MediaResolver::new(Arc::clone(&config), Arc::clone(&health)));
        let refresher = Arc::new(CacheRefresher::new(
            Arc::clone(&resolver),
            Arc::clone(&store),
            config.cache_refresh_interval(),
        ));
        let probe = Arc::new(HttpProbe::new(&config)?);

        info!("媒体上下文初始化完成，API: {}", config.api_base_url);

        Ok(Self {
            config,
            store,
            health,
            resolver,
            playback: Arc::new(PlaybackCoordinator::new()),
            refresher,
            probe,
        })
    }

    pub fn config(&self) -> &Arc<MediaConfig> {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn health(&self) -> &Arc<ProxyHealthTracker> {
        &self.health
    }

    pub fn resolver(&self) -> &Arc<MediaResolver> {
        &self.resolver
    }

    pub fn playback(&self) -> &Arc<PlaybackCoordinator> {
        &self.playback
    }

    pub fn refresher(&self) -> &Arc<CacheRefresher> {
        &self.refresher
    }

    /// 启动后台任务：一次代理探测与定期缓存刷新
    pub fn start_background(&self) -> (JoinHandle<ProxyHealth>, JoinHandle<()>) {
        let probe = self.health.spawn_probe();
        let refresher = Arc::clone(&self.refresher);
        let period = self.config.cache_refresh_interval();
        let refresh = tokio::spawn(refresher.start(period));
        (probe, refresh)
    }

    pub fn feed_preloader(&self, user_agent: &str) -> FeedPreloader<HttpProbe> {
        FeedPreloader::with_settings(
            Arc::clone(&self.resolver),
            Arc::clone(&self.probe),
            PreloadSettings::feed().engine(EngineFamily::detect(user_agent)),
        )
    }

    pub fn story_preloader(&self, user_agent: &str) -> StoryPreloader<HttpProbe> {
        StoryPreloader::with_settings(
            Arc::clone(&self.resolver),
            Arc::clone(&self.probe),
            Arc::clone(&self.playback),
            PreloadSettings::story().engine(EngineFamily::detect(user_agent)),
        )
    }

    pub fn single_preload(&self, item: &MediaItem, user_agent: &str) -> SinglePreload<HttpProbe> {
        SinglePreload::with_settings(
            Arc::clone(&self.resolver),
            Arc::clone(&self.probe),
            item,
            PreloadSettings::single().engine(EngineFamily::detect(user_agent)),
        )
    }
}
