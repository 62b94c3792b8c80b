// 信息流媒体库
//
// 本库提供信息流客户端的媒体解析层，包括：
// - 媒体引用模型
// - URL 解析与解析缓存
// - 代理健康追踪
// - 播放协调
// - 预加载与缓存刷新

pub mod models;
pub mod services;
