use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 帖子、头像、快拍上携带的原始媒体引用
///
/// 后端返回的媒体字段形态不统一：可能缺失、可能是裸字符串（URL 或相对路径），
/// 也可能是包含若干候选键名的对象。解析前统一建模为这个枚举，
/// 形态判断只在 `ReferenceExtractor` 这一层进行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum MediaReference {
    /// 字段缺失或为 null
    #[default]
    Absent,
    /// 裸字符串（完整 URL 或相对存储键）
    Raw(String),
    /// 结构化记录（如 `{ "secure_url": "..." }`）
    Record(Map<String, Value>),
}

impl MediaReference {
    /// 从任意 JSON 值构造媒体引用
    ///
    /// 数字、布尔、数组等无法识别的形态一律视为缺失。
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => MediaReference::Raw(s),
            Value::Object(map) => MediaReference::Record(map),
            _ => MediaReference::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, MediaReference::Absent)
    }

    pub fn is_record(&self) -> bool {
        matches!(self, MediaReference::Record(_))
    }
}

impl From<&str> for MediaReference {
    fn from(s: &str) -> Self {
        MediaReference::Raw(s.to_string())
    }
}

impl From<String> for MediaReference {
    fn from(s: String) -> Self {
        MediaReference::Raw(s)
    }
}

impl From<Option<String>> for MediaReference {
    fn from(value: Option<String>) -> Self {
        value.map(MediaReference::Raw).unwrap_or_default()
    }
}

impl From<Value> for MediaReference {
    fn from(value: Value) -> Self {
        MediaReference::from_value(value)
    }
}

/// 媒体类型
///
/// 决定默认占位图以及无提供方时使用的本地路径模板
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Avatar,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Avatar => "avatar",
        }
    }

    /// 代理接口的 `type` 参数（头像按图片代理）
    pub fn proxy_type(&self) -> &'static str {
        match self {
            MediaKind::Image | MediaKind::Avatar => "image",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 列表中的一条媒体（信息流帖子或快拍），交给预加载器使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    #[serde(default)]
    pub media: MediaReference,
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn new(id: impl Into<String>, media: impl Into<MediaReference>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            media: media.into(),
            kind,
        }
    }
}
