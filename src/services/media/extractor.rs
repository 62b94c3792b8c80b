// 引用提取器 - 把任意形态的媒体字段规整为单个候选字符串

use crate::models::MediaReference;

/// 引用提取器
#[derive(Clone, Copy)]
pub struct ReferenceExtractor;

impl ReferenceExtractor {
    /// 结构化记录的键名优先级（靠前的优先）
    pub const KEY_PRIORITY: [&'static str; 8] = [
        "imageUrl",
        "image",
        "thumbnailUrl",
        "videoUrl",
        "avatarUrl",
        "url",
        "secure_url",
        "path",
    ];

    /// 提取候选字符串
    ///
    /// # 规则
    /// - 缺失 -> `None`
    /// - 裸字符串 -> 原样返回（包括空字符串，由分类器判定为无提供方）
    /// - 结构化记录 -> 按 `KEY_PRIORITY` 返回第一个存在且非空的字符串值，都没有则 `None`
    ///
    /// # 示例
    /// ```
    /// use feed_media::models::MediaReference;
    /// use feed_media::services::media::ReferenceExtractor;
    ///
    /// let reference: MediaReference =
    ///     serde_json::from_str(r#"{ "url": "b.png", "image": "a.png" }"#).unwrap();
    /// assert_eq!(ReferenceExtractor::extract(&reference), Some("a.png"));
    /// ```
    pub fn extract(reference: &MediaReference) -> Option<&str> {
        match reference {
            MediaReference::Absent => None,
            MediaReference::Raw(s) => Some(s.as_str()),
            MediaReference::Record(map) => Self::KEY_PRIORITY.iter().find_map(|key| {
                map.get(*key)
                    .and_then(|value| value.as_str())
                    .filter(|s| !s.trim().is_empty())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> MediaReference {
        MediaReference::from_value(value)
    }

    #[test]
    fn test_extract_absent() {
        assert_eq!(ReferenceExtractor::extract(&MediaReference::Absent), None);
    }

    #[test]
    fn test_extract_raw_unchanged() {
        let reference = MediaReference::from(" uploads/a.jpg ");
        assert_eq!(ReferenceExtractor::extract(&reference), Some(" uploads/a.jpg "));

        let empty = MediaReference::from("");
        assert_eq!(ReferenceExtractor::extract(&empty), Some(""));
    }

    #[test]
    fn test_extract_respects_priority() {
        let reference = record(json!({
            "path": "p.jpg",
            "secure_url": "https://res.cloudinary.com/x.jpg",
            "thumbnailUrl": "thumb.jpg"
        }));
        assert_eq!(ReferenceExtractor::extract(&reference), Some("thumb.jpg"));
    }

    #[test]
    fn test_extract_skips_empty_and_non_string_values() {
        let reference = record(json!({
            "imageUrl": "",
            "image": null,
            "thumbnailUrl": 12,
            "videoUrl": "   ",
            "avatarUrl": "a.png"
        }));
        assert_eq!(ReferenceExtractor::extract(&reference), Some("a.png"));
    }

    #[test]
    fn test_extract_record_without_known_keys() {
        let reference = record(json!({ "src": "x.png", "href": "y.png" }));
        assert_eq!(ReferenceExtractor::extract(&reference), None);
    }
}
