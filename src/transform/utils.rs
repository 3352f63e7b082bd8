//! 转换工具函数

/// 未带前缀的 base64 图片按 PNG 处理
pub const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

/// 解析 data URL，返回 (media type, data)
pub fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let comma_pos = rest.find(',')?;
    let meta = &rest[..comma_pos];
    let data = &rest[comma_pos + 1..];

    let media_type = match meta.find(';') {
        Some(semi_pos) => meta[..semi_pos].to_string(),
        None => meta.to_string(),
    };

    Some((media_type, data.to_string()))
}

/// 构造图片 data URL；已经是 data URL 的原样返回，避免重复加前缀
pub fn image_data_url(image: &str) -> String {
    if parse_data_url(image).is_some() {
        return image.to_string();
    }
    format!("data:{};base64,{}", DEFAULT_IMAGE_MEDIA_TYPE, image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_url_png() {
        let (media_type, data) = parse_data_url("data:image/png;base64,iVBORw0KGgo=").unwrap();
        assert_eq!(media_type, "image/png");
        assert_eq!(data, "iVBORw0KGgo=");
    }

    #[test]
    fn test_parse_data_url_jpeg() {
        let (media_type, data) = parse_data_url("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        assert_eq!(media_type, "image/jpeg");
        assert_eq!(data, "/9j/4AAQ");
    }

    #[test]
    fn test_parse_data_url_invalid() {
        assert!(parse_data_url("https://example.com/image.png").is_none());
        assert!(parse_data_url("iVBORw0KGgo=").is_none());
    }

    #[test]
    fn test_image_data_url_prefixes_raw_base64() {
        assert_eq!(image_data_url("iVBORw0KGgo="), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn test_image_data_url_keeps_existing_prefix() {
        let url = "data:image/jpeg;base64,/9j/4AAQ";
        assert_eq!(image_data_url(url), url);
    }
}
