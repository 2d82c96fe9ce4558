use log::error;

use crate::{
    html::{body, h1, head, html, meta, p, style, title},
    param::status_phrase,
};

/// 参数名转请求头名：`user_agent` → `User-Agent`
pub fn snake2hyphens(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

/// 状态码对应的原因短语，未知状态码返回 `Unknown`
pub fn reason_phrase(code: u16) -> &'static str {
    match status_phrase(code) {
        Some(phrase) => phrase,
        None => {
            error!("非法的状态码：{}", code);
            "Unknown"
        }
    }
}

/// 默认错误页面。`note` 缺省时使用状态码的原因短语。
pub fn error_page(code: u16, note: Option<&str>) -> String {
    let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            ";
    let description = note.unwrap_or_else(|| reason_phrase(code));
    let page = html()
        .child(
            head()
                .child(meta().attr("charset", "utf-8"))
                .child(title().text(code))
                .child(style().text(css)),
        )
        .child(
            body()
                .child(h1().text(code))
                .child(p().text(description)),
        );
    page.to_html()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake2hyphens() {
        assert_eq!(snake2hyphens("user_agent"), "User-Agent");
        assert_eq!(snake2hyphens("hx_request"), "Hx-Request");
        assert_eq!(snake2hyphens("host"), "Host");
        assert_eq!(snake2hyphens(""), "");
    }

    #[test]
    fn test_file_size_bytes() {
        assert_eq!(format_file_size(0), "0.0 B");
        assert_eq!(format_file_size(1023), "1023.0 B");
    }

    #[test]
    fn test_file_size_units() {
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_file_size(1024 * 1024 * 1024), "1.0 GB");
        assert_eq!(format_file_size(1024_u64.pow(4)), "1.0 TB");
        assert_eq!(format_file_size(1024_u64.pow(5)), "1024.0 TB");
    }

    #[test]
    fn test_reason_phrase() {
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(599), "Unknown");
    }

    #[test]
    fn test_error_page() {
        let page = error_page(404, None);
        assert!(page.starts_with("<!doctype html>"));
        assert!(page.contains("<h1>404</h1>"));
        assert!(page.contains("<p>Not Found</p>"));

        let page = error_page(401, Some("not authenticated"));
        assert!(page.contains("<p>not authenticated</p>"));
    }
}
