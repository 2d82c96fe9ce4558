// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 框架协议参数与常量模块
//!
//! 请求/响应管线共用的常量：状态码短语、MIME 类型、方法与编码枚举，
//! 以及 HTMX 请求头对照表和整页默认脚本。

use std::fmt;

/// `Server` 响应头
pub const SERVER_NAME: &str = "hxweb";

pub const CRLF: &str = "\r\n";

/// 整页文档缺少 `<title>` 时使用的默认标题
pub const DEFAULT_TITLE: &str = "FastHTML page";

/// 默认的会话 Cookie 名称
pub const SESSION_COOKIE: &str = "session_";

/// 会话 Cookie 的默认有效期：一年（秒）
pub const SESSION_MAX_AGE: i64 = 365 * 24 * 3600;

/// 标记局部更新（fragment）请求的请求头
pub const HX_REQUEST: &str = "hx-request";

/// 静态文件路由的扩展名白名单，对应路由模板中的 `{ext:static}` 转换器
pub const STATIC_EXTS: &[&str] = &[
    "ico", "gif", "jpg", "jpeg", "webm", "css", "js", "woff", "png", "svg", "mp4", "webp", "ttf",
    "otf", "eot", "woff2", "txt", "xml", "html",
];

/// HTMX 请求头对照表：(参数字段名, 请求头名)
pub const HTMX_HEADERS: &[(&str, &str)] = &[
    ("boosted", "HX-Boosted"),
    ("current_url", "HX-Current-URL"),
    ("history_restore_request", "HX-History-Restore-Request"),
    ("prompt", "HX-Prompt"),
    ("request", "HX-Request"),
    ("target", "HX-Target"),
    ("trigger_name", "HX-Trigger-Name"),
    ("trigger", "HX-Trigger"),
];

/// `default_hdrs` 开启时注入整页 `<head>` 的脚本地址
pub const HTMX_SRC: &str = "https://unpkg.com/htmx.org@next/dist/htmx.min.js";
pub const SURREAL_SRC: &str = "https://cdn.jsdelivr.net/gh/gnat/surreal/surreal.js";
pub const CSS_SCOPE_SRC: &str = "https://cdn.jsdelivr.net/gh/gnat/css-scope-inline/script.js";

/// RFC 9110 中的原因短语，未收录的状态码返回 `None`
pub fn status_phrase(code: u16) -> Option<&'static str> {
    let phrase = match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        413 => "Content Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Content",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        505 => "HTTP Version Not Supported",
        _ => return None,
    };
    Some(phrase)
}

/// 按小写后缀名查 MIME 类型，覆盖 `STATIC_EXTS` 的全部后缀
pub fn mime_type(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "html" | "htm" => "text/html;charset=utf-8",
        "css" => "text/css;charset=utf-8",
        "js" => "text/javascript;charset=utf-8",
        "mjs" => "text/javascript",
        "txt" => "text/plain;charset=utf-8",
        "json" => "application/json",
        "xml" => "text/xml",
        "csv" => "text/csv",
        "ico" => "image/x-icon",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => return None,
    };
    Some(mime)
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Delete,
    Patch,
    Trace,
}

impl HttpRequestMethod {
    /// 全部可注册的方法，顺序与 `Allow` 头的输出顺序一致
    pub const ALL: [HttpRequestMethod; 8] = [
        HttpRequestMethod::Get,
        HttpRequestMethod::Post,
        HttpRequestMethod::Put,
        HttpRequestMethod::Delete,
        HttpRequestMethod::Patch,
        HttpRequestMethod::Head,
        HttpRequestMethod::Trace,
        HttpRequestMethod::Options,
    ];

    /// 大小写不敏感地解析方法名
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpRequestMethod::Get),
            "HEAD" => Some(HttpRequestMethod::Head),
            "OPTIONS" => Some(HttpRequestMethod::Options),
            "POST" => Some(HttpRequestMethod::Post),
            "PUT" => Some(HttpRequestMethod::Put),
            "DELETE" => Some(HttpRequestMethod::Delete),
            "PATCH" => Some(HttpRequestMethod::Patch),
            "TRACE" => Some(HttpRequestMethod::Trace),
            _ => None,
        }
    }
}

/// `Accept-Encoding` 中可协商的压缩算法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpEncoding {
    Gzip,
    Deflate,
    Br,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpVersion::V1_0 => "HTTP/1.0",
            HttpVersion::V1_1 => "HTTP/1.1",
        })
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            HttpRequestMethod::Get => "GET",
            HttpRequestMethod::Head => "HEAD",
            HttpRequestMethod::Options => "OPTIONS",
            HttpRequestMethod::Post => "POST",
            HttpRequestMethod::Put => "PUT",
            HttpRequestMethod::Delete => "DELETE",
            HttpRequestMethod::Patch => "PATCH",
            HttpRequestMethod::Trace => "TRACE",
        };
        f.write_str(name)
    }
}

impl fmt::Display for HttpEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpEncoding::Gzip => "gzip",
            HttpEncoding::Deflate => "deflate",
            HttpEncoding::Br => "br",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse_case_insensitive() {
        assert_eq!(HttpRequestMethod::parse("get"), Some(HttpRequestMethod::Get));
        assert_eq!(HttpRequestMethod::parse("Delete"), Some(HttpRequestMethod::Delete));
        assert_eq!(HttpRequestMethod::parse("BREW"), None);
    }

    #[test]
    fn test_every_static_ext_has_mime() {
        for ext in STATIC_EXTS {
            assert!(mime_type(ext).is_some(), "缺少MIME类型：{}", ext);
        }
    }

    #[test]
    fn test_status_phrase() {
        assert_eq!(status_phrase(303), Some("See Other"));
        assert_eq!(status_phrase(431), Some("Request Header Fields Too Large"));
        assert_eq!(status_phrase(299), None);
    }

    #[test]
    fn test_method_display_roundtrip() {
        for m in HttpRequestMethod::ALL {
            assert_eq!(HttpRequestMethod::parse(&m.to_string()), Some(m));
        }
    }
}
