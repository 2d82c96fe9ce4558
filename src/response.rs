use crate::{
    cache::FileCache,
    exception::Exception,
    param::*,
    request::Request,
    util::{error_page, format_file_size, reason_phrase},
};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error};
use serde_json::Value;

use std::{
    ffi::OsStr,
    io::{self, Write},
    path::Path,
    sync::Mutex,
};

/// 发往客户端的 HTTP 响应
#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    date: DateTime<Utc>,
    content_encoding: Option<HttpEncoding>,
    server_name: String,
    headers: Vec<(String, String)>,
    cookies: Vec<String>,
    content: Bytes,
    content_length: usize,
    headonly: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            date: Utc::now(),
            content_encoding: None,
            server_name: SERVER_NAME.to_string(),
            headers: Vec::new(),
            cookies: Vec::new(),
            content: Bytes::new(),
            content_length: 0,
            headonly: false,
        }
    }

    fn with_body(content_type: &str, content: impl Into<Bytes>) -> Self {
        let mut response = Self::new();
        response.content = content.into();
        response.content_length = response.content.len();
        response.content_type = Some(content_type.to_string());
        response
    }

    pub fn html(html: impl Into<String>) -> Self {
        Self::with_body("text/html;charset=utf-8", html.into())
    }

    pub fn json(value: &Value) -> Self {
        Self::with_body("application/json", value.to_string())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_body("text/plain;charset=utf-8", text.into())
    }

    /// `303 See Other` 重定向
    pub fn redirect(location: &str) -> Self {
        Self::redirect_with(location, 303)
    }

    pub fn redirect_with(location: &str, code: u16) -> Self {
        Self::new().status(code).header("Location", location)
    }

    /// 带默认错误页面的响应
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        Self::html(error_page(code, note)).status(code)
    }

    /// 由异常生成错误响应；`405` 附带 `Allow` 头
    pub fn from_exception(e: &Exception) -> Self {
        let code = e.status_code();
        let note = match e {
            Exception::Http(_, msg) => msg.clone(),
            other => other.to_string(),
        };
        let mut response = Self::from_status_code(code, Some(&note));
        if let Exception::MethodNotAllowed(allow) = e {
            response = response.header("Allow", allow);
        }
        response
    }

    /// 读取文件作为响应体，MIME 类型由扩展名决定
    pub fn from_file(path: &Path, cache: &Mutex<FileCache>) -> Result<Self, Exception> {
        let bytes = {
            let mut cache = match cache.lock() {
                Ok(lock) => lock,
                Err(poisoned) => poisoned.into_inner(),
            };
            cache.read(path)?
        };
        debug!(
            "读取文件{}，大小{}",
            path.display(),
            format_file_size(bytes.len() as u64)
        );
        let mime = path.extension().map_or("application/octet-stream", get_mime);
        Ok(Self::with_body(mime, bytes))
    }

    pub fn status(mut self, code: u16) -> Self {
        self.set_code(code);
        self
    }

    /// 追加一个响应头。`Content-Type` 会替换现有类型。
    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = Some(value.to_string());
        } else {
            self.headers.push((key.to_string(), value.to_string()));
        }
        self
    }

    /// 追加一行 `Set-Cookie`
    pub fn cookie(mut self, line: impl Into<String>) -> Self {
        self.cookies.push(line.into());
        self
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = reason_phrase(code).to_string();
        self
    }

    /// 按请求协商压缩编码，`HEAD` 请求只保留响应头
    pub fn finalize(mut self, request: &Request) -> Self {
        let id = request.id();
        self.date = Utc::now();
        self.version = request.version();
        if request.method() == HttpRequestMethod::Head {
            debug!("[ID{}]请求方法为HEAD，不发送响应体", id);
            self.headonly = true;
            return self;
        }
        let skip = self.content_type.as_deref().map_or(true, is_precompressed);
        if self.content.is_empty() || skip || self.content_encoding.is_some() {
            return self;
        }
        let encoding = match decide_encoding(&request.accept_encoding()) {
            Some(e) => e,
            None => return self,
        };
        debug!("[ID{}]响应体使用{}编码", id, encoding);
        match compress(&self.content, encoding) {
            Ok(c) => {
                self.content = Bytes::from(c);
                self.content_length = self.content.len();
                self.content_encoding = Some(encoding);
                self.headers
                    .push(("Vary".to_string(), "Accept-Encoding".to_string()));
            }
            Err(e) => error!("[ID{}]压缩响应体失败: {}，返回未压缩内容", id, e),
        }
        self
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut header = format!(
            "{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        if let Some(t) = &self.content_type {
            header.push_str(&["Content-Type: ", t, CRLF].concat());
        }
        if let Some(e) = self.content_encoding {
            header.push_str(&format!("Content-Encoding: {}{}", e, CRLF));
        }
        header.push_str(&format!("Content-Length: {}{}", self.content_length, CRLF));
        header.push_str(&["Date: ", &format_date(&self.date), CRLF].concat());
        header.push_str(&["Server: ", &self.server_name, CRLF].concat());
        for (k, v) in &self.headers {
            header.push_str(&[k.as_str(), ": ", v, CRLF].concat());
        }
        for c in &self.cookies {
            header.push_str(&["Set-Cookie: ", c, CRLF].concat());
        }
        header.push_str(CRLF);
        let body: &[u8] = if self.headonly { b"" } else { &self.content };
        [header.as_bytes(), body].concat()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// 查找响应头（不区分大小写），多个同名头返回第一个
    pub fn get_header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return self.content_type();
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    pub fn body(&self) -> &Bytes {
        &self.content
    }

    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.content).to_string()
    }

    pub fn get_content_length(&self) -> usize {
        self.content_length
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// 按选定算法压缩响应体
fn compress(data: &[u8], encoding: HttpEncoding) -> io::Result<Vec<u8>> {
    let compressed = match encoding {
        HttpEncoding::Gzip => {
            let mut gz =
                GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
            gz.write_all(data)?;
            gz.finish()?
        }
        HttpEncoding::Deflate => {
            let mut zlib =
                DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
            zlib.write_all(data)?;
            zlib.finish()?
        }
        HttpEncoding::Br => {
            let mut out = Vec::with_capacity(data.len() / 2);
            let params = BrotliEncoderParams::default();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut out, &params)?;
            out
        }
    };
    debug!("{}压缩：{} -> {} bytes", encoding, data.len(), compressed.len());
    Ok(compressed)
}

/// 已经是压缩格式的内容不再压缩
fn is_precompressed(mime: &str) -> bool {
    if mime.starts_with("image/") {
        return !mime.starts_with("image/svg");
    }
    [
        "video/",
        "audio/",
        "font/woff",
        "application/zip",
        "application/gzip",
        "application/vnd.ms-fontobject",
    ]
    .iter()
    .any(|prefix| mime.starts_with(prefix))
}

/// 协商顺序：gzip、br、deflate
fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    [HttpEncoding::Gzip, HttpEncoding::Br, HttpEncoding::Deflate]
        .into_iter()
        .find(|e| accept_encoding.contains(e))
}

fn get_mime(extension: &OsStr) -> &'static str {
    let extension = match extension.to_str() {
        Some(e) => e.to_lowercase(),
        None => {
            error!("无法将&OsStr转换为&str类型");
            return "application/octet-stream";
        }
    };
    mime_type(&extension).unwrap_or("application/octet-stream")
}
