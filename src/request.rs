// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体。它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、路径、查询串、版本）。
//! 2. 全部请求头的保存与大小写不敏感查找。
//! 3. Cookie 与查询参数的解析。
//! 4. 表单请求体的惰性解析（首次访问时才解码）。
//!
//! 路径参数由路由器在匹配成功后写入，参数解析器随后按名称读取。

use crate::{exception::Exception, param::*};
use bytes::Bytes;
use log::{debug, error, warn};
use serde_derive::Serialize;

use std::{collections::HashMap, io, sync::OnceLock};

/// 表示一个完整的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 解码后的路径（不含查询串）
    path: String,
    /// 原始查询串（不含 `?`）
    query_string: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 按出现顺序保存的请求头，名称保持原样
    headers: Vec<(String, String)>,
    /// 解析后的查询参数，保留重复键与出现顺序
    query: Vec<(String, String)>,
    /// 解析后的 Cookie
    cookies: HashMap<String, String>,
    /// 原始请求体
    body: Bytes,
    /// 惰性解析的表单字段
    form: OnceLock<Vec<(String, String)>>,
    /// 路由匹配得到的路径参数
    path_params: HashMap<String, String>,
    /// 全局请求 ID，用于追踪日志
    id: u128,
}

/// HTMX 在局部更新请求中携带的结构化请求头。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HtmxHeaders {
    pub boosted: Option<String>,
    pub current_url: Option<String>,
    pub history_restore_request: Option<String>,
    pub prompt: Option<String>,
    pub request: Option<String>,
    pub target: Option<String>,
    pub trigger_name: Option<String>,
    pub trigger: Option<String>,
}

impl HtmxHeaders {
    /// 任意一个 HTMX 头存在即视为 HTMX 请求
    pub fn is_htmx(&self) -> bool {
        self.boosted.is_some()
            || self.current_url.is_some()
            || self.history_restore_request.is_some()
            || self.prompt.is_some()
            || self.request.is_some()
            || self.target.is_some()
            || self.trigger_name.is_some()
            || self.trigger.is_some()
    }
}

/// 找到请求头与请求体之间的空行，返回请求体起始下标。
pub fn header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 定位请求头结束位置，请求头部分必须是合法的 UTF-8。
    /// 2. 解析请求行：方法、路径（百分号解码）、查询串和协议版本。
    /// 3. 逐行解析请求头，并从 `Cookie` 头中提取 Cookie。
    /// 4. 剩余字节原样保存为请求体，表单在首次访问时才解析。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let head_len = header_end(buffer).unwrap_or(buffer.len());
        let head = match std::str::from_utf8(&buffer[..head_len]) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };
        let body = Bytes::copy_from_slice(&buffer[head_len..]);

        let mut lines = head.split(CRLF);
        let request_line = lines.next().unwrap_or_default();
        let parts: Vec<&str> = request_line.split(' ').filter(|s| !s.is_empty()).collect();
        if parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest);
        }

        let method = match HttpRequestMethod::parse(parts[0]) {
            Some(m) => m,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, parts[0]);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version = match parts[2].to_uppercase().as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            other => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, other);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let (raw_path, query_string) = match parts[1].split_once('?') {
            Some((p, q)) => (p, q.to_string()),
            None => (parts[1], String::new()),
        };
        let path = match urlencoding::decode(raw_path) {
            Ok(p) => p.into_owned(),
            Err(_) => {
                warn!("[ID{}]路径无法解码：{}", id, raw_path);
                return Err(Exception::InvalidPath);
            }
        };
        let query: Vec<(String, String)> =
            serde_urlencoded::from_str(&query_string).unwrap_or_else(|e| {
                warn!("[ID{}]查询串无法解析：{}，忽略", id, e);
                Vec::new()
            });

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            match line.split_once(':') {
                Some((k, v)) => headers.push((k.trim().to_string(), v.trim().to_string())),
                None => {
                    error!("[ID{}]无法解析的请求头：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            }
        }

        let mut cookies = HashMap::new();
        for (k, v) in &headers {
            if k.eq_ignore_ascii_case("cookie") {
                cookies.extend(parse_cookies(v));
            }
        }

        Ok(Self {
            method,
            path,
            query_string,
            version,
            headers,
            query,
            cookies,
            body,
            form: OnceLock::new(),
            path_params: HashMap::new(),
            id,
        })
    }

    /// 构造一个测试或内部转发用的请求，等价于解析 `METHOD path HTTP/1.1`。
    pub fn build(
        method: HttpRequestMethod,
        target: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<Self, Exception> {
        let mut raw = format!("{} {} HTTP/1.1{}", method, target, CRLF);
        for (k, v) in headers {
            raw.push_str(&format!("{}: {}{}", k, v, CRLF));
        }
        raw.push_str(CRLF);
        raw.push_str(body);
        Self::try_from(raw.as_bytes(), 0)
    }

    pub(crate) fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }
}

/// 解析 `Cookie` 头：`a=1; b=2`，值两侧的双引号会被去掉。
pub fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let k = k.trim();
            if k.is_empty() {
                return None;
            }
            let v = v.trim().trim_matches('"');
            let v = urlencoding::decode(v)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| v.to_string());
            Some((k.to_string(), v))
        })
        .collect()
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 获取解码后的请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn id(&self) -> u128 {
        self.id
    }

    /// 大小写不敏感地查找请求头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }

    /// 查询参数的值，重复键取最后一个
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|s| s.as_str())
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(|s| s.as_str())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    fn is_multipart(&self) -> bool {
        self.header("content-type")
            .map_or(false, |t| t.to_ascii_lowercase().starts_with("multipart/form-data"))
    }

    /// 解析 `multipart/form-data` 请求体中的文本字段，结果供 [`Request::form`] 使用。
    ///
    /// 文件字段不进入表单。其他类型的请求体不做任何事。
    pub async fn load_multipart(&self) -> Result<(), Exception> {
        if !self.is_multipart() || self.form.get().is_some() {
            return Ok(());
        }
        let content_type = self.header("content-type").unwrap_or("");
        let boundary = multer::parse_boundary(content_type).map_err(|e| {
            warn!("[ID{}]multipart边界无法解析：{}", self.id, e);
            Exception::MalformedRequest
        })?;
        let body = self.body.clone();
        let stream = futures::stream::once(async move { Ok::<Bytes, io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut fields = Vec::new();
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    warn!("[ID{}]multipart请求体无法解析：{}", self.id, e);
                    return Err(Exception::MalformedRequest);
                }
            };
            let name = match field.name() {
                Some(name) => name.to_string(),
                None => continue,
            };
            if let Some(file) = field.file_name() {
                debug!("[ID{}]跳过文件字段{}：{}", self.id, name, file);
                continue;
            }
            match field.text().await {
                Ok(text) => fields.push((name, text)),
                Err(e) => {
                    warn!("[ID{}]multipart字段{}无法读取：{}", self.id, name, e);
                    return Err(Exception::MalformedRequest);
                }
            }
        }
        let _ = self.form.set(fields);
        Ok(())
    }

    /// 惰性解析的表单。
    ///
    /// urlencoded 请求体在首次访问时解码；multipart 请求体需先经过
    /// [`Request::load_multipart`]，其余类型视为空表单。
    pub fn form(&self) -> &[(String, String)] {
        self.form.get_or_init(|| {
            if self.body.is_empty() {
                return Vec::new();
            }
            if self.is_multipart() {
                warn!("[ID{}]multipart请求体尚未解析，按空表单处理", self.id);
                return Vec::new();
            }
            let content_type = self.header("content-type").unwrap_or("");
            if !content_type.is_empty()
                && !content_type.starts_with("application/x-www-form-urlencoded")
            {
                warn!("[ID{}]不支持的请求体类型：{}，按空表单处理", self.id, content_type);
                return Vec::new();
            }
            serde_urlencoded::from_bytes(&self.body).unwrap_or_else(|e| {
                warn!("[ID{}]表单无法解析：{}", self.id, e);
                Vec::new()
            })
        })
    }

    /// 表单中某个字段的全部值，保持提交顺序
    pub fn form_list(&self, name: &str) -> Vec<&str> {
        self.form()
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// 客户端支持的压缩算法列表
    pub fn accept_encoding(&self) -> Vec<HttpEncoding> {
        let mut encodings = vec![];
        if let Some(encoding) = self.header("accept-encoding") {
            if encoding.contains("gzip") {
                encodings.push(HttpEncoding::Gzip);
            }
            if encoding.contains("deflate") {
                encodings.push(HttpEncoding::Deflate);
            }
            if encoding.contains("br") {
                encodings.push(HttpEncoding::Br);
            }
        }
        encodings
    }

    /// 是否为 HTMX 发起的局部更新请求
    pub fn is_partial(&self) -> bool {
        self.has_header(HX_REQUEST)
    }

    pub fn htmx(&self) -> HtmxHeaders {
        let get = |field: &str| {
            HTMX_HEADERS
                .iter()
                .find(|(f, _)| *f == field)
                .and_then(|(_, h)| self.header(h))
                .map(|s| s.to_string())
        };
        HtmxHeaders {
            boosted: get("boosted"),
            current_url: get("current_url"),
            history_restore_request: get("history_restore_request"),
            prompt: get("prompt"),
            request: get("request"),
            target: get("target"),
            trigger_name: get("trigger_name"),
            trigger: get("trigger"),
        }
    }

    /// `Content-Length` 头的值，缺失或非法时为 0
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}
