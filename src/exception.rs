// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求/响应管线在各个阶段可能抛出的异常情况。
//!
//! ## 分类
//! - **协议层**：报文无法解析、方法或版本不受支持。
//! - **路由层**：路径不存在、方法不被允许。
//! - **绑定层**：参数缺失、类型转换失败。
//! - **处理器层**：记录不存在、处理器主动抛出的 HTTP 错误、内部错误。
//!
//! 每个变体都通过 [`Exception::status_code`] 映射到一个 HTTP 状态码，
//! 由 `App::handle` 在顶层统一转换为错误页面。

use std::fmt;

/// 管线处理请求过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行或请求头格式不正确。
    MalformedRequest,
    /// 客户端使用了服务器不认识的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 文件响应引用的路径不存在。对应 `404 Not Found`。
    FileNotFound,
    /// 请求的路径格式非法或包含越权尝试（如目录遍历）。对应 `400 Bad Request`。
    InvalidPath,
    /// 没有任何路由匹配当前路径。
    RouteNotFound,
    /// 路径匹配但方法不匹配，携带该路径允许的方法列表（用于 `Allow` 头）。
    MethodNotAllowed(String),
    /// 处理器需要的参数在所有来源中都不存在且没有默认值。
    MissingParameter(String),
    /// 声明类型的构造（解析）拒绝了原始值：(参数名, 原始值, 目标类型)。
    Coercion(String, String, String),
    /// 数据表中不存在给定主键的记录。
    RecordNotFound(String),
    /// 处理器主动抛出的 HTTP 错误：(状态码, 描述)。
    Http(u16, String),
    /// 其他内部错误（I/O、序列化等）。
    Internal(String),
}

use Exception::*;

impl Exception {
    /// 将异常映射为 HTTP 状态码。
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8
            | MalformedRequest
            | UnSupportedRequestMethod
            | UnsupportedHttpVersion
            | InvalidPath
            | MissingParameter(_) => 400,
            FileNotFound | RouteNotFound | RecordNotFound(_) => 404,
            MethodNotAllowed(_) => 405,
            Http(code, _) => *code,
            Coercion(..) | Internal(_) => 500,
        }
    }
}

impl fmt::Display for Exception {
    /// 根据错误类型写入人类可读的描述文本。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed HTTP request"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            FileNotFound => write!(f, "File not found (404)"),
            InvalidPath => write!(f, "Invalid path (400)"),
            RouteNotFound => write!(f, "No route matches the path (404)"),
            MethodNotAllowed(allow) => write!(f, "Method not allowed, allowed: {}", allow),
            MissingParameter(name) => write!(f, "Missing required parameter `{}`", name),
            Coercion(name, value, target) => write!(
                f,
                "Can't convert `{}` = {:?} into {}",
                name, value, target
            ),
            RecordNotFound(key) => write!(f, "Record `{}` not found", key),
            Http(code, msg) => write!(f, "HTTP {}: {}", code, msg),
            Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Exception {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => FileNotFound,
            _ => Internal(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for Exception {
    fn from(e: serde_json::Error) -> Self {
        Internal(e.to_string())
    }
}
