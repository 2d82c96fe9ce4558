// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 类型转换层
//!
//! 把从请求中取到的原始值（单个字符串或字符串列表）转换成参数声明的类型。
//! 转换结果统一表示为 `serde_json::Value`，处理器再按需反序列化成具体类型。
//!
//! ## 规则
//! - `Optional(T)` 与 `List(T)` 的元素都按 `T` 转换。
//! - 布尔：`"on"` 为真，`"none"` 或空串为假。
//! - 整数：`"on"` 为 1，`"none"` 或空串为 0，其余按十进制解析。
//! - 标量类型收到多个值时取最后一个。
//! - 转换要么整体成功，要么返回 `Exception::Coercion`，不会留下半成品。

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use std::fmt;

use crate::exception::Exception;

/// 参数声明的目标类型
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    /// 日期时间，规范化为 `YYYY-MM-DDTHH:MM:SS` 字符串
    Date,
    List(Box<ParamType>),
    Optional(Box<ParamType>),
}

/// 从请求来源中取到的原始值
#[derive(Debug, Clone, PartialEq)]
pub enum Raw {
    One(String),
    Many(Vec<String>),
    /// 会话或默认值中已是结构化数据的值，不做转换
    Value(Value),
}

impl ParamType {
    pub fn list(inner: ParamType) -> Self {
        ParamType::List(Box::new(inner))
    }

    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    /// 剥掉 `Optional` / `List` 外壳，得到元素的标量类型
    pub fn scalar(&self) -> &ParamType {
        match self {
            ParamType::List(t) | ParamType::Optional(t) => t.scalar(),
            t => t,
        }
    }

    pub fn is_list(&self) -> bool {
        match self {
            ParamType::List(_) => true,
            ParamType::Optional(t) => t.is_list(),
            _ => false,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Str => write!(f, "str"),
            ParamType::Int => write!(f, "int"),
            ParamType::Float => write!(f, "float"),
            ParamType::Bool => write!(f, "bool"),
            ParamType::Date => write!(f, "date"),
            ParamType::List(t) => write!(f, "list[{}]", t),
            ParamType::Optional(t) => write!(f, "optional[{}]", t),
        }
    }
}

/// 把原始值转换为声明类型。
pub fn coerce(name: &str, raw: Raw, ty: &ParamType) -> Result<Value, Exception> {
    let scalar = ty.scalar();
    match raw {
        Raw::Value(v) => Ok(v),
        // 标量类型收到多个值时取最后一个（复选框前的隐藏兜底字段）
        Raw::Many(items) if !ty.is_list() => match items.last() {
            Some(s) => coerce_scalar(name, s, scalar),
            None => Ok(Value::Null),
        },
        Raw::Many(items) => {
            let converted = items
                .iter()
                .map(|s| coerce_scalar(name, s, scalar))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(converted))
        }
        Raw::One(s) if ty.is_list() => Ok(Value::Array(vec![coerce_scalar(name, &s, scalar)?])),
        Raw::One(s) => coerce_scalar(name, &s, scalar),
    }
}

fn coerce_scalar(name: &str, s: &str, ty: &ParamType) -> Result<Value, Exception> {
    let fail = || Exception::Coercion(name.to_string(), s.to_string(), ty.to_string());
    match ty {
        ParamType::Str => Ok(Value::String(s.to_string())),
        ParamType::Int => str2int(s).map(Value::from).ok_or_else(fail),
        ParamType::Bool => str2bool(s).map(Value::Bool).ok_or_else(fail),
        ParamType::Float => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(fail),
        ParamType::Date => parse_date(s)
            .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .ok_or_else(fail),
        ParamType::List(_) | ParamType::Optional(_) => coerce_scalar(name, s, ty.scalar()),
    }
}

/// 整数转换：`on` → 1，`none` 或空串 → 0
pub fn str2int(s: &str) -> Option<i64> {
    let s = s.trim().to_lowercase();
    match s.as_str() {
        "on" => Some(1),
        "none" | "" => Some(0),
        _ => s.parse().ok(),
    }
}

/// 布尔转换：`on` → 真，`none` 或空串 → 假
pub fn str2bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "on" | "true" | "1" | "yes" | "y" | "t" => Some(true),
        "none" | "" | "off" | "false" | "0" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

/// 解析常见的日期/日期时间写法
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(d) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
