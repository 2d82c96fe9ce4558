// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 参数解析器
//!
//! 每个路由（以及每个前置钩子）在注册时声明一组有序的绑定描述 [`ParamSpec`]，
//! 请求到来时按描述逐个解析出 [`Args`]。
//!
//! ## 查找顺序
//! 1. 特殊类型：请求对象、HTMX 请求头、应用对象、表单记录（按字段声明逐个转换）。
//! 2. 未声明类型的参数按名称前缀识别：`request`、`session` 的任意前缀，
//!    以及 `auth`、`htmx`、`app` 三个精确名称。
//! 3. 路径参数 → 4. 查询参数 → 5. Cookie → 6. 请求头（`user_agent` → `User-Agent`）
//!    → 7. 会话（跳过假值） → 8. 表单字段 → 9. 声明的默认值。
//!
//! 找到的是字符串或字符串列表时再交给类型转换层；转换失败的错误原样向上传播。

use log::debug;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use std::{
    any::type_name,
    sync::{Arc, Mutex},
};

use crate::{
    app::App,
    coerce::{coerce, ParamType, Raw},
    exception::Exception,
    request::{HtmxHeaders, Request},
    session::Session,
    util::snake2hyphens,
};

/// 参数的绑定方式
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Request,
    Htmx,
    App,
    Session,
    /// 请求作用域中的 `auth` 值（由前置钩子写入）
    Auth,
    /// 由表单整体构造的记录；字段列表为空时相当于普通映射
    Body(Vec<(String, ParamType)>),
    /// 按查找顺序取值；`None` 表示未声明类型，不做转换
    Value(Option<ParamType>),
}

/// 单个参数的绑定描述：`{name, kind, default}`
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    default: Option<Value>,
}

/// 可以由表单整体构造的记录类型
pub trait FormRecord: DeserializeOwned {
    /// 字段名与声明类型
    fn fields() -> Vec<(&'static str, ParamType)>;
}

impl ParamSpec {
    pub fn new(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
        }
    }

    /// 声明了类型的普通参数
    pub fn typed(name: &str, ty: ParamType) -> Self {
        Self::new(name, ParamKind::Value(Some(ty)))
    }

    /// 未声明类型的参数，特殊名称按前缀规则识别
    pub fn untyped(name: &str) -> Self {
        let lower = name.to_lowercase();
        let kind = if "request".starts_with(&lower) {
            ParamKind::Request
        } else if "session".starts_with(&lower) {
            ParamKind::Session
        } else {
            match lower.as_str() {
                "auth" => ParamKind::Auth,
                "htmx" => ParamKind::Htmx,
                "app" => ParamKind::App,
                _ => ParamKind::Value(None),
            }
        };
        Self::new(name, kind)
    }

    pub fn request(name: &str) -> Self {
        Self::new(name, ParamKind::Request)
    }

    pub fn htmx(name: &str) -> Self {
        Self::new(name, ParamKind::Htmx)
    }

    pub fn app(name: &str) -> Self {
        Self::new(name, ParamKind::App)
    }

    pub fn session(name: &str) -> Self {
        Self::new(name, ParamKind::Session)
    }

    pub fn body<T: FormRecord>(name: &str) -> Self {
        let fields = T::fields()
            .into_iter()
            .map(|(k, t)| (k.to_string(), t))
            .collect();
        Self::new(name, ParamKind::Body(fields))
    }

    /// 不声明字段的表单映射
    pub fn mapping(name: &str) -> Self {
        Self::new(name, ParamKind::Body(Vec::new()))
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }
}

/// 请求作用域内的可变状态，钩子写入、解析器读取
#[derive(Debug, Clone, Default)]
pub struct Scope(Arc<Mutex<Map<String, Value>>>);

impl Scope {
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.0.lock() {
            Ok(map) => map.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    pub fn insert(&self, key: &str, value: impl Into<Value>) {
        let mut map = match self.0.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.insert(key.to_string(), value.into());
    }
}

/// 解析参数所需的请求上下文
#[derive(Clone)]
pub struct RequestContext {
    pub request: Arc<Request>,
    pub session: Session,
    pub scope: Scope,
    pub app: Arc<App>,
}

/// 解析出的单个参数
#[derive(Clone)]
pub enum Resolved {
    Request(Arc<Request>),
    Htmx(HtmxHeaders),
    App(Arc<App>),
    Session(Session),
    Value(Value),
}

/// 一次请求中为处理器解析出的全部参数，按声明顺序排列
#[derive(Clone)]
pub struct Args {
    values: Vec<(String, Resolved)>,
    ctx: RequestContext,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("names", &self.values.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Args {
    fn find(&self, name: &str) -> Result<&Resolved, Exception> {
        self.values
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
            .ok_or_else(|| Exception::MissingParameter(name.to_string()))
    }

    /// 取出普通参数并反序列化为 `T`。
    ///
    /// 值为空且 `T` 不是 `Option` 时返回 `MissingParameter`。
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, Exception> {
        let value = match self.find(name)? {
            Resolved::Value(v) => v.clone(),
            Resolved::Htmx(h) => serde_json::to_value(h)?,
            _ => {
                return Err(Exception::Internal(format!(
                    "参数`{}`不是普通值参数",
                    name
                )))
            }
        };
        let is_null = value.is_null();
        let text = value.to_string();
        serde_json::from_value(value).map_err(|_| {
            if is_null {
                Exception::MissingParameter(name.to_string())
            } else {
                Exception::Coercion(name.to_string(), text, type_name::<T>().to_string())
            }
        })
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.find(name) {
            Ok(Resolved::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn session(&self, name: &str) -> Result<Session, Exception> {
        match self.find(name)? {
            Resolved::Session(s) => Ok(s.clone()),
            _ => Err(Exception::Internal(format!("参数`{}`不是会话", name))),
        }
    }

    pub fn request(&self, name: &str) -> Result<Arc<Request>, Exception> {
        match self.find(name)? {
            Resolved::Request(r) => Ok(r.clone()),
            _ => Err(Exception::Internal(format!("参数`{}`不是请求", name))),
        }
    }

    pub fn htmx(&self, name: &str) -> Result<HtmxHeaders, Exception> {
        match self.find(name)? {
            Resolved::Htmx(h) => Ok(h.clone()),
            _ => Err(Exception::Internal(format!("参数`{}`不是HTMX请求头", name))),
        }
    }

    pub fn app(&self, name: &str) -> Result<Arc<App>, Exception> {
        match self.find(name)? {
            Resolved::App(a) => Ok(a.clone()),
            _ => Err(Exception::Internal(format!("参数`{}`不是应用对象", name))),
        }
    }

    /// 请求作用域，钩子通过它把 `auth` 之类的值传给后续解析
    pub fn scope(&self) -> &Scope {
        &self.ctx.scope
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 按描述顺序解析全部参数；任一参数失败则整个解析失败
pub fn resolve(ctx: &RequestContext, specs: &[ParamSpec]) -> Result<Args, Exception> {
    let values = specs
        .iter()
        .map(|spec| Ok((spec.name.clone(), resolve_one(ctx, spec)?)))
        .collect::<Result<Vec<_>, Exception>>()?;
    Ok(Args {
        values,
        ctx: ctx.clone(),
    })
}

fn resolve_one(ctx: &RequestContext, spec: &ParamSpec) -> Result<Resolved, Exception> {
    let resolved = match &spec.kind {
        ParamKind::Request => Resolved::Request(ctx.request.clone()),
        ParamKind::Htmx => Resolved::Htmx(ctx.request.htmx()),
        ParamKind::App => Resolved::App(ctx.app.clone()),
        ParamKind::Session => Resolved::Session(ctx.session.clone()),
        ParamKind::Auth => Resolved::Value(ctx.scope.get("auth").unwrap_or(Value::Null)),
        ParamKind::Body(fields) => Resolved::Value(from_body(&ctx.request, fields)?),
        ParamKind::Value(ty) => Resolved::Value(lookup(ctx, spec, ty.as_ref())?),
    };
    Ok(resolved)
}

/// 按 3～9 的顺序查找原始值，然后转换
fn lookup(
    ctx: &RequestContext,
    spec: &ParamSpec,
    ty: Option<&ParamType>,
) -> Result<Value, Exception> {
    let name = spec.name.as_str();
    let req = &ctx.request;
    let one = |s: &str| Raw::One(s.to_string());

    let raw = req
        .path_param(name)
        .map(one)
        .or_else(|| req.query_param(name).map(one))
        .or_else(|| req.cookie(name).map(one))
        .or_else(|| req.header(&snake2hyphens(name)).map(one))
        .or_else(|| {
            ctx.session
                .get(name)
                .filter(|v| !is_falsy(v))
                .map(value_raw)
        })
        .or_else(|| form_raw(req, name))
        .or_else(|| spec.default.clone().map(value_raw));

    debug!("[ID{}]参数`{}`的原始值：{:?}", req.id(), name, raw);
    match (raw, ty) {
        (None, _) => Ok(Value::Null),
        (Some(raw), Some(ty)) => coerce(name, raw, ty),
        (Some(Raw::One(s)), None) => Ok(Value::String(s)),
        (Some(Raw::Many(items)), None) => Ok(Value::Array(
            items.into_iter().map(Value::String).collect(),
        )),
        (Some(Raw::Value(v)), None) => Ok(v),
    }
}

/// 会话或默认值：字符串和全为字符串的列表按原始值转换，其余结构化数据原样保留
fn value_raw(v: Value) -> Raw {
    match v {
        Value::String(s) => Raw::One(s),
        Value::Array(items) if items.iter().all(Value::is_string) => Raw::Many(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        other => Raw::Value(other),
    }
}

/// 表单字段：单个值直接展开，多个值保留为列表
fn form_raw(req: &Request, name: &str) -> Option<Raw> {
    let mut items = req.form_list(name);
    match items.len() {
        0 => None,
        1 => items.pop().map(|s| Raw::One(s.to_string())),
        _ => Some(Raw::Many(items.into_iter().map(str::to_string).collect())),
    }
}

/// 用表单构造记录：声明过的字段按类型转换，未声明的原样保留
fn from_body(req: &Request, fields: &[(String, ParamType)]) -> Result<Value, Exception> {
    let mut obj = Map::new();
    for (key, _) in req.form() {
        if obj.contains_key(key) {
            continue;
        }
        let raw = match form_raw(req, key) {
            Some(raw) => raw,
            None => continue,
        };
        let value = match fields.iter().find(|(k, _)| k == key) {
            Some((_, ty)) => coerce(key, raw, ty)?,
            None => match raw {
                Raw::One(s) => Value::String(s),
                Raw::Many(items) => Value::Array(items.into_iter().map(Value::String).collect()),
                Raw::Value(v) => v,
            },
        };
        obj.insert(key.clone(), value);
    }
    Ok(Value::Object(obj))
}

fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}
