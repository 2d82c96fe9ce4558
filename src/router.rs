//! # 路由
//!
//! 路径模板由字面量和 `{name}` / `{name:conv}` 占位符组成，注册时编译为锚定的正则。
//! 支持的转换器：
//!
//! | 转换器 | 匹配 |
//! |---|---|
//! | `str`（默认） | 不含 `/` 的一段 |
//! | `int` | 十进制数字 |
//! | `float` | 十进制小数 |
//! | `path` | 任意字符（非贪婪） |
//! | `static` | 静态资源扩展名之一 |
//!
//! 路径参数一律以字符串形式交给参数解析器，由声明类型决定如何转换。

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

use crate::{
    binding::{Args, ParamSpec},
    exception::Exception,
    param::{HttpRequestMethod, STATIC_EXTS},
    shaper::{Reply, ResponseClass},
};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// 路由处理器：接收解析好的参数，返回待整形的结果
pub type HandlerFn = Arc<dyn Fn(Args) -> BoxFuture<Result<Reply, Exception>> + Send + Sync>;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)(?::([A-Za-z]+))?\}").unwrap();
}

/// 一条待注册的路由
#[derive(Clone)]
pub struct Route {
    path: String,
    methods: Vec<HttpRequestMethod>,
    params: Vec<ParamSpec>,
    handler: Option<HandlerFn>,
    returns: Option<ResponseClass>,
}

impl Route {
    pub fn new(path: &str, methods: &[HttpRequestMethod]) -> Self {
        Self {
            path: path.to_string(),
            methods: methods.to_vec(),
            params: Vec::new(),
            handler: None,
            returns: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(path, &[HttpRequestMethod::Get])
    }

    pub fn post(path: &str) -> Self {
        Self::new(path, &[HttpRequestMethod::Post])
    }

    pub fn put(path: &str) -> Self {
        Self::new(path, &[HttpRequestMethod::Put])
    }

    pub fn delete(path: &str) -> Self {
        Self::new(path, &[HttpRequestMethod::Delete])
    }

    pub fn patch(path: &str) -> Self {
        Self::new(path, &[HttpRequestMethod::Patch])
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// 异步处理器
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, Exception>> + Send + 'static,
    {
        self.handler = Some(Arc::new(
            move |args: Args| -> BoxFuture<Result<Reply, Exception>> { Box::pin(f(args)) },
        ));
        self
    }

    /// 同步处理器
    pub fn handler_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(Args) -> Result<Reply, Exception> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(
            move |args: Args| -> BoxFuture<Result<Reply, Exception>> {
                let result = f(args);
                Box::pin(async move { result })
            },
        ));
        self
    }

    /// 声明返回类型，处理结果用对应的响应类包装
    pub fn returns(mut self, class: ResponseClass) -> Self {
        self.returns = Some(class);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &[HttpRequestMethod] {
        &self.methods
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn return_class(&self) -> Option<ResponseClass> {
        self.returns
    }

    pub(crate) fn handler_ref(&self) -> Option<&HandlerFn> {
        self.handler.as_ref()
    }

    /// `GET` 路由同时响应 `HEAD`
    fn accepts(&self, method: HttpRequestMethod) -> bool {
        self.methods.contains(&method)
            || (method == HttpRequestMethod::Head && self.methods.contains(&HttpRequestMethod::Get))
    }
}

struct CompiledRoute {
    route: Route,
    pattern: Regex,
}

/// 编译路径模板为锚定正则
pub fn compile_template(path: &str) -> Result<Regex, Exception> {
    let mut re = String::from("^");
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(path) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        re.push_str(&regex::escape(&path[last..whole.start()]));
        let name = &caps[1];
        let conv = caps.get(2).map_or("str", |m| m.as_str());
        let body = match conv {
            "str" => "[^/]+".to_string(),
            "int" => "[0-9]+".to_string(),
            "float" => r"[0-9]+(?:\.[0-9]+)?".to_string(),
            "path" => ".*?".to_string(),
            "static" => STATIC_EXTS.join("|"),
            other => {
                return Err(Exception::Internal(format!(
                    "路由{}使用了未知的转换器：{}",
                    path, other
                )))
            }
        };
        re.push_str(&format!("(?P<{}>{})", name, body));
        last = whole.end();
    }
    re.push_str(&regex::escape(&path[last..]));
    re.push('$');
    Regex::new(&re).map_err(|e| Exception::Internal(e.to_string()))
}

/// 按注册顺序匹配的路由表
#[derive(Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册路由；同路径同方法的旧路由被替换
    pub fn add(&mut self, route: Route) -> Result<(), Exception> {
        if route.handler.is_none() {
            return Err(Exception::Internal(format!("路由{}没有处理器", route.path)));
        }
        let pattern = compile_template(&route.path)?;
        let compiled = CompiledRoute { route, pattern };
        let existing = self.routes.iter().position(|r| {
            r.route.path == compiled.route.path && r.route.methods == compiled.route.methods
        });
        match existing {
            Some(i) => {
                debug!("替换路由：{}", compiled.route.path);
                self.routes[i] = compiled;
            }
            None => self.routes.push(compiled),
        }
        Ok(())
    }

    /// 查找匹配的路由和路径参数。
    ///
    /// 路径匹配但方法都不匹配时返回 `MethodNotAllowed`，携带允许的方法列表。
    pub fn dispatch(
        &self,
        method: HttpRequestMethod,
        path: &str,
    ) -> Result<(&Route, HashMap<String, String>), Exception> {
        let mut allowed: Vec<HttpRequestMethod> = Vec::new();
        for compiled in &self.routes {
            let caps = match compiled.pattern.captures(path) {
                Some(caps) => caps,
                None => continue,
            };
            if compiled.route.accepts(method) {
                let params = compiled
                    .pattern
                    .capture_names()
                    .flatten()
                    .filter_map(|n| caps.name(n).map(|m| (n.to_string(), m.as_str().to_string())))
                    .collect();
                return Ok((&compiled.route, params));
            }
            for m in &compiled.route.methods {
                if !allowed.contains(m) {
                    allowed.push(*m);
                }
            }
        }
        if allowed.is_empty() {
            return Err(Exception::RouteNotFound);
        }
        let allow = HttpRequestMethod::ALL
            .iter()
            .filter(|m| allowed.contains(m))
            .map(|m| m.to_string())
            .collect::<Vec<String>>()
            .join(", ");
        Err(Exception::MethodNotAllowed(allow))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
