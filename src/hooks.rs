//! # 前置 / 后置钩子
//!
//! 前置钩子 [`Beforeware`] 按注册顺序依次执行，参数与处理器一样由解析器绑定。
//! 第一个返回非空结果的钩子使整个请求短路，处理器不再执行。
//! 每个钩子可以带一组跳过规则，规则只锚定路径开头。
//!
//! 后置钩子 [`AfterHook`] 在处理器之后执行，只能向响应追加组件，不能改变流程。

use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, warn};
use regex::Regex;

use std::{collections::HashMap, future::Future, sync::Arc};

use crate::{
    binding::{resolve, Args, ParamSpec, RequestContext},
    exception::Exception,
    html::Component,
    request::Request,
    response::Response,
    router::BoxFuture,
    session::Session,
    shaper::Reply,
};

pub type HookFn = Arc<dyn Fn(Args) -> BoxFuture<Result<Option<Reply>, Exception>> + Send + Sync>;

/// 前置钩子
#[derive(Clone)]
pub struct Beforeware {
    params: Vec<ParamSpec>,
    f: HookFn,
    skip: Vec<Regex>,
}

impl Beforeware {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Reply>, Exception>> + Send + 'static,
    {
        Self {
            params: Vec::new(),
            f: Arc::new(
                move |args: Args| -> BoxFuture<Result<Option<Reply>, Exception>> {
                    Box::pin(f(args))
                },
            ),
            skip: Vec::new(),
        }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Args) -> Result<Option<Reply>, Exception> + Send + Sync + 'static,
    {
        Self::new(move |args| {
            let result = f(args);
            async move { result }
        })
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// 跳过规则，只匹配路径开头
    pub fn skip(self, patterns: &[&str]) -> Result<Self, Exception> {
        self.skip_with(patterns, "")
    }

    /// 跳过规则，必须匹配整个路径
    pub fn skip_exact(self, patterns: &[&str]) -> Result<Self, Exception> {
        self.skip_with(patterns, "$")
    }

    fn skip_with(mut self, patterns: &[&str], tail: &str) -> Result<Self, Exception> {
        for p in patterns {
            let re = Regex::new(&format!("^(?:{}){}", p, tail))
                .map_err(|e| Exception::Internal(e.to_string()))?;
            self.skip.push(re);
        }
        Ok(self)
    }

    pub fn skips(&self, path: &str) -> bool {
        self.skip.iter().any(|re| re.is_match(path))
    }

    /// 执行钩子；被跳过或返回空结果时为 `None`
    pub async fn run(&self, ctx: &RequestContext) -> Result<Option<Reply>, Exception> {
        let path = ctx.request.path();
        if self.skips(path) {
            debug!("[ID{}]路径{}跳过前置钩子", ctx.request.id(), path);
            return Ok(None);
        }
        let args = resolve(ctx, &self.params)?;
        let reply = (self.f)(args).await?;
        Ok(reply.filter(|r| !r.is_empty()))
    }
}

/// 后置钩子能看到的上下文
pub struct AfterContext<'a> {
    pub reply: &'a Reply,
    pub request: &'a Request,
    pub session: &'a Session,
    injects: &'a mut Vec<Component>,
}

impl<'a> AfterContext<'a> {
    pub fn new(
        reply: &'a Reply,
        request: &'a Request,
        session: &'a Session,
        injects: &'a mut Vec<Component>,
    ) -> Self {
        Self {
            reply,
            request,
            session,
            injects,
        }
    }

    /// 追加一个组件到响应内容末尾
    pub fn inject(&mut self, c: impl Into<Component>) {
        self.injects.push(c.into());
    }
}

pub type AfterFn = Arc<dyn Fn(&mut AfterContext<'_>) + Send + Sync>;

/// 后置钩子
#[derive(Clone)]
pub struct AfterHook(AfterFn);

impl AfterHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut AfterContext<'_>) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn run(&self, ctx: &mut AfterContext<'_>) {
        (self.0)(ctx)
    }
}

/// HTTP Basic 认证钩子。
///
/// 认证成功时把用户名写入请求作用域的 `auth`；失败返回 401。
/// 用户名 `logout` 总是被拒绝，浏览器借此清掉缓存的凭据。
pub fn basic_auth(users: HashMap<String, String>, skip: &[&str]) -> Result<Beforeware, Exception> {
    let hook = Beforeware::from_fn(move |args| {
        let req = args.context().request.clone();
        match req.header("authorization").and_then(parse_basic) {
            Some((user, pwd)) if check_user(&users, &user, &pwd) => {
                debug!("[ID{}]Basic认证通过：{}", req.id(), user);
                args.scope().insert("auth", user);
                Ok(None)
            }
            _ => {
                warn!("[ID{}]Basic认证失败", req.id());
                let resp = Response::text("not authenticated")
                    .status(401)
                    .header("WWW-Authenticate", r#"Basic realm="login""#);
                Ok(Some(Reply::Response(resp)))
            }
        }
    });
    hook.skip_exact(skip)
}

fn parse_basic(header: &str) -> Option<(String, String)> {
    let mut parts = header.split_whitespace();
    let scheme = parts.next()?;
    let credentials = parts.next()?;
    if !scheme.eq_ignore_ascii_case("basic") || parts.next().is_some() {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(credentials).ok()?).ok()?;
    let (user, pwd) = decoded.split_once(':').unwrap_or((decoded.as_str(), ""));
    Some((user.to_string(), pwd.to_string()))
}

fn check_user(users: &HashMap<String, String>, user: &str, pwd: &str) -> bool {
    if user == "logout" || user.is_empty() || pwd.is_empty() {
        return false;
    }
    let expected = users.get(user).map_or("", String::as_str);
    constant_time_eq(expected.as_bytes(), pwd.as_bytes())
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
