// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 应用上下文
//!
//! [`App`] 持有路由表、前置/后置钩子、页面头尾元素、应用状态和会话密钥，
//! 由 [`AppBuilder`] 一次性组装，之后包进 `Arc` 在各连接间共享，不再修改。
//!
//! [`App::handle`] 是整条请求管线：
//! 路由匹配 → 前置钩子（可短路）→ 参数解析 → 处理器 → 后置钩子 → 响应整形
//! → 写回会话 Cookie → 压缩。

use log::{debug, error, info, warn};
use serde_json::{Map, Value};

use std::{
    collections::HashMap,
    path::{Component as PathComponent, Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::{
    binding::{resolve, ParamSpec, RequestContext, Scope},
    cache::FileCache,
    config::{Config, SessionConfig},
    exception::Exception,
    hooks::{AfterContext, AfterHook, Beforeware},
    html::{meta, script, Component},
    param::{HttpRequestMethod, CSS_SCOPE_SRC, DEFAULT_TITLE, HTMX_SRC, SURREAL_SRC},
    request::Request,
    response::Response,
    router::{Route, Router},
    session::{get_key, Session, SessionCodec},
    shaper::{Reply, Shaper},
};

/// 按状态码注册的异常处理器，返回值照常整形
pub type ExceptionHandler = Arc<dyn Fn(&Request, &Exception) -> Reply + Send + Sync>;

pub struct App {
    router: Router,
    before: Vec<Beforeware>,
    after: Vec<AfterHook>,
    hdrs: Vec<Component>,
    ftrs: Vec<Component>,
    bodykw: Vec<(String, String)>,
    htmlkw: Vec<(String, String)>,
    title: String,
    state: Map<String, Value>,
    cache: Mutex<FileCache>,
    codec: SessionCodec,
    exception_handlers: HashMap<u16, ExceptionHandler>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// 没有路由的空应用，会话密钥随机生成且不落盘
    pub fn new() -> Self {
        let secret = uuid::Uuid::new_v4().to_string();
        Self::empty(&secret, SessionConfig::default(), 16)
    }

    fn empty(secret: &str, session: SessionConfig, cache_size: usize) -> Self {
        Self {
            router: Router::new(),
            before: Vec::new(),
            after: Vec::new(),
            hdrs: Vec::new(),
            ftrs: Vec::new(),
            bodykw: Vec::new(),
            htmlkw: Vec::new(),
            title: DEFAULT_TITLE.to_string(),
            state: Map::new(),
            cache: Mutex::new(FileCache::from_capacity(cache_size)),
            codec: SessionCodec::new(secret, session),
            exception_handlers: HashMap::new(),
        }
    }

    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn hdrs(&self) -> &[Component] {
        &self.hdrs
    }

    pub fn ftrs(&self) -> &[Component] {
        &self.ftrs
    }

    pub fn bodykw(&self) -> &[(String, String)] {
        &self.bodykw
    }

    pub fn htmlkw(&self) -> &[(String, String)] {
        &self.htmlkw
    }

    pub fn state(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn cache(&self) -> &Mutex<FileCache> {
        &self.cache
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// 处理一个请求，任何错误都转换为错误响应
    pub async fn handle(self: &Arc<Self>, mut request: Request) -> Response {
        let id = request.id();
        let method = request.method();
        let path = request.path().to_string();
        let session = self
            .codec
            .load(request.cookie(self.codec.cookie_name()));

        let dispatched = match self.router.dispatch(method, &path) {
            Ok((route, params)) => {
                request.set_path_params(params);
                request.load_multipart().await.map(|_| route)
            }
            Err(e) => Err(e),
        };
        let request = Arc::new(request);
        let ctx = RequestContext {
            request: request.clone(),
            session: session.clone(),
            scope: Scope::default(),
            app: self.clone(),
        };

        let result = match dispatched {
            Ok(route) => self.run_route(route, &ctx).await,
            Err(e) => Err(e),
        };
        let mut response = match result {
            Ok(r) => r,
            Err(e) => self.error_response(&request, &session, &e),
        };

        match self.codec.set_cookie(&session) {
            Ok(Some(line)) => response = response.cookie(line),
            Ok(None) => {}
            Err(e) => error!("[ID{}]会话Cookie编码失败：{}", id, e),
        }
        let response = response.finalize(&request);
        info!(
            "[ID{}]{} {} {} {}",
            id,
            method,
            path,
            response.status_code(),
            request.user_agent()
        );
        response
    }

    async fn run_route(&self, route: &Route, ctx: &RequestContext) -> Result<Response, Exception> {
        let id = ctx.request.id();
        let mut reply = None;
        for hook in &self.before {
            if let Some(r) = hook.run(ctx).await? {
                debug!("[ID{}]前置钩子短路", id);
                reply = Some(r);
                break;
            }
        }
        let reply = match reply {
            Some(r) => r,
            None => {
                let args = resolve(ctx, route.params())?;
                let handler = route
                    .handler_ref()
                    .ok_or_else(|| Exception::Internal(format!("路由{}没有处理器", route.path())))?;
                handler(args).await?
            }
        };
        let injects = self.run_after(&reply, &ctx.request, &ctx.session);
        Shaper::new(self, &ctx.request).shape(reply, route.return_class(), injects)
    }

    fn run_after(&self, reply: &Reply, request: &Request, session: &Session) -> Vec<Component> {
        let mut injects = Vec::new();
        for hook in &self.after {
            hook.run(&mut AfterContext::new(reply, request, session, &mut injects));
        }
        injects
    }

    fn error_response(&self, request: &Request, session: &Session, e: &Exception) -> Response {
        let id = request.id();
        let code = e.status_code();
        if code >= 500 {
            error!("[ID{}]处理请求出错：{}", id, e);
        } else {
            warn!("[ID{}]{}", id, e);
        }
        if let Some(handler) = self.exception_handlers.get(&code) {
            let reply = handler(request, e);
            let injects = self.run_after(&reply, request, session);
            match Shaper::new(self, request).shape(reply, None, injects) {
                Ok(r) => return r.status(code),
                Err(inner) => error!("[ID{}]异常处理器的结果无法整形：{}", id, inner),
            }
        }
        Response::from_exception(e)
    }
}

/// [`App`] 的组装器
pub struct AppBuilder {
    routes: Vec<Route>,
    before: Vec<Beforeware>,
    after: Vec<AfterHook>,
    hdrs: Vec<Component>,
    ftrs: Vec<Component>,
    bodykw: Vec<(String, String)>,
    htmlkw: Vec<(String, String)>,
    title: String,
    default_hdrs: bool,
    state: Map<String, Value>,
    secret_key: Option<String>,
    session: SessionConfig,
    cache_size: usize,
    static_root: Option<PathBuf>,
    exception_handlers: HashMap<u16, ExceptionHandler>,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
            hdrs: Vec::new(),
            ftrs: Vec::new(),
            bodykw: Vec::new(),
            htmlkw: Vec::new(),
            title: DEFAULT_TITLE.to_string(),
            default_hdrs: true,
            state: Map::new(),
            secret_key: None,
            session: SessionConfig::default(),
            cache_size: 16,
            static_root: None,
            exception_handlers: HashMap::new(),
        }
    }
}

impl AppBuilder {
    /// 按配置文件设置标题、会话、缓存与静态目录
    pub fn from_config(config: &Config) -> Self {
        let mut builder = Self {
            title: config.title().to_string(),
            default_hdrs: config.default_hdrs(),
            session: config.session().clone(),
            cache_size: config.cache_size(),
            ..Self::default()
        };
        builder.secret_key = config.session().secret_key.clone();
        builder.static_files(config.static_path())
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn before(mut self, hook: Beforeware) -> Self {
        self.before.push(hook);
        self
    }

    pub fn after(mut self, hook: AfterHook) -> Self {
        self.after.push(hook);
        self
    }

    /// 整页 `<head>` 中追加的元素
    pub fn hdr(mut self, c: impl Into<Component>) -> Self {
        self.hdrs.push(c.into());
        self
    }

    /// 整页 `<body>` 末尾追加的元素
    pub fn ftr(mut self, c: impl Into<Component>) -> Self {
        self.ftrs.push(c.into());
        self
    }

    pub fn bodykw(mut self, key: &str, value: &str) -> Self {
        self.bodykw.push((key.to_string(), value.to_string()));
        self
    }

    pub fn htmlkw(mut self, key: &str, value: &str) -> Self {
        self.htmlkw.push((key.to_string(), value.to_string()));
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// 是否在整页 `<head>` 中加入默认的 meta 与脚本
    pub fn default_hdrs(mut self, on: bool) -> Self {
        self.default_hdrs = on;
        self
    }

    pub fn state(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.state.insert(key.to_string(), value.into());
        self
    }

    pub fn secret_key(mut self, key: &str) -> Self {
        self.secret_key = Some(key.to_string());
        self
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// 以 `root` 为根目录提供静态文件，路由为 `/{fname:path}.{ext:static}`
    pub fn static_files(mut self, root: impl AsRef<Path>) -> Self {
        self.static_root = Some(root.as_ref().to_path_buf());
        self
    }

    pub fn exception_handler<F>(mut self, code: u16, f: F) -> Self
    where
        F: Fn(&Request, &Exception) -> Reply + Send + Sync + 'static,
    {
        self.exception_handlers.insert(code, Arc::new(f));
        self
    }

    /// 组装应用。没有显式密钥时从密钥文件读取或生成。
    pub fn build(self) -> Result<App, Exception> {
        let secret = get_key(self.secret_key.as_deref(), &self.session.key_fname)?;
        let mut app = App::empty(&secret, self.session, self.cache_size);
        for route in self.routes {
            app.router.add(route)?;
        }
        // 静态路由最后注册，不遮挡用户路由
        if let Some(root) = self.static_root {
            app.router.add(static_route(root))?;
        }
        if self.default_hdrs {
            app.hdrs = default_hdrs();
        }
        app.hdrs.extend(self.hdrs);
        app.ftrs = self.ftrs;
        app.before = self.before;
        app.after = self.after;
        app.bodykw = self.bodykw;
        app.htmlkw = self.htmlkw;
        app.title = self.title;
        app.state = self.state;
        app.exception_handlers = self.exception_handlers;
        info!("应用组装完成，共{}条路由", app.router.len());
        Ok(app)
    }
}

fn default_hdrs() -> Vec<Component> {
    vec![
        meta().attr("charset", "utf-8").into(),
        meta()
            .attr("name", "viewport")
            .attr("content", "width=device-width, initial-scale=1, viewport-fit=cover")
            .into(),
        script().attr("src", HTMX_SRC).into(),
        script().attr("src", SURREAL_SRC).into(),
        script().attr("src", CSS_SCOPE_SRC).into(),
    ]
}

fn static_route(root: PathBuf) -> Route {
    Route::new(
        "/{fname:path}.{ext:static}",
        &[HttpRequestMethod::Get],
    )
    .param(ParamSpec::untyped("fname"))
    .param(ParamSpec::untyped("ext"))
    .handler_fn(move |args| {
        let fname: String = args.get("fname")?;
        let ext: String = args.get("ext")?;
        let relative = PathBuf::from(format!("{}.{}", fname, ext));
        // 只允许普通路径段，拒绝 `..` 与绝对路径
        if !relative
            .components()
            .all(|c| matches!(c, PathComponent::Normal(_)))
        {
            return Err(Exception::InvalidPath);
        }
        Ok(Reply::File(root.join(relative)))
    })
}
