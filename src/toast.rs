//! 一次性的提示消息。
//!
//! 提示先存进会话的 `toasts` 列表，下一次返回组件树（或空结果）时由后置钩子
//! 取出并渲染成带 `hx-swap-oob` 的容器追加到响应末尾，取出后即从会话删除。

use log::debug;
use serde_json::{json, Value};

use crate::{
    app::AppBuilder,
    exception::Exception,
    hooks::{AfterContext, AfterHook},
    html::{button, div, style, Node},
    session::Session,
};

pub const TOAST_CONTAINER_ID: &str = "fh-toast-container";
const SESSION_KEY: &str = "toasts";

pub const TOAST_CSS: &str = r#"
#fh-toast-container {
    position: fixed; inset: 20px 0; z-index: 1000;
    display: flex; flex-direction: column; align-items: stretch;
    gap: 10px; pointer-events: none; max-width: 80%; margin: 0 auto;
}
.fh-toast {
    background-color: #333; color: white;
    padding: 12px 28px 12px 20px; border-radius: 4px;
    text-align: center; box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1);
    opacity: 0.9; position: relative;
    transition: opacity 150ms ease-in-out;
}
.fh-toast-dismiss {
    position: absolute; top: .2em; right: .4em;
    line-height: 1rem; padding: 0 .2em .2em .2em;
    border-radius: 15%; background: inherit; color: inherit; pointer-events: auto;
}
.fh-toast-info { background-color: #2196F3; }
.fh-toast-success { background-color: #4CAF50; }
.fh-toast-warning { background-color: #FF9800; }
.fh-toast-error { background-color: #F44336; }
"#;

/// 提示类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Success,
    Warning,
    Error,
}

impl ToastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToastKind::Info => "info",
            ToastKind::Success => "success",
            ToastKind::Warning => "warning",
            ToastKind::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self, Exception> {
        match s {
            "info" => Ok(ToastKind::Info),
            "success" => Ok(ToastKind::Success),
            "warning" => Ok(ToastKind::Warning),
            "error" => Ok(ToastKind::Error),
            other => Err(Exception::Internal(format!("未知的提示类型：{}", other))),
        }
    }
}

pub fn toast_container() -> Node {
    div().id(TOAST_CONTAINER_ID).hx_swap_oob("afterbegin")
}

pub fn toast(message: &str, kind: ToastKind, dismiss: bool, duration: u64) -> Node {
    let mut node = div()
        .text(message)
        .cls(format!("fh-toast fh-toast-{}", kind.as_str()))
        .hx_trigger(format!("load delay:{}ms", duration))
        .hx_swap("delete swap:150ms")
        .flag("hx-get");
    if dismiss {
        node = node.child(
            button()
                .text("x")
                .cls("fh-toast-dismiss")
                .hx_swap("delete swap:150ms")
                .flag("hx-get")
                .hx_target("closest .fh-toast"),
        );
    }
    node
}

/// 向会话追加一条提示
pub fn add_toast(session: &Session, message: &str, kind: ToastKind, dismiss: bool) {
    session.push(SESSION_KEY, json!([message, kind.as_str(), dismiss]));
}

/// 取出会话中的全部提示并渲染为容器
pub fn render_toasts(session: &Session, duration: u64) -> Node {
    let pending = match session.remove(SESSION_KEY) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    let toasts = pending.iter().filter_map(|t| {
        let message = t.get(0)?.as_str()?;
        let kind = ToastKind::parse(t.get(1)?.as_str()?).ok()?;
        let dismiss = t.get(2).and_then(Value::as_bool).unwrap_or(false);
        Some(toast(message, kind, dismiss, duration))
    });
    toast_container().children_from(toasts)
}

fn toast_after(ctx: &mut AfterContext<'_>, duration: u64) {
    if ctx.session.contains(SESSION_KEY) && ctx.reply.is_nodes() {
        debug!("[ID{}]注入提示消息", ctx.request.id());
        let container = render_toasts(ctx.session, duration);
        ctx.inject(container);
    }
}

/// 安装提示功能：页脚容器、样式与后置钩子
pub fn setup_toasts(builder: AppBuilder, duration: u64) -> AppBuilder {
    builder
        .ftr(toast_container())
        .hdr(style().text(TOAST_CSS))
        .state("toast_duration", duration)
        .after(AfterHook::new(move |ctx| toast_after(ctx, duration)))
}
