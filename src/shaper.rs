// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 响应整形
//!
//! 处理器（或短路的前置钩子）返回 [`Reply`]，这里根据返回值的形态决定最终响应：
//!
//! - [`Reply::Response`] 原样通过；
//! - 路由声明了 [`ResponseClass`] 时用该类包装；
//! - [`Reply::File`] 路径不存在时是 404；
//! - [`Reply::Nodes`] 提取 [`HttpHeader`] 为响应头，非 HTMX 请求且没有 `html` 根节点时
//!   拼成完整页面，HTMX 请求只返回片段；
//! - 字符串是 HTML，映射是 JSON，其他值字符串化后作为 HTML。

use log::debug;
use serde_json::Value;

use std::{fmt, path::PathBuf};

use crate::{
    app::App,
    exception::Exception,
    html::{body, head, html, title, to_html, Component, HttpHeader, Node, Renderable},
    request::Request,
    response::Response,
};

/// 处理器的返回值
#[derive(Debug, Clone)]
pub enum Reply {
    /// 已经构造好的响应
    Response(Response),
    /// 文件响应
    File(PathBuf),
    /// 组件树（单个节点或节点序列）
    Nodes(Vec<Component>),
    /// 作为 HTML 返回的字符串
    Text(String),
    /// 作为 JSON 返回的映射
    Json(Value),
    /// 其他值的字符串形式
    Display(String),
    /// 空结果
    Empty,
}

/// 路由声明的返回类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Html,
    Json,
    PlainText,
}

impl Reply {
    pub fn node(n: impl Into<Component>) -> Self {
        Reply::Nodes(vec![n.into()])
    }

    pub fn nodes<I, C>(items: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Component>,
    {
        Reply::Nodes(items.into_iter().map(Into::into).collect())
    }

    pub fn render<R: Renderable + ?Sized>(r: &R) -> Self {
        Reply::Nodes(vec![Component::from_renderable(r)])
    }

    pub fn display(v: impl fmt::Display) -> Self {
        Reply::Display(v.to_string())
    }

    /// 空结果不会让前置钩子短路
    pub fn is_empty(&self) -> bool {
        match self {
            Reply::Empty => true,
            Reply::Nodes(items) => items.is_empty(),
            Reply::Text(s) => s.is_empty(),
            Reply::Json(v) => v.is_null(),
            _ => false,
        }
    }

    /// 能否继续追加组件（钩子注入内容时使用）
    pub fn is_nodes(&self) -> bool {
        matches!(self, Reply::Nodes(_) | Reply::Empty)
    }
}

impl From<Response> for Reply {
    fn from(r: Response) -> Self {
        Reply::Response(r)
    }
}

impl From<Node> for Reply {
    fn from(n: Node) -> Self {
        Reply::node(n)
    }
}

impl From<Vec<Component>> for Reply {
    fn from(items: Vec<Component>) -> Self {
        Reply::Nodes(items)
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Text(s)
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

impl From<Value> for Reply {
    fn from(v: Value) -> Self {
        Reply::Json(v)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

/// 把一个请求的处理结果整形为响应
pub struct Shaper<'a> {
    app: &'a App,
    request: &'a Request,
}

impl<'a> Shaper<'a> {
    pub fn new(app: &'a App, request: &'a Request) -> Self {
        Self { app, request }
    }

    /// `injects` 是后置钩子追加的组件，只附加在组件树结果之后
    pub fn shape(
        &self,
        reply: Reply,
        class: Option<ResponseClass>,
        injects: Vec<Component>,
    ) -> Result<Response, Exception> {
        let reply = match (reply, injects.is_empty()) {
            (reply, true) => reply,
            (Reply::Empty, false) => Reply::Nodes(injects),
            (Reply::Nodes(mut items), false) => {
                items.extend(injects);
                Reply::Nodes(items)
            }
            (reply, false) => reply,
        };
        let id = self.request.id();
        match reply {
            Reply::File(path) => {
                debug!("[ID{}]文件响应：{}", id, path.display());
                if !path.exists() {
                    return Err(Exception::FileNotFound);
                }
                Response::from_file(&path, self.app.cache())
            }
            Reply::Response(r) => Ok(r),
            reply => match class {
                Some(class) => Ok(wrap_class(reply, class)),
                None => Ok(self.default_shape(reply)),
            },
        }
    }

    fn default_shape(&self, reply: Reply) -> Response {
        match reply {
            Reply::Nodes(items) => self.shape_nodes(items),
            Reply::Text(s) | Reply::Display(s) => Response::html(s),
            Reply::Json(v) => Response::json(&v),
            // 前面已处理
            Reply::Response(r) => r,
            Reply::File(_) | Reply::Empty => Response::html(""),
        }
    }

    fn shape_nodes(&self, items: Vec<Component>) -> Response {
        let (headers, content): (Vec<Component>, Vec<Component>) = items
            .into_iter()
            .partition(|c| matches!(c, Component::Header(_)));
        let page = if !content.is_empty()
            && !self.request.is_partial()
            && !content.iter().any(|c| c.tag() == Some("html"))
        {
            debug!("[ID{}]非HTMX请求，包装为完整页面", self.request.id());
            vec![Component::Node(self.full_page(content))]
        } else {
            content
        };
        let mut response = Response::html(to_html(&page));
        for h in headers {
            if let Component::Header(HttpHeader { k, v }) = h {
                response = response.header(&k, v);
            }
        }
        response
    }

    fn full_page(&self, content: Vec<Component>) -> Node {
        let (titles, body_items): (Vec<Component>, Vec<Component>) = content
            .into_iter()
            .partition(|c| c.tag() == Some("title"));
        let page_title = titles
            .into_iter()
            .next()
            .unwrap_or_else(|| title().text(self.app.title()).into());
        let head_node = head()
            .child(page_title)
            .children_from(self.app.hdrs().iter().cloned());
        let body_node = body()
            .children_from(body_items)
            .children_from(self.app.ftrs().iter().cloned())
            .attrs(self.app.bodykw());
        html()
            .attrs(self.app.htmlkw())
            .child(head_node)
            .child(body_node)
    }
}

fn wrap_class(reply: Reply, class: ResponseClass) -> Response {
    match class {
        ResponseClass::Json => Response::json(&reply_value(reply)),
        ResponseClass::Html => Response::html(reply_text(reply)),
        ResponseClass::PlainText => Response::text(reply_text(reply)),
    }
}

fn reply_text(reply: Reply) -> String {
    match reply {
        Reply::Nodes(items) => to_html(&items),
        Reply::Text(s) | Reply::Display(s) => s,
        Reply::Json(v) => v.to_string(),
        Reply::File(p) => p.display().to_string(),
        Reply::Response(r) => r.text_body(),
        Reply::Empty => String::new(),
    }
}

fn reply_value(reply: Reply) -> Value {
    match reply {
        Reply::Json(v) => v,
        Reply::Empty => Value::Null,
        other => Value::String(reply_text(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::{div, p};
    use crate::param::HttpRequestMethod;
    use serde_json::json;

    fn req(headers: &[(&str, &str)]) -> Request {
        Request::build(HttpRequestMethod::Get, "/", headers, "").unwrap()
    }

    fn shape(app: &App, request: &Request, reply: Reply) -> Response {
        Shaper::new(app, request).shape(reply, None, vec![]).unwrap()
    }

    #[test]
    fn test_full_page_wrap() {
        let app = App::builder().secret_key("test").default_hdrs(false).build().unwrap();
        let r = shape(&app, &req(&[]), Reply::node(p().text("hi")));
        assert_eq!(
            r.text_body(),
            "<!doctype html><html><head><title>FastHTML page</title></head><body><p>hi</p></body></html>"
        );
    }

    #[test]
    fn test_htmx_gets_fragment() {
        let app = App::builder().secret_key("test").build().unwrap();
        let r = shape(&app, &req(&[("HX-Request", "true")]), Reply::node(p().text("hi")));
        assert_eq!(r.text_body(), "<p>hi</p>");
    }

    #[test]
    fn test_title_hoisted_and_headers_extracted() {
        let app = App::builder().secret_key("test").default_hdrs(false).build().unwrap();
        let reply = Reply::nodes(vec![
            Component::from(title().text("Todos")),
            Component::from(div().text("x")),
            Component::from(HttpHeader::new("HX-Trigger", "changed")),
        ]);
        let r = shape(&app, &req(&[]), reply);
        let body = r.text_body();
        assert!(body.contains("<head><title>Todos</title></head>"));
        assert!(body.contains("<body><div>x</div></body>"));
        assert_eq!(r.get_header("HX-Trigger"), Some("changed"));
    }

    #[test]
    fn test_explicit_html_not_rewrapped() {
        let app = App::builder().secret_key("test").build().unwrap();
        let page = html().child(body().text("raw"));
        let r = shape(&app, &req(&[]), Reply::node(page));
        assert_eq!(r.text_body(), "<!doctype html><html><body>raw</body></html>");
    }

    #[test]
    fn test_scalar_shapes() {
        let app = App::builder().secret_key("test").build().unwrap();
        let r = shape(&app, &req(&[]), Reply::from("<b>x</b>"));
        assert_eq!(r.content_type(), Some("text/html;charset=utf-8"));
        assert_eq!(r.text_body(), "<b>x</b>");

        let r = shape(&app, &req(&[]), Reply::from(json!({"b": 1, "a": 2})));
        assert_eq!(r.content_type(), Some("application/json"));
        assert_eq!(r.text_body(), r#"{"b":1,"a":2}"#);

        let r = shape(&app, &req(&[]), Reply::display(42));
        assert_eq!(r.text_body(), "42");

        let r = shape(&app, &req(&[]), Reply::Empty);
        assert_eq!(r.status_code(), 200);
        assert!(r.body().is_empty());
    }

    #[test]
    fn test_response_passes_through() {
        let app = App::builder().secret_key("test").build().unwrap();
        let r = shape(&app, &req(&[]), Reply::from(Response::redirect("/login")));
        assert_eq!(r.status_code(), 303);
    }

    #[test]
    fn test_declared_class_wraps() {
        let app = App::builder().secret_key("test").build().unwrap();
        let request = req(&[]);
        let shaper = Shaper::new(&app, &request);
        let r = shaper
            .shape(Reply::from("hi"), Some(ResponseClass::PlainText), vec![])
            .unwrap();
        assert_eq!(r.content_type(), Some("text/plain;charset=utf-8"));
        let r = shaper
            .shape(Reply::from("hi"), Some(ResponseClass::Json), vec![])
            .unwrap();
        assert_eq!(r.text_body(), r#""hi""#);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let app = App::builder().secret_key("test").build().unwrap();
        let request = req(&[]);
        let err = Shaper::new(&app, &request)
            .shape(Reply::File(PathBuf::from("/definitely/missing.css")), None, vec![])
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_injects_appended() {
        let app = App::builder().secret_key("test").build().unwrap();
        let request = req(&[("HX-Request", "true")]);
        let r = Shaper::new(&app, &request)
            .shape(Reply::Empty, None, vec![div().id("t").into()])
            .unwrap();
        assert_eq!(r.text_body(), r#"<div id="t"></div>"#);
    }

    #[test]
    fn test_is_empty() {
        assert!(Reply::Empty.is_empty());
        assert!(Reply::Nodes(vec![]).is_empty());
        assert!(Reply::from("").is_empty());
        assert!(!Reply::from(Response::new()).is_empty());
    }
}
