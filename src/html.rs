//! # HTML 组件树
//!
//! 处理器返回的页面内容由不可变的 [`Node`] 记录 `{tag, children, attrs}` 组成，
//! 每个 HTML 元素都有一个同名的构造函数（由静态标签表生成，例如 [`div`]、[`li`]）。
//! 构造函数返回空节点，再通过按值消费的方法链追加子节点和属性：
//!
//! ```
//! use hxweb::html::*;
//! let item = li()
//!     .id("todo-1")
//!     .child(a().attr("href", "/todos/1").text("buy milk"));
//! assert_eq!(
//!     item.to_html(),
//!     r#"<li id="todo-1"><a href="/todos/1">buy milk</a></li>"#
//! );
//! ```
//!
//! 属性名遵循以下规则：`cls`/`klass` 写作 `class`，`fr` 写作 `for`，
//! 结尾的下划线被去掉，其余下划线换成连字符（`hx_post` → `hx-post`）。

use serde_json::{Map, Value};

/// 节点的子项
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    /// 子元素
    Node(Node),
    /// 渲染时转义的文本
    Text(String),
    /// 原样输出、不转义的 HTML 片段
    Safe(String),
    /// 不参与渲染，由响应整形器提升为 HTTP 响应头
    Header(HttpHeader),
}

/// 处理器返回内容中携带的响应头
#[derive(Debug, Clone, PartialEq)]
pub struct HttpHeader {
    pub k: String,
    pub v: String,
}

impl HttpHeader {
    pub fn new(k: &str, v: impl ToString) -> Self {
        Self {
            k: k.to_string(),
            v: v.to_string(),
        }
    }
}

/// 能够把自身渲染成组件树的记录类型
pub trait Renderable {
    fn render(&self) -> Node;
}

/// 一个 HTML 元素
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    tag: String,
    children: Vec<Component>,
    attrs: Vec<(String, Option<String>)>,
}

/// 无需闭合标签的空元素
pub const VOIDS: &[&str] = &[
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

/// 设置 `id` 时自动补上同名 `name` 属性的元素
pub const NAMED: &[&str] = &[
    "a", "button", "form", "frame", "iframe", "img", "input", "map", "meta", "object", "param",
    "select", "textarea",
];

/// 子文本不转义的元素
const RAW_TEXT: &[&str] = &["script", "style"];

macro_rules! tags {
    ($($name:ident),* $(,)?) => {
        /// 支持的全部元素标签
        pub const TAGS: &[&str] = &[$(stringify!($name)),*];

        $(
            #[doc = concat!("构造一个 `<", stringify!($name), ">` 元素")]
            pub fn $name() -> Node {
                Node::new(stringify!($name))
            }
        )*
    };
}

tags! {
    a, abbr, address, area, article, aside, audio, b, base, bdi, bdo, blockquote, body, br,
    button, canvas, caption, cite, code, col, colgroup, data, datalist, dd, del, details, dfn,
    dialog, div, dl, dt, em, embed, fieldset, figcaption, figure, footer, form, h1, h2, h3, h4,
    h5, h6, head, header, hgroup, hr, html, i, iframe, img, input, ins, kbd, label, legend, li,
    link, main, map, mark, menu, meta, meter, nav, noscript, object, ol, optgroup, option,
    output, p, picture, pre, progress, q, rp, rt, ruby, s, samp, script, search, section,
    select, slot, small, source, span, strong, style, sub, summary, sup, table, tbody, td,
    template, textarea, tfoot, th, thead, time, title, tr, track, u, ul, var, video, wbr,
}

/// 把关键字风格的属性名转换为 HTML 属性名
pub fn attr_name(key: &str) -> String {
    match key {
        "cls" | "klass" | "_class" => return "class".to_string(),
        "fr" => return "for".to_string(),
        _ => {}
    }
    let key = key.strip_suffix('_').unwrap_or(key);
    key.replace('_', "-")
}

impl Node {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            children: Vec::new(),
            attrs: Vec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn children(&self) -> &[Component] {
        &self.children
    }

    pub fn is_void(&self) -> bool {
        VOIDS.contains(&self.tag.as_str())
    }

    /// 读取属性值；布尔属性返回空字符串
    pub fn get_attr(&self, key: &str) -> Option<&str> {
        let key = attr_name(key);
        self.attrs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    pub fn child(mut self, c: impl Into<Component>) -> Self {
        self.children.push(c.into());
        self
    }

    pub fn children_from<I, C>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Component>,
    {
        self.children.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn text(self, s: impl ToString) -> Self {
        self.child(Component::Text(s.to_string()))
    }

    pub fn safe(self, s: impl ToString) -> Self {
        self.child(Component::Safe(s.to_string()))
    }

    /// 设置属性，已存在的同名属性会被覆盖
    pub fn attr(mut self, key: &str, value: impl ToString) -> Self {
        self.set(attr_name(key), Some(value.to_string()));
        self
    }

    /// 设置布尔属性（只输出属性名）
    pub fn flag(mut self, key: &str) -> Self {
        self.set(attr_name(key), None);
        self
    }

    pub fn remove_attr(mut self, key: &str) -> Self {
        let key = attr_name(key);
        self.attrs.retain(|(k, _)| *k != key);
        self
    }

    /// 批量设置属性，用于应用级 `bodykw` / `htmlkw`
    pub fn attrs<'a>(self, kw: impl IntoIterator<Item = &'a (String, String)>) -> Self {
        kw.into_iter().fold(self, |node, (k, v)| node.attr(k, v))
    }

    fn set(&mut self, key: String, value: Option<String>) {
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((key, value)),
        }
    }

    /// 设置 `id`；表单类元素在没有 `name` 时自动补上同名 `name`
    pub fn id(self, id: impl ToString) -> Self {
        let id = id.to_string();
        let named = NAMED.contains(&self.tag.as_str()) && self.get_attr("name").is_none();
        let node = self.attr("id", &id);
        if named {
            node.attr("name", id)
        } else {
            node
        }
    }

    pub fn cls(self, cls: impl ToString) -> Self {
        self.attr("class", cls)
    }

    pub fn hx_get(self, url: impl ToString) -> Self {
        self.attr("hx-get", url)
    }

    pub fn hx_post(self, url: impl ToString) -> Self {
        self.attr("hx-post", url)
    }

    pub fn hx_put(self, url: impl ToString) -> Self {
        self.attr("hx-put", url)
    }

    pub fn hx_delete(self, url: impl ToString) -> Self {
        self.attr("hx-delete", url)
    }

    pub fn hx_target(self, target: impl ToString) -> Self {
        self.attr("hx-target", target)
    }

    /// `hx-target` 的简写：`target_id("list")` 等价于 `hx-target="#list"`
    pub fn target_id(self, id: &str) -> Self {
        self.attr("hx-target", format!("#{}", id))
    }

    pub fn hx_swap(self, swap: impl ToString) -> Self {
        self.attr("hx-swap", swap)
    }

    pub fn hx_swap_oob(self, swap: impl ToString) -> Self {
        self.attr("hx-swap-oob", swap)
    }

    pub fn hx_trigger(self, trigger: impl ToString) -> Self {
        self.attr("hx-trigger", trigger)
    }

    /// 渲染为 HTML 文本；`<html>` 根节点前会加上 doctype
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        if self.tag == "html" {
            out.push_str("<!doctype html>");
        }
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            if let Some(v) = v {
                out.push_str("=\"");
                out.push_str(&escape_html(v));
                out.push('"');
            }
        }
        out.push('>');
        if self.is_void() {
            return;
        }
        let raw = RAW_TEXT.contains(&self.tag.as_str());
        for c in &self.children {
            match c {
                Component::Node(n) => n.write_html(out),
                Component::Text(t) if raw => out.push_str(t),
                Component::Text(t) => out.push_str(&escape_html(t)),
                Component::Safe(s) => out.push_str(s),
                Component::Header(_) => {}
            }
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }

    /// 深度优先查找第一个满足条件的节点
    pub fn find(&self, pred: &dyn Fn(&Node) -> bool) -> Option<&Node> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| match c {
            Component::Node(n) => n.find(pred),
            _ => None,
        })
    }
}

impl Component {
    pub fn tag(&self) -> Option<&str> {
        match self {
            Component::Node(n) => Some(n.tag()),
            _ => None,
        }
    }

    pub fn to_html(&self) -> String {
        match self {
            Component::Node(n) => n.to_html(),
            Component::Text(t) => escape_html(t),
            Component::Safe(s) => s.clone(),
            Component::Header(_) => String::new(),
        }
    }

    pub fn from_renderable<R: Renderable + ?Sized>(r: &R) -> Self {
        Component::Node(r.render())
    }
}

impl From<Node> for Component {
    fn from(n: Node) -> Self {
        Component::Node(n)
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Component::Text(s.to_string())
    }
}

impl From<String> for Component {
    fn from(s: String) -> Self {
        Component::Text(s)
    }
}

impl From<HttpHeader> for Component {
    fn from(h: HttpHeader) -> Self {
        Component::Header(h)
    }
}

/// 渲染一组组件并按顺序拼接
pub fn to_html(items: &[Component]) -> String {
    items.iter().map(Component::to_html).collect()
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// 页面标题加正文容器：`<title>` 与 `<main class="container"><h1>`
pub fn titled<I, C>(page_title: &str, contents: I) -> Vec<Component>
where
    I: IntoIterator<Item = C>,
    C: Into<Component>,
{
    vec![
        title().text(page_title).into(),
        main()
            .cls("container")
            .child(h1().text(page_title))
            .children_from(contents)
            .into(),
    ]
}

pub fn hidden(id: &str, value: impl ToString) -> Node {
    input().attr("type", "hidden").id(id).attr("value", value)
}

/// 带隐藏兜底字段的复选框：未勾选时表单仍会提交一个空值
pub fn checkbox_x(id: &str, label_text: &str, checked: bool) -> Vec<Component> {
    let mut cb = input().attr("type", "checkbox").id(id);
    if checked {
        cb = cb.flag("checked");
    }
    vec![
        hidden(id, "").remove_attr("id").into(),
        label().child(cb).text(label_text).into(),
    ]
}

/// 用记录中同名字段填充表单里带 `name` 的控件
pub fn fill_form(form: Node, obj: &Map<String, Value>) -> Node {
    let Node {
        tag,
        children,
        attrs,
    } = form;
    let children = children
        .into_iter()
        .map(|c| match c {
            Component::Node(n) => Component::Node(fill_form(n, obj)),
            other => other,
        })
        .collect();
    let mut node = Node {
        tag,
        children,
        attrs,
    };
    let name = node.get_attr("name").map(str::to_string);
    let val = match name.and_then(|n| obj.get(&n).cloned()) {
        Some(v) if !v.is_null() => v,
        _ => return node,
    };
    if node.tag == "input" {
        let kind = node.get_attr("type").unwrap_or("").to_string();
        if kind == "hidden" && val.is_boolean() {
            // 复选框的兜底字段保持空值
            return node;
        }
        if kind == "checkbox" || kind == "radio" {
            node = if truthy(&val) {
                node.attr("checked", "1")
            } else {
                node.remove_attr("checked")
            };
        } else {
            node = node.attr("value", value_text(&val));
        }
    } else if node.tag == "textarea" {
        node.children = vec![Component::Text(value_text(&val))];
    }
    node
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        _ => true,
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
