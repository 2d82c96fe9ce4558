//! # 待办事项演示应用
//!
//! 登录后维护一张待办列表：新增、查看、编辑、勾选完成、删除。
//! 所有页面都要求会话里有 `auth`，否则前置钩子把请求重定向到 `/login`。
//! 第一次用某个用户名登录时自动注册该用户。

use log::{info, warn};
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Value};

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
};

use crate::{
    app::{App, AppBuilder},
    binding::{FormRecord, ParamSpec},
    coerce::ParamType,
    config::Config,
    exception::Exception,
    hooks::{constant_time_eq, Beforeware},
    html::{
        a, button, checkbox_x, div, fill_form, form, h2, hidden, input, li, titled, ul, Component,
        Node, Renderable,
    },
    response::Response,
    router::Route,
    shaper::Reply,
    table::{Record, Table},
    toast::{add_toast, setup_toasts, ToastKind},
};

/// 一条待办事项
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Todo {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub done: bool,
}

impl Todo {
    pub fn new(task: &str) -> Self {
        Self {
            id: None,
            task: task.to_string(),
            done: false,
        }
    }

    fn dom_id(&self) -> String {
        format!("todo-{}", self.id.unwrap_or_default())
    }
}

impl Record for Todo {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

impl FormRecord for Todo {
    fn fields() -> Vec<(&'static str, ParamType)> {
        vec![
            ("id", ParamType::optional(ParamType::Int)),
            ("task", ParamType::Str),
            ("done", ParamType::Bool),
        ]
    }
}

impl Renderable for Todo {
    fn render(&self) -> Node {
        let id = self.id.unwrap_or_default();
        let show = a()
            .attr("href", "#")
            .hx_get(format!("/todos/{}", id))
            .target_id("current-todo")
            .text(&self.task);
        let edit = a()
            .attr("href", "#")
            .hx_get(format!("/todos/{}/edit", id))
            .target_id("current-todo")
            .text("edit");
        let delete = a()
            .attr("href", "#")
            .hx_delete(format!("/todos/{}", id))
            .target_id(&self.dom_id())
            .hx_swap("outerHTML")
            .text("delete");
        let mut item = li().id(self.dom_id());
        if self.done {
            item = item.text("✅ ");
        }
        item.child(show)
            .text(" | ")
            .child(edit)
            .text(" | ")
            .child(delete)
    }
}

/// 演示应用的数据：待办表与用户口令表
pub struct TodoStore {
    todos: Table<Todo>,
    users: Mutex<HashMap<String, String>>,
}

impl TodoStore {
    pub fn in_memory() -> Self {
        Self {
            todos: Table::new("todos"),
            users: Mutex::new(HashMap::new()),
        }
    }

    /// 待办表持久化到 `path`，用户表只在内存中
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Exception> {
        Ok(Self {
            todos: Table::open("todos", path)?,
            users: Mutex::new(HashMap::new()),
        })
    }

    pub fn todos(&self) -> &Table<Todo> {
        &self.todos
    }

    /// 校验口令；用户不存在时以本次口令注册
    fn login(&self, name: &str, pwd: &str) -> bool {
        let mut users = match self.users.lock() {
            Ok(users) => users,
            Err(poisoned) => poisoned.into_inner(),
        };
        match users.get(name) {
            Some(expected) => constant_time_eq(expected.as_bytes(), pwd.as_bytes()),
            None => {
                info!("注册新用户：{}", name);
                users.insert(name.to_string(), pwd.to_string());
                true
            }
        }
    }
}

/// 新增表单的输入框；新增成功后用 OOB 交换清空它
fn new_input() -> Node {
    input()
        .attr("name", "task")
        .id("new-task")
        .attr("placeholder", "New Todo")
}

fn record_map(todo: &Todo) -> Result<Map<String, Value>, Exception> {
    match serde_json::to_value(todo)? {
        Value::Object(map) => Ok(map),
        _ => Err(Exception::Internal("待办记录无法序列化为映射".into())),
    }
}

fn login_hook() -> Result<Beforeware, Exception> {
    Beforeware::from_fn(|args| {
        let sess = args.session("sess")?;
        match sess.get_str("auth") {
            Some(user) => {
                args.scope().insert("auth", user);
                Ok(None)
            }
            None => Ok(Some(Reply::from(Response::redirect("/login")))),
        }
    })
    .param(ParamSpec::untyped("sess"))
    .skip(&[r"/favicon\.ico", r"/static/.*", r".*\.css", "/login"])
}

fn login_page() -> Reply {
    let frm = form()
        .attr("action", "/login")
        .attr("method", "post")
        .child(input().id("name").attr("placeholder", "Name"))
        .child(
            input()
                .id("pwd")
                .attr("type", "password")
                .attr("placeholder", "Password"),
        )
        .child(button().attr("type", "submit").text("login"));
    Reply::Nodes(titled("Login", vec![frm]))
}

fn index_page(store: &TodoStore, user: &str) -> Reply {
    let add = form()
        .hx_post("/todos")
        .target_id("todo-list")
        .hx_swap("beforeend")
        .child(new_input())
        .child(button().text("Add"));
    let items = store.todos.list();
    let list = ul()
        .id("todo-list")
        .children_from(items.iter().map(Component::from_renderable));
    let contents: Vec<Component> = vec![
        a().attr("href", "/logout").text("logout").into(),
        add.into(),
        list.into(),
        div().id("current-todo").into(),
    ];
    Reply::Nodes(titled(&format!("{}'s Todo list", user), contents))
}

fn edit_form(todo: &Todo) -> Result<Node, Exception> {
    let id = todo.id.unwrap_or_default();
    let frm = form()
        .id("edit")
        .hx_put("/todos")
        .target_id(&todo.dom_id())
        .hx_swap("outerHTML")
        .child(input().id("task"))
        .children_from(checkbox_x("done", "Done", todo.done))
        .child(hidden("id", id))
        .child(button().text("Save"));
    Ok(fill_form(frm, &record_map(todo)?))
}

/// 把演示应用的路由、钩子与提示功能装到 `builder` 上
pub fn install(
    builder: AppBuilder,
    store: Arc<TodoStore>,
    toast_duration: u64,
) -> Result<AppBuilder, Exception> {
    let login = {
        let store = store.clone();
        Route::post("/login")
            .param(ParamSpec::typed("name", ParamType::Str).default(""))
            .param(ParamSpec::typed("pwd", ParamType::Str).default(""))
            .param(ParamSpec::untyped("sess"))
            .handler_fn(move |args| {
                let name: String = args.get("name")?;
                let pwd: String = args.get("pwd")?;
                if name.is_empty() || pwd.is_empty() || name == "logout" {
                    return Ok(Response::redirect("/login").into());
                }
                if !store.login(&name, &pwd) {
                    warn!("用户{}口令错误", name);
                    return Ok(Response::redirect("/login").into());
                }
                args.session("sess")?.insert("auth", name);
                Ok(Response::redirect("/").into())
            })
    };

    let index = {
        let store = store.clone();
        Route::get("/")
            .param(ParamSpec::untyped("auth"))
            .handler_fn(move |args| {
                let user: String = args.get("auth")?;
                Ok(index_page(&store, &user))
            })
    };

    let create = {
        let store = store.clone();
        Route::post("/todos")
            .param(ParamSpec::body::<Todo>("todo"))
            .param(ParamSpec::untyped("sess"))
            .handler_fn(move |args| {
                let mut todo: Todo = args.get("todo")?;
                todo.id = None;
                let todo = store.todos.insert(todo)?;
                add_toast(
                    &args.session("sess")?,
                    &format!("Added \"{}\"", todo.task),
                    ToastKind::Success,
                    false,
                );
                Ok(Reply::nodes(vec![
                    Component::from_renderable(&todo),
                    new_input().hx_swap_oob("true").into(),
                ]))
            })
    };

    let list = {
        let store = store.clone();
        Route::get("/todos").handler_fn(move |_| {
            let items = store.todos.list();
            Ok(Reply::nodes(items.iter().map(Component::from_renderable)))
        })
    };

    let show = {
        let store = store.clone();
        Route::get("/todos/{id:int}")
            .param(ParamSpec::typed("id", ParamType::Int))
            .handler_fn(move |args| {
                let id: i64 = args.get("id")?;
                let todo = store.todos.get(id)?;
                let delete = button()
                    .text("delete")
                    .hx_delete(format!("/todos/{}", id))
                    .target_id(&todo.dom_id())
                    .hx_swap("outerHTML");
                Ok(div().child(h2().text(&todo.task)).child(delete).into())
            })
    };

    let edit = {
        let store = store.clone();
        Route::get("/todos/{id:int}/edit")
            .param(ParamSpec::typed("id", ParamType::Int))
            .handler_fn(move |args| {
                let id: i64 = args.get("id")?;
                let todo = store.todos.get(id)?;
                Ok(edit_form(&todo)?.into())
            })
    };

    let update = {
        let store = store.clone();
        Route::put("/todos")
            .param(ParamSpec::body::<Todo>("todo"))
            .handler_fn(move |args| {
                let todo: Todo = args.get("todo")?;
                let todo = store.todos.update(todo)?;
                Ok(Reply::render(&todo))
            })
    };

    let remove = Route::delete("/todos/{id:int}")
        .param(ParamSpec::typed("id", ParamType::Int))
        .param(ParamSpec::untyped("sess"))
        .handler_fn(move |args| {
            let id: i64 = args.get("id")?;
            let todo = store.todos.delete(id)?;
            add_toast(
                &args.session("sess")?,
                &format!("Deleted \"{}\"", todo.task),
                ToastKind::Info,
                false,
            );
            Ok(Reply::Empty)
        });

    let builder = builder
        .before(login_hook()?)
        .route(Route::get("/login").handler_fn(|_| Ok(login_page())))
        .route(login)
        .route(
            Route::get("/logout")
                .param(ParamSpec::untyped("sess"))
                .handler_fn(|args| {
                    args.session("sess")?.remove("auth");
                    Ok(Response::redirect("/login").into())
                }),
        )
        .route(index)
        .route(create)
        .route(list)
        .route(show)
        .route(edit)
        .route(update)
        .route(remove)
        .exception_handler(404, |_, _| {
            Reply::Nodes(titled(
                "Oh no!",
                vec![div().text("We could not find that page :(")],
            ))
        });
    Ok(setup_toasts(builder, toast_duration))
}

/// 按配置组装完整的演示应用
pub fn build(config: &Config) -> Result<App, Exception> {
    let store = match config.db_file() {
        Some(path) => TodoStore::open(path)?,
        None => TodoStore::in_memory(),
    };
    install(
        AppBuilder::from_config(config),
        Arc::new(store),
        config.toast_duration(),
    )?
    .build()
}
