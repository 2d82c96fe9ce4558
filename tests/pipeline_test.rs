use hxweb::{
    basic_auth,
    html::p,
    todos::{self, TodoStore},
    App, HttpRequestMethod, ParamSpec, ParamType, Reply, Request, Response, Route,
};
use serde_json::json;

use std::{collections::HashMap, sync::Arc};

/// 在进程内驱动应用的简易客户端，自动携带会话 Cookie
struct Client {
    app: Arc<App>,
    cookie: Option<String>,
}

impl Client {
    fn new(app: App) -> Self {
        Self::shared(Arc::new(app))
    }

    fn shared(app: Arc<App>) -> Self {
        Self { app, cookie: None }
    }

    async fn send(
        &mut self,
        method: HttpRequestMethod,
        target: &str,
        body: &str,
        htmx: bool,
    ) -> Response {
        self.send_as(method, target, "application/x-www-form-urlencoded", body, htmx)
            .await
    }

    async fn send_as(
        &mut self,
        method: HttpRequestMethod,
        target: &str,
        content_type: &str,
        body: &str,
        htmx: bool,
    ) -> Response {
        let cookie = self.cookie.as_ref().map(|c| format!("session_={}", c));
        let mut headers = vec![("Content-Type", content_type)];
        if let Some(c) = &cookie {
            headers.push(("Cookie", c.as_str()));
        }
        if htmx {
            headers.push(("HX-Request", "true"));
        }
        let request = Request::build(method, target, &headers, body).unwrap();
        let response = self.app.handle(request).await;
        for line in response.cookies() {
            match line
                .strip_prefix("session_=")
                .and_then(|s| s.split(';').next())
            {
                Some("null") => self.cookie = None,
                Some(v) => self.cookie = Some(v.to_string()),
                None => {}
            }
        }
        response
    }

    async fn get(&mut self, target: &str) -> Response {
        self.send(HttpRequestMethod::Get, target, "", true).await
    }

    async fn login(&mut self, name: &str) {
        let body = format!("name={}&pwd=secret", name);
        let r = self
            .send(HttpRequestMethod::Post, "/login", &body, false)
            .await;
        assert_eq!(r.status_code(), 303);
        assert_eq!(r.get_header("Location"), Some("/"));
        assert!(self.cookie.is_some());
    }
}

fn todo_app() -> (App, Arc<TodoStore>) {
    let store = Arc::new(TodoStore::in_memory());
    let builder = App::builder().secret_key("pipeline").default_hdrs(false);
    let app = todos::install(builder, store.clone(), 1000)
        .unwrap()
        .build()
        .unwrap();
    (app, store)
}

#[tokio::test]
async fn test_redirect_hook_blocks_mutation() {
    let (app, store) = todo_app();
    let mut client = Client::new(app);
    let r = client.get("/").await;
    assert_eq!(r.status_code(), 303);
    assert_eq!(r.get_header("Location"), Some("/login"));

    let r = client
        .send(HttpRequestMethod::Post, "/todos", "task=sneaky", true)
        .await;
    assert_eq!(r.status_code(), 303);
    assert!(store.todos().is_empty());
}

#[tokio::test]
async fn test_login_page_skips_hook() {
    let (app, _) = todo_app();
    let mut client = Client::new(app);
    let r = client
        .send(HttpRequestMethod::Get, "/login", "", false)
        .await;
    assert_eq!(r.status_code(), 200);
    let body = r.text_body();
    assert!(body.starts_with("<!doctype html><html><head><title>Login</title>"));
    assert!(body.contains(r#"<form action="/login" method="post"><input id="name" name="name""#));
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let (app, _) = todo_app();
    let mut client = Client::new(app);
    client.login("ann").await;

    let mut other = Client::shared(client.app.clone());
    let r = other
        .send(HttpRequestMethod::Post, "/login", "name=ann&pwd=wrong", false)
        .await;
    assert_eq!(r.get_header("Location"), Some("/login"));
    assert!(other.cookie.is_none());
}

#[tokio::test]
async fn test_buy_milk_lifecycle() {
    let (app, store) = todo_app();
    let mut client = Client::new(app);
    client.login("ann").await;

    let r = client
        .send(HttpRequestMethod::Post, "/todos", "task=buy+milk", true)
        .await;
    assert_eq!(r.status_code(), 200);
    let body = r.text_body();
    assert!(body.starts_with(r#"<li id="todo-1">"#));
    assert!(body.contains(r#"hx-swap-oob="true""#));
    assert!(body.contains("fh-toast-container"));
    assert!(body.contains("Added &quot;buy milk&quot;"));
    assert_eq!(store.todos().len(), 1);

    // 提示只出现一次
    let r = client.get("/todos").await;
    let body = r.text_body();
    assert_eq!(body.matches("buy milk").count(), 1);
    assert!(!body.contains("fh-toast"));

    let r = client
        .send(HttpRequestMethod::Delete, "/todos/1", "", true)
        .await;
    assert_eq!(r.status_code(), 200);
    assert!(r.text_body().contains("Deleted"));

    let r = client.get("/todos").await;
    assert_eq!(r.status_code(), 200);
    assert!(!r.text_body().contains("buy milk"));
    assert!(store.todos().is_empty());
}

#[tokio::test]
async fn test_multipart_create() {
    let (app, store) = todo_app();
    let mut client = Client::new(app);
    client.login("ann").await;

    let body = "--XX\r\n\
                Content-Disposition: form-data; name=\"task\"\r\n\r\n\
                buy milk\r\n\
                --XX\r\n\
                Content-Disposition: form-data; name=\"done\"\r\n\r\n\
                on\r\n\
                --XX--\r\n";
    let r = client
        .send_as(
            HttpRequestMethod::Post,
            "/todos",
            "multipart/form-data; boundary=XX",
            body,
            true,
        )
        .await;
    assert_eq!(r.status_code(), 200);
    assert!(r.text_body().starts_with(r#"<li id="todo-1">"#));
    let saved = store.todos().get(1).unwrap();
    assert_eq!(saved.task, "buy milk");
    assert!(saved.done);

    let r = client
        .send_as(
            HttpRequestMethod::Post,
            "/todos",
            "multipart/form-data; boundary=XX",
            "--XX\r\nbroken",
            true,
        )
        .await;
    assert_eq!(r.status_code(), 400);
    assert_eq!(store.todos().len(), 1);
}

#[tokio::test]
async fn test_index_full_page() {
    let (app, _) = todo_app();
    let mut client = Client::new(app);
    client.login("ann").await;
    client
        .send(HttpRequestMethod::Post, "/todos", "task=walk", true)
        .await;
    let r = client.send(HttpRequestMethod::Get, "/", "", false).await;
    assert_eq!(r.status_code(), 200);
    let body = r.text_body();
    assert!(body.starts_with("<!doctype html><html><head><title>ann&#x27;s Todo list</title>"));
    assert!(body.contains(r#"<ul id="todo-list"><li id="todo-1">"#));
    assert!(body.contains(r#"<div id="fh-toast-container" hx-swap-oob="afterbegin"></div></body>"#));
}

#[tokio::test]
async fn test_checkbox_toggles_done() {
    let (app, store) = todo_app();
    let mut client = Client::new(app);
    client.login("ann").await;
    client
        .send(HttpRequestMethod::Post, "/todos", "task=walk", true)
        .await;

    let r = client.get("/todos/1/edit").await;
    let body = r.text_body();
    assert!(body.contains(r#"value="walk""#));
    assert!(body.contains(r#"hx-put="/todos""#));

    let r = client
        .send(
            HttpRequestMethod::Put,
            "/todos",
            "task=walk+dog&done=&done=on&id=1",
            true,
        )
        .await;
    assert_eq!(r.status_code(), 200);
    assert!(r.text_body().contains("✅ "));
    assert!(store.todos().get(1).unwrap().done);

    client
        .send(HttpRequestMethod::Put, "/todos", "task=walk+dog&done=&id=1", true)
        .await;
    let todo = store.todos().get(1).unwrap();
    assert!(!todo.done);
    assert_eq!(todo.task, "walk dog");
}

#[tokio::test]
async fn test_missing_record_uses_404_handler() {
    let (app, _) = todo_app();
    let mut client = Client::new(app);
    client.login("ann").await;
    let r = client.get("/todos/99").await;
    assert_eq!(r.status_code(), 404);
    assert!(r.text_body().contains("We could not find that page :("));

    let r = client.get("/no/such/page").await;
    assert_eq!(r.status_code(), 404);
    assert!(r.text_body().contains("Oh no!"));
}

#[tokio::test]
async fn test_method_not_allowed() {
    let (app, _) = todo_app();
    let mut client = Client::new(app);
    let r = client
        .send(HttpRequestMethod::Delete, "/todos", "", true)
        .await;
    assert_eq!(r.status_code(), 405);
    assert_eq!(r.get_header("Allow"), Some("GET, POST, PUT"));
}

#[tokio::test]
async fn test_tampered_session_is_anonymous() {
    let (app, _) = todo_app();
    let mut client = Client::new(app);
    client.login("ann").await;
    let forged = client.cookie.clone().unwrap().replace('.', "x.");
    client.cookie = Some(forged);
    let r = client.get("/").await;
    assert_eq!(r.status_code(), 303);
    assert_eq!(r.get_header("Location"), Some("/login"));
}

#[tokio::test]
async fn test_logout_clears_session() {
    let (app, _) = todo_app();
    let mut client = Client::new(app);
    client.login("ann").await;
    let r = client.get("/logout").await;
    assert_eq!(r.status_code(), 303);
    assert!(client.cookie.is_none());
    assert_eq!(client.get("/").await.status_code(), 303);
}

#[tokio::test]
async fn test_static_files_bypass_login() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.css"), "body{}").unwrap();
    let store = Arc::new(TodoStore::in_memory());
    let builder = App::builder()
        .secret_key("pipeline")
        .static_files(dir.path());
    let app = todos::install(builder, store, 1000).unwrap().build().unwrap();
    let mut client = Client::new(app);

    let r = client.get("/app.css").await;
    assert_eq!(r.status_code(), 200);
    assert_eq!(r.text_body(), "body{}");
    assert_eq!(client.get("/missing.css").await.status_code(), 404);
}

fn binding_app() -> App {
    App::builder()
        .secret_key("binding")
        .route(
            Route::get("/flags")
                .param(ParamSpec::typed("a", ParamType::Bool))
                .param(ParamSpec::typed("b", ParamType::Bool))
                .param(ParamSpec::typed("c", ParamType::Bool))
                .param(ParamSpec::typed("d", ParamType::Bool).default(true))
                .handler_fn(|args| {
                    Ok(Reply::from(json!({
                        "a": args.get::<bool>("a")?,
                        "b": args.get::<bool>("b")?,
                        "c": args.get::<bool>("c")?,
                        "d": args.get::<bool>("d")?,
                    })))
                }),
        )
        .route(
            Route::get("/items/{id:int}")
                .param(ParamSpec::typed("id", ParamType::Int))
                .handler_fn(|args| Ok(Reply::display(args.get::<i64>("id")?))),
        )
        .route(
            Route::post("/tags")
                .param(ParamSpec::typed("tag", ParamType::list(ParamType::Str)))
                .handler_fn(|args| Ok(Reply::from(json!(args.get::<Vec<String>>("tag")?)))),
        )
        .route(
            Route::get("/need")
                .param(ParamSpec::typed("n", ParamType::Int))
                .handler_fn(|args| Ok(Reply::display(args.get::<i64>("n")?))),
        )
        .route(Route::get("/hello").handler_fn(|_| Ok(Reply::from(p().text("hello")))))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_bool_on_none_empty_default() {
    let mut client = Client::new(binding_app());
    let r = client.get("/flags?a=on&b=none&c=").await;
    assert_eq!(r.content_type(), Some("application/json"));
    assert_eq!(
        r.text_body(),
        r#"{"a":true,"b":false,"c":false,"d":true}"#
    );
}

#[tokio::test]
async fn test_path_param_beats_query() {
    let mut client = Client::new(binding_app());
    let r = client.get("/items/5?id=9").await;
    assert_eq!(r.text_body(), "5");
}

#[tokio::test]
async fn test_list_keeps_submission_order() {
    let mut client = Client::new(binding_app());
    let r = client
        .send(HttpRequestMethod::Post, "/tags", "tag=b&tag=a&tag=c", true)
        .await;
    assert_eq!(r.text_body(), r#"["b","a","c"]"#);
    let r = client
        .send(HttpRequestMethod::Post, "/tags", "tag=solo", true)
        .await;
    assert_eq!(r.text_body(), r#"["solo"]"#);
}

#[tokio::test]
async fn test_missing_and_bad_parameters() {
    let mut client = Client::new(binding_app());
    assert_eq!(client.get("/need").await.status_code(), 400);
    assert_eq!(client.get("/need?n=abc").await.status_code(), 500);
    assert_eq!(client.get("/need?n=3").await.text_body(), "3");
}

#[tokio::test]
async fn test_head_on_get_route() {
    let mut client = Client::new(binding_app());
    let r = client
        .send(HttpRequestMethod::Head, "/hello", "", true)
        .await;
    assert_eq!(r.status_code(), 200);
    assert!(r.get_content_length() > 0);
    let wire = String::from_utf8(r.as_bytes()).unwrap();
    assert!(wire.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn test_basic_auth_pipeline() {
    let mut users = HashMap::new();
    users.insert("ann".to_string(), "pw".to_string());
    let app = App::builder()
        .secret_key("basic")
        .before(basic_auth(users, &["/public"]).unwrap())
        .route(
            Route::get("/me")
                .param(ParamSpec::untyped("auth"))
                .handler_fn(|args| Ok(Reply::display(args.get::<String>("auth")?))),
        )
        .route(Route::get("/public").handler_fn(|_| Ok(Reply::from("open"))))
        .build()
        .unwrap();
    let app = Arc::new(app);

    let r = app
        .handle(Request::build(HttpRequestMethod::Get, "/me", &[], "").unwrap())
        .await;
    assert_eq!(r.status_code(), 401);
    assert_eq!(r.get_header("WWW-Authenticate"), Some(r#"Basic realm="login""#));

    // "ann:pw"
    let r = app
        .handle(
            Request::build(
                HttpRequestMethod::Get,
                "/me",
                &[("Authorization", "Basic YW5uOnB3")],
                "",
            )
            .unwrap(),
        )
        .await;
    assert_eq!(r.status_code(), 200);
    assert_eq!(r.text_body(), "ann");

    let r = app
        .handle(Request::build(HttpRequestMethod::Get, "/public", &[], "").unwrap())
        .await;
    assert_eq!(r.text_body(), "open");
}
