use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use hxweb::{
    binding::{resolve, ParamSpec, RequestContext, Scope},
    request::Request,
    router::Router,
    App, HttpRequestMethod, ParamType, Reply, Route, Session,
};

use std::sync::Arc;

fn simple_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET / HTTP/1.1\r\nHost: localhost:5001\r\nUser-Agent: Test\r\n\r\n";

    c.bench_function("simple_request_parse", |b| {
        b.iter(|| {
            let buffer = black_box(request.to_vec());
            let _ = Request::try_from(&buffer, 0).unwrap();
        });
    });
}

fn htmx_request_parse_benchmark(c: &mut Criterion) {
    let request = b"GET /todos/12/edit?tag=a&tag=b HTTP/1.1\r\n\
                    Host: localhost:5001\r\n\
                    User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64)\r\n\
                    Accept: text/html,application/xhtml+xml\r\n\
                    Accept-Encoding: gzip, deflate, br\r\n\
                    Cookie: theme=dark; session_=eyJkIjp7fSwiaWF0IjowfQ.c2ln\r\n\
                    HX-Request: true\r\n\
                    HX-Target: current-todo\r\n\
                    HX-Current-URL: http://localhost:5001/\r\n\
                    \r\n";

    c.bench_function("htmx_request_parse", |b| {
        b.iter(|| {
            let buffer = black_box(request.to_vec());
            let req = Request::try_from(&buffer, 0).unwrap();
            black_box(req.htmx());
        });
    });
}

fn request_form_body_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_form_body");

    for fields in [1, 10, 100].iter() {
        let body = (0..*fields)
            .map(|i| format!("field{}=value+{}", i, i))
            .collect::<Vec<String>>()
            .join("&");
        let request = format!(
            "POST /todos HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        group.bench_with_input(BenchmarkId::from_parameter(fields), &request, |b, request| {
            b.iter(|| {
                let buffer = black_box(request.as_bytes().to_vec());
                let req = Request::try_from(&buffer, 0).unwrap();
                black_box(req.form().len());
            });
        });
    }

    group.finish();
}

fn route_dispatch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_dispatch");

    for count in [10, 100].iter() {
        let mut router = Router::new();
        for i in 0..*count {
            router
                .add(Route::get(&format!("/r{}/{{id:int}}", i)).handler_fn(|_| Ok(Reply::Empty)))
                .unwrap();
        }
        let last = format!("/r{}/42", count - 1);
        group.bench_with_input(BenchmarkId::from_parameter(count), &last, |b, path| {
            b.iter(|| {
                let _ = router
                    .dispatch(HttpRequestMethod::Get, black_box(path))
                    .unwrap();
            });
        });
    }

    group.finish();
}

fn resolve_params_benchmark(c: &mut Criterion) {
    let request = Request::build(
        HttpRequestMethod::Post,
        "/todos?page=2",
        &[
            ("Content-Type", "application/x-www-form-urlencoded"),
            ("Cookie", "theme=dark"),
            ("User-Agent", "bench"),
        ],
        "task=buy+milk&done=&done=on&tag=a&tag=b",
    )
    .unwrap();
    let ctx = RequestContext {
        request: Arc::new(request),
        session: Session::new(),
        scope: Scope::default(),
        app: Arc::new(App::new()),
    };
    let specs = [
        ParamSpec::typed("page", ParamType::Int),
        ParamSpec::typed("theme", ParamType::Str),
        ParamSpec::typed("user_agent", ParamType::Str),
        ParamSpec::typed("done", ParamType::Bool),
        ParamSpec::typed("tag", ParamType::list(ParamType::Str)),
        ParamSpec::typed("limit", ParamType::Int).default(20),
    ];

    c.bench_function("resolve_params", |b| {
        b.iter(|| black_box(resolve(&ctx, &specs).unwrap().len()));
    });
}

criterion_group!(
    benches,
    simple_request_parse_benchmark,
    htmx_request_parse_benchmark,
    request_form_body_benchmark,
    route_dispatch_benchmark,
    resolve_params_benchmark
);
criterion_main!(benches);
