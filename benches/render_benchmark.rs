use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use hxweb::{
    html::{div, li, titled, ul, Component, Renderable},
    shaper::{Reply, Shaper},
    todos::Todo,
    App, HttpRequestMethod, Request,
};

fn todos(count: usize) -> Vec<Todo> {
    (0..count)
        .map(|i| Todo {
            id: Some(i as i64 + 1),
            task: format!("task <{}> & more", i),
            done: i % 2 == 0,
        })
        .collect()
}

fn render_list_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_todo_list");

    for count in [10, 100, 1000].iter() {
        let items = todos(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &items, |b, items| {
            b.iter(|| {
                let list = ul()
                    .id("todo-list")
                    .children_from(items.iter().map(Component::from_renderable));
                black_box(list.to_html());
            });
        });
    }

    group.finish();
}

fn render_nested_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_nested");

    for depth in [4, 16, 64].iter() {
        let mut node = li().text("leaf");
        for i in 0..*depth {
            node = div().cls(format!("level-{}", i)).child(node);
        }
        group.bench_with_input(BenchmarkId::from_parameter(depth), &node, |b, node| {
            b.iter(|| black_box(node.to_html()));
        });
    }

    group.finish();
}

fn shape_full_page_benchmark(c: &mut Criterion) {
    let app = App::builder().secret_key("bench").build().unwrap();
    let page = Request::build(HttpRequestMethod::Get, "/", &[], "").unwrap();
    let fragment =
        Request::build(HttpRequestMethod::Get, "/", &[("HX-Request", "true")], "").unwrap();
    let items = todos(50);
    let contents: Vec<Component> = vec![ul()
        .children_from(items.iter().map(|t| t.render()))
        .into()];

    let mut group = c.benchmark_group("shape_nodes");
    for (name, request) in [("full_page", &page), ("fragment", &fragment)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let reply = Reply::Nodes(titled("Todos", contents.clone()));
                let response = Shaper::new(&app, request)
                    .shape(black_box(reply), None, vec![])
                    .unwrap();
                black_box(response.get_content_length());
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    render_list_benchmark,
    render_nested_benchmark,
    shape_full_page_benchmark
);
criterion_main!(benches);
