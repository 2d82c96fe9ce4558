pub mod app;
pub mod binding;
pub mod cache;
pub mod coerce;
pub mod config;
pub mod exception;
pub mod hooks;
pub mod html;
pub mod param;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod session;
pub mod shaper;
pub mod table;
pub mod toast;
pub mod todos;
pub mod util;

pub use app::{App, AppBuilder};
pub use binding::{Args, FormRecord, ParamKind, ParamSpec};
pub use cache::FileCache;
pub use coerce::ParamType;
pub use config::Config;
pub use exception::Exception;
pub use hooks::{basic_auth, AfterHook, Beforeware};
pub use html::{Component, HttpHeader, Node, Renderable};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use router::{Route, Router};
pub use server::{serve, ServerHandle};
pub use session::Session;
pub use shaper::{Reply, ResponseClass};
pub use table::{Record, Table};
