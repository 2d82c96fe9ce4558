// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器主循环
//!
//! 每个 TCP 连接交给一个 tokio 任务：读完请求头和 `Content-Length` 指定的请求体，
//! 解析成 [`Request`]，交给 [`App::handle`]，写回响应后关闭连接。

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::Notify,
    time::timeout,
};

use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{
    app::App,
    exception::Exception,
    request::{header_end, Request},
    response::Response,
};

/// 请求头的最大长度
const MAX_HEAD: usize = 64 * 1024;
/// 请求体的最大长度
const MAX_BODY: usize = 16 * 1024 * 1024;
/// 出错关闭前最多丢弃的字节数
const MAX_DRAIN: usize = 1024 * 1024;
const DRAIN_WAIT: Duration = Duration::from_millis(200);

/// 运行中服务器的控制句柄：停机信号与活跃连接计数
#[derive(Clone, Default)]
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl ServerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发出停机信号，主循环不再接受新连接
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn active_connections(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }
}

/// 在 `listener` 上持续接受连接，直到 `handle.stop()` 被调用
pub async fn serve(app: Arc<App>, listener: TcpListener, handle: ServerHandle) -> io::Result<()> {
    info!("开始监听{}", listener.local_addr()?);
    let mut id: u128 = 0;
    loop {
        if handle.is_stopped() {
            info!("主循环接收到停机指令，正在退出...");
            break;
        }
        let accepted = tokio::select! {
            r = listener.accept() => r,
            _ = handle.notify.notified() => continue,
        };
        let (mut stream, addr) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                error!("接受连接失败：{}", e);
                continue;
            }
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let app = Arc::clone(&app);
        let active = Arc::clone(&handle.active);
        tokio::spawn(async move {
            active.fetch_add(1, Ordering::SeqCst);
            handle_connection(&mut stream, id, app).await;
            active.fetch_sub(1, Ordering::SeqCst);
        });
        id += 1;
    }
    Ok(())
}

/// 读取一个完整的请求（请求头加请求体）
async fn read_request(stream: &mut TcpStream, id: u128) -> Result<Option<Vec<u8>>, Exception> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let head_len = loop {
        if let Some(end) = header_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_HEAD {
            warn!("[ID{}]请求头过长", id);
            return Err(Exception::Http(431, "Request Header Fields Too Large".into()));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(Exception::MalformedRequest);
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let content_length = Request::try_from(&buffer[..head_len], id)?.content_length();
    if content_length > MAX_BODY {
        warn!("[ID{}]请求体过大：{} bytes", id, content_length);
        return Err(Exception::Http(413, "Content Too Large".into()));
    }
    let total = head_len + content_length;
    while buffer.len() < total {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Exception::MalformedRequest);
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    buffer.truncate(total);
    Ok(Some(buffer))
}

async fn handle_connection(stream: &mut TcpStream, id: u128, app: Arc<App>) {
    let start_time = Instant::now();
    let mut unread = false;
    let response = match read_request(stream, id).await {
        Ok(None) => return,
        Ok(Some(buffer)) => match Request::try_from(&buffer, id) {
            Ok(request) => app.handle(request).await,
            Err(e) => {
                warn!("[ID{}]解析HTTP请求失败: {}", id, e);
                Response::from_exception(&e)
            }
        },
        Err(e) => {
            warn!("[ID{}]读取HTTP请求失败: {}", id, e);
            unread = true;
            Response::from_exception(&e)
        }
    };
    let response = response.header("Connection", "close");
    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    let bytes = response.as_bytes();
    if let Err(e) = stream.write_all(&bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
    if unread {
        drain(stream, id).await;
    }
}

/// 丢弃请求中尚未读取的剩余数据，避免带着未读数据关闭套接字时发出 RST
async fn drain(stream: &mut TcpStream, id: u128) {
    let mut chunk = [0u8; 4096];
    let mut total = 0usize;
    while total < MAX_DRAIN {
        match timeout(DRAIN_WAIT, stream.read(&mut chunk)).await {
            Ok(Ok(n)) if n > 0 => total += n,
            _ => break,
        }
    }
    debug!("[ID{}]关闭前丢弃了{}字节", id, total);
}
