// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod security_tests {
    //! # 安全回归测试
    //!
    //! 模拟常见的攻击向量：路径遍历、超大请求、畸形报文、伪造会话。

    use hxweb::{
        html::p,
        server::{serve, ServerHandle},
        App, ParamSpec, Reply, Route,
    };
    use std::{net::SocketAddr, sync::Arc, time::Duration};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// 只提供静态文件和一个需要会话的页面
    async fn spawn_server(root: &std::path::Path) -> (SocketAddr, ServerHandle) {
        let app = App::builder()
            .secret_key("security")
            .static_files(root)
            .route(
                Route::get("/whoami")
                    .param(ParamSpec::untyped("sess"))
                    .handler_fn(|args| {
                        let who = args.session("sess")?.get_str("auth").unwrap_or_default();
                        Ok(Reply::from(p().text(who)))
                    }),
            )
            .build()
            .unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = ServerHandle::new();
        tokio::spawn(serve(Arc::new(app), listener, handle.clone()));
        (addr, handle)
    }

    async fn send_request(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut buffer = Vec::new();
        // 设置硬超时限制，防止测试用例因服务器挂起而永久阻塞
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8_lossy(&buffer).to_string()
    }

    /// 从原始响应字符串中提取 HTTP 状态码
    fn extract_status_code(response: &str) -> u16 {
        response
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0)
    }

    fn site() -> tempfile::TempDir {
        let outer = tempfile::tempdir().unwrap();
        std::fs::write(outer.path().join("secret.txt"), "top secret").unwrap();
        std::fs::create_dir(outer.path().join("www")).unwrap();
        std::fs::write(outer.path().join("www/index.html"), "<p>public</p>").unwrap();
        outer
    }

    #[tokio::test]
    async fn test_path_traversal() {
        let dir = site();
        let (addr, handle) = spawn_server(&dir.path().join("www")).await;

        let ok = send_request(addr, b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert_eq!(extract_status_code(&ok), 200);

        let attacks: [&[u8]; 4] = [
            b"GET /../secret.txt HTTP/1.1\r\nHost: localhost\r\n\r\n",
            b"GET /%2e%2e/secret.txt HTTP/1.1\r\nHost: localhost\r\n\r\n",
            b"GET /..%2fsecret.txt HTTP/1.1\r\nHost: localhost\r\n\r\n",
            b"GET /a/../../secret.txt HTTP/1.1\r\nHost: localhost\r\n\r\n",
        ];
        for attack in attacks {
            let response = send_request(addr, attack).await;
            assert_eq!(extract_status_code(&response), 400);
            assert!(!response.contains("top secret"));
        }
        handle.stop();
    }

    #[tokio::test]
    async fn test_null_byte_injection() {
        let dir = site();
        let (addr, handle) = spawn_server(&dir.path().join("www")).await;
        let response = send_request(
            addr,
            b"GET /index.html%00.txt HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await;
        let code = extract_status_code(&response);
        assert!(code == 400 || code == 404, "unexpected status {}", code);
        handle.stop();
    }

    #[tokio::test]
    async fn test_oversized_headers() {
        let dir = site();
        let (addr, handle) = spawn_server(dir.path()).await;
        let request = format!(
            "GET / HTTP/1.1\r\nHost: localhost\r\nX-Padding: {}\r\n\r\n",
            "a".repeat(70 * 1024)
        );
        let response = send_request(addr, request.as_bytes()).await;
        assert_eq!(extract_status_code(&response), 431);
        handle.stop();
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let dir = site();
        let (addr, handle) = spawn_server(dir.path()).await;
        let response = send_request(
            addr,
            b"POST /whoami HTTP/1.1\r\nHost: localhost\r\nContent-Length: 999999999\r\n\r\n",
        )
        .await;
        assert_eq!(extract_status_code(&response), 413);
        handle.stop();
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let dir = site();
        let (addr, handle) = spawn_server(dir.path()).await;
        let cases: [&[u8]; 4] = [
            b"GARBAGE\r\n\r\n",
            b"BREW /pot HTTP/1.1\r\nHost: localhost\r\n\r\n",
            b"GET / HTTP/9.9\r\nHost: localhost\r\n\r\n",
            b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n",
        ];
        for case in cases {
            let response = send_request(addr, case).await;
            assert_eq!(extract_status_code(&response), 400);
        }
        handle.stop();
    }

    #[tokio::test]
    async fn test_non_utf8_request() {
        let dir = site();
        let (addr, handle) = spawn_server(dir.path()).await;
        let response = send_request(addr, b"GET /\xff\xfe HTTP/1.1\r\n\r\n").await;
        assert_eq!(extract_status_code(&response), 400);
        handle.stop();
    }

    #[tokio::test]
    async fn test_forged_session_ignored() {
        let dir = site();
        let (addr, handle) = spawn_server(dir.path()).await;
        // {"d":{"auth":"admin"},"iat":9999999999} 配上随意的签名
        let request = b"GET /whoami HTTP/1.1\r\nHost: localhost\r\nHX-Request: true\r\n\
Cookie: session_=eyJkIjp7ImF1dGgiOiJhZG1pbiJ9LCJpYXQiOjk5OTk5OTk5OTl9.c2lnbmF0dXJl\r\n\r\n";
        let response = send_request(addr, request).await;
        assert_eq!(extract_status_code(&response), 200);
        assert!(response.ends_with("<p></p>"));
        assert!(!response.contains("admin"));
        handle.stop();
    }

    #[tokio::test]
    async fn test_crlf_injection_in_path() {
        let dir = site();
        let (addr, handle) = spawn_server(dir.path()).await;
        let response = send_request(
            addr,
            b"GET /x%0d%0aSet-Cookie:%20evil=1.txt HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await;
        assert!(!response.contains("\r\nSet-Cookie: evil=1"));
        handle.stop();
    }
}
