// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 待办事项演示服务器
//!
//! 载入日志与配置，按配置的线程数构建 tokio 运行时，组装演示应用后开始监听。
//! 标准输入上提供一个简单的运维控制台（`stop` / `status` / `help`）。

use hxweb::{config::Config, server, todos, ServerHandle};

use log::{error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    runtime::Builder,
};

use std::{process, sync::Arc};

const LOG_CONFIG: &str = "config/log4rs.yaml";
const APP_CONFIG: &str = "config/development.toml";

fn main() {
    if let Err(e) = log4rs::init_file(LOG_CONFIG, Default::default()) {
        eprintln!("无法载入日志配置{}：{}", LOG_CONFIG, e);
    }

    let config = match Config::from_toml(APP_CONFIG) {
        Ok(c) => c,
        Err(_) => {
            warn!("使用默认配置");
            Config::new()
        }
    }
    .apply_env();
    info!("配置文件已载入");

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("无法构建异步运行时：{}", e);
            process::exit(1);
        }
    };
    info!("工作线程数：{}", config.worker_threads());

    let app = match todos::build(&config) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            error!("应用组装失败：{}", e);
            process::exit(1);
        }
    };

    runtime.block_on(async move {
        let address = format!("{}:{}", config.host(), config.port());
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("无法绑定地址：{}，错误：{}", address, e);
                process::exit(1);
            }
        };
        info!("地址{}绑定完成", address);

        let handle = ServerHandle::new();
        tokio::spawn(console(handle.clone()));
        if let Err(e) = server::serve(app, listener, handle).await {
            error!("服务器异常退出：{}", e);
        }
    });
}

/// 运维控制台
async fn console(handle: ServerHandle) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                handle.stop();
                println!("停机指令已激活，服务器不再接受新连接");
                break;
            }
            "status" => {
                println!("== hxweb 状态 ==");
                println!("当前活跃连接数: {}", handle.active_connections());
                println!("================");
            }
            "help" => {
                println!("== hxweb Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("================");
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}
