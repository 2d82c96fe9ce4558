// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 配置模块
//!
//! 从 TOML 文件读取运行参数，缺省字段由 `#[serde(default = ...)]` 补齐，
//! 之后再用环境变量 `HOST` / `PORT` 覆盖监听地址。

use log::{error, info, warn};
use serde_derive::{Deserialize, Serialize};

use std::{env, fs};

use crate::{
    exception::Exception,
    param::{DEFAULT_TITLE, SESSION_COOKIE, SESSION_MAX_AGE},
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_cache_size")]
    cache_size: usize,
    #[serde(default = "default_static_path")]
    static_path: String,
    #[serde(default)]
    db_file: Option<String>,
    #[serde(default = "default_title")]
    title: String,
    #[serde(default = "default_true")]
    default_hdrs: bool,
    #[serde(default = "default_toast_duration")]
    toast_duration: u64,
    #[serde(default)]
    session: SessionConfig,
}

/// 会话 Cookie 相关配置
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionConfig {
    /// 签名密钥；为空时从 `key_fname` 读取或生成
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_key_fname")]
    pub key_fname: String,
    #[serde(default = "default_session_cookie")]
    pub cookie: String,
    #[serde(default = "default_max_age")]
    pub max_age: i64,
    #[serde(default = "default_sess_path")]
    pub path: String,
    #[serde(default = "default_same_site")]
    pub same_site: String,
    #[serde(default)]
    pub https_only: bool,
    #[serde(default)]
    pub domain: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_cache_size() -> usize {
    16
}

fn default_static_path() -> String {
    ".".to_string()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_toast_duration() -> u64 {
    5000 // 毫秒
}

fn default_key_fname() -> String {
    ".sesskey".to_string()
}

fn default_session_cookie() -> String {
    SESSION_COOKIE.to_string()
}

fn default_max_age() -> i64 {
    SESSION_MAX_AGE
}

fn default_sess_path() -> String {
    "/".to_string()
}

fn default_same_site() -> String {
    "lax".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            key_fname: default_key_fname(),
            cookie: default_session_cookie(),
            max_age: default_max_age(),
            path: default_sess_path(),
            same_site: default_same_site(),
            https_only: false,
            domain: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            worker_threads: num_cpus::get(),
            cache_size: default_cache_size(),
            static_path: default_static_path(),
            db_file: None,
            title: default_title(),
            default_hdrs: true,
            toast_duration: default_toast_duration(),
            session: SessionConfig::default(),
        }
    }

    /// 从 TOML 文件构建配置。
    ///
    /// 文件无法读取时返回错误；内容无法解析时记录日志并退回默认配置。
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let str_val = match fs::read_to_string(filename) {
            Ok(s) => s,
            Err(e) => {
                error!("无法读取配置文件{}：{}", filename, e);
                return Err(Exception::Internal(format!("{}: {}", filename, e)));
            }
        };
        Ok(Self::from_toml_str(&str_val))
    }

    pub fn from_toml_str(s: &str) -> Self {
        let mut raw_config: Config = match toml::from_str(s) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.cache_size == 0 {
            warn!("cache_size被设置为0，但目前尚不支持禁用缓存，因此该值将被改为16。");
            raw_config.cache_size = default_cache_size();
        }
        raw_config
    }

    /// 用环境变量 `HOST` 和 `PORT` 覆盖监听地址。
    pub fn apply_env(mut self) -> Self {
        if let Ok(host) = env::var("HOST") {
            info!("使用环境变量HOST={}", host);
            self.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            match port.parse() {
                Ok(p) => {
                    info!("使用环境变量PORT={}", p);
                    self.port = p;
                }
                Err(_) => warn!("环境变量PORT={}不是合法端口，忽略", port),
            }
        }
        self
    }
}

impl Config {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn static_path(&self) -> &str {
        &self.static_path
    }

    pub fn db_file(&self) -> Option<&str> {
        self.db_file.as_deref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn default_hdrs(&self) -> bool {
        self.default_hdrs
    }

    pub fn toast_duration(&self) -> u64 {
        self.toast_duration
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }
}
