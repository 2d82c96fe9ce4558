//! # 会话
//!
//! 会话是一张挂在签名 Cookie 上的 JSON 映射表。请求进入管线时从 Cookie 解码，
//! 钩子和处理器通过共享句柄 [`Session`] 读写，响应发出前再编码写回。
//!
//! Cookie 格式：`base64url(json) . base64url(HMAC-SHA256(base64url(json)))`，
//! 其中 json 为 `{"d": <会话数据>, "iat": <签发时间戳>}`，超过 `max_age`
//! 的 Cookie 视为无效。

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use serde_json::{json, Map, Value};
use sha2::Sha256;

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{config::SessionConfig, exception::Exception};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Default)]
struct SessionData {
    map: Map<String, Value>,
    loaded_non_empty: bool,
}

/// 请求内共享的会话句柄，克隆后指向同一份数据
#[derive(Debug, Clone, Default)]
pub struct Session(Arc<Mutex<SessionData>>);

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        let loaded_non_empty = !map.is_empty();
        Self(Arc::new(Mutex::new(SessionData {
            map,
            loaded_non_empty,
        })))
    }

    fn lock(&self) -> MutexGuard<'_, SessionData> {
        match self.0.lock() {
            Ok(lock) => lock,
            Err(poisoned) => {
                warn!("会话锁被污染，恢复并继续");
                poisoned.into_inner()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().map.get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().map.contains_key(key)
    }

    pub fn insert(&self, key: &str, value: impl Into<Value>) {
        self.lock().map.insert(key.to_string(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().map.remove(key)
    }

    /// 在 `key` 对应的数组末尾追加一项，不存在时先创建数组
    pub fn push(&self, key: &str, value: Value) {
        let mut data = self.lock();
        let slot = data
            .map
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![value]),
        }
    }

    pub fn clear(&self) {
        self.lock().map.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().map.is_empty()
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.lock().map.clone()
    }

    fn loaded_non_empty(&self) -> bool {
        self.lock().loaded_non_empty
    }
}

/// 会话 Cookie 的签名与编解码
#[derive(Debug, Clone)]
pub struct SessionCodec {
    secret: Vec<u8>,
    settings: SessionConfig,
}

impl SessionCodec {
    pub fn new(secret: &str, settings: SessionConfig) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            settings,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.settings.cookie
    }

    fn sign(&self, data: &str) -> Result<HmacSha256, Exception> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Exception::Internal(e.to_string()))?;
        mac.update(data.as_bytes());
        Ok(mac)
    }

    pub fn encode(&self, map: &Map<String, Value>) -> Result<String, Exception> {
        let payload = json!({ "d": map, "iat": Utc::now().timestamp() });
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&body)?.finalize().into_bytes());
        Ok(format!("{}.{}", body, signature))
    }

    /// 校验签名与有效期，任一失败都返回 `None`（当作空会话处理）
    pub fn decode(&self, cookie: &str) -> Option<Map<String, Value>> {
        let (body, signature) = cookie.rsplit_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        if self.sign(body).ok()?.verify_slice(&signature).is_err() {
            warn!("会话Cookie签名校验失败，丢弃");
            return None;
        }
        let payload: Value = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(body).ok()?).ok()?;
        let iat = payload.get("iat")?.as_i64()?;
        if Utc::now().timestamp() - iat > self.settings.max_age {
            debug!("会话Cookie已过期");
            return None;
        }
        match payload.get("d")? {
            Value::Object(map) => Some(map.clone()),
            _ => None,
        }
    }

    pub fn load(&self, cookie: Option<&str>) -> Session {
        match cookie.and_then(|c| self.decode(c)) {
            Some(map) => Session::from_map(map),
            None => Session::new(),
        }
    }

    /// 根据会话的最终状态生成 `Set-Cookie` 头的值。
    ///
    /// 非空会话总是重新签发；原本非空、现在被清空的会话发出过期 Cookie；
    /// 其余情况不需要写 Cookie。
    pub fn set_cookie(&self, session: &Session) -> Result<Option<String>, Exception> {
        if !session.is_empty() {
            let value = self.encode(&session.to_map())?;
            let max_age = format!("Max-Age={}; ", self.settings.max_age);
            return Ok(Some(self.cookie_line(&value, &max_age)));
        }
        if session.loaded_non_empty() {
            return Ok(Some(self.cookie_line(
                "null",
                "expires=Thu, 01 Jan 1970 00:00:00 GMT; ",
            )));
        }
        Ok(None)
    }

    fn cookie_line(&self, value: &str, lifetime: &str) -> String {
        let mut line = format!(
            "{}={}; path={}; {}httponly; samesite={}",
            self.settings.cookie, value, self.settings.path, lifetime, self.settings.same_site
        );
        if self.settings.https_only {
            line.push_str("; secure");
        }
        if let Some(domain) = &self.settings.domain {
            line.push_str(&format!("; domain={}", domain));
        }
        line
    }
}

/// 取得会话签名密钥：显式给出的优先，其次读取密钥文件，都没有时生成并写入文件
pub fn get_key(key: Option<&str>, fname: &str) -> Result<String, Exception> {
    if let Some(k) = key {
        return Ok(k.to_string());
    }
    let path = Path::new(fname);
    if path.exists() {
        return Ok(fs::read_to_string(path)?.trim().to_string());
    }
    let key = uuid::Uuid::new_v4().to_string();
    fs::write(path, &key)?;
    info!("已生成新的会话密钥并写入{}", fname);
    Ok(key)
}
