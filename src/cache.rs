//! 静态文件缓存：LRU 淘汰，以文件修改时间判定缓存是否仍然有效。

use std::fs;
use std::io;
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::SystemTime;

use bytes::Bytes;
use log::debug;
use lru::LruCache;

#[derive(Clone)]
struct CacheEntry {
    content: Bytes,
    modified_time: SystemTime,
}

pub struct FileCache {
    cache: LruCache<String, CacheEntry>,
    threshold: u64,
}

impl FileCache {
    // 容量为0时按1处理
    pub fn from_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(cap),
            threshold: 1024 * 1024,
        }
    }

    // 超过该大小的文件不进入缓存
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn push(&mut self, filename: &str, bytes: Bytes, modified_time: SystemTime) {
        let entry = CacheEntry {
            content: bytes,
            modified_time,
        };
        self.cache.put(filename.to_string(), entry);
    }

    pub fn find(&mut self, filename: &str, current_modified_time: SystemTime) -> Option<&Bytes> {
        match self.cache.get(filename) {
            Some(entry) if entry.modified_time == current_modified_time => Some(&entry.content),
            _ => None,
        }
    }

    /// 读取文件内容，命中且未修改时直接返回缓存。
    ///
    /// 文件不存在时返回 `io::ErrorKind::NotFound`，由调用方转换为 404。
    pub fn read(&mut self, path: &Path) -> io::Result<Bytes> {
        let key = path.to_string_lossy().to_string();
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, key));
        }
        let modified = metadata.modified()?;
        if let Some(bytes) = self.find(&key, modified) {
            debug!("缓存命中：{}", key);
            return Ok(bytes.clone());
        }
        let bytes = Bytes::from(fs::read(path)?);
        if metadata.len() <= self.threshold {
            self.push(&key, bytes.clone(), modified);
        } else {
            debug!("文件过大({} bytes)，跳过缓存：{}", metadata.len(), key);
        }
        Ok(bytes)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cache.len()
    }
}
