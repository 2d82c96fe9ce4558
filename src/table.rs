//! # 数据表
//!
//! 按主键排序的内存记录表，主键自增。给定文件路径时每次修改后整表写成 JSON，
//! 启动时再读回，足够支撑演示应用。

use log::{debug, info};
use serde::{de::DeserializeOwned, Serialize};

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use crate::exception::Exception;

/// 可存入 [`Table`] 的记录
pub trait Record: Serialize + DeserializeOwned + Clone + Send {
    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);
}

struct TableData<T> {
    rows: BTreeMap<i64, T>,
    next_id: i64,
}

/// 主键 `id` 之后的下一个可分配主键
fn next_after(table: &str, id: i64) -> Result<i64, Exception> {
    id.checked_add(1)
        .ok_or_else(|| Exception::Internal(format!("数据表{}主键溢出：{}", table, id)))
}

pub struct Table<T: Record> {
    name: String,
    data: Mutex<TableData<T>>,
    path: Option<PathBuf>,
}

impl<T: Record> Table<T> {
    /// 纯内存表
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Mutex::new(TableData {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
            path: None,
        }
    }

    /// 以 JSON 文件持久化的表，文件不存在时从空表开始
    pub fn open(name: &str, path: impl AsRef<Path>) -> Result<Self, Exception> {
        let path = path.as_ref().to_path_buf();
        let mut table = Self::new(name);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        if path.exists() {
            let records: Vec<T> = serde_json::from_slice(&fs::read(&path)?)?;
            {
                let mut data = table.lock();
                for r in records {
                    if let Some(id) = r.id() {
                        data.next_id = data.next_id.max(next_after(name, id)?);
                        data.rows.insert(id, r);
                    }
                }
                info!("数据表{}从{}载入{}条记录", name, path.display(), data.rows.len());
            }
        }
        table.path = Some(path);
        Ok(table)
    }

    fn lock(&self) -> MutexGuard<'_, TableData<T>> {
        match self.data.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn save(&self, data: &TableData<T>) -> Result<(), Exception> {
        if let Some(path) = &self.path {
            let records: Vec<&T> = data.rows.values().collect();
            fs::write(path, serde_json::to_vec_pretty(&records)?)?;
            debug!("数据表{}已写入{}", self.name, path.display());
        }
        Ok(())
    }

    fn not_found(&self, id: i64) -> Exception {
        Exception::RecordNotFound(format!("{}#{}", self.name, id))
    }

    /// 插入记录。没有主键时分配新主键，已有主键时覆盖同主键记录。
    pub fn insert(&self, mut record: T) -> Result<T, Exception> {
        let mut data = self.lock();
        let id = match record.id() {
            Some(id) => id,
            None => data.next_id,
        };
        data.next_id = data.next_id.max(next_after(&self.name, id)?);
        record.set_id(id);
        data.rows.insert(id, record.clone());
        self.save(&data)?;
        Ok(record)
    }

    /// 更新已有记录，主键缺失或不存在时返回 `RecordNotFound`
    pub fn update(&self, record: T) -> Result<T, Exception> {
        let mut data = self.lock();
        let id = record
            .id()
            .ok_or_else(|| Exception::RecordNotFound(format!("{}#?", self.name)))?;
        match data.rows.get_mut(&id) {
            Some(slot) => *slot = record.clone(),
            None => return Err(self.not_found(id)),
        }
        self.save(&data)?;
        Ok(record)
    }

    pub fn get(&self, id: i64) -> Result<T, Exception> {
        self.lock()
            .rows
            .get(&id)
            .cloned()
            .ok_or_else(|| self.not_found(id))
    }

    /// 删除记录并返回被删除的记录
    pub fn delete(&self, id: i64) -> Result<T, Exception> {
        let mut data = self.lock();
        let removed = data.rows.remove(&id).ok_or_else(|| self.not_found(id))?;
        self.save(&data)?;
        Ok(removed)
    }

    /// 按主键升序列出全部记录
    pub fn list(&self) -> Vec<T> {
        self.lock().rows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }
}
