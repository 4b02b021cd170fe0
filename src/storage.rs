use crate::Result;
use crate::contract::Fingerprint;
use crate::error::RunpostError;
use crate::perf::PerformanceBaseline;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const BASELINE_DIR: &str = ".runpost/baselines";
const CONTRACT_FILE: &str = "contracts.json";
const PERFORMANCE_FILE: &str = "performance.json";

/// 契约基线：某个请求的响应结构指纹
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractBaseline {
    pub fingerprint: Fingerprint,
    pub updated_at: DateTime<Utc>,
}

impl ContractBaseline {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            updated_at: Utc::now(),
        }
    }
}

/// 基线持久化端口
///
/// 运行开始时读取一次快照，运行结束时最多提交一次。
/// 两次运行并发提交同一请求时，后提交者覆盖先提交者。
pub trait BaselineStore: Send + Sync {
    fn get_contract_baseline(&self, request_id: &str) -> Result<Option<ContractBaseline>>;
    fn set_contract_baseline(&self, request_id: &str, baseline: &ContractBaseline) -> Result<()>;
    fn get_performance_baseline(&self, request_id: &str) -> Result<Option<PerformanceBaseline>>;
    fn set_performance_baseline(
        &self,
        request_id: &str,
        baseline: &PerformanceBaseline,
    ) -> Result<()>;
}

/// 内存基线存储（测试与单次会话使用）
#[derive(Debug, Default)]
pub struct MemoryBaselineStore {
    contracts: Mutex<HashMap<String, ContractBaseline>>,
    performance: Mutex<HashMap<String, PerformanceBaseline>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> RunpostError {
    RunpostError::Storage("baseline store lock poisoned".to_string())
}

impl BaselineStore for MemoryBaselineStore {
    fn get_contract_baseline(&self, request_id: &str) -> Result<Option<ContractBaseline>> {
        Ok(self.contracts.lock().map_err(poisoned)?.get(request_id).cloned())
    }

    fn set_contract_baseline(&self, request_id: &str, baseline: &ContractBaseline) -> Result<()> {
        self.contracts
            .lock()
            .map_err(poisoned)?
            .insert(request_id.to_string(), baseline.clone());
        Ok(())
    }

    fn get_performance_baseline(&self, request_id: &str) -> Result<Option<PerformanceBaseline>> {
        Ok(self
            .performance
            .lock()
            .map_err(poisoned)?
            .get(request_id)
            .cloned())
    }

    fn set_performance_baseline(
        &self,
        request_id: &str,
        baseline: &PerformanceBaseline,
    ) -> Result<()> {
        self.performance
            .lock()
            .map_err(poisoned)?
            .insert(request_id.to_string(), baseline.clone());
        Ok(())
    }
}

/// 文件基线存储
///
/// 每类基线一个 JSON 文件（requestId -> 基线）。读取持共享锁，
/// 写入持排他锁并在同一文件句柄上完成读-改-写，跨进程安全。
pub struct FileBaselineStore {
    dir: PathBuf,
}

impl Default for FileBaselineStore {
    fn default() -> Self {
        let dir =
            std::env::var("RUNPOST_BASELINE_DIR").unwrap_or_else(|_| BASELINE_DIR.to_string());
        Self {
            dir: PathBuf::from(dir),
        }
    }
}

impl FileBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(RunpostError::IoError)?;
        }
        Ok(())
    }

    fn read_map<T: DeserializeOwned>(&self, file_name: &str) -> Result<BTreeMap<String, T>> {
        let path = self.dir.join(file_name);
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let mut file = fs::File::open(&path).map_err(RunpostError::IoError)?;
        file.lock_shared().map_err(RunpostError::IoError)?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(RunpostError::IoError)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            RunpostError::Storage(format!("corrupt baseline file {}: {}", path.display(), e))
        })
    }

    fn update_map<T>(&self, file_name: &str, request_id: &str, value: &T) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.ensure_dir()?;
        let path = self.dir.join(file_name);

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(RunpostError::IoError)?;
        file.lock_exclusive().map_err(RunpostError::IoError)?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(RunpostError::IoError)?;
        let mut map: BTreeMap<String, serde_json::Value> = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&content)?
        };
        map.insert(request_id.to_string(), serde_json::to_value(value)?);

        file.set_len(0).map_err(RunpostError::IoError)?;
        file.seek(SeekFrom::Start(0))
            .map_err(RunpostError::IoError)?;
        let json = serde_json::to_string_pretty(&map)?;
        file.write_all(json.as_bytes())
            .map_err(RunpostError::IoError)?;
        file.flush().map_err(RunpostError::IoError)?;
        Ok(())
    }
}

impl BaselineStore for FileBaselineStore {
    fn get_contract_baseline(&self, request_id: &str) -> Result<Option<ContractBaseline>> {
        Ok(self
            .read_map::<ContractBaseline>(CONTRACT_FILE)?
            .remove(request_id))
    }

    fn set_contract_baseline(&self, request_id: &str, baseline: &ContractBaseline) -> Result<()> {
        self.update_map(CONTRACT_FILE, request_id, baseline)
    }

    fn get_performance_baseline(&self, request_id: &str) -> Result<Option<PerformanceBaseline>> {
        Ok(self
            .read_map::<PerformanceBaseline>(PERFORMANCE_FILE)?
            .remove(request_id))
    }

    fn set_performance_baseline(
        &self,
        request_id: &str,
        baseline: &PerformanceBaseline,
    ) -> Result<()> {
        self.update_map(PERFORMANCE_FILE, request_id, baseline)
    }
}
