//! 数据集 - 数据驱动的迭代输入
//!
//! 数据集是一组行；每次迭代中每一行对应集合的一轮执行。
//! CSV 单元格保留为字符串，JSON 行保留原始类型。

use crate::{Result, RunpostError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

pub type DataRow = Map<String, Value>;

/// 数据行的来源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "content", rename_all = "lowercase")]
pub enum DatasetSource {
    /// 单个空行
    #[default]
    None,
    /// 首行为表头
    Csv(String),
    /// 对象数组
    Json(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    rows: Vec<DataRow>,
}

impl Dataset {
    pub fn parse(source: &DatasetSource) -> Result<Self> {
        match source {
            DatasetSource::None => Ok(Self::default()),
            DatasetSource::Csv(content) => Self::from_csv_str(content),
            DatasetSource::Json(content) => Self::from_json_str(content),
        }
    }

    pub fn from_rows(rows: Vec<DataRow>) -> Self {
        Self { rows }
    }

    pub fn from_csv_str(content: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = reader.headers().map_err(malformed("CSV"))?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(malformed("CSV"))?;
            let row: DataRow = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                .collect();
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content).map_err(malformed("JSON"))?;
        let Value::Array(items) = value else {
            return Err(RunpostError::Dataset(
                "JSON dataset must be an array of objects".to_string(),
            ));
        };

        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(map) => rows.push(map),
                other => {
                    return Err(RunpostError::Dataset(format!(
                        "row {} is not an object: {}",
                        index, other
                    )));
                }
            }
        }
        Ok(Self { rows })
    }

    /// 按扩展名（`.csv` 或 `.json`）选择解析方式
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(&Self::source_from_path(path)?)
    }

    pub fn source_from_path<P: AsRef<Path>>(path: P) -> Result<DatasetSource> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("csv") => Ok(DatasetSource::Csv(content)),
            Some("json") => Ok(DatasetSource::Json(content)),
            _ => Err(RunpostError::Dataset(format!(
                "unsupported dataset file: {}",
                path.display()
            ))),
        }
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 驱动各轮执行的行；空数据集也产生一个空行
    pub fn effective_rows(&self) -> Vec<DataRow> {
        if self.rows.is_empty() {
            vec![DataRow::new()]
        } else {
            self.rows.clone()
        }
    }
}

/// 解析失败统一归为数据集错误，运行在发出请求前被拒绝
fn malformed<E: std::fmt::Display>(format: &'static str) -> impl Fn(E) -> RunpostError {
    move |e| RunpostError::Dataset(format!("malformed {} dataset: {}", format, e))
}
