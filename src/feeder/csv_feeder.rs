use crate::{Result, RuloadError};
use csv::ReaderBuilder;
use rand::seq::SliceRandom;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// CSV 数据源配置
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub path: PathBuf,
    pub delimiter: u8,
    pub quoted: bool,
    /// 行用完后是否从头循环
    pub cycle: bool,
    /// 显式列名；提供时文件没有表头行
    pub variable_names: Option<Vec<String>>,
    pub random_order: bool,
}

impl DataSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            quoted: true,
            cycle: true,
            variable_names: None,
            random_order: false,
        }
    }

    pub fn with_cycle(mut self, cycle: bool) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_variable_names(mut self, names: Vec<String>) -> Self {
        self.variable_names = Some(names);
        self
    }
}

/// 数据源中的一行：列名 → 值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRow {
    values: Vec<(String, String)>,
}

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入绑定，同名列后写覆盖先写
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.values.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 合并另一行，另一行的同名列优先
    pub fn merge(&mut self, other: DataRow) {
        for (key, value) in other.values {
            self.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// CSV 数据供给器
///
/// 文件在打开时一次性读入内存。行游标是唯一的共享可变状态，使用
/// `AtomicUsize::fetch_add` 分配序号，因此并发调用 `next` 不会拿到同一个
/// 序号；只有循环回绕时同一行才会再次出现。
#[derive(Debug)]
pub struct DataFeeder {
    name: String,
    columns: Vec<String>,
    rows: Vec<DataRow>,
    cursor: AtomicUsize,
    cycle: bool,
}

impl DataFeeder {
    /// 打开数据源文件
    pub fn open(source: &DataSource) -> Result<Self> {
        let file = File::open(&source.path).map_err(|e| {
            RuloadError::Config(format!(
                "Failed to open data source {}: {}",
                source.path.display(),
                e
            ))
        })?;
        let feeder = Self::from_reader(file, source)?;

        info!(
            "Loaded {} rows from data source {}",
            feeder.len(),
            source.path.display()
        );
        Ok(feeder)
    }

    /// 从任意读取器加载（测试与内存数据使用）
    pub fn from_reader<R: Read>(reader: R, source: &DataSource) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(source.variable_names.is_none())
            .delimiter(source.delimiter)
            .quoting(source.quoted)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let columns: Vec<String> = match &source.variable_names {
            Some(names) => names.clone(),
            None => reader.headers()?.iter().map(|h| h.to_string()).collect(),
        };

        if columns.is_empty() {
            return Err(RuloadError::Config(format!(
                "Data source {} defines no columns",
                source.path.display()
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row = DataRow::new();
            for (index, column) in columns.iter().enumerate() {
                // 短行缺失的列绑定为空字符串
                row.insert(column.clone(), record.get(index).unwrap_or_default());
            }
            rows.push(row);
        }

        if source.random_order {
            rows.shuffle(&mut rand::rng());
        }

        Ok(Self {
            name: source.path.display().to_string(),
            columns,
            rows,
            cursor: AtomicUsize::new(0),
            cycle: source.cycle,
        })
    }

    /// 取下一行
    ///
    /// 按文件顺序分配；开启循环时回绕到第一行，否则返回 `DataExhausted`。
    pub fn next(&self) -> Result<DataRow> {
        if self.rows.is_empty() {
            return Err(RuloadError::DataExhausted(format!(
                "{} has no data rows",
                self.name
            )));
        }

        let sequence = self.cursor.fetch_add(1, Ordering::Relaxed);
        let index = if self.cycle {
            sequence % self.rows.len()
        } else if sequence < self.rows.len() {
            sequence
        } else {
            return Err(RuloadError::DataExhausted(format!(
                "{} ran out of rows after {} deliveries",
                self.name,
                self.rows.len()
            )));
        };

        Ok(self.rows[index].clone())
    }

    /// 下一次 `next` 是否必然返回 `DataExhausted`
    pub fn is_exhausted(&self) -> bool {
        self.rows.is_empty()
            || (!self.cycle && self.cursor.load(Ordering::Relaxed) >= self.rows.len())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
