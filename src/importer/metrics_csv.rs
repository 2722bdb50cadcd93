// ==========================================
// 生产排程核心 - 指标输入 CSV 读取
// ==========================================
// 输入: 表头映射的 CSV (列名不区分顺序,值自动去空白)
// 输出: OeeInput / EfficiencyInput
// 行号按文件行计 (表头为第 1 行)
// ==========================================

use crate::domain::metrics::{EfficiencyInput, OeeInput};
use crate::importer::error::{ImportError, ImportResult};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// 一行原始记录: (文件行号, 列名 -> 值)
type RawRow = (usize, HashMap<String, String>);

const OEE_COLUMNS: &[&str] = &[
    "equipment_id",
    "record_date",
    "shift",
    "planned_production_time",
    "planned_downtime",
    "unplanned_downtime",
    "ideal_cycle_time",
    "actual_output",
    "qualified_qty",
    "defect_qty",
];

const EFFICIENCY_COLUMNS: &[&str] = &[
    "worker_id",
    "record_date",
    "shift",
    "standard_hours",
    "actual_hours",
    "overtime_hours",
    "idle_hours",
    "completed_qty",
    "qualified_qty",
];

// ==========================================
// MetricsCsvReader
// ==========================================
pub struct MetricsCsvReader {
    path: PathBuf,
}

impl MetricsCsvReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 读取 OEE 输入行
    pub fn read_oee(&self) -> ImportResult<Vec<OeeInput>> {
        let rows = self.read_raw(OEE_COLUMNS)?;
        let inputs = rows
            .iter()
            .map(|(line, row)| {
                let cells = Cells { line: *line, row };
                Ok(OeeInput {
                    equipment_id: cells.text("equipment_id")?,
                    record_date: cells.date("record_date")?,
                    shift: cells.text("shift")?,
                    planned_production_time: cells.number("planned_production_time")?,
                    planned_downtime: cells.number("planned_downtime")?,
                    unplanned_downtime: cells.number("unplanned_downtime")?,
                    ideal_cycle_time: cells.number("ideal_cycle_time")?,
                    actual_output: cells.number("actual_output")?,
                    qualified_qty: cells.number("qualified_qty")?,
                    defect_qty: cells.number("defect_qty")?,
                })
            })
            .collect::<ImportResult<Vec<_>>>()?;
        info!(path = %self.path.display(), rows = inputs.len(), "OEE 输入读取完成");
        Ok(inputs)
    }

    /// 读取人效输入行
    pub fn read_efficiency(&self) -> ImportResult<Vec<EfficiencyInput>> {
        let rows = self.read_raw(EFFICIENCY_COLUMNS)?;
        let inputs = rows
            .iter()
            .map(|(line, row)| {
                let cells = Cells { line: *line, row };
                Ok(EfficiencyInput {
                    worker_id: cells.text("worker_id")?,
                    record_date: cells.date("record_date")?,
                    shift: cells.text("shift")?,
                    standard_hours: cells.number("standard_hours")?,
                    actual_hours: cells.number("actual_hours")?,
                    overtime_hours: cells.number("overtime_hours")?,
                    idle_hours: cells.number("idle_hours")?,
                    completed_qty: cells.number("completed_qty")?,
                    qualified_qty: cells.number("qualified_qty")?,
                })
            })
            .collect::<ImportResult<Vec<_>>>()?;
        info!(path = %self.path.display(), rows = inputs.len(), "人效输入读取完成");
        Ok(inputs)
    }

    fn read_raw(&self, required: &[&str]) -> ImportResult<Vec<RawRow>> {
        let path = self.path.as_path();
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if let Some(missing) = required.iter().find(|c| !headers.iter().any(|h| h == *c)) {
            return Err(ImportError::MissingColumn(missing.to_string()));
        }

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or(idx + 2);
            let row: HashMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), v.trim().to_string()))
                .collect();

            // 跳过完全空白的行
            if row.values().all(|v| v.is_empty()) {
                continue;
            }
            rows.push((line, row));
        }
        debug!(path = %path.display(), rows = rows.len(), "CSV 原始行读取完成");
        Ok(rows)
    }
}

/// 读取 OEE 输入 CSV
pub fn read_oee_inputs<P: AsRef<Path>>(path: P) -> ImportResult<Vec<OeeInput>> {
    MetricsCsvReader::new(path).read_oee()
}

/// 读取人效输入 CSV
pub fn read_efficiency_inputs<P: AsRef<Path>>(path: P) -> ImportResult<Vec<EfficiencyInput>> {
    MetricsCsvReader::new(path).read_efficiency()
}

// ==========================================
// 单元格解析
// ==========================================

struct Cells<'a> {
    line: usize,
    row: &'a HashMap<String, String>,
}

impl Cells<'_> {
    fn raw(&self, field: &str) -> ImportResult<&str> {
        match self.row.get(field).map(String::as_str) {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(self.error(field, "值为空")),
        }
    }

    fn text(&self, field: &str) -> ImportResult<String> {
        self.raw(field).map(str::to_string)
    }

    fn number<T: FromStr>(&self, field: &str) -> ImportResult<T>
    where
        T::Err: std::fmt::Display,
    {
        let value = self.raw(field)?;
        value
            .parse::<T>()
            .map_err(|e| self.error(field, format!("无法解析 '{}': {}", value, e)))
    }

    /// 支持 YYYY-MM-DD 与 YYYYMMDD
    fn date(&self, field: &str) -> ImportResult<NaiveDate> {
        let value = self.raw(field)?;
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
            .map_err(|_| self.error(field, format!("日期格式错误: {}", value)))
    }

    fn error(&self, field: &str, message: impl Into<String>) -> ImportError {
        ImportError::FieldParse {
            row: self.line,
            field: field.to_string(),
            message: message.into(),
        }
    }
}
