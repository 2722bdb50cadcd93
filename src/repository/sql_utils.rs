// ==========================================
// 生产排程核心 - SQL 工具模块
// ==========================================
// 职责: 时间列编解码、IN 子句与按条件查询的 SQL 拼装
// 约束: 只拼占位符,值一律走参数绑定
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, Type};

// 固定 9 位纳秒,保证按文本比较即按时间比较
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";
// 读取时兼容无小数部分的旧数据
const TS_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn fmt_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn fmt_opt_ts(ts: &Option<NaiveDateTime>) -> Option<String> {
    ts.as_ref().map(fmt_ts)
}

pub fn fmt_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// 解析时间列,失败时转换为 rusqlite 的列类型错误
pub fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TS_PARSE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDateTime>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

pub fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 枚举列解析失败 (未知取值)
pub fn invalid_enum(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("未知枚举值: {}", raw).into(),
    )
}

/// 构建 IN 子句的 SQL 片段,空列表返回永假条件
pub fn build_in_clause<T>(column_name: &str, values: &[T]) -> String {
    if values.is_empty() {
        return "1 = 0".to_string();
    }
    let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    format!("{} IN ({})", column_name, placeholders)
}

/// 以逗号分隔存储的字符串列表
pub fn join_list(values: &[String]) -> String {
    values.join(",")
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

// ==========================================
// PredicateSql - 动态 WHERE 拼装
// ==========================================
#[derive(Default)]
pub struct PredicateSql {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql>>,
}

impl PredicateSql {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个条件及其参数 (占位符数量须与参数一致)
    pub fn push(&mut self, clause: impl Into<String>, params: Vec<Box<dyn ToSql>>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    pub fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}
