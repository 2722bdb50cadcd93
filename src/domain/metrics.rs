// ==========================================
// 生产排程核心 - 绩效指标领域模型
// ==========================================
// 用途: 设备 OEE / 人员效率记录
// 红线: 每 (资源, 日期, 班次) 一行;确认后不可修改
// 对齐: equipment_oee_record / worker_efficiency_record 表
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// OeeGrade - OEE 分级
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OeeGrade {
    WorldClass,       // oee ≥ 85
    Good,             // 60 ≤ oee < 85
    NeedsImprovement, // oee < 60
}

impl OeeGrade {
    pub fn classify(oee: f64) -> Self {
        if oee >= 85.0 {
            OeeGrade::WorldClass
        } else if oee >= 60.0 {
            OeeGrade::Good
        } else {
            OeeGrade::NeedsImprovement
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            OeeGrade::WorldClass => "world-class",
            OeeGrade::Good => "good",
            OeeGrade::NeedsImprovement => "needs-improvement",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim() {
            "world-class" => Some(OeeGrade::WorldClass),
            "good" => Some(OeeGrade::Good),
            "needs-improvement" => Some(OeeGrade::NeedsImprovement),
            _ => None,
        }
    }
}

impl fmt::Display for OeeGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==========================================
// EfficiencyGrade - 人效分级
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EfficiencyGrade {
    Excellent, // ≥ 120
    Good,      // 100 ~ 120
    Normal,    // 80 ~ 100
    Low,       // < 80
}

impl EfficiencyGrade {
    pub fn classify(efficiency: f64) -> Self {
        if efficiency >= 120.0 {
            EfficiencyGrade::Excellent
        } else if efficiency >= 100.0 {
            EfficiencyGrade::Good
        } else if efficiency >= 80.0 {
            EfficiencyGrade::Normal
        } else {
            EfficiencyGrade::Low
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            EfficiencyGrade::Excellent => "excellent",
            EfficiencyGrade::Good => "good",
            EfficiencyGrade::Normal => "normal",
            EfficiencyGrade::Low => "low",
        }
    }

    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim() {
            "excellent" => Some(EfficiencyGrade::Excellent),
            "good" => Some(EfficiencyGrade::Good),
            "normal" => Some(EfficiencyGrade::Normal),
            "low" => Some(EfficiencyGrade::Low),
            _ => None,
        }
    }
}

impl fmt::Display for EfficiencyGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==========================================
// OEE 输入与结果
// ==========================================
// 时间单位统一为分钟, ideal_cycle_time 为 分钟/件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OeeInput {
    pub equipment_id: String,
    pub record_date: NaiveDate,
    pub shift: String,
    pub planned_production_time: f64,
    pub planned_downtime: f64,
    pub unplanned_downtime: f64,
    pub ideal_cycle_time: f64,
    pub actual_output: i64,
    pub qualified_qty: i64,
    pub defect_qty: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OeeMetrics {
    pub operating_time: f64,
    pub availability: f64, // %
    pub performance: f64,  // %
    pub quality: f64,      // %
    pub oee: f64,          // %
    pub grade: OeeGrade,
}

// ==========================================
// EquipmentOeeRecord - 设备 OEE 记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentOeeRecord {
    pub record_id: String,
    pub input: OeeInput,
    pub metrics: Option<OeeMetrics>, // 计算失败时为 None
    pub is_auto_calculated: bool,
    pub calculation_note: Option<String>,
    pub is_confirmed: bool,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// 人效输入与结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyInput {
    pub worker_id: String,
    pub record_date: NaiveDate,
    pub shift: String,
    pub standard_hours: f64,
    pub actual_hours: f64,
    pub overtime_hours: f64,
    pub idle_hours: f64,
    pub completed_qty: i64,
    pub qualified_qty: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub efficiency: f64,         // % 可超过 100
    pub quality_rate: f64,       // %
    pub utilization_rate: f64,   // %
    pub overall_efficiency: f64, // %
    pub grade: EfficiencyGrade,
}

// ==========================================
// WorkerEfficiencyRecord - 人员效率记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerEfficiencyRecord {
    pub record_id: String,
    pub input: EfficiencyInput,
    pub metrics: Option<EfficiencyMetrics>,
    pub is_auto_calculated: bool,
    pub calculation_note: Option<String>,
    pub is_confirmed: bool,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// OeeSummary - 区间 OEE 汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OeeSummary {
    pub equipment_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub record_count: usize,
    pub avg_availability: f64,
    pub avg_performance: f64,
    pub avg_quality: f64,
    pub avg_oee: f64,
    pub grade: Option<OeeGrade>, // 无计算记录时为 None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oee_grade_boundaries() {
        assert_eq!(OeeGrade::classify(85.0), OeeGrade::WorldClass);
        assert_eq!(OeeGrade::classify(84.99), OeeGrade::Good);
        assert_eq!(OeeGrade::classify(60.0), OeeGrade::Good);
        assert_eq!(OeeGrade::classify(59.99), OeeGrade::NeedsImprovement);
    }

    #[test]
    fn test_efficiency_grade_boundaries() {
        assert_eq!(EfficiencyGrade::classify(120.0), EfficiencyGrade::Excellent);
        assert_eq!(EfficiencyGrade::classify(100.0), EfficiencyGrade::Good);
        assert_eq!(EfficiencyGrade::classify(99.9), EfficiencyGrade::Normal);
        assert_eq!(EfficiencyGrade::classify(80.0), EfficiencyGrade::Normal);
        assert_eq!(EfficiencyGrade::classify(79.9), EfficiencyGrade::Low);
    }

    #[test]
    fn test_grade_codes_roundtrip() {
        assert_eq!(OeeGrade::from_code("good"), Some(OeeGrade::Good));
        assert_eq!(OeeGrade::WorldClass.to_string(), "world-class");
        assert_eq!(EfficiencyGrade::from_code("low"), Some(EfficiencyGrade::Low));
    }
}
