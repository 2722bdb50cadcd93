// ==========================================
// 生产排程核心 - 绩效指标引擎
// ==========================================
// 职责: 设备 OEE / 人员效率计算、入库、确认、区间汇总
// 红线: 分母为零返回 Computation 错误,不产生 NaN/Inf
// 红线: 已确认记录不可覆盖
// ==========================================
// OEE:
//   operating_time = planned_production_time - planned_downtime - unplanned_downtime
//   availability   = operating_time / planned_production_time * 100
//   performance    = ideal_cycle_time * actual_output / operating_time * 100
//   quality        = qualified_qty / actual_output * 100
//   oee            = availability * performance * quality / 10000
// 人效:
//   efficiency         = standard_hours / actual_hours * 100
//   quality_rate       = qualified_qty / completed_qty * 100
//   utilization_rate   = (actual_hours - idle_hours) / actual_hours * 100
//   overall_efficiency = efficiency * quality_rate * utilization_rate / 10000
// ==========================================

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::domain::metrics::{
    EfficiencyGrade, EfficiencyInput, EfficiencyMetrics, EquipmentOeeRecord, OeeGrade, OeeInput,
    OeeMetrics, OeeSummary, WorkerEfficiencyRecord,
};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::repositories::SchedulingRepositories;
use crate::repository::RecordWrite;

/// 性能上限比较容差
const PERFORMANCE_EPSILON: f64 = 1e-9;

// ==========================================
// 纯计算
// ==========================================

/// 计算 OEE 指标
///
/// # 错误
/// - `Validation`: 负值、停机超过计划时间、合格/不良数超过产出、
///   理论节拍 × 产出超过运行时间
/// - `Computation`: planned_production_time / operating_time / actual_output 为零
pub fn compute_oee(input: &OeeInput) -> SchedulingResult<OeeMetrics> {
    require_text("equipment_id", &input.equipment_id)?;
    require_text("shift", &input.shift)?;
    require_non_negative("planned_production_time", input.planned_production_time)?;
    require_non_negative("planned_downtime", input.planned_downtime)?;
    require_non_negative("unplanned_downtime", input.unplanned_downtime)?;
    require_non_negative("ideal_cycle_time", input.ideal_cycle_time)?;
    require_non_negative_qty("actual_output", input.actual_output)?;
    require_non_negative_qty("qualified_qty", input.qualified_qty)?;
    require_non_negative_qty("defect_qty", input.defect_qty)?;

    if input.planned_downtime + input.unplanned_downtime > input.planned_production_time {
        return Err(SchedulingError::validation(
            "unplanned_downtime",
            format!(
                "停机时间合计 {} 超过计划生产时间 {}",
                input.planned_downtime + input.unplanned_downtime,
                input.planned_production_time
            ),
        ));
    }
    if input.qualified_qty > input.actual_output {
        return Err(SchedulingError::validation(
            "qualified_qty",
            format!("合格数 {} 超过实际产出 {}", input.qualified_qty, input.actual_output),
        ));
    }
    if input.defect_qty > input.actual_output {
        return Err(SchedulingError::validation(
            "defect_qty",
            format!("不良数 {} 超过实际产出 {}", input.defect_qty, input.actual_output),
        ));
    }

    if input.planned_production_time == 0.0 {
        return Err(SchedulingError::computation(
            "planned_production_time",
            "计划生产时间为 0,无法计算可用率",
        ));
    }
    let operating_time =
        input.planned_production_time - input.planned_downtime - input.unplanned_downtime;
    if operating_time <= 0.0 {
        return Err(SchedulingError::computation(
            "operating_time",
            "运行时间为 0,无法计算性能率",
        ));
    }
    if input.actual_output == 0 {
        return Err(SchedulingError::computation(
            "actual_output",
            "实际产出为 0,无法计算质量率",
        ));
    }

    let ideal_time = input.ideal_cycle_time * input.actual_output as f64;
    if ideal_time > operating_time + PERFORMANCE_EPSILON {
        return Err(SchedulingError::validation(
            "ideal_cycle_time",
            format!(
                "理论加工时间 {} 超过运行时间 {}",
                ideal_time, operating_time
            ),
        ));
    }

    let availability = operating_time / input.planned_production_time * 100.0;
    let performance = (ideal_time / operating_time * 100.0).min(100.0);
    let quality = input.qualified_qty as f64 / input.actual_output as f64 * 100.0;
    let oee = availability * performance * quality / 10000.0;

    Ok(OeeMetrics {
        operating_time,
        availability,
        performance,
        quality,
        oee,
        grade: OeeGrade::classify(oee),
    })
}

/// 计算人员效率指标
///
/// 效率可超过 100%,按 efficiency 分级
pub fn compute_efficiency(input: &EfficiencyInput) -> SchedulingResult<EfficiencyMetrics> {
    require_text("worker_id", &input.worker_id)?;
    require_text("shift", &input.shift)?;
    require_non_negative("standard_hours", input.standard_hours)?;
    require_non_negative("actual_hours", input.actual_hours)?;
    require_non_negative("overtime_hours", input.overtime_hours)?;
    require_non_negative("idle_hours", input.idle_hours)?;
    require_non_negative_qty("completed_qty", input.completed_qty)?;
    require_non_negative_qty("qualified_qty", input.qualified_qty)?;

    if input.idle_hours > input.actual_hours {
        return Err(SchedulingError::validation(
            "idle_hours",
            format!("空闲工时 {} 超过实际工时 {}", input.idle_hours, input.actual_hours),
        ));
    }
    if input.qualified_qty > input.completed_qty {
        return Err(SchedulingError::validation(
            "qualified_qty",
            format!("合格数 {} 超过完成数 {}", input.qualified_qty, input.completed_qty),
        ));
    }

    if input.actual_hours == 0.0 {
        return Err(SchedulingError::computation(
            "actual_hours",
            "实际工时为 0,无法计算效率",
        ));
    }
    if input.completed_qty == 0 {
        return Err(SchedulingError::computation(
            "completed_qty",
            "完成数为 0,无法计算质量率",
        ));
    }

    let efficiency = input.standard_hours / input.actual_hours * 100.0;
    let quality_rate = input.qualified_qty as f64 / input.completed_qty as f64 * 100.0;
    let utilization_rate = (input.actual_hours - input.idle_hours) / input.actual_hours * 100.0;
    let overall_efficiency = efficiency * quality_rate * utilization_rate / 10000.0;

    Ok(EfficiencyMetrics {
        efficiency,
        quality_rate,
        utilization_rate,
        overall_efficiency,
        grade: EfficiencyGrade::classify(efficiency),
    })
}

fn require_text(field: &str, value: &str) -> SchedulingResult<()> {
    if value.trim().is_empty() {
        return Err(SchedulingError::validation(field, "不能为空"));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: f64) -> SchedulingResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(SchedulingError::validation(
            field,
            format!("必须为非负有限数: {}", value),
        ));
    }
    Ok(())
}

fn require_non_negative_qty(field: &str, value: i64) -> SchedulingResult<()> {
    if value < 0 {
        return Err(SchedulingError::validation(field, format!("数量不能为负: {}", value)));
    }
    Ok(())
}

// ==========================================
// BatchReport - 批量入库结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    /// 资源/日期/班次
    pub key: String,
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchFailure>,
}

impl<T> BatchReport<T> {
    fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    fn push(&mut self, key: String, result: SchedulingResult<T>) {
        match result {
            Ok(record) => self.succeeded.push(record),
            Err(e) => self.failed.push(BatchFailure {
                key,
                field: e.field().map(str::to_string),
                message: e.to_string(),
            }),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// ==========================================
// MetricsEngine - 绩效指标引擎
// ==========================================
pub struct MetricsEngine {
    repos: SchedulingRepositories,
}

impl MetricsEngine {
    pub fn new(repos: SchedulingRepositories) -> Self {
        Self { repos }
    }

    // ===== OEE =====

    /// 计算并按 (设备, 日期, 班次) 入库
    ///
    /// 分母为零时仍写入原始数据 (指标为空, is_auto_calculated = false),再返回错误
    #[instrument(skip(self, input), fields(
        equipment_id = %input.equipment_id,
        record_date = %input.record_date,
        shift = %input.shift
    ))]
    pub fn record_oee(&self, input: &OeeInput) -> SchedulingResult<EquipmentOeeRecord> {
        let at = Utc::now().naive_utc();
        match compute_oee(input) {
            Ok(metrics) => {
                let record = self.repos.oee_repo.upsert(&RecordWrite {
                    input,
                    metrics: Some(&metrics),
                    calculation_note: None,
                    at,
                })?;
                info!(oee = metrics.oee, grade = %metrics.grade, "OEE 已入库");
                Ok(record)
            }
            Err(err) if err.is_computation() => {
                let note = err.to_string();
                self.repos.oee_repo.upsert(&RecordWrite::<OeeInput, OeeMetrics> {
                    input,
                    metrics: None,
                    calculation_note: Some(&note),
                    at,
                })?;
                warn!(error = %err, "OEE 无法计算，已保存原始数据");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub fn oee_record(
        &self,
        equipment_id: &str,
        record_date: NaiveDate,
        shift: &str,
    ) -> SchedulingResult<Option<EquipmentOeeRecord>> {
        Ok(self
            .repos
            .oee_repo
            .find_by_key(equipment_id, &record_date, shift)?)
    }

    /// 确认已计算的 OEE 记录,确认后不可修改
    #[instrument(skip(self))]
    pub fn confirm_oee(
        &self,
        equipment_id: &str,
        record_date: NaiveDate,
        shift: &str,
        confirmed_by: &str,
    ) -> SchedulingResult<EquipmentOeeRecord> {
        require_text("confirmed_by", confirmed_by)?;
        let key = format!("{}/{}/{}", equipment_id, record_date, shift);
        let record = self
            .oee_record(equipment_id, record_date, shift)?
            .ok_or_else(|| SchedulingError::not_found("EquipmentOeeRecord", &key))?;
        if record.metrics.is_none() {
            return Err(SchedulingError::validation(
                "record_key",
                format!("记录 {} 尚未计算成功,不能确认", key),
            ));
        }
        self.repos.oee_repo.confirm(
            equipment_id,
            &record_date,
            shift,
            confirmed_by,
            Utc::now().naive_utc(),
        )?;
        self.oee_record(equipment_id, record_date, shift)?
            .ok_or_else(|| SchedulingError::not_found("EquipmentOeeRecord", &key))
    }

    /// 批量入库,每条记录独立成败
    pub fn record_oee_batch(&self, inputs: &[OeeInput]) -> BatchReport<EquipmentOeeRecord> {
        let mut report = BatchReport::new();
        for input in inputs {
            let key = format!("{}/{}/{}", input.equipment_id, input.record_date, input.shift);
            report.push(key, self.record_oee(input));
        }
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "OEE 批量入库完成"
        );
        report
    }

    /// 区间 OEE 汇总 (闭区间,仅统计计算成功的记录)
    #[instrument(skip(self))]
    pub fn summarize_oee(
        &self,
        equipment_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SchedulingResult<OeeSummary> {
        require_text("equipment_id", equipment_id)?;
        if from > to {
            return Err(SchedulingError::validation(
                "from",
                format!("起始日期 {} 晚于结束日期 {}", from, to),
            ));
        }

        let records = self.repos.oee_repo.find_range(equipment_id, &from, &to)?;
        let calculated: Vec<OeeMetrics> = records.iter().filter_map(|r| r.metrics).collect();
        let n = calculated.len();
        let mean = |f: fn(&OeeMetrics) -> f64| -> f64 {
            if n == 0 {
                0.0
            } else {
                calculated.iter().map(f).sum::<f64>() / n as f64
            }
        };
        let avg_oee = mean(|m| m.oee);

        Ok(OeeSummary {
            equipment_id: equipment_id.to_string(),
            from,
            to,
            record_count: n,
            avg_availability: mean(|m| m.availability),
            avg_performance: mean(|m| m.performance),
            avg_quality: mean(|m| m.quality),
            avg_oee,
            grade: (n > 0).then(|| OeeGrade::classify(avg_oee)),
        })
    }

    // ===== 人效 =====

    #[instrument(skip(self, input), fields(
        worker_id = %input.worker_id,
        record_date = %input.record_date,
        shift = %input.shift
    ))]
    pub fn record_efficiency(&self, input: &EfficiencyInput) -> SchedulingResult<WorkerEfficiencyRecord> {
        let at = Utc::now().naive_utc();
        match compute_efficiency(input) {
            Ok(metrics) => {
                let record = self.repos.efficiency_repo.upsert(&RecordWrite {
                    input,
                    metrics: Some(&metrics),
                    calculation_note: None,
                    at,
                })?;
                info!(
                    efficiency = metrics.efficiency,
                    overall_efficiency = metrics.overall_efficiency,
                    grade = %metrics.grade,
                    "人效已入库"
                );
                Ok(record)
            }
            Err(err) if err.is_computation() => {
                let note = err.to_string();
                self.repos
                    .efficiency_repo
                    .upsert(&RecordWrite::<EfficiencyInput, EfficiencyMetrics> {
                        input,
                        metrics: None,
                        calculation_note: Some(&note),
                        at,
                    })?;
                warn!(error = %err, "人效无法计算，已保存原始数据");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub fn efficiency_record(
        &self,
        worker_id: &str,
        record_date: NaiveDate,
        shift: &str,
    ) -> SchedulingResult<Option<WorkerEfficiencyRecord>> {
        Ok(self
            .repos
            .efficiency_repo
            .find_by_key(worker_id, &record_date, shift)?)
    }

    #[instrument(skip(self))]
    pub fn confirm_efficiency(
        &self,
        worker_id: &str,
        record_date: NaiveDate,
        shift: &str,
        confirmed_by: &str,
    ) -> SchedulingResult<WorkerEfficiencyRecord> {
        require_text("confirmed_by", confirmed_by)?;
        let key = format!("{}/{}/{}", worker_id, record_date, shift);
        let record = self
            .efficiency_record(worker_id, record_date, shift)?
            .ok_or_else(|| SchedulingError::not_found("WorkerEfficiencyRecord", &key))?;
        if record.metrics.is_none() {
            return Err(SchedulingError::validation(
                "record_key",
                format!("记录 {} 尚未计算成功,不能确认", key),
            ));
        }
        self.repos.efficiency_repo.confirm(
            worker_id,
            &record_date,
            shift,
            confirmed_by,
            Utc::now().naive_utc(),
        )?;
        self.efficiency_record(worker_id, record_date, shift)?
            .ok_or_else(|| SchedulingError::not_found("WorkerEfficiencyRecord", &key))
    }

    pub fn record_efficiency_batch(
        &self,
        inputs: &[EfficiencyInput],
    ) -> BatchReport<WorkerEfficiencyRecord> {
        let mut report = BatchReport::new();
        for input in inputs {
            let key = format!("{}/{}/{}", input.worker_id, input.record_date, input.shift);
            report.push(key, self.record_efficiency(input));
        }
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "人效批量入库完成"
        );
        report
    }
}
