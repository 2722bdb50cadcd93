// Small maintenance utility for the scheduling database.
//
// Usage:
//   cargo run --bin mes-scheduling-tool -- init-db [db_path]
//   cargo run --bin mes-scheduling-tool -- detect <db_path> <EQUIPMENT|WORKER|WORKSHOP> <resource_id> [from] [to]
//   cargo run --bin mes-scheduling-tool -- import-oee <db_path> <csv_path>
//   cargo run --bin mes-scheduling-tool -- set-config <db_path> <key> <value>
//
// Datetimes use YYYY-MM-DDTHH:MM. Without a window, detect scans today plus 7 days.

use anyhow::{anyhow, bail, Context};
use chrono::{Duration, Local, NaiveDateTime};
use mes_scheduling::app::{get_default_db_path, SchedulingServices};
use mes_scheduling::config::ConfigManager;
use mes_scheduling::domain::schedule::TimeWindow;
use mes_scheduling::domain::types::ResourceType;
use mes_scheduling::i18n::{oee_grade_label, severity_label};
use mes_scheduling::importer::read_oee_inputs;
use mes_scheduling::logging;

fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("");
    let rest = &args[args.len().min(1)..];

    match command {
        "init-db" => init_db(rest),
        "detect" => detect(rest),
        "import-oee" => import_oee(rest),
        "set-config" => set_config(rest),
        _ => bail!("unknown command '{}' (expected init-db | detect | import-oee | set-config)", command),
    }
}

fn open(db_path: &str) -> anyhow::Result<SchedulingServices> {
    SchedulingServices::open(db_path).map_err(|e| anyhow!(e))
}

fn arg<'a>(args: &'a [String], idx: usize, name: &str) -> anyhow::Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument <{}>", name))
}

fn parse_datetime(value: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .with_context(|| format!("invalid datetime '{}'", value))
}

fn init_db(args: &[String]) -> anyhow::Result<()> {
    let db_path = args.first().cloned().unwrap_or_else(get_default_db_path);
    let services = open(&db_path)?;
    println!(
        "initialized {} (approval_threshold={}, max_detection_attempts={})",
        db_path, services.config.approval_affected_threshold, services.config.max_detection_attempts
    );
    Ok(())
}

fn detect(args: &[String]) -> anyhow::Result<()> {
    let db_path = arg(args, 0, "db_path")?;
    let raw_type = arg(args, 1, "resource_type")?;
    let resource_type =
        ResourceType::from_db_str(raw_type).ok_or_else(|| anyhow!("unknown resource type '{}'", raw_type))?;
    let resource_id = arg(args, 2, "resource_id")?;

    let window = match (args.get(3), args.get(4)) {
        (Some(from), Some(to)) => TimeWindow::new(parse_datetime(from)?, parse_datetime(to)?),
        (None, None) => {
            let start = Local::now()
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow!("invalid start of day"))?;
            TimeWindow::new(start, start + Duration::days(7))
        }
        _ => bail!("pass both [from] and [to] or neither"),
    };

    let services = open(db_path)?;
    let report = services
        .detector
        .detect_conflicts(resource_type, resource_id, window)?;

    for conflict in report.unresolved() {
        println!(
            "{} {} <-> {} {} ~ {} total={:.1}% severity={}",
            conflict.conflict_id,
            conflict.schedule_id,
            conflict.conflicting_schedule_id,
            conflict.overlap_start,
            conflict.overlap_end,
            conflict.total_allocation_pct,
            severity_label(conflict.severity)
        );
    }
    println!(
        "created={} updated={} unchanged={} auto_resolved={} attempts={}",
        report.created,
        report.updated,
        report.unchanged,
        report.auto_resolved.len(),
        report.attempts
    );
    Ok(())
}

fn import_oee(args: &[String]) -> anyhow::Result<()> {
    let db_path = arg(args, 0, "db_path")?;
    let csv_path = arg(args, 1, "csv_path")?;

    let inputs = read_oee_inputs(csv_path)?;
    let services = open(db_path)?;
    let report = services.metrics.record_oee_batch(&inputs);

    for record in &report.succeeded {
        if let Some(metrics) = &record.metrics {
            println!(
                "{} {} {} oee={:.2}% ({})",
                record.input.equipment_id,
                record.input.record_date,
                record.input.shift,
                metrics.oee,
                oee_grade_label(metrics.grade)
            );
        }
    }
    for failure in &report.failed {
        eprintln!("FAILED {}: {}", failure.key, failure.message);
    }
    println!("imported={} failed={}", report.succeeded.len(), report.failed.len());
    Ok(())
}

fn set_config(args: &[String]) -> anyhow::Result<()> {
    let db_path = arg(args, 0, "db_path")?;
    let key = arg(args, 1, "key")?;
    let value = arg(args, 2, "value")?;

    // 先打开一次以确保表结构存在
    let services = open(db_path)?;
    let manager = ConfigManager::from_connection(services.repos.connection())?;
    manager.set_global_value(key, value)?;
    println!("{}={}", key, value);
    Ok(())
}
