// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持中文（默认）和英文
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// ==========================================

use crate::domain::metrics::{EfficiencyGrade, OeeGrade};
use crate::domain::types::ConflictSeverity;

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"zh-CN" 或 "en"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use mes_scheduling::i18n::t;
/// let msg = t("common.success");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use mes_scheduling::i18n::t_with_args;
/// let msg = t_with_args("import.file_not_found", &[("path", "/tmp/oee.csv")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    let mut result = rust_i18n::t!(key).to_string();
    for (k, v) in args {
        let placeholder = format!("%{{{}}}", k);
        result = result.replace(&placeholder, v);
    }
    result
}

// ==========================================
// 分级 / 严重度显示名
// ==========================================

pub fn oee_grade_label(grade: OeeGrade) -> String {
    t(&format!("grade.oee.{}", grade.code()))
}

pub fn efficiency_grade_label(grade: EfficiencyGrade) -> String {
    t(&format!("grade.efficiency.{}", grade.code()))
}

pub fn severity_label(severity: ConflictSeverity) -> String {
    t(&format!(
        "conflict.severity.{}",
        severity.to_db_str().to_lowercase()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // rust-i18n 的 locale 为全局状态，测试并行执行时需串行化
    static LOCALE_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_set_locale() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("en");
        assert_eq!(current_locale(), "en");

        set_locale("zh-CN");
        assert_eq!(current_locale(), "zh-CN");
    }

    #[test]
    fn test_translate_simple() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("zh-CN");
        assert_eq!(t("common.success"), "操作成功");

        set_locale("en");
        assert_eq!(t("common.success"), "Operation successful");

        set_locale("zh-CN");
    }

    #[test]
    fn test_translate_with_args() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("zh-CN");
        let msg = t_with_args("import.file_not_found", &[("path", "/tmp/oee.csv")]);
        assert_eq!(msg, "文件不存在: /tmp/oee.csv");

        set_locale("en");
        let msg = t_with_args("import.rows_imported", &[("count", "12")]);
        assert_eq!(msg, "12 rows imported");

        set_locale("zh-CN");
    }

    #[test]
    fn test_grade_labels() {
        let _guard = LOCALE_TEST_LOCK.lock().unwrap();
        set_locale("zh-CN");
        assert_eq!(oee_grade_label(OeeGrade::WorldClass), "世界级");
        assert_eq!(efficiency_grade_label(EfficiencyGrade::Low), "偏低");
        assert_eq!(severity_label(ConflictSeverity::Medium), "中");

        set_locale("en");
        assert_eq!(oee_grade_label(OeeGrade::NeedsImprovement), "Needs improvement");
        assert_eq!(efficiency_grade_label(EfficiencyGrade::Excellent), "Excellent");

        set_locale("zh-CN");
    }
}
