use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Local;
use regex::Regex;

use crate::error::{CoreError, Result};
use crate::model::entry::FailureCause;
use crate::model::report::{Analysis, ErrorExplanation, FailureDetail, RunReport};
use crate::services::pipeline::RunSummary;

struct Localized {
    code: u16,
    title: &'static str,
    reason: &'static str,
    solution: &'static str,
    advice: &'static str,
}

const HTTP_ERRORS: &[Localized] = &[
    Localized { code: 400, title: "请求参数不合法", reason: "请求格式或参数不符合接口要求", solution: "检查模型是否支持该参数，减少请求体大小，确保JSON结构有效", advice: "移除缩进、分批发送、验证JSON" },
    Localized { code: 401, title: "认证失败", reason: "API密钥无效、过期或未授权", solution: "更新或重新配置API密钥，确认Key与服务匹配", advice: "在设置中重新输入并保存API Key" },
    Localized { code: 403, title: "权限不足", reason: "账户或密钥缺少执行该操作的权限", solution: "为密钥开通相应权限或更换具备权限的密钥", advice: "检查控制台的Key权限范围" },
    Localized { code: 404, title: "资源不存在", reason: "模型ID或接口地址无效", solution: "确认模型ID是否正确，检查Base URL设置", advice: "使用服务提供商的兼容API地址" },
    Localized { code: 408, title: "请求超时", reason: "服务响应过慢或网络不稳定", solution: "延长超时时间，降低并发，重试请求", advice: "调整超时为300秒以上并分批" },
    Localized { code: 409, title: "请求冲突", reason: "短时间内重复或相互冲突的请求", solution: "错峰发送请求，避免重复提交", advice: "序列化批次或使用去重策略" },
    Localized { code: 413, title: "请求体过大", reason: "发送的内容超过提供商限制", solution: "减少单批节点数量，移除缩进与冗余字段", advice: "批次大小设为3-6，移除indent" },
    Localized { code: 429, title: "请求过于频繁", reason: "触发速率限制或配额用尽", solution: "采用退避重试，降低并发或切换备用模型", advice: "指数退避2-4-8-...秒；并发≤4" },
    Localized { code: 500, title: "服务内部错误", reason: "提供商服务异常", solution: "稍后重试或切换到健康的备用模型", advice: "记录时间窗口并避开高峰期" },
    Localized { code: 502, title: "网关错误", reason: "上游服务不可用或路由故障", solution: "重试或更换提供商路由", advice: "切换至稳定路由" },
    Localized { code: 503, title: "服务不可用", reason: "服务暂时停运或拥堵", solution: "延长重试间隔或切换备用模型", advice: "间隔≥10秒，并发≤2" },
    Localized { code: 504, title: "网关超时", reason: "上游响应超时", solution: "增加超时和间隔，减少负载", advice: "超时≥300秒，批次≤4" },
];

struct RateLimitRule {
    service: &'static str,
    concurrency: usize,
    min_interval_sec: u64,
    notes: &'static str,
}

const RATE_LIMIT_RULES: &[RateLimitRule] = &[
    RateLimitRule { service: "openrouter:google", concurrency: 3, min_interval_sec: 2, notes: "免费路由易限流，建议绑定上游密钥或使用备用模型" },
    RateLimitRule { service: "openrouter:general", concurrency: 4, min_interval_sec: 2, notes: "保持批次适中并采用退避重试" },
    RateLimitRule { service: "siliconflow", concurrency: 5, min_interval_sec: 1, notes: "建议使用Qwen或DeepSeek系列以获得稳定JSON输出" },
    RateLimitRule { service: "zhipu", concurrency: 6, min_interval_sec: 1, notes: "优先选择glm-4-flash进行结构化翻译" },
    RateLimitRule { service: "aliyun", concurrency: 5, min_interval_sec: 1, notes: "qwen-plus较适合批量JSON" },
    RateLimitRule { service: "moonshot", concurrency: 3, min_interval_sec: 2, notes: "建议降低批次，避免长文本一次性发送" },
    RateLimitRule { service: "deepseek", concurrency: 5, min_interval_sec: 1, notes: "返回可能包含思考过程，注意解析" },
    RateLimitRule { service: "openai", concurrency: 4, min_interval_sec: 2, notes: "遵循官方速率限制文档" },
    RateLimitRule { service: "ollama", concurrency: 2, min_interval_sec: 0, notes: "本地模型受硬件限制，建议序列化批次" },
    RateLimitRule { service: "lmstudio", concurrency: 2, min_interval_sec: 0, notes: "本地模型受硬件限制，建议序列化批次" },
];

fn http_status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"HTTP (\d{3})").unwrap())
}

pub fn http_status(message: &str) -> Option<u16> {
    http_status_re()
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn explain(code: u16) -> ErrorExplanation {
    match HTTP_ERRORS.iter().find(|e| e.code == code) {
        Some(e) => ErrorExplanation {
            code,
            title: e.title.into(),
            reason: e.reason.into(),
            solution: e.solution.into(),
            advice: e.advice.into(),
        },
        None => ErrorExplanation {
            code,
            title: "未知错误".into(),
            reason: "未识别的错误类型".into(),
            solution: "查看原始信息并联系提供商或更换模型".into(),
            advice: String::new(),
        },
    }
}

fn rule_key(service: &str, model: &str) -> String {
    if service != "openrouter" {
        return service.to_string();
    }
    let m = model.to_lowercase();
    if m.contains("google") || m.contains("gemma") || m.contains("gemini") {
        "openrouter:google".into()
    } else {
        "openrouter:general".into()
    }
}

fn recommendations(service: &str, model: &str, analysis: &Analysis, failed: usize) -> Vec<String> {
    let mut out = Vec::new();
    if failed == 0 {
        return out;
    }
    let key = rule_key(service, model);
    if let Some(rule) = RATE_LIMIT_RULES.iter().find(|r| r.service == key) {
        out.push(format!(
            "推荐并发: {}，最小间隔: {}秒（{}）",
            rule.concurrency, rule.min_interval_sec, rule.notes
        ));
    }
    if analysis.by_http_status.contains_key("429")
        || analysis.by_cause.contains_key(FailureCause::RateLimit.as_str())
    {
        out.push("该路由当前拥堵，通常在5-10分钟内恢复，请稍后重试或切换备用模型".into());
    }
    if analysis.by_cause.contains_key(FailureCause::Authentication.as_str()) {
        out.push("请在设置中重新输入并保存API Key".into());
    }
    out
}

pub fn build_report(summary: &RunSummary, service: &str, model: &str) -> RunReport {
    let mut analysis = Analysis {
        strategy: summary.stats.clone(),
        ..Default::default()
    };
    let mut by_cause: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();

    let failures: Vec<FailureDetail> = summary
        .failures
        .iter()
        .map(|(key, failure)| {
            *by_cause.entry(failure.cause.as_str().to_string()).or_default() += 1;
            let status = http_status(&failure.message);
            if let Some(code) = status {
                *by_status.entry(code.to_string()).or_default() += 1;
            }
            FailureDetail {
                key: key.clone(),
                cause: failure.cause,
                message: failure.message.clone(),
                http_status: status,
                explanation: status.map(explain),
            }
        })
        .collect();
    analysis.by_cause = by_cause;
    analysis.by_http_status = by_status;

    let (successful_plugins, failed_plugins) = summary
        .plugins
        .iter()
        .fold((Vec::new(), Vec::new()), |(mut ok, mut bad), p| {
            if p.complete {
                ok.push(p.plugin.clone());
            } else {
                bad.push(p.plugin.clone());
            }
            (ok, bad)
        });

    RunReport {
        timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        service: service.to_string(),
        model: model.to_string(),
        outcome: summary.outcome,
        counts: summary.counts.clone(),
        successful_plugins,
        failed_plugins,
        recommendations: recommendations(service, model, &analysis, summary.counts.failed),
        failures,
        analysis,
    }
}

/// Writes `report_<stamp>.json`, adding `_N` instead of overwriting.
pub fn write_report(report: &RunReport, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).map_err(|e| CoreError::io(output_dir, e))?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let body = serde_json::to_string_pretty(report).map_err(|e| CoreError::json(output_dir, e))?;

    let mut n = 0u32;
    loop {
        let name = if n == 0 {
            format!("report_{stamp}.json")
        } else {
            format!("report_{stamp}_{n}.json")
        };
        let path = output_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(body.as_bytes())
                    .map_err(|e| CoreError::io(&path, e))?;
                tracing::info!(path = %path.display(), "report written");
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(CoreError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entry::{EntryKey, Failure, FieldKey};
    use crate::model::report::{RunCounts, RunOutcome};
    use crate::services::ai_types::StrategyStats;
    use crate::services::pipeline::PluginResult;

    fn summary() -> RunSummary {
        RunSummary {
            outcome: RunOutcome::PartialFailure,
            counts: RunCounts {
                attempted: 3,
                succeeded: 2,
                failed: 1,
                skipped: 0,
            },
            stats: StrategyStats::default(),
            failures: vec![(
                EntryKey::new("b", FieldKey::title("N")),
                Failure::new(FailureCause::RateLimit, "HTTP 429: too many requests"),
            )],
            plugins: vec![
                PluginResult { plugin: "a".into(), complete: true },
                PluginResult { plugin: "b".into(), complete: false },
            ],
        }
    }

    #[test]
    fn failures_are_explained_and_counted() {
        let report = build_report(&summary(), "openrouter", "google/gemma-2-9b-it:free");
        assert_eq!(report.successful_plugins, vec!["a"]);
        assert_eq!(report.failed_plugins, vec!["b"]);
        assert_eq!(report.failures[0].http_status, Some(429));
        assert_eq!(
            report.failures[0].explanation.as_ref().unwrap().title,
            "请求过于频繁"
        );
        assert_eq!(report.analysis.by_http_status.get("429"), Some(&1));
        assert_eq!(report.analysis.by_cause.get("rate_limit"), Some(&1));
        assert!(report.recommendations[0].starts_with("推荐并发: 3"));
    }

    #[test]
    fn unknown_codes_get_generic_explanation() {
        assert_eq!(explain(418).title, "未知错误");
        assert_eq!(http_status("connection failed: refused"), None);
    }

    #[test]
    fn reports_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let report = build_report(&summary(), "deepseek", "deepseek-chat");
        let a = write_report(&report, dir.path()).unwrap();
        let b = write_report(&report, dir.path()).unwrap();
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("report_") && name.ends_with(".json"));
    }
}
