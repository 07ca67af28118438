use innkeep_core::config::{AppConfig, LlmProvider, LoadOptions};
use innkeep_db::repositories::{PropertyRepository, SqlPropertyRepository};
use innkeep_db::{connect_with_config, DbPool};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let checks = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => vec![
            DoctorCheck::pass("config_validation", "configuration loaded and validated"),
            check_llm(&config),
            check_delivery(&config),
            check_database(&config),
        ],
        Err(error) => vec![
            DoctorCheck::fail("config_validation", error.to_string()),
            DoctorCheck::skipped("llm_readiness"),
            DoctorCheck::skipped("delivery_readiness"),
            DoctorCheck::skipped("database_readiness"),
        ],
    };

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm(config: &AppConfig) -> DoctorCheck {
    match config.llm.provider {
        LlmProvider::Disabled => DoctorCheck::pass(
            "llm_readiness",
            "generation disabled; property questions outside the listing get a canned reply",
        ),
        provider => DoctorCheck::pass(
            "llm_readiness",
            format!(
                "{} model `{}` at `{}` with a {}s timeout",
                provider.as_str(),
                config.llm.model,
                config.llm.base_url.as_deref().map(super::config::redact_url).unwrap_or_else(
                    || "provider default endpoint".to_string()
                ),
                config.llm.timeout_secs
            ),
        ),
    }
}

fn check_delivery(config: &AppConfig) -> DoctorCheck {
    match config.delivery.webhook_url.as_deref() {
        Some(url) => DoctorCheck::pass(
            "delivery_readiness",
            format!(
                "webhook delivery to `{}` ({} attempt(s), signed: {})",
                super::config::redact_url(url),
                config.delivery.max_attempts,
                config.delivery.signing_secret.is_some()
            ),
        ),
        None => DoctorCheck::pass(
            "delivery_readiness",
            "no webhook configured; outbound messages are only logged",
        ),
    }
}

fn check_database(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "database_readiness",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        let listings = listing_count(&pool).await;
        pool.close().await;
        Ok::<Option<usize>, String>(listings)
    });

    match result {
        Ok(Some(count)) => DoctorCheck::pass(
            "database_readiness",
            format!("connected using `{}`; {count} listing(s) stored", config.database.url),
        ),
        Ok(None) => DoctorCheck::fail(
            "database_readiness",
            format!(
                "connected using `{}` but listings could not be read; run `innkeep migrate`",
                config.database.url
            ),
        ),
        Err(error) => DoctorCheck::fail("database_readiness", error),
    }
}

/// `None` when listings cannot be read, typically because the schema was never migrated.
async fn listing_count(pool: &DbPool) -> Option<usize> {
    SqlPropertyRepository::new(pool.clone()).list().await.ok().map(|listings| listings.len())
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
