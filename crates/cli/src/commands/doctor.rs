use serde::Serialize;

use budgetflow_core::config::{AppConfig, LoadOptions};
use budgetflow_db::{connect_with_settings, diagnostics};

use crate::commands::{block_on, escape_json};

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

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DATABASE_CHECKS: &[&str] =
    &["database_connectivity", "approval_ladders", "approver_coverage"];

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
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.extend(database_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for &name in DATABASE_CHECKS {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    // Skipped checks (an unmigrated database, say) do not fail the run;
    // only an observed defect does.
    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: no readiness defects found".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let result = block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let mut checks = vec![DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        )];

        match diagnostics::schema_present(&pool).await {
            Ok(true) => {
                checks.push(ladder_check(&pool).await);
                checks.push(coverage_check(&pool).await);
            }
            Ok(false) => {
                for &name in &DATABASE_CHECKS[1..] {
                    checks.push(DoctorCheck::skipped(
                        name,
                        "schema not migrated; run `budgetflow migrate` first",
                    ));
                }
            }
            Err(error) => {
                for &name in &DATABASE_CHECKS[1..] {
                    checks.push(DoctorCheck::fail(name, error.to_string()));
                }
            }
        }

        pool.close().await;
        Ok::<Vec<DoctorCheck>, String>(checks)
    });

    match result {
        Ok(Ok(checks)) => checks,
        Ok(Err(connect_error)) => {
            let mut checks = vec![DoctorCheck::fail("database_connectivity", connect_error)];
            for &name in &DATABASE_CHECKS[1..] {
                checks.push(DoctorCheck::skipped(name, "database was not reachable"));
            }
            checks
        }
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail(
                "database_connectivity",
                format!("failed to initialize async runtime: {error}"),
            )];
            for &name in &DATABASE_CHECKS[1..] {
                checks.push(DoctorCheck::skipped(name, "async runtime unavailable"));
            }
            checks
        }
    }
}

async fn ladder_check(pool: &budgetflow_db::DbPool) -> DoctorCheck {
    match diagnostics::ladder_defects(pool).await {
        Ok(defects) if defects.is_empty() => DoctorCheck::pass(
            "approval_ladders",
            "every department ladder starts at level 1 with no gaps",
        ),
        Ok(defects) => DoctorCheck::fail("approval_ladders", defects.join("; ")),
        Err(error) => DoctorCheck::fail("approval_ladders", error.to_string()),
    }
}

async fn coverage_check(pool: &budgetflow_db::DbPool) -> DoctorCheck {
    match diagnostics::uncovered_roles(pool).await {
        Ok(missing) if missing.is_empty() => DoctorCheck::pass(
            "approver_coverage",
            "every role the ladders name has at least one account",
        ),
        Ok(missing) => DoctorCheck::fail(
            "approver_coverage",
            format!("no account holds: {}", missing.join(", ")),
        ),
        Err(error) => DoctorCheck::fail("approver_coverage", error.to_string()),
    }
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
