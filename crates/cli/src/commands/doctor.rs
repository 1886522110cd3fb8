use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;

use tradedesk_db::connect_with_settings;

use super::{load_config, runtime, CommandResult};

#[derive(Debug, Serialize)]
struct DoctorReport {
    command: String,
    status: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: String,
    status: String,
    detail: String,
    elapsed_ms: u128,
}

fn check(name: &str, started: Instant, result: Result<String, String>) -> DoctorCheck {
    match result {
        Ok(detail) => DoctorCheck {
            name: name.to_owned(),
            status: "ok".to_owned(),
            detail,
            elapsed_ms: started.elapsed().as_millis(),
        },
        Err(detail) => DoctorCheck {
            name: name.to_owned(),
            status: "failed".to_owned(),
            detail,
            elapsed_ms: started.elapsed().as_millis(),
        },
    }
}

pub fn run(config_path: Option<PathBuf>, json: bool) -> CommandResult {
    let mut checks = Vec::new();

    let config_started = Instant::now();
    let config = load_config(config_path);
    checks.push(check(
        "config",
        config_started,
        config
            .as_ref()
            .map(|config| format!("database `{}`", config.database.url))
            .map_err(|error| error.to_string()),
    ));

    if let Ok(config) = &config {
        let db_started = Instant::now();
        let db_result = match runtime() {
            Ok(runtime) => runtime.block_on(async {
                let pool = connect_with_settings(
                    &config.database.url,
                    config.database.max_connections,
                    config.database.timeout_secs,
                )
                .await
                .map_err(|error| error.to_string())?;
                let applied = sqlx_applied_migrations(&pool).await;
                pool.close().await;
                Ok::<String, String>(applied)
            }),
            Err(error) => Err(format!("failed to initialize async runtime: {error}")),
        };
        checks.push(check("database", db_started, db_result));
    }

    let failed = checks.iter().any(|check| check.status != "ok");
    let report = DoctorReport {
        command: "doctor".to_owned(),
        status: if failed { "error" } else { "ok" }.to_owned(),
        checks,
    };

    let output = if json {
        serde_json::to_string_pretty(&report).unwrap_or_default()
    } else {
        let mut lines = vec![format!("doctor: {}", report.status)];
        for check in &report.checks {
            lines.push(format!(
                "  {:<10} {:<6} {} ({} ms)",
                check.name, check.status, check.detail, check.elapsed_ms
            ));
        }
        lines.join("\n")
    };

    CommandResult { exit_code: u8::from(failed), output }
}

async fn sqlx_applied_migrations(pool: &tradedesk_db::DbPool) -> String {
    match tradedesk_db::migrations::applied_count(pool).await {
        Some(count) => format!("connected, {count} migrations applied"),
        None => "connected, migrations not yet applied".to_owned(),
    }
}
