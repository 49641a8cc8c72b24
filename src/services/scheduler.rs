use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::ReportError;
use crate::services::api::ApiClient;
use crate::services::report::{build_summary, ResourceOutcomes};
use crate::services::telegram;

/// Run the report scheduler: one cycle immediately at startup, then once
/// per calendar day at the configured hour in the configured time zone.
///
/// Cycles are spawned so a slow cycle never stalls the timer loop; the
/// guard mutex makes sure two cycles never overlap — a trigger that finds
/// one still running is skipped, and the next day's trigger is the retry.
pub async fn run_report_scheduler(config: AppConfig, http: Client, api: Arc<ApiClient>) {
    info!(
        hour = config.report_hour,
        timezone = %config.report_timezone,
        auth_mode = config.auth_mode.as_str(),
        "Report scheduler started"
    );

    let cycle_guard = Arc::new(Mutex::new(()));

    let startup_local = Utc::now().with_timezone(&config.report_timezone);
    // The startup run covers today's slot when we start past the report
    // hour, so the daily trigger won't fire a second report minutes later.
    let mut last_daily_run: Option<u32> = if startup_local.hour() >= config.report_hour {
        Some(startup_local.ordinal())
    } else {
        None
    };

    trigger_cycle(&cycle_guard, &http, &api, &config);

    loop {
        sleep(Duration::from_secs(15)).await;

        let now_local = Utc::now().with_timezone(&config.report_timezone);
        let Some(today_ordinal) = daily_run_due(&now_local, config.report_hour, last_daily_run)
        else {
            continue;
        };

        last_daily_run = Some(today_ordinal);
        info!(date = %now_local.date_naive(), "Scheduler: running daily report");
        trigger_cycle(&cycle_guard, &http, &api, &config);
    }
}

/// Returns the day ordinal to latch when the daily report is due, `None`
/// when it already ran today or the report hour has not been reached.
fn daily_run_due(now: &DateTime<Tz>, report_hour: u32, last_daily_run: Option<u32>) -> Option<u32> {
    let today_ordinal = now.ordinal();
    if last_daily_run == Some(today_ordinal) {
        return None;
    }
    if now.hour() < report_hour {
        return None;
    }
    Some(today_ordinal)
}

fn trigger_cycle(guard: &Arc<Mutex<()>>, http: &Client, api: &Arc<ApiClient>, config: &AppConfig) {
    match Arc::clone(guard).try_lock_owned() {
        Ok(permit) => {
            let http = http.clone();
            let api = Arc::clone(api);
            let config = config.clone();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = run_report_cycle(&http, &api, &config).await {
                    error!(error = %e, "Report cycle failed");
                }
            });
        }
        Err(_) => {
            warn!("Previous report cycle still running, skipping this trigger");
        }
    }
}

/// One complete report cycle: fetch the four resources concurrently,
/// aggregate, format, deliver. A failed resource degrades its own section
/// only; a partial report is always preferred over silence.
pub async fn run_report_cycle(
    http: &Client,
    api: &ApiClient,
    config: &AppConfig,
) -> Result<(), ReportError> {
    let today = Utc::now().with_timezone(&config.report_timezone).date_naive();
    let today_str = today.format("%Y-%m-%d").to_string();

    let (apartments, payments, expenses, clients) = tokio::join!(
        api.fetch_apartments(),
        api.fetch_payments(),
        api.fetch_expense_stats(),
        api.fetch_clients(),
    );

    let summary = build_summary(
        ResourceOutcomes {
            apartments,
            payments,
            expenses,
            clients,
        },
        &today_str,
    );

    if !summary.failed_sections.is_empty() {
        warn!(
            sections = ?summary.failed_sections,
            "Sending degraded report, some sections defaulted to zero"
        );
    }

    let text = telegram::format_summary(&summary, today);
    telegram::send_message(
        http,
        &config.telegram_api_base,
        &config.telegram_bot_token,
        &config.telegram_chat_id,
        &text,
    )
    .await?;

    info!(
        apartments = summary.apartments.total(),
        payments_today = summary.payments.count,
        degraded = summary.failed_sections.len(),
        "Daily report delivered"
    );
    Ok(())
}
