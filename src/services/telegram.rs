use chrono::NaiveDate;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::ReportError;
use crate::schemas::DailySummary;

/// Escape the characters Telegram's HTML parse mode treats as markup.
/// Every dynamic value goes through this before interpolation so an odd
/// upstream string can never corrupt the rendered message.
pub fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render the daily summary as one Telegram-HTML block.
pub fn format_summary(summary: &DailySummary, date: NaiveDate) -> String {
    let mut text = format!(
        "<b>Daily report — {}</b>\n\n",
        escape_html(&date.format("%Y-%m-%d").to_string())
    );

    text.push_str("<b>Apartments</b>\n");
    text.push_str(&format!(
        "Vacant: <code>{}</code>\nReserved: <code>{}</code>\nSold: <code>{}</code>\nInstallment: <code>{}</code>\nTotal: <code>{}</code>\n\n",
        summary.apartments.empty,
        summary.apartments.reserved,
        summary.apartments.sold,
        summary.apartments.installment,
        summary.apartments.total(),
    ));

    text.push_str("<b>Payments today</b>\n");
    text.push_str(&format!(
        "Count: <code>{}</code>\nSum: <code>{} UZS</code>\n\n",
        summary.payments.count,
        format_amount(summary.payments.sum),
    ));

    text.push_str("<b>Expenses</b>\n");
    text.push_str(&format!(
        "Total: <code>{} UZS</code>\nPaid: <code>{} UZS</code>\nPending: <code>{} UZS</code>\n\n",
        format_amount(summary.expenses.total_amount),
        format_amount(summary.expenses.paid_amount),
        format_amount(summary.expenses.pending_amount),
    ));

    text.push_str(&format!(
        "<b>Client debt</b>\nOutstanding: <code>{} UZS</code>\n",
        format_amount(summary.total_debt),
    ));

    if !summary.failed_sections.is_empty() {
        let failed = summary
            .failed_sections
            .iter()
            .map(|s| escape_html(s))
            .collect::<Vec<_>>()
            .join(", ");
        text.push_str(&format!(
            "\n⚠️ Data unavailable for: <code>{failed}</code> (shown as zero)\n"
        ));
    }

    text
}

/// Group an amount with thin spaces every three digits; keep two decimal
/// places only when the amount is not whole.
pub fn format_amount(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let fraction = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let mut result = String::new();
    if negative {
        result.push('-');
    }
    result.push_str(&grouped);
    if fraction > 0 {
        result.push_str(&format!(".{fraction:02}"));
    }
    result
}

/// Deliver the formatted report to the configured chat. Not retried within
/// the cycle; the next scheduled cycle is the retry.
pub async fn send_message(
    http: &Client,
    api_base: &str,
    bot_token: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), ReportError> {
    let url = format!("{api_base}/bot{bot_token}/sendMessage");

    let response = http
        .post(&url)
        .json(&json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        }))
        .send()
        .await
        .map_err(|e| ReportError::Delivery(format!("sendMessage request failed: {e}")))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .unwrap_or(json!({"ok": false, "description": "failed to parse response"}));

    let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if status.is_success() && ok {
        return Ok(());
    }

    let description = body
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("unknown Telegram API error");
    Err(ReportError::Delivery(format!(
        "sendMessage returned {status}: {description}"
    )))
}
