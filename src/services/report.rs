use serde_json::Value;
use tracing::warn;

use crate::error::ReportError;
use crate::schemas::{ApartmentStatus, DailySummary, ExpenseStats, PaymentsToday, StatusHistogram};

/// Outcome of the four independent resource fetches of one report cycle.
/// A failure in any of them degrades its own section only.
pub struct ResourceOutcomes {
    pub apartments: Result<Vec<Value>, ReportError>,
    pub payments: Result<Vec<Value>, ReportError>,
    pub expenses: Result<Option<ExpenseStats>, ReportError>,
    pub clients: Result<Vec<Value>, ReportError>,
}

/// Reduce the raw resource payloads into the daily summary. `today` is the
/// local calendar date of the report run as `YYYY-MM-DD`.
pub fn build_summary(outcomes: ResourceOutcomes, today: &str) -> DailySummary {
    let mut summary = DailySummary::default();

    match outcomes.apartments {
        Ok(apartments) => summary.apartments = status_histogram(&apartments),
        Err(e) => {
            warn!(error = %e, "Apartment section degraded");
            summary.failed_sections.push("apartments".to_string());
        }
    }

    match outcomes.payments {
        Ok(payments) => summary.payments = todays_payments(&payments, today),
        Err(e) => {
            warn!(error = %e, "Payment section degraded");
            summary.failed_sections.push("payments".to_string());
        }
    }

    match outcomes.expenses {
        // Endpoint absent on this deployment: zeros, not a failure.
        Ok(stats) => summary.expenses = stats.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Expense section degraded");
            summary.failed_sections.push("expenses".to_string());
        }
    }

    match outcomes.clients {
        Ok(clients) => summary.total_debt = total_client_debt(&clients),
        Err(e) => {
            warn!(error = %e, "Client debt section degraded");
            summary.failed_sections.push("clients".to_string());
        }
    }

    summary
}

fn status_histogram(apartments: &[Value]) -> StatusHistogram {
    let mut histogram = StatusHistogram::default();
    for apartment in apartments {
        if let Some(status) = ApartmentStatus::from_code(&value_str(apartment, "status")) {
            histogram.bump(status);
        }
    }
    histogram
}

/// A payment belongs to today iff its date-like field starts with the
/// local date as a plain string prefix. This intentionally mirrors the
/// upstream convention of lexicographic prefix matching rather than
/// parsed-date ranges.
fn todays_payments(payments: &[Value], today: &str) -> PaymentsToday {
    let mut result = PaymentsToday::default();
    for payment in payments {
        if !payment_date(payment).starts_with(today) {
            continue;
        }
        result.count += 1;
        result.sum += number_from_value(payment.get("amount"));
    }
    result
}

/// The API has shipped the payment date under both names over time.
fn payment_date(payment: &Value) -> String {
    let date = value_str(payment, "created_at");
    if !date.is_empty() {
        return date;
    }
    value_str(payment, "date_created")
}

fn total_client_debt(clients: &[Value]) -> f64 {
    clients
        .iter()
        .map(|client| number_from_value(client.get("balance")))
        .sum()
}

fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

/// Coerce a JSON number or numeric string to f64; anything else is 0.
fn number_from_value(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn all_ok(
        apartments: Vec<Value>,
        payments: Vec<Value>,
        expenses: Option<ExpenseStats>,
        clients: Vec<Value>,
    ) -> ResourceOutcomes {
        ResourceOutcomes {
            apartments: Ok(apartments),
            payments: Ok(payments),
            expenses: Ok(expenses),
            clients: Ok(clients),
        }
    }

    #[test]
    fn histogram_counts_only_recognized_statuses() {
        let apartments = vec![
            json!({"status": "bosh"}),
            json!({"status": "band"}),
            json!({"status": "renovatsiya"}),
            json!({"status": ""}),
            json!({"number": 4}),
            json!({"status": "sotilgan"}),
        ];
        let histogram = status_histogram(&apartments);

        assert_eq!(histogram.empty, 1);
        assert_eq!(histogram.reserved, 1);
        assert_eq!(histogram.sold, 1);
        assert_eq!(histogram.installment, 0);
        assert_eq!(histogram.total(), 3);
    }

    #[test]
    fn payment_filter_is_string_prefix_on_either_date_field() {
        let payments = vec![
            json!({"amount": 100, "created_at": "2024-01-01T10:00:00"}),
            json!({"amount": 40, "date_created": "2024-01-01"}),
            json!({"amount": 999, "created_at": "2024-01-02T00:00:01"}),
            json!({"amount": 999, "created_at": "2023-12-31T23:59:59"}),
            json!({"amount": 999, "created_at": ""}),
            json!({"amount": 999}),
        ];
        let result = todays_payments(&payments, "2024-01-01");

        assert_eq!(result.count, 2);
        assert_eq!(result.sum, 140.0);
    }

    #[test]
    fn debt_sums_numeric_balances_and_ignores_garbage() {
        let clients = vec![
            json!({"balance": "50"}),
            json!({"balance": 25.5}),
            json!({"balance": "bad"}),
            json!({"balance": null}),
            json!({}),
        ];
        assert_eq!(total_client_debt(&clients), 75.5);
    }

    #[test]
    fn failed_resource_degrades_only_its_own_section() {
        let outcomes = ResourceOutcomes {
            apartments: Err(ReportError::fetch("apartments", "boom")),
            payments: Ok(vec![json!({"amount": 10, "created_at": "2024-01-01"})]),
            expenses: Err(ReportError::fetch("expenses", "boom")),
            clients: Ok(vec![json!({"balance": "7"})]),
        };
        let summary = build_summary(outcomes, "2024-01-01");

        assert_eq!(summary.apartments, StatusHistogram::default());
        assert_eq!(summary.payments.count, 1);
        assert_eq!(summary.expenses, ExpenseStats::default());
        assert_eq!(summary.total_debt, 7.0);
        assert_eq!(summary.failed_sections, vec!["apartments", "expenses"]);
    }

    #[test]
    fn absent_statistics_endpoint_yields_zeros_without_failure_note() {
        let summary = build_summary(all_ok(vec![], vec![], None, vec![]), "2024-01-01");

        assert_eq!(summary.expenses, ExpenseStats::default());
        assert!(summary.failed_sections.is_empty());
    }

    #[test]
    fn end_to_end_fixture() {
        let apartments = vec![
            json!({"status": "bosh"}),
            json!({"status": "band"}),
            json!({"status": "sotilgan"}),
            json!({"status": "muddatli"}),
            json!({"status": "bosh"}),
        ];
        let payments = vec![json!({"amount": 100, "created_at": "2024-01-01T10:00:00"})];
        let expenses = ExpenseStats {
            total_amount: 500.0,
            paid_amount: 300.0,
            pending_amount: 200.0,
        };
        let clients = vec![json!({"balance": "50"}), json!({"balance": "bad"})];

        let summary = build_summary(
            all_ok(apartments, payments, Some(expenses), clients),
            "2024-01-01",
        );

        assert_eq!(summary.apartments.empty, 2);
        assert_eq!(summary.apartments.reserved, 1);
        assert_eq!(summary.apartments.sold, 1);
        assert_eq!(summary.apartments.installment, 1);
        assert_eq!(summary.payments.count, 1);
        assert_eq!(summary.payments.sum, 100.0);
        assert_eq!(summary.expenses.total_amount, 500.0);
        assert_eq!(summary.expenses.paid_amount, 300.0);
        assert_eq!(summary.expenses.pending_amount, 200.0);
        assert_eq!(summary.total_debt, 50.0);
        assert!(summary.failed_sections.is_empty());
    }
}
