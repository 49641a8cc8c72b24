use serde::{Deserialize, Serialize};

/// Access/refresh token pair returned by `POST /login/`.
///
/// Held for the life of the process only; replaced in place on refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// The API is loose about which fields it returns; `access` missing from
/// a 2xx body is still a login failure and is checked by the caller.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access: Option<String>,
}

/// Pre-aggregated expense totals from `GET /expenses/statistics/`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct ExpenseStats {
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default)]
    pub pending_amount: f64,
}

/// Apartment status codes recognized by the report. Anything else is
/// excluded from every histogram bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApartmentStatus {
    /// "bosh" — vacant
    Empty,
    /// "band" — reserved
    Reserved,
    /// "sotilgan" — sold
    Sold,
    /// "muddatli" — sold on installment
    Installment,
}

impl ApartmentStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "bosh" => Some(Self::Empty),
            "band" => Some(Self::Reserved),
            "sotilgan" => Some(Self::Sold),
            "muddatli" => Some(Self::Installment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusHistogram {
    pub empty: u64,
    pub reserved: u64,
    pub sold: u64,
    pub installment: u64,
}

impl StatusHistogram {
    pub fn bump(&mut self, status: ApartmentStatus) {
        match status {
            ApartmentStatus::Empty => self.empty += 1,
            ApartmentStatus::Reserved => self.reserved += 1,
            ApartmentStatus::Sold => self.sold += 1,
            ApartmentStatus::Installment => self.installment += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.empty + self.reserved + self.sold + self.installment
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaymentsToday {
    pub count: u64,
    pub sum: f64,
}

/// The computed daily summary. Sections whose source fetch failed carry
/// their defaults and an entry in `failed_sections`, so a degraded report
/// can still be formatted and sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySummary {
    pub apartments: StatusHistogram,
    pub payments: PaymentsToday,
    pub expenses: ExpenseStats,
    pub total_debt: f64,
    pub failed_sections: Vec<String>,
}
