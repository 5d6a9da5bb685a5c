use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields a deployment may list in `STUDENT_REQUIRED_FIELDS`.
pub const STUDENT_FIELDS: &[&str] = &[
    "name",
    "phone",
    "email",
    "course",
    "batchTime",
    "totalFee",
    "discount",
    "amountPaid",
    "status",
];

pub const DEFAULT_STATUS: &str = "active";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub name: String,
    pub role: String,
}

/// A monetary input. Forms post numbers as either JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    pub fn is_blank(&self) -> bool {
        matches!(self, Amount::Text(text) if text.trim().is_empty())
    }

    /// The parsed value, `None` unless it is a finite non-negative number.
    pub fn value(&self) -> Option<f64> {
        let value = match self {
            Amount::Number(number) => *number,
            Amount::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        (value.is_finite() && value >= 0.0).then_some(value)
    }
}

pub fn money(value: f64) -> String {
    format!("{:.2}", value)
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub course: String,
    #[serde(default)]
    pub batch_time: String,
    pub total_fee: f64,
    #[serde(default)]
    pub discount: f64,
    pub amount_paid: f64,
    pub remaining_balance: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentRecord {
    pub fn balance_of(total_fee: f64, discount: f64, amount_paid: f64) -> String {
        money((total_fee - discount - amount_paid).max(0.0))
    }

    pub fn recompute_balance(&mut self) {
        self.remaining_balance = Self::balance_of(self.total_fee, self.discount, self.amount_paid);
    }

    /// Case-insensitive substring match; `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        [&self.name, &self.email, &self.phone, &self.course]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub course: Option<String>,
    pub batch_time: Option<String>,
    pub total_fee: Option<Amount>,
    pub discount: Option<Amount>,
    pub amount_paid: Option<Amount>,
    pub remaining_balance: Option<Amount>,
    pub status: Option<String>,
}

impl NewStudent {
    fn has(&self, field: &str) -> bool {
        fn text(value: &Option<String>) -> bool {
            value.as_deref().map_or(false, |v| !v.trim().is_empty())
        }
        fn amount(value: &Option<Amount>) -> bool {
            value.as_ref().map_or(false, |v| !v.is_blank())
        }
        match field {
            "name" => text(&self.name),
            "phone" => text(&self.phone),
            "email" => text(&self.email),
            "course" => text(&self.course),
            "batchTime" => text(&self.batch_time),
            "status" => text(&self.status),
            "totalFee" => amount(&self.total_fee),
            "discount" => amount(&self.discount),
            "amountPaid" => amount(&self.amount_paid),
            _ => true,
        }
    }

    pub fn missing_fields(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|field| !self.has(field))
            .cloned()
            .collect()
    }
}

/// Named optional fields merged over an existing record, one field at a time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub course: Option<String>,
    pub batch_time: Option<String>,
    pub total_fee: Option<Amount>,
    pub discount: Option<Amount>,
    pub amount_paid: Option<Amount>,
    pub remaining_balance: Option<Amount>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StudentRef {
    Number(i64),
    Text(String),
}

impl StudentRef {
    pub fn is_blank(&self) -> bool {
        matches!(self, StudentRef::Text(text) if text.trim().is_empty())
    }
}

impl fmt::Display for StudentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StudentRef::Number(id) => write!(f, "{}", id),
            StudentRef::Text(id) => write!(f, "{}", id.trim()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub student_id: Option<StudentRef>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub amount: Option<Amount>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub receipt_id: Option<String>,
    pub student_email: Option<String>,
    pub student_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptRecord {
    pub receipt_id: String,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub amount: f64,
    pub description: String,
    pub date: DateTime<Utc>,
    pub file_name: String,
    pub file_path: String,
    pub generated_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(serde_json::json!(400), Some(400.0))]
    #[case(serde_json::json!("400.5"), Some(400.5))]
    #[case(serde_json::json!(" 12 "), Some(12.0))]
    #[case(serde_json::json!(-1), None)]
    #[case(serde_json::json!("abc"), None)]
    fn amount_accepts_numbers_and_numeric_strings(
        #[case] raw: serde_json::Value,
        #[case] expected: Option<f64>,
    ) {
        let amount: Amount = serde_json::from_value(raw).unwrap();
        assert_eq!(amount.value(), expected);
    }

    #[rstest]
    #[case(1000.0, 0.0, 400.0, "600.00")]
    #[case(1000.0, 100.0, 400.0, "500.00")]
    #[case(500.0, 0.0, 700.0, "0.00")]
    #[case(250.5, 0.25, 0.0, "250.25")]
    fn balance_is_floored_and_fixed(
        #[case] total: f64,
        #[case] discount: f64,
        #[case] paid: f64,
        #[case] expected: &str,
    ) {
        assert_eq!(StudentRecord::balance_of(total, discount, paid), expected);
    }

    #[test]
    fn missing_fields_reports_blank_values() {
        let student = NewStudent {
            name: Some("Jane".to_string()),
            phone: Some("  ".to_string()),
            total_fee: Some(Amount::Text(String::new())),
            amount_paid: Some(Amount::Number(0.0)),
            ..NewStudent::default()
        };
        let required: Vec<String> = ["name", "phone", "email", "totalFee", "amountPaid"]
            .iter()
            .map(|f| f.to_string())
            .collect();
        assert_eq!(
            student.missing_fields(&required),
            vec!["phone", "email", "totalFee"]
        );
    }
}
