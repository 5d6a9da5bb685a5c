use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{money, StudentRecord};

const UNASSIGNED: &str = "Unassigned";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStats {
    pub total_students: usize,
    pub total_fees: String,
    pub total_paid: String,
    pub total_balance: String,
    pub course_distribution: BTreeMap<String, usize>,
    pub batch_distribution: BTreeMap<String, usize>,
    pub completion_rate: String,
}

impl RosterStats {
    pub fn compute(roster: &[StudentRecord]) -> Self {
        let mut total_fees = 0.0;
        let mut total_paid = 0.0;
        let mut total_balance = 0.0;
        let mut course_distribution = BTreeMap::new();
        let mut batch_distribution = BTreeMap::new();

        for student in roster {
            total_fees += student.total_fee;
            total_paid += student.amount_paid;
            total_balance += student.remaining_balance.trim().parse::<f64>().unwrap_or(0.0);
            *course_distribution.entry(bucket(&student.course)).or_insert(0) += 1;
            *batch_distribution.entry(bucket(&student.batch_time)).or_insert(0) += 1;
        }

        let completion_rate = if total_fees > 0.0 {
            total_paid / total_fees * 100.0
        } else {
            0.0
        };

        Self {
            total_students: roster.len(),
            total_fees: money(total_fees),
            total_paid: money(total_paid),
            total_balance: money(total_balance),
            course_distribution,
            batch_distribution,
            completion_rate: format!("{:.2}%", completion_rate),
        }
    }
}

fn bucket(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        UNASSIGNED.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn student(course: &str, batch: &str, fee: f64, paid: f64) -> StudentRecord {
        let now = Utc::now();
        StudentRecord {
            id: 0,
            name: "n".to_string(),
            phone: "p".to_string(),
            email: "e".to_string(),
            course: course.to_string(),
            batch_time: batch.to_string(),
            total_fee: fee,
            discount: 0.0,
            amount_paid: paid,
            remaining_balance: StudentRecord::balance_of(fee, 0.0, paid),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_roster_has_zero_completion() {
        let stats = RosterStats::compute(&[]);
        assert_eq!(stats.total_students, 0);
        assert_eq!(stats.total_fees, "0.00");
        assert_eq!(stats.completion_rate, "0.00%");
        assert!(stats.course_distribution.is_empty());
    }

    #[test]
    fn sums_and_distributions() {
        let roster = vec![
            student("Rust", "Morning", 1000.0, 400.0),
            student("Rust", "Evening", 500.0, 500.0),
            student("", "Morning", 500.0, 100.0),
        ];
        let stats = RosterStats::compute(&roster);

        assert_eq!(stats.total_students, 3);
        assert_eq!(stats.total_fees, "2000.00");
        assert_eq!(stats.total_paid, "1000.00");
        assert_eq!(stats.total_balance, "1000.00");
        assert_eq!(stats.completion_rate, "50.00%");
        assert_eq!(stats.course_distribution.get("Rust"), Some(&2));
        assert_eq!(stats.course_distribution.get(UNASSIGNED), Some(&1));
        assert_eq!(stats.batch_distribution.get("Morning"), Some(&2));
        assert_eq!(stats.batch_distribution.get("Evening"), Some(&1));
    }
}
