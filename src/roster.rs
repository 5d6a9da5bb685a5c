//! The student roster.
//!
//! Every mutation is a read-all, change, write-all cycle over the backing
//! table. The cycle runs under the write half of an `RwLock`, so concurrent
//! mutations queue up instead of overwriting each other. Reads share the lock
//! and work on an owned snapshot.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rand::{thread_rng, Rng};
use tokio::sync::RwLock;

use crate::export::{export, ExportError, ExportFormat};
use crate::models::{money, Amount, NewStudent, StudentPatch, StudentRecord, DEFAULT_STATUS};
use crate::stats::RosterStats;
use crate::store::{CsvTable, SnapshotStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),
    #[error("`{0}` must be a non-negative number")]
    InvalidAmount(&'static str),
    #[error("Student {0} not found")]
    StudentNotFound(i64),
    #[error("No students found to export")]
    NothingToExport,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

pub struct RosterStore {
    table: RwLock<Box<dyn SnapshotStore<StudentRecord>>>,
    required: Vec<String>,
}

impl RosterStore {
    pub fn new(table: impl SnapshotStore<StudentRecord> + 'static, required: Vec<String>) -> Self {
        Self {
            table: RwLock::new(Box::new(table)),
            required,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, required: Vec<String>) -> Self {
        Self::new(CsvTable::new(path), required)
    }

    pub async fn list_all(&self) -> Result<Vec<StudentRecord>, RosterError> {
        let table = self.table.read().await;
        Ok(table.load().await?)
    }

    pub async fn get(&self, id: i64) -> Result<StudentRecord, RosterError> {
        self.list_all()
            .await?
            .into_iter()
            .find(|student| student.id == id)
            .ok_or(RosterError::StudentNotFound(id))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<StudentRecord>, RosterError> {
        let needle = query.trim().to_lowercase();
        let students = self.list_all().await?;
        if needle.is_empty() {
            return Ok(students);
        }
        Ok(students
            .into_iter()
            .filter(|student| student.matches(&needle))
            .collect())
    }

    pub async fn stats(&self) -> Result<RosterStats, RosterError> {
        Ok(RosterStats::compute(&self.list_all().await?))
    }

    pub async fn export_as(&self, format: ExportFormat) -> Result<Vec<u8>, RosterError> {
        let students = self.list_all().await?;
        if students.is_empty() {
            return Err(RosterError::NothingToExport);
        }
        let bytes = export(&students, format)?;
        log::info!("Exported {} students as {:?}", students.len(), format);
        Ok(bytes)
    }

    /// Adds a student and returns it along with the new roster size.
    pub async fn add(&self, fields: NewStudent) -> Result<(StudentRecord, usize), RosterError> {
        let missing = fields.missing_fields(&self.required);
        if !missing.is_empty() {
            return Err(RosterError::MissingRequiredFields(missing));
        }
        let mut student = draft(fields, Utc::now())?;

        let table = self.table.write().await;
        let mut students = table.load().await?;
        let taken: HashSet<i64> = students.iter().map(|s| s.id).collect();
        student.id = next_id(&taken, student.created_at);
        students.push(student.clone());
        table.save(&students).await?;

        log::info!(
            "Student \"{}\" added with id {}. Total students: {}",
            student.name,
            student.id,
            students.len()
        );
        Ok((student, students.len()))
    }

    pub async fn update(&self, id: i64, patch: StudentPatch) -> Result<StudentRecord, RosterError> {
        let table = self.table.write().await;
        let mut students = table.load().await?;
        let student = students
            .iter_mut()
            .find(|student| student.id == id)
            .ok_or(RosterError::StudentNotFound(id))?;
        apply(student, patch, Utc::now())?;
        let updated = student.clone();
        table.save(&students).await?;

        log::info!("Student {} updated", id);
        Ok(updated)
    }

    /// Removes a student and returns how many remain.
    pub async fn remove(&self, id: i64) -> Result<usize, RosterError> {
        let table = self.table.write().await;
        let mut students = table.load().await?;
        let before = students.len();
        students.retain(|student| student.id != id);
        if students.len() == before {
            log::warn!("Student {} not found for deletion", id);
            return Err(RosterError::StudentNotFound(id));
        }
        table.save(&students).await?;

        log::info!("Student {} deleted. Total students: {}", id, students.len());
        Ok(students.len())
    }
}

fn amount(value: Option<Amount>, field: &'static str) -> Result<Option<f64>, RosterError> {
    match value {
        None => Ok(None),
        Some(amount) if amount.is_blank() => Ok(None),
        Some(amount) => amount
            .value()
            .map(Some)
            .ok_or(RosterError::InvalidAmount(field)),
    }
}

fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn draft(fields: NewStudent, now: DateTime<Utc>) -> Result<StudentRecord, RosterError> {
    let total_fee = amount(fields.total_fee, "totalFee")?.unwrap_or(0.0);
    let discount = amount(fields.discount, "discount")?.unwrap_or(0.0);
    let amount_paid = amount(fields.amount_paid, "amountPaid")?.unwrap_or(0.0);
    let remaining_balance = match amount(fields.remaining_balance, "remainingBalance")? {
        Some(explicit) => money(explicit),
        None => StudentRecord::balance_of(total_fee, discount, amount_paid),
    };
    let status = Some(text(fields.status))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_STATUS.to_string());

    Ok(StudentRecord {
        id: 0,
        name: text(fields.name),
        phone: text(fields.phone),
        email: text(fields.email),
        course: text(fields.course),
        batch_time: text(fields.batch_time),
        total_fee,
        discount,
        amount_paid,
        remaining_balance,
        status,
        created_at: now,
        updated_at: now,
    })
}

/// Field-by-field merge. Amounts are validated before anything is written so a
/// rejected patch leaves the record untouched.
fn apply(
    student: &mut StudentRecord,
    patch: StudentPatch,
    now: DateTime<Utc>,
) -> Result<(), RosterError> {
    let total_fee = amount(patch.total_fee, "totalFee")?;
    let discount = amount(patch.discount, "discount")?;
    let amount_paid = amount(patch.amount_paid, "amountPaid")?;
    let remaining_balance = amount(patch.remaining_balance, "remainingBalance")?;

    if let Some(name) = patch.name {
        student.name = name.trim().to_string();
    }
    if let Some(phone) = patch.phone {
        student.phone = phone.trim().to_string();
    }
    if let Some(email) = patch.email {
        student.email = email.trim().to_string();
    }
    if let Some(course) = patch.course {
        student.course = course.trim().to_string();
    }
    if let Some(batch_time) = patch.batch_time {
        student.batch_time = batch_time.trim().to_string();
    }
    if let Some(status) = patch.status.filter(|s| !s.trim().is_empty()) {
        student.status = status.trim().to_string();
    }
    if let Some(total_fee) = total_fee {
        student.total_fee = total_fee;
    }
    if let Some(discount) = discount {
        student.discount = discount;
    }
    if let Some(amount_paid) = amount_paid {
        student.amount_paid = amount_paid;
    }
    match remaining_balance {
        Some(explicit) => student.remaining_balance = money(explicit),
        None => student.recompute_balance(),
    }
    student.updated_at = now;
    Ok(())
}

/// Millisecond timestamp plus a random suffix, redrawn until it is not taken.
fn next_id(taken: &HashSet<i64>, now: DateTime<Utc>) -> i64 {
    let base = now.timestamp_millis();
    let mut rng = thread_rng();
    (0..64)
        .map(|_| base + rng.gen_range(0..1000))
        .find(|id| !taken.contains(id))
        .unwrap_or_else(|| taken.iter().copied().max().map_or(base, |max| max + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn required() -> Vec<String> {
        ["name", "phone", "email", "totalFee", "amountPaid"]
            .iter()
            .map(|f| f.to_string())
            .collect()
    }

    fn jane() -> NewStudent {
        NewStudent {
            name: Some("Jane".to_string()),
            phone: Some("555".to_string()),
            email: Some("jane@x.com".to_string()),
            course: Some("Web Development".to_string()),
            total_fee: Some(Amount::Number(1000.0)),
            amount_paid: Some(Amount::Number(400.0)),
            ..NewStudent::default()
        }
    }

    fn store(dir: &tempfile::TempDir) -> RosterStore {
        RosterStore::csv(dir.path().join("students.csv"), required())
    }

    #[tokio::test]
    async fn missing_backing_file_is_an_empty_roster() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(&dir).list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_computes_balance_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let roster = store(&dir);
        let (student, total) = roster.add(jane()).await.unwrap();

        assert_eq!(student.remaining_balance, "600.00");
        assert_eq!(student.status, DEFAULT_STATUS);
        assert_eq!(total, 1);

        let reloaded = store(&dir).list_all().await.unwrap();
        assert_eq!(reloaded, vec![student]);
    }

    #[tokio::test]
    async fn add_keeps_explicit_balance() {
        let dir = tempfile::tempdir().unwrap();
        let (student, _) = store(&dir)
            .add(NewStudent {
                remaining_balance: Some(Amount::Text("12".to_string())),
                ..jane()
            })
            .await
            .unwrap();
        assert_eq!(student.remaining_balance, "12.00");
    }

    #[tokio::test]
    async fn add_lists_every_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir)
            .add(NewStudent {
                name: Some("Jane".to_string()),
                ..NewStudent::default()
            })
            .await
            .unwrap_err();
        match err {
            RosterError::MissingRequiredFields(fields) => {
                assert_eq!(fields, vec!["phone", "email", "totalFee", "amountPaid"])
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn add_rejects_negative_amounts() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(&dir)
            .add(NewStudent {
                amount_paid: Some(Amount::Number(-5.0)),
                ..jane()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::InvalidAmount("amountPaid")));
    }

    #[tokio::test]
    async fn required_fields_follow_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let roster = RosterStore::csv(dir.path().join("s.csv"), vec!["name".to_string()]);
        let (student, _) = roster
            .add(NewStudent {
                name: Some("Solo".to_string()),
                ..NewStudent::default()
            })
            .await
            .unwrap();
        assert_eq!(student.total_fee, 0.0);
        assert_eq!(student.remaining_balance, "0.00");
    }

    #[tokio::test]
    async fn update_merges_and_recomputes() {
        let dir = tempfile::tempdir().unwrap();
        let roster = store(&dir);
        let (student, _) = roster.add(jane()).await.unwrap();

        let updated = roster
            .update(
                student.id,
                StudentPatch {
                    amount_paid: Some(Amount::Text("900".to_string())),
                    discount: Some(Amount::Number(200.0)),
                    course: Some("Data Science".to_string()),
                    ..StudentPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.id, student.id);
        assert_eq!(updated.name, "Jane");
        assert_eq!(updated.course, "Data Science");
        assert_eq!(updated.remaining_balance, "0.00");
        assert_eq!(updated.created_at, student.created_at);
        assert!(updated.updated_at >= student.updated_at);
        assert_eq!(roster.get(student.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn rejected_patch_leaves_record_alone() {
        let dir = tempfile::tempdir().unwrap();
        let roster = store(&dir);
        let (student, _) = roster.add(jane()).await.unwrap();
        let err = roster
            .update(
                student.id,
                StudentPatch {
                    name: Some("Changed".to_string()),
                    total_fee: Some(Amount::Text("lots".to_string())),
                    ..StudentPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::InvalidAmount("totalFee")));
        assert_eq!(roster.get(student.id).await.unwrap().name, "Jane");
    }

    #[tokio::test]
    async fn blank_status_in_patch_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let roster = store(&dir);
        let (student, _) = roster.add(jane()).await.unwrap();

        let updated = roster
            .update(
                student.id,
                StudentPatch {
                    status: Some("  ".to_string()),
                    ..StudentPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, DEFAULT_STATUS);

        let updated = roster
            .update(
                student.id,
                StudentPatch {
                    status: Some(" completed ".to_string()),
                    ..StudentPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, "completed");
    }

    #[tokio::test]
    async fn update_and_remove_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let roster = store(&dir);
        roster.add(jane()).await.unwrap();

        assert!(matches!(
            roster.update(42, StudentPatch::default()).await,
            Err(RosterError::StudentNotFound(42))
        ));
        assert!(matches!(
            roster.remove(42).await,
            Err(RosterError::StudentNotFound(42))
        ));
        assert_eq!(roster.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_returns_remaining_count() {
        let dir = tempfile::tempdir().unwrap();
        let roster = store(&dir);
        let (first, _) = roster.add(jane()).await.unwrap();
        roster.add(jane()).await.unwrap();

        assert_eq!(roster.remove(first.id).await.unwrap(), 1);
        assert!(roster.get(first.id).await.is_err());
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let roster = store(&dir);
        roster.add(jane()).await.unwrap();
        roster
            .add(NewStudent {
                name: Some("Bob".to_string()),
                email: Some("bob@y.org".to_string()),
                phone: Some("777".to_string()),
                course: Some("Graphic Design".to_string()),
                ..jane()
            })
            .await
            .unwrap();

        assert_eq!(roster.search("JANE").await.unwrap().len(), 1);
        assert_eq!(roster.search("design").await.unwrap()[0].name, "Bob");
        assert_eq!(roster.search("77").await.unwrap()[0].name, "Bob");
        assert_eq!(roster.search("  ").await.unwrap().len(), 2);
        assert!(roster.search("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_of_empty_roster_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            store(&dir).export_as(ExportFormat::Csv).await,
            Err(RosterError::NothingToExport)
        ));
    }

    #[tokio::test]
    async fn export_contains_added_student() {
        let dir = tempfile::tempdir().unwrap();
        let roster = store(&dir);
        let (student, _) = roster.add(jane()).await.unwrap();

        let bytes = roster.export_as(ExportFormat::Csv).await.unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let rows: Vec<StudentRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert!(rows.contains(&student));
    }

    #[tokio::test]
    async fn concurrent_adds_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let roster = Arc::new(store(&dir));
        let tasks: Vec<_> = (0..24)
            .map(|n| {
                let roster = Arc::clone(&roster);
                tokio::spawn(async move {
                    roster
                        .add(NewStudent {
                            name: Some(format!("Student {}", n)),
                            ..jane()
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let students = roster.list_all().await.unwrap();
        let ids: HashSet<i64> = students.iter().map(|s| s.id).collect();
        assert_eq!(students.len(), 24);
        assert_eq!(ids.len(), 24);
    }

    #[tokio::test]
    async fn ids_stay_unique_across_mixed_operations() {
        let dir = tempfile::tempdir().unwrap();
        let roster = store(&dir);
        for round in 0..5 {
            let (student, _) = roster.add(jane()).await.unwrap();
            roster.add(jane()).await.unwrap();
            if round % 2 == 0 {
                roster.remove(student.id).await.unwrap();
            } else {
                roster
                    .update(
                        student.id,
                        StudentPatch {
                            status: Some("completed".to_string()),
                            ..StudentPatch::default()
                        },
                    )
                    .await
                    .unwrap();
            }
            let students = roster.list_all().await.unwrap();
            let ids: HashSet<i64> = students.iter().map(|s| s.id).collect();
            assert_eq!(ids.len(), students.len());
        }
    }

    #[test]
    fn next_id_skips_taken_values() {
        let now = Utc::now();
        let base = now.timestamp_millis();
        let taken: HashSet<i64> = (base..base + 999).collect();
        let id = next_id(&taken, now);
        assert!(!taken.contains(&id));
    }
}
