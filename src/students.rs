use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use serde::{Deserialize, Serialize};

use crate::auth::AdminSession;
use crate::err::JsonBody;
use crate::export::ExportFormat;
use crate::models::{NewStudent, StudentPatch, StudentRecord};
use crate::state::AppState;
use crate::stats::RosterStats;
use crate::{proceeds, Error, Payload};

fn student_id(raw: &str) -> Result<i64, Error> {
    raw.trim().parse::<i64>().map_err(|_| Error::StudentNotFound {
        message: format!("Student {} not found", raw),
    })
}

pub async fn list(
    _: AdminSession,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<StudentList> {
    let students = state.roster.list_all().await?;
    proceeds(StudentList {
        count: students.len(),
        students,
    })
}

pub async fn add(
    AdminSession(admin): AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    JsonBody(fields): JsonBody<NewStudent>,
) -> Payload<AddedStudent> {
    let (student, total_students) = state.roster.add(fields).await?;
    log::info!("{} added student {}", admin.email, student.id);
    proceeds(AddedStudent {
        message: "Student added successfully".to_string(),
        student,
        total_students,
    })
}

pub async fn get(
    _: AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Payload<OneStudent> {
    let student = state.roster.get(student_id(&id)?).await?;
    proceeds(OneStudent { student })
}

pub async fn update(
    AdminSession(admin): AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<StudentPatch>,
) -> Payload<UpdatedStudent> {
    let student = state.roster.update(student_id(&id)?, patch).await?;
    log::info!("{} updated student {}", admin.email, student.id);
    proceeds(UpdatedStudent {
        message: "Student updated successfully".to_string(),
        student,
    })
}

pub async fn delete(
    AdminSession(admin): AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Payload<DeletedStudent> {
    let id = student_id(&id)?;
    let total_students = state.roster.remove(id).await?;
    log::info!("{} deleted student {}", admin.email, id);
    proceeds(DeletedStudent {
        message: "Student deleted successfully".to_string(),
        total_students,
    })
}

pub async fn export(
    _: AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, Error> {
    let format = query
        .format
        .as_deref()
        .unwrap_or_default()
        .parse::<ExportFormat>()
        .map_err(Error::invalid)?;
    let bytes = state.roster.export_as(format).await?;
    let disposition = format!("attachment; filename=\"{}\"", format.file_name());
    Ok((
        [
            (CONTENT_TYPE, format.content_type().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn stats(
    _: AdminSession,
    Extension(state): Extension<Arc<AppState>>,
) -> Payload<RosterStats> {
    proceeds(state.roster.stats().await?)
}

pub async fn search(
    _: AdminSession,
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Payload<SearchResults> {
    let query = query.query.unwrap_or_default();
    let students = state.roster.search(&query).await?;
    proceeds(SearchResults {
        query,
        count: students.len(),
        students,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportQuery {
    format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    query: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentList {
    count: usize,
    students: Vec<StudentRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedStudent {
    message: String,
    student: StudentRecord,
    total_students: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OneStudent {
    student: StudentRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatedStudent {
    message: String,
    student: StudentRecord,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedStudent {
    message: String,
    total_students: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    query: String,
    count: usize,
    students: Vec<StudentRecord>,
}
