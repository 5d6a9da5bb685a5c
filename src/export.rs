use std::str::FromStr;

use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::models::StudentRecord;

const COLUMNS: &[&str] = &[
    "ID",
    "Name",
    "Phone",
    "Email",
    "Course",
    "Batch Time",
    "Total Fee",
    "Discount",
    "Amount Paid",
    "Remaining Balance",
    "Status",
    "Created At",
    "Updated At",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("xlsx: {0}")]
    Xlsx(#[from] XlsxError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "students_export.xlsx",
            ExportFormat::Csv => "students_export.csv",
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        ExportFormat::Xlsx
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "xlsx" => Ok(ExportFormat::Xlsx),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("Unsupported export format `{}`", other)),
        }
    }
}

pub fn export(students: &[StudentRecord], format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Xlsx => to_xlsx(students),
        ExportFormat::Csv => to_csv(students),
    }
}

fn to_csv(students: &[StudentRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for student in students {
        writer.serialize(student)?;
    }
    Ok(writer.into_inner().map_err(|err| err.into_error())?)
}

fn to_xlsx(students: &[StudentRecord]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Students")?;
        for (col, title) in COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *title, &bold)?;
        }
        for (index, student) in students.iter().enumerate() {
            let row = index as u32 + 1;
            sheet.write_number(row, 0, student.id as f64)?;
            sheet.write_string(row, 1, student.name.as_str())?;
            sheet.write_string(row, 2, student.phone.as_str())?;
            sheet.write_string(row, 3, student.email.as_str())?;
            sheet.write_string(row, 4, student.course.as_str())?;
            sheet.write_string(row, 5, student.batch_time.as_str())?;
            sheet.write_number(row, 6, student.total_fee)?;
            sheet.write_number(row, 7, student.discount)?;
            sheet.write_number(row, 8, student.amount_paid)?;
            sheet.write_string(row, 9, student.remaining_balance.as_str())?;
            sheet.write_string(row, 10, student.status.as_str())?;
            sheet.write_string(row, 11, student.created_at.to_rfc3339().as_str())?;
            sheet.write_string(row, 12, student.updated_at.to_rfc3339().as_str())?;
        }
    }
    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn jane() -> StudentRecord {
        let now = Utc::now();
        StudentRecord {
            id: 1_700_000_000_123,
            name: "Jane".to_string(),
            phone: "555".to_string(),
            email: "jane@x.com".to_string(),
            course: "Rust".to_string(),
            batch_time: "Morning".to_string(),
            total_fee: 1000.0,
            discount: 0.0,
            amount_paid: 400.0,
            remaining_balance: "600.00".to_string(),
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn csv_export_reads_back_the_same_records() {
        let bytes = export(&[jane()], ExportFormat::Csv).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let rows: Vec<StudentRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows, vec![jane_with(&rows[0])]);
    }

    // Timestamps survive through RFC 3339 text, so compare against the parsed copy.
    fn jane_with(parsed: &StudentRecord) -> StudentRecord {
        StudentRecord {
            created_at: parsed.created_at,
            updated_at: parsed.updated_at,
            ..jane()
        }
    }

    #[test]
    fn xlsx_export_is_a_zip_container() {
        let bytes = export(&[jane()], ExportFormat::Xlsx).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert_eq!("CSV".parse::<ExportFormat>(), Ok(ExportFormat::Csv));
        assert_eq!("".parse::<ExportFormat>(), Ok(ExportFormat::Xlsx));
        assert!("pdf".parse::<ExportFormat>().is_err());
    }
}
