//! CSV rendering for attendance records

use super::ExportResult;
use crate::attendance::RosterEntry;
use crate::recognition::{format_confidence, RecognitionResult};
use chrono::{DateTime, Local, NaiveDate, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};

pub const ROSTER_HEADER: [&str; 9] = [
    "Date",
    "Subject",
    "Section",
    "Semester",
    "Student ID",
    "Student Name",
    "Status",
    "Confidence",
    "Timestamp",
];

pub const SELF_HEADER: [&str; 7] = [
    "Date",
    "Teacher ID",
    "Teacher Name",
    "Role",
    "Status",
    "Confidence",
    "Timestamp",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Class details stamped on every roster row
#[derive(Debug, Clone)]
pub struct ExportMeta {
    pub date: NaiveDate,
    pub subject: String,
    pub section: String,
    pub semester: String,
}

/// Header line as-is, then every data field double-quoted. No trailing newline.
fn render<R, F>(header: &[&str], rows: R) -> ExportResult<String>
where
    R: IntoIterator<Item = F>,
    F: IntoIterator,
    F::Item: AsRef<[u8]>,
{
    let mut out = header.join(",").into_bytes();
    out.push(b'\n');

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);
    for row in rows {
        writer.write_record(row)?;
    }
    let mut out = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;

    if out.last() == Some(&b'\n') {
        out.pop();
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Zero confidence renders as an empty cell
fn confidence_cell(confidence: f64) -> String {
    if confidence > 0.0 {
        format_confidence(confidence)
    } else {
        String::new()
    }
}

fn timestamp_cell(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Render the roster, one row per entry in display order
pub fn roster_csv(meta: &ExportMeta, entries: &[RosterEntry]) -> ExportResult<String> {
    let date = meta.date.to_string();
    let rows = entries.iter().map(|entry| {
        [
            date.clone(),
            meta.subject.clone(),
            meta.section.clone(),
            meta.semester.clone(),
            entry.id.clone(),
            entry.name.clone(),
            entry.status.as_str().to_string(),
            confidence_cell(entry.confidence),
            timestamp_cell(&entry.last_seen),
        ]
    });

    render(&ROSTER_HEADER, rows)
}

/// Render the teacher's own attendance as a single data row
pub fn self_csv(date: NaiveDate, result: &RecognitionResult) -> ExportResult<String> {
    let row = [
        date.to_string(),
        result.identity_id.clone().unwrap_or_default(),
        result.display_name.clone(),
        result.role().unwrap_or_default().to_string(),
        result.status().to_string(),
        confidence_cell(result.confidence),
        timestamp_cell(&result.timestamp),
    ];

    render(&SELF_HEADER, [row])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::RosterReconciler;
    use crate::testing::{roster_result, self_result};
    use csv::{ReaderBuilder, StringRecord};

    fn read(text: &str) -> (StringRecord, Vec<StringRecord>) {
        let mut reader = ReaderBuilder::new().from_reader(text.as_bytes());
        let headers = reader.headers().unwrap().clone();
        let records = reader.records().map(|r| r.unwrap()).collect();
        (headers, records)
    }

    fn meta() -> ExportMeta {
        ExportMeta {
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            subject: "CS101".to_string(),
            section: "A".to_string(),
            semester: "7".to_string(),
        }
    }

    #[test]
    fn test_roster_csv_survives_awkward_names() {
        let mut roster = RosterReconciler::default();
        roster.upsert(&roster_result("S100", r#"O'Brien, "Jay""#, 0.92));
        roster.upsert(&roster_result("S200", "Ben", 0.875));

        let text = roster_csv(&meta(), roster.entries()).unwrap();
        let (headers, records) = read(&text);

        assert_eq!(headers.iter().collect::<Vec<_>>(), ROSTER_HEADER.to_vec());
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][5], r#"O'Brien, "Jay""#);
        assert_eq!(
            records[0].iter().take(8).collect::<Vec<_>>(),
            vec!["2026-10-19", "CS101", "A", "7", "S100", r#"O'Brien, "Jay""#, "present", "92.0%"]
        );
        assert_eq!(&records[1][7], "87.5%");
    }

    #[test]
    fn test_roster_csv_layout() {
        let mut roster = RosterReconciler::default();
        roster.upsert(&roster_result("S100", r#"O'Brien, "Jay""#, 0.92));

        let text = roster_csv(&meta(), roster.entries()).unwrap();
        let lines: Vec<&str> = text.split('\n').collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], ROSTER_HEADER.join(","));
        assert!(lines[1].starts_with(r#""2026-10-19","CS101","A","7","S100","O'Brien, ""Jay""","#));
        assert!(!text.ends_with('\n'));
    }

    #[test]
    fn test_self_csv_row() {
        let result = self_result("T42", "Dr. Rao", Some("HOD"), 0.9);
        let (headers, records) = read(&self_csv(meta().date, &result).unwrap());

        assert_eq!(headers.iter().collect::<Vec<_>>(), SELF_HEADER.to_vec());
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].iter().take(6).collect::<Vec<_>>(),
            vec!["2026-10-19", "T42", "Dr. Rao", "HOD", "present", "90.0%"]
        );
        assert!(!records[0][6].is_empty());
    }

    #[test]
    fn test_zero_confidence_is_blank() {
        let result = self_result("T42", "Dr. Rao", None, 0.0);
        let (_, records) = read(&self_csv(meta().date, &result).unwrap());

        assert_eq!(&records[0][3], "");
        assert_eq!(&records[0][5], "");
    }
}
