//! Report generation: joins tickets with their classification records and
//! writes the triage report as CSV.
//!
//! Rows are sorted by category, then request type, then short description
//! (ascending, case-sensitive), so related work lands together in the sheet.

use std::collections::HashMap;
use std::path::Path;

use crate::domain::classification::ClassificationRecord;
use crate::domain::ticket::Ticket;
use crate::error::Result;

const HEADERS: [&str; 10] = [
    "Request ID",
    "Short Description",
    "Long Description",
    "Requester Email",
    "Category",
    "Request Type",
    "SLA Value",
    "SLA Unit",
    "Confidence",
    "Resolution",
];

/// One row of the triage report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub ticket_id: String,
    pub short_description: String,
    pub long_description: String,
    pub requester_email: String,
    pub category: String,
    pub request_type: String,
    pub sla_value: u32,
    pub sla_unit: String,
    pub confidence: f64,
    pub resolution: String,
}

/// Join tickets with their records and sort for the report.
///
/// Tickets without a record are skipped with a warning; the coordinator
/// guarantees one record per ticket, so a miss here means the inputs came
/// from different runs.
pub fn build_rows(tickets: &[Ticket], records: &[ClassificationRecord]) -> Vec<ReportRow> {
    let by_id: HashMap<&str, &ClassificationRecord> = records
        .iter()
        .map(|record| (&*record.ticket_id, record))
        .collect();

    let mut rows: Vec<ReportRow> = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        let Some(record) = by_id.get(&*ticket.id) else {
            tracing::warn!(ticket_id = %ticket.id, "No classification record for ticket, skipping row");
            continue;
        };
        rows.push(ReportRow {
            ticket_id: ticket.id.0.clone(),
            short_description: ticket.short_description.clone(),
            long_description: ticket.long_description.clone(),
            requester_email: ticket.requester_email.clone(),
            category: record.category.clone(),
            request_type: record.request_type.clone(),
            sla_value: record.sla.value,
            sla_unit: record.sla.unit.as_str().to_string(),
            confidence: record.confidence,
            resolution: record.resolution.as_str().to_string(),
        });
    }

    rows.sort_by(|a, b| {
        (&a.category, &a.request_type, &a.short_description)
            .cmp(&(&b.category, &b.request_type, &b.short_description))
    });
    rows
}

/// Render rows as CSV text, header row included.
pub fn render_csv(rows: &[ReportRow]) -> String {
    let mut out = String::new();
    out.push_str(&HEADERS.join(","));
    out.push('\n');
    for row in rows {
        let fields = [
            csv_escape(&row.ticket_id),
            csv_escape(&row.short_description),
            csv_escape(&row.long_description),
            csv_escape(&row.requester_email),
            csv_escape(&row.category),
            csv_escape(&row.request_type),
            row.sla_value.to_string(),
            csv_escape(&row.sla_unit),
            format!("{:.2}", row.confidence),
            csv_escape(&row.resolution),
        ];
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

/// Write the report to disk, creating the output directory if needed.
pub fn write_report(
    tickets: &[Ticket],
    records: &[ClassificationRecord],
    path: &Path,
) -> Result<usize> {
    let rows = build_rows(tickets, records);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_csv(&rows))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Report written");
    Ok(rows.len())
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
