use axum::{
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};

use crate::{
    attendance::dto::{EntryView, StudentStatsView},
    users::AcmRole,
};

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn row(cells: &[&str]) -> String {
    let mut line = cells
        .iter()
        .map(|c| csv_quote(c))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Keeps `[A-Za-z0-9_-]` and replaces everything else with `_`, for use inside a filename.
pub fn file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// `200` with a CSV attachment named `filename`.
pub fn attachment(filename: &str, body: String) -> Response {
    (
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

pub fn students_csv(stats: &[StudentStatsView]) -> String {
    let mut csv = String::from(
        "name,registration_number,email,department,year,section,total_classes,attended_classes,percentage\n",
    );
    for s in stats {
        csv.push_str(&row(&[
            &s.full_name,
            s.registration_number.as_deref().unwrap_or(""),
            &s.email,
            &s.department,
            s.year.as_deref().unwrap_or(""),
            s.section.as_deref().unwrap_or(""),
            &s.total_classes.to_string(),
            &s.attended_classes.to_string(),
            &format!("{}%", s.percentage),
        ]));
    }
    csv
}

pub fn daily_csv(entries: &[EntryView]) -> String {
    let mut csv = String::from("time,name,registration_number,email,subject,status\n");
    for e in entries {
        csv.push_str(&row(&[
            &e.time,
            &e.user_name,
            e.registration_number.as_deref().unwrap_or(""),
            &e.email,
            &e.subject,
            &e.status.to_string(),
        ]));
    }
    csv
}

/// ACM members by chapter rank, then name.
pub fn acm_csv(stats: &[StudentStatsView]) -> String {
    let mut members: Vec<&StudentStatsView> = stats.iter().filter(|s| s.acm_member).collect();
    members.sort_by(|a, b| {
        let rank = |r: Option<AcmRole>| r.unwrap_or(AcmRole::Member);
        rank(a.acm_role)
            .cmp(&rank(b.acm_role))
            .then_with(|| a.full_name.cmp(&b.full_name))
    });

    let mut csv = String::from(
        "acm_role,name,registration_number,email,department,year,section,percentage\n",
    );
    for s in members {
        csv.push_str(&row(&[
            s.acm_role.map(AcmRole::label).unwrap_or(""),
            &s.full_name,
            s.registration_number.as_deref().unwrap_or(""),
            &s.email,
            &s.department,
            s.year.as_deref().unwrap_or(""),
            s.section.as_deref().unwrap_or(""),
            &format!("{}%", s.percentage),
        ]));
    }
    csv
}

pub fn user_csv(entries: &[EntryView]) -> String {
    let mut csv = String::from("date,time,subject,status\n");
    for e in entries {
        csv.push_str(&row(&[&e.date, &e.time, &e.subject, &e.status.to_string()]));
    }
    csv
}
