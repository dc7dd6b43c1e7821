//! VTODO parsing using the icalendar crate's parser.

use crate::error::{DavError, DavResult};
use crate::model::{Item, Label, Reminder};
use chrono::{DateTime, TimeZone, Utc};
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, read_calendar, unfold},
};

/// Parse a task document into an Item.
///
/// Only the first VTODO is read. Ids, the project and label ids are left for
/// the store to fill in.
pub fn parse_todo(content: &str) -> DavResult<Item> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| DavError::Parse(e.to_string()))?;
    let vtodo = calendar
        .components
        .iter()
        .find(|c| c.name == "VTODO")
        .ok_or_else(|| DavError::Parse("document has no VTODO component".into()))?;

    // Required fields
    let uid = vtodo
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .filter(|uid| !uid.trim().is_empty())
        .ok_or_else(|| DavError::Parse("VTODO has no UID".into()))?;

    let title = text_prop(vtodo, "SUMMARY").unwrap_or_default();
    let description = text_prop(vtodo, "DESCRIPTION").unwrap_or_default();

    let done = vtodo
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref().eq_ignore_ascii_case("COMPLETED"));
    let done_at = if done {
        datetime_prop(vtodo, "COMPLETED")
    } else {
        None
    };

    let due_date = datetime_prop(vtodo, "DUE");
    let start_date = datetime_prop(vtodo, "DTSTART");
    let end_date = datetime_prop(vtodo, "DTEND").or_else(|| {
        let duration = vtodo.find_prop("DURATION")?.val.to_string();
        let start = start_date?;
        Some(start + parse_duration(&duration)?)
    });

    let priority = vtodo
        .find_prop("PRIORITY")
        .and_then(|p| p.val.as_ref().trim().parse::<u8>().ok())
        .map(priority_from_ics)
        .unwrap_or(0);

    let percent_done = vtodo
        .find_prop("PERCENT-COMPLETE")
        .and_then(|p| p.val.as_ref().trim().parse::<f64>().ok())
        .map(|p| (p / 100.0).clamp(0.0, 1.0))
        .unwrap_or(0.0);

    let created = datetime_prop(vtodo, "CREATED").unwrap_or_default();
    let updated = datetime_prop(vtodo, "LAST-MODIFIED")
        .or_else(|| datetime_prop(vtodo, "DTSTAMP"))
        .unwrap_or_default();

    // CATEGORIES may repeat and each may hold a comma-separated list
    let labels: Vec<Label> = vtodo
        .properties
        .iter()
        .filter(|p| p.name == "CATEGORIES")
        .flat_map(|p| split_text_list(p.val.as_ref()))
        .filter(|title| !title.is_empty())
        .map(|title| Label::titled(&title))
        .collect();

    let reminders: Vec<Reminder> = vtodo
        .components
        .iter()
        .filter(|c| c.name == "VALARM")
        .filter_map(|alarm| {
            let trigger = alarm.find_prop("TRIGGER")?.val.as_ref();
            let minutes = parse_trigger_minutes(trigger)?;
            Some(Reminder { minutes })
        })
        .collect();

    Ok(Item {
        uid,
        title,
        description,
        done,
        done_at,
        due_date,
        start_date,
        end_date,
        priority,
        percent_done,
        created,
        updated,
        labels,
        reminders,
        ..Default::default()
    })
}

fn text_prop(component: &Component, name: &str) -> Option<String> {
    component
        .find_prop(name)
        .map(|p| unescape_text(p.val.as_ref()))
}

fn datetime_prop(component: &Component, name: &str) -> Option<DateTime<Utc>> {
    let prop = component.find_prop(name)?;
    to_utc(DatePerhapsTime::try_from(prop).ok()?)
}

/// Convert icalendar's DatePerhapsTime to UTC. Floating and date-only values
/// are taken as UTC; zoned values go through the IANA database.
fn to_utc(dpt: DatePerhapsTime) -> Option<DateTime<Utc>> {
    match dpt {
        DatePerhapsTime::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => Some(dt),
            CalendarDateTime::Floating(naive) => Some(naive.and_utc()),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                match tzid.parse::<chrono_tz::Tz>() {
                    Ok(tz) => tz
                        .from_local_datetime(&date_time)
                        .earliest()
                        .map(|dt| dt.with_timezone(&Utc)),
                    Err(_) => Some(date_time.and_utc()),
                }
            }
        },
    }
}

/// Map RFC 5545 priorities (1 highest, 9 lowest, 0 undefined) onto 0-5.
fn priority_from_ics(priority: u8) -> u8 {
    match priority {
        1 => 5,
        2 => 4,
        3 | 4 => 3,
        5 => 2,
        6..=9 => 1,
        _ => 0,
    }
}

fn parse_duration(value: &str) -> Option<chrono::Duration> {
    let duration = iso8601::duration(value.trim()).ok()?;
    let std_duration: std::time::Duration = duration.into();
    chrono::Duration::from_std(std_duration).ok()
}

/// Parse TRIGGER value to minutes before the due date (-PT30M, -P1D, etc.)
fn parse_trigger_minutes(value: &str) -> Option<i64> {
    let is_before = value.starts_with('-');
    let duration_str = value.trim_start_matches(['-', '+']);

    let duration = iso8601::duration(duration_str).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let minutes = (std_duration.as_secs() / 60) as i64;

    Some(if is_before { minutes } else { -minutes })
}

/// Undo RFC 5545 TEXT escaping.
fn unescape_text(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => result.push('\n'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }
    result
}

/// Split a comma-separated TEXT list, honouring escaped commas.
fn split_text_list(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            parts.push(unescape_text(current.trim()));
            current.clear();
        } else {
            current.push(c);
        }
    }
    parts.push(unescape_text(current.trim()));
    parts
}
