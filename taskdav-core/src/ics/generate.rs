//! VTODO generation.

use crate::model::Item;
use chrono::{DateTime, Utc};
use icalendar::{Alarm, Calendar, Component, EventLike, Property, Todo, Trigger};

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Generate one calendar holding a VTODO per item.
pub fn generate_ics(prodid: &str, calendar_name: Option<&str>, items: &[Item]) -> String {
    let mut cal = Calendar::new();

    for item in items {
        cal.push(build_todo(item));
    }

    let cal = cal.done();

    rewrite_header(&cal.to_string(), prodid, calendar_name)
}

fn build_todo(item: &Item) -> Todo {
    let mut todo = Todo::new();
    todo.uid(&item.uid);
    todo.summary(&item.title);

    // DTSTAMP is required; the last change is the only stable value we have
    todo.add_property("DTSTAMP", format_utc(&item.updated));
    if item.created.timestamp() > 0 {
        todo.add_property("CREATED", format_utc(&item.created));
    }
    todo.add_property("LAST-MODIFIED", format_utc(&item.updated));

    if !item.description.is_empty() {
        todo.description(&item.description);
    }

    if item.done {
        todo.add_property("STATUS", "COMPLETED");
        if let Some(done_at) = item.done_at {
            todo.add_property("COMPLETED", format_utc(&done_at));
        }
    }

    if let Some(due) = item.due_date {
        todo.add_property("DUE", format_utc(&due));
    }
    if let Some(start) = item.start_date {
        todo.add_property("DTSTART", format_utc(&start));
    }
    if let Some(end) = item.end_date {
        todo.add_property("DTEND", format_utc(&end));
    }

    if let Some(priority) = priority_to_ics(item.priority) {
        todo.add_property("PRIORITY", priority.to_string());
    }

    if item.percent_done > 0.0 {
        let percent = (item.percent_done.clamp(0.0, 1.0) * 100.0).round() as u8;
        todo.add_property("PERCENT-COMPLETE", percent.to_string());
    }

    for label in &item.labels {
        todo.append_multi_property(Property::new("CATEGORIES", &label.title));
    }

    for reminder in &item.reminders {
        let trigger = if reminder.minutes >= 0 {
            Trigger::before_end(chrono::Duration::minutes(reminder.minutes))
        } else {
            Trigger::after_end(chrono::Duration::minutes(-reminder.minutes))
        };
        todo.alarm(Alarm::display(&item.title, trigger));
    }

    todo.done()
}

/// Map 0 (unset) and 1 (low) to 5 (do now) onto the RFC 5545 1-9 scale.
fn priority_to_ics(priority: u8) -> Option<u8> {
    match priority {
        0 => None,
        1 => Some(9),
        2 => Some(5),
        3 => Some(3),
        4 => Some(2),
        _ => Some(1),
    }
}

fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Clean up the icalendar crate's header:
/// - Replace PRODID with ours and add the publishing headers after it
/// - Remove CALSCALE:GREGORIAN (it's the default)
/// - Remove DTSTAMP and UID inside VALARM sections (not required by RFC 5545)
fn rewrite_header(ics: &str, prodid: &str, calendar_name: Option<&str>) -> String {
    let mut result = String::with_capacity(ics.len() + 128);
    let mut in_valarm = false;

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str(&format!("PRODID:{}\r\n", prodid));
            result.push_str("METHOD:PUBLISH\r\n");
            result.push_str("X-PUBLISHED-TTL:PT4H\r\n");
            if let Some(name) = calendar_name {
                result.push_str(&format!("X-WR-CALNAME:{}\r\n", single_line(name)));
            }
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        if line == "BEGIN:VALARM" {
            in_valarm = true;
        } else if line == "END:VALARM" {
            in_valarm = false;
        }

        if in_valarm && (line.starts_with("DTSTAMP:") || line.starts_with("UID:")) {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Label, Reminder};
    use chrono::TimeZone;

    fn make_test_item() -> Item {
        let mut item = Item::new("task-123@taskdav", "Water the plants");
        item.id = 4;
        item.collection_id = 2;
        item.updated = Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap();
        item
    }

    #[test]
    fn test_generate_ics_headers() {
        let ics = generate_ics("-//acme//EN", Some("Garden"), &[make_test_item()]);

        assert!(ics.contains("PRODID:-//acme//EN\r\n"), "ICS:\n{}", ics);
        assert!(ics.contains("METHOD:PUBLISH\r\n"));
        assert!(ics.contains("X-WR-CALNAME:Garden\r\n"));
        assert!(!ics.contains("CALSCALE"));
        assert!(ics.contains("BEGIN:VTODO"));
        assert!(ics.contains("UID:task-123@taskdav"));
        assert!(ics.contains("DTSTAMP:20250320T150000Z"));
        assert!(ics.contains("LAST-MODIFIED:20250320T150000Z"));
    }

    #[test]
    fn test_generate_ics_one_vtodo_per_item() {
        let mut second = make_test_item();
        second.uid = "task-456@taskdav".to_string();

        let ics = generate_ics("-//taskdav//EN", None, &[make_test_item(), second]);

        assert_eq!(ics.matches("BEGIN:VTODO").count(), 2);
        assert!(!ics.contains("X-WR-CALNAME"));
    }

    #[test]
    fn test_generate_ics_completed_task() {
        let mut item = make_test_item();
        item.done = true;
        item.done_at = Some(Utc.with_ymd_and_hms(2025, 3, 21, 8, 30, 0).unwrap());
        item.priority = 5;
        item.percent_done = 0.5;

        let ics = generate_ics("-//taskdav//EN", None, &[item]);

        assert!(ics.contains("STATUS:COMPLETED"));
        assert!(ics.contains("COMPLETED:20250321T083000Z"));
        assert!(ics.contains("PRIORITY:1"));
        assert!(ics.contains("PERCENT-COMPLETE:50"));
    }

    #[test]
    fn test_generate_ics_category_per_label() {
        let mut item = make_test_item();
        item.labels = vec![Label::titled("home"), Label::titled("weekly")];

        let ics = generate_ics("-//taskdav//EN", None, &[item]);

        let categories = ics.lines().filter(|l| l.starts_with("CATEGORIES")).count();
        assert_eq!(categories, 2, "ICS:\n{}", ics);
    }

    #[test]
    fn test_generate_ics_alarm_is_minimal() {
        let mut item = make_test_item();
        item.due_date = Some(Utc.with_ymd_and_hms(2025, 3, 22, 9, 0, 0).unwrap());
        item.reminders = vec![Reminder { minutes: 15 }];

        let ics = generate_ics("-//taskdav//EN", None, &[item]);

        let valarm_section: String = ics
            .split("BEGIN:VALARM")
            .nth(1)
            .unwrap()
            .split("END:VALARM")
            .next()
            .unwrap()
            .to_string();
        assert!(valarm_section.contains("TRIGGER"));
        assert!(!valarm_section.contains("UID:"));
        assert!(!valarm_section.contains("DTSTAMP:"));
    }

    #[test]
    fn test_priority_mapping_covers_scale() {
        assert_eq!(priority_to_ics(0), None);
        assert_eq!(priority_to_ics(1), Some(9));
        assert_eq!(priority_to_ics(3), Some(3));
        assert_eq!(priority_to_ics(5), Some(1));
    }
}
