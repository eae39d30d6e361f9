//! Per-user statistics over events, reminders, media and imports.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::Calendar;
use super::event_service::csv_error;
use crate::domain::{EventType, MediaKind, ReminderStatus, User, ValidationError};
use crate::error::AppError;
use crate::persistence::{EventFilter, Store};

/// Optional inclusive date range applied to every section.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    /// First day included.
    pub from: Option<NaiveDate>,
    /// Last day included.
    pub to: Option<NaiveDate>,
}

impl DateRange {
    fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|f| date >= f) && self.to.is_none_or(|t| date <= t)
    }
}

/// Count for one event type.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TypeCount {
    /// Event type.
    pub event_type: EventType,
    /// Number of events.
    pub count: usize,
}

/// Count for one media kind.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct KindCount {
    /// Media kind.
    pub kind: MediaKind,
    /// Number of objects.
    pub count: usize,
}

/// Event section.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventStats {
    /// All events in range.
    pub total: usize,
    /// Per type, every type listed.
    pub by_type: Vec<TypeCount>,
    /// Dated today or later.
    pub upcoming: usize,
    /// Dated before today.
    pub past: usize,
}

/// Reminder section.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReminderStats {
    /// All attempts.
    pub total: usize,
    /// Delivered.
    pub success: usize,
    /// Failed after retries.
    pub failed: usize,
}

/// Media section.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MediaStats {
    /// All objects.
    pub total: usize,
    /// Per kind, every kind listed.
    pub by_kind: Vec<KindCount>,
}

/// Import section.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ImportStats {
    /// Import runs.
    pub runs: usize,
    /// Rows committed across runs.
    pub rows_imported: i64,
    /// Rows rejected across runs.
    pub rows_failed: i64,
}

/// Everything the analytics page shows.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Analytics {
    /// Event counts.
    pub events: EventStats,
    /// Reminder counts.
    pub reminders: ReminderStats,
    /// Media counts.
    pub media: MediaStats,
    /// Import counts.
    pub imports: ImportStats,
}

/// Computes [`Analytics`] and its CSV rendering.
#[derive(Debug, Clone)]
pub struct AnalyticsService {
    store: Arc<dyn Store>,
    calendar: Calendar,
}

impl AnalyticsService {
    /// Creates a new `AnalyticsService`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, calendar: Calendar) -> Self {
        Self { store, calendar }
    }

    /// Statistics for `user`, limited to `range`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] for an inverted range.
    pub async fn stats(&self, user: &User, range: DateRange) -> Result<Analytics, AppError> {
        if let (Some(from), Some(to)) = (range.from, range.to)
            && from > to
        {
            return Err(ValidationError::new("from", "start date is after end date").into());
        }
        let today = self.calendar.today();
        let in_range = |at: DateTime<Utc>| range.contains(self.calendar.date_of(at));

        let filter = EventFilter {
            date_from: range.from,
            date_to: range.to,
            ..EventFilter::for_user(user.id)
        };
        let events = self.store.find_events(&filter).await?;
        let upcoming = events.iter().filter(|e| e.date >= today).count();
        let events = EventStats {
            total: events.len(),
            by_type: EventType::ALL
                .into_iter()
                .map(|t| TypeCount {
                    event_type: t,
                    count: events.iter().filter(|e| e.event_type == t).count(),
                })
                .collect(),
            upcoming,
            past: events.len() - upcoming,
        };

        let logs: Vec<_> = self
            .store
            .list_reminder_logs(user.id)
            .await?
            .into_iter()
            .filter(|l| in_range(l.timestamp))
            .collect();
        let success = logs
            .iter()
            .filter(|l| l.status == ReminderStatus::Success)
            .count();
        let reminders = ReminderStats {
            total: logs.len(),
            success,
            failed: logs.len() - success,
        };

        let media: Vec<_> = self
            .store
            .list_media_for_user(user.id)
            .await?
            .into_iter()
            .filter(|m| in_range(m.uploaded_at))
            .collect();
        let media = MediaStats {
            total: media.len(),
            by_kind: [MediaKind::Image, MediaKind::Audio]
                .into_iter()
                .map(|k| KindCount {
                    kind: k,
                    count: media.iter().filter(|m| m.kind == k).count(),
                })
                .collect(),
        };

        let runs: Vec<_> = self
            .store
            .list_import_logs(user.id)
            .await?
            .into_iter()
            .filter(|l| in_range(l.imported_at))
            .collect();
        let imports = ImportStats {
            runs: runs.len(),
            rows_imported: runs.iter().map(|l| i64::from(l.success_count)).sum(),
            rows_failed: runs.iter().map(|l| i64::from(l.failure_count)).sum(),
        };

        Ok(Analytics {
            events,
            reminders,
            media,
            imports,
        })
    }

    /// The same statistics as `Section,Metric,Value` CSV.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if the CSV cannot be written.
    pub async fn report_csv(&self, user: &User, range: DateRange) -> Result<String, AppError> {
        let a = self.stats(user, range).await?;
        let mut rows: Vec<(&str, String, String)> = Vec::new();

        rows.push(("Events", "Total Events".into(), a.events.total.to_string()));
        for t in &a.events.by_type {
            rows.push((
                "Events",
                format!("{} Count", t.event_type.display_name()),
                t.count.to_string(),
            ));
        }
        rows.push(("Events", "Upcoming Events".into(), a.events.upcoming.to_string()));
        rows.push(("Events", "Past Events".into(), a.events.past.to_string()));

        rows.push(("Reminders", "Total Reminders".into(), a.reminders.total.to_string()));
        rows.push(("Reminders", "Successful Reminders".into(), a.reminders.success.to_string()));
        rows.push(("Reminders", "Failed Reminders".into(), a.reminders.failed.to_string()));

        rows.push(("Media", "Total Media".into(), a.media.total.to_string()));
        for k in &a.media.by_kind {
            let kind = match k.kind {
                MediaKind::Image => "Image",
                MediaKind::Audio => "Audio",
            };
            rows.push(("Media", format!("{kind} Count"), k.count.to_string()));
        }

        rows.push(("Imports", "Total Imports".into(), a.imports.runs.to_string()));
        rows.push(("Imports", "Successful Imports".into(), a.imports.rows_imported.to_string()));
        rows.push(("Imports", "Failed Imports".into(), a.imports.rows_failed.to_string()));

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["Section", "Metric", "Value"])
            .map_err(csv_error)?;
        for (section, metric, value) in &rows {
            writer
                .write_record([*section, metric.as_str(), value.as_str()])
                .map_err(csv_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::Internal(format!("csv flush failed: {e}")))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Event, EventDraft, EventId, ImportLog, ReminderLog};
    use crate::persistence::memory::MemoryStore;
    use chrono::Duration;

    async fn seeded() -> (AnalyticsService, User) {
        let store = Arc::new(MemoryStore::new());
        let calendar = Calendar::default();
        let today = calendar.today();
        let now = Utc::now();
        let user = User::new(
            "asha".to_string(),
            "asha@example.com".to_string(),
            "hash".to_string(),
            now,
        );
        for (name, event_type, offset) in [
            ("Ravi", EventType::Birthday, 5),
            ("Meera", EventType::Birthday, -5),
            ("Wedding", EventType::Anniversary, 40),
        ] {
            let draft = EventDraft {
                name: name.to_string(),
                event_type,
                date: today + Duration::days(offset),
                remind_days_before: 1,
                message: None,
                custom_label: None,
                cultural_theme: false,
                highlights: None,
                is_recurring: None,
            };
            let _ = store.insert_event(&Event::from_draft(user.id, draft, now)).await;
        }
        let event_id = EventId::new();
        for status in [ReminderStatus::Success, ReminderStatus::Success, ReminderStatus::Failed] {
            let _ = store
                .insert_reminder_log(&ReminderLog::new(user.id, event_id, status, None, now))
                .await;
        }
        let _ = store
            .insert_import_log(&ImportLog {
                id: uuid::Uuid::new_v4(),
                user_id: user.id,
                file_name: "e.csv".to_string(),
                imported_at: now,
                success_count: 4,
                failure_count: 1,
                errors: vec!["Row 3: bad".to_string()],
            })
            .await;
        (AnalyticsService::new(store, calendar), user)
    }

    #[tokio::test]
    async fn counts_each_section() {
        let (analytics, user) = seeded().await;
        let Ok(a) = analytics.stats(&user, DateRange::default()).await else {
            panic!("stats failed");
        };
        assert_eq!(a.events.total, 3);
        assert_eq!(a.events.upcoming, 2);
        assert_eq!(a.events.past, 1);
        assert!(a
            .events
            .by_type
            .iter()
            .any(|t| t.event_type == EventType::Birthday && t.count == 2));
        assert_eq!(a.events.by_type.len(), EventType::ALL.len());
        assert_eq!((a.reminders.success, a.reminders.failed), (2, 1));
        assert_eq!((a.imports.runs, a.imports.rows_imported, a.imports.rows_failed), (1, 4, 1));
    }

    #[tokio::test]
    async fn range_limits_events() {
        let (analytics, user) = seeded().await;
        let today = Calendar::default().today();
        let range = DateRange {
            from: Some(today),
            to: Some(today + Duration::days(10)),
        };
        let Ok(a) = analytics.stats(&user, range).await else {
            panic!("stats failed");
        };
        assert_eq!(a.events.total, 1);
        let inverted = DateRange {
            from: range.to,
            to: range.from,
        };
        assert!(analytics.stats(&user, inverted).await.is_err());
    }

    #[tokio::test]
    async fn csv_report_layout() {
        let (analytics, user) = seeded().await;
        let Ok(csv) = analytics.report_csv(&user, DateRange::default()).await else {
            panic!("report failed");
        };
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.first().copied(), Some("Section,Metric,Value"));
        assert_eq!(lines.get(1).copied(), Some("Events,Total Events,3"));
        assert!(lines.contains(&"Events,Raksha Bandhan Count,0"));
        assert!(lines.contains(&"Reminders,Failed Reminders,1"));
        assert_eq!(lines.last().copied(), Some("Imports,Failed Imports,1"));
    }
}
