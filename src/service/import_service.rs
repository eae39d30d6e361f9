//! Bulk event import from CSV.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;

use super::{Calendar, Passwords};
use crate::domain::event::{DEFAULT_REMIND_DAYS_BEFORE, derive_card_password};
use crate::domain::{Event, EventDraft, EventType, ImportLog, User, ValidationError};
use crate::error::AppError;
use crate::persistence::Store;

/// Column header every import file must start with.
pub const IMPORT_HEADER: [&str; 7] = [
    "name",
    "event_type",
    "date",
    "remind_days_before",
    "message",
    "custom_label",
    "is_recurring",
];

/// Why one CSV row was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The row could not be read as CSV.
    #[error("Row {line}: malformed row: {reason}")]
    Malformed {
        /// 1-based line in the file.
        line: u64,
        /// Parser message.
        reason: String,
    },

    /// The date is not `YYYY-MM-DD`.
    #[error("Row {line}: invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate {
        /// 1-based line in the file.
        line: u64,
        /// Raw cell.
        value: String,
    },

    /// A cell could not be parsed.
    #[error("Row {line}: invalid {column} '{value}'")]
    InvalidValue {
        /// 1-based line in the file.
        line: u64,
        /// Column name.
        column: &'static str,
        /// Raw cell.
        value: String,
    },

    /// The row parsed but breaks an event rule.
    #[error("Row {line}: {source}")]
    Rule {
        /// 1-based line in the file.
        line: u64,
        /// Violated rule.
        source: ValidationError,
    },

    /// The event could not be stored.
    #[error("Row {line}: could not save event: {reason}")]
    Store {
        /// 1-based line in the file.
        line: u64,
        /// Store message.
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct ImportRow {
    name: String,
    event_type: String,
    date: String,
    #[serde(default)]
    remind_days_before: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    custom_label: Option<String>,
    #[serde(default)]
    is_recurring: Option<String>,
}

fn present(cell: Option<String>) -> Option<String> {
    cell.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

impl ImportRow {
    fn into_draft(self, line: u64) -> Result<EventDraft, ImportError> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|_| {
            ImportError::InvalidDate {
                line,
                value: self.date.clone(),
            }
        })?;
        let event_type: EventType = self.event_type.parse().map_err(|_| ImportError::InvalidValue {
            line,
            column: "event_type",
            value: self.event_type.clone(),
        })?;
        let remind_days_before = match present(self.remind_days_before) {
            Some(raw) => raw.parse().map_err(|_| ImportError::InvalidValue {
                line,
                column: "remind_days_before",
                value: raw,
            })?,
            None => DEFAULT_REMIND_DAYS_BEFORE,
        };
        let is_recurring = match present(self.is_recurring) {
            Some(raw) => Some(parse_flag(&raw).ok_or(ImportError::InvalidValue {
                line,
                column: "is_recurring",
                value: raw,
            })?),
            None => None,
        };
        Ok(EventDraft {
            name: self.name,
            event_type,
            date,
            remind_days_before,
            message: present(self.message),
            custom_label: present(self.custom_label),
            cultural_theme: false,
            highlights: None,
            is_recurring,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// The next December 25 on or after `today`, so the unedited template
/// imports cleanly.
fn template_example_date(today: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(today.year(), 12, 25)
        .filter(|d| *d >= today)
        .or_else(|| NaiveDate::from_ymd_opt(today.year() + 1, 12, 25))
        .unwrap_or(today)
}

/// CSV import and the downloadable template.
#[derive(Debug, Clone)]
pub struct ImportService {
    store: Arc<dyn Store>,
    passwords: Passwords,
    calendar: Calendar,
    max_bytes: usize,
}

impl ImportService {
    /// Creates a new `ImportService` accepting files up to `max_bytes`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        passwords: Passwords,
        calendar: Calendar,
        max_bytes: usize,
    ) -> Self {
        Self {
            store,
            passwords,
            calendar,
            max_bytes,
        }
    }

    /// Imports every valid row of a CSV file. Rejected rows do not stop
    /// the run; they are listed in the returned [`ImportLog`], which is
    /// also stored.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Validation`] when the file itself is
    /// unacceptable: wrong extension, too large, not UTF-8 CSV, or a
    /// header that does not match [`IMPORT_HEADER`].
    pub async fn import(
        &self,
        user: &User,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ImportLog, AppError> {
        if !file_name.to_ascii_lowercase().ends_with(".csv") {
            return Err(ValidationError::new("file", "only .csv files can be imported").into());
        }
        if bytes.len() > self.max_bytes {
            return Err(ValidationError::new(
                "file",
                format!("file is larger than {} bytes", self.max_bytes),
            )
            .into());
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .flexible(true)
            .from_reader(bytes);
        let headers = reader
            .headers()
            .map_err(|e| ValidationError::new("file", format!("unreadable CSV: {e}")))?
            .clone();
        let columns: Vec<String> = headers.iter().map(str::to_lowercase).collect();
        if columns != IMPORT_HEADER {
            return Err(ValidationError::new(
                "file",
                format!("header must be '{}'", IMPORT_HEADER.join(",")),
            )
            .into());
        }
        let headers = csv::StringRecord::from(columns);

        let today = self.calendar.today();
        let now = Utc::now();
        let mut success_count = 0;
        let mut errors = Vec::new();
        for record in reader.records() {
            let outcome = match record {
                Ok(record) => {
                    let line = record.position().map_or(0, csv::Position::line);
                    self.import_row(user, &headers, &record, line, today).await
                }
                Err(err) => Err(ImportError::Malformed {
                    line: err.position().map_or(0, csv::Position::line),
                    reason: err.to_string(),
                }),
            };
            match outcome {
                Ok(()) => success_count += 1,
                Err(err) => errors.push(err.to_string()),
            }
        }

        let log = ImportLog {
            id: uuid::Uuid::new_v4(),
            user_id: user.id,
            file_name: file_name.to_string(),
            imported_at: now,
            success_count,
            failure_count: i32::try_from(errors.len()).unwrap_or(i32::MAX),
            errors,
        };
        self.store.insert_import_log(&log).await?;
        tracing::info!(
            user_id = %user.id,
            file = %log.file_name,
            imported = log.success_count,
            rejected = log.failure_count,
            "csv import finished"
        );
        Ok(log)
    }

    async fn import_row(
        &self,
        user: &User,
        headers: &csv::StringRecord,
        record: &csv::StringRecord,
        line: u64,
        today: NaiveDate,
    ) -> Result<(), ImportError> {
        let row: ImportRow = record
            .deserialize(Some(headers))
            .map_err(|e| ImportError::Malformed {
                line,
                reason: e.to_string(),
            })?;
        let draft = row
            .into_draft(line)?
            .validate(today, true)
            .map_err(|source| ImportError::Rule { line, source })?;

        let mut event = Event::from_draft(user.id, draft, Utc::now());
        event.card_password_hash = self.passwords.hash(&derive_card_password(&event)).ok();
        self.store
            .insert_event(&event)
            .await
            .map_err(|e| ImportError::Store {
                line,
                reason: e.to_string(),
            })
    }

    /// A CSV template with the header and one example row.
    #[must_use]
    pub fn template(&self) -> String {
        let example = template_example_date(self.calendar.today());
        format!(
            "{}\nRavi Kumar,birthday,{example},2,Call in the morning,,true\n",
            IMPORT_HEADER.join(",")
        )
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::persistence::EventFilter;
    use crate::persistence::memory::MemoryStore;
    use chrono::Duration;

    fn service(store: &Arc<MemoryStore>, max_bytes: usize) -> ImportService {
        ImportService::new(
            Arc::clone(store) as Arc<dyn Store>,
            Passwords::low_cost(),
            Calendar::default(),
            max_bytes,
        )
    }

    fn user() -> User {
        User::new(
            "asha".to_string(),
            "asha@example.com".to_string(),
            "hash".to_string(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn valid_rows_commit_and_bad_rows_are_reported() {
        let store = Arc::new(MemoryStore::new());
        let imports = service(&store, 1024 * 1024);
        let user = user();
        let future = (Calendar::default().today() + Duration::days(30)).format("%Y-%m-%d");
        let long_label = "x".repeat(101);
        let csv = format!(
            "name,event_type,date,remind_days_before,message,custom_label,is_recurring\n\
             Ravi,birthday,{future},2,Hi,,true\n\
             Meera,anniversary,31/12/2030,1,,,\n\
             Party,other,{future},1,,{long_label},\n\
             Tara,Raksha Bandhan,{future},,,,\n"
        );

        let Ok(log) = imports.import(&user, "events.CSV", csv.as_bytes()).await else {
            panic!("import failed");
        };
        assert_eq!(log.success_count, 2);
        assert_eq!(log.failure_count, 2);
        assert!(log.errors.first().is_some_and(|e| e.starts_with("Row 3: invalid date")));
        assert!(log.errors.get(1).is_some_and(|e| e.contains("custom_label")));

        let events = store
            .find_events(&EventFilter::for_user(user.id))
            .await
            .unwrap_or_default();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.card_password_hash.is_some()));
        assert_eq!(store.list_import_logs(user.id).await.map(|l| l.len()).ok(), Some(1));
    }

    #[tokio::test]
    async fn rejects_wrong_extension_size_and_header() {
        let store = Arc::new(MemoryStore::new());
        let imports = service(&store, 64);
        let user = user();
        assert!(imports.import(&user, "events.xlsx", b"a").await.is_err());
        assert!(imports.import(&user, "big.csv", &[b'a'; 65]).await.is_err());
        assert!(matches!(
            imports.import(&user, "e.csv", b"title,date\nx,2030-01-01\n").await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(store.list_import_logs(user.id).await.map(|l| l.len()).ok(), Some(0));
    }

    #[test]
    fn template_starts_with_header() {
        let store = Arc::new(MemoryStore::new());
        let template = service(&store, 10).template();
        assert!(template.starts_with(
            "name,event_type,date,remind_days_before,message,custom_label,is_recurring\n"
        ));
        assert_eq!(template.lines().count(), 2);
    }

    #[test]
    fn template_example_date_is_never_past() {
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
        assert_eq!(template_example_date(day(2026, 6, 1)), day(2026, 12, 25));
        assert_eq!(template_example_date(day(2026, 12, 25)), day(2026, 12, 25));
        assert_eq!(template_example_date(day(2026, 12, 26)), day(2027, 12, 25));
        assert_eq!(template_example_date(day(2026, 12, 31)), day(2027, 12, 25));
    }

    #[tokio::test]
    async fn unedited_template_imports_cleanly() {
        let store = Arc::new(MemoryStore::new());
        let imports = service(&store, 1024);
        let template = imports.template();
        let Ok(log) = imports.import(&user(), "template.csv", template.as_bytes()).await else {
            panic!("template import failed");
        };
        assert_eq!(log.success_count, 1, "{:?}", log.errors);
        assert_eq!(log.failure_count, 0);
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
