//! The daily batch: reminders, recurrence, deletion notices and media
//! purge.
//!
//! Every stage is idempotent, so an external scheduler may call it as
//! often as it likes. The `*_at` variants take the current instant
//! explicitly; the plain variants use the wall clock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::{Calendar, JobStage};
use crate::domain::media::rebased_key;
use crate::domain::{Event, EventMedia, MediaId, ReminderLog, ReminderStatus, User, UserId};
use crate::error::AppError;
use crate::mail::{Mailer, RetryPolicy, send_with_retry, templates};
use crate::persistence::{EventFilter, Store};
use crate::storage::ObjectStorage;

/// Outcome of the reminder stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReminderReport {
    /// Events whose reminder day is today.
    pub due: usize,
    /// Reminders delivered.
    pub sent: usize,
    /// Reminders that failed after retries.
    pub failed: usize,
    /// Owners with email notifications turned off.
    pub skipped: usize,
}

/// Outcome of the recurrence stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RecurrenceReport {
    /// Past recurring events examined.
    pub examined: usize,
    /// Next-year copies created.
    pub created: usize,
    /// Copies not created because one already existed.
    pub duplicates: usize,
    /// Media objects copied to new events.
    pub media_copied: usize,
    /// Media objects that could not be copied.
    pub media_failed: usize,
}

/// Outcome of the deletion-notice stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeletionNoticeReport {
    /// Past events with media and no notice yet.
    pub candidates: usize,
    /// Owners warned and events scheduled for purge.
    pub notified: usize,
    /// Warnings that could not be delivered.
    pub failed: usize,
}

/// Outcome of the media purge stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct MediaCleanupReport {
    /// Events due for purge.
    pub events: usize,
    /// Media objects removed.
    pub removed: usize,
    /// Media objects kept because storage removal failed.
    pub failed: usize,
    /// Events whose schedule was cleared after a complete purge.
    pub completed: usize,
}

/// Outcome of running every stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RunAllReport {
    /// Reminder stage.
    pub reminders: ReminderReport,
    /// Recurrence stage.
    pub recurring: RecurrenceReport,
    /// Deletion-notice stage.
    pub deletion_notices: DeletionNoticeReport,
    /// Media purge stage.
    pub media_cleanup: MediaCleanupReport,
}

/// Report of whichever stage ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum JobReport {
    /// [`JobStage::Reminders`].
    Reminders(ReminderReport),
    /// [`JobStage::Recurring`].
    Recurring(RecurrenceReport),
    /// [`JobStage::DeletionNotices`].
    DeletionNotices(DeletionNoticeReport),
    /// [`JobStage::MediaCleanup`].
    MediaCleanup(MediaCleanupReport),
    /// [`JobStage::All`].
    All(RunAllReport),
}

/// Runs the batch stages.
#[derive(Debug, Clone)]
pub struct JobService {
    store: Arc<dyn Store>,
    storage: Arc<dyn ObjectStorage>,
    mailer: Arc<dyn Mailer>,
    retry: RetryPolicy,
    calendar: Calendar,
    media_retention: Duration,
}

impl JobService {
    /// Creates a new `JobService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn Mailer>,
        retry: RetryPolicy,
        calendar: Calendar,
        media_retention: Duration,
    ) -> Self {
        Self {
            store,
            storage,
            mailer,
            retry,
            calendar,
            media_retention,
        }
    }

    /// Runs one stage, or all of them, now.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] when the store cannot be queried.
    pub async fn run(&self, stage: JobStage) -> Result<JobReport, AppError> {
        self.run_at(stage, Utc::now()).await
    }

    /// Runs one stage, or all of them, as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] when the store cannot be queried.
    pub async fn run_at(&self, stage: JobStage, now: DateTime<Utc>) -> Result<JobReport, AppError> {
        tracing::info!(stage = stage.as_str(), "job stage started");
        let report = match stage {
            JobStage::Reminders => JobReport::Reminders(self.send_reminders_at(now).await?),
            JobStage::Recurring => JobReport::Recurring(self.regenerate_recurring_at(now).await?),
            JobStage::DeletionNotices => {
                JobReport::DeletionNotices(self.notify_deletions_at(now).await?)
            }
            JobStage::MediaCleanup => JobReport::MediaCleanup(self.purge_media_at(now).await?),
            JobStage::All => JobReport::All(self.run_all_at(now).await?),
        };
        tracing::info!(stage = stage.as_str(), "job stage finished");
        Ok(report)
    }

    /// Runs every stage in order.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] when the store cannot be queried.
    pub async fn run_all_at(&self, now: DateTime<Utc>) -> Result<RunAllReport, AppError> {
        Ok(RunAllReport {
            reminders: self.send_reminders_at(now).await?,
            recurring: self.regenerate_recurring_at(now).await?,
            deletion_notices: self.notify_deletions_at(now).await?,
            media_cleanup: self.purge_media_at(now).await?,
        })
    }

    /// Sends reminders for events whose reminder day is today.
    ///
    /// The event is claimed by flipping `notified` before sending, so two
    /// concurrent runs cannot both send; a failed send releases the claim.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] when the store cannot be queried.
    pub async fn send_reminders_at(&self, now: DateTime<Utc>) -> Result<ReminderReport, AppError> {
        let today = self.calendar.date_of(now);
        let filter = EventFilter {
            archived: Some(false),
            notified: Some(false),
            date_from: Some(today),
            ..EventFilter::default()
        };
        let due: Vec<Event> = self
            .store
            .find_events(&filter)
            .await?
            .into_iter()
            .filter(|e| e.is_due_for_reminder(today))
            .collect();

        let mut report = ReminderReport {
            due: due.len(),
            ..ReminderReport::default()
        };
        let mut owners = Owners::new(self.store.as_ref());
        for event in due {
            let Some(user) = owners.get(event.user_id).await? else {
                tracing::warn!(event_id = %event.id, "event owner missing, reminder skipped");
                continue;
            };
            if !user.notification_email {
                tracing::info!(event_id = %event.id, user_id = %user.id, "email notifications off, reminder skipped");
                report.skipped += 1;
                continue;
            }
            if !self.store.compare_and_set_notified(event.id, false, true).await? {
                continue;
            }

            let message = templates::reminder(&user, &event, today);
            let log = match send_with_retry(self.mailer.as_ref(), &message, self.retry).await {
                Ok(()) => {
                    report.sent += 1;
                    tracing::info!(event_id = %event.id, to = %user.email, "reminder sent");
                    ReminderLog::new(
                        user.id,
                        event.id,
                        ReminderStatus::Success,
                        Some(message.subject),
                        Utc::now(),
                    )
                }
                Err(err) => {
                    report.failed += 1;
                    self.store
                        .compare_and_set_notified(event.id, true, false)
                        .await?;
                    ReminderLog::new(
                        user.id,
                        event.id,
                        ReminderStatus::Failed,
                        Some(err.to_string()),
                        Utc::now(),
                    )
                }
            };
            self.store.insert_reminder_log(&log).await?;
        }
        Ok(report)
    }

    /// Copies past recurring events to their next yearly date, media
    /// included, and moves the recurrence flag to the copy.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] when the store cannot be queried.
    pub async fn regenerate_recurring_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<RecurrenceReport, AppError> {
        let today = self.calendar.date_of(now);
        let filter = EventFilter {
            recurring: Some(true),
            archived: Some(false),
            date_before: Some(today),
            ..EventFilter::default()
        };
        let sources = self.store.find_events(&filter).await?;
        let mut report = RecurrenceReport {
            examined: sources.len(),
            ..RecurrenceReport::default()
        };

        for mut source in sources {
            let Some(next) = source.next_occurrence_on_or_after(today) else {
                continue;
            };
            let duplicate = EventFilter {
                name: Some(source.name.clone()),
                event_type: Some(source.event_type),
                date_from: Some(next),
                date_to: Some(next),
                ..EventFilter::for_user(source.user_id)
            };
            if self.store.find_events(&duplicate).await?.is_empty() {
                let copy = source.recurrence_copy(next, now);
                self.store.insert_event(&copy).await?;
                let (copied, failed) = self.copy_media(&source, &copy, now).await?;
                report.created += 1;
                report.media_copied += copied;
                report.media_failed += failed;
                tracing::info!(source_id = %source.id, event_id = %copy.id, date = %next, "recurring event regenerated");
            } else {
                report.duplicates += 1;
                tracing::info!(source_id = %source.id, date = %next, "next occurrence already exists");
            }
            source.is_recurring = false;
            source.updated_at = now;
            self.store.update_event(&source).await?;
        }
        Ok(report)
    }

    async fn copy_media(
        &self,
        source: &Event,
        copy: &Event,
        now: DateTime<Utc>,
    ) -> Result<(usize, usize), AppError> {
        let (mut copied, mut failed) = (0, 0);
        for media in self.store.list_media(source.id).await? {
            let key = rebased_key(copy.user_id, copy.id, &media.storage_path);
            if let Err(err) = self.storage.copy(&media.storage_path, &key).await {
                tracing::warn!(media_id = %media.id, error = %err, "media copy failed");
                failed += 1;
                continue;
            }
            let cloned = EventMedia {
                id: MediaId::new(),
                event_id: copy.id,
                url: self.storage.public_url(&key),
                storage_path: key,
                kind: media.kind,
                content_type: media.content_type,
                uploaded_at: now,
            };
            self.store.insert_media(&cloned).await?;
            copied += 1;
        }
        Ok((copied, failed))
    }

    /// Warns owners of past events with media that the media will be
    /// purged, and schedules the purge. Events are only scheduled once the
    /// warning was delivered.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] when the store cannot be queried.
    pub async fn notify_deletions_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<DeletionNoticeReport, AppError> {
        let filter = EventFilter {
            deletion_notified: Some(false),
            date_before: Some(self.calendar.date_of(now)),
            has_media: Some(true),
            ..EventFilter::default()
        };
        let candidates = self.store.find_events(&filter).await?;
        let mut report = DeletionNoticeReport {
            candidates: candidates.len(),
            ..DeletionNoticeReport::default()
        };
        let mut owners = Owners::new(self.store.as_ref());
        for mut event in candidates {
            let Some(user) = owners.get(event.user_id).await? else {
                continue;
            };
            let scheduled = now + self.media_retention;
            let message = templates::deletion_warning(&user, &event, scheduled);
            if let Err(err) = send_with_retry(self.mailer.as_ref(), &message, self.retry).await {
                tracing::warn!(event_id = %event.id, error = %err, "deletion warning not delivered");
                report.failed += 1;
                continue;
            }
            event.deletion_notified = true;
            event.deletion_scheduled = Some(scheduled);
            event.updated_at = now;
            self.store.update_event(&event).await?;
            report.notified += 1;
            tracing::info!(event_id = %event.id, %scheduled, "media scheduled for deletion");
        }
        Ok(report)
    }

    /// Removes media of events whose purge time has come. Objects that
    /// storage refuses to remove keep their rows for the next run.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] when the store cannot be queried.
    pub async fn purge_media_at(&self, now: DateTime<Utc>) -> Result<MediaCleanupReport, AppError> {
        let filter = EventFilter {
            deletion_due_by: Some(now),
            ..EventFilter::default()
        };
        let due = self.store.find_events(&filter).await?;
        let mut report = MediaCleanupReport {
            events: due.len(),
            ..MediaCleanupReport::default()
        };
        for mut event in due {
            let mut remaining = 0;
            for media in self.store.list_media(event.id).await? {
                match self
                    .storage
                    .remove(std::slice::from_ref(&media.storage_path))
                    .await
                {
                    Ok(()) => {
                        self.store.delete_media(media.id).await?;
                        report.removed += 1;
                    }
                    Err(err) => {
                        tracing::warn!(media_id = %media.id, error = %err, "media purge failed, will retry");
                        report.failed += 1;
                        remaining += 1;
                    }
                }
            }
            if remaining == 0 {
                event.deletion_scheduled = None;
                event.updated_at = now;
                self.store.update_event(&event).await?;
                report.completed += 1;
            }
        }
        Ok(report)
    }
}

/// Memoized user lookups for one stage run.
struct Owners<'a> {
    store: &'a dyn Store,
    cache: HashMap<UserId, Option<User>>,
}

impl<'a> Owners<'a> {
    fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    async fn get(&mut self, id: UserId) -> Result<Option<User>, AppError> {
        if let Some(cached) = self.cache.get(&id) {
            return Ok(cached.clone());
        }
        let user = self.store.get_user(id).await?;
        self.cache.insert(id, user.clone());
        Ok(user)
    }
}
