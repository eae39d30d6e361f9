//! Message builders for every email the service sends.

use chrono::{DateTime, NaiveDate, Utc};

use super::EmailMessage;
use crate::domain::{Event, MediaKind, User};

const SIGNATURE: &str = "Thanks,\nOccasion Keeper";

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn paragraphs(text: &str) -> String {
    text.split("\n\n")
        .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
        .collect()
}

fn message(to: &str, subject: String, text: String) -> EmailMessage {
    let html = paragraphs(&text);
    EmailMessage {
        to: to.to_string(),
        subject,
        text,
        html: Some(html),
    }
}

/// Upcoming-event reminder.
#[must_use]
pub fn reminder(user: &User, event: &Event, today: NaiveDate) -> EmailMessage {
    let when = match event.days_until(today) {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {n} days"),
    };
    let subject = format!("Reminder: {} is coming up!", event.name);
    let mut text = format!(
        "Hi {},\n\n{}'s {} is {} ({}).",
        user.username,
        event.name,
        event.occasion_label(),
        when,
        event.date.format("%B %-d, %Y"),
    );
    if let Some(note) = &event.message {
        text.push_str(&format!("\n\nYour note: {note}"));
    }
    if let Some(highlights) = &event.highlights {
        text.push_str(&format!("\n\nHighlights: {highlights}"));
    }
    text.push_str("\n\n");
    text.push_str(SIGNATURE);
    message(&user.email, subject, text)
}

/// Warning that an event's media will be deleted.
#[must_use]
pub fn deletion_warning(user: &User, event: &Event, scheduled: DateTime<Utc>) -> EmailMessage {
    let subject = format!("Media for {} will be deleted soon", event.name);
    let text = format!(
        "Hi {},\n\nThe photos and audio attached to '{}' ({}) will be deleted after {}. \
         Download anything you want to keep before then.\n\n{}",
        user.username,
        event.name,
        event.date,
        scheduled.format("%Y-%m-%d %H:%M UTC"),
        SIGNATURE,
    );
    message(&user.email, subject, text)
}

/// Notice that a media file was removed from a past event.
#[must_use]
pub fn media_removed(user: &User, event: &Event, kind: MediaKind) -> EmailMessage {
    let subject = format!("Media Removed from Past Event: {}", event.name);
    let text = format!(
        "Hi {},\n\nMedia ({kind}) was removed from your past event '{}' dated {}.\n\n{}",
        user.username, event.name, event.date, SIGNATURE,
    );
    message(&user.email, subject, text)
}

/// Six-digit email verification code.
#[must_use]
pub fn verification_code(user: &User, code: &str) -> EmailMessage {
    let text = format!(
        "Hi {},\n\nYour verification code is: {code}\n\nThe code expires in 10 minutes.\n\n{}",
        user.username, SIGNATURE,
    );
    message(&user.email, "Verify Your Email Address".to_string(), text)
}

/// A greeting card share link sent to a recipient.
#[must_use]
pub fn share_link(
    to: &str,
    sender: &User,
    event: &Event,
    url: &str,
    expires_at: DateTime<Utc>,
) -> EmailMessage {
    let subject = format!("{} shared a celebration card with you", sender.username);
    let text = format!(
        "Hello,\n\n{} made a card for {}'s {}. Open it here:\n{url}\n\n\
         The link works until {}.\n\n{}",
        sender.username,
        event.name,
        event.occasion_label(),
        expires_at.format("%Y-%m-%d %H:%M UTC"),
        SIGNATURE,
    );
    message(to, subject, text)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{EventDraft, EventType};

    fn fixtures() -> (User, Event) {
        let now = Utc::now();
        let user = User::new(
            "asha".to_string(),
            "asha@example.com".to_string(),
            "hash".to_string(),
            now,
        );
        let Some(date) = NaiveDate::from_ymd_opt(2026, 5, 10) else {
            panic!("bad date");
        };
        let draft = EventDraft {
            name: "Ravi <3".to_string(),
            event_type: EventType::Birthday,
            date,
            remind_days_before: 1,
            message: Some("Buy cake".to_string()),
            custom_label: None,
            cultural_theme: false,
            highlights: None,
            is_recurring: None,
        };
        let Ok(draft) = draft.validate(date, false) else {
            panic!("valid draft");
        };
        let event = Event::from_draft(user.id, draft, now);
        (user, event)
    }

    #[test]
    fn reminder_mentions_name_and_timing() {
        let (user, event) = fixtures();
        let Some(today) = NaiveDate::from_ymd_opt(2026, 5, 9) else {
            panic!("bad date");
        };
        let msg = reminder(&user, &event, today);
        assert_eq!(msg.to, "asha@example.com");
        assert_eq!(msg.subject, "Reminder: Ravi <3 is coming up!");
        assert!(msg.text.contains("Birthday is tomorrow"));
        assert!(msg.text.contains("Buy cake"));
        let Some(html) = msg.html else {
            panic!("html body missing");
        };
        assert!(html.contains("Ravi &lt;3"));
    }

    #[test]
    fn verification_code_is_in_body() {
        let (user, _) = fixtures();
        let msg = verification_code(&user, "042137");
        assert_eq!(msg.subject, "Verify Your Email Address");
        assert!(msg.text.contains("042137"));
    }

    #[test]
    fn media_removed_names_kind() {
        let (user, event) = fixtures();
        let msg = media_removed(&user, &event, MediaKind::Audio);
        assert!(msg.text.contains("Media (audio)"));
    }
}
