//! Telegram MarkdownV2 rendering of notifications.
//!
//! Every user-controlled value (container names, images, log lines) is escaped
//! before it is embedded. Text inside code spans and blocks only needs
//! backslash and backtick escaping.

use chrono::{DateTime, SecondsFormat, Utc};
use rattle_core::notification::{Notification, NotificationKind};
use rattle_core::types::ContainerIdentity;

/// Characters with special meaning in MarkdownV2 outside code entities.
const SPECIAL: [char; 19] = [
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Longest log line embedded in a message (Telegram caps messages at 4096 chars).
pub const MAX_LINE_CHARS: usize = 3000;

/// Escape text for use outside code entities.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape text for use inside `code` spans and ```pre``` blocks.
pub fn escape_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' || c == '`' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Drop replacement characters left behind by lossy UTF-8 decoding.
pub fn strip_invalid(text: &str) -> String {
    text.chars().filter(|&c| c != char::REPLACEMENT_CHARACTER).collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_owned(),
    }
}

fn code_block(text: &str) -> String {
    let cleaned = strip_invalid(text);
    format!("\n\n```\n{}\n```", escape_code(&truncate(&cleaned, MAX_LINE_CHARS)))
}

fn event_title(event_type: &str) -> String {
    match event_type {
        "error" => "🔥 *Error detected*".to_owned(),
        "critical" => "🚨 *Critical event*".to_owned(),
        "warning" => "⚠️ *Warning*".to_owned(),
        "info" => "ℹ️ *Info*".to_owned(),
        "success" => "✅ *Success*".to_owned(),
        other => format!("📣 *{}*", escape_markdown_v2(other)),
    }
}

fn timestamp(notification: &Notification) -> String {
    let at: DateTime<Utc> = notification.created_at.into();
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn meta(container: &ContainerIdentity, notification: &Notification) -> String {
    format!(
        "\n\n📦 ID: `{}`\nName: `{}`\nImage: `{}`\n\n||{}||",
        escape_code(container.short_id()),
        escape_code(&container.name),
        escape_code(&container.image),
        escape_markdown_v2(&timestamp(notification)),
    )
}

fn summary(containers: &[ContainerIdentity]) -> String {
    if containers.is_empty() {
        return "👀 *No containers to watch*".to_owned();
    }
    let mut out = format!("👀 *Watching {} containers*\n", containers.len());
    for c in containers {
        out.push_str(&format!(
            "\n• `{}` \\(`{}`\\)",
            escape_code(&c.name),
            escape_code(&c.image)
        ));
    }
    out
}

/// Render a notification as a MarkdownV2 message.
pub fn render(notification: &Notification) -> String {
    match &notification.kind {
        NotificationKind::LogEvent {
            container,
            event_type,
            line,
        } => format!(
            "{} in `{}`{}{}",
            event_title(event_type),
            escape_code(&container.name),
            code_block(line),
            meta(container, notification)
        ),
        NotificationKind::ContainerStarted { container } => format!(
            "✅ *Container started:* `{}`{}",
            escape_code(&container.name),
            meta(container, notification)
        ),
        NotificationKind::ContainerStopped { container } => format!(
            "🛑 *Container stopped:* `{}`{}",
            escape_code(&container.name),
            meta(container, notification)
        ),
        NotificationKind::ContainerStoppedWithError { container, reason } => format!(
            "🛑 *Container stopped with error:* `{}`{}{}",
            escape_code(&container.name),
            code_block(reason),
            meta(container, notification)
        ),
        NotificationKind::ProcessStarted { environment } => format!(
            "🚀 Rattle started in *{}* mode",
            escape_markdown_v2(environment)
        ),
        NotificationKind::ProcessShuttingDown => {
            format!("🛑 *Rattle is shutting down{}*", escape_markdown_v2("..."))
        }
        NotificationKind::ContainersObserved { containers } => summary(containers),
    }
}
