use super::{CompletionSummary, NotificationEvent};

/// One event rendered for every channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub subject: String,
    pub html: String,
    pub text: String,
    pub chat: String,
}

pub fn render(event: &NotificationEvent) -> RenderedNotification {
    match event {
        NotificationEvent::SessionStarted {
            session_id,
            kind,
            dry_run,
        } => {
            let mode = mode_label(*dry_run);
            let subject = format!("{} started ({mode})", kind.label());
            let lines = vec![
                format!("Session: {session_id}"),
                format!("Mode: {mode}"),
            ];
            build(
                subject,
                &lines,
                format!(":rocket: {} started ({mode}) `{session_id}`", kind.label()),
            )
        }
        NotificationEvent::Milestone {
            session_id,
            kind,
            progress,
            phase,
        } => {
            let subject = format!("{} {progress}% complete", kind.label());
            let lines = vec![
                format!("Session: {session_id}"),
                format!("Current phase: {}", phase.label()),
                format!("Progress: {progress}%"),
            ];
            build(
                subject,
                &lines,
                format!(
                    ":hourglass_flowing_sand: {} reached {progress}% ({}) `{session_id}`",
                    kind.label(),
                    phase.label()
                ),
            )
        }
        NotificationEvent::SessionCompleted {
            session_id,
            kind,
            summary,
        } => {
            let outcome = if summary.errors == 0 {
                "completed"
            } else {
                "completed with errors"
            };
            let subject = format!(
                "{} {outcome} ({})",
                kind.label(),
                mode_label(summary.dry_run)
            );
            let mut lines = vec![format!("Session: {session_id}")];
            lines.extend(summary_lines(summary));
            let icon = if summary.errors == 0 {
                ":white_check_mark:"
            } else {
                ":warning:"
            };
            build(
                subject,
                &lines,
                format!(
                    "{icon} {} {outcome} `{session_id}`: {} publishers, {} offerings, {} relationships, {} errors",
                    kind.label(),
                    summary.publishers_created,
                    summary.offerings_created,
                    summary.relationships_created,
                    summary.errors
                ),
            )
        }
        NotificationEvent::Error {
            session_id,
            kind,
            phase,
            message,
        } => {
            let subject = format!("{} failed", kind.label());
            let phase = phase.map_or("n/a", |phase| phase.label());
            let lines = vec![
                format!("Session: {session_id}"),
                format!("Phase: {phase}"),
                format!("Error: {message}"),
            ];
            build(
                subject,
                &lines,
                format!(":x: {} failed in {phase} `{session_id}`: {message}", kind.label()),
            )
        }
    }
}

fn summary_lines(summary: &CompletionSummary) -> Vec<String> {
    vec![
        format!("Mode: {}", mode_label(summary.dry_run)),
        format!("Duration: {:.1}s", summary.duration_ms as f64 / 1000.0),
        format!("Shadow publishers created: {}", summary.publishers_created),
        format!("Offerings created: {}", summary.offerings_created),
        format!("Relationships created: {}", summary.relationships_created),
        format!("Errors: {}", summary.errors),
    ]
}

fn mode_label(dry_run: bool) -> &'static str {
    if dry_run {
        "dry run"
    } else {
        "live"
    }
}

fn build(subject: String, lines: &[String], chat: String) -> RenderedNotification {
    let mut text = format!("{subject}\n\n");
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }

    let mut html = format!("<h2>{}</h2>\n<ul>\n", escape_html(&subject));
    for line in lines {
        html.push_str(&format!("  <li>{}</li>\n", escape_html(line)));
    }
    html.push_str("</ul>\n");

    RenderedNotification {
        subject,
        html,
        text,
        chat,
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::publishers::status::{MigrationPhase, SessionId, SessionKind};

    #[test]
    fn error_message_is_escaped_in_html_only() {
        let rendered = render(&NotificationEvent::Error {
            session_id: SessionId("mig-1".to_string()),
            kind: SessionKind::PublisherMigration,
            phase: Some(MigrationPhase::Offerings),
            message: "<db> unavailable".to_string(),
        });

        assert_eq!(rendered.subject, "Publisher migration failed");
        assert!(rendered.html.contains("&lt;db&gt; unavailable"));
        assert!(rendered.text.contains("Error: <db> unavailable"));
        assert!(rendered.chat.contains("Create draft offerings"));
    }

    #[test]
    fn completion_with_errors_changes_subject() {
        let rendered = render(&NotificationEvent::SessionCompleted {
            session_id: SessionId("mig-2".to_string()),
            kind: SessionKind::PublisherMigration,
            summary: CompletionSummary {
                dry_run: true,
                duration_ms: 1500,
                publishers_created: 3,
                offerings_created: 2,
                relationships_created: 4,
                errors: 1,
            },
        });

        assert_eq!(
            rendered.subject,
            "Publisher migration completed with errors (dry run)"
        );
        assert!(rendered.text.contains("Duration: 1.5s"));
        assert!(rendered.chat.starts_with(":warning:"));
    }
}
