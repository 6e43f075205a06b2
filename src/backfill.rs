//! # Backfill Replay
//!
//! Replays channel history through the pipeline. Consecutive messages from
//! the same person posted close together are treated as one rescue (a
//! photo followed by a text list is common), and messages that already have
//! a stored record are skipped.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::images::Attachment;
use crate::pipeline::{MessageEvent, Pipeline};

/// Default gap allowed between messages of one group
pub const DEFAULT_GROUP_WINDOW_MINUTES: i64 = 30;

/// One message row from channel history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalMessage {
    pub ts: String,
    pub channel: Option<String>,
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub files: Vec<Attachment>,
    pub posted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// `<ts>: <error>` per failed group
    pub errors: Vec<String>,
}

/// Group consecutive messages from the same user.
///
/// A message joins the current group when it has the same user and was
/// posted within `window` of the previous message. Groups take the first
/// message's timestamp; texts are joined with newlines and attachments
/// concatenated. Rows are ordered by `posted_at` first.
pub fn group_messages(mut rows: Vec<HistoricalMessage>, window: Duration) -> Vec<MessageEvent> {
    rows.sort_by_key(|row| row.posted_at);

    let mut groups: Vec<MessageEvent> = Vec::new();
    let mut last_posted: Option<DateTime<Utc>> = None;

    for row in rows {
        let joins = match (groups.last(), last_posted) {
            (Some(current), Some(previous)) => {
                current.user.is_some() && current.user == row.user && row.posted_at - previous <= window
            }
            _ => false,
        };
        last_posted = Some(row.posted_at);

        if joins {
            if let Some(current) = groups.last_mut() {
                let text = row.text.trim();
                if !text.is_empty() {
                    if !current.text.is_empty() {
                        current.text.push('\n');
                    }
                    current.text.push_str(text);
                }
                current.files.extend(row.files);
            }
            continue;
        }

        groups.push(MessageEvent {
            ts: Some(row.ts),
            channel: row.channel,
            user: row.user,
            text: row.text.trim().to_string(),
            files: row.files,
            posted_at: Some(row.posted_at),
        });
    }

    groups
}

/// Process groups one at a time, skipping those already stored
pub async fn replay(pipeline: &Pipeline, groups: &[MessageEvent]) -> BackfillReport {
    let mut report = BackfillReport::default();

    for group in groups {
        let ts = group.ts.as_deref().unwrap_or("");

        if let (Some(store), false) = (pipeline.store(), ts.is_empty()) {
            match store.is_processed(ts).await {
                Ok(true) => {
                    info!(ts, "Skipping already processed message");
                    report.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(ts, error = %e, "Could not check processed state");
                    report.failed += 1;
                    report.errors.push(format!("{ts}: {e}"));
                    continue;
                }
            }
        }

        if group.text.trim().is_empty() && group.files.is_empty() {
            report.skipped += 1;
            continue;
        }

        match pipeline.process_message(group).await {
            Ok(outcome) => match outcome.persistence_error {
                Some(error) => {
                    report.failed += 1;
                    report.errors.push(format!("{ts}: {error}"));
                }
                None => report.processed += 1,
            },
            Err(e) => {
                warn!(ts, error = %e, "Backfill message failed");
                report.failed += 1;
                report.errors.push(format!("{ts}: {e}"));
            }
        }
    }

    info!(
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        "Backfill complete"
    );
    report
}
