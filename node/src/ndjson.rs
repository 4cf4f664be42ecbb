//! Newline-delimited JSON event feed.
//!
//! Each line is one [`LedgerEvent`]. Without `follow` the file is a finite
//! replay; with `follow` the reader keeps polling for appended lines the way
//! `tail -f` does. Blank lines are ignored and malformed lines are logged
//! and skipped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use agora_types::{StreamName, SyncCursor};

use crate::ledger_event::LedgerEvent;
use crate::service::EventSource;
use crate::NodeError;

/// Events buffered between the reader task and the pump.
pub const CHANNEL_CAPACITY: usize = 1024;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct NdjsonFileSource {
    path: PathBuf,
    follow: bool,
    poll_interval: Duration,
}

impl NdjsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            follow: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl EventSource for NdjsonFileSource {
    async fn subscribe(
        &self,
        cursors: Vec<SyncCursor>,
    ) -> Result<mpsc::Receiver<LedgerEvent>, NodeError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| NodeError::Source(format!("{}: {e}", self.path.display())))?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let feed = Feed {
            positions: cursors.into_iter().map(|c| (c.stream, c.sequence)).collect(),
            follow: self.follow,
            poll_interval: self.poll_interval,
        };
        tracing::info!(path = %self.path.display(), follow = self.follow, "reading event feed");
        tokio::spawn(feed.run(BufReader::new(file), tx));
        Ok(rx)
    }

    fn is_finite(&self) -> bool {
        !self.follow
    }
}

/// Parse one feed line. `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<LedgerEvent>, NodeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let event: LedgerEvent =
        serde_json::from_str(trimmed).map_err(|e| NodeError::InvalidEvent(e.to_string()))?;
    if event.stream.as_str().is_empty() {
        return Err(NodeError::InvalidEvent("empty stream name".into()));
    }
    Ok(Some(event))
}

struct Feed {
    positions: HashMap<StreamName, u64>,
    follow: bool,
    poll_interval: Duration,
}

impl Feed {
    fn already_applied(&self, event: &LedgerEvent) -> bool {
        self.positions
            .get(&event.stream)
            .is_some_and(|applied| event.sequence <= *applied)
    }

    async fn run<R>(self, mut reader: R, tx: mpsc::Sender<LedgerEvent>)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        let mut line_no: u64 = 0;
        loop {
            let read = match reader.read_line(&mut line).await {
                Ok(read) => read,
                Err(e) => {
                    tracing::warn!(error = %e, "event feed read failed");
                    return;
                }
            };
            let at_eof = read == 0 || !line.ends_with('\n');
            if at_eof && self.follow {
                // Keep a partial line until the writer finishes it.
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => continue,
                    _ = tx.closed() => return,
                }
            }
            if read == 0 && line.is_empty() {
                return;
            }

            line_no += 1;
            match parse_line(&line) {
                Ok(Some(event)) if self.already_applied(&event) => {}
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(line = line_no, error = %e, "skipping malformed event"),
            }
            line.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn line(stream: &str, sequence: u64) -> String {
        format!(
            r#"{{"stream":"{stream}","sequence":{sequence},"height":1,"timestamp":1,"proposal_id":1,"actor":"0x{}","kind":{{"type":"proposal_tallied"}}}}"#,
            "02".repeat(20)
        )
    }

    async fn collect(mut rx: mpsc::Receiver<LedgerEvent>) -> Vec<(String, u64)> {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push((event.stream.to_string(), event.sequence));
        }
        out
    }

    #[test]
    fn blank_line_is_not_an_event() {
        assert!(parse_line("   \n").unwrap().is_none());
    }

    #[test]
    fn malformed_line_is_invalid_event() {
        assert!(matches!(parse_line("{not json"), Err(NodeError::InvalidEvent(_))));
    }

    #[test]
    fn empty_stream_name_is_rejected() {
        let raw = line("", 1);
        assert!(matches!(parse_line(&raw), Err(NodeError::InvalidEvent(_))));
    }

    #[tokio::test]
    async fn feed_skips_applied_and_malformed_lines() {
        let text = format!(
            "{}\n\ngarbage\n{}\n{}",
            line("votes", 1),
            line("votes", 2),
            line("reveals", 1)
        );
        let feed = Feed {
            positions: HashMap::from([(StreamName::new("votes").unwrap(), 1)]),
            follow: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        };
        let (tx, rx) = mpsc::channel(16);
        feed.run(BufReader::new(text.as_bytes()), tx).await;

        assert_eq!(
            collect(rx).await,
            vec![("votes".to_string(), 2), ("reveals".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn file_source_replays_from_cursors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", line("votes", 1)).unwrap();
        writeln!(file, "{}", line("votes", 2)).unwrap();
        writeln!(file, "{}", line("votes", 3)).unwrap();
        file.flush().unwrap();

        let source = NdjsonFileSource::new(file.path());
        assert!(source.is_finite());
        let cursors = vec![SyncCursor {
            stream: StreamName::new("votes").unwrap(),
            sequence: 2,
        }];
        let rx = source.subscribe(cursors).await.unwrap();

        assert_eq!(collect(rx).await, vec![("votes".to_string(), 3)]);
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let source = NdjsonFileSource::new("/nonexistent/events.ndjson");
        let result = source.subscribe(Vec::new()).await;
        assert!(matches!(result, Err(NodeError::Source(_))));
    }

    #[tokio::test]
    async fn follow_mode_picks_up_appended_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", line("votes", 1)).unwrap();
        file.flush().unwrap();

        let source = NdjsonFileSource::new(file.path())
            .follow(true)
            .poll_interval(Duration::from_millis(10));
        assert!(!source.is_finite());
        let mut rx = source.subscribe(Vec::new()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.sequence, 1);

        writeln!(file, "{}", line("votes", 2)).unwrap();
        file.flush().unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.sequence, 2);
    }
}
