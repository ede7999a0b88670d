//! Newline-delimited JSON event source.
//!
//! Reads one `RawEvent` JSON object per line, for example
//!
//! ```text
//! {"source_id":"id.dana","title":"Pembayaran","body":"Anda berhasil menerima Rp50.000","observed_at_millis":1000}
//! ```
//!
//! and pushes each onto the forwarder channel. Blank lines are ignored;
//! malformed lines are logged and skipped. The source signals `Available`
//! when a reader starts and `Lost` when it stops, whether at end of input or
//! because it was torn down.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::RawEvent;
use relay_supervisor::{EventSource, SourceSignal, SupervisorError};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Boxed input stream the source reads from.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Buffered input plus a line that was only partly read when the reader
/// was cancelled.
struct LineReader {
    input: BufReader<BoxedReader>,
    pending: Vec<u8>,
}

impl LineReader {
    fn new(input: BoxedReader) -> Self {
        Self { input: BufReader::new(input), pending: Vec::new() }
    }
}

/// Opens a fresh input stream.
pub type ReaderFactory = Arc<dyn Fn() -> BoxedReader + Send + Sync>;

/// Running reader task and the token that stops it.
struct ActiveReader {
    handle: JoinHandle<Option<LineReader>>,
    token: CancellationToken,
}

/// Event source fed by newline-delimited JSON.
pub struct NdjsonSource {
    open: ReaderFactory,
    events: mpsc::Sender<RawEvent>,
    signals: mpsc::Sender<SourceSignal>,
    active: Mutex<Option<ActiveReader>>,
}

impl std::fmt::Debug for NdjsonSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdjsonSource").finish_non_exhaustive()
    }
}

impl NdjsonSource {
    /// Creates a source reading streams produced by `open`.
    pub fn new(
        open: ReaderFactory,
        events: mpsc::Sender<RawEvent>,
        signals: mpsc::Sender<SourceSignal>,
    ) -> Self {
        Self { open, events, signals, active: Mutex::new(None) }
    }

    /// Creates a source reading the process's standard input.
    pub fn stdin(events: mpsc::Sender<RawEvent>, signals: mpsc::Sender<SourceSignal>) -> Self {
        Self::new(Arc::new(|| Box::new(tokio::io::stdin()) as BoxedReader), events, signals)
    }

    /// Starts reading if no reader is running.
    pub async fn start(&self) {
        let mut active = self.active.lock().await;
        if active.is_none() {
            *active = Some(self.spawn_reader(None));
        }
    }

    /// Stops the running reader, if any.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(reader) = active.take() {
            Self::tear_down(reader).await;
        }
    }

    /// Whether a reader task is running.
    pub async fn is_reading(&self) -> bool {
        self.active.lock().await.as_ref().is_some_and(|reader| !reader.handle.is_finished())
    }

    fn spawn_reader(&self, resume: Option<LineReader>) -> ActiveReader {
        let lines = resume.unwrap_or_else(|| LineReader::new((self.open)()));
        let token = CancellationToken::new();
        let handle = tokio::spawn(read_lines(
            lines,
            self.events.clone(),
            self.signals.clone(),
            token.clone(),
        ));
        ActiveReader { handle, token }
    }

    /// Stops a reader and returns its stream if it can be resumed.
    async fn tear_down(reader: ActiveReader) -> Option<LineReader> {
        reader.token.cancel();
        match reader.handle.await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "event reader task failed");
                None
            },
        }
    }
}

#[async_trait]
impl EventSource for NdjsonSource {
    async fn resubscribe(&self) -> relay_supervisor::Result<()> {
        if self.events.is_closed() {
            return Err(SupervisorError::reconnect_failed("event channel closed"));
        }

        let mut active = self.active.lock().await;
        let resume = match active.take() {
            Some(reader) => Self::tear_down(reader).await,
            None => None,
        };
        debug!(resumed = resume.is_some(), "restarting event reader");
        *active = Some(self.spawn_reader(resume));
        Ok(())
    }
}

/// Reads until end of input, an I/O error, a closed channel, or
/// cancellation. Lines that are not UTF-8 or not a valid event are skipped.
///
/// Returns the stream when cancelled so a new reader can continue where this
/// one stopped.
async fn read_lines(
    mut lines: LineReader,
    events: mpsc::Sender<RawEvent>,
    signals: mpsc::Sender<SourceSignal>,
    token: CancellationToken,
) -> Option<LineReader> {
    let _ = signals.send(SourceSignal::Available).await;
    info!("event reader started");

    let resume = loop {
        let read = tokio::select! {
            () = token.cancelled() => break Some(lines),
            read = lines.input.read_until(b'\n', &mut lines.pending) => read,
        };

        match read {
            Ok(0) => {
                info!("event input reached end");
                break None;
            },
            Ok(_) => {},
            Err(e) => {
                warn!(error = %e, "failed to read event input");
                break None;
            },
        }

        let raw = std::mem::take(&mut lines.pending);
        let Ok(line) = std::str::from_utf8(&raw) else {
            warn!(bytes = raw.len(), "skipping event line that is not valid UTF-8");
            continue;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<RawEvent>(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "skipping malformed event line");
                continue;
            },
        };

        if events.send(event).await.is_err() {
            debug!("event channel closed, stopping reader");
            break None;
        }
    };

    let _ = signals.send(SourceSignal::Lost).await;
    info!("event reader stopped");
    resume
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::AsyncWriteExt;

    use super::*;

    fn cursor_factory(input: &'static [u8]) -> ReaderFactory {
        Arc::new(move || Box::new(Cursor::new(input)) as BoxedReader)
    }

    #[tokio::test]
    async fn reads_events_and_skips_malformed_lines() {
        let input = concat!(
            r#"{"source_id":"id.dana","title":"Pembayaran","body":"Anda berhasil menerima Rp50.000","observed_at_millis":1000}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"source_id":"com.forum_asisten","observed_at_millis":2000}"#,
            "\n",
        );
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (signal_tx, mut signal_rx) = mpsc::channel(8);
        let source = NdjsonSource::new(cursor_factory(input.as_bytes()), event_tx, signal_tx);

        source.start().await;

        let first = event_rx.recv().await.unwrap();
        assert_eq!(first.source_id, "id.dana");
        assert_eq!(first.observed_at_millis, 1000);
        let second = event_rx.recv().await.unwrap();
        assert_eq!(second.source_id, "com.forum_asisten");
        assert_eq!(second.title, None);

        assert_eq!(signal_rx.recv().await, Some(SourceSignal::Available));
        assert_eq!(signal_rx.recv().await, Some(SourceSignal::Lost));
    }

    #[tokio::test]
    async fn keeps_reading_after_invalid_utf8_line() {
        let input: &'static [u8] = b"{\"source_id\":\"a\",\"observed_at_millis\":1}\n\
            \xff\xfe garbage\n\
            {\"source_id\":\"b\",\"observed_at_millis\":2}";
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (signal_tx, mut signal_rx) = mpsc::channel(8);
        let source = NdjsonSource::new(cursor_factory(input), event_tx, signal_tx);

        source.start().await;

        assert_eq!(event_rx.recv().await.unwrap().source_id, "a");
        assert_eq!(event_rx.recv().await.unwrap().source_id, "b");

        assert_eq!(signal_rx.recv().await, Some(SourceSignal::Available));
        assert_eq!(signal_rx.recv().await, Some(SourceSignal::Lost));
    }

    #[tokio::test]
    async fn resubscribe_resumes_stream_without_losing_lines() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let reader = std::sync::Mutex::new(Some(reader));
        let open: ReaderFactory = Arc::new(move || match reader.lock().unwrap().take() {
            Some(stream) => Box::new(stream) as BoxedReader,
            None => Box::new(tokio::io::empty()) as BoxedReader,
        });
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (signal_tx, mut signal_rx) = mpsc::channel(8);
        let source = NdjsonSource::new(open, event_tx, signal_tx);

        source.start().await;
        assert_eq!(signal_rx.recv().await, Some(SourceSignal::Available));

        source.resubscribe().await.unwrap();
        assert_eq!(signal_rx.recv().await, Some(SourceSignal::Lost));
        assert_eq!(signal_rx.recv().await, Some(SourceSignal::Available));

        writer
            .write_all(b"{\"source_id\":\"id.dana\",\"observed_at_millis\":7}\n")
            .await
            .unwrap();

        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.observed_at_millis, 7);
        assert!(source.is_reading().await);

        source.stop().await;
        assert_eq!(signal_rx.recv().await, Some(SourceSignal::Lost));
        assert!(!source.is_reading().await);
    }

    #[tokio::test]
    async fn resubscribe_fails_once_forwarder_is_gone() {
        let (event_tx, event_rx) = mpsc::channel(1);
        let (signal_tx, _signal_rx) = mpsc::channel(8);
        let source = NdjsonSource::new(cursor_factory(b""), event_tx, signal_tx);
        drop(event_rx);

        let error = source.resubscribe().await.unwrap_err();
        assert_eq!(error, SupervisorError::reconnect_failed("event channel closed"));
    }
}
