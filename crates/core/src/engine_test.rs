//! Tests for the ring buffer engine

use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::timeout;

use super::*;

/// Upper bound for anything that should happen promptly
const PROMPT: Duration = Duration::from_secs(5);

/// Helper to create an entry tagged `test` with message `e<i>`
fn entry(i: usize) -> LogEntry {
    LogEntry::new(Arc::from("test"), format!("e{i}"))
}

/// Start an engine with ring capacity `capacity` and queue size `output`
fn start(capacity: usize, output: usize) -> (EngineHandle, JoinHandle<EngineStats>) {
    let config = EngineConfig::with_capacity(capacity).with_output_buffer(output);
    let (engine, handle) = Engine::new(config);
    let join = engine.spawn(CancellationToken::new());
    (handle, join)
}

/// Open a query and return the client side of the connection
async fn open_query(handle: &EngineHandle, mode: LogMode) -> BufReader<UnixStream> {
    let (server, client) = UnixStream::pair().unwrap();
    handle.query(server, mode).await.unwrap();
    BufReader::new(client)
}

/// Read messages until EOF
async fn read_to_eof(reader: &mut BufReader<UnixStream>) -> Vec<String> {
    let mut messages = Vec::new();
    let mut lines = reader.lines();
    while let Some(line) = timeout(PROMPT, lines.next_line()).await.unwrap().unwrap() {
        messages.push(message_of(&line));
    }
    messages
}

/// Read exactly `n` messages
async fn read_n(reader: &mut BufReader<UnixStream>, n: usize) -> Vec<String> {
    let mut messages = Vec::with_capacity(n);
    for _ in 0..n {
        let mut line = String::new();
        let read = timeout(PROMPT, reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        assert!(read > 0, "unexpected EOF after {} lines", messages.len());
        messages.push(message_of(&line));
    }
    messages
}

/// Extract the message field of a wire line
fn message_of(line: &str) -> String {
    line.trim_end_matches('\n')
        .splitn(3, ' ')
        .nth(2)
        .unwrap_or_default()
        .to_string()
}

fn names(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("e{i}")).collect()
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn test_ingestion_never_blocks_when_full() {
    let (handle, join) = start(10, 10);

    for i in 0..20 {
        timeout(Duration::from_secs(1), handle.log(entry(i)))
            .await
            .expect("write to the engine blocked")
            .unwrap();
    }

    drop(handle);
    let stats = join.await.unwrap();
    assert_eq!(stats.entries_received, 20);
}

#[tokio::test]
async fn test_handle_reports_stopped_engine() {
    let (engine, handle) = Engine::new(EngineConfig::with_capacity(4));
    let cancel = CancellationToken::new();
    let join = engine.spawn(cancel.clone());

    cancel.cancel();
    join.await.unwrap();

    assert!(matches!(
        handle.log(entry(0)).await,
        Err(LogdError::EngineStopped)
    ));
}

// ============================================================================
// Dump
// ============================================================================

#[tokio::test]
async fn test_dump_returns_most_recent_capacity_entries() {
    let (handle, _join) = start(10, 10);

    for i in 0..20 {
        handle.log(entry(i)).await.unwrap();
    }

    let mut client = open_query(&handle, LogMode::Dump).await;
    assert_eq!(read_to_eof(&mut client).await, names(10..20));
}

#[tokio::test]
async fn test_dump_is_finite_after_overflow() {
    let (handle, _join) = start(10, 10);

    for i in 0..20 {
        handle.log(entry(i)).await.unwrap();
    }

    let mut client = open_query(&handle, LogMode::Dump).await;
    assert_eq!(read_to_eof(&mut client).await.len(), 10);
}

#[tokio::test]
async fn test_dump_with_small_output_buffer_keeps_newest() {
    let (handle, _join) = start(10, 5);

    for i in 0..10 {
        handle.log(entry(i)).await.unwrap();
    }

    let mut client = open_query(&handle, LogMode::Dump).await;
    assert_eq!(read_to_eof(&mut client).await, names(5..10));

    // Ingestion is unaffected
    timeout(PROMPT, handle.log(entry(10))).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_empty_dump_terminates() {
    let (handle, _join) = start(10, 10);

    let mut client = open_query(&handle, LogMode::Dump).await;
    assert!(read_to_eof(&mut client).await.is_empty());
}

#[tokio::test]
async fn test_dump_does_not_receive_later_entries() {
    let (handle, _join) = start(10, 10);

    handle.log(entry(0)).await.unwrap();
    let mut client = open_query(&handle, LogMode::Dump).await;
    handle.log(entry(1)).await.unwrap();

    assert_eq!(read_to_eof(&mut client).await, names(0..1));
}

// ============================================================================
// Follow
// ============================================================================

#[tokio::test]
async fn test_follow_receives_new_entries_in_order() {
    let (handle, _join) = start(10, 10);

    let mut client = open_query(&handle, LogMode::Follow).await;
    for i in 0..5 {
        handle.log(entry(i)).await.unwrap();
    }

    assert_eq!(read_n(&mut client, 5).await, names(0..5));
}

#[tokio::test]
async fn test_follow_skips_existing_entries() {
    let (handle, join) = start(10, 10);

    handle.log(entry(0)).await.unwrap();
    let mut client = open_query(&handle, LogMode::Follow).await;
    handle.log(entry(1)).await.unwrap();

    drop(handle);
    join.await.unwrap();

    // Engine shutdown ends the follow stream
    assert_eq!(read_to_eof(&mut client).await, names(1..2));
}

#[tokio::test]
async fn test_two_dump_follow_subscribers() {
    let (handle, _join) = start(10, 10);

    for i in 0..3 {
        handle.log(entry(i)).await.unwrap();
    }

    let mut a = open_query(&handle, LogMode::DumpFollow).await;
    let mut b = open_query(&handle, LogMode::DumpFollow).await;

    for i in 3..6 {
        handle.log(entry(i)).await.unwrap();
    }

    assert_eq!(read_n(&mut a, 6).await, names(0..6));
    assert_eq!(read_n(&mut b, 6).await, names(0..6));
}

#[tokio::test]
async fn test_stalled_subscriber_does_not_delay_others() {
    let count = 500;
    let (handle, _join) = start(count, count);

    // Never read from the stalled client
    let _stalled = open_query(&handle, LogMode::Follow).await;
    let mut healthy = open_query(&handle, LogMode::Follow).await;

    let padding = "x".repeat(1024);
    let producer = {
        let handle = handle.clone();
        tokio::spawn(async move {
            for i in 0..count {
                let message = format!("e{i} {padding}");
                handle.log(LogEntry::new(Arc::from("test"), message)).await.unwrap();
            }
        })
    };

    let received = read_n(&mut healthy, count).await;
    timeout(PROMPT, producer).await.unwrap().unwrap();

    for (i, message) in received.iter().enumerate() {
        assert!(message.starts_with(&format!("e{i} ")));
    }
}

#[tokio::test]
async fn test_closed_follow_subscriber_is_reaped() {
    let (handle, join) = start(10, 10);

    let client = open_query(&handle, LogMode::Follow).await;
    drop(client);

    // The first entry makes the writer fail, a later one reaps it
    for i in 0..3 {
        handle.log(entry(i)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    drop(handle);
    let stats = join.await.unwrap();
    assert_eq!(stats.subscriptions_opened, 1);
    assert_eq!(stats.subscriptions_reaped, 1);
}

// ============================================================================
// Echo
// ============================================================================

/// Write sink shared with the test
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_entries_are_echoed() {
    let sink = SharedSink::default();
    let (engine, handle) = Engine::new(EngineConfig::with_capacity(4));
    let join = engine.with_echo(sink.clone()).spawn(CancellationToken::new());

    handle.log(entry(0)).await.unwrap();
    handle.log(entry(1)).await.unwrap();
    drop(handle);
    join.await.unwrap();

    // The echo thread drains its queue after the engine stops
    let output = timeout(PROMPT, async {
        loop {
            let output = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
            if output.lines().count() >= 2 {
                return output;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let messages: Vec<_> = output.lines().map(message_of).collect();
    assert_eq!(messages, names(0..2));
}

/// Sink whose writes hang until the test releases them
struct StalledSink(std::sync::mpsc::Receiver<()>);

impl Write for StalledSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.0.recv();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_stalled_echo_does_not_block_engine() {
    let (release, stalled) = std::sync::mpsc::channel();
    let (engine, handle) = Engine::new(EngineConfig::with_capacity(4));
    let cancel = CancellationToken::new();
    let join = engine
        .with_echo(StalledSink(stalled))
        .spawn(cancel.clone());

    for i in 0..20 {
        timeout(PROMPT, handle.log(entry(i))).await.unwrap().unwrap();
    }

    let mut reader = open_query(&handle, LogMode::Dump).await;
    let messages = timeout(PROMPT, read_to_eof(&mut reader)).await.unwrap();
    assert_eq!(messages, names(16..20));

    cancel.cancel();
    let stats = join.await.unwrap();
    assert_eq!(stats.entries_received, 20);
    assert!(stats.echo_dropped > 0);

    drop(release);
}
