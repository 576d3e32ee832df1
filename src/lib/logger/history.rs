use std::io::{self, Write};

use ringbuffer::{AllocRingBuffer, RingBuffer};
use tokio::sync::broadcast::Sender;
use tracing_subscriber::fmt::MakeWriter;

/// Lines kept for `--include-logs`.
pub const HISTORY_CAPACITY: usize = 10 * 1024;

pub struct BroadcastWriterInner {
    sender: Sender<String>,
}

impl Write for BroadcastWriterInner {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let message = String::from_utf8_lossy(buf).to_string();
        let _ = self.sender.send(message);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Formatted log lines are broadcast to whoever listens, the history
/// collector in particular.
pub struct BroadcastWriter {
    sender: Sender<String>,
}

impl BroadcastWriter {
    pub fn new(sender: Sender<String>) -> Self {
        Self { sender }
    }
}

impl<'a> MakeWriter<'a> for BroadcastWriter {
    type Writer = BroadcastWriterInner;

    fn make_writer(&'a self) -> Self::Writer {
        BroadcastWriterInner {
            sender: self.sender.clone(),
        }
    }
}

pub struct History {
    pub history: AllocRingBuffer<String>,
}

impl Default for History {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl History {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: AllocRingBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, message: String) {
        self.history.push(message);
    }

    pub fn lines(&self) -> Vec<String> {
        self.history.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast;

    use super::*;

    #[test]
    fn keeps_the_latest_lines() {
        let mut history = History::with_capacity(2);
        for line in ["first", "second", "third"] {
            history.push(line.to_string());
        }
        assert_eq!(history.lines(), ["second", "third"]);
    }

    #[tokio::test]
    async fn writer_broadcasts_each_write() {
        let (sender, mut receiver) = broadcast::channel(4);
        let writer = BroadcastWriter::new(sender);

        writer.make_writer().write_all(b"line\n").unwrap();
        assert_eq!(receiver.recv().await.unwrap(), "line\n");
    }
}
