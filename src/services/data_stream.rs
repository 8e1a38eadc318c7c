use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// One event on the agent's streaming side channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
}

pub fn data_stream() -> (DataStreamWriter, DataStreamReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DataStreamWriter { tx }, DataStreamReader { rx })
}

#[derive(Debug, Clone)]
pub struct DataStreamWriter {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl DataStreamWriter {
    /// Never blocks. Returns false when the reader is gone; the event is dropped.
    pub fn write_data(&self, kind: &str, content: Value) -> bool {
        self.tx
            .send(StreamEvent {
                kind: kind.to_string(),
                content,
            })
            .is_ok()
    }
}

#[derive(Debug)]
pub struct DataStreamReader {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl DataStreamReader {
    /// Pending events in publish order, without waiting.
    pub fn drain(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }
}
