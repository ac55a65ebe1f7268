//! Byte-stream source: stdin, a capture file, or any channel of chunks.

use crate::protocol::stream::FrameReader;
use crate::source::{route_frame, LinkEvent, ReadingSource, SourceError};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::io::Read;
use std::thread;
use std::time::Duration;

/// Chunks buffered between the reader thread and the engine.
const CHANNEL_CAPACITY: usize = 256;

const READ_CHUNK: usize = 64;

/// Deframes raw chunks arriving on a channel.
pub struct StreamSource {
    name: String,
    receiver: Receiver<Vec<u8>>,
    reader: FrameReader,
    reported_discard: u64,
    disconnected: bool,
}

impl StreamSource {
    pub fn new(name: impl Into<String>, receiver: Receiver<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            receiver,
            reader: FrameReader::new(),
            reported_discard: 0,
            disconnected: false,
        }
    }

    /// Read from `input` on a background thread.
    pub fn from_reader<R>(name: impl Into<String>, input: R, pace: Option<Duration>) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::new(name, spawn_reader(input, pace))
    }

    /// Swap in a fresh transport after the previous one went away.
    ///
    /// Any partial frame from the old transport is discarded and reported as
    /// noise on the next poll. The host then
    /// calls `CushionEngine::reconnect` so the device gets the full state.
    pub fn reattach(&mut self, receiver: Receiver<Vec<u8>>) {
        tracing::info!(source = %self.name, "transport reattached");
        self.receiver = receiver;
        self.reader.reset();
        self.disconnected = false;
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

impl ReadingSource for StreamSource {
    fn poll(&mut self, now_ms: u64) -> Result<Vec<LinkEvent>, SourceError> {
        if self.disconnected {
            return Err(SourceError::Disconnected);
        }

        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(chunk) => {
                    for result in self.reader.push(&chunk) {
                        match result {
                            Ok(frame) => events.extend(route_frame(&frame, now_ms)),
                            Err(e) => events.push(LinkEvent::Dropped(e)),
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }

        let discarded = self.reader.discarded_bytes();
        if discarded > self.reported_discard {
            events.push(LinkEvent::Noise {
                bytes: discarded - self.reported_discard,
            });
            self.reported_discard = discarded;
        }

        if self.disconnected && events.is_empty() {
            return Err(SourceError::Disconnected);
        }
        Ok(events)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Spawn a thread that forwards `input` as chunks until EOF.
///
/// The channel disconnects when the input ends or fails. With `pace` set the
/// thread sleeps between chunks, which makes a capture file replay at
/// roughly device speed.
pub fn spawn_reader<R>(mut input: R, pace: Option<Duration>) -> Receiver<Vec<u8>>
where
    R: Read + Send + 'static,
{
    let (sender, receiver) = bounded(CHANNEL_CAPACITY);

    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match input.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if sender.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                    if let Some(delay) = pace {
                        thread::sleep(delay);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "link read failed");
                    break;
                }
            }
        }
        tracing::debug!("link reader finished");
    });

    receiver
}
