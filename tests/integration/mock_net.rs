//! Scripted server connection for integration tests.
//!
//! Replies are handed out in order; once the script runs dry every post
//! gets `{"result":"OK"}`.  Every request and every streamed byte is
//! recorded so tests can assert on the full exchange.

use std::collections::VecDeque;

use camsync::app::ports::{Exchange, StreamId, StreamTransport};
use camsync::buffer::{OutboundBody, ResponseBuffer};
use camsync::error::TransportError;

const DEFAULT_REPLY: &str = r#"{"result":"OK"}"#;

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub path: String,
    pub body: String,
}

#[allow(dead_code)]
pub struct MockNet {
    pub connected: bool,
    pub connects: u32,
    pub disconnects: u32,
    pub posts: Vec<Post>,
    connect_script: VecDeque<Result<(), TransportError>>,
    reply_script: VecDeque<Result<String, TransportError>>,

    // ── Upload stream ─────────────────────────────────────────
    pub opened: Vec<String>,
    pub closed: Vec<StreamId>,
    /// Bytes that reached the "wire".
    pub streamed: Vec<u8>,
    /// Bytes flushed per `send`/`resume` call.  0 simulates a stall.
    pub flush_per_call: usize,
    pub chunk: usize,
    /// Stream `send` calls seen so far.
    pub sends: u32,
    /// Fail the n-th `send` (1-based) with this error.
    send_failure: Option<(u32, TransportError)>,
    queued: VecDeque<u8>,
    stream: Option<StreamId>,
    next_id: StreamId,
}

#[allow(dead_code)]
impl MockNet {
    pub fn new() -> Self {
        Self {
            connected: false,
            connects: 0,
            disconnects: 0,
            posts: Vec::new(),
            connect_script: VecDeque::new(),
            reply_script: VecDeque::new(),
            opened: Vec::new(),
            closed: Vec::new(),
            streamed: Vec::new(),
            flush_per_call: usize::MAX,
            chunk: 512,
            sends: 0,
            send_failure: None,
            queued: VecDeque::new(),
            stream: None,
            next_id: 1,
        }
    }

    pub fn reply(&mut self, body: &str) -> &mut Self {
        self.reply_script.push_back(Ok(body.to_owned()));
        self
    }

    pub fn fail_post(&mut self, err: TransportError) -> &mut Self {
        self.reply_script.push_back(Err(err));
        self
    }

    pub fn refuse_connects(&mut self, n: usize) -> &mut Self {
        for _ in 0..n {
            self.connect_script.push_back(Err(TransportError::ConnectFailed));
        }
        self
    }

    pub fn fail_send(&mut self, nth: u32, err: TransportError) -> &mut Self {
        self.send_failure = Some((nth, err));
        self
    }

    pub fn paths(&self) -> Vec<&str> {
        self.posts.iter().map(|p| p.path.as_str()).collect()
    }

    pub fn last_post(&self) -> Option<&Post> {
        self.posts.last()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    fn flush(&mut self) -> usize {
        let n = self.flush_per_call.min(self.queued.len());
        self.streamed.extend(self.queued.drain(..n));
        n
    }
}

impl Default for MockNet {
    fn default() -> Self {
        Self::new()
    }
}

impl Exchange for MockNet {
    fn connect(&mut self, _host: &str) -> Result<(), TransportError> {
        self.connects += 1;
        self.connect_script.pop_front().unwrap_or(Ok(()))?;
        self.connected = true;
        Ok(())
    }

    fn post(
        &mut self,
        path: &str,
        body: &mut OutboundBody<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let mut sent = Vec::new();
        let mut piece = [0u8; 64];
        loop {
            let (n, done) = body.fill(&mut piece);
            sent.extend_from_slice(&piece[..n]);
            if done {
                break;
            }
        }
        self.posts.push(Post {
            path: path.to_owned(),
            body: String::from_utf8_lossy(&sent).into_owned(),
        });

        let reply = self
            .reply_script
            .pop_front()
            .unwrap_or_else(|| Ok(DEFAULT_REPLY.to_owned()))?;
        // Deliver in small fragments, as a real client would.
        for fragment in reply.as_bytes().chunks(7) {
            if !response.append(fragment) {
                break;
            }
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.disconnects += 1;
        }
        self.connected = false;
        self.stream = None;
        self.queued.clear();
    }
}

impl StreamTransport for MockNet {
    fn open(&mut self, path: &str) -> Result<StreamId, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.opened.push(path.to_owned());
        self.stream = Some(id);
        Ok(id)
    }

    fn max_chunk(&self) -> usize {
        self.chunk
    }

    fn send(&mut self, id: StreamId, bytes: &[u8], _last: bool) -> Result<usize, TransportError> {
        if self.stream != Some(id) {
            return Err(TransportError::NotConnected);
        }
        self.sends += 1;
        if let Some((nth, err)) = self.send_failure {
            if self.sends == nth {
                self.send_failure = None;
                return Err(err);
            }
        }
        self.queued.extend(bytes);
        Ok(self.flush())
    }

    fn resume(&mut self, id: StreamId) -> Result<usize, TransportError> {
        if self.stream != Some(id) {
            return Err(TransportError::NotConnected);
        }
        Ok(self.flush())
    }

    fn close(&mut self, id: StreamId) {
        if self.stream == Some(id) {
            self.closed.push(id);
            self.stream = None;
            self.queued.clear();
        }
    }
}
