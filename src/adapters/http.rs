//! HTTPS session adapter.
//!
//! Implements [`Exchange`] and [`StreamTransport`]: one request/response
//! connection to the server plus one chunked upload stream for frames.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::http::client::EspHttpConnection`
//!   with the built-in certificate bundle.
//! - **all other targets**: scripted responses for host-side tests.
//!
//! ```text
//!   post(path, body) ──▶ POST host+path ──▶ response.append(..)*
//!   open(path)       ──▶ POST host+path (chunked, kept open)
//!   send(bytes)      ──▶ one chunk
//! ```

use log::{debug, info};
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{Exchange, StreamId, StreamTransport};
use crate::buffer::{OutboundBody, ResponseBuffer};
use crate::error::TransportError;

/// Request and response bytes move through a buffer of this size.
const IO_CHUNK: usize = 1024;
/// Largest frame slice handed to one stream write.
const STREAM_CHUNK: usize = 4096;

#[cfg(target_os = "espidf")]
type Connection = esp_idf_svc::http::client::EspHttpConnection;

pub struct HttpAdapter {
    host: Option<String>,
    next_stream: StreamId,
    stream: Option<StreamId>,
    #[cfg(target_os = "espidf")]
    conn: Option<Connection>,
    #[cfg(target_os = "espidf")]
    stream_conn: Option<Connection>,
    /// Simulation: responses handed out by successive posts.
    #[cfg(not(target_os = "espidf"))]
    sim_responses: std::collections::VecDeque<Result<Vec<u8>, TransportError>>,
    /// Simulation: `(path, body)` of every post.
    #[cfg(not(target_os = "espidf"))]
    sim_posts: Vec<(String, Vec<u8>)>,
    /// Simulation: bytes written to the upload stream.
    #[cfg(not(target_os = "espidf"))]
    sim_streamed: Vec<u8>,
    #[cfg(not(target_os = "espidf"))]
    sim_refuse_connect: bool,
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpAdapter {
    pub fn new() -> Self {
        Self {
            host: None,
            next_stream: 1,
            stream: None,
            #[cfg(target_os = "espidf")]
            conn: None,
            #[cfg(target_os = "espidf")]
            stream_conn: None,
            #[cfg(not(target_os = "espidf"))]
            sim_responses: std::collections::VecDeque::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_posts: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_streamed: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            sim_refuse_connect: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.host.is_some()
    }

    fn url(&self, path: &str) -> Result<String, TransportError> {
        let host = self.host.as_deref().ok_or(TransportError::NotConnected)?;
        Ok(format!("{}{}", host.trim_end_matches('/'), path))
    }

    // ── Simulation controls ───────────────────────────────────

    /// Simulation: queue the body returned by the next post.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_push_response(&mut self, body: &str) {
        self.sim_responses.push_back(Ok(body.as_bytes().to_vec()));
    }

    /// Simulation: make the next post fail at the transport level.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_push_failure(&mut self, err: TransportError) {
        self.sim_responses.push_back(Err(err));
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_refuse_connect(&mut self, refuse: bool) {
        self.sim_refuse_connect = refuse;
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_posts(&self) -> &[(String, Vec<u8>)] {
        &self.sim_posts
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_streamed(&self) -> &[u8] {
        &self.sim_streamed
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn new_connection() -> Result<Connection, TransportError> {
        use esp_idf_svc::http::client::Configuration;

        Connection::new(&Configuration {
            buffer_size: Some(IO_CHUNK),
            buffer_size_tx: Some(IO_CHUNK),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        })
        .map_err(|e| {
            warn!("Http(espidf): client init failed: {}", e);
            TransportError::ConnectFailed
        })
    }

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), TransportError> {
        self.conn = Some(Self::new_connection()?);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), TransportError> {
        if self.sim_refuse_connect {
            return Err(TransportError::ConnectFailed);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_post(
        &mut self,
        url: &str,
        body: &mut OutboundBody<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<(), TransportError> {
        use esp_idf_svc::http::Method;

        let conn = self.conn.as_mut().ok_or(TransportError::NotConnected)?;
        let len = body.len().to_string();
        let headers = [("content-type", "application/json"), ("content-length", len.as_str())];
        conn.initiate_request(Method::Post, url, &headers)
            .map_err(|_| TransportError::SendFailed)?;

        let mut chunk = [0u8; IO_CHUNK];
        loop {
            let (n, eof) = body.fill(&mut chunk);
            if n > 0 {
                conn.write(&chunk[..n]).map_err(|_| TransportError::SendFailed)?;
            }
            if eof {
                break;
            }
        }

        conn.initiate_response().map_err(|_| TransportError::ReceiveFailed)?;
        let status = conn.status();
        if status >= 400 {
            warn!("Http(espidf): status {}", status);
        }
        loop {
            let n = conn.read(&mut chunk).map_err(|_| TransportError::ReceiveFailed)?;
            if n == 0 {
                break;
            }
            // Overflow is flagged in the buffer; keep draining the socket.
            let _ = response.append(&chunk[..n]);
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_post(
        &mut self,
        url: &str,
        body: &mut OutboundBody<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<(), TransportError> {
        let mut sent = Vec::with_capacity(body.len());
        let mut chunk = [0u8; IO_CHUNK];
        loop {
            let (n, eof) = body.fill(&mut chunk);
            sent.extend_from_slice(&chunk[..n]);
            if eof {
                break;
            }
        }
        self.sim_posts.push((url.to_owned(), sent));

        let reply = self
            .sim_responses
            .pop_front()
            .unwrap_or_else(|| Ok(b"{\"result\":\"OK\"}".to_vec()))?;
        for piece in reply.chunks(IO_CHUNK) {
            let _ = response.append(piece);
        }
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        self.stream_conn = None;
        self.conn = None;
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {}

    #[cfg(target_os = "espidf")]
    fn platform_open(&mut self, url: &str) -> Result<(), TransportError> {
        use esp_idf_svc::http::Method;

        let mut conn = Self::new_connection()?;
        // No content-length: the body goes out chunked.
        conn.initiate_request(Method::Post, url, &[("content-type", "application/octet-stream")])
            .map_err(|_| TransportError::SendFailed)?;
        self.stream_conn = Some(conn);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_open(&mut self, _url: &str) -> Result<(), TransportError> {
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        let conn = self.stream_conn.as_mut().ok_or(TransportError::NotConnected)?;
        write_all(bytes, |b| conn.write(b).map_err(|_| TransportError::SendFailed)).inspect_err(|e| {
            warn!("Http(espidf): stream write failed: {}", e);
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_write(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        self.sim_streamed.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    #[cfg(target_os = "espidf")]
    fn platform_close(&mut self) {
        if let Some(mut conn) = self.stream_conn.take() {
            let _ = conn.initiate_response();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_close(&mut self) {}
}

/// Hand all of `bytes` to `write`, which may accept less per call.
///
/// The frame cursor has already moved past `bytes`, so a write that
/// accepts nothing is an error rather than a partial flush.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn write_all(
    bytes: &[u8],
    mut write: impl FnMut(&[u8]) -> Result<usize, TransportError>,
) -> Result<usize, TransportError> {
    let mut written = 0;
    while written < bytes.len() {
        match write(&bytes[written..])? {
            0 => return Err(TransportError::SendFailed),
            n => written += n,
        }
    }
    Ok(written)
}

// ───────────────────────────────────────────────────────────────
// Exchange
// ───────────────────────────────────────────────────────────────

impl Exchange for HttpAdapter {
    fn connect(&mut self, host: &str) -> Result<(), TransportError> {
        if host.is_empty() {
            return Err(TransportError::ConnectFailed);
        }
        self.platform_connect()?;
        self.host = Some(host.to_owned());
        info!("Http: session to {}", host);
        Ok(())
    }

    fn post(
        &mut self,
        path: &str,
        body: &mut OutboundBody<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<(), TransportError> {
        let url = self.url(path)?;
        // The query carries the session id.
        let endpoint = path.split('?').next().unwrap_or(path);
        debug!("Http: POST {} ({} bytes)", endpoint, body.len());
        self.platform_post(&url, body, response)
    }

    fn disconnect(&mut self) {
        if self.host.take().is_some() {
            self.stream = None;
            self.platform_disconnect();
            info!("Http: session closed");
        }
    }
}

// ───────────────────────────────────────────────────────────────
// StreamTransport
// ───────────────────────────────────────────────────────────────

impl StreamTransport for HttpAdapter {
    fn open(&mut self, path: &str) -> Result<StreamId, TransportError> {
        let url = self.url(path)?;
        self.platform_open(&url)?;
        let id = self.next_stream;
        self.next_stream = self.next_stream.wrapping_add(1).max(1);
        self.stream = Some(id);
        info!("Http: upload stream {} open", id);
        Ok(id)
    }

    fn max_chunk(&self) -> usize {
        STREAM_CHUNK
    }

    fn send(&mut self, id: StreamId, bytes: &[u8], _last: bool) -> Result<usize, TransportError> {
        if self.stream != Some(id) {
            return Err(TransportError::NotConnected);
        }
        self.platform_write(bytes)
    }

    fn resume(&mut self, id: StreamId) -> Result<usize, TransportError> {
        if self.stream != Some(id) {
            return Err(TransportError::NotConnected);
        }
        // Writes are synchronous; nothing stays queued.
        Ok(0)
    }

    fn close(&mut self, id: StreamId) {
        if self.stream == Some(id) {
            self.platform_close();
            self.stream = None;
            info!("Http: upload stream {} closed", id);
        }
    }
}
