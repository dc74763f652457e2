//! Framed Thrift transport and the Cassandra RPC client built on it.
//!
//! Each message travels in a frame prefixed by its big-endian u32 length.
//! Replies are matched to calls by sequence id: a reply whose call already
//! timed out is read, logged and dropped the next time the link is used.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use super::messages::{
    self, AuthenticationRequest, Compression, CqlReply, KsDef, encode_call,
};
use super::protocol::{MessageType, ThriftReader, ThriftWriter};
use crate::connection::{CassandraRpc, Dialer};
use crate::error::{ConnectError, CqlError, CqlResult};

/// Largest frame accepted from a server.
const MAX_FRAME: usize = 64 * 1024 * 1024;

/// Length-prefixed framing over any async byte stream.
pub struct FramedTransport<S> {
    stream: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
    seqid: i32,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(8192),
            write_buf: BytesMut::with_capacity(1024),
            seqid: 0,
        }
    }

    /// Send a call and wait for its reply.
    ///
    /// Returns the reply body positioned after the message header, i.e. at
    /// the result struct.
    pub async fn call<F>(&mut self, method: &str, args: F) -> CqlResult<Bytes>
    where
        F: FnOnce(&mut ThriftWriter<'_>) + Send,
    {
        self.seqid = self.seqid.wrapping_add(1);
        let seqid = self.seqid;
        let message = encode_call(method, seqid, args);

        self.write_buf.clear();
        self.write_buf.put_u32(message.len() as u32);
        self.write_buf.extend_from_slice(&message);
        self.stream
            .write_all(&self.write_buf)
            .await
            .map_err(|e| CqlError::Transport(format!("write {}: {}", method, e)))?;
        self.stream
            .flush()
            .await
            .map_err(|e| CqlError::Transport(format!("flush {}: {}", method, e)))?;

        loop {
            let frame = self.read_frame().await?;
            let mut r = ThriftReader::new(&frame);
            let header = r.message_begin()?;

            if header.seqid != seqid {
                warn!(
                    method = %header.name,
                    seqid = header.seqid,
                    expected = seqid,
                    "query returned after timeout; discarding reply"
                );
                continue;
            }

            match header.kind {
                MessageType::Reply => {
                    let consumed = frame.len() - r.remaining();
                    return Ok(frame.slice(consumed..));
                }
                MessageType::Exception => {
                    let message = messages::read_application_exception(&mut r)?;
                    return Err(CqlError::protocol(format!("{} failed: {}", method, message)));
                }
                other => {
                    return Err(CqlError::protocol(format!(
                        "unexpected {:?} message for {}",
                        other, method
                    )));
                }
            }
        }
    }

    /// Read one frame. Partial reads stay buffered, so a cancelled call does
    /// not desynchronise the stream.
    async fn read_frame(&mut self) -> CqlResult<Bytes> {
        loop {
            if self.read_buf.len() >= 4 {
                let len = u32::from_be_bytes([
                    self.read_buf[0],
                    self.read_buf[1],
                    self.read_buf[2],
                    self.read_buf[3],
                ]) as usize;
                if len > MAX_FRAME {
                    return Err(CqlError::protocol(format!("frame of {} bytes exceeds limit", len)));
                }
                if self.read_buf.len() >= 4 + len {
                    self.read_buf.advance(4);
                    return Ok(self.read_buf.split_to(len).freeze());
                }
            }

            let n = self
                .stream
                .read_buf(&mut self.read_buf)
                .await
                .map_err(|e| CqlError::Transport(format!("read: {}", e)))?;
            if n == 0 {
                return Err(CqlError::Transport("connection closed by server".into()));
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("error shutting down transport: {}", e);
        }
    }
}

/// Cassandra client over a framed Thrift transport.
pub struct ThriftClient<S> {
    transport: FramedTransport<S>,
    addr: String,
}

impl<S> ThriftClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, addr: impl Into<String>) -> Self {
        Self {
            transport: FramedTransport::new(stream),
            addr: addr.into(),
        }
    }
}

#[async_trait]
impl<S> CassandraRpc for ThriftClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn login(&mut self, auth: &AuthenticationRequest) -> CqlResult<()> {
        let body = self
            .transport
            .call("login", |w| messages::write_login_args(w, auth))
            .await?;
        messages::read_login_result(&mut ThriftReader::new(&body), &self.addr)
    }

    async fn describe_keyspace(&mut self, keyspace: &str) -> CqlResult<KsDef> {
        let body = self
            .transport
            .call("describe_keyspace", |w| messages::write_keyspace_args(w, keyspace))
            .await?;
        messages::read_describe_keyspace_result(&mut ThriftReader::new(&body), &self.addr, keyspace)
    }

    async fn set_keyspace(&mut self, keyspace: &str) -> CqlResult<()> {
        let body = self
            .transport
            .call("set_keyspace", |w| messages::write_keyspace_args(w, keyspace))
            .await?;
        messages::read_set_keyspace_result(&mut ThriftReader::new(&body))
    }

    async fn execute_cql_query(
        &mut self,
        query: &[u8],
        compression: Compression,
    ) -> CqlResult<Option<CqlReply>> {
        let body = self
            .transport
            .call("execute_cql_query", |w| {
                messages::write_execute_cql_args(w, query, compression)
            })
            .await?;
        messages::read_execute_cql_result(&mut ThriftReader::new(&body))
    }

    async fn close(&mut self) {
        self.transport.shutdown().await;
    }
}

/// Dials plain TCP and speaks framed Thrift.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, host: &str, port: u16) -> CqlResult<Box<dyn CassandraRpc>> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| ConnectError::Transport {
            addr: addr.clone(),
            message: e.to_string(),
        })?;

        // Disable Nagle's algorithm; calls are small request/response pairs
        stream.set_nodelay(true).map_err(|e| ConnectError::Transport {
            addr: addr.clone(),
            message: e.to_string(),
        })?;

        Ok(Box::new(ThriftClient::new(stream, addr)))
    }
}
