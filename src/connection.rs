//! A single connection to one Cassandra node.
//!
//! # Example
//! ```ignore
//! use cassandra_cql::{Connection, ConnectionTarget};
//!
//! let target = ConnectionTarget::new("127.0.0.1", 9160, "app");
//! let mut conn = Connection::new(target);
//! conn.connect().await?;
//!
//! let result = conn.execute("SELECT * FROM users WHERE KEY = ?", &["ada".into()]).await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, timeout};
use tracing::{info, trace, warn};

use crate::bind::{Param, bind};
use crate::decoder::decode_reply_rows;
use crate::error::{ConnectError, CqlError, CqlResult, ExecError};
use crate::row::QueryResult;
use crate::schema::SchemaCache;
use crate::statement::Statement;
use crate::thrift::{AuthenticationRequest, Compression, CqlReply, CqlResultType, KsDef, TcpDialer};
use crate::validator::DecodeOptions;

/// Thrift port Cassandra listens on by default.
pub const DEFAULT_PORT: u16 = 9160;

/// Dial and query timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(4000);

/// Login credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Timeouts for the three handshake steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    pub login: Duration,
    /// `describe_keyspace`
    pub learn: Duration,
    /// `set_keyspace`
    pub use_keyspace: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            login: Duration::from_millis(1000),
            learn: Duration::from_millis(2000),
            use_keyspace: Duration::from_millis(1000),
        }
    }
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub keyspace: String,
    pub credentials: Option<Credentials>,
    /// Bounds dialing and every query.
    pub timeout: Duration,
    pub step_timeouts: StepTimeouts,
    pub decode: DecodeOptions,
    /// Trace per-query timings under `cassandra_cql::timing`.
    pub log_time: bool,
}

impl ConnectionTarget {
    pub fn new(host: impl Into<String>, port: u16, keyspace: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            keyspace: keyspace.into(),
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
            step_timeouts: StepTimeouts::default(),
            decode: DecodeOptions::default(),
            log_time: false,
        }
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(user, password));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn step_timeouts(mut self, step_timeouts: StepTimeouts) -> Self {
        self.step_timeouts = step_timeouts;
        self
    }

    pub fn use_bigints(mut self, enabled: bool) -> Self {
        self.decode.use_bigints = enabled;
        self
    }

    pub fn log_time(mut self, enabled: bool) -> Self {
        self.log_time = enabled;
        self
    }

    /// `host:port`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The four Cassandra calls the driver makes.
///
/// Implemented by [`ThriftClient`](crate::thrift::ThriftClient); tests plug
/// in scripted doubles.
#[async_trait]
pub trait CassandraRpc: Send {
    async fn login(&mut self, auth: &AuthenticationRequest) -> CqlResult<()>;

    async fn describe_keyspace(&mut self, keyspace: &str) -> CqlResult<KsDef>;

    async fn set_keyspace(&mut self, keyspace: &str) -> CqlResult<()>;

    async fn execute_cql_query(
        &mut self,
        query: &[u8],
        compression: Compression,
    ) -> CqlResult<Option<CqlReply>>;

    /// Tear down the link. Must not fail.
    async fn close(&mut self);
}

/// Opens RPC links to nodes.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, host: &str, port: u16) -> CqlResult<Box<dyn CassandraRpc>>;
}

/// One link to one node, plus the schema learned when it was opened.
pub struct Connection {
    target: ConnectionTarget,
    dialer: Arc<dyn Dialer>,
    client: Option<Box<dyn CassandraRpc>>,
    schema: Option<SchemaCache>,
}

impl Connection {
    /// Connection over plain TCP.
    pub fn new(target: ConnectionTarget) -> Self {
        Self::with_dialer(target, Arc::new(TcpDialer))
    }

    pub fn with_dialer(target: ConnectionTarget, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            target,
            dialer,
            client: None,
            schema: None,
        }
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Schema learned by the last successful handshake.
    pub fn schema(&self) -> Option<&SchemaCache> {
        self.schema.as_ref()
    }

    /// Dial and run the login / learn / use handshake.
    ///
    /// On any failure the link is closed and no schema is kept.
    pub async fn connect(&mut self) -> CqlResult<()> {
        self.close().await;

        let addr = self.target.addr();
        info!(%addr, keyspace = %self.target.keyspace, "connecting");

        let dial = self.dialer.dial(&self.target.host, self.target.port);
        let mut client = match timeout(self.target.timeout, dial).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectError::ConnectTimeout {
                    addr,
                    timeout: self.target.timeout,
                }
                .into());
            }
        };

        match handshake(&self.target, client.as_mut()).await {
            Ok(schema) => {
                info!(%addr, column_families = schema.len(), "connected");
                self.client = Some(client);
                self.schema = Some(schema);
                Ok(())
            }
            Err(e) => {
                client.close().await;
                Err(e)
            }
        }
    }

    /// Bind, send and decode one statement.
    pub async fn execute(&mut self, query: &str, args: &[Param]) -> CqlResult<QueryResult> {
        let cql = bind(query, args)?;
        self.execute_bound(&cql).await
    }

    /// Send an already bound statement and decode the reply.
    pub async fn execute_bound(&mut self, cql: &str) -> CqlResult<QueryResult> {
        let client = self.client.as_mut().ok_or(ExecError::NotConnected)?;

        trace!(target: "cassandra_cql::cql", "{}", cql);

        let started = Instant::now();
        let call = client.execute_cql_query(cql.as_bytes(), Compression::None);
        let outcome = timeout(self.target.timeout, call).await;
        let reply = match outcome {
            Ok(reply) => reply,
            Err(_) => {
                // A cancelled call may leave half a frame on the wire
                warn!(addr = %self.target.addr(), "query timed out, closing link");
                self.close().await;
                return Err(ExecError::QueryTimeout(self.target.timeout).into());
            }
        };

        if self.target.log_time {
            trace!(
                target: "cassandra_cql::timing",
                query = %cql,
                addr = %self.target.addr(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "CQL QUERY TIMING"
            );
        }

        let reply = reply?.ok_or(ExecError::NoResult)?;
        self.decode_reply(cql, reply)
    }

    fn decode_reply(&self, cql: &str, reply: CqlReply) -> CqlResult<QueryResult> {
        match CqlResultType::from_i32(reply.kind) {
            Some(CqlResultType::Rows) => {
                let statement = Statement::parse(cql)?;
                let column_family = statement.table.as_deref().ok_or_else(|| {
                    CqlError::Statement(format!("no column family to decode rows of: {}", cql))
                })?;
                let family = self.schema.as_ref().and_then(|s| s.get(column_family));
                let rows = decode_reply_rows(
                    family,
                    column_family,
                    &reply.rows,
                    self.target.decode,
                    statement.is_count(),
                )?;
                Ok(QueryResult::Rows(rows))
            }
            Some(CqlResultType::Int) => reply
                .num
                .map(|n| QueryResult::Count(i64::from(n)))
                .ok_or_else(|| CqlError::protocol("INT result without a number")),
            Some(CqlResultType::Void) => Ok(QueryResult::Void),
            None => Err(ExecError::UnexpectedResultType(reply.kind).into()),
        }
    }

    /// Close the link and forget the schema. Safe to call repeatedly.
    pub async fn close(&mut self) {
        self.schema = None;
        if let Some(mut client) = self.client.take() {
            client.close().await;
            info!(addr = %self.target.addr(), "closed");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("target", &self.target)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Login (if credentials are set), learn the keyspace schema, select the
/// keyspace. Each step has its own timeout.
async fn handshake(target: &ConnectionTarget, client: &mut dyn CassandraRpc) -> CqlResult<SchemaCache> {
    let steps = target.step_timeouts;

    if let Some(creds) = &target.credentials {
        let auth = AuthenticationRequest::new(&creds.user, &creds.password);
        timeout(steps.login, client.login(&auth))
            .await
            .map_err(|_| ConnectError::LoginTimeout { addr: target.addr() })??;
    }

    let ks_def = timeout(steps.learn, client.describe_keyspace(&target.keyspace))
        .await
        .map_err(|_| ConnectError::LearnTimeout { addr: target.addr() })??;
    let schema = SchemaCache::from_ks_def(&ks_def);

    timeout(steps.use_keyspace, client.set_keyspace(&target.keyspace))
        .await
        .map_err(|_| ConnectError::UseTimeout { addr: target.addr() })??;

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_defaults() {
        let target = ConnectionTarget::new("10.0.0.1", DEFAULT_PORT, "app");
        assert_eq!(target.addr(), "10.0.0.1:9160");
        assert_eq!(target.timeout, Duration::from_millis(4000));
        assert_eq!(target.step_timeouts.learn, Duration::from_millis(2000));
        assert!(target.credentials.is_none());
        assert!(!target.decode.use_bigints);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let target = ConnectionTarget::new("h", 1, "ks").credentials("admin", "hunter2");
        let debug = format!("{:?}", target);
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_execute_requires_connection() {
        let mut conn = Connection::new(ConnectionTarget::new("127.0.0.1", DEFAULT_PORT, "app"));
        let err = conn.execute("SELECT * FROM users", &[]).await.unwrap_err();
        assert!(matches!(err, CqlError::Exec(ExecError::NotConnected)));

        // Binding fails before the connection is consulted
        let err = conn
            .execute("SELECT * FROM users WHERE KEY = ?", &[Param::Null])
            .await
            .unwrap_err();
        assert!(matches!(err, CqlError::Bind(_)));
    }
}
