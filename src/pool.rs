//! Connection pool over several Cassandra nodes.
//!
//! One member per configured host. Members are picked round-robin, carry
//! their own health state, and connect lazily. A query that fails for a
//! reason that is not the query's fault marks its member unhealthy and is
//! retried on the next member.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::bind::{Param, bind};
use crate::connection::{
    Connection, ConnectionTarget, Credentials, DEFAULT_PORT, DEFAULT_TIMEOUT, Dialer, StepTimeouts,
};
use crate::error::{CqlResult, PoolError};
use crate::row::QueryResult;
use crate::thrift::TcpDialer;
use crate::validator::DecodeOptions;

/// How long an unhealthy member is left alone before it may reconnect.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_millis(10_000);

/// Wait before re-selecting when the chosen member is busy.
const TAKEN_BACKOFF: Duration = Duration::from_millis(10);

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// `host[:port]` entries.
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub credentials: Option<Credentials>,
    /// Cap on the number of members.
    pub max_size: Option<usize>,
    /// Connections idle longer than this reconnect on next use.
    pub idle_timeout: Option<Duration>,
    /// Dial and query timeout per connection.
    pub timeout: Duration,
    pub step_timeouts: StepTimeouts,
    pub stale_threshold: Duration,
    /// Executes per call before giving up; defaults to member count + 1.
    pub max_attempts: Option<usize>,
    pub use_bigints: bool,
    pub log_time: bool,
}

impl PoolConfig {
    pub fn new<I, S>(hosts: I, keyspace: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            keyspace: keyspace.into(),
            credentials: None,
            max_size: None,
            idle_timeout: None,
            timeout: DEFAULT_TIMEOUT,
            step_timeouts: StepTimeouts::default(),
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            max_attempts: None,
            use_bigints: false,
            log_time: false,
        }
    }

    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(user, password));
        self
    }

    pub fn max_size(mut self, max: usize) -> Self {
        self.max_size = Some(max);
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
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

    pub fn stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn use_bigints(mut self, enabled: bool) -> Self {
        self.use_bigints = enabled;
        self
    }

    pub fn log_time(mut self, enabled: bool) -> Self {
        self.log_time = enabled;
        self
    }

    fn target(&self, host: String, port: u16) -> ConnectionTarget {
        ConnectionTarget {
            host,
            port,
            keyspace: self.keyspace.clone(),
            credentials: self.credentials.clone(),
            timeout: self.timeout,
            step_timeouts: self.step_timeouts,
            decode: DecodeOptions {
                use_bigints: self.use_bigints,
            },
            log_time: self.log_time,
        }
    }
}

/// Split a `host[:port]` entry.
///
/// Missing or non-numeric ports fall back to 9160. Entries with more than
/// one `:` are rejected.
pub fn parse_host(entry: &str) -> Option<(String, u16)> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let parts: Vec<&str> = entry.split(':').collect();
    let (host, port) = match parts.as_slice() {
        [host] => (*host, DEFAULT_PORT),
        [host, port] => (*host, port.trim().parse().unwrap_or(DEFAULT_PORT)),
        _ => {
            warn!(entry, "invalid host entry, skipping");
            return None;
        }
    };

    if host.is_empty() {
        warn!(entry, "host entry without a host name, skipping");
        return None;
    }
    Some((host.to_string(), port))
}

/// Snapshot of one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberStats {
    pub addr: String,
    pub connected: bool,
    pub taken: bool,
    pub healthy: bool,
}

struct PoolMember {
    addr: String,
    conn: Mutex<Connection>,
    connected: AtomicBool,
    /// In-flight query marker; only the [`Claim`] holder touches `conn`.
    taken: AtomicBool,
    /// Millis since pool start (+1) of the last failure; 0 while healthy.
    unhealthy_at: AtomicU64,
    /// Millis since pool start (+1) of the last successful use.
    last_used: AtomicU64,
}

impl PoolMember {
    fn is_healthy(&self) -> bool {
        self.unhealthy_at.load(Ordering::Acquire) == 0
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn try_claim(&self) -> Option<Claim<'_>> {
        self.taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Claim { member: self })
    }

    fn mark_unhealthy(&self, now: u64) {
        self.connected.store(false, Ordering::Release);
        self.unhealthy_at.store(now, Ordering::Release);
    }

    fn stats(&self) -> MemberStats {
        MemberStats {
            addr: self.addr.clone(),
            connected: self.is_connected(),
            taken: self.taken.load(Ordering::Acquire),
            healthy: self.is_healthy(),
        }
    }
}

/// Exclusive use of one member; releases `taken` on drop.
struct Claim<'a> {
    member: &'a PoolMember,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.member.taken.store(false, Ordering::Release);
    }
}

struct PoolInner {
    config: PoolConfig,
    members: Vec<PoolMember>,
    cursor: AtomicUsize,
    closed: AtomicBool,
    epoch: Instant,
}

impl PoolInner {
    /// Never 0, so 0 can mean "healthy" / "unused".
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64 + 1
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn acquire_deadline(&self) -> Duration {
        self.config.timeout * self.members.len() as u32
    }

    /// Move the cursor to the next usable member.
    ///
    /// Stops at the first healthy member, or at the first unhealthy one whose
    /// failure is older than the stale threshold (which is reset so it can
    /// reconnect). `None` after a full lap with neither.
    fn advance(&self) -> Option<usize> {
        let len = self.members.len();
        let stale_ms = self.config.stale_threshold.as_millis() as u64;

        for _ in 0..len {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            let member = &self.members[idx];

            let failed_at = member.unhealthy_at.load(Ordering::Acquire);
            if failed_at == 0 {
                return Some(idx);
            }

            if self.now_ms().saturating_sub(failed_at) > stale_ms
                && member
                    .unhealthy_at
                    .compare_exchange(failed_at, 0, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                member.connected.store(false, Ordering::Release);
                info!(addr = %member.addr, "unhealthy member is stale, will reconnect");
                return Some(idx);
            }
        }
        None
    }

    fn idle_expired(&self, member: &PoolMember) -> bool {
        let Some(idle) = self.config.idle_timeout else {
            return false;
        };
        let last = member.last_used.load(Ordering::Acquire);
        last != 0 && self.now_ms().saturating_sub(last) > idle.as_millis() as u64
    }

    /// Find a connected member and claim it.
    async fn acquire(&self) -> CqlResult<Claim<'_>> {
        let limit = self.acquire_deadline();
        let deadline = Instant::now() + limit;

        loop {
            if self.is_closed() {
                return Err(PoolError::Closed.into());
            }
            if Instant::now() >= deadline {
                return Err(PoolError::AcquireTimeout(limit).into());
            }

            let idx = self.advance().ok_or(PoolError::AllUnhealthy)?;
            let member = &self.members[idx];

            let Some(claim) = member.try_claim() else {
                sleep(TAKEN_BACKOFF).await;
                continue;
            };

            if member.is_connected() && !self.idle_expired(member) {
                return Ok(claim);
            }

            let mut conn = member.conn.lock().await;
            if self.is_closed() {
                return Err(PoolError::Closed.into());
            }
            if member.is_connected() {
                debug!(addr = %member.addr, "connection idle too long, reconnecting");
            }

            match conn.connect().await {
                Ok(()) => {
                    member.connected.store(true, Ordering::Release);
                    member.last_used.store(self.now_ms(), Ordering::Release);
                    return Ok(claim);
                }
                Err(e) => {
                    member.mark_unhealthy(self.now_ms());
                    warn!(addr = %member.addr, error = %e, "connect failed, marking member unhealthy");
                    if !e.is_retryable() {
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// Round-robin pool with failover.
///
/// # Example
/// ```ignore
/// let config = PoolConfig::new(["10.0.0.1", "10.0.0.2:9161"], "app")
///     .credentials("app", "secret")
///     .use_bigints(true);
/// let pool = ConnectionPool::new(config)?;
///
/// let result = pool.execute("SELECT * FROM users WHERE KEY = ?", &["ada".into()]).await?;
/// pool.shutdown().await;
/// ```
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Pool over plain TCP. Nothing is dialed until the first execute.
    pub fn new(config: PoolConfig) -> CqlResult<Self> {
        Self::with_dialer(config, Arc::new(TcpDialer))
    }

    pub fn with_dialer(config: PoolConfig, dialer: Arc<dyn Dialer>) -> CqlResult<Self> {
        let limit = config.max_size.unwrap_or(usize::MAX);
        let members: Vec<PoolMember> = config
            .hosts
            .iter()
            .filter_map(|entry| parse_host(entry))
            .take(limit)
            .map(|(host, port)| {
                let target = config.target(host, port);
                PoolMember {
                    addr: target.addr(),
                    conn: Mutex::new(Connection::with_dialer(target, dialer.clone())),
                    connected: AtomicBool::new(false),
                    taken: AtomicBool::new(false),
                    unhealthy_at: AtomicU64::new(0),
                    last_used: AtomicU64::new(0),
                }
            })
            .collect();

        if members.is_empty() {
            return Err(PoolError::NoHosts.into());
        }

        debug!(
            hosts = ?members.iter().map(|m| m.addr.as_str()).collect::<Vec<_>>(),
            keyspace = %config.keyspace,
            "connection pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                members,
                cursor: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                epoch: Instant::now(),
            }),
        })
    }

    /// Execute a statement on some healthy node.
    ///
    /// Failures that say nothing about the query (timeouts, broken links)
    /// move on to the next member, up to the configured attempt limit.
    /// Server-side exceptions about the query and binding errors are
    /// returned as-is and leave the member healthy.
    pub async fn execute(&self, query: &str, args: &[Param]) -> CqlResult<QueryResult> {
        let cql = bind(query, args)?;
        let inner = &self.inner;
        let max_attempts = self.max_attempts();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let claim = inner.acquire().await?;
            let member = claim.member;

            let result = {
                let mut conn = member.conn.lock().await;
                if inner.is_closed() {
                    return Err(PoolError::Closed.into());
                }
                let result = conn.execute_bound(&cql).await;
                if matches!(&result, Err(e) if e.is_retryable()) {
                    conn.close().await;
                }
                result
            };

            match result {
                Ok(result) => {
                    member.last_used.store(inner.now_ms(), Ordering::Release);
                    return Ok(result);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    member.mark_unhealthy(inner.now_ms());
                    warn!(
                        addr = %member.addr,
                        attempt = attempts,
                        error = %e,
                        "query failed, marking member unhealthy"
                    );
                    if attempts >= max_attempts {
                        return Err(PoolError::RetriesExhausted {
                            attempts,
                            last: Box::new(e),
                        }
                        .into());
                    }
                }
            }
        }
    }

    /// Close every connection. Waits for in-flight queries first; later
    /// executes fail with [`PoolError::Closed`]. Repeated calls are no-ops.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for member in &self.inner.members {
            let mut conn = member.conn.lock().await;
            conn.close().await;
            member.connected.store(false, Ordering::Release);
        }
        info!("connection pool shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Number of members (accepted host entries).
    pub fn len(&self) -> usize {
        self.inner.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.members.is_empty()
    }

    pub fn stats(&self) -> Vec<MemberStats> {
        self.inner.members.iter().map(PoolMember::stats).collect()
    }

    fn max_attempts(&self) -> usize {
        self.inner
            .config
            .max_attempts
            .unwrap_or(self.inner.members.len() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host() {
        assert_eq!(parse_host("10.0.0.1"), Some(("10.0.0.1".into(), 9160)));
        assert_eq!(parse_host(" db1:9161 "), Some(("db1".into(), 9161)));
        assert_eq!(parse_host("db1:thrift"), Some(("db1".into(), 9160)));
        assert_eq!(parse_host("::1:9160"), None);
        assert_eq!(parse_host(""), None);
        assert_eq!(parse_host(":9160"), None);
    }

    #[test]
    fn test_pool_config() {
        let config = PoolConfig::new(["a", "b"], "app")
            .credentials("u", "p")
            .max_size(1)
            .timeout(Duration::from_millis(500))
            .max_attempts(0);

        assert_eq!(config.hosts, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.max_size, Some(1));
        assert_eq!(config.max_attempts, Some(1));
        assert_eq!(config.stale_threshold, Duration::from_secs(10));

        let target = config.target("a".into(), 9160);
        assert_eq!(target.timeout, Duration::from_millis(500));
        assert_eq!(target.credentials, Some(Credentials::new("u", "p")));
    }

    #[test]
    fn test_members_from_hosts() {
        let config = PoolConfig::new(["a", "bad:1:2", "b:9170", "c"], "app").max_size(2);
        let pool = ConnectionPool::new(config).unwrap();
        let addrs: Vec<String> = pool.stats().into_iter().map(|s| s.addr).collect();
        assert_eq!(addrs, vec!["a:9160".to_string(), "b:9170".to_string()]);
        assert!(pool.stats().iter().all(|s| s.healthy && !s.connected && !s.taken));
    }

    #[test]
    fn test_no_hosts() {
        let err = ConnectionPool::new(PoolConfig::new(["", "x:1:2"], "app")).err().unwrap();
        assert!(matches!(err, crate::error::CqlError::Pool(PoolError::NoHosts)));
    }
}
