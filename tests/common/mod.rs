//! Scripted in-memory cluster for connection and pool tests.
//!
//! Every node is addressed by `host:port` and answers the four Cassandra
//! calls according to its [`Node`] script. By default a node serves every
//! query with a single row whose key is the node's own address, so tests
//! can tell which member handled a call.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::pending;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cassandra_cql::error::{ApplicationException, ConnectError, CqlError};
use cassandra_cql::thrift::{
    AuthenticationRequest, CfDef, ColumnDef, Compression, CqlReply, CqlResultType, CqlRow, KsDef,
    ThriftColumn,
};
use cassandra_cql::{CassandraRpc, CqlResult, Dialer, QueryResult};

pub const KEYSPACE: &str = "app";

/// Point at which a node stops answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Dial,
    Login,
    Learn,
    Use,
    Query,
}

/// How a node answers `execute_cql_query`.
#[derive(Debug, Clone, Default)]
pub enum QueryOutcome {
    /// One row keyed by the node's address.
    #[default]
    ServedBy,
    Reply(CqlReply),
    /// Successful call with no result struct.
    Missing,
    /// The link breaks.
    Transport,
    /// InvalidRequestException
    Invalid(String),
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Refuses new connections and breaks existing ones.
    pub down: bool,
    pub hang: Option<Step>,
    pub query: QueryOutcome,
    pub missing_keyspace: bool,
    pub dials: usize,
    pub logins: usize,
    pub queries: usize,
    pub closes: usize,
    pub last_query: Option<String>,
}

#[derive(Clone, Default)]
pub struct MockCluster {
    nodes: Arc<Mutex<HashMap<String, Node>>>,
}

impl MockCluster {
    pub fn new(addrs: &[&str]) -> Self {
        let nodes = addrs
            .iter()
            .map(|a| (a.to_string(), Node::default()))
            .collect();
        Self {
            nodes: Arc::new(Mutex::new(nodes)),
        }
    }

    pub fn dialer(&self) -> Arc<dyn Dialer> {
        Arc::new(self.clone())
    }

    /// Change a node's script.
    pub fn set(&self, addr: &str, f: impl FnOnce(&mut Node)) {
        self.with_node(addr, f)
    }

    pub fn node(&self, addr: &str) -> Node {
        self.with_node(addr, |n| n.clone())
    }

    fn with_node<R>(&self, addr: &str, f: impl FnOnce(&mut Node) -> R) -> R {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .get_mut(addr)
            .unwrap_or_else(|| panic!("no scripted node {}", addr));
        f(node)
    }
}

#[async_trait]
impl Dialer for MockCluster {
    async fn dial(&self, host: &str, port: u16) -> CqlResult<Box<dyn CassandraRpc>> {
        let addr = format!("{}:{}", host, port);
        let (down, hang) = self.with_node(&addr, |n| {
            n.dials += 1;
            (n.down, n.hang == Some(Step::Dial))
        });
        if hang {
            pending::<()>().await;
        }
        if down {
            return Err(ConnectError::Transport {
                addr,
                message: "connection refused".into(),
            }
            .into());
        }
        Ok(Box::new(MockRpc {
            addr,
            cluster: self.clone(),
        }))
    }
}

struct MockRpc {
    addr: String,
    cluster: MockCluster,
}

impl MockRpc {
    fn node<R>(&self, f: impl FnOnce(&mut Node) -> R) -> R {
        self.cluster.with_node(&self.addr, f)
    }

    fn broken(&self) -> CqlError {
        CqlError::Transport(format!("{}: connection reset", self.addr))
    }
}

#[async_trait]
impl CassandraRpc for MockRpc {
    async fn login(&mut self, _auth: &AuthenticationRequest) -> CqlResult<()> {
        let hang = self.node(|n| {
            n.logins += 1;
            n.hang == Some(Step::Login)
        });
        if hang {
            pending::<()>().await;
        }
        Ok(())
    }

    async fn describe_keyspace(&mut self, keyspace: &str) -> CqlResult<KsDef> {
        let (hang, missing) = self.node(|n| (n.hang == Some(Step::Learn), n.missing_keyspace));
        if hang {
            pending::<()>().await;
        }
        if missing {
            return Err(ConnectError::KeyspaceNotFound {
                addr: self.addr.clone(),
                keyspace: keyspace.to_string(),
            }
            .into());
        }
        Ok(users_keyspace())
    }

    async fn set_keyspace(&mut self, _keyspace: &str) -> CqlResult<()> {
        if self.node(|n| n.hang == Some(Step::Use)) {
            pending::<()>().await;
        }
        Ok(())
    }

    async fn execute_cql_query(
        &mut self,
        query: &[u8],
        compression: Compression,
    ) -> CqlResult<Option<CqlReply>> {
        assert_eq!(compression, Compression::None);
        let (down, hang, outcome) = self.node(|n| {
            n.queries += 1;
            n.last_query = Some(String::from_utf8_lossy(query).into_owned());
            (n.down, n.hang == Some(Step::Query), n.query.clone())
        });
        if hang {
            pending::<()>().await;
        }
        if down {
            return Err(self.broken());
        }

        match outcome {
            QueryOutcome::ServedBy => Ok(Some(served_by_reply(&self.addr))),
            QueryOutcome::Reply(reply) => Ok(Some(reply)),
            QueryOutcome::Missing => Ok(None),
            QueryOutcome::Transport => Err(self.broken()),
            QueryOutcome::Invalid(why) => Err(ApplicationException::InvalidRequest(why).into()),
        }
    }

    async fn close(&mut self) {
        self.node(|n| n.closes += 1);
    }
}

/// Keyspace `app` with a `users` column family: UTF8 keys and names,
/// `age` stored as a long.
pub fn users_keyspace() -> KsDef {
    KsDef {
        name: KEYSPACE.into(),
        strategy_class: "org.apache.cassandra.locator.SimpleStrategy".into(),
        cf_defs: vec![CfDef {
            keyspace: KEYSPACE.into(),
            name: "users".into(),
            comparator_type: "org.apache.cassandra.db.marshal.UTF8Type".into(),
            default_validation_class: "org.apache.cassandra.db.marshal.UTF8Type".into(),
            key_validation_class: "org.apache.cassandra.db.marshal.UTF8Type".into(),
            column_metadata: vec![ColumnDef {
                name: b"age".to_vec(),
                validation_class: "org.apache.cassandra.db.marshal.LongType".into(),
            }],
        }],
    }
}

pub fn column(name: &str, value: &[u8]) -> ThriftColumn {
    ThriftColumn {
        name: name.as_bytes().to_vec(),
        value: Some(value.to_vec()),
        timestamp: Some(1),
        ttl: None,
    }
}

fn served_by_reply(addr: &str) -> CqlReply {
    CqlReply {
        kind: CqlResultType::Rows as i32,
        rows: vec![CqlRow {
            key: addr.as_bytes().to_vec(),
            columns: vec![column("node", addr.as_bytes())],
        }],
        num: None,
    }
}

/// Address of the node that answered a default-scripted query.
pub fn served_by(result: &QueryResult) -> String {
    result
        .rows()
        .and_then(|rows| rows.first())
        .map(|row| row.key().to_string())
        .expect("expected a row")
}
