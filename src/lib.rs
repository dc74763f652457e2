//! # cassandra-cql
//!
//! A Cassandra client that speaks CQL over the Thrift RPC interface.
//!
//! - [`bind`] merges `?` placeholders with quoted arguments.
//! - [`Connection`] dials one node, logs in, learns the keyspace schema and
//!   selects the keyspace, each step with its own timeout.
//! - Replies are decoded with the learned validators into [`Row`]s.
//! - [`ConnectionPool`] spreads queries round-robin across nodes, tracks
//!   node health and retries elsewhere when a node fails.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use cassandra_cql::prelude::*;
//!
//! let pool = ConnectionPool::new(PoolConfig::new(["10.0.0.1", "10.0.0.2"], "app"))?;
//!
//! pool.execute("UPDATE users SET name = ? WHERE KEY = ?", &["Ada".into(), "ada".into()]).await?;
//!
//! let result = pool.execute("SELECT name FROM users WHERE KEY = ?", &["ada".into()]).await?;
//! if let Some(row) = result.into_single_row() {
//!     println!("{:?}", row.get("name"));
//! }
//!
//! pool.shutdown().await;
//! ```

pub mod bind;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod pool;
pub mod row;
pub mod schema;
pub mod statement;
pub mod thrift;
pub mod validator;
pub mod value;

pub use bind::{Param, bind};
pub use connection::{CassandraRpc, Connection, ConnectionTarget, Credentials, Dialer, StepTimeouts};
pub use error::{CqlError, CqlResult};
pub use pool::{ConnectionPool, MemberStats, PoolConfig};
pub use row::{Column, QueryResult, Row, Rows};
pub use value::CqlValue;

pub mod prelude {
    pub use crate::bind::{Param, bind};
    pub use crate::config::ClusterConfig;
    pub use crate::connection::{Connection, ConnectionTarget, Credentials};
    pub use crate::error::*;
    pub use crate::pool::{ConnectionPool, PoolConfig};
    pub use crate::row::{QueryResult, Row, Rows};
    pub use crate::statement::{Projection, Statement, StatementKind};
    pub use crate::validator::{DecodeOptions, Validator};
    pub use crate::value::CqlValue;
}
