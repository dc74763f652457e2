//! Connection handshake, execute and reply handling against a scripted node.

mod common;

use cassandra_cql::error::{ConnectError, CqlError, ExecError};
use cassandra_cql::thrift::{CqlReply, CqlResultType, CqlRow};
use cassandra_cql::{Connection, ConnectionTarget, CqlValue, Param, QueryResult};
use common::{KEYSPACE, MockCluster, QueryOutcome, Step, column};
use pretty_assertions::assert_eq;

const ADDR: &str = "db1:9160";

fn connection(cluster: &MockCluster) -> Connection {
    Connection::with_dialer(ConnectionTarget::new("db1", 9160, KEYSPACE), cluster.dialer())
}

#[tokio::test]
async fn test_connect_learns_schema() {
    let cluster = MockCluster::new(&[ADDR]);
    let mut conn = connection(&cluster);

    conn.connect().await.unwrap();
    assert!(conn.is_connected());

    let schema = conn.schema().unwrap();
    assert_eq!(schema.keyspace(), KEYSPACE);
    assert!(schema.get("users").is_some());

    // No credentials, no login call
    assert_eq!(cluster.node(ADDR).logins, 0);
}

#[tokio::test]
async fn test_login_only_with_credentials() {
    let cluster = MockCluster::new(&[ADDR]);
    let target = ConnectionTarget::new("db1", 9160, KEYSPACE).credentials("app", "secret");
    let mut conn = Connection::with_dialer(target, cluster.dialer());

    conn.connect().await.unwrap();
    assert_eq!(cluster.node(ADDR).logins, 1);
}

#[tokio::test]
async fn test_execute_decodes_rows() {
    let cluster = MockCluster::new(&[ADDR]);
    cluster.set(ADDR, |n| {
        n.query = QueryOutcome::Reply(CqlReply {
            kind: CqlResultType::Rows as i32,
            rows: vec![CqlRow {
                key: b"ada".to_vec(),
                columns: vec![
                    column("KEY", b"ada"),
                    column("name", b"Ada"),
                    column("age", &36i64.to_be_bytes()),
                    column("email", b""),
                ],
            }],
            num: None,
        })
    });

    let mut conn = connection(&cluster);
    conn.connect().await.unwrap();

    let result = conn
        .execute("SELECT * FROM users WHERE KEY = ?", &["ada".into()])
        .await
        .unwrap();

    assert_eq!(
        cluster.node(ADDR).last_query.as_deref(),
        Some("SELECT * FROM users WHERE KEY = 'ada'")
    );

    let rows = result.rows().unwrap();
    assert_eq!(rows.row_count(), 1);
    let row = rows.first().unwrap();
    assert_eq!(row.key(), &CqlValue::Text("ada".into()));
    assert_eq!(row.col_count(), 2);
    assert_eq!(row.get("name"), Some(&CqlValue::Text("Ada".into())));
    assert_eq!(row.get("age"), Some(&CqlValue::Int(36)));
}

#[tokio::test]
async fn test_execute_reply_shapes() {
    let cluster = MockCluster::new(&[ADDR]);
    let mut conn = connection(&cluster);
    conn.connect().await.unwrap();

    cluster.set(ADDR, |n| {
        n.query = QueryOutcome::Reply(CqlReply {
            kind: CqlResultType::Int as i32,
            rows: vec![],
            num: Some(12),
        })
    });
    let result = conn.execute("SELECT COUNT(*) FROM users", &[]).await.unwrap();
    assert_eq!(result, QueryResult::Count(12));

    cluster.set(ADDR, |n| {
        n.query = QueryOutcome::Reply(CqlReply {
            kind: CqlResultType::Void as i32,
            rows: vec![],
            num: None,
        })
    });
    let result = conn
        .execute("UPDATE users SET name = ? WHERE KEY = ?", &["O'Brien".into(), "ob".into()])
        .await
        .unwrap();
    assert!(result.is_void());
    assert_eq!(
        cluster.node(ADDR).last_query.as_deref(),
        Some("UPDATE users SET name = 'O''Brien' WHERE KEY = 'ob'")
    );

    cluster.set(ADDR, |n| {
        n.query = QueryOutcome::Reply(CqlReply {
            kind: 9,
            rows: vec![],
            num: None,
        })
    });
    let err = conn.execute("SELECT * FROM users", &[]).await.unwrap_err();
    assert!(matches!(err, CqlError::Exec(ExecError::UnexpectedResultType(9))));

    cluster.set(ADDR, |n| n.query = QueryOutcome::Missing);
    let err = conn.execute("SELECT * FROM users", &[]).await.unwrap_err();
    assert!(matches!(err, CqlError::Exec(ExecError::NoResult)));
}

#[tokio::test]
async fn test_null_argument_sends_nothing() {
    let cluster = MockCluster::new(&[ADDR]);
    let mut conn = connection(&cluster);
    conn.connect().await.unwrap();

    let err = conn
        .execute("SELECT * FROM users WHERE KEY = ?", &[Param::Null])
        .await
        .unwrap_err();
    assert!(matches!(err, CqlError::Bind(_)));
    assert_eq!(cluster.node(ADDR).queries, 0);
}

#[tokio::test]
async fn test_rows_from_unparseable_select() {
    let cluster = MockCluster::new(&[ADDR]);
    let mut conn = connection(&cluster);
    conn.connect().await.unwrap();

    let err = conn.execute("SELECT name", &[]).await.unwrap_err();
    assert!(matches!(err, CqlError::Statement(_)));
    assert!(err.is_caller_error());
}

#[tokio::test(start_paused = true)]
async fn test_handshake_step_timeouts() {
    let cluster = MockCluster::new(&[ADDR]);
    let target = ConnectionTarget::new("db1", 9160, KEYSPACE).credentials("app", "secret");

    for (step, expect) in [
        (Step::Login, "login"),
        (Step::Learn, "learn"),
        (Step::Use, "use"),
    ] {
        cluster.set(ADDR, |n| n.hang = Some(step));
        let mut conn = Connection::with_dialer(target.clone(), cluster.dialer());
        let err = conn.connect().await.unwrap_err();

        let matched = match (&err, expect) {
            (CqlError::Connect(ConnectError::LoginTimeout { .. }), "login") => true,
            (CqlError::Connect(ConnectError::LearnTimeout { .. }), "learn") => true,
            (CqlError::Connect(ConnectError::UseTimeout { .. }), "use") => true,
            _ => false,
        };
        assert!(matched, "{:?} timed out with {:?}", step, err);
        assert!(err.is_retryable());

        // Partial handshake state is discarded
        assert!(!conn.is_connected());
        assert!(conn.schema().is_none());
    }

    // Each failed handshake closed its link
    assert_eq!(cluster.node(ADDR).closes, 3);
}

#[tokio::test(start_paused = true)]
async fn test_dial_timeout() {
    let cluster = MockCluster::new(&[ADDR]);
    cluster.set(ADDR, |n| n.hang = Some(Step::Dial));

    let mut conn = connection(&cluster);
    let err = conn.connect().await.unwrap_err();
    assert!(matches!(err, CqlError::Connect(ConnectError::ConnectTimeout { .. })));
}

#[tokio::test]
async fn test_missing_keyspace_is_not_retryable() {
    let cluster = MockCluster::new(&[ADDR]);
    cluster.set(ADDR, |n| n.missing_keyspace = true);

    let mut conn = connection(&cluster);
    let err = conn.connect().await.unwrap_err();
    assert!(matches!(err, CqlError::Connect(ConnectError::KeyspaceNotFound { .. })));
    assert!(err.to_string().contains("ColumnFamily or Keyspace does not exist"));
    assert!(!err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_query_timeout() {
    let cluster = MockCluster::new(&[ADDR]);
    let mut conn = connection(&cluster);
    conn.connect().await.unwrap();

    cluster.set(ADDR, |n| n.hang = Some(Step::Query));
    let err = conn.execute("SELECT * FROM users", &[]).await.unwrap_err();
    assert!(matches!(err, CqlError::Exec(ExecError::QueryTimeout(_))));

    // The interrupted link is not reused
    assert!(!conn.is_connected());
    assert_eq!(cluster.node(ADDR).closes, 1);
    let err = conn.execute("SELECT * FROM users", &[]).await.unwrap_err();
    assert!(matches!(err, CqlError::Exec(ExecError::NotConnected)));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let cluster = MockCluster::new(&[ADDR]);
    let mut conn = connection(&cluster);
    conn.connect().await.unwrap();

    conn.close().await;
    conn.close().await;
    assert_eq!(cluster.node(ADDR).closes, 1);

    let err = conn.execute("SELECT * FROM users", &[]).await.unwrap_err();
    assert!(matches!(err, CqlError::Exec(ExecError::NotConnected)));

    // Reconnect replaces the schema wholesale
    conn.connect().await.unwrap();
    assert!(conn.schema().is_some());
    assert_eq!(cluster.node(ADDR).dials, 2);
}
