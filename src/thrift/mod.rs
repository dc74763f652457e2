//! Cassandra's Thrift interface: binary protocol, message structs and
//! the framed client.

pub mod messages;
pub mod protocol;
pub mod transport;

pub use messages::{AuthenticationRequest, CfDef, ColumnDef, Compression, CqlReply, CqlResultType, CqlRow, KsDef, ThriftColumn};
pub use transport::{FramedTransport, TcpDialer, ThriftClient};
