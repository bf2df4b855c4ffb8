//! Store transport over a `redis` connection
//!
//! `GRAPH.BULK` goes out as one command with the batch blobs as binary
//! arguments. Server error replies come back as `Reply::Error` so the
//! client can report them as rejections.

use redis::{ConnectionAddr, ConnectionInfo, ErrorKind, IntoConnectionInfo, RedisError, Value};

use super::{BulkRequest, Reply, Transport, BULK_COMMAND, BEGIN_MARKER};
use crate::error::{ImportError, Result};

const DEFAULT_PORT: u16 = 6379;

pub struct RespTransport {
    conn: redis::Connection,
}

impl RespTransport {
    /// Connect to `host:port` (or a `redis://` url) with optional credentials.
    pub fn connect(url: &str, username: Option<&str>, password: Option<&str>) -> Result<Self> {
        let info = connection_info(url, username, password)?;
        let conn = redis::Client::open(info)
            .and_then(|client| client.get_connection())
            .map_err(|e| ImportError::Transport(format!("cannot connect to {}: {}", url, e)))?;
        tracing::info!("connected to {}", url);
        Ok(Self { conn })
    }
}

/// Resolve the configured address and credentials.
///
/// Explicit credentials override any embedded in a url.
pub fn connection_info(
    url: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<ConnectionInfo> {
    let mut info = if url.contains("://") {
        url.into_connection_info()
            .map_err(|e| ImportError::InvalidConfig(format!("store url '{}': {}", url, e)))?
    } else {
        let (host, port) = match url.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ImportError::InvalidConfig(format!("store url '{}': bad port '{}'", url, port))
                })?;
                (host, port)
            }
            None => (url, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(ImportError::InvalidConfig(format!("store url '{}': missing host", url)));
        }
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(host.to_string(), port),
            redis: Default::default(),
        }
    };
    if let Some(user) = username {
        info.redis.username = Some(user.to_string());
    }
    if let Some(pass) = password {
        info.redis.password = Some(pass.to_string());
    }
    Ok(info)
}

/// Argument list for `GRAPH.BULK`
pub fn bulk_args(request: &BulkRequest<'_>) -> Vec<Vec<u8>> {
    let mut args: Vec<Vec<u8>> = vec![BULK_COMMAND.into(), request.graph.into()];
    if request.begin {
        args.push(BEGIN_MARKER.into());
    }
    for n in [
        request.node_count,
        request.edge_count,
        request.node_label_count() as u64,
        request.edge_label_count() as u64,
    ] {
        args.push(n.to_string().into_bytes());
    }
    args
}

/// Full `GRAPH.BULK` command: counts, then node blobs, then edge blobs.
pub fn bulk_command(request: &BulkRequest<'_>) -> redis::Cmd {
    let mut cmd = redis::cmd(BULK_COMMAND);
    for arg in bulk_args(request).iter().skip(1) {
        cmd.arg(arg.as_slice());
    }
    for blob in request.node_blobs.iter().chain(request.edge_blobs) {
        cmd.arg(&blob.bytes[..]);
    }
    cmd
}

fn reply_from_value(value: Value) -> Reply {
    match value {
        Value::Nil => Reply::Bulk(None),
        Value::Int(n) => Reply::Integer(n),
        Value::Data(bytes) => Reply::Bulk(Some(bytes)),
        Value::Bulk(items) => Reply::Array(Some(items.into_iter().map(reply_from_value).collect())),
        Value::Status(s) => Reply::Status(s),
        Value::Okay => Reply::Status("OK".into()),
        // RESP3-only kinds; the bulk reply is always RESP2
        #[allow(unreachable_patterns)]
        other => Reply::Status(format!("{:?}", other)),
    }
}

/// Error replies sent by the store, as opposed to connection failures
fn server_error(e: &RedisError) -> Option<Reply> {
    if !matches!(e.kind(), ErrorKind::ResponseError | ErrorKind::ExtensionError) {
        return None;
    }
    let msg = match (e.code(), e.detail()) {
        (Some(code), Some(detail)) => format!("{} {}", code, detail),
        _ => e.to_string(),
    };
    Some(Reply::Error(msg))
}

impl Transport for RespTransport {
    fn submit(&mut self, request: &BulkRequest<'_>) -> Result<Reply> {
        match bulk_command(request).query::<Value>(&mut self.conn) {
            Ok(value) => Ok(reply_from_value(value)),
            Err(e) => server_error(&e).ok_or_else(|| ImportError::Transport(e.to_string())),
        }
    }
}
