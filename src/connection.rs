//! The connection handler: owns the socket, serializes writes, parses the
//! read side with the wire codec, and performs the TLS upgrade handshake.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::error::ConnectError;
use crate::options::ConnectOptions;
use crate::proto::{self, ClientOp, ServerOp};
use crate::server_info::ServerInfo;
use crate::tls;
use crate::url::ServerAddr;

const READ_CHUNK: usize = 64 * 1024;

trait AsyncReadWrite: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T> AsyncReadWrite for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A live framed connection to one NATS server, after the INFO/TLS/CONNECT
/// handshake has completed.
pub struct Connection {
    stream: Box<dyn AsyncReadWrite>,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    /// Dials `addr`, performs the INFO wait and, if required, the TLS
    /// upgrade. Returns the connection and the server's INFO payload;
    /// CONNECT itself is sent by the caller (the client actor), since it
    /// needs the negotiated auth to be applied first.
    pub async fn open(addr: &ServerAddr, options: &ConnectOptions) -> Result<(Connection, ServerInfo), ConnectError> {
        let tcp = TcpStream::connect((addr.host(), addr.port()))
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::ConnectionRefused => ConnectError::ConnectionRefused {
                    host: addr.host().to_string(),
                    port: addr.port(),
                },
                _ => ConnectError::Io {
                    reason: err.to_string(),
                },
            })?;
        tcp.set_nodelay(true).ok();

        let mut conn = Connection {
            stream: Box::new(BufWriter::new(tcp)),
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
        };

        let info = match conn.read_op().await? {
            Some(ServerOp::Info(info)) => *info,
            Some(other) => {
                return Err(ConnectError::Io {
                    reason: format!("expected INFO, got {other:?}"),
                })
            }
            None => {
                return Err(ConnectError::Io {
                    reason: "connection closed before INFO".to_string(),
                })
            }
        };

        let client_wants_tls = addr.tls_required() || options.tls.enabled;
        if info.tls_required && !client_wants_tls {
            return Err(ConnectError::TlsRequired);
        }
        let wants_tls = client_wants_tls || info.tls_required;

        if wants_tls {
            let config = tls::build_client_config(&options.tls)?;
            let connector = tls::connector(config);
            let server_name = tls::server_name(&options.tls, &info.host, addr.host())?;

            let tls_stream = connector
                .connect(server_name, conn.stream)
                .await
                .map_err(|err| ConnectError::TlsHandshakeFailed {
                    reason: err.to_string(),
                })?;

            conn = Connection {
                stream: Box::new(tls_stream),
                read_buf: BytesMut::new(),
                write_buf: BytesMut::new(),
            };
        }

        Ok((conn, info))
    }

    /// Reads until one full [`ServerOp`] is available, or `None` on a clean
    /// EOF with no partial frame buffered.
    pub async fn read_op(&mut self) -> Result<Option<ServerOp>, ConnectError> {
        loop {
            match proto::decode(&mut self.read_buf) {
                Ok(Some(op)) => return Ok(Some(op)),
                Ok(None) => {}
                Err(err) => {
                    return Err(ConnectError::Io {
                        reason: err.to_string(),
                    })
                }
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(ConnectError::Io {
                    reason: "connection reset while a frame was in flight".to_string(),
                });
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Queues a client op onto the write buffer without flushing.
    pub fn enqueue(&mut self, op: &ClientOp) {
        proto::encode(op, &mut self.write_buf);
    }

    pub async fn flush(&mut self) -> Result<(), ConnectError> {
        if !self.write_buf.is_empty() {
            let bytes: Bytes = self.write_buf.split().freeze();
            self.stream.write_all(&bytes).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn write_op(&mut self, op: &ClientOp) -> Result<(), ConnectError> {
        self.enqueue(op);
        self.flush().await
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
