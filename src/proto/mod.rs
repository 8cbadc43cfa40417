//! The wire codec: frame-oriented encode/decode of the NATS text protocol
//! and its headers extension.
//!
//! Decoding is resumable: any attempt that lacks enough bytes to complete a
//! frame rewinds the buffer to where it started and reports
//! [`DecodeOutcome::Incomplete`], so callers can feed more bytes and retry
//! without losing already-buffered partial frames.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::header::HeaderMap;
use crate::server_info::ServerInfo;

/// Operations the server sends to the client.
#[derive(Debug, Clone)]
pub enum ServerOp {
    Info(Box<ServerInfo>),
    Ping,
    Pong,
    Ok,
    Err(String),
    Msg {
        subject: String,
        sid: String,
        reply: Option<String>,
        payload: Bytes,
    },
    Hmsg {
        subject: String,
        sid: String,
        reply: Option<String>,
        headers: HeaderMap,
        payload: Bytes,
    },
}

/// Operations the client sends to the server.
#[derive(Debug, Clone)]
pub enum ClientOp {
    Connect(String),
    Ping,
    Pong,
    Sub {
        subject: String,
        queue_group: Option<String>,
        sid: String,
    },
    Unsub {
        sid: String,
        max_messages: Option<u64>,
    },
    Pub {
        subject: String,
        reply: Option<String>,
        payload: Bytes,
    },
    Hpub {
        subject: String,
        reply: Option<String>,
        headers: HeaderMap,
        payload: Bytes,
    },
}

/// Encodes a [`ClientOp`] onto `out`, exactly matching the wire grammar in
/// the design (`PUB`/`HPUB`/`SUB`/`UNSUB`/`PING`/`PONG`/`CONNECT`).
pub fn encode(op: &ClientOp, out: &mut BytesMut) {
    match op {
        ClientOp::Connect(json) => {
            out.extend_from_slice(b"CONNECT ");
            out.extend_from_slice(json.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        ClientOp::Ping => out.extend_from_slice(b"PING\r\n"),
        ClientOp::Pong => out.extend_from_slice(b"PONG\r\n"),
        ClientOp::Sub {
            subject,
            queue_group,
            sid,
        } => {
            out.extend_from_slice(b"SUB ");
            out.extend_from_slice(subject.as_bytes());
            out.extend_from_slice(b" ");
            if let Some(queue) = queue_group {
                out.extend_from_slice(queue.as_bytes());
                out.extend_from_slice(b" ");
            }
            out.extend_from_slice(sid.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        ClientOp::Unsub { sid, max_messages } => {
            out.extend_from_slice(b"UNSUB ");
            out.extend_from_slice(sid.as_bytes());
            if let Some(max) = max_messages {
                out.extend_from_slice(format!(" {max}").as_bytes());
            }
            out.extend_from_slice(b"\r\n");
        }
        ClientOp::Pub {
            subject,
            reply,
            payload,
        } => {
            out.extend_from_slice(b"PUB ");
            out.extend_from_slice(subject.as_bytes());
            out.extend_from_slice(b" ");
            if let Some(reply) = reply {
                out.extend_from_slice(reply.as_bytes());
                out.extend_from_slice(b" ");
            }
            out.extend_from_slice(itoa::Buffer::new().format(payload.len()).as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(payload);
            out.extend_from_slice(b"\r\n");
        }
        ClientOp::Hpub {
            subject,
            reply,
            headers,
            payload,
        } => {
            let header_block = headers.to_wire();
            let hlen = header_block.len();
            let tlen = hlen + payload.len();

            out.extend_from_slice(b"HPUB ");
            out.extend_from_slice(subject.as_bytes());
            out.extend_from_slice(b" ");
            if let Some(reply) = reply {
                out.extend_from_slice(reply.as_bytes());
                out.extend_from_slice(b" ");
            }
            out.extend_from_slice(itoa::Buffer::new().format(hlen).as_bytes());
            out.extend_from_slice(b" ");
            out.extend_from_slice(itoa::Buffer::new().format(tlen).as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(&header_block);
            out.extend_from_slice(payload);
            out.extend_from_slice(b"\r\n");
        }
    }
}

/// Attempts to decode one [`ServerOp`] from the front of `buf`.
///
/// On success the consumed bytes are removed from `buf`. If `buf` does not
/// yet contain a full frame, `buf` is left untouched (the cursor is
/// effectively rewound to the start) and `Ok(None)` is returned so the
/// caller can read more bytes and retry.
pub fn decode(buf: &mut BytesMut) -> Result<Option<ServerOp>, ProtocolError> {
    let line_end = match find_crlf(buf) {
        Some(idx) => idx,
        None => return Ok(None),
    };

    let line = std::str::from_utf8(&buf[..line_end])
        .map_err(|_| ProtocolError::InvalidMessage {
            reason: "command line is not valid UTF-8".to_string(),
        })?
        .to_string();

    let (cmd, rest) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim_start()),
        None => (line.as_str(), ""),
    };

    match cmd.to_ascii_uppercase().as_str() {
        "PING" => {
            buf.advance(line_end + 2);
            Ok(Some(ServerOp::Ping))
        }
        "PONG" => {
            buf.advance(line_end + 2);
            Ok(Some(ServerOp::Pong))
        }
        "+OK" => {
            buf.advance(line_end + 2);
            Ok(Some(ServerOp::Ok))
        }
        "-ERR" => {
            let message = rest.trim().trim_matches(|c| c == '\'' || c == '"').to_string();
            buf.advance(line_end + 2);
            Ok(Some(ServerOp::Err(message)))
        }
        "INFO" => {
            if rest.is_empty() {
                return Err(ProtocolError::InvalidMessage {
                    reason: "INFO missing JSON payload".to_string(),
                });
            }
            let info: ServerInfo = serde_json::from_str(rest).map_err(|err| {
                ProtocolError::InvalidMessage {
                    reason: format!("invalid INFO payload: {err}"),
                }
            })?;
            buf.advance(line_end + 2);
            Ok(Some(ServerOp::Info(Box::new(info))))
        }
        "MSG" => decode_msg(buf, line_end, rest),
        "HMSG" => decode_hmsg(buf, line_end, rest),
        _ => Err(ProtocolError::InvalidMessage {
            reason: format!("unknown command: {cmd}"),
        }),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_nonneg_i64(s: &str, what: &str) -> Result<i64, ProtocolError> {
    let n: i64 = s.parse().map_err(|_| ProtocolError::InvalidMessage {
        reason: format!("invalid {what}: {s}"),
    })?;
    if n < 0 {
        return Err(ProtocolError::InvalidMessage {
            reason: format!("{what} must be non-negative: {s}"),
        });
    }
    Ok(n)
}

fn decode_msg(buf: &mut BytesMut, line_end: usize, rest: &str) -> Result<Option<ServerOp>, ProtocolError> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    let (subject, sid, reply, n) = match args.as_slice() {
        [subject, sid, n] => (*subject, *sid, None, *n),
        [subject, sid, reply, n] => (*subject, *sid, Some(*reply), *n),
        _ => {
            return Err(ProtocolError::InvalidMessage {
                reason: "invalid number of arguments after MSG".to_string(),
            })
        }
    };
    let n = parse_nonneg_i64(n, "payload size")? as usize;

    let header_end = line_end + 2;
    let frame_end = header_end + n + 2;
    if buf.len() < frame_end {
        return Ok(None);
    }

    let subject = subject.to_string();
    let sid = sid.to_string();
    let reply = reply.map(|r| r.to_string());

    buf.advance(header_end);
    let payload = buf.split_to(n).freeze();
    buf.advance(2);

    Ok(Some(ServerOp::Msg {
        subject,
        sid,
        reply,
        payload,
    }))
}

fn decode_hmsg(buf: &mut BytesMut, line_end: usize, rest: &str) -> Result<Option<ServerOp>, ProtocolError> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    let (subject, sid, reply, hlen, tlen) = match args.as_slice() {
        [subject, sid, hlen, tlen] => (*subject, *sid, None, *hlen, *tlen),
        [subject, sid, reply, hlen, tlen] => (*subject, *sid, Some(*reply), *hlen, *tlen),
        _ => {
            return Err(ProtocolError::InvalidMessage {
                reason: "invalid number of arguments after HMSG".to_string(),
            })
        }
    };
    let hlen = parse_nonneg_i64(hlen, "header length")? as usize;
    let tlen = parse_nonneg_i64(tlen, "total length")? as usize;
    if tlen < hlen {
        return Err(ProtocolError::InvalidMessage {
            reason: "total length is smaller than header length".to_string(),
        });
    }

    let header_start = line_end + 2;
    let frame_end = header_start + tlen + 2;
    if buf.len() < frame_end {
        return Ok(None);
    }

    let subject = subject.to_string();
    let sid = sid.to_string();
    let reply = reply.map(|r| r.to_string());

    buf.advance(header_start);
    let header_block = buf.split_to(hlen).freeze();
    let payload = buf.split_to(tlen - hlen).freeze();
    buf.advance(2);

    let headers = HeaderMap::parse(&header_block)?;

    Ok(Some(ServerOp::Hmsg {
        subject,
        sid,
        reply,
        headers,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderMap;

    fn encoded(op: ClientOp) -> BytesMut {
        let mut buf = BytesMut::new();
        encode(&op, &mut buf);
        buf
    }

    #[test]
    fn encodes_pub_without_reply() {
        let buf = encoded(ClientOp::Pub {
            subject: "foo".into(),
            reply: None,
            payload: Bytes::from_static(b"hello"),
        });
        assert_eq!(&buf[..], b"PUB foo 5\r\nhello\r\n");
    }

    #[test]
    fn encodes_pub_with_reply() {
        let buf = encoded(ClientOp::Pub {
            subject: "foo".into(),
            reply: Some("bar".into()),
            payload: Bytes::from_static(b"hi"),
        });
        assert_eq!(&buf[..], b"PUB foo bar 2\r\nhi\r\n");
    }

    #[test]
    fn encodes_sub_with_queue() {
        let buf = encoded(ClientOp::Sub {
            subject: "foo".into(),
            queue_group: Some("wq".into()),
            sid: "1".into(),
        });
        assert_eq!(&buf[..], b"SUB foo wq 1\r\n");
    }

    #[test]
    fn encodes_unsub_with_max() {
        let buf = encoded(ClientOp::Unsub {
            sid: "3".into(),
            max_messages: Some(5),
        });
        assert_eq!(&buf[..], b"UNSUB 3 5\r\n");
    }

    #[test]
    fn encodes_hpub_header_block() {
        let mut headers = HeaderMap::new();
        headers.insert("X-A", "1");
        let buf = encoded(ClientOp::Hpub {
            subject: "foo".into(),
            reply: None,
            headers,
            payload: Bytes::from_static(b"hi"),
        });
        let expected_headers = b"NATS/1.0\r\nX-A: 1\r\n\r\n";
        let hlen = expected_headers.len();
        let tlen = hlen + 2;
        let mut expected = format!("HPUB foo {hlen} {tlen}\r\n").into_bytes();
        expected.extend_from_slice(expected_headers);
        expected.extend_from_slice(b"hi\r\n");
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn decodes_ping_pong_ok() {
        let mut buf = BytesMut::from(&b"PING\r\nPONG\r\n+OK\r\n"[..]);
        assert!(matches!(decode(&mut buf).unwrap(), Some(ServerOp::Ping)));
        assert!(matches!(decode(&mut buf).unwrap(), Some(ServerOp::Pong)));
        assert!(matches!(decode(&mut buf).unwrap(), Some(ServerOp::Ok)));
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_err_stripping_quotes() {
        let mut buf = BytesMut::from(&b"-ERR 'Unknown Subject'\r\n"[..]);
        match decode(&mut buf).unwrap() {
            Some(ServerOp::Err(msg)) => assert_eq!(msg, "Unknown Subject"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decodes_info() {
        let mut buf = BytesMut::from(&b"INFO {\"server_id\":\"abc\",\"max_payload\":1048576}\r\n"[..]);
        match decode(&mut buf).unwrap() {
            Some(ServerOp::Info(info)) => {
                assert_eq!(info.server_id, "abc");
                assert_eq!(info.max_payload, 1048576);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decodes_msg_with_and_without_reply() {
        let mut buf = BytesMut::from(&b"MSG foo.bar 9 5\r\nhello\r\n"[..]);
        match decode(&mut buf).unwrap() {
            Some(ServerOp::Msg {
                subject,
                sid,
                reply,
                payload,
            }) => {
                assert_eq!(subject, "foo.bar");
                assert_eq!(sid, "9");
                assert_eq!(reply, None);
                assert_eq!(&payload[..], b"hello");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut buf = BytesMut::from(&b"MSG foo.bar 9 reply.to 5\r\nhello\r\n"[..]);
        match decode(&mut buf).unwrap() {
            Some(ServerOp::Msg { reply, .. }) => assert_eq!(reply.as_deref(), Some("reply.to")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn decode_resumes_across_split_chunks() {
        let frame = b"MSG foo.bar 9 5\r\nhello\r\n";
        for split in 0..frame.len() {
            let mut buf = BytesMut::from(&frame[..split]);
            assert!(decode(&mut buf).unwrap().is_none(), "split at {split}");
            buf.extend_from_slice(&frame[split..]);
            match decode(&mut buf).unwrap() {
                Some(ServerOp::Msg { payload, .. }) => assert_eq!(&payload[..], b"hello"),
                other => panic!("unexpected at split {split}: {other:?}"),
            }
        }
    }

    #[test]
    fn decodes_hmsg() {
        let headers = b"NATS/1.0\r\nX-A: 1\r\n\r\n";
        let hlen = headers.len();
        let payload = b"hi";
        let tlen = hlen + payload.len();
        let mut frame = format!("HMSG foo 2 {hlen} {tlen}\r\n").into_bytes();
        frame.extend_from_slice(headers);
        frame.extend_from_slice(payload);
        frame.extend_from_slice(b"\r\n");

        let mut buf = BytesMut::from(&frame[..]);
        match decode(&mut buf).unwrap() {
            Some(ServerOp::Hmsg {
                subject,
                sid,
                headers,
                payload,
                ..
            }) => {
                assert_eq!(subject, "foo");
                assert_eq!(sid, "2");
                assert_eq!(headers.get("x-a").unwrap().0, "1");
                assert_eq!(&payload[..], b"hi");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_invalid_message() {
        let mut buf = BytesMut::from(&b"BOGUS\r\n"[..]);
        assert!(decode(&mut buf).is_err());
    }

    #[test]
    fn non_numeric_size_is_invalid_message() {
        let mut buf = BytesMut::from(&b"MSG foo 1 notanumber\r\n"[..]);
        assert!(decode(&mut buf).is_err());
    }

    #[test]
    fn missing_info_payload_is_invalid_message() {
        let mut buf = BytesMut::from(&b"INFO \r\n"[..]);
        assert!(decode(&mut buf).is_err());
    }
}
