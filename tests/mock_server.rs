//! Integration tests against a hand-rolled mock NATS listener: no external
//! `nats-server` binary involved, just enough of the wire protocol to drive
//! connect/subscribe/publish/deliver and request/reply end to end.

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

/// Accepts one connection and drives the INFO/CONNECT/PING/PONG handshake,
/// returning split halves for the rest of the scripted exchange.
async fn accept_and_handshake(listener: &TcpListener) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let (stream, _) = listener.accept().await.expect("accept");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half
        .write_all(b"INFO {\"server_id\":\"mock\",\"max_payload\":1048576,\"headers\":true}\r\n")
        .await
        .expect("write INFO");

    let mut connect_line = String::new();
    reader.read_line(&mut connect_line).await.expect("read CONNECT");
    assert!(connect_line.starts_with("CONNECT "), "expected CONNECT, got {connect_line:?}");

    let mut ping_line = String::new();
    reader.read_line(&mut ping_line).await.expect("read PING");
    assert_eq!(ping_line.trim_end(), "PING");

    write_half.write_all(b"PONG\r\n").await.expect("write PONG");

    (reader, write_half)
}

/// Reads one line, stripping the trailing CRLF.
async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read line");
    line.trim_end().to_string()
}

fn local_server(listener: &TcpListener) -> String {
    format!("127.0.0.1:{}", listener.local_addr().unwrap().port())
}

#[tokio::test]
async fn publish_and_subscribe_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = local_server(&listener);

    let server = tokio::spawn(async move {
        let (mut reader, mut writer) = accept_and_handshake(&listener).await;

        let sub_line = read_line(&mut reader).await;
        let sid = sub_line.split_whitespace().last().unwrap().to_string();
        assert!(sub_line.starts_with("SUB greet.joe"));

        let payload = b"hello joe";
        writer
            .write_all(format!("MSG greet.joe {sid} {}\r\n", payload.len()).as_bytes())
            .await
            .unwrap();
        writer.write_all(payload).await.unwrap();
        writer.write_all(b"\r\n").await.unwrap();
    });

    let client = corenats::connect(addr).await.expect("connect");
    let mut subscriber = client.subscribe("greet.joe").await.expect("subscribe");
    let message = subscriber.next().await.expect("message delivered");
    assert_eq!(&message.payload[..], b"hello joe");
    assert_eq!(message.subject, "greet.joe");

    server.await.unwrap();
}

#[tokio::test]
async fn request_reply_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = local_server(&listener);

    let server = tokio::spawn(async move {
        let (mut reader, mut writer) = accept_and_handshake(&listener).await;

        // the actor lazily subscribes a shared inbox wildcard before its
        // first request.
        let inbox_sub = read_line(&mut reader).await;
        assert!(inbox_sub.starts_with("SUB _INBOX."));
        let inbox_sid = inbox_sub.split_whitespace().nth(2).unwrap().to_string();

        let pub_line = read_line(&mut reader).await;
        let parts: Vec<&str> = pub_line.split_whitespace().collect();
        assert_eq!(parts[0], "PUB");
        assert_eq!(parts[1], "svc.add");
        let reply_subject = parts[2].to_string();
        let len: usize = parts[3].parse().unwrap();

        let mut body = vec![0u8; len + 2];
        tokio::io::AsyncReadExt::read_exact(&mut reader, &mut body).await.unwrap();
        assert_eq!(&body[..len], b"2+2");

        let answer = b"4";
        writer
            .write_all(format!("MSG {reply_subject} {inbox_sid} {}\r\n", answer.len()).as_bytes())
            .await
            .unwrap();
        writer.write_all(answer).await.unwrap();
        writer.write_all(b"\r\n").await.unwrap();
    });

    let client = corenats::connect(addr).await.expect("connect");
    let reply = client.request("svc.add", "2+2").await.expect("request");
    assert_eq!(&reply.payload[..], b"4");

    server.await.unwrap();
}

#[tokio::test]
async fn request_without_responders_surfaces_no_responders() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = local_server(&listener);

    let server = tokio::spawn(async move {
        let (mut reader, mut writer) = accept_and_handshake(&listener).await;

        let inbox_sub = read_line(&mut reader).await;
        let inbox_sid = inbox_sub.split_whitespace().nth(2).unwrap().to_string();

        let pub_line = read_line(&mut reader).await;
        let parts: Vec<&str> = pub_line.split_whitespace().collect();
        let reply_subject = parts[2].to_string();
        let len: usize = parts[3].parse().unwrap();
        let mut body = vec![0u8; len + 2];
        tokio::io::AsyncReadExt::read_exact(&mut reader, &mut body).await.unwrap();

        let header_block = b"NATS/1.0 503\r\n\r\n";
        let hlen = header_block.len();
        writer
            .write_all(format!("HMSG {reply_subject} {inbox_sid} {hlen} {hlen}\r\n").as_bytes())
            .await
            .unwrap();
        writer.write_all(header_block).await.unwrap();
        writer.write_all(b"\r\n").await.unwrap();
    });

    let client = corenats::connect(addr).await.expect("connect");
    let err = client.request("svc.nobody", "ping").await.expect_err("no responders");
    assert_eq!(err.to_string(), "no responders for svc.nobody");

    server.await.unwrap();
}

#[tokio::test]
async fn queue_group_delivers_to_a_single_member() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = local_server(&listener);

    let server = tokio::spawn(async move {
        let (mut reader, mut writer) = accept_and_handshake(&listener).await;

        let first_sub = read_line(&mut reader).await;
        let second_sub = read_line(&mut reader).await;
        assert!(first_sub.starts_with("SUB work.queue wq"));
        assert!(second_sub.starts_with("SUB work.queue wq"));
        let winning_sid = first_sub.split_whitespace().last().unwrap().to_string();

        let payload = b"job-1";
        writer
            .write_all(format!("MSG work.queue {winning_sid} {}\r\n", payload.len()).as_bytes())
            .await
            .unwrap();
        writer.write_all(payload).await.unwrap();
        writer.write_all(b"\r\n").await.unwrap();
    });

    let client = corenats::connect(addr).await.expect("connect");
    let mut first = client.queue_subscribe("work.queue", "wq").await.expect("subscribe 1");
    let mut second = client.queue_subscribe("work.queue", "wq").await.expect("subscribe 2");

    let message = first.next().await.expect("first member receives the job");
    assert_eq!(&message.payload[..], b"job-1");

    let nothing = tokio::time::timeout(std::time::Duration::from_millis(100), second.next()).await;
    assert!(nothing.is_err(), "second member should not have received anything");

    server.await.unwrap();
}
