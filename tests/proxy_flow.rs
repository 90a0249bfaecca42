//! End-to-end exchanges through a running proxy.

mod common;

use std::time::{Duration, Instant};

use common::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const BODY_50: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMN";

#[tokio::test]
async fn get_is_rebuilt_and_response_relayed_exactly() {
    let mut origin = start_origin(BODY_50).await;
    let proxy = start_proxy(|_| {});
    let port = origin.addr.port();

    let mut client = connect(proxy.addr).await;
    let request = format!(
        "GET http://127.0.0.1:{port}/index.html HTTP/1.1\r\n\
         Host: 127.0.0.1:{port}\r\n\
         Cookie: session=abc\r\n\
         Accept-Encoding: gzip\r\n\
         Accept: text/html\r\n\
         Connection: close\r\n\r\n"
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let seen = origin.next_request().await;
    assert_eq!(
        String::from_utf8(seen).unwrap(),
        "GET /index.html HTTP/1.1\r\n\
         User-Agent: MYProxy/1.0\r\n\
         Accept: text/html\r\n\
         Host: 127.0.0.1\r\n\
         Accept-Encoding: gzip\r\n\
         Connection: Keep-Alive\r\n\r\n"
    );

    let expected = origin_response(BODY_50);
    let received = read_exactly(&mut client, expected.len()).await;
    assert_eq!(received, expected);
}

#[tokio::test]
async fn same_target_reuses_upstream() {
    let first = start_origin("first").await;
    let second = start_origin("second").await;
    let proxy = start_proxy(|_| {});
    let mut client = connect(proxy.addr).await;

    for _ in 0..2 {
        client
            .write_all(get_request(first.addr, "/a").as_bytes())
            .await
            .unwrap();
        let expected = origin_response("first");
        assert_eq!(read_exactly(&mut client, expected.len()).await, expected);
    }
    assert_eq!(first.accepted(), 1);

    client
        .write_all(get_request(second.addr, "/b").as_bytes())
        .await
        .unwrap();
    let expected = origin_response("second");
    assert_eq!(read_exactly(&mut client, expected.len()).await, expected);
    assert_eq!(first.accepted(), 1);
    assert_eq!(second.accepted(), 1);

    // switching target tears down the previous upstream
    wait_until(|| first.closed() == 1).await;
    assert_eq!(second.closed(), 0);
}

#[tokio::test]
async fn large_body_relayed_exactly_over_reused_upstream() {
    let body = patterned_body(3 << 20);
    let origin = start_origin(body).await;
    let proxy = start_proxy(|_| {});
    let mut client = connect(proxy.addr).await;

    let expected = origin_response(body);
    for _ in 0..2 {
        client
            .write_all(get_request(origin.addr, "/large").as_bytes())
            .await
            .unwrap();
        let received = read_exactly(&mut client, expected.len()).await;
        assert!(received == expected, "body differs from origin response");
    }
    assert_eq!(origin.accepted(), 1);
}

#[tokio::test]
async fn connect_tunnels_bytes_unparsed() {
    let echo = start_echo().await;
    let proxy = start_proxy(|_| {});
    let mut client = connect(proxy.addr).await;

    client
        .write_all(format!("CONNECT {echo} HTTP/1.1\r\nHost: {echo}\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let frame = b"HTTP/1.1 200 Connection established\r\nProxy-Agent: ProxyServer/1.0\r\n\r\n";
    assert_eq!(read_exactly(&mut client, frame.len()).await, frame);

    // looks like a request, must pass through untouched
    let payload = b"\x16\x03\x01 GET / HTTP/1.1\r\n\r\n binary \x00\xff";
    client.write_all(payload).await.unwrap();
    assert_eq!(read_exactly(&mut client, payload.len()).await, payload);
}

#[tokio::test]
async fn large_tunnel_payload_echoes_exactly() {
    let echo = start_echo().await;
    let proxy = start_proxy(|_| {});
    let mut client = connect(proxy.addr).await;

    client
        .write_all(format!("CONNECT {echo} HTTP/1.1\r\nHost: {echo}\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let frame = b"HTTP/1.1 200 Connection established\r\nProxy-Agent: ProxyServer/1.0\r\n\r\n";
    assert_eq!(read_exactly(&mut client, frame.len()).await, frame);

    let payload: Vec<u8> = (0..4_000_000u32).map(|i| (i % 251) as u8).collect();
    let (mut reader, mut writer) = client.into_split();
    let outgoing = payload.clone();
    let sender = tokio::spawn(async move {
        writer.write_all(&outgoing).await.unwrap();
        writer
    });

    let mut echoed = vec![0u8; payload.len()];
    tokio::time::timeout(Duration::from_secs(10), reader.read_exact(&mut echoed))
        .await
        .expect("tunnel echo timed out")
        .unwrap();
    assert!(echoed == payload, "tunnel altered the payload");
    drop(sender.await.unwrap());
}

#[tokio::test]
async fn oversized_request_header_is_accepted() {
    let mut origin = start_origin("ok").await;
    let proxy = start_proxy(|_| {});
    let mut client = connect(proxy.addr).await;

    let padding = "p".repeat(3000);
    let request = format!(
        "GET http://{}/big HTTP/1.1\r\nHost: {}\r\nX-Padding: {padding}\r\n\r\n",
        origin.addr, origin.addr
    );
    assert!(request.len() > 2048);
    client.write_all(request.as_bytes()).await.unwrap();

    let seen = String::from_utf8(origin.next_request().await).unwrap();
    assert!(seen.starts_with("GET /big HTTP/1.1\r\n"));
    assert!(!seen.contains("X-Padding"));

    let expected = origin_response("ok");
    assert_eq!(read_exactly(&mut client, expected.len()).await, expected);
}

#[tokio::test]
async fn unsupported_method_closes_client() {
    let origin = start_origin("unused").await;
    let proxy = start_proxy(|_| {});
    let mut client = connect(proxy.addr).await;

    let request = format!(
        "POST http://{}/form HTTP/1.1\r\nHost: {}\r\nContent-Length: 0\r\n\r\n",
        origin.addr, origin.addr
    );
    client.write_all(request.as_bytes()).await.unwrap();

    assert!(read_to_close(&mut client).await.is_empty());
    assert_eq!(origin.accepted(), 0);
}

#[tokio::test]
async fn upstream_connect_failure_closes_client() {
    let target = closed_port();
    let proxy = start_proxy(|_| {});
    let mut client = connect(proxy.addr).await;

    client
        .write_all(get_request(target, "/").as_bytes())
        .await
        .unwrap();

    assert!(read_to_close(&mut client).await.is_empty());
}

#[tokio::test]
async fn unframed_response_is_delivered_before_close() {
    let raw: &'static [u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nuntil close";
    let origin = start_closing_origin(raw).await;
    let proxy = start_proxy(|_| {});
    let mut client = connect(proxy.addr).await;

    client
        .write_all(get_request(origin, "/stream").as_bytes())
        .await
        .unwrap();

    assert_eq!(read_to_close(&mut client).await, raw);
}

#[tokio::test]
async fn http_client_through_proxy() {
    let origin = start_origin(BODY_50).await;
    let proxy = start_proxy(|_| {});

    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{}", proxy.addr)).unwrap())
        .build()
        .unwrap();

    let response = client
        .get(format!("http://{}/hello", origin.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), BODY_50);
    assert_eq!(origin.accepted(), 1);
}

#[tokio::test]
async fn shutdown_stops_event_loop() {
    let proxy = start_proxy(|config| config.timeouts.idle_secs = 1);
    let _client = connect(proxy.addr).await;
    assert!(proxy.stop().is_ok());
}

#[tokio::test]
async fn idle_client_is_closed_by_sweep() {
    let proxy = start_proxy(|config| config.timeouts.idle_secs = 1);
    let started = Instant::now();
    let mut client = connect(proxy.addr).await;

    assert!(read_to_close(&mut client).await.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn client_close_mid_exchange_closes_upstream() {
    let mut origin = start_silent_origin().await;
    let proxy = start_proxy(|_| {});
    let mut client = connect(proxy.addr).await;

    client
        .write_all(get_request(origin.addr, "/slow").as_bytes())
        .await
        .unwrap();
    origin.next_request().await;
    assert_eq!(origin.closed(), 0);

    drop(client);
    wait_until(|| origin.closed() == 1).await;
}
