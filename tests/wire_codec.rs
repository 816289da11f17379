//! Wire codec integration tests
//!
//! Exercises the parser over a real async pipe, including slow byte-at-a-time
//! delivery, chunked bodies, and the no-body status codes.

use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use siip_proxy::http1::wire::{
    read_request, read_response, write_request, write_response, HttpRequest, HttpResponse,
};
use siip_proxy::http1::{HeaderMap, RewindStream};

async fn parse_request_delivered_in(raw: &'static [u8], chunk: usize) -> HttpRequest {
    let (mut tx, rx) = tokio::io::duplex(256);
    tokio::spawn(async move {
        for piece in raw.chunks(chunk) {
            tx.write_all(piece).await.unwrap();
            tx.flush().await.unwrap();
            tokio::task::yield_now().await;
        }
    });
    let mut stream = RewindStream::new(rx);
    read_request(&mut stream).await.unwrap().unwrap()
}

async fn parse_response_from(raw: &'static [u8]) -> HttpResponse {
    let (mut tx, rx) = tokio::io::duplex(256);
    tokio::spawn(async move {
        tx.write_all(raw).await.unwrap();
    });
    let mut stream = RewindStream::new(rx);
    read_response(&mut stream).await.unwrap()
}

#[tokio::test]
async fn test_chunk_boundary_invariance() {
    const RAW: &[u8] =
        b"POST /submit HTTP/1.1\r\nHost: example.com\r\nContent-Length: 11\r\n\r\nhello world";

    let whole = parse_request_delivered_in(RAW, RAW.len()).await;
    assert_eq!(whole.method, "POST");
    assert_eq!(whole.body, Some(Bytes::from_static(b"hello world")));

    for chunk_size in [1, 2, 3, 5, 7, 13] {
        let pieced = parse_request_delivered_in(RAW, chunk_size).await;
        assert_eq!(pieced, whole, "differs at chunk size {chunk_size}");
    }
}

#[tokio::test]
async fn test_chunked_body_reassembled() {
    let response = parse_response_from(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
    )
    .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body, Some(Bytes::from_static(b"Wikipedia")));
}

#[tokio::test]
async fn test_chunked_delivered_byte_at_a_time() {
    const RAW: &[u8] =
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n1\r\nd\r\n0\r\n\r\n";

    let (mut tx, rx) = tokio::io::duplex(256);
    tokio::spawn(async move {
        for byte in RAW {
            tx.write_all(&[*byte]).await.unwrap();
            tx.flush().await.unwrap();
            tokio::task::yield_now().await;
        }
    });
    let mut stream = RewindStream::new(rx);
    let response = read_response(&mut stream).await.unwrap();
    assert_eq!(response.body, Some(Bytes::from_static(b"abcd")));
}

#[tokio::test]
async fn test_no_body_statuses_ignore_content_length() {
    for head in [
        "HTTP/1.1 204 No Content\r\nContent-Length: 5\r\n\r\n",
        "HTTP/1.1 304 Not Modified\r\nContent-Length: 5\r\n\r\n",
        "HTTP/1.1 100 Continue\r\nContent-Length: 5\r\n\r\n",
    ] {
        let (mut tx, rx) = tokio::io::duplex(256);
        let raw = head.as_bytes().to_vec();
        tokio::spawn(async move {
            tx.write_all(&raw).await.unwrap();
        });
        let mut stream = RewindStream::new(rx);
        let response = read_response(&mut stream).await.unwrap();
        assert_eq!(response.body, None, "body not absent for {head:?}");
    }
}

#[tokio::test]
async fn test_close_delimited_response_body() {
    let response = parse_response_from(b"HTTP/1.1 200 OK\r\n\r\nuntil the connection closes").await;
    assert_eq!(
        response.body,
        Some(Bytes::from_static(b"until the connection closes"))
    );
}

#[tokio::test]
async fn test_repeated_headers_comma_join_on_the_wire() {
    let request =
        parse_request_delivered_in(b"GET / HTTP/1.1\r\nX-A: 1\r\nX-A: 2\r\nHost: x\r\n\r\n", 4)
            .await;
    assert_eq!(request.headers.get("X-A"), Some("1,2"));
}

#[tokio::test]
async fn test_request_serialization_round_trips() {
    let request = HttpRequest {
        method: "PUT".to_string(),
        target: "/thing".to_string(),
        version: "HTTP/1.1".to_string(),
        headers: HeaderMap::from([("Host", "example.com"), ("Content-Length", "4")]),
        body: Some(Bytes::from_static(b"data")),
    };

    let (mut tx, rx) = tokio::io::duplex(1024);
    write_request(&mut tx, &request).await.unwrap();
    drop(tx);

    let mut stream = RewindStream::new(rx);
    let parsed = read_request(&mut stream).await.unwrap().unwrap();
    assert_eq!(parsed, request);
}

#[tokio::test]
async fn test_response_serialization_round_trips() {
    let response = HttpResponse {
        version: "HTTP/1.1".to_string(),
        status: 201,
        reason: "Created".to_string(),
        headers: HeaderMap::from([("Content-Length", "2"), ("X-B", "b")]),
        body: Some(Bytes::from_static(b"ok")),
    };

    let (mut tx, rx) = tokio::io::duplex(1024);
    write_response(&mut tx, &response).await.unwrap();
    drop(tx);

    let mut stream = RewindStream::new(rx);
    let parsed = read_response(&mut stream).await.unwrap();
    assert_eq!(parsed, response);
}

#[tokio::test]
async fn test_idle_close_is_not_an_error() {
    let (tx, rx) = tokio::io::duplex(16);
    drop(tx);
    let mut stream = RewindStream::new(rx);
    assert!(read_request(&mut stream).await.unwrap().is_none());
}
