//! HTTP/1.x wire codec
//!
//! Stateful parser producing requests and responses from a [`RewindStream`],
//! plus the matching serializer. The parse path runs START -> HEADERS -> BODY
//! -> DONE; bytes read past the header/body boundary are pushed back into the
//! stream so the body phase sees them untouched.
//!
//! The HTTP spec is full of corner cases and rarely-used extra features; the
//! ones known to be missing here are trailers, multipart/byteranges, and
//! Transfer-Encoding values other than `chunked`.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::{ProxyError, Result};
use crate::http1::headers::HeaderMap;
use crate::http1::stream::RewindStream;

const READ_CHUNK: usize = 4096;

/// A parsed HTTP request. `body: None` means no body was declared.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// A parsed HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpResponse {
    /// Length of the body in bytes, 0 when absent.
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map(|b| b.len()).unwrap_or(0)
    }
}

/// Which side of the exchange a body belongs to. Responses get the extra
/// status-code and close-delimited rules.
#[derive(Debug, Clone, Copy)]
enum BodyKind {
    Request,
    Response { status: u16 },
}

/// Read and parse a request's start line and headers, leaving the body
/// unread. Returns `Ok(None)` when the peer closes before sending anything
/// (idle connection teardown, not an error).
pub async fn read_request_head<S: AsyncRead + Unpin>(
    stream: &mut RewindStream<S>,
) -> Result<Option<HttpRequest>> {
    let (start, headers) = match read_head(stream).await? {
        Some(head) => head,
        None => return Ok(None),
    };

    let fields: Vec<&str> = start.splitn(3, ' ').collect();
    if fields.len() != 3 || fields[0].is_empty() || fields[1].is_empty() || fields[2].is_empty() {
        return Err(ProxyError::parse(format!("malformed request line: {start:?}")));
    }

    Ok(Some(HttpRequest {
        method: fields[0].to_string(),
        target: fields[1].to_string(),
        version: fields[2].to_string(),
        headers,
        body: None,
    }))
}

/// Finish parsing a request whose head has already been read.
pub async fn read_request_body<S: AsyncRead + Unpin>(
    stream: &mut RewindStream<S>,
    request: &mut HttpRequest,
) -> Result<()> {
    request.body = read_body(stream, &request.headers, BodyKind::Request).await?;
    Ok(())
}

/// Read and parse a complete request. `Ok(None)` on close-before-any-bytes.
pub async fn read_request<S: AsyncRead + Unpin>(
    stream: &mut RewindStream<S>,
) -> Result<Option<HttpRequest>> {
    let mut request = match read_request_head(stream).await? {
        Some(request) => request,
        None => return Ok(None),
    };
    read_request_body(stream, &mut request).await?;
    Ok(Some(request))
}

/// Read and parse a complete response. A close before the head is complete is
/// a `ConnectionClosed` error; unlike the request path there is no benign
/// "no response" outcome.
pub async fn read_response<S: AsyncRead + Unpin>(
    stream: &mut RewindStream<S>,
) -> Result<HttpResponse> {
    let (start, headers) = read_head(stream)
        .await?
        .ok_or(ProxyError::ConnectionClosed)?;

    let fields: Vec<&str> = start.splitn(3, ' ').collect();
    if fields.len() != 3 || fields[0].is_empty() || fields[1].is_empty() {
        return Err(ProxyError::parse(format!("malformed status line: {start:?}")));
    }
    let status: u16 = fields[1]
        .parse()
        .map_err(|_| ProxyError::parse(format!("invalid status code: {:?}", fields[1])))?;

    let mut response = HttpResponse {
        version: fields[0].to_string(),
        status,
        reason: fields[2].to_string(),
        headers,
        body: None,
    };
    response.body = read_body(stream, &response.headers, BodyKind::Response { status }).await?;
    Ok(response)
}

/// Serialize a request: start line, headers in stored order, blank line, body.
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &HttpRequest,
) -> std::io::Result<()> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            request.method, request.target, request.version
        )
        .as_bytes(),
    );
    write_headers(&mut out, &request.headers);
    if let Some(body) = &request.body {
        out.extend_from_slice(body);
    }
    writer.write_all(&out).await?;
    writer.flush().await
}

/// Serialize a response: status line, headers in stored order, blank line, body.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &HttpResponse,
) -> std::io::Result<()> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            response.version, response.status, response.reason
        )
        .as_bytes(),
    );
    write_headers(&mut out, &response.headers);
    if let Some(body) = &response.body {
        out.extend_from_slice(body);
    }
    writer.write_all(&out).await?;
    writer.flush().await
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderMap) {
    for (name, value) in headers.iter() {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// Accumulate until the blank line ending the header block, then split into
/// the start line and parsed headers. Excess bytes beyond the blank line are
/// pushed back into the stream. `Ok(None)` only when the peer closed before
/// any bytes arrived.
async fn read_head<S: AsyncRead + Unpin>(
    stream: &mut RewindStream<S>,
) -> Result<Option<(String, HeaderMap)>> {
    let mut buf = BytesMut::new();
    let head_end = loop {
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos;
        }
        let chunk = stream.read_chunk(READ_CHUNK).await?;
        if chunk.is_empty() {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(ProxyError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk);
    };

    let head = buf.split_to(head_end);
    let _ = buf.split_to(4); // the blank line itself
    stream.unread(&buf);

    let text = std::str::from_utf8(&head)
        .map_err(|_| ProxyError::parse("non-UTF-8 bytes in message head"))?;
    let mut lines = text.split("\r\n");
    let start = lines
        .next()
        .ok_or_else(|| ProxyError::parse("empty message head"))?
        .to_string();

    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = line
            .split_once(": ")
            .ok_or_else(|| ProxyError::parse(format!("malformed header line: {line:?}")))?;
        headers.append(name, value);
    }

    Ok(Some((start, headers)))
}

/// Body-length policy, evaluated in spec precedence order.
async fn read_body<S: AsyncRead + Unpin>(
    stream: &mut RewindStream<S>,
    headers: &HeaderMap,
    kind: BodyKind,
) -> Result<Option<Bytes>> {
    // Status codes that can never carry a body, no matter what the headers say
    if let BodyKind::Response { status } = kind {
        if status < 200 || status == 204 || status == 304 {
            return Ok(None);
        }
    }

    if let Some(te) = headers.get("Transfer-Encoding") {
        if te.eq_ignore_ascii_case("chunked") {
            return read_chunked(stream).await.map(Some);
        }
        return Err(ProxyError::parse(format!(
            "unsupported Transfer-Encoding: {te}"
        )));
    }

    if let Some(cl) = headers.get("Content-Length") {
        let length: usize = cl
            .trim()
            .parse()
            .map_err(|_| ProxyError::parse(format!("invalid Content-Length: {cl:?}")))?;
        return read_exact_body(stream, length).await.map(Some);
    }

    match kind {
        // No indicator on a request means no body follows
        BodyKind::Request => Ok(None),
        // No indicator on a response means the body runs until close
        BodyKind::Response { .. } => read_until_close(stream).await.map(Some),
    }
}

/// Chunked decoding: hex size line, that many bytes, CRLF; a 0 chunk ends the
/// body. Trailer headers after the final chunk are not supported.
async fn read_chunked<S: AsyncRead + Unpin>(stream: &mut RewindStream<S>) -> Result<Bytes> {
    let mut body = BytesMut::new();
    let mut buf = BytesMut::new();
    loop {
        let line = next_line(stream, &mut buf).await?;
        let text = std::str::from_utf8(&line)
            .map_err(|_| ProxyError::parse("non-UTF-8 chunk size line"))?;
        let size = usize::from_str_radix(text.trim(), 16)
            .map_err(|_| ProxyError::parse(format!("invalid chunk size: {text:?}")))?;

        let data = take_exact(stream, &mut buf, size).await?;
        let crlf = take_exact(stream, &mut buf, 2).await?;
        if &crlf[..] != b"\r\n" {
            return Err(ProxyError::parse("missing CRLF after chunk data"));
        }

        if size == 0 {
            stream.unread(&buf);
            return Ok(body.freeze());
        }
        body.extend_from_slice(&data);
    }
}

/// Read exactly `length` body bytes; anything past them is pushed back.
async fn read_exact_body<S: AsyncRead + Unpin>(
    stream: &mut RewindStream<S>,
    length: usize,
) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    let data = take_exact(stream, &mut buf, length).await?;
    stream.unread(&buf);
    Ok(data)
}

/// Close-delimited body: accumulate until the peer closes.
async fn read_until_close<S: AsyncRead + Unpin>(stream: &mut RewindStream<S>) -> Result<Bytes> {
    let mut body = BytesMut::new();
    loop {
        let chunk = stream.read_chunk(READ_CHUNK).await?;
        if chunk.is_empty() {
            return Ok(body.freeze());
        }
        body.extend_from_slice(&chunk);
    }
}

/// Pull the next CRLF-terminated line out of `buf`, reading more from the
/// stream as needed. The CRLF is consumed but not returned.
async fn next_line<S: AsyncRead + Unpin>(
    stream: &mut RewindStream<S>,
    buf: &mut BytesMut,
) -> Result<BytesMut> {
    loop {
        if let Some(pos) = find_subslice(buf, b"\r\n") {
            let line = buf.split_to(pos);
            let _ = buf.split_to(2);
            return Ok(line);
        }
        let chunk = stream.read_chunk(READ_CHUNK).await?;
        if chunk.is_empty() {
            return Err(ProxyError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk);
    }
}

/// Take exactly `n` bytes, reading more from the stream as needed.
async fn take_exact<S: AsyncRead + Unpin>(
    stream: &mut RewindStream<S>,
    buf: &mut BytesMut,
    n: usize,
) -> Result<Bytes> {
    while buf.len() < n {
        let chunk = stream.read_chunk(READ_CHUNK).await?;
        if chunk.is_empty() {
            return Err(ProxyError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.split_to(n).freeze())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn stream_with(data: &[u8]) -> RewindStream<tokio::io::DuplexStream> {
        let (mut client, server) = tokio::io::duplex(65536);
        client.write_all(data).await.unwrap();
        drop(client);
        RewindStream::new(server)
    }

    #[tokio::test]
    async fn test_parse_simple_get() {
        let mut stream = stream_with(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n").await;
        let request = read_request(&mut stream).await.unwrap().unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "/index.html");
        assert_eq!(request.version, "HTTP/1.1");
        assert_eq!(request.headers.get("host"), Some("example.com"));
        assert_eq!(request.body, None);
    }

    #[tokio::test]
    async fn test_parse_request_with_body() {
        let mut stream =
            stream_with(b"POST /api HTTP/1.1\r\nContent-Length: 13\r\n\r\nHello, World!").await;
        let request = read_request(&mut stream).await.unwrap().unwrap();
        assert_eq!(request.body.as_deref(), Some(&b"Hello, World!"[..]));
    }

    #[tokio::test]
    async fn test_no_request_on_immediate_close() {
        let mut stream = stream_with(b"").await;
        assert!(read_request(&mut stream).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_head_is_connection_closed() {
        let mut stream = stream_with(b"GET / HTTP/1.1\r\nHost: exa").await;
        assert!(matches!(
            read_request(&mut stream).await,
            Err(ProxyError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_malformed_request_line() {
        let mut stream = stream_with(b"GET /\r\n\r\n").await;
        assert!(matches!(
            read_request(&mut stream).await,
            Err(ProxyError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_repeated_headers_join() {
        let mut stream = stream_with(b"GET / HTTP/1.1\r\nX-A: 1\r\nX-A: 2\r\n\r\n").await;
        let request = read_request(&mut stream).await.unwrap().unwrap();
        assert_eq!(request.headers.get("X-A"), Some("1,2"));
    }

    #[tokio::test]
    async fn test_header_names_canonicalized() {
        let mut stream = stream_with(b"GET / HTTP/1.1\r\ncOnTeNt-LeNgTh: 0\r\n\r\n").await;
        let request = read_request(&mut stream).await.unwrap().unwrap();
        let names: Vec<&str> = request.headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Content-Length"]);
    }

    #[tokio::test]
    async fn test_parse_response_with_reason() {
        let mut stream =
            stream_with(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n").await;
        let response = read_response(&mut stream).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.reason, "Not Found");
        assert_eq!(response.body.as_deref(), Some(&b""[..]));
    }

    #[tokio::test]
    async fn test_response_204_ignores_content_length() {
        let mut stream =
            stream_with(b"HTTP/1.1 204 No Content\r\nContent-Length: 5\r\n\r\n").await;
        let response = read_response(&mut stream).await.unwrap();
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_response_close_delimited_body() {
        let mut stream = stream_with(b"HTTP/1.1 200 OK\r\n\r\nstreamed until close").await;
        let response = read_response(&mut stream).await.unwrap();
        assert_eq!(response.body.as_deref(), Some(&b"streamed until close"[..]));
    }

    #[tokio::test]
    async fn test_chunked_response() {
        let mut stream = stream_with(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .await;
        let response = read_response(&mut stream).await.unwrap();
        assert_eq!(response.body.as_deref(), Some(&b"hello world"[..]));
    }

    #[tokio::test]
    async fn test_chunked_truncated_is_connection_closed() {
        let mut stream = stream_with(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel",
        )
        .await;
        assert!(matches!(
            read_response(&mut stream).await,
            Err(ProxyError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_content_length_truncated_is_connection_closed() {
        let mut stream =
            stream_with(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort").await;
        assert!(matches!(
            read_request(&mut stream).await,
            Err(ProxyError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_excess_body_bytes_pushed_back() {
        let mut stream =
            stream_with(b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nbodyEXTRA").await;
        let request = read_request(&mut stream).await.unwrap().unwrap();
        assert_eq!(request.body.as_deref(), Some(&b"body"[..]));

        let rest = stream.read_chunk(16).await.unwrap();
        assert_eq!(&rest[..], b"EXTRA");
    }

    #[tokio::test]
    async fn test_serialize_request_round_trip() {
        let request = HttpRequest {
            method: "POST".to_string(),
            target: "/submit".to_string(),
            version: "HTTP/1.1".to_string(),
            headers: HeaderMap::from([("Host", "example.com"), ("Content-Length", "3")]),
            body: Some(Bytes::from_static(b"abc")),
        };

        let mut out = Vec::new();
        write_request(&mut out, &request).await.unwrap();
        assert_eq!(
            out,
            b"POST /submit HTTP/1.1\r\nHost: example.com\r\nContent-Length: 3\r\n\r\nabc"
        );

        let mut stream = stream_with(&out).await;
        let parsed = read_request(&mut stream).await.unwrap().unwrap();
        assert_eq!(parsed, request);
    }

    #[tokio::test]
    async fn test_serialize_response_preserves_header_order() {
        let response = HttpResponse {
            version: "HTTP/1.1".to_string(),
            status: 200,
            reason: "OK".to_string(),
            headers: HeaderMap::from([("Server", "siip"), ("Content-Length", "2")]),
            body: Some(Bytes::from_static(b"ok")),
        };

        let mut out = Vec::new();
        write_response(&mut out, &response).await.unwrap();
        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nServer: siip\r\nContent-Length: 2\r\n\r\nok"
        );
    }

    #[tokio::test]
    async fn test_unsupported_transfer_encoding_rejected() {
        let mut stream =
            stream_with(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip\r\n\r\n").await;
        assert!(matches!(
            read_response(&mut stream).await,
            Err(ProxyError::Parse(_))
        ));
    }
}
