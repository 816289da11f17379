//! HTTP/1.x wire layer: rewindable streams, headers, URLs, and the codec.

pub mod headers;
pub mod stream;
pub mod url;
pub mod wire;

pub use headers::{canonicalize, HeaderMap};
pub use stream::RewindStream;
pub use url::{parse_connect_target, HttpUrl, Scheme};
pub use wire::{
    read_request, read_request_body, read_request_head, read_response, write_request,
    write_response, HttpRequest, HttpResponse,
};
