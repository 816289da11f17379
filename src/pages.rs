//! Synthesized client-facing error pages
//!
//! When resolution or trust verification fails, the client gets a small HTML
//! page instead of a dropped connection. Domains come from the wire and are
//! escaped before interpolation.

use bytes::Bytes;

use crate::http1::headers::HeaderMap;
use crate::http1::wire::HttpResponse;

/// 404 page for a domain absent from the registry. The explanation differs
/// depending on whether legacy DNS fallback was allowed to run.
pub fn not_found(domain: &str, legacy_fallback: bool) -> HttpResponse {
    let detail = if legacy_fallback {
        "The domain is not in the SIIP registry and legacy DNS resolution also failed."
    } else {
        "The domain is not in the SIIP registry. Legacy DNS fallback is disabled."
    };
    let body = render(
        "Domain Not Found",
        &format!(
            "<code>{}</code> could not be resolved.",
            escape_html(domain)
        ),
        detail,
    );
    page(404, "Not Found", body)
}

/// 500 page for a certificate whose public key does not match the registry
/// pin. Never rendered for a legacy-resolved domain.
pub fn pin_mismatch(domain: &str, detail: &str) -> HttpResponse {
    let body = render(
        "Certificate Mismatch",
        &format!(
            "The certificate presented by <code>{}</code> does not match its \
             SIIP registry record.",
            escape_html(domain)
        ),
        &escape_html(detail),
    );
    page(500, "Internal Server Error", body)
}

/// 500 page for a failed CA-validated handshake on the legacy path.
pub fn legacy_tls_failure(domain: &str, detail: &str) -> HttpResponse {
    let body = render(
        "TLS Error",
        &format!(
            "A secure connection to <code>{}</code> could not be established.",
            escape_html(domain)
        ),
        &escape_html(detail),
    );
    page(500, "Internal Server Error", body)
}

fn page(status: u16, reason: &str, body: String) -> HttpResponse {
    let body = Bytes::from(body);
    let headers = HeaderMap::from([
        ("Content-Type", "text/html; charset=utf-8"),
        ("Content-Length", &body.len().to_string()),
        ("Connection", "close"),
    ]);
    HttpResponse {
        version: "HTTP/1.1".to_string(),
        status,
        reason: reason.to_string(),
        headers,
        body: Some(body),
    }
}

fn render(title: &str, message: &str, detail: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>{title}</title></head>\n\
         <body>\n\
         <h1>{title}</h1>\n\
         <p>{message}</p>\n\
         <p><small>{detail}</small></p>\n\
         </body>\n\
         </html>\n"
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
