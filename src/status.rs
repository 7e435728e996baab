//! Process-wide immutable tables: status phrases, recognized methods and
//! protocol tokens (spec §6/§9 — "Global state: none beyond these
//! constants").

/// Look up the reason phrase for a status code. Falls back to a generic
/// phrase for any code in the wider HTTP range that isn't in the fixed
/// table spec §6 requires, so the engine never fails to emit a status
/// line.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        410 => "Gone",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        505 => "HTTP Version Not Supported",
        507 => "Insufficient Storage",
        _ => "Unknown",
    }
}

/// Methods recognized on the request line (spec §6). Anything else fails
/// parsing with `501 Not Implemented`.
pub const METHODS: &[&str] = &[
    "CONNECT", "DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT", "TRACE",
];

/// Protocol tokens accepted on the request line.
pub const PROTOCOLS: &[&str] = &["HTTP/1.0", "HTTP/1.1"];

pub fn is_known_method(m: &str) -> bool {
    METHODS.contains(&m)
}

pub fn is_known_protocol(p: &str) -> bool {
    PROTOCOLS.contains(&p)
}

/// File-extension to Content-Type table used by `respond_file` (spec
/// §4.3).
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=UTF-8",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
