//! Request/status line and header-block parsing and serialisation.
//!
//! Grounded on the original implementation's `http_request.py` /
//! `http_response.py` split, reworked into owned Rust types. Header values
//! are trimmed of surrounding ASCII whitespace on parse and not re-padded on
//! serialise (see SPEC_FULL.md §9) so `serialize(parse(x))` is a fixed
//! point.

use crate::error::HttpParseError;

/// An ordered, duplicate-preserving list of header (name, value) pairs with
/// ASCII case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the value of the first entry whose name matches `name`
    /// ASCII-case-insensitively.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses a header block: the bytes up to (but not including) the bare
    /// CRLF terminator.
    pub fn parse(block: &[u8]) -> Result<Self, HttpParseError> {
        let text = String::from_utf8_lossy(block);
        let mut headers = Vec::new();
        for line in text.split("\r\n") {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                HttpParseError::MalformedHeaderLine(line.to_string())
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
        Ok(Self(headers))
    }

    /// Serialises the header block, terminated by the bare CRLF that marks
    /// the end of the header section.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in &self.0 {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A parsed (and possibly handler-mutated) HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub version: String,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub url: String,
    pub headers: Headers,
}

impl Request {
    /// Parses a single CRLF-terminated request line (the CRLF itself is not
    /// included in `line`). Headers start empty; call [`Headers::parse`]
    /// separately and assign to `.headers`.
    pub fn parse_request_line(line: &str) -> Result<Self, HttpParseError> {
        let parts: Vec<&str> = line.split(' ').collect();
        if parts.len() != 3 {
            return Err(HttpParseError::MalformedRequestLine(line.to_string()));
        }
        let (method, target, version) = (parts[0], parts[1], parts[2]);

        if method.eq_ignore_ascii_case("CONNECT") {
            let colon = target.rfind(':').ok_or_else(|| {
                HttpParseError::ConnectMissingPort(target.to_string())
            })?;
            let (host, port_str) = target.split_at(colon);
            let port_str = &port_str[1..];
            let port: u16 = port_str
                .parse()
                .map_err(|_| HttpParseError::ConnectInvalidPort(target.to_string()))?;
            Ok(Self {
                method: method.to_string(),
                version: version.to_string(),
                scheme: "https".to_string(),
                host: host.to_string(),
                port,
                url: target.to_string(),
                headers: Headers::new(),
            })
        } else if target.starts_with('/') {
            // Origin-form target: only ever valid as the inner request line
            // of a CONNECT-upgraded tunnel. host/port/scheme are placeholders
            // the acceptor immediately overwrites from the CONNECT target
            // (see SPEC_FULL.md §9 / invariant (iv)); a direct-form request
            // using this form outside a tunnel simply fails to connect.
            Ok(Self {
                method: method.to_string(),
                version: version.to_string(),
                scheme: "https".to_string(),
                host: String::new(),
                port: 0,
                url: target.to_string(),
                headers: Headers::new(),
            })
        } else {
            let uri = url::Url::parse(target)
                .map_err(|_| HttpParseError::MalformedTarget(target.to_string()))?;
            let host = uri
                .host_str()
                .ok_or_else(|| HttpParseError::MalformedTarget(target.to_string()))?
                .to_string();
            let port = uri.port().unwrap_or(80);
            Ok(Self {
                method: method.to_string(),
                version: version.to_string(),
                scheme: "http".to_string(),
                host,
                port,
                url: target.to_string(),
                headers: Headers::new(),
            })
        }
    }

    /// Serialises the request line as written to the upstream connection.
    pub fn request_line(&self) -> String {
        format!("{} {} {}\r\n", self.method, self.url, self.version)
    }
}

/// A parsed (and possibly handler-mutated) HTTP response, built by the
/// forwarder from the upstream status line and header block.
#[derive(Debug, Clone)]
pub struct Response {
    pub status_code: u16,
    pub reason_phrase: String,
    pub version: String,
    pub headers: Headers,
}

impl Response {
    /// Parses a single CRLF-terminated status line.
    pub fn parse_status_line(line: &str) -> Result<Self, HttpParseError> {
        let mut parts = line.splitn(3, ' ');
        let version = parts
            .next()
            .ok_or_else(|| HttpParseError::MalformedStatusLine(line.to_string()))?;
        let code = parts
            .next()
            .ok_or_else(|| HttpParseError::MalformedStatusLine(line.to_string()))?;
        let reason = parts.next().unwrap_or("").to_string();
        let status_code: u16 = code
            .parse()
            .map_err(|_| HttpParseError::MalformedStatusLine(line.to_string()))?;
        Ok(Self {
            status_code,
            reason_phrase: reason,
            version: version.to_string(),
            headers: Headers::new(),
        })
    }

    /// Serialises the status line as written to the client.
    pub fn status_line(&self) -> String {
        format!(
            "{} {} {}\r\n",
            self.version, self.status_code, self.reason_phrase
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_absolute_form_get() {
        let req = Request::parse_request_line("GET http://example.com:8080/path HTTP/1.1").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.scheme, "http");
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, 8080);
        assert_eq!(req.version, "HTTP/1.1");
    }

    #[test]
    fn parses_absolute_form_default_port() {
        let req = Request::parse_request_line("GET http://example.com/ HTTP/1.1").unwrap();
        assert_eq!(req.port, 80);
    }

    #[test]
    fn parses_connect_request() {
        let req = Request::parse_request_line("CONNECT example.com:443 HTTP/1.1").unwrap();
        assert_eq!(req.method, "CONNECT");
        assert_eq!(req.scheme, "https");
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, 443);
    }

    #[test]
    fn rejects_request_line_with_too_few_tokens() {
        assert!(Request::parse_request_line("GET /").is_err());
    }

    #[test]
    fn rejects_connect_without_port() {
        assert!(Request::parse_request_line("CONNECT example.com HTTP/1.1").is_err());
    }

    #[test]
    fn parses_origin_form_target_as_inner_request_placeholder() {
        let req = Request::parse_request_line("GET /path?q=1 HTTP/1.1").unwrap();
        assert_eq!(req.url, "/path?q=1");
        assert_eq!(req.host, "");
    }

    #[test]
    fn headers_preserve_order_and_duplicates() {
        let block = b"A: 1\r\nB: 2\r\nA: 3\r\n\r\n";
        let headers = Headers::parse(block).unwrap();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.first("a"), Some("1"));
        let all: Vec<_> = headers.iter().collect();
        assert_eq!(all, vec![("A", "1"), ("B", "2"), ("A", "3")]);
    }

    #[test]
    fn first_is_case_insensitive_and_returns_earliest() {
        let mut headers = Headers::new();
        headers.push("Host", "example.com");
        headers.push("Host", "duplicate.com");
        assert_eq!(headers.first("HOST"), Some("example.com"));
        assert_eq!(headers.first("Missing"), None);
    }

    #[test]
    fn serialize_round_trips_up_to_whitespace_trim() {
        let block = b"Host: example.com\r\nUser-Agent: test-client\r\n\r\n";
        let headers = Headers::parse(block).unwrap();
        assert_eq!(headers.serialize(), block.to_vec());
    }

    #[test]
    fn parses_status_line_with_multiword_reason() {
        let resp = Response::parse_status_line("HTTP/1.1 200 Connection Established").unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.reason_phrase, "Connection Established");
        assert_eq!(resp.version, "HTTP/1.1");
    }
}
