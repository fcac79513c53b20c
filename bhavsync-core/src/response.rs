//! HTTP response envelope and response-shape classification.
//!
//! Exchanges answer a bhavcopy request with a zip, a bare CSV, a JSON object
//! naming the file to fetch next, or an HTML page (bot check, error page,
//! holiday notice). `classify` turns a response into one tagged variant so
//! the fetcher can match on it exhaustively, and so the branching can be
//! tested without any network I/O.

use crate::archive::looks_like_zip;

/// HTTP response as seen by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    fn content_type_lower(&self) -> String {
        self.content_type
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

/// What a response turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseKind {
    /// Non-2xx status.
    Status(u16),
    /// Zip container.
    Archive(Vec<u8>),
    /// Comma-delimited text served without a container.
    Table(Vec<u8>),
    /// JSON document, typically naming the real file.
    Metadata(serde_json::Value),
    /// HTML page.
    Html,
    /// Anything else.
    Unrecognized { content_type: Option<String> },
}

impl ResponseKind {
    /// Short label for logs and error messages.
    pub fn label(&self) -> String {
        match self {
            ResponseKind::Status(code) => format!("HTTP {code}"),
            ResponseKind::Archive(_) => "zip archive".to_string(),
            ResponseKind::Table(_) => "csv table".to_string(),
            ResponseKind::Metadata(_) => "json metadata".to_string(),
            ResponseKind::Html => "html page".to_string(),
            ResponseKind::Unrecognized { content_type } => format!(
                "unrecognized response (content-type: {})",
                content_type.as_deref().unwrap_or("none")
            ),
        }
    }
}

/// Classify a response by status, content bytes and content type.
///
/// Body signatures win over the declared content type: exchanges serve zips
/// as `text/html` and CSVs as `application/octet-stream` often enough that
/// the header alone can't be trusted.
pub fn classify(resp: HttpResponse) -> ResponseKind {
    if !resp.is_success() {
        return ResponseKind::Status(resp.status);
    }

    if looks_like_zip(&resp.body) {
        return ResponseKind::Archive(resp.body);
    }

    let head = leading_text(&resp.body);

    if head.starts_with('<') {
        return ResponseKind::Html;
    }

    if head.starts_with('{') || head.starts_with('[') {
        return parse_metadata(resp);
    }

    if looks_like_csv(&resp.body) {
        return ResponseKind::Table(resp.body);
    }

    // Nothing in the body decided it; fall back to the declared type.
    let ctype = resp.content_type_lower();
    if ctype.contains("json") {
        return parse_metadata(resp);
    }
    if ctype.contains("text/html") {
        return ResponseKind::Html;
    }

    ResponseKind::Unrecognized {
        content_type: resp.content_type,
    }
}

fn parse_metadata(resp: HttpResponse) -> ResponseKind {
    match serde_json::from_slice::<serde_json::Value>(&resp.body) {
        Ok(value) => ResponseKind::Metadata(value),
        Err(_) => ResponseKind::Unrecognized {
            content_type: resp.content_type,
        },
    }
}

/// First non-whitespace characters of the body, lossily decoded.
fn leading_text(body: &[u8]) -> String {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let prefix = &body[..body.len().min(64)];
    String::from_utf8_lossy(prefix).trim_start().to_string()
}

/// A header line with at least one comma, in valid UTF-8.
fn looks_like_csv(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let first_line_end = body.iter().position(|&b| b == b'\n').unwrap_or(body.len());
    match std::str::from_utf8(&body[..first_line_end]) {
        Ok(line) => line.contains(',') && !line.trim().is_empty(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::zip_bytes;

    #[test]
    fn non_success_status() {
        let r = HttpResponse::new(404, Some("text/html"), "<html>not found</html>");
        assert_eq!(classify(r), ResponseKind::Status(404));
    }

    #[test]
    fn zip_regardless_of_content_type() {
        let z = zip_bytes(&[("a.csv", "A\n1\n")]);
        let r = HttpResponse::new(200, Some("text/html"), z.clone());
        assert_eq!(classify(r), ResponseKind::Archive(z));
    }

    #[test]
    fn html_page() {
        let r = HttpResponse::new(200, None, "\n  <!DOCTYPE html><html></html>");
        assert_eq!(classify(r), ResponseKind::Html);
        let r = HttpResponse::new(200, Some("text/html; charset=utf-8"), "Access Denied");
        assert_eq!(classify(r), ResponseKind::Html);
    }

    #[test]
    fn json_metadata() {
        let r = HttpResponse::new(
            200,
            Some("application/json"),
            r#"{"filePath":"/content/cm/x.csv.zip"}"#,
        );
        match classify(r) {
            ResponseKind::Metadata(v) => assert_eq!(v["filePath"], "/content/cm/x.csv.zip"),
            other => panic!("expected metadata, got {other:?}"),
        }
    }

    #[test]
    fn broken_json_is_unrecognized() {
        let r = HttpResponse::new(200, Some("application/json"), "{oops");
        assert_eq!(
            classify(r),
            ResponseKind::Unrecognized {
                content_type: Some("application/json".into())
            }
        );
    }

    #[test]
    fn csv_served_as_html_is_a_table() {
        let body = "ISIN_CODE,TRADE_DATE,SC_NAME,CLOSE\nINE002A01018,2024-03-15,RELIANCE,2901.65\n";
        let r = HttpResponse::new(200, Some("text/html; charset=utf-8"), body);
        assert_eq!(classify(r), ResponseKind::Table(body.as_bytes().to_vec()));
    }

    #[test]
    fn json_string_by_content_type() {
        let r = HttpResponse::new(200, Some("application/json"), r#""download/x.CSV""#);
        assert_eq!(
            classify(r),
            ResponseKind::Metadata(serde_json::json!("download/x.CSV"))
        );
    }

    #[test]
    fn bare_csv_table() {
        let body = "SC_CODE,SC_NAME,CLOSE\n500325,RELIANCE,2901.65\n";
        let r = HttpResponse::new(200, Some("application/octet-stream"), body);
        assert_eq!(classify(r), ResponseKind::Table(body.as_bytes().to_vec()));
    }

    #[test]
    fn binary_garbage_is_unrecognized() {
        let r = HttpResponse::new(200, None, vec![0xffu8, 0xfe, 0x00, 0x2c]);
        assert!(matches!(classify(r), ResponseKind::Unrecognized { .. }));
        let r = HttpResponse::new(200, Some("text/plain"), "");
        assert!(matches!(classify(r), ResponseKind::Unrecognized { .. }));
    }

    #[test]
    fn labels() {
        assert_eq!(ResponseKind::Status(503).label(), "HTTP 503");
        assert_eq!(ResponseKind::Html.label(), "html page");
    }
}
