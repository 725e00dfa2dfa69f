use fanout::http::response::{Response, ResponseBuilder, StatusCode};
use fanout::http::writer::ResponseWriter;

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::OK.as_u16(), 200);
    assert_eq!(StatusCode::FOUND.as_u16(), 302);
    assert_eq!(StatusCode::BAD_REQUEST.as_u16(), 400);
    assert_eq!(StatusCode::BAD_GATEWAY.as_u16(), 502);
    assert_eq!(StatusCode::GATEWAY_TIMEOUT.as_u16(), 504);
}

#[test]
fn test_status_code_from_u16() {
    assert_eq!(StatusCode::from_u16(302), Some(StatusCode::FOUND));
    assert_eq!(StatusCode::from_u16(999).map(|s| s.as_u16()), Some(999));
    assert_eq!(StatusCode::from_u16(99), None);
    assert_eq!(StatusCode::from_u16(1000), None);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    assert_eq!(StatusCode::MOVED_PERMANENTLY.reason_phrase(), "Moved Permanently");
    assert_eq!(StatusCode::SERVICE_UNAVAILABLE.reason_phrase(), "Service Unavailable");
    assert_eq!(StatusCode::from_u16(399).unwrap().reason_phrase(), "");
}

#[test]
fn test_status_code_body_rules() {
    assert!(StatusCode::CONTINUE.forbids_body());
    assert!(StatusCode::NO_CONTENT.forbids_body());
    assert!(StatusCode::NOT_MODIFIED.forbids_body());
    assert!(!StatusCode::OK.forbids_body());
}

#[test]
fn test_response_builder_with_headers() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .header("X-Custom", "value")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers.get("Content-Type").unwrap(), "text/plain");
    assert_eq!(response.headers.get("X-Custom").unwrap(), "value");
}

#[test]
fn test_response_builder_auto_content_length() {
    let body = b"This is the body".to_vec();
    let response = ResponseBuilder::new(StatusCode::OK).body(body.clone()).build();

    assert_eq!(response.headers.get("Content-Length").unwrap(), body.len().to_string());
}

#[test]
fn test_response_builder_preserves_custom_content_length() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Length", "999")
        .body(b"test".to_vec())
        .build();

    // Should keep the custom value
    assert_eq!(response.headers.get("Content-Length").unwrap(), "999");
}

#[test]
fn test_response_builder_header_replaces() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("X-Frame-Options", "SAMEORIGIN")
        .header("x-frame-options", "DENY")
        .build();

    assert_eq!(response.headers.len(), 2); // 1 custom + 1 auto (Content-Length)
    assert_eq!(response.headers.get("X-Frame-Options").unwrap(), "DENY");
}

#[test]
fn test_response_builder_empty_body() {
    let response = ResponseBuilder::new(StatusCode::NO_CONTENT).build();

    assert_eq!(response.body.len(), 0);
    assert_eq!(response.headers.get("Content-Length").unwrap(), "0");
}

#[test]
fn test_response_error_page() {
    let response = Response::error(StatusCode::BAD_GATEWAY, "Failed to connect to backend server.");

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers.get("Connection"), Some("close"));
    assert_eq!(response.headers.get("Content-Type"), Some("text/plain"));
    assert_eq!(
        response.body,
        b"502 Bad Gateway\r\n\r\nFailed to connect to backend server.".to_vec()
    );
}

#[test]
fn test_response_redirect_escapes_location() {
    let response = Response::redirect(StatusCode::FOUND, "http://b/x?a=1&b=\"2\"", true);

    assert_eq!(response.headers.get("Location"), Some("http://b/x?a=1&b=\"2\""));
    let body = String::from_utf8(response.body).unwrap();
    assert_eq!(body, "<a href=\"http://b/x?a=1&amp;b=&#34;2&#34;\">Found</a>.\n");
}

#[tokio::test]
async fn test_response_writer_serializes() {
    let response = ResponseBuilder::new(StatusCode::NOT_FOUND)
        .header("Content-Type", "text/plain")
        .body(b"404 Not Found".to_vec())
        .build();

    let mut out = Vec::new();
    ResponseWriter::new(&response).write_to(&mut out).await.unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 13\r\n\r\n404 Not Found"
    );
}
