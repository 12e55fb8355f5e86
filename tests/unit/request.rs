use super::*;

#[test]
fn parses_hostname_and_lowercases() {
    let request = Request::new(
        "https://Sub.Example.COM/Path/Asset.JPG",
        "https://example.com/",
        ResourceType::Image,
    )
    .unwrap();
    assert_eq!(request.hostname, "sub.example.com");
    assert_eq!(request.url, "https://Sub.Example.COM/Path/Asset.JPG");
    assert_eq!(request.url_lower_cased, "https://sub.example.com/path/asset.jpg");
}

#[test]
fn third_party_derivation() {
    let first = Request::new(
        "https://cdn.example.com/x.js",
        "https://example.com/",
        ResourceType::Script,
    )
    .unwrap();
    assert!(!first.is_third_party);

    let third = Request::new(
        "https://tracker.example/x.js",
        "https://example.com/",
        ResourceType::Script,
    )
    .unwrap();
    assert!(third.is_third_party);

    // No source: treated as third-party.
    let unknown = Request::new("https://example.com/x.js", "", ResourceType::Script).unwrap();
    assert!(unknown.is_third_party);
}

#[test]
fn rejects_unsupported_inputs() {
    assert_eq!(
        Request::new("file:///etc/passwd", "", ResourceType::Other).unwrap_err(),
        RequestError::UnsupportedScheme
    );
    assert_eq!(
        Request::new("not a url", "", ResourceType::Other).unwrap_err(),
        RequestError::UrlParseError
    );
}

#[test]
fn preparsed_trusts_caller() {
    let request = Request::preparsed(
        "https://example.com/x",
        "example.com",
        "other.example",
        ResourceType::Document,
        true,
    );
    assert!(request.is_third_party);
    assert_eq!(request.resource_type, ResourceType::Document);
}

#[test]
fn web_request_type_mapping() {
    assert_eq!(
        ResourceType::from_web_request_type("main_frame"),
        ResourceType::Document
    );
    assert_eq!(
        ResourceType::from_web_request_type("xhr"),
        ResourceType::XmlHttpRequest
    );
    assert_eq!(
        ResourceType::from_web_request_type("beacon"),
        ResourceType::Ping
    );
    assert_eq!(
        ResourceType::from_web_request_type("speculative"),
        ResourceType::Other
    );
}
