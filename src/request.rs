//! Structures describing the network requests and documents presented to
//! the matcher.

use thiserror::Error;

use crate::filters::network::ResourceTypes;

/// The kind of resource a request is loading. Mirrors the resource-type
/// bits a filter rule can select on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceType {
    Stylesheet,
    Image,
    Object,
    Script,
    XmlHttpRequest,
    Subdocument,
    Font,
    Media,
    Websocket,
    Webrtc,
    Ping,
    Webtransport,
    Webbundle,
    Document,
    Other,
}

impl ResourceType {
    pub fn to_flag(self) -> ResourceTypes {
        match self {
            ResourceType::Stylesheet => ResourceTypes::STYLESHEET,
            ResourceType::Image => ResourceTypes::IMAGE,
            ResourceType::Object => ResourceTypes::OBJECT,
            ResourceType::Script => ResourceTypes::SCRIPT,
            ResourceType::XmlHttpRequest => ResourceTypes::XMLHTTPREQUEST,
            ResourceType::Subdocument => ResourceTypes::SUBDOCUMENT,
            ResourceType::Font => ResourceTypes::FONT,
            ResourceType::Media => ResourceTypes::MEDIA,
            ResourceType::Websocket => ResourceTypes::WEBSOCKET,
            ResourceType::Webrtc => ResourceTypes::WEBRTC,
            ResourceType::Ping => ResourceTypes::PING,
            ResourceType::Webtransport => ResourceTypes::WEBTRANSPORT,
            ResourceType::Webbundle => ResourceTypes::WEBBUNDLE,
            ResourceType::Document => ResourceTypes::DOCUMENT,
            ResourceType::Other => ResourceTypes::OTHER,
        }
    }

    /// Maps the type strings used by WebRequest-style embedders.
    pub fn from_web_request_type(raw: &str) -> ResourceType {
        match raw {
            "stylesheet" => ResourceType::Stylesheet,
            "image" | "imageset" => ResourceType::Image,
            "object" | "object_subrequest" => ResourceType::Object,
            "script" => ResourceType::Script,
            "xhr" | "xmlhttprequest" => ResourceType::XmlHttpRequest,
            "sub_frame" | "subdocument" => ResourceType::Subdocument,
            "font" => ResourceType::Font,
            "media" => ResourceType::Media,
            "websocket" => ResourceType::Websocket,
            "webrtc" => ResourceType::Webrtc,
            "ping" | "beacon" => ResourceType::Ping,
            "webtransport" => ResourceType::Webtransport,
            "webbundle" => ResourceType::Webbundle,
            "document" | "main_frame" => ResourceType::Document,
            _ => ResourceType::Other,
        }
    }
}

/// Possible failure reasons when creating a [`Request`].
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("request URL parsing failed")]
    UrlParseError,
    #[error("request URL has no hostname")]
    NoHostname,
    #[error("unsupported URL scheme")]
    UnsupportedScheme,
}

/// One query against the before-request/activation/CSP maps.
#[derive(Clone, Debug)]
pub struct Request {
    pub resource_type: ResourceType,

    pub url: String,
    pub url_lower_cased: String,
    pub hostname: String,
    /// Hostname of the document origin issuing the request; empty when
    /// unknown (e.g. top-level navigations).
    pub source_hostname: String,
    pub is_third_party: bool,
}

impl Request {
    /// Construct a request from raw URLs. The third-party flag is derived by
    /// comparing hostnames: same host, or one a dot-separated suffix of the
    /// other, counts as first-party. Embedders with a public-suffix list
    /// should prefer [`Request::preparsed`] and supply the exact flag.
    pub fn new(
        url: &str,
        source_url: &str,
        resource_type: ResourceType,
    ) -> Result<Request, RequestError> {
        let parsed = url::Url::parse(url).map_err(|_| RequestError::UrlParseError)?;
        match parsed.scheme() {
            "http" | "https" | "ws" | "wss" => (),
            _ => return Err(RequestError::UnsupportedScheme),
        }
        let hostname = parsed
            .host_str()
            .ok_or(RequestError::NoHostname)?
            .to_string();

        let source_hostname = url::Url::parse(source_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        let is_third_party = if source_hostname.is_empty() {
            true
        } else {
            !crate::utils::host_matches_domain(&hostname, &source_hostname)
                && !crate::utils::host_matches_domain(&source_hostname, &hostname)
        };

        Ok(Request::preparsed(
            url,
            &hostname,
            &source_hostname,
            resource_type,
            is_third_party,
        ))
    }

    /// Construct a request from already-parsed parts, avoiding a second URL
    /// parse when the embedder has one on hand.
    pub fn preparsed(
        url: &str,
        hostname: &str,
        source_hostname: &str,
        resource_type: ResourceType,
        is_third_party: bool,
    ) -> Request {
        Request {
            resource_type,
            url: url.to_string(),
            url_lower_cased: url.to_ascii_lowercase(),
            hostname: hostname.to_ascii_lowercase(),
            source_hostname: source_hostname.to_ascii_lowercase(),
            is_third_party,
        }
    }

    pub(crate) fn get_url(&self, case_sensitive: bool) -> &str {
        if case_sensitive {
            &self.url
        } else {
            &self.url_lower_cased
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/request.rs"]
mod unit_tests;
