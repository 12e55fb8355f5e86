//! Adapters between the matcher and the embedder: per-frame injection
//! payload assembly, WebRTC/ICE filtering, and the scriptlet resource
//! bundle.

use std::collections::HashMap;
use std::sync::mpsc;

use log::debug;

use crate::engine::RulesIndexManager;
use crate::filters::network::ActivationTypes;
use crate::index::matcher::{ActivationsFound, RulesIndex};
use crate::request::{Request, ResourceType};
use crate::sources::RuleGroup;

/// Named scriptlet bodies available for injection. Parsed from a bundle of
/// the form used by redirect/scriptlet resource files: blocks separated by
/// blank lines, each starting with a `name content-type` line followed by
/// the body.
#[derive(Debug, Default, Clone)]
pub struct Resources {
    injections: HashMap<String, String>,
}

impl Resources {
    pub fn parse(text: &str) -> Resources {
        let mut injections = HashMap::new();
        for block in text.split("\n\n") {
            let block = block.trim();
            if block.is_empty() {
                continue;
            }
            let (header, body) = match block.split_once('\n') {
                Some(parts) => parts,
                None => continue,
            };
            let name = match header.split_whitespace().next() {
                Some(name) => name,
                None => continue,
            };
            injections.insert(name.to_string(), body.trim().to_string());
        }
        Resources { injections }
    }

    pub fn get_injection(&self, name: &str) -> Option<&str> {
        self.injections.get(name).map(String::as_str)
    }

    /// Expands a scriptlet body against its arguments. Replacement slots are
    /// 1-based (`{{1}}`, `{{2}}`, …); slot 0 is reserved empty so the
    /// numbering lines up across scriptlet dialects.
    pub fn expand_scriptlet(&self, name: &str, arguments: &[String]) -> Option<String> {
        let mut body = self.get_injection(name)?.to_string();
        for (i, argument) in arguments.iter().enumerate() {
            body = body.replace(&format!("{{{{{}}}}}", i + 1), argument);
        }
        Some(body)
    }
}

/// One-shot completion signal for asynchronous bundle loading: the loader
/// sends the parsed bundle once, the consumer builds its injection state on
/// receipt.
pub fn resources_channel() -> (mpsc::Sender<Resources>, mpsc::Receiver<Resources>) {
    mpsc::channel()
}

/// A document's frame ancestry: the frame's own URL first, then each
/// ancestor document's URL up to the root.
#[derive(Clone, Copy, Debug)]
pub struct FrameChain<'a> {
    pub urls: &'a [&'a str],
}

impl<'a> FrameChain<'a> {
    pub fn new(urls: &'a [&'a str]) -> FrameChain<'a> {
        FrameChain { urls }
    }

    fn document_request(&self, frame_index: usize) -> Option<Request> {
        let url = *self.urls.get(frame_index)?;
        let source = self.urls.get(frame_index + 1).copied().unwrap_or(url);
        Request::new(url, source, ResourceType::Document).ok()
    }

    /// Hostname of the document origin cosmetic data is computed for: the
    /// parent document's host, or the frame's own for top-level frames.
    fn origin_host(&self) -> Option<String> {
        let origin_url = self.urls.get(1).or_else(|| self.urls.first())?;
        url::Url::parse(origin_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

/// A scriptlet injection resolved for a frame, ready for the embedder's
/// injection machinery. `placeholder_replacements` is 1-based with slot 0
/// left empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptletPayload {
    pub key: String,
    pub placeholder_replacements: Vec<String>,
}

/// Everything to inject into one frame across both rule groups.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameInjections {
    pub stylesheet: String,
    pub static_injections: Vec<ScriptletPayload>,
}

fn frame_activations(index: &RulesIndex, frame: &FrameChain) -> ActivationsFound {
    let mut activations = match frame.document_request(0) {
        Some(request) => index.find_matching_activations(&request),
        None => ActivationsFound::default(),
    };
    let ancestors: Vec<Request> = (1..frame.urls.len())
        .filter_map(|i| frame.document_request(i))
        .collect();
    activations.merge(index.activations_for_frame_chain(ancestors.iter()));
    activations
}

/// Assembles the cosmetic payload for one frame. `is_origin_wanted` lets
/// the embedder exempt origins (extension pages, user allow-lists) per rule
/// group.
pub fn get_injections_for_frame(
    managers: &[&RulesIndexManager],
    resources: &Resources,
    frame: &FrameChain,
    is_origin_wanted: impl Fn(RuleGroup, &str) -> bool,
) -> FrameInjections {
    let mut result = FrameInjections::default();
    let origin_host = match frame.origin_host() {
        Some(host) => host,
        None => return result,
    };

    for manager in managers {
        let index = match manager.rules_index() {
            Some(index) => index,
            None => continue,
        };
        if !is_origin_wanted(manager.group(), &origin_host) {
            continue;
        }

        let activations = frame_activations(&index, frame);
        if activations
            .in_allow_rules
            .intersects(ActivationTypes::DOCUMENT | ActivationTypes::ELEMENT_HIDE)
        {
            continue;
        }

        let generic_hide = activations
            .in_allow_rules
            .contains(ActivationTypes::GENERIC_HIDE);
        let injection_data = index.get_injection_data_for_origin(&origin_host, generic_hide);
        if !generic_hide {
            result.stylesheet.push_str(index.get_default_stylesheet());
        }
        result.stylesheet.push_str(&injection_data.stylesheet);

        for injection in injection_data.scriptlet_injections {
            if resources.get_injection(&injection.scriptlet).is_none() {
                debug!("unknown scriptlet resource {}", injection.scriptlet);
                continue;
            }
            let mut placeholder_replacements = Vec::with_capacity(injection.arguments.len() + 1);
            placeholder_replacements.push(String::new());
            placeholder_replacements.extend(injection.arguments);
            result.static_injections.push(ScriptletPayload {
                key: injection.scriptlet,
                placeholder_replacements,
            });
        }
    }

    result
}

/// Stylesheet-only variant of [`get_injections_for_frame`], for embedders
/// that inject CSS through a separate channel.
pub fn get_stylesheet_for_frame(
    managers: &[&RulesIndexManager],
    frame: &FrameChain,
    is_origin_wanted: impl Fn(RuleGroup, &str) -> bool,
) -> String {
    let mut stylesheet = String::new();
    let origin_host = match frame.origin_host() {
        Some(host) => host,
        None => return stylesheet,
    };

    for manager in managers {
        let index = match manager.rules_index() {
            Some(index) => index,
            None => continue,
        };
        if !is_origin_wanted(manager.group(), &origin_host) {
            continue;
        }

        let activations = frame_activations(&index, frame);
        if activations
            .in_allow_rules
            .intersects(ActivationTypes::DOCUMENT | ActivationTypes::ELEMENT_HIDE)
        {
            continue;
        }

        if activations
            .in_allow_rules
            .contains(ActivationTypes::GENERIC_HIDE)
        {
            stylesheet.push_str(&index.get_stylesheet_for_origin(&origin_host, true));
        } else {
            stylesheet.push_str(index.get_default_stylesheet());
            stylesheet.push_str(&index.get_stylesheet_for_origin(&origin_host, false));
        }
    }

    stylesheet
}

/// Extracts the host of an ICE server URL (`stun:`/`turn:` URLs do not
/// carry an authority in the URL sense).
fn ice_server_host(server: &str) -> Option<String> {
    if let Ok(parsed) = url::Url::parse(server) {
        if let Some(host) = parsed.host_str() {
            return Some(host.to_string());
        }
        let rest = parsed.path();
        let host = rest.split(|c| c == ':' || c == '/' || c == '?').next()?;
        if host.is_empty() {
            return None;
        }
        return Some(host.to_string());
    }
    None
}

/// Decides whether a document may use WebRTC given its configured ICE
/// servers. A DOCUMENT allow activation exempts the frame; otherwise any
/// ICE server matching a non-allow `webrtc` rule vetoes the connection.
pub fn should_allow_web_rtc(
    managers: &[&RulesIndexManager],
    document_url: &str,
    ice_servers: &[&str],
    frame: &FrameChain,
    is_origin_wanted: impl Fn(RuleGroup, &str) -> bool,
) -> bool {
    if ice_servers.is_empty() {
        return true;
    }
    let document_host = match url::Url::parse(document_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
    {
        Some(host) => host,
        None => return true,
    };

    for manager in managers {
        let index = match manager.rules_index() {
            Some(index) => index,
            None => continue,
        };
        if !is_origin_wanted(manager.group(), &document_host) {
            continue;
        }

        let activations = frame_activations(&index, frame);
        if activations
            .in_allow_rules
            .contains(ActivationTypes::DOCUMENT)
        {
            continue;
        }
        let only_specific = activations
            .in_allow_rules
            .contains(ActivationTypes::GENERIC_BLOCK);

        for server in ice_servers {
            let server_host = match ice_server_host(server) {
                Some(host) => host,
                None => continue,
            };
            let request = Request::preparsed(
                server,
                &server_host,
                &document_host,
                ResourceType::Webrtc,
                !crate::utils::host_matches_domain(&server_host, &document_host),
            );
            if let Some(rule) = index.find_matching_before_request_rule(&request, only_specific) {
                if !rule.is_allow_rule {
                    return false;
                }
            }
        }
    }

    true
}

#[cfg(test)]
#[path = "../tests/unit/injection.rs"]
mod unit_tests;
