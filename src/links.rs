//! Link discovery inside incoming messages.
//!
//! Walks a message chain depth-first and collects every substring that looks
//! like a video link or id, in traversal order. Duplicates are kept; callers
//! take the first candidate.

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::message::{CardPayload, ForwardedNode, IncomingMessage, MessageNode, QuotedReply};

/// Patterns applied to free text, in priority order
static TEXT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)https?://(?:www\.)?bilibili\.com/video/[^\s'"<>]+"#,
        r#"(?i)https?://m\.bilibili\.com/video/[^\s'"<>]+"#,
        r#"(?i)https?://b23\.tv/[^\s'"<>]+"#,
        r"(?i)BV[a-zA-Z0-9]{10}",
        r"(?i)av\d+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Brand names that mark an app card as coming from the video platform
const BRAND_NAMES: [&str; 2] = ["bilibili", "哔哩哔哩"];

/// Where a candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    Text,
    Reply,
    Forward,
    Card,
}

/// A raw candidate reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkCandidate {
    pub raw: String,
    pub source: LinkSource,
}

/// Find all candidate references in a piece of text, pattern by pattern
pub fn extract_from_text(text: &str) -> Vec<String> {
    TEXT_PATTERNS
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| m.as_str().to_string()))
        .collect()
}

/// Find all candidate references in an incoming message
pub fn extract_from_message(message: &IncomingMessage) -> Vec<LinkCandidate> {
    let mut out = Vec::new();
    for node in &message.components {
        visit_node(node, &mut out);
    }
    debug!("Extracted {} link candidate(s) from message", out.len());
    out
}

fn visit_node(node: &MessageNode, out: &mut Vec<LinkCandidate>) {
    match node {
        MessageNode::Plain { text } => push_text(text, LinkSource::Text, out),
        MessageNode::Reply(reply) => visit_reply(reply, out),
        MessageNode::Forward(forward) => visit_forward(forward, out),
        MessageNode::Json(card) => push_all(extract_from_card(card), LinkSource::Card, out),
        MessageNode::Other => {}
    }
}

fn visit_reply(reply: &QuotedReply, out: &mut Vec<LinkCandidate>) {
    if let Some(text) = reply.text.as_deref() {
        push_text(text, LinkSource::Reply, out);
    }
    for child in reply.components() {
        match child {
            MessageNode::Plain { text } => push_text(text, LinkSource::Reply, out),
            MessageNode::Json(card) => push_all(extract_from_card(card), LinkSource::Card, out),
            _ => {}
        }
    }
}

/// Collect references from a forwarded tree: its own string fields first,
/// then the text segments of each child node.
pub fn extract_from_forward(node: &impl ForwardedNode) -> Vec<String> {
    let mut links: Vec<String> = node.text_fields().into_iter().flat_map(extract_from_text).collect();
    for items in node.children() {
        for item in items {
            if let MessageNode::Plain { text } = item {
                links.extend(extract_from_text(text));
            }
        }
    }
    links
}

fn visit_forward(node: &impl ForwardedNode, out: &mut Vec<LinkCandidate>) {
    push_all(extract_from_forward(node), LinkSource::Forward, out);
}

/// Collect references from an app card.
///
/// Every string leaf is scanned. Cards whose `meta.detail_1.title` names the
/// platform additionally contribute their `qqdocurl` and `url` fields. A card
/// that fails to decode yields nothing.
pub fn extract_from_card(card: &CardPayload) -> Vec<String> {
    let doc = match card.document() {
        Ok(doc) => doc,
        Err(e) => {
            warn!("Failed to decode app card payload: {e}");
            return Vec::new();
        }
    };

    let mut links = Vec::new();
    visit_leaves(&doc, &mut |s: &str| links.extend(extract_from_text(s)));

    if let Some(detail) = doc.get("meta").and_then(|m| m.get("detail_1")) {
        let title = detail.get("title").and_then(Value::as_str).unwrap_or_default();
        if is_platform_title(title) {
            for field in ["qqdocurl", "url"] {
                if let Some(value) = detail.get(field).and_then(Value::as_str) {
                    links.extend(extract_from_text(value));
                }
            }
        }
    }

    if !links.is_empty() {
        info!("Links found in app card: {links:?}");
    }
    links
}

fn is_platform_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    BRAND_NAMES.iter().any(|brand| lower.contains(brand))
}

/// Call `f` on every string leaf of a JSON tree, in document order
fn visit_leaves(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => {
            for item in items {
                visit_leaves(item, f);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                visit_leaves(item, f);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn push_text(text: &str, source: LinkSource, out: &mut Vec<LinkCandidate>) {
    push_all(extract_from_text(text), source, out);
}

fn push_all(raws: Vec<String>, source: LinkSource, out: &mut Vec<LinkCandidate>) {
    out.extend(raws.into_iter().map(|raw| LinkCandidate { raw, source }));
}
