//! Decoded chat message model.
//!
//! The chat host hands over a message as a list of components. Only the
//! component kinds that can carry a video reference are modeled; anything
//! else (images, mentions, faces, ...) decodes as [`MessageNode::Other`], and
//! so does a known component whose fields have an unexpected shape.

use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A message delivered by the chat host
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingMessage {
    #[serde(default, alias = "message", deserialize_with = "lenient_nodes")]
    pub components: Vec<MessageNode>,
}

impl IncomingMessage {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            components: vec![MessageNode::Plain { text: text.into() }],
        }
    }
}

/// One component of a message chain
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum MessageNode {
    Plain {
        #[serde(default)]
        text: String,
    },
    Reply(QuotedReply),
    Forward(ForwardedMessage),
    Json(CardPayload),
    #[serde(other)]
    Other,
}

/// A quoted message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotedReply {
    #[serde(default, deserialize_with = "lenient_text")]
    pub text: Option<String>,
    /// Current attribute holding the quoted components
    #[serde(default, deserialize_with = "lenient_optional_nodes")]
    pub chain: Option<Vec<MessageNode>>,
    /// Legacy attribute, consulted only when `chain` is absent or empty
    #[serde(default, deserialize_with = "lenient_optional_nodes")]
    pub message: Option<Vec<MessageNode>>,
}

impl QuotedReply {
    /// Nested components, preferring the current attribute over the legacy one
    pub fn components(&self) -> &[MessageNode] {
        match (&self.chain, &self.message) {
            (Some(chain), _) if !chain.is_empty() => chain.as_slice(),
            (_, Some(message)) => message.as_slice(),
            _ => &[],
        }
    }
}

/// Capability view over a forwarded message tree.
///
/// Platforms expose forwarded content through different optional fields;
/// implementors list whichever string fields they carry, in probe order, plus
/// the content items of each child node.
pub trait ForwardedNode {
    fn text_fields(&self) -> Vec<&str>;
    fn children(&self) -> Vec<&[MessageNode]>;
}

/// A forwarded message bundle. Text fields holding something other than a
/// string keep its JSON rendering.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardedMessage {
    #[serde(default, deserialize_with = "lenient_text")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_children")]
    pub nodes: Option<Vec<ForwardedChild>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardedChild {
    #[serde(default, deserialize_with = "lenient_nodes")]
    pub content: Vec<MessageNode>,
}

impl ForwardedNode for ForwardedMessage {
    fn text_fields(&self) -> Vec<&str> {
        [&self.content, &self.text, &self.title, &self.summary]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .collect()
    }

    fn children(&self) -> Vec<&[MessageNode]> {
        self.nodes
            .iter()
            .flatten()
            .map(|child| child.content.as_slice())
            .collect()
    }
}

/// An app-card component. `data` is either the card document itself or the
/// document encoded as a JSON string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardPayload {
    #[serde(default)]
    pub data: Value,
}

impl CardPayload {
    pub fn document(&self) -> Result<Value, serde_json::Error> {
        match &self.data {
            Value::String(raw) => serde_json::from_str(raw),
            other => Ok(other.clone()),
        }
    }
}

fn decode_nodes(value: Value) -> Vec<MessageNode> {
    match value {
        Value::Array(items) => items.into_iter().map(decode_node).collect(),
        Value::Null => Vec::new(),
        other => {
            warn!("Expected a component list, got {other}");
            Vec::new()
        }
    }
}

fn decode_node(value: Value) -> MessageNode {
    serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("Skipping undecodable message component: {e}");
        MessageNode::Other
    })
}

fn lenient_nodes<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<MessageNode>, D::Error> {
    Ok(decode_nodes(Value::deserialize(de)?))
}

fn lenient_optional_nodes<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<MessageNode>>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Null => None,
        value => Some(decode_nodes(value)),
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn lenient_children<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<ForwardedChild>>, D::Error> {
    Ok(match Value::deserialize(de)? {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match serde_json::from_value(item) {
                    Ok(child) => Some(child),
                    Err(e) => {
                        warn!("Skipping undecodable forwarded node: {e}");
                        None
                    }
                })
                .collect(),
        ),
        _ => None,
    })
}
