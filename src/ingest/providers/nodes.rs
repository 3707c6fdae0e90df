// src/ingest/providers/nodes.rs
//! Typed shapes of the HTML nodes the scrape proxy hands back.

use serde::Deserialize;

use crate::ingest::normalize_text;
use crate::ingest::proxy::OneOrMany;
use crate::ingest::types::ExtractError;

/// Element text: a bare string for attribute-less elements, `{content}` otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TextNode {
    Plain(String),
    Node { content: Option<String> },
}

impl TextNode {
    pub fn text(&self) -> Option<String> {
        let raw = match self {
            TextNode::Plain(s) => Some(s.as_str()),
            TextNode::Node { content } => content.as_deref(),
        }?;
        let t = normalize_text(raw);
        (!t.is_empty()).then_some(t)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Strong {
    pub span: Option<TextNode>,
}

/// A `span` child of a job anchor: either the company/position pair or plain text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SpanNode {
    Title { strong: Strong, span: TextNode },
    Text(TextNode),
}

impl SpanNode {
    pub fn text(&self) -> Option<String> {
        match self {
            SpanNode::Text(t) => t.text(),
            SpanNode::Title { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Anchor {
    pub href: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub span: Vec<SpanNode>,
}

impl Anchor {
    pub fn href(&self, field: &'static str) -> Result<&str, ExtractError> {
        self.href
            .as_deref()
            .filter(|h| !h.trim().is_empty())
            .ok_or(ExtractError::Missing(field))
    }
}

/// `<li><div><a/>[<a/>]</div></li>` rows of the Dribbble and Behance job boards.
#[derive(Debug, Clone, Deserialize)]
pub struct BoardJobRow {
    pub div: Option<BoardJobDiv>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardJobDiv {
    pub a: Option<OneOrMany<Anchor>>,
}

/// Fields common to the board-style job rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardJob {
    pub href: String,
    pub company: String,
    pub position: String,
    pub location: String,
}

impl BoardJobRow {
    /// The listing anchor is the second one when the row also carries a logo link.
    pub fn into_job(self) -> Result<BoardJob, ExtractError> {
        let anchors = self
            .div
            .and_then(|d| d.a)
            .ok_or(ExtractError::Missing("div.a"))?;
        let anchor = match anchors {
            OneOrMany::One(a) => a,
            OneOrMany::Many(v) => v.into_iter().nth(1).ok_or(ExtractError::Missing("div.a[1]"))?,
        };
        let href = anchor.href("div.a.href")?.to_string();

        let (company, position) = match anchor.span.first() {
            Some(SpanNode::Title { strong, span }) => (
                strong
                    .span
                    .as_ref()
                    .and_then(TextNode::text)
                    .ok_or(ExtractError::Missing("span[0].strong.span"))?,
                span.text().ok_or(ExtractError::Missing("span[0].span"))?,
            ),
            _ => return Err(ExtractError::Missing("span[0]")),
        };
        let location = anchor
            .span
            .get(1)
            .and_then(SpanNode::text)
            .ok_or(ExtractError::Missing("span[1]"))?;

        Ok(BoardJob {
            href,
            company,
            position,
            location,
        })
    }
}

/// Leading integer of labels such as `"12 points"` or `"1 comment"`; no number reads as zero.
pub fn leading_count(label: &str) -> u64 {
    label
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}
