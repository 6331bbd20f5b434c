use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node types of the ADF-style structured documents Jira exchanges for
/// descriptions and comment bodies. Anything the server sends that we do not
/// model decodes as `Unknown` and renders as its children's concatenation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Doc,
    Paragraph,
    Heading,
    Text,
    BulletList,
    OrderedList,
    ListItem,
    CodeBlock,
    Blockquote,
    Rule,
    HardBreak,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkType {
    Strong,
    Em,
    Code,
    Strike,
    Link,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type", default)]
    pub mark_type: MarkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<MarkAttrs>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// One node of a structured document. Mirrors the wire JSON: `type` plus
/// whichever of `content`, `text`, `marks`, `attrs` the node type carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocNode {
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<DocNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<NodeAttrs>,
}

impl DocNode {
    pub fn doc(content: Vec<DocNode>) -> Self {
        Self {
            node_type: NodeType::Doc,
            content,
            ..Self::default()
        }
    }

    pub fn paragraph(content: Vec<DocNode>) -> Self {
        Self {
            node_type: NodeType::Paragraph,
            content,
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            node_type: NodeType::Text,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn marked_text(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Self {
            node_type: NodeType::Text,
            text: Some(text.into()),
            marks,
            ..Self::default()
        }
    }
}

impl Mark {
    pub fn strong() -> Self {
        Self {
            mark_type: MarkType::Strong,
            attrs: None,
        }
    }

    pub fn link(href: impl Into<String>) -> Self {
        Self {
            mark_type: MarkType::Link,
            attrs: Some(MarkAttrs {
                href: Some(href.into()),
            }),
        }
    }
}

/// Renders a structured document as Markdown. Total: every node type has a
/// defined rendering and unknown types degrade to their children.
pub fn to_markdown(node: &DocNode) -> String {
    let children = |out: &mut String| {
        for child in &node.content {
            out.push_str(&to_markdown(child));
        }
    };

    let mut out = String::new();
    match node.node_type {
        NodeType::Text => {
            let mut text = node.text.clone().unwrap_or_default();
            for mark in &node.marks {
                text = apply_mark(text, mark);
            }
            out.push_str(&text);
        }
        NodeType::Paragraph => {
            children(&mut out);
            out.push_str("\n\n");
        }
        NodeType::Heading => {
            let level = node
                .attrs
                .as_ref()
                .and_then(|attrs| attrs.level)
                .unwrap_or(1);
            for _ in 0..level {
                out.push('#');
            }
            out.push(' ');
            children(&mut out);
            out.push_str("\n\n");
        }
        NodeType::BulletList => {
            for item in &node.content {
                let rendered = to_markdown(item);
                out.push_str("- ");
                out.push_str(rendered.trim_end_matches('\n'));
                out.push('\n');
            }
            out.push('\n');
        }
        NodeType::OrderedList => {
            for (idx, item) in node.content.iter().enumerate() {
                let rendered = to_markdown(item);
                out.push_str(&format!("{}. ", idx + 1));
                out.push_str(rendered.trim_end_matches('\n'));
                out.push('\n');
            }
            out.push('\n');
        }
        NodeType::CodeBlock => {
            let language = node
                .attrs
                .as_ref()
                .and_then(|attrs| attrs.language.clone())
                .unwrap_or_default();
            let mut body = String::new();
            for child in &node.content {
                body.push_str(&to_markdown(child));
            }
            out.push_str("```");
            out.push_str(&language);
            out.push('\n');
            out.push_str(body.trim_end_matches('\n'));
            out.push_str("\n```\n\n");
        }
        NodeType::Blockquote => {
            let mut inner = String::new();
            for child in &node.content {
                inner.push_str(&to_markdown(child));
            }
            let inner = inner.trim_end_matches('\n');
            out.push_str("> ");
            out.push_str(&inner.replace('\n', "\n> "));
            out.push_str("\n\n");
        }
        NodeType::Rule => out.push_str("---\n\n"),
        NodeType::HardBreak => out.push('\n'),
        NodeType::Doc | NodeType::ListItem | NodeType::Unknown => children(&mut out),
    }

    out
}

/// Renders a raw wire value. `null` (Jira's "no description" sentinel) and
/// anything that does not decode as a document render as the empty string.
pub fn to_markdown_value(value: &Value) -> String {
    if value.is_null() {
        return String::new();
    }

    serde_json::from_value::<DocNode>(value.clone())
        .map(|doc| to_markdown(&doc))
        .unwrap_or_default()
}

fn apply_mark(text: String, mark: &Mark) -> String {
    match mark.mark_type {
        MarkType::Strong => format!("**{text}**"),
        MarkType::Em => format!("_{text}_"),
        MarkType::Code => format!("`{text}`"),
        MarkType::Strike => format!("~~{text}~~"),
        MarkType::Link => {
            let href = mark
                .attrs
                .as_ref()
                .and_then(|attrs| attrs.href.clone())
                .unwrap_or_default();
            format!("[{text}]({href})")
        }
        MarkType::Unknown => text,
    }
}

/// Parses Markdown into a structured document. Lossy by design: blank lines
/// separate paragraphs, consecutive lines of a paragraph are joined with a
/// space, and only `**bold**` and `[text](href)` are recognized inline.
/// Headings, lists, and fences typed as Markdown stay plain paragraph text.
pub fn to_document(markdown: &str) -> DocNode {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<DocNode> = Vec::new();

    for line in markdown.lines() {
        if line.trim().is_empty() {
            if !paragraph.is_empty() {
                blocks.push(DocNode::paragraph(std::mem::take(&mut paragraph)));
            }
            continue;
        }

        if !paragraph.is_empty() {
            paragraph.push(DocNode::text(" "));
        }
        paragraph.extend(parse_inline(line));
    }

    if !paragraph.is_empty() {
        blocks.push(DocNode::paragraph(paragraph));
    }

    DocNode::doc(blocks)
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold regex"))
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\(([^)]*)\)").expect("link regex"))
}

fn parse_inline(line: &str) -> Vec<DocNode> {
    let mut nodes = Vec::new();
    let mut rest = line;

    loop {
        let bold = bold_re().captures(rest);
        let link = link_re().captures(rest);

        // Whichever inline marker starts earliest wins the scan position.
        let (captures, is_bold) = match (&bold, &link) {
            (Some(b), Some(l)) => {
                let b_start = b.get(0).map(|m| m.start()).unwrap_or(usize::MAX);
                let l_start = l.get(0).map(|m| m.start()).unwrap_or(usize::MAX);
                if b_start <= l_start {
                    (b, true)
                } else {
                    (l, false)
                }
            }
            (Some(b), None) => (b, true),
            (None, Some(l)) => (l, false),
            (None, None) => break,
        };

        let whole = captures.get(0).expect("capture 0 always present");
        if whole.start() > 0 {
            nodes.push(DocNode::text(&rest[..whole.start()]));
        }

        if is_bold {
            nodes.push(DocNode::marked_text(&captures[1], vec![Mark::strong()]));
        } else {
            nodes.push(DocNode::marked_text(
                &captures[1],
                vec![Mark::link(&captures[2])],
            ));
        }

        rest = &rest[whole.end()..];
    }

    if !rest.is_empty() {
        nodes.push(DocNode::text(rest));
    }

    nodes
}
