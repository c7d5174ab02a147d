use std::sync::LazyLock;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;

static DIRECTIVE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s):::([A-Za-z][\w-]*)\s*```json\s*(\{.*?\})\s*```\s*:::")
        .expect("valid directive block regex")
});

/// A fenced block found in slide markdown, before its body is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub tag: String,
    pub body: String,
}

/// Strategy for locating activity blocks in slide markdown.
pub trait BlockExtractor: Send + Sync {
    /// Returns every candidate block in document order.
    fn extract(&self, content: &str) -> Vec<RawBlock>;
}

/// Matches `:::<tag>` + a fenced json body + `:::` with a regular expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectiveExtractor;

impl BlockExtractor for DirectiveExtractor {
    fn extract(&self, content: &str) -> Vec<RawBlock> {
        DIRECTIVE_BLOCK
            .captures_iter(content)
            .map(|caps| RawBlock {
                tag: caps[1].to_owned(),
                body: caps[2].to_owned(),
            })
            .collect()
    }
}

/// Walks the CommonMark event stream.
///
/// Accepts the directive form (a `:::<tag>` line directly before a ```json fence)
/// and plain fences whose info string is the tag itself (```quiz).
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownExtractor;

impl BlockExtractor for MarkdownExtractor {
    fn extract(&self, content: &str) -> Vec<RawBlock> {
        let mut blocks = Vec::new();
        let mut paragraph: Option<String> = None;
        let mut pending_tag: Option<String> = None;
        let mut fence: Option<(String, String)> = None;

        for event in Parser::new_ext(content, Options::empty()) {
            match event {
                Event::Start(Tag::Paragraph) => {
                    pending_tag = None;
                    paragraph = Some(String::new());
                }
                Event::End(TagEnd::Paragraph) => {
                    pending_tag = paragraph.take().as_deref().and_then(directive_tag);
                }
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                    let lang = info.split_whitespace().next().unwrap_or_default();
                    let tag = if lang == "json" {
                        pending_tag.take()
                    } else if lang.is_empty() {
                        None
                    } else {
                        Some(lang.to_owned())
                    };
                    fence = tag.map(|tag| (tag, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((tag, body)) = fence.take() {
                        blocks.push(RawBlock {
                            tag,
                            body: body.trim().to_owned(),
                        });
                    }
                    pending_tag = None;
                }
                Event::Text(text) => {
                    if let Some((_, body)) = fence.as_mut() {
                        body.push_str(&text);
                    } else if let Some(para) = paragraph.as_mut() {
                        para.push_str(&text);
                    }
                }
                Event::SoftBreak | Event::HardBreak => {
                    if let Some(para) = paragraph.as_mut() {
                        para.push('\n');
                    }
                }
                Event::Start(_) => pending_tag = None,
                _ => {}
            }
        }

        blocks
    }
}

/// Tag named by a trailing `:::<tag>` line, if any.
fn directive_tag(paragraph: &str) -> Option<String> {
    let line = paragraph.lines().last()?.trim();
    let tag = line.strip_prefix(":::")?.trim();
    let valid = tag.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then(|| tag.to_owned())
}
