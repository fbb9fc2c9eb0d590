//! Outbound text shaping for Telegram: Markdown → HTML subset, and chunking.
//!
//! Model replies are Markdown. Telegram accepts a small HTML subset, so code
//! spans are pulled out first, the rest is escaped and rewritten, and the
//! code comes back escaped inside `<code>`/`<pre>`.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use tracing::warn;

/// Replies longer than this are sent as several messages.
pub const MAX_CHUNK_CHARS: usize = 4000;

struct Rules {
    code_block: Regex,
    inline_code: Regex,
    header: Regex,
    blockquote: Regex,
    link: Regex,
    bold: Regex,
    bold_underscore: Regex,
    italic: Regex,
    strike: Regex,
    bullet: Regex,
}

impl Rules {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            code_block: Regex::new(r"(?s)```[\w+-]*\n?(.*?)```")?,
            inline_code: Regex::new(r"`([^`\n]+)`")?,
            header: Regex::new(r"(?m)^#{1,6}\s+(.+)$")?,
            blockquote: Regex::new(r"(?m)^&gt;\s?(.*)$")?,
            link: Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)")?,
            bold: Regex::new(r"\*\*(.+?)\*\*")?,
            bold_underscore: Regex::new(r"__(.+?)__")?,
            // No lookbehind: keep the neighbouring characters so snake_case survives.
            italic: Regex::new(r"(^|[^\w])_([^_\n]+?)_($|[^\w])")?,
            strike: Regex::new(r"~~(.+?)~~")?,
            bullet: Regex::new(r"(?m)^\s*[-*]\s+")?,
        })
    }
}

fn rules() -> Option<&'static Rules> {
    static RULES: OnceLock<Option<Rules>> = OnceLock::new();
    RULES
        .get_or_init(|| match Rules::compile() {
            Ok(rules) => Some(rules),
            Err(e) => {
                warn!("markdown rules failed to compile, sending plain text: {e}");
                None
            }
        })
        .as_ref()
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Convert model Markdown to Telegram HTML.
pub fn markdown_to_telegram_html(text: &str) -> String {
    let Some(rules) = rules() else {
        return escape_html(text);
    };

    let mut blocks: Vec<String> = Vec::new();
    let text = rules.code_block.replace_all(text, |caps: &Captures| {
        blocks.push(format!("<pre><code>{}</code></pre>", escape_html(&caps[1])));
        format!("\u{0}B{}\u{0}", blocks.len() - 1)
    });
    let text = rules.inline_code.replace_all(&text, |caps: &Captures| {
        blocks.push(format!("<code>{}</code>", escape_html(&caps[1])));
        format!("\u{0}B{}\u{0}", blocks.len() - 1)
    });

    let text = rules.header.replace_all(&text, "$1");
    let text = escape_html(&text);
    let text = rules.blockquote.replace_all(&text, "$1");
    let text = rules.link.replace_all(&text, r#"<a href="$2">$1</a>"#);
    let text = rules.bold.replace_all(&text, "<b>$1</b>");
    let text = rules.bold_underscore.replace_all(&text, "<b>$1</b>");
    let text = rules.italic.replace_all(&text, "$1<i>$2</i>$3");
    let text = rules.strike.replace_all(&text, "<s>$1</s>");
    let mut text = rules.bullet.replace_all(&text, "• ").into_owned();

    for (i, block) in blocks.iter().enumerate() {
        text = text.replace(&format!("\u{0}B{i}\u{0}"), block);
    }
    text
}

/// Split `text` into pieces of at most `max_chars` characters, preferring
/// to break after a newline.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        // Byte offset just past the `max_chars`-th character.
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(i, _)| i);
        let window = &rest[..limit];
        let (chunk, next) = match window.rfind('\n') {
            Some(nl) if nl > 0 => (&rest[..nl], &rest[nl + 1..]),
            _ => (window, &rest[limit..]),
        };
        chunks.push(chunk.to_string());
        rest = next;
    }
    chunks.push(rest.to_string());
    chunks
}
