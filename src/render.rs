//! Post-processing of model HTML.
//!
//! Models mix markdown into HTML no matter how the prompt is phrased. This
//! module turns ```` ```mermaid ```` blocks into rendered diagram images,
//! strips markdown residue, and removes document-level wrapper tags so a
//! fragment can be embedded into a larger page body.

use base64::Engine;
use regex::Regex;
use std::sync::OnceLock;

const MERMAID_RENDER_BASE: &str = "https://mermaid.ink/svg/";

fn mermaid_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```mermaid\s*(.*?)\s*```").expect("valid regex"))
}

fn mermaid_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)%%.*$|#.*$").expect("valid regex"))
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[a-zA-Z]*").expect("valid regex"))
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"))
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#+\s+(.*)$").expect("valid regex"))
}

fn wrapper_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<!DOCTYPE[^>]*>|<head\b[^>]*>.*?</head>|</?html\b[^>]*>|</?body\b[^>]*>")
            .expect("valid regex")
    })
}

/// Replace every mermaid block with an `<img>` rendered by mermaid.ink.
pub fn render_mermaid(text: &str) -> String {
    mermaid_block_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let code = mermaid_comment_re().replace_all(caps[1].trim(), "");
            let encoded = base64::engine::general_purpose::STANDARD.encode(code.trim().as_bytes());
            format!(
                r#"<div style="text-align:center; margin:30px 0;"><img src="{}{}" alt="Diagram" style="max-width:100%; border:1px solid #eee; padding:10px; background:#fff;"/></div>"#,
                MERMAID_RENDER_BASE, encoded
            )
        })
        .into_owned()
}

/// Remove code fences, `**bold**` markers and `#` heading markers.
pub fn strip_markdown(text: &str) -> String {
    let text = fence_re().replace_all(text, "");
    let text = bold_re().replace_all(&text, "$1");
    heading_re().replace_all(&text, "$1").into_owned()
}

/// Drop `<!DOCTYPE>`, `<html>`, `<head>…</head>` and `<body>` wrappers.
pub fn strip_document_wrappers(html: &str) -> String {
    wrapper_re().replace_all(html, "").trim().to_string()
}

/// Full clean-up applied to every fragment before merging.
pub fn finish_fragment(html: &str) -> String {
    strip_document_wrappers(&strip_markdown(&render_mermaid(html)))
}
