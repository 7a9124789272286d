//! Merge/stitch stage.
//!
//! Two strategies combine fragments into the final document:
//!
//! - [`MergeStrategy::Sections`]: every fixed [`Section`] is generated
//!   independently from all map summaries, then the fragments are
//!   concatenated in [`Section::ALL`] order behind a shared stylesheet.
//! - [`MergeStrategy::Unify`]: the map outputs are treated as partial
//!   documents and one more model call merges and de-duplicates them.
//!
//! Fragments arrive in completion order; both strategies key them by unit
//! id before laying them out. The result never carries document wrapper tags.

use serde::Deserialize;
use std::collections::HashMap;

use crate::completion::generate_complete;
use crate::error::GenerationError;
use crate::model::ModelInvoker;
use crate::models::{Fragment, Section};
use crate::prompts;
use crate::render;

/// Stylesheet prefixed to stitched documents.
pub const STYLE: &str = "<style>body{font-family:sans-serif; line-height:1.6; color:#333; max-width:1100px; margin:auto; padding:30px;} table{border-collapse:collapse; width:100%; margin:20px 0;} th,td{border:1px solid #ddd; padding:10px; text-align:left;} th{background:#f4f4f4;} pre{background:#f4f4f4; padding:15px; border-radius:5px; overflow:auto;} h2{border-bottom:2px solid #eee; padding-bottom:10px; margin-top:40px; color:#2c3e50;} h3{color:#34495e; background:#f9f9f9; padding:5px; border-left:4px solid #34495e;}</style>";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    #[default]
    Sections,
    Unify,
}

/// Concatenate section fragments in document order.
///
/// Fragments whose unit id is not a section are ignored; sections without a
/// fragment (failed units) leave an empty slot.
pub fn stitch_sections(fragments: Vec<Fragment>) -> Fragment {
    let mut by_section: HashMap<Section, String> = fragments
        .into_iter()
        .filter_map(|f| Section::from_unit_id(&f.unit_id).map(|s| (s, f.html)))
        .collect();

    let body = Section::ALL
        .iter()
        .map(|s| {
            by_section
                .remove(s)
                .map(|html| render::finish_fragment(&html))
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join("\n");

    Fragment {
        unit_id: "document".to_string(),
        html: format!("{}\n{}", STYLE, body),
    }
}

/// Order map fragments by chunk index (`chunk-{n}`), falling back to id order.
pub fn order_chunk_fragments(mut fragments: Vec<Fragment>) -> Vec<Fragment> {
    fragments.sort_by_key(|f| {
        let index = f
            .unit_id
            .strip_prefix("chunk-")
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        (index, f.unit_id.clone())
    });
    fragments
}

/// Merge partial documents with one further model call.
///
/// `previous` is the existing document, if any; the merge keeps it consistent
/// the same way section prompts do.
pub async fn unify(
    invoker: &ModelInvoker,
    fragments: Vec<Fragment>,
    previous: Option<&str>,
    max_tokens: u32,
    max_rounds: usize,
) -> Result<Fragment, GenerationError> {
    let partials: Vec<String> = order_chunk_fragments(fragments)
        .into_iter()
        .map(|f| f.html)
        .collect();
    let prompt = prompts::unify_prompt(&partials, previous);
    let merged = generate_complete(invoker, "document", &prompt, max_tokens, max_rounds).await?;

    Ok(Fragment {
        unit_id: merged.unit_id,
        html: format!("{}\n{}", STYLE, render::finish_fragment(&merged.html)),
    })
}
