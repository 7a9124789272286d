//! Completion verification and continuation.
//!
//! Model output is often cut off at the token limit. [`is_incomplete`] is a
//! cheap structural heuristic: it counts open and close tags for a few
//! tracked pairs and flags the fragment when any pair is unbalanced. This is
//! not an HTML parse; balanced-but-broken markup passes, and tags outside
//! the tracked set are never checked.
//!
//! [`generate_complete`] drives one generation unit: the first call, then up
//! to `max_rounds` "continue where you stopped" calls while the output still
//! looks truncated, then [`sanitize`].

use tracing::{debug, warn};

use crate::error::GenerationError;
use crate::model::ModelInvoker;
use crate::models::Fragment;
use crate::prompts;

/// Open/close markers whose counts must match in a complete fragment.
pub const TRACKED_TAGS: [(&str, &str); 4] = [
    ("<section", "</section>"),
    ("<ul>", "</ul>"),
    ("<pre>", "</pre>"),
    ("<code>", "</code>"),
];

/// True when `html` is empty or any tracked tag pair is unbalanced.
pub fn is_incomplete(html: &str) -> bool {
    if html.is_empty() {
        return true;
    }
    TRACKED_TAGS
        .iter()
        .any(|(open, close)| html.matches(open).count() != html.matches(close).count())
}

/// Undo doubled-entity escaping and trim.
///
/// # Errors
///
/// [`GenerationError::EmptyOutput`] when nothing is left.
pub fn sanitize(unit_id: &str, html: &str) -> Result<String, GenerationError> {
    let cleaned = html
        .replace("&gt;&gt;", ">")
        .replace("&lt;&lt;", "<")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        return Err(GenerationError::EmptyOutput {
            unit: unit_id.to_string(),
        });
    }
    Ok(cleaned)
}

/// Generate one fragment, repairing truncated output with continuation calls.
///
/// Every model failure is propagated; a failed continuation fails the unit
/// rather than returning a half-written fragment silently.
pub async fn generate_complete(
    invoker: &ModelInvoker,
    unit_id: &str,
    prompt: &str,
    max_tokens: u32,
    max_rounds: usize,
) -> Result<Fragment, GenerationError> {
    let mut html = invoker.invoke(prompt, max_tokens).await?;

    let mut rounds = 0usize;
    while is_incomplete(&html) && rounds < max_rounds {
        rounds += 1;
        debug!(unit = unit_id, round = rounds, "output incomplete, requesting continuation");
        let continuation = prompts::continuation_prompt(prompt, &html);
        let more = invoker.invoke(&continuation, max_tokens).await?;
        html.push_str(&more);
    }

    if is_incomplete(&html) {
        warn!(
            unit = unit_id,
            rounds, "output still incomplete after continuation budget, accepting as-is"
        );
    }

    Ok(Fragment {
        unit_id: unit_id.to_string(),
        html: sanitize(unit_id, &html)?,
    })
}
