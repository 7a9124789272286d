//! Prompt builders for each generation phase.

use crate::models::{Chunk, Section};

/// Appended when a fragment was cut off.
pub const CONTINUE_PROMPT: &str = "
Continue EXACTLY from where you stopped.
Do NOT repeat content.
Return ONLY valid HTML body.
Close any open tags.
";

const OUTPUT_RULES: &str = "
RULES:
- Output ONLY valid HTML body content. No <html>, <head> or <body> tags.
- Use <h2>, <h3>, <p>, <ul>, <table>, <pre>, <code>.
- Do not use the <section> tag.
- No markdown, except diagrams: use ONLY ```mermaid code blocks for diagrams.
- No explanations before or after the HTML.
";

/// Map phase: extract facts and partial documentation from one chunk.
pub fn map_prompt(chunk: &Chunk, diff: Option<&str>) -> String {
    let files = serde_json::to_string(&chunk.files).unwrap_or_else(|_| "[]".to_string());
    let diff_block = match diff {
        Some(d) if !d.trim().is_empty() => {
            format!("Below is the Git diff for the latest merge:\n<diff>\n{}\n</diff>\n", d)
        }
        _ => String::new(),
    };

    format!(
        "You are a senior software architect acting as an analyst.
{diff_block}Below are source files from the repository (part {part}):
<files>
{files}
</files>
TASK:
List EVERY SINGLE API endpoint with its full path, method and a brief summary.
List EVERY database table or schema. Identify security mechanisms, configuration,
observability (logging, metrics, error handling), deployment assumptions and the
tech stack. Describe the key components and how they interact. Do not omit anything.
{OUTPUT_RULES}",
        part = chunk.index + 1,
    )
}

fn section_task(section: Section) -> &'static str {
    match section {
        Section::Header => {
            "<h2>Service Overview</h2><p>Provide a comprehensive narrative of the business logic.</p>\
             <h2>System Architecture</h2><p>Detail interactions. Use a ```mermaid\\ngraph TD\\n...``` block.</p>\
             <h2>Tech Stack</h2><p>HTML table [Category, Technology, Usage].</p>"
        }
        Section::Apis => {
            "<h2>API Details</h2>\
             <p>Identify and document EVERY API endpoint found in the summaries. For EACH endpoint provide:</p>\
             <ul><li>H3 method and path</li><li>Detailed description</li><li>Request parameter table</li>\
             <li>Request JSON sample (&lt;pre&gt;&lt;code&gt;)</li><li>Response table</li>\
             <li>Response JSON sample (&lt;pre&gt;&lt;code&gt;)</li>\
             <li>A UNIQUE ```mermaid\\nsequenceDiagram\\n...``` block for THIS endpoint.</li></ul>"
        }
        Section::Dao => {
            "<h2>DAO Table Details</h2><p>Document every database table/schema. H3 table name and a column \
             table [Field, Type, Constraints, Description]. Skip DTOs.</p>"
        }
        Section::Security => {
            "<h2>Security</h2><p>Provide a short bulleted list (ul/li) of implemented authentication and \
             security mechanisms. No tables.</p>"
        }
        Section::Observability => {
            "<h2>Observability</h2><p>Sub-sections: Logging, Metrics, Exception Handling. Use tables if data exists.</p>"
        }
        Section::Setup => {
            "<h2>Setup the Service</h2><h3>Prerequisites</h3><p>List software and environment variables.</p>\
             <h3>Testing</h3><p>Provide cURL/Postman details based on the authentication scheme.</p>"
        }
        Section::Recommendations => {
            "<h2>Recommendations</h2><p>Narrative on logging and security improvements. No architecture proposals.</p>"
        }
    }
}

fn previous_block(previous: Option<&str>) -> String {
    match previous {
        Some(p) if !p.trim().is_empty() => format!(
            "\nExisting documentation (keep facts that still hold, update what changed):\n<previous>\n{}\n</previous>\n",
            p
        ),
        _ => String::new(),
    }
}

/// Section phase: write one document section from all map summaries.
pub fn section_prompt(section: Section, summaries: &[String], previous: Option<&str>) -> String {
    let context = serde_json::to_string(summaries).unwrap_or_else(|_| "[]".to_string());
    let previous_block = previous_block(previous);

    format!(
        "Context: {context}\n{previous_block}\nTask: {task}\n\nEnsure ALL identified items are included.\n{OUTPUT_RULES}",
        task = section_task(section),
    )
}

/// Unify phase: merge partial documents into one.
pub fn unify_prompt(partials: &[String], previous: Option<&str>) -> String {
    let partials = serde_json::to_string(partials).unwrap_or_else(|_| "[]".to_string());
    let previous_block = previous_block(previous);
    format!(
        "Merge the following HTML fragments into ONE complete HTML document.
Remove duplicates and ensure clean structure.
<partials>
{partials}
</partials>
{previous_block}{OUTPUT_RULES}"
    )
}

/// Ask the model to resume a truncated answer.
///
/// The backend keeps no conversation state, so the original task and the
/// output so far are repeated before the continuation instruction.
pub fn continuation_prompt(original: &str, partial: &str) -> String {
    format!(
        "{original}\n\nYour previous answer was cut off. Here is what you wrote so far:\n<partial>\n{partial}\n</partial>\n{CONTINUE_PROMPT}"
    )
}
