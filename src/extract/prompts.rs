//! Prompt templates for the three extraction modes
//!
//! Templates carry `{FOCUS_POINT}`, `{SCHEMA}`, `{URL}` and `{HTML}`
//! placeholders. [`PromptSet::for_focus`] fills the focus-specific parts
//! once; [`PromptSet::render`] fills the per-chunk parts.

use super::focus::{FieldSchema, FocusPoint};

const EXTRACT_INFO_AND_LINKS: &str = r#"Based on the following keywords and selection conditions, extract information from the <main-content> area of the given <markdown>, and find links worth exploring further anywhere in the <markdown>:

{FOCUS_POINT}

Below is the markdown content:
<markdown>
{HTML}
</markdown>

The markdown was converted from a web page and may be only one chunk of it.
Every link (a or img element) of the original page has been replaced by a reference tag such as "[x]".

For information extraction:
- If this is an article list page, skip information extraction and go straight to link discovery.
- Only extract from the <main-content> area. If there is no <main-content> area, skip information extraction.
- Respect every constraint in the selection conditions (time range, amounts, topics, ...), but do not explain or justify anything in the output.
- If nothing in <main-content> matches the keywords and conditions, skip information extraction.
- Merge several findings into one coherent message that keeps all key points. Do not open with phrases like "the markdown mentions"; state the information directly.

For link discovery:
- Look for reference tags anywhere in the markdown.
- Use the surrounding context to judge whether the linked page is likely to hold the information we need.
- Output each selected reference tag together with the sentence it appears in, one per line.

Wrap the results in <info></info> and <links></links> tags:

<info>
The extracted information, merged into one message; leave empty if there is none. No explanations.
</info>

<links>
Sentence 1 containing a reference tag
Sentence 2 containing a reference tag
...
</links>
"#;

const EXTRACT_INFO_ONLY: &str = r#"Based on the following keywords and selection conditions, extract information from the <main-content> area of the given <markdown>:

{FOCUS_POINT}

Below is the markdown content:
<markdown>
{HTML}
</markdown>

The markdown was converted from a web page and may be only one chunk of it.
Every link (a or img element) of the original page has been replaced by a reference tag such as "[x]".

Follow these rules:
- Only extract from the <main-content> area. If there is none, stop without any explanation.
- If this is an article list page, stop without any explanation.
- Respect every constraint in the selection conditions (time range, amounts, topics, ...), but do not explain or justify anything in the output.
- If nothing in <main-content> matches the keywords and conditions, stop without any explanation.
- Merge several findings into one coherent message that keeps all key points. Do not open with phrases like "the markdown mentions"; state the information directly.

If information can be extracted, wrap it in <info></info> tags:

<info>
The extracted information, merged into one message; leave empty if there is none. No explanations.
</info>
"#;

const EXTRACT_LINKS_ONLY: &str = r#"Based on the following keywords and selection conditions, find links worth exploring further in the given <markdown> (links appear as reference tags such as [x]):

{FOCUS_POINT}

Below is the markdown content:
<markdown>
{HTML}
</markdown>

The markdown was converted from a web page and may be only one chunk of it.
Every link (a or img element) of the original page has been replaced by a reference tag such as "[x]".

Follow these rules:
- Use the surrounding context to judge whether the linked page is likely to hold the information we need.
- Output each selected reference tag together with the sentence it appears in, one per line.

Wrap the results in <links></links> tags:

<links>
Sentence 1 containing a reference tag
Sentence 2 containing a reference tag
...
</links>
"#;

const EXTRACT_WITH_SCHEMA: &str = r##"The following is content from a web page:
<url>{URL}</url>
<url_content>
{HTML}
</url_content>

Extract information from <url_content> according to this schema and return a list of JSON objects:
<schema>
{SCHEMA}
</schema>

Instructions:
Return one JSON object per valid piece of information, in the order it appears on the page. Wrap the whole JSON list in <json>...</json> tags.

Quality check:
Make sure the JSON is complete, covers everything requested, matches the schema exactly and parses without errors.

Avoid these mistakes:
- No "//" or "#" comments inside the JSON.
- Braces, brackets and commas must all be in the right places.
- Do not forget the closing </json> tag.
- Do not write code that would perform the task; return the extracted JSON itself.

Output the final list of JSON objects wrapped in <json>...</json> tags.
"##;

/// Appended to every prompt so relative dates can be resolved
pub fn date_notice(today: &str) -> String {
    format!("\nBy the way, today is {}.", today)
}

/// Prompts for one focus point
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    pub only_links: String,
    pub only_info: String,
    pub both: String,
    /// Present when the focus declares a custom schema
    pub schema: Option<String>,
}

impl PromptSet {
    pub fn for_focus(focus: &FocusPoint, schema: &FieldSchema) -> Self {
        let preamble = preamble(focus);
        let block = focus_block(focus);
        let fill = |template: &str| format!("{}{}", preamble, template.replace("{FOCUS_POINT}", &block));

        let schema = if schema.is_empty() {
            None
        } else {
            Some(format!(
                "{}{}",
                preamble,
                EXTRACT_WITH_SCHEMA.replace("{SCHEMA}", &schema_listing(schema))
            ))
        };

        Self {
            only_links: fill(EXTRACT_LINKS_ONLY),
            only_info: fill(EXTRACT_INFO_ONLY),
            both: fill(EXTRACT_INFO_AND_LINKS),
            schema,
        }
    }

    /// Fills the per-chunk placeholders of a template
    pub fn render(template: &str, content: &str, url: &str, today: &str) -> String {
        let mut prompt = template.replace("{URL}", url).replace("{HTML}", content);
        prompt.push_str(&date_notice(today));
        prompt
    }
}

/// `Role:` / `Purpose:` / `Task:` lines, empty when neither role nor purpose is set
fn preamble(focus: &FocusPoint) -> String {
    let mut out = String::new();
    if !focus.role.is_empty() {
        out.push_str(&format!("Role: {}\n", focus.role));
    }
    if !focus.purpose.is_empty() {
        out.push_str(&format!("Purpose: {}\n", focus.purpose));
    }
    if !out.is_empty() {
        out.push_str("Task:\n");
    }
    out
}

fn focus_block(focus: &FocusPoint) -> String {
    let mut out = String::new();
    if !focus.keywords.is_empty() {
        out.push_str(&format!("<keywords>{}</keywords>", focus.keywords));
    }
    if !focus.restrictions.is_empty() {
        out.push_str(&format!("\n<selection_conditions>{}</selection_conditions>", focus.restrictions));
    }
    if !focus.explanation.is_empty() {
        out.push_str(&format!("\n<explanation>{}</explanation>", focus.explanation));
    }
    out.trim().to_string()
}

/// Pretty JSON of the schema, indented to sit inside the `<schema>` block
fn schema_listing(schema: &FieldSchema) -> String {
    let json = serde_json::to_string_pretty(schema).unwrap_or_default();
    json.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
