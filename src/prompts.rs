//! Prompts for the AI vision collaborator.
//!
//! Keeping the prompt here rather than inline in [`crate::pipeline::vision`]
//! means prompt wording can change without touching retry or parsing logic,
//! and tests can assert on the JSON contract the parser relies on.

/// Prompt sent with every `vision`-disposition image.
///
/// The model must answer with a single JSON object carrying `contentType`,
/// `description` and `rawText`; [`crate::pipeline::vision::parse_analysis`]
/// depends on those three keys.
pub const VISION_ANALYSIS_PROMPT: &str = r#"You are analysing one image extracted from a PDF document.

First decide what kind of image it is:
- "substantive": a photograph, chart, graph, table, diagram, map, screenshot or scanned page that carries information
- "decorative": an icon, logo, border, divider, background texture or ornament that carries no information beyond its text

For a SUBSTANTIVE image write an exhaustive description, detailed enough that a reader could reconstruct the image's key elements and meaning without seeing it:
1. Start with a one-sentence summary of the subject and purpose.
2. Name the kind of visual (bar chart, line graph, photograph, flowchart, ...).
3. Charts and tables: list every label, axis value, legend entry and data point; transcribe every table cell.
4. Diagrams and documents: describe the layout, every shape and connector, and transcribe all labels.
5. Photographs and illustrations: describe people, objects, setting, colours and style.
6. End with the information the image is most likely meant to convey.

For a DECORATIVE image write a single sentence (for example "A blue and white company logo.").

In both cases copy ALL visible text, numbers and symbols into rawText, keeping line breaks. Use an empty string when there is no text.

Return exactly one JSON object and nothing else:
{"contentType": "substantive" | "decorative", "description": "...", "rawText": "..."}"#;
