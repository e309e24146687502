/// Append a numbered citation block to a completion's text.
///
/// With no citations the text is returned untouched. Otherwise the output is
/// the text, a blank line, `Citations:`, then one `[n] url` line per citation
/// in the order the API returned them (1-based).
pub fn append_citations(mut text: String, citations: &[String]) -> String {
    if citations.is_empty() {
        return text;
    }

    text.push_str("\n\nCitations:\n");
    let lines: Vec<String> = citations
        .iter()
        .enumerate()
        .map(|(i, url)| format!("[{}] {}", i + 1, url))
        .collect();
    text.push_str(&lines.join("\n"));
    text
}
