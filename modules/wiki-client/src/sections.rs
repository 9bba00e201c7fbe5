use std::collections::BTreeMap;

pub const INTRODUCTION: &str = "Introduction";

/// Split plain-text page content into named sections.
///
/// A line that starts and ends with `==` is a header; the lines after it form
/// that section's body until the next header. Text before the first header
/// belongs to an implicit "Introduction". Empty bodies are skipped and a
/// repeated title keeps the later body.
pub fn parse_sections(content: &str) -> BTreeMap<String, String> {
    let mut sections = BTreeMap::new();
    let mut current = INTRODUCTION.to_string();
    let mut body: Vec<&str> = Vec::new();

    for line in content.split('\n') {
        if is_header(line) {
            flush(&mut sections, &current, &body);
            current = line.trim_matches(|c| c == '=' || c == ' ').trim().to_string();
            body.clear();
        } else {
            body.push(line);
        }
    }
    flush(&mut sections, &current, &body);

    sections
}

fn is_header(line: &str) -> bool {
    line.len() >= 4 && line.starts_with("==") && line.ends_with("==")
}

fn flush(sections: &mut BTreeMap<String, String>, title: &str, body: &[&str]) {
    let text = body.join("\n");
    let text = text.trim();
    if !text.is_empty() {
        sections.insert(title.to_string(), text.to_string());
    }
}

/// Text before the first header.
pub fn summary(content: &str) -> String {
    content
        .split('\n')
        .take_while(|line| !is_header(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Page URL anchored at a section, e.g. `.../Peace_of_Westphalia#Treaty_terms`.
pub fn section_url(page_url: &str, section_title: &str) -> String {
    format!("{}#{}", page_url, section_title.replace(' ', "_"))
}
