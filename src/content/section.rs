//! Section Extraction
//!
//! Extracts a named section from markdown-style content: the heading line
//! plus everything up to (not including) the next heading of equal or higher
//! level. Matching prefers an exact title, then a case-insensitive match,
//! then a substring match; the nearest-following candidate wins ties.

use regex_lite::Regex;

struct Heading {
    line_index: usize,
    level: usize,
    title: String,
}

fn parse_headings(lines: &[&str]) -> Vec<Heading> {
    let re = Regex::new(r"^(#{1,6})\s+(.*?)\s*$").unwrap();
    let mut headings = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        if let Some(caps) = re.captures(line) {
            headings.push(Heading {
                line_index: index,
                level: caps.get(1).map(|m| m.as_str().len()).unwrap_or(1),
                title: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
            });
        }
    }
    headings
}

fn find_heading<'a>(headings: &'a [Heading], title: &str) -> Option<&'a Heading> {
    if let Some(h) = headings.iter().find(|h| h.title == title) {
        return Some(h);
    }
    let lowered = title.to_lowercase();
    if let Some(h) = headings
        .iter()
        .find(|h| h.title.to_lowercase() == lowered)
    {
        return Some(h);
    }
    headings
        .iter()
        .find(|h| h.title.to_lowercase().contains(&lowered))
}

/// Extract a section by heading title. Returns the heading line and body up
/// to the next equal-or-higher heading, or None when no heading matches.
pub fn extract_section(content: &str, title: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let headings = parse_headings(&lines);
    let target = find_heading(&headings, title)?;

    let end = headings
        .iter()
        .find(|h| h.line_index > target.line_index && h.level <= target.level)
        .map(|h| h.line_index)
        .unwrap_or(lines.len());

    let mut out = lines[target.line_index..end].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    Some(out)
}

/// Rename the heading of an extracted section slice.
pub fn rename_section(section: &str, new_title: &str) -> String {
    let mut lines = section.lines();
    let first = match lines.next() {
        Some(line) => line,
        None => return section.to_string(),
    };
    let hashes: String = first.chars().take_while(|c| *c == '#').collect();
    if hashes.is_empty() {
        return section.to_string();
    }
    let rest: Vec<&str> = lines.collect();
    let mut out = format!("{} {}", hashes, new_title);
    for line in rest {
        out.push('\n');
        out.push_str(line);
    }
    out.push('\n');
    out
}
