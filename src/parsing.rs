//! Parsing utilities for generated text.
//!
//! The summarizer and planner prompts ask the model for a loose marker
//! grammar (`#summary#`, `#original statements#`, `#section <n>#` with
//! `- Title:` style fields). Models follow it imperfectly, so everything
//! here is lenient: markers are matched case-insensitively, missing fields
//! become empty, and bullet styles are normalized.

use crate::error::Result;
use crate::prompt::{SECTION_MARKER, STATEMENTS_MARKER, SUMMARY_MARKER};
use crate::types::SectionOutline;
use crate::PipelineError;

/// Extract `<think>...</think>` blocks from a response.
///
/// Returns `(thinking_content, cleaned_text)` where `cleaned_text` has the
/// thinking block removed and is trimmed.
pub fn extract_thinking(text: &str) -> (Option<String>, String) {
    let think_start = "<think>";
    let think_end = "</think>";

    if let (Some(start_idx), Some(end_idx)) = (text.find(think_start), text.find(think_end)) {
        if start_idx < end_idx {
            let thinking = text[start_idx + think_start.len()..end_idx].trim();
            let cleaned = format!("{}{}", &text[..start_idx], &text[end_idx + think_end.len()..]);
            let thinking = (!thinking.is_empty()).then(|| thinking.to_string());
            return (thinking, cleaned.trim().to_string());
        }
    }

    (None, text.to_string())
}

/// Byte offset of `needle` in `haystack`, ignoring ASCII case.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

/// Split a summarizer answer into summary text and statements.
///
/// Text before `#original statements#` (after `#summary#` when present) is
/// the summary; bullet items after it are the statements. An answer with no
/// markers at all is taken whole as the summary.
pub fn split_summary(text: &str) -> (String, Vec<String>) {
    let (_, text) = extract_thinking(text);

    let (summary_part, statements_part) = match find_ci(&text, STATEMENTS_MARKER) {
        Some(idx) => (&text[..idx], &text[idx + STATEMENTS_MARKER.len()..]),
        None => (text.as_str(), ""),
    };

    let summary_part = match find_ci(summary_part, SUMMARY_MARKER) {
        Some(idx) => &summary_part[idx + SUMMARY_MARKER.len()..],
        None => summary_part,
    };

    (summary_part.trim().to_string(), parse_bullets(statements_part))
}

/// Strip a list marker (`-`, `*`, `•`, `1.`, `2)`) from a line.
fn strip_bullet(line: &str) -> Option<&str> {
    let line = line.trim();
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }
    None
}

/// Collect list items from text, one per bullet line.
///
/// Non-bullet lines continue the previous item; leading prose before the
/// first bullet is ignored.
pub fn parse_bullets(text: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for line in text.lines() {
        if let Some(item) = strip_bullet(line) {
            if !item.is_empty() {
                items.push(item.to_string());
            }
        } else if let Some(last) = items.last_mut() {
            let cont = line.trim();
            if !cont.is_empty() {
                last.push(' ');
                last.push_str(cont);
            }
        }
    }
    items
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Title,
    Ideas,
    Statements,
}

/// Recognize a `- Title:` style field line and return its inline value.
fn field_line(line: &str) -> Option<(Field, &str)> {
    let line = line.trim().trim_start_matches(['-', '*']).trim_start();
    let (name, value) = line.split_once(':')?;
    let field = match name.trim().to_ascii_lowercase().as_str() {
        "title" => Field::Title,
        "ideas" => Field::Ideas,
        "original statements" | "statements" => Field::Statements,
        _ => return None,
    };
    Some((field, value.trim()))
}

/// Parse one section block (the text after a `#section` marker).
fn parse_section_block(number: usize, block: &str) -> SectionOutline {
    // The header runs up to its closing `#`: " 3#" or " 3: Intro#". Text
    // after it on the same line already belongs to the body.
    let header_end = block.find('\n').unwrap_or(block.len());
    let header = &block[..header_end];
    let body = match header.find('#') {
        Some(close) => &block[close + 1..],
        None if header.trim().chars().all(|c| c.is_ascii_digit()) => &block[header_end..],
        None => block,
    };
    let body = body.trim();

    let mut title = String::new();
    let mut ideas = String::new();
    let mut statements = Vec::new();
    let mut current: Option<Field> = None;

    for line in body.lines() {
        if let Some((field, value)) = field_line(line) {
            current = Some(field);
            match field {
                Field::Title => title = value.to_string(),
                Field::Ideas => ideas = value.to_string(),
                Field::Statements if !value.is_empty() => statements.push(value.to_string()),
                Field::Statements => {}
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match current {
            Some(Field::Statements) => {
                statements.push(strip_bullet(trimmed).unwrap_or(trimmed).to_string());
            }
            Some(Field::Ideas) => {
                if !ideas.is_empty() {
                    ideas.push(' ');
                }
                ideas.push_str(strip_bullet(trimmed).unwrap_or(trimmed));
            }
            _ => {}
        }
    }

    SectionOutline {
        number,
        title,
        ideas,
        statements,
        body: body.to_string(),
    }
}

/// Parse a podcast plan into ordered section outlines.
///
/// Sections are numbered by position (1-based) regardless of the numbers
/// the model wrote. Text before the first `#section` marker is ignored.
pub fn parse_sections(plan: &str) -> Result<Vec<SectionOutline>> {
    let (_, plan) = extract_thinking(plan);
    let lower = plan.to_ascii_lowercase();
    let starts: Vec<usize> = lower.match_indices(SECTION_MARKER).map(|(i, _)| i).collect();

    let sections: Vec<SectionOutline> = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(plan.len());
            &plan[start + SECTION_MARKER.len()..end]
        })
        .filter(|block| !block.trim().is_empty())
        .enumerate()
        .map(|(i, block)| parse_section_block(i + 1, block))
        .collect();

    if sections.is_empty() {
        return Err(PipelineError::EmptyPlan);
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "Here is the plan.\n\n\
#section 1#\n\
- Title: Why charity fails\n\
- Ideas: altruism as an obstacle\n\
- Original statements: the people who do most harm try to do most good\n\
\n\
#section 2#\n\
- Title: Rebuilding society\n\
- Ideas: prevention over relief\n\
  and the role of the state\n\
- Original statements:\n\
  - poverty should be impossible\n\
  - kind slave-owners\n";

    #[test]
    fn test_extract_thinking() {
        let (thinking, cleaned) = extract_thinking("<think>hmm</think>\n#summary# x");
        assert_eq!(thinking.as_deref(), Some("hmm"));
        assert_eq!(cleaned, "#summary# x");
    }

    #[test]
    fn test_extract_thinking_absent() {
        let (thinking, cleaned) = extract_thinking("plain");
        assert!(thinking.is_none());
        assert_eq!(cleaned, "plain");
    }

    #[test]
    fn test_split_summary_with_markers() {
        let (summary, statements) = split_summary(
            "#summary#\nSociety should prevent poverty.\n\n#original statements#\n- charity as slavery\n- a plea to restrain altruism",
        );
        assert_eq!(summary, "Society should prevent poverty.");
        assert_eq!(statements, vec!["charity as slavery", "a plea to restrain altruism"]);
    }

    #[test]
    fn test_split_summary_case_insensitive() {
        let (summary, statements) = split_summary("#Summary# ok\n#Original Statements#\n1. first");
        assert_eq!(summary, "ok");
        assert_eq!(statements, vec!["first"]);
    }

    #[test]
    fn test_split_summary_without_markers() {
        let (summary, statements) = split_summary("  just prose  ");
        assert_eq!(summary, "just prose");
        assert!(statements.is_empty());
    }

    #[test]
    fn test_parse_bullets_continuation() {
        let items = parse_bullets("intro\n- one\n  continues\n* two\n3) three");
        assert_eq!(items, vec!["one continues", "two", "three"]);
    }

    #[test]
    fn test_parse_sections_fields() {
        let sections = parse_sections(PLAN).unwrap();
        assert_eq!(sections.len(), 2);

        assert_eq!(sections[0].number, 1);
        assert_eq!(sections[0].title, "Why charity fails");
        assert_eq!(sections[0].ideas, "altruism as an obstacle");
        assert_eq!(
            sections[0].statements,
            vec!["the people who do most harm try to do most good"]
        );

        assert_eq!(sections[1].title, "Rebuilding society");
        assert_eq!(sections[1].ideas, "prevention over relief and the role of the state");
        assert_eq!(
            sections[1].statements,
            vec!["poverty should be impossible", "kind slave-owners"]
        );
        assert!(sections[1].body.starts_with("- Title: Rebuilding society"));
    }

    #[test]
    fn test_sections_numbered_by_position() {
        let sections = parse_sections("#section 4#\n- Title: a\n#section 9#\n- Title: b").unwrap();
        assert_eq!(sections.iter().map(|s| s.number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(sections[1].title, "b");
    }

    #[test]
    fn test_header_with_inline_title() {
        let sections = parse_sections("#Section 1: Opening#\n- Ideas: hello").unwrap();
        assert_eq!(sections[0].ideas, "hello");
        assert_eq!(sections[0].body, "- Ideas: hello");
    }

    #[test]
    fn test_fields_on_the_header_line() {
        let sections = parse_sections("#section 1# - Title: Origins\n- Ideas: how it began").unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Origins");
        assert_eq!(sections[0].ideas, "how it began");
        assert_eq!(sections[0].body, "- Title: Origins\n- Ideas: how it began");
    }

    #[test]
    fn test_empty_plan_is_an_error() {
        assert!(matches!(parse_sections("no sections here"), Err(PipelineError::EmptyPlan)));
        assert!(matches!(parse_sections("#section"), Err(PipelineError::EmptyPlan)));
    }
}
