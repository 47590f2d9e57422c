use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::parsing;

/// Condensed form of one input document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// General arguments of the document.
    pub summary: String,

    /// Notable statements, kept apart from the summary.
    pub statements: Vec<String>,

    /// Text exactly as generated; this is what gets stored and handed to
    /// the planner.
    pub raw: String,
}

impl Summary {
    /// Parse a summarizer answer using the `#summary#` and
    /// `#original statements#` markers.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let (summary, statements) = parsing::split_summary(&raw);
        Self {
            summary,
            statements,
            raw,
        }
    }
}

/// One planned section of the podcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOutline {
    /// 1-based position in the plan.
    pub number: usize,

    pub title: String,

    pub ideas: String,

    /// Statements that must appear in this section.
    pub statements: Vec<String>,

    /// Body of the section block as generated (header excluded).
    pub body: String,
}

impl SectionOutline {
    /// The outline as sent to the section writer.
    pub fn to_message(&self) -> String {
        format!("#section {}#\n{}", self.number, self.body)
    }
}

/// The podcast skeleton: ordered section outlines plus the raw plan text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastPlan {
    pub sections: Vec<SectionOutline>,
    pub raw: String,
}

impl PodcastPlan {
    /// Parse a planner answer. Fails with
    /// [`PipelineError::EmptyPlan`](crate::PipelineError::EmptyPlan) when no
    /// section can be found.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let sections = parsing::parse_sections(&raw)?;
        Ok(Self { sections, raw })
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// What `create` hands back to the caller: the spoken frame of the podcast
/// and the section outlines between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skeleton {
    pub introduction: String,
    /// Section outlines in plan order, as sent to the section writer.
    pub sections: Vec<String>,
    pub closure: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_keeps_raw_text() {
        let raw = "#summary#\nA short take.\n#original statements#\n- one\n- two";
        let summary = Summary::parse(raw);
        assert_eq!(summary.raw, raw);
        assert_eq!(summary.summary, "A short take.");
        assert_eq!(summary.statements, vec!["one", "two"]);
    }

    #[test]
    fn test_outline_message_carries_header() {
        let outline = SectionOutline {
            number: 2,
            title: "T".into(),
            ideas: "I".into(),
            statements: vec![],
            body: "- Title: T\n- Ideas: I".into(),
        };
        assert_eq!(outline.to_message(), "#section 2#\n- Title: T\n- Ideas: I");
    }

    #[test]
    fn test_skeleton_serializes_flat() {
        let skeleton = Skeleton {
            introduction: "hi".into(),
            sections: vec!["s1".into()],
            closure: "bye".into(),
        };
        let value = serde_json::to_value(&skeleton).unwrap();
        assert_eq!(value["introduction"], "hi");
        assert_eq!(value["sections"][0], "s1");
        assert_eq!(value["closure"], "bye");
    }
}
