//! Workspace key layout.
//!
//! All artifacts of one podcast live under `<owner>/<podcast_id>`:
//!
//! ```text
//! requirements.txt
//! input_files/<name>          input_summaries/<name>
//! podcast_plan.txt            introduction.txt        closure.txt
//! sections/section<N>.txt     mp3_sections/section<N>.mp3
//! introduction.mp3            closure.mp3             podcast.mp3
//! ```

use std::fmt;

use crate::error::Result;
use crate::PipelineError;

pub const REQUIREMENTS: &str = "requirements.txt";
pub const INPUT_FILES: &str = "input_files";
pub const INPUT_SUMMARIES: &str = "input_summaries";
pub const PLAN: &str = "podcast_plan.txt";
pub const INTRODUCTION: &str = "introduction.txt";
pub const CLOSURE: &str = "closure.txt";
pub const SECTIONS: &str = "sections";
pub const AUDIO_SECTIONS: &str = "mp3_sections";
pub const INTRODUCTION_AUDIO: &str = "introduction.mp3";
pub const CLOSURE_AUDIO: &str = "closure.mp3";
pub const PODCAST_AUDIO: &str = "podcast.mp3";

/// Namespace holding every artifact of one podcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Workspace {
    owner: String,
    podcast_id: String,
}

impl Workspace {
    /// Both parts must be non-empty single path segments.
    pub fn new(owner: impl Into<String>, podcast_id: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let podcast_id = podcast_id.into();
        for (what, value) in [("owner", &owner), ("podcast id", &podcast_id)] {
            let bad = value.trim().is_empty() || value.contains('/') || value.contains('\\') || value == "." || value == "..";
            if bad {
                return Err(PipelineError::InvalidEvent(format!("invalid {}: '{}'", what, value)));
            }
        }
        Ok(Self { owner, podcast_id })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn podcast_id(&self) -> &str {
        &self.podcast_id
    }

    /// Root key, `<owner>/<podcast_id>`.
    pub fn root(&self) -> String {
        format!("{}/{}", self.owner, self.podcast_id)
    }

    /// Key of `relative` inside this workspace.
    pub fn key(&self, relative: &str) -> String {
        format!("{}/{}/{}", self.owner, self.podcast_id, relative)
    }

    /// Prefix for listing a sub-directory.
    pub fn dir(&self, name: &str) -> String {
        format!("{}/{}/{}/", self.owner, self.podcast_id, name)
    }

    pub fn input_file(&self, name: &str) -> String {
        self.key(&format!("{}/{}", INPUT_FILES, name))
    }

    pub fn summary(&self, name: &str) -> String {
        self.key(&format!("{}/{}", INPUT_SUMMARIES, name))
    }

    /// Expanded text of section `n` (1-based).
    pub fn section(&self, n: usize) -> String {
        self.key(&format!("{}/section{}.txt", SECTIONS, n))
    }

    /// Audio of section `n` (1-based).
    pub fn section_audio(&self, n: usize) -> String {
        self.key(&format!("{}/section{}.mp3", AUDIO_SECTIONS, n))
    }
}

impl fmt::Display for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.podcast_id)
    }
}

/// Last path segment of a key or URL, without query string or fragment.
pub fn file_name(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Section number encoded in a key like `.../section12.txt`.
pub fn section_number(key: &str) -> Option<usize> {
    let name = file_name(key);
    let stem = name.split('.').next()?;
    stem.strip_prefix("section")?.parse().ok()
}

/// Sort section keys by their numeric suffix; keys without one are dropped.
pub fn sort_sections(keys: Vec<String>) -> Vec<(usize, String)> {
    let mut numbered: Vec<(usize, String)> = keys
        .into_iter()
        .filter_map(|k| section_number(&k).map(|n| (n, k)))
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    numbered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let ws = Workspace::new("alice", "pod-1").unwrap();
        assert_eq!(ws.root(), "alice/pod-1");
        assert_eq!(ws.key(PLAN), "alice/pod-1/podcast_plan.txt");
        assert_eq!(ws.input_file("paper.pdf"), "alice/pod-1/input_files/paper.pdf");
        assert_eq!(ws.summary("paper.pdf"), "alice/pod-1/input_summaries/paper.pdf");
        assert_eq!(ws.section(3), "alice/pod-1/sections/section3.txt");
        assert_eq!(ws.section_audio(3), "alice/pod-1/mp3_sections/section3.mp3");
        assert_eq!(ws.dir(SECTIONS), "alice/pod-1/sections/");
        assert_eq!(ws.to_string(), "alice/pod-1");
    }

    #[test]
    fn test_rejects_path_segments() {
        assert!(Workspace::new("", "p").is_err());
        assert!(Workspace::new("a/b", "p").is_err());
        assert!(Workspace::new("a", "..").is_err());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("https://host/docs/paper.pdf?dl=1"), "paper.pdf");
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("plain"), "plain");
    }

    #[test]
    fn test_sections_sort_numerically() {
        let keys = vec![
            "w/sections/section10.txt".to_string(),
            "w/sections/section2.txt".to_string(),
            "w/sections/notes.txt".to_string(),
            "w/sections/section9.txt".to_string(),
        ];
        let sorted: Vec<usize> = sort_sections(keys).into_iter().map(|(n, _)| n).collect();
        assert_eq!(sorted, vec![2, 9, 10]);
    }
}
