//! Role prompts and placeholder rendering.
//!
//! Every completion call pairs one of the role prompts below (sent as the
//! system message) with one or more content messages. Prompts that depend on
//! the listener's requirements carry a `{podcast_requirements}` placeholder
//! filled in by [`render`].

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

/// Placeholder name used by the plan, introduction, closure and section prompts.
pub const REQUIREMENTS_VAR: &str = "podcast_requirements";

/// Marker opening the summary part of a summarizer answer.
pub const SUMMARY_MARKER: &str = "#summary#";
/// Marker opening the notable statements part of a summarizer answer.
pub const STATEMENTS_MARKER: &str = "#original statements#";
/// Prefix of every section header in a podcast plan.
pub const SECTION_MARKER: &str = "#section";

/// Per-chunk summarizer (map step).
pub const SUMMARIZER: &str = r#"You are a text analyst. You will receive a fragment of a text and you should summarize it, and select its more original and remarkable statements and present them in a particular format. Example:
```
user: very advanced school, by amusing the poor.
But this is not a solution: it is an aggravation of the difficulty. The proper
aim is to try and reconstruct society on such a basis that poverty will be
impossible. And the altruistic virtues have really prevented the carrying out of
this aim. Just as the worst slave-owners were those who were kind to their
slaves, and so prevented the horror of the system being realised by those who
suffered from it, and understood by those who contemplated it, so, in the
present state of things in England, the people who do most harm are the people
who try to do most good.
assistant: #summary#
The argument criticizes the prevailing approach to addressing poverty, which it considers not only ineffective but also harmful. Instead of temporarily relieving suffering, it suggests that society should be restructured to prevent poverty from existing in the first place. Altruistic virtues are compared to a form of slavery, as these actions, though seemingly kind, prevent the true severity of poverty from being understood and addressed.

#original statements#
- comparison between well-intentioned but potentially harmful philanthropists and kind slave-owners.
- the people who do most harm are the people who try to do most good.
```
It's very important to use #summary# and #original statements# flags as used in the example, and to use a list to separate original statements."#;

/// Coordinator merging several analysts' summaries (reduce step).
pub const SUMMARY_COORDINATOR: &str = "You coordinate a team of text analysts.
Each text analyst has read a section from a text and has extracted a summary and original statements.
Your job is putting all analysts' work together. Extract the combined summary and original statements.
They don't have to convey the same information: the summary has to reflect the general arguments of the text, while original statements must be a selection of concrete, original points.
Summary and original statements must always provide different information; the summary shouldn't be deducible from the original statements.
Your answer should have a #summary# and an #original statements# section.";

/// Podcast planner producing the skeleton.
pub const PLANNER: &str = "You are a podcast planner. You must create the skeleton of a podcast based on different summaries of some arguments, each with some original statements that must be stated in different moments of the podcast.
You should divide it in sections, with the following structure:
```
#section <number>#
- Title: section title
- Ideas: ideas the section must talk about
- Original statements: original statements that should appear in this section, separated by commas
```
The podcast must comply with the following requirements: {podcast_requirements}";

/// Speaker writing the introduction from the skeleton.
pub const INTRODUCTION: &str = "You are a podcast speaker. You should write the introduction of a podcast whose skeleton will be provided by the user.
Keep it really short and interesting. You don't have to include all data, just present the podcast; your colleagues will do the different sections after you.
Keep it short. You should comply with these requirements: {podcast_requirements}";

/// Speaker writing the closure from the skeleton.
pub const CLOSURE: &str = "You are a podcast speaker. You should write the closure of a podcast whose skeleton will be provided by the user.
Keep it short and engaging. You don't have to talk about all topics, as your colleagues have already tackled them.
You should comply with these requirements: {podcast_requirements}";

/// Speaker expanding one section outline into full text.
pub const SECTION: &str = "You are a speaker. You should write a section talking about some ideas and including some statements.
You should comply with these requirements: {podcast_requirements}";

/// Replace `{key}` placeholders in `template` with the matching value.
///
/// Use `{{` to insert a literal `{` and `}}` to insert a literal `}`.
/// Unknown placeholders are left untouched.
///
/// # Example
///
/// ```
/// use podcast_pipeline::prompt::render;
///
/// let result = render("Hello {name}, JSON: {{\"k\": 1}}", &[("name", "Alice")]);
/// assert_eq!(result, r#"Hello Alice, JSON: {"k": 1}"#);
/// ```
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut rendered = template.replace("{{", ESCAPE_SENTINEL);
    rendered = rendered.replace("}}", ESCAPE_SENTINEL_CLOSE);

    for (key, value) in vars {
        let placeholder = format!("{{{}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }

    rendered = rendered.replace(ESCAPE_SENTINEL, "{");
    rendered = rendered.replace(ESCAPE_SENTINEL_CLOSE, "}");
    rendered
}

/// Render a role prompt conditioned on the podcast requirements.
pub fn with_requirements(template: &str, requirements: &str) -> String {
    render(template, &[(REQUIREMENTS_VAR, requirements)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic() {
        let result = render("Hello {name}, process {input}", &[("name", "Alice"), ("input", "data")]);
        assert_eq!(result, "Hello Alice, process data");
    }

    #[test]
    fn test_render_no_placeholders() {
        assert_eq!(render("static prompt", &[("unused", "x")]), "static prompt");
    }

    #[test]
    fn test_render_unknown_placeholder_kept() {
        assert_eq!(render("Hi {who}", &[]), "Hi {who}");
    }

    #[test]
    fn test_render_escaped_braces_no_substitution() {
        let result = render("Output format: {{\"result\": {{\"value\": 42}}}}", &[]);
        assert_eq!(result, r#"Output format: {"result": {"value": 42}}"#);
    }

    #[test]
    fn test_requirement_prompts_are_filled() {
        for template in [PLANNER, INTRODUCTION, CLOSURE, SECTION] {
            let rendered = with_requirements(template, "keep it under 5 minutes");
            assert!(rendered.ends_with("keep it under 5 minutes"));
            assert!(!rendered.contains("{podcast_requirements}"));
        }
    }

    #[test]
    fn test_summarizer_prompts_name_markers() {
        for template in [SUMMARIZER, SUMMARY_COORDINATOR] {
            assert!(template.contains(SUMMARY_MARKER));
            assert!(template.contains(STATEMENTS_MARKER));
        }
        assert!(PLANNER.contains("#section <number>#"));
    }
}
