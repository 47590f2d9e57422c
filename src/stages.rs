//! The four pipeline stages.
//!
//! Each stage reads what it needs from the workspace when the caller does
//! not supply it, and overwrites only its own artifacts:
//!
//! | stage        | writes                                                    |
//! |--------------|-----------------------------------------------------------|
//! | [`summarize`]| `input_summaries/<name>`                                  |
//! | [`plan`]     | `podcast_plan.txt`, `introduction.txt`, `closure.txt`     |
//! | [`expand`]   | `sections/section<N>.txt`                                 |
//! | [`produce`]  | `introduction.mp3`, `mp3_sections/*`, `closure.mp3`, `podcast.mp3` |

use crate::context::StageContext;
use crate::diagnostics::ReduceDiagnostics;
use crate::error::Result;
use crate::prompt::{self, with_requirements};
use crate::speech::Speaker;
use crate::types::{PodcastPlan, SectionOutline, Skeleton, Summary};
use crate::workspace::{self, file_name, sort_sections, Workspace};
use crate::PipelineError;

/// Result of [`summarize`].
#[derive(Debug, Clone)]
pub struct SummarizeOutcome {
    /// `(document name, summary)` in processing order.
    pub summaries: Vec<(String, Summary)>,
    pub diagnostics: ReduceDiagnostics,
}

/// Result of [`plan`].
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: PodcastPlan,
    pub introduction: String,
    pub closure: String,
}

impl PlanOutcome {
    pub fn skeleton(&self) -> Skeleton {
        Skeleton {
            introduction: self.introduction.clone(),
            sections: self.plan.sections.iter().map(SectionOutline::to_message).collect(),
            closure: self.closure.clone(),
        }
    }
}

/// Result of [`expand`].
#[derive(Debug, Clone)]
pub struct ExpandOutcome {
    /// Expanded section texts, in plan order.
    pub sections: Vec<String>,
    /// Stale sections from an earlier, longer plan that were deleted.
    pub removed: usize,
}

/// Result of [`produce`].
#[derive(Debug, Clone)]
pub struct ProduceOutcome {
    pub podcast_key: String,
    /// Keys of the joined segments, in playback order.
    pub segments: Vec<String>,
    pub bytes: usize,
}

/// Read a workspace text artifact.
async fn read_text(ctx: &StageContext, key: String) -> Result<String> {
    ctx.store.get_text(&key).await
}

/// Summarize input documents.
///
/// `documents` are names under `input_files/`; when `None`, every stored
/// input file is summarized.
pub async fn summarize(
    ctx: &StageContext,
    ws: &Workspace,
    documents: Option<Vec<String>>,
) -> Result<SummarizeOutcome> {
    let documents = match documents {
        Some(docs) => docs,
        None => ctx
            .store
            .list(&ws.dir(workspace::INPUT_FILES))
            .await?
            .iter()
            .map(|key| file_name(key).to_string())
            .collect(),
    };
    if documents.is_empty() {
        return Err(PipelineError::MissingInput);
    }

    let mut outcome = SummarizeOutcome {
        summaries: Vec::with_capacity(documents.len()),
        diagnostics: ReduceDiagnostics::default(),
    };

    for name in documents {
        let bytes = ctx.store.get(&ws.input_file(&name)).await?;
        let text = ctx.extractor.extract(&name, &bytes)?;
        let chunks = ctx.chunker.chunk(&text);
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument(name));
        }

        tracing::info!(workspace = %ws, document = %name, chunks = chunks.len(), "summarizing document");
        let reduced = ctx.reducer.summarize(&chunks).await?;
        tracing::debug!(
            document = %name,
            map_calls = reduced.diagnostics.map_calls,
            reduce_calls = reduced.diagnostics.reduce_calls,
            rounds = reduced.diagnostics.rounds,
            "document summarized"
        );

        let summary = Summary::parse(reduced.text);
        ctx.store.put_text(&ws.summary(&name), &summary.raw).await?;
        outcome.diagnostics.absorb(reduced.diagnostics);
        outcome.summaries.push((name, summary));
    }

    Ok(outcome)
}

/// Generate the skeleton, introduction and closure.
pub async fn plan(
    ctx: &StageContext,
    ws: &Workspace,
    requirements: Option<String>,
    summaries: Option<Vec<String>>,
) -> Result<PlanOutcome> {
    let requirements = match requirements {
        Some(r) => r,
        None => read_text(ctx, ws.key(workspace::REQUIREMENTS)).await?,
    };
    let summaries = match summaries {
        Some(s) => s,
        None => {
            let keys = ctx.store.list(&ws.dir(workspace::INPUT_SUMMARIES)).await?;
            let mut texts = Vec::with_capacity(keys.len());
            for key in keys {
                texts.push(read_text(ctx, key).await?);
            }
            texts
        }
    };
    if summaries.is_empty() {
        return Err(PipelineError::MissingInput);
    }

    tracing::info!(workspace = %ws, summaries = summaries.len(), "planning podcast");
    let raw = ctx
        .completions
        .complete(&with_requirements(prompt::PLANNER, &requirements), &summaries)
        .await?;
    ctx.store.put_text(&ws.key(workspace::PLAN), &raw).await?;
    let plan = PodcastPlan::parse(raw)?;

    let skeleton = [plan.raw.clone()];
    let intro_prompt = with_requirements(prompt::INTRODUCTION, &requirements);
    let closure_prompt = with_requirements(prompt::CLOSURE, &requirements);
    let (introduction, closure) = futures::try_join!(
        ctx.completions.complete(&intro_prompt, &skeleton),
        ctx.completions.complete(&closure_prompt, &skeleton),
    )?;

    ctx.store.put_text(&ws.key(workspace::INTRODUCTION), &introduction).await?;
    ctx.store.put_text(&ws.key(workspace::CLOSURE), &closure).await?;
    tracing::info!(workspace = %ws, sections = plan.len(), "podcast planned");

    Ok(PlanOutcome {
        plan,
        introduction,
        closure,
    })
}

/// Delete numbered blobs under `dir` beyond `keep`.
async fn remove_stale(ctx: &StageContext, dir: String, keep: usize) -> Result<usize> {
    let mut removed = 0;
    for (n, key) in sort_sections(ctx.store.list(&dir).await?) {
        if n > keep && ctx.store.delete(&key).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Write every section of the plan in full.
pub async fn expand(
    ctx: &StageContext,
    ws: &Workspace,
    sections: Option<Vec<SectionOutline>>,
    requirements: Option<String>,
) -> Result<ExpandOutcome> {
    let sections = match sections {
        Some(s) => s,
        None => PodcastPlan::parse(read_text(ctx, ws.key(workspace::PLAN)).await?)?.sections,
    };
    let requirements = match requirements {
        Some(r) => r,
        None => read_text(ctx, ws.key(workspace::REQUIREMENTS)).await?,
    };
    let role_prompt = with_requirements(prompt::SECTION, &requirements);

    let mut written = Vec::with_capacity(sections.len());
    for (i, outline) in sections.iter().enumerate() {
        let n = i + 1;
        tracing::info!(workspace = %ws, section = n, title = %outline.title, "expanding section");
        let text = ctx
            .completions
            .complete(&role_prompt, &[outline.to_message()])
            .await?;
        ctx.store.put_text(&ws.section(n), &text).await?;
        written.push(text);
    }

    let removed = remove_stale(ctx, ws.dir(workspace::SECTIONS), written.len()).await?;
    if removed > 0 {
        tracing::debug!(workspace = %ws, removed, "removed stale sections");
    }

    Ok(ExpandOutcome {
        sections: written,
        removed,
    })
}

/// Synthesize every part and assemble `podcast.mp3`.
///
/// Playback order: introduction, [jingle], sections 1..N, [jingle], closure.
pub async fn produce(
    ctx: &StageContext,
    ws: &Workspace,
    introduction: Option<String>,
    sections: Option<Vec<String>>,
    closure: Option<String>,
) -> Result<ProduceOutcome> {
    let introduction = match introduction {
        Some(t) => t,
        None => read_text(ctx, ws.key(workspace::INTRODUCTION)).await?,
    };
    let sections = match sections {
        Some(s) => s,
        None => {
            let mut texts = Vec::new();
            for (_, key) in sort_sections(ctx.store.list(&ws.dir(workspace::SECTIONS)).await?) {
                texts.push(read_text(ctx, key).await?);
            }
            texts
        }
    };
    if sections.is_empty() {
        return Err(PipelineError::NotFound(ws.section(1)));
    }
    let closure = match closure {
        Some(t) => t,
        None => read_text(ctx, ws.key(workspace::CLOSURE)).await?,
    };

    let jingle = match &ctx.jingle_key {
        Some(key) => match ctx.store.get(key).await {
            Ok(bytes) => Some((key.clone(), bytes)),
            Err(PipelineError::NotFound(_)) => {
                tracing::warn!(key = %key, "jingle not found, producing without it");
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    let mut keys = Vec::with_capacity(sections.len() + 4);
    let mut audio = Vec::with_capacity(sections.len() + 4);

    tracing::info!(workspace = %ws, sections = sections.len(), "synthesizing podcast");
    let intro_key = ws.key(workspace::INTRODUCTION_AUDIO);
    let bytes = ctx.speech.speak(Speaker::Introduction, &introduction).await?;
    ctx.store.put(&intro_key, bytes.clone()).await?;
    keys.push(intro_key);
    audio.push(bytes);

    if let Some((key, bytes)) = &jingle {
        keys.push(key.clone());
        audio.push(bytes.clone());
    }

    for (i, text) in sections.iter().enumerate() {
        let key = ws.section_audio(i + 1);
        let bytes = ctx.speech.speak(Speaker::Section, text).await?;
        ctx.store.put(&key, bytes.clone()).await?;
        keys.push(key);
        audio.push(bytes);
    }

    if let Some((key, bytes)) = jingle {
        keys.push(key);
        audio.push(bytes);
    }

    let closure_key = ws.key(workspace::CLOSURE_AUDIO);
    let bytes = ctx.speech.speak(Speaker::Closure, &closure).await?;
    ctx.store.put(&closure_key, bytes.clone()).await?;
    keys.push(closure_key);
    audio.push(bytes);

    remove_stale(ctx, ws.dir(workspace::AUDIO_SECTIONS), sections.len()).await?;

    let podcast = ctx.joiner.join(&audio)?;
    let podcast_key = ws.key(workspace::PODCAST_AUDIO);
    let size = podcast.len();
    ctx.store.put(&podcast_key, podcast).await?;
    tracing::info!(workspace = %ws, bytes = size, segments = keys.len(), "podcast assembled");

    Ok(ProduceOutcome {
        podcast_key,
        segments: keys,
        bytes: size,
    })
}
