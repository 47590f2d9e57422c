//! Map-reduce summarization.
//!
//! The map step summarizes every chunk independently. The reduce step packs
//! the summaries greedily into groups that fit a token budget and merges each
//! group with one completion call, repeating over a work-list until a single
//! summary remains. An oversized summary forms its own group and goes through
//! the coordinator alone, which condenses it for the next round.

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::chunker::count_tokens;
use crate::client::CompletionClient;
use crate::diagnostics::ReduceDiagnostics;
use crate::error::Result;
use crate::prompt;
use crate::PipelineError;

/// Default token budget for one merge group.
pub const DEFAULT_REDUCE_BUDGET: usize = 2000;
/// Default number of completion calls in flight during map and reduce.
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Consecutive rounds without a shrinking work-list before giving up.
pub const DEFAULT_MAX_STALLED_ROUNDS: usize = 3;

/// Result of a map-reduce run.
#[derive(Debug, Clone)]
pub struct ReduceOutput {
    /// The single combined summary.
    pub text: String,
    /// What it cost to get there.
    pub diagnostics: ReduceDiagnostics,
}

/// Greedily pack items, given their token counts, into contiguous groups
/// whose cumulative count stays within `budget`.
///
/// A new group starts when adding the next item would exceed the budget. An
/// item larger than the budget on its own occupies a singleton group.
///
/// ```
/// use podcast_pipeline::reducer::group_by_budget;
///
/// assert_eq!(group_by_budget(&[5, 5, 5], 10), vec![0..2, 2..3]);
/// assert_eq!(group_by_budget(&[15, 3, 3], 10), vec![0..1, 1..3]);
/// ```
pub fn group_by_budget(token_counts: &[usize], budget: usize) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut current = 0;

    for (idx, &tokens) in token_counts.iter().enumerate() {
        if idx > start && current + tokens > budget {
            groups.push(start..idx);
            start = idx;
            current = 0;
        }
        current += tokens;
    }
    if start < token_counts.len() {
        groups.push(start..token_counts.len());
    }
    groups
}

/// Map-reduce summarizer over a [`CompletionClient`].
///
/// # Example
///
/// ```
/// use podcast_pipeline::backend::{BackoffConfig, MockBackend};
/// use podcast_pipeline::client::CompletionClient;
/// use podcast_pipeline::reducer::RecursiveReducer;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let client = CompletionClient::builder(Arc::new(MockBackend::fixed("#summary# ok")))
///     .backoff(BackoffConfig::none())
///     .build();
/// let reducer = RecursiveReducer::new(Arc::new(client));
/// let out = reducer.summarize(&["one chunk".to_string()]).await.unwrap();
/// assert_eq!(out.text, "#summary# ok");
/// assert_eq!(out.diagnostics.reduce_calls, 0);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveReducer {
    client: Arc<CompletionClient>,
    budget: usize,
    concurrency: usize,
    max_stalled_rounds: usize,
    map_prompt: String,
    reduce_prompt: String,
}

impl RecursiveReducer {
    /// Create a reducer with the default budget, concurrency and prompts.
    pub fn new(client: Arc<CompletionClient>) -> Self {
        Self {
            client,
            budget: DEFAULT_REDUCE_BUDGET,
            concurrency: DEFAULT_CONCURRENCY,
            max_stalled_rounds: DEFAULT_MAX_STALLED_ROUNDS,
            map_prompt: prompt::SUMMARIZER.to_string(),
            reduce_prompt: prompt::SUMMARY_COORDINATOR.to_string(),
        }
    }

    /// Set the token budget for one merge group.
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Set how many completion calls may be in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set how many consecutive rounds may end with as many items as they
    /// started with before [`PipelineError::ReduceStalled`] is returned.
    pub fn with_max_stalled_rounds(mut self, rounds: usize) -> Self {
        self.max_stalled_rounds = rounds.max(1);
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// A completion call that owns its inputs.
    fn call(
        &self,
        role_prompt: &str,
        messages: Vec<String>,
    ) -> impl Future<Output = Result<String>> + Send + 'static {
        let client = Arc::clone(&self.client);
        let role_prompt = role_prompt.to_string();
        async move { client.complete(&role_prompt, &messages).await }
    }

    /// Summarize every chunk, then reduce the summaries to one.
    ///
    /// Fails with [`PipelineError::NothingToReduce`] when `chunks` is empty.
    pub async fn summarize(&self, chunks: &[String]) -> Result<ReduceOutput> {
        if chunks.is_empty() {
            return Err(PipelineError::NothingToReduce);
        }

        let summaries: Vec<String> = stream::iter(chunks.iter().cloned())
            .map(|chunk| self.call(&self.map_prompt, vec![chunk]))
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        tracing::debug!(chunks = chunks.len(), "chunk summaries ready");

        let mut output = self.reduce(summaries).await?;
        output.diagnostics.map_calls = chunks.len();
        Ok(output)
    }

    /// Merge `items` until one remains.
    ///
    /// Every round sends each budget group, singletons included, through the
    /// coordinator. A single item is returned unchanged without any call.
    pub async fn reduce(&self, items: Vec<String>) -> Result<ReduceOutput> {
        if items.is_empty() {
            return Err(PipelineError::NothingToReduce);
        }

        let mut diagnostics = ReduceDiagnostics::default();
        let mut work = items;
        let mut stalled = 0;

        while work.len() > 1 {
            diagnostics.rounds += 1;
            let counts: Vec<usize> = work.iter().map(|s| count_tokens(s)).collect();
            let groups = group_by_budget(&counts, self.budget);
            tracing::debug!(
                round = diagnostics.rounds,
                items = work.len(),
                groups = groups.len(),
                "reduce round"
            );

            let calls = groups.len();
            let members: Vec<Vec<String>> = groups.into_iter().map(|g| work[g].to_vec()).collect();
            let next: Vec<String> = stream::iter(members)
                .map(|group| self.call(&self.reduce_prompt, group))
                .buffered(self.concurrency)
                .try_collect()
                .await?;
            diagnostics.reduce_calls += calls;

            if next.len() < work.len() {
                stalled = 0;
            } else {
                stalled += 1;
                diagnostics.stalled_rounds += 1;
                if stalled >= self.max_stalled_rounds {
                    return Err(PipelineError::ReduceStalled {
                        items: next.len(),
                        rounds: diagnostics.rounds,
                    });
                }
            }
            work = next;
        }

        let text = work.pop().ok_or(PipelineError::NothingToReduce)?;
        Ok(ReduceOutput { text, diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackoffConfig, MockBackend};

    fn reducer_over(mock: Arc<MockBackend>) -> RecursiveReducer {
        let client = CompletionClient::builder(mock)
            .backoff(BackoffConfig::immediate(3))
            .build();
        RecursiveReducer::new(Arc::new(client))
    }

    /// Echoes the user messages joined by `+`.
    fn echo() -> Arc<MockBackend> {
        Arc::new(MockBackend::from_fn(|req| {
            Ok(req.user_messages().collect::<Vec<_>>().join("+"))
        }))
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_group_by_budget_boundaries() {
        assert_eq!(group_by_budget(&[3, 3, 3, 3], 6), vec![0..2, 2..4]);
        assert_eq!(group_by_budget(&[3, 15, 3], 10), vec![0..1, 1..2, 2..3]);
        assert_eq!(group_by_budget(&[10], 10), vec![0..1]);
        assert!(group_by_budget(&[], 10).is_empty());
    }

    #[test]
    fn test_groups_respect_budget_unless_singleton() {
        let counts = [700, 900, 400, 2500, 100, 1999, 1, 1];
        let groups = group_by_budget(&counts, 2000);
        for g in &groups {
            let total: usize = counts[g.clone()].iter().sum();
            assert!(total <= 2000 || g.len() == 1, "group {:?} sums to {}", g, total);
        }
        let covered: Vec<usize> = groups.into_iter().flatten().collect();
        assert_eq!(covered, (0..counts.len()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_empty_input_is_an_error() {
        let reducer = reducer_over(echo());
        assert!(matches!(
            reducer.summarize(&[]).await,
            Err(PipelineError::NothingToReduce)
        ));
        assert!(matches!(
            reducer.reduce(Vec::new()).await,
            Err(PipelineError::NothingToReduce)
        ));
    }

    #[tokio::test]
    async fn test_single_item_is_identity() {
        let mock = echo();
        let reducer = reducer_over(Arc::clone(&mock));
        let out = reducer.reduce(vec!["lone summary".into()]).await.unwrap();
        assert_eq!(out.text, "lone summary");
        assert_eq!(out.diagnostics.reduce_calls, 0);
        assert_eq!(out.diagnostics.rounds, 0);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_single_chunk_costs_one_map_call() {
        let mock = echo();
        let reducer = reducer_over(Arc::clone(&mock));
        let out = reducer.summarize(&["only chunk".into()]).await.unwrap();
        assert_eq!(out.text, "only chunk");
        assert_eq!(out.diagnostics.map_calls, 1);
        assert_eq!(out.diagnostics.reduce_calls, 0);
        assert_eq!(mock.calls_with_prompt("coordinate"), 0);
    }

    #[tokio::test]
    async fn test_small_summaries_merge_in_one_call_in_order() {
        let mock = echo();
        let reducer = reducer_over(Arc::clone(&mock)).with_concurrency(3);
        let chunks: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();

        let out = reducer.summarize(&chunks).await.unwrap();

        assert_eq!(out.text, "a+b+c+d+e");
        assert_eq!(out.diagnostics.map_calls, 5);
        assert_eq!(out.diagnostics.reduce_calls, 1);
        assert_eq!(out.diagnostics.rounds, 1);
        assert_eq!(mock.calls_with_prompt("text analyst. You will receive"), 5);
        assert_eq!(mock.calls_with_prompt("coordinate"), 1);
    }

    /// Coordinator answers with a fixed-size summary; chunk summaries echo.
    fn condensing(reply_tokens: usize) -> Arc<MockBackend> {
        Arc::new(MockBackend::from_fn(move |req| {
            if req.system_prompt().is_some_and(|p| p.contains("coordinate")) {
                Ok(words(reply_tokens))
            } else {
                Ok(req.user_messages().collect::<Vec<_>>().join(" "))
            }
        }))
    }

    fn assert_merges_within_budget(mock: &MockBackend, budget: usize) {
        for req in mock.requests() {
            if !req.system_prompt().is_some_and(|p| p.contains("coordinate")) {
                continue;
            }
            let members: Vec<&str> = req.user_messages().collect();
            let total: usize = members.iter().map(|m| count_tokens(m)).sum();
            assert!(
                members.len() == 1 || total <= budget,
                "merge of {} members carried {} tokens (budget {})",
                members.len(),
                total,
                budget
            );
        }
    }

    #[tokio::test]
    async fn test_oversized_summaries_are_condensed_alone() {
        let mock = condensing(300);
        let reducer = reducer_over(Arc::clone(&mock));
        let items = vec![words(5000), words(5000), "tiny".to_string()];

        let out = reducer.reduce(items).await.unwrap();

        assert_merges_within_budget(&mock, 2000);
        // Round 1: three singleton groups, each condensed. Round 2: one merge.
        assert_eq!(out.diagnostics.rounds, 2);
        assert_eq!(out.diagnostics.reduce_calls, 4);
        assert_eq!(out.diagnostics.stalled_rounds, 1);
        assert_eq!(count_tokens(&out.text), 300);
    }

    #[tokio::test]
    async fn test_large_summaries_never_share_an_over_budget_call() {
        let mock = condensing(400);
        let reducer = reducer_over(Arc::clone(&mock));
        let chunks: Vec<String> = (0..16).map(|_| words(1500)).collect();

        let out = reducer.summarize(&chunks).await.unwrap();

        assert_merges_within_budget(&mock, 2000);
        // 16 singletons condensed to 400 tokens, then 5 + 5 + 5 + 1 -> 4 -> 1.
        assert_eq!(out.diagnostics.rounds, 3);
        assert_eq!(out.diagnostics.reduce_calls, 16 + 4 + 1);
    }

    #[tokio::test]
    async fn test_round_bound_holds_for_equal_sized_inputs() {
        let mock = condensing(900);
        let reducer = reducer_over(Arc::clone(&mock));
        for n in [2usize, 3, 5, 7, 9, 16] {
            let out = reducer.reduce(vec![words(900); n]).await.unwrap();
            let bound = (n as f64).log2().ceil() as usize;
            assert!(out.diagnostics.rounds <= bound, "n={} took {} rounds", n, out.diagnostics.rounds);
            assert_eq!(out.diagnostics.stalled_rounds, 0);
        }
        assert_merges_within_budget(&mock, 2000);
    }

    #[tokio::test]
    async fn test_coordinator_that_never_condenses_stalls() {
        let mock = condensing(3000);
        let reducer = reducer_over(Arc::clone(&mock)).with_max_stalled_rounds(2);

        let err = reducer.reduce(vec![words(3000), words(3000)]).await.unwrap_err();

        assert!(matches!(err, PipelineError::ReduceStalled { items: 2, rounds: 2 }));
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_map_failure_propagates() {
        let mock = Arc::new(MockBackend::fixed("x").failing_first(100));
        let reducer = reducer_over(mock);
        let err = reducer.summarize(&["c".into()]).await.unwrap_err();
        assert!(matches!(err, PipelineError::GenerationFailed { attempts: 4, .. }));
    }
}
