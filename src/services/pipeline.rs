//! Coordinator side of a run: the only code that writes the document and
//! the failure registry.

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

use serde::Serialize;

use crate::error::Result;
use crate::model::document::TranslationDocument;
use crate::model::entry::{EntryKey, Failure};
use crate::model::report::{RunCounts, RunOutcome};
use crate::services::ai::CompletionBackend;
use crate::services::ai_types::StrategyStats;
use crate::services::batcher::{self, BatchItem, BatchSettings, FieldOutcome};
use crate::services::glossary::Glossary;
use crate::services::registry::{FailureRegistry, Selection};

#[derive(Debug, Clone, Serialize)]
pub struct PluginResult {
    pub plugin: String,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub counts: RunCounts,
    pub stats: StrategyStats,
    pub failures: Vec<(EntryKey, Failure)>,
    /// Plugins that had entries in this run.
    pub plugins: Vec<PluginResult>,
}

fn items_for(document: &TranslationDocument, keys: &[EntryKey]) -> Vec<BatchItem> {
    keys.iter()
        .filter_map(|k| {
            document.entry(k).map(|e| BatchItem {
                key: k.clone(),
                source: e.source.clone(),
            })
        })
        .collect()
}

fn merge(
    document: &mut TranslationDocument,
    registry: &mut FailureRegistry,
    outcomes: Vec<FieldOutcome>,
    counts: &mut RunCounts,
    failures: &mut Vec<(EntryKey, Failure)>,
) {
    for outcome in outcomes {
        let Some(entry) = document.entry_mut(&outcome.key) else {
            continue;
        };
        match outcome.result {
            Ok(text) => {
                entry.mark_success(text);
                registry.clear(&outcome.key);
                counts.succeeded += 1;
            }
            Err(failure) => {
                entry.mark_failed(failure.clone());
                registry.record(outcome.key.clone(), &failure);
                failures.push((outcome.key, failure));
                counts.failed += 1;
            }
        }
    }
}

fn summarize(
    counts: RunCounts,
    stats: StrategyStats,
    failures: Vec<(EntryKey, Failure)>,
    skipped: &[EntryKey],
    attempted: &[BatchItem],
    cancelled: bool,
) -> RunSummary {
    let plugins: BTreeSet<&str> = attempted.iter().map(|i| i.key.plugin.as_str()).collect();
    let plugins = plugins
        .into_iter()
        .map(|p| PluginResult {
            plugin: p.to_string(),
            complete: !failures.iter().any(|(k, _)| k.plugin == p)
                && !skipped.iter().any(|k| k.plugin == p),
        })
        .collect();

    let outcome = if cancelled {
        RunOutcome::Terminated
    } else if counts.failed > 0 {
        RunOutcome::PartialFailure
    } else {
        RunOutcome::Completed
    };

    RunSummary {
        outcome,
        counts,
        stats,
        failures,
        plugins,
    }
}

/// Full run over every untranslated candidate. Replaces the registry.
pub fn translate(
    document: &mut TranslationDocument,
    registry: &mut FailureRegistry,
    backend: &dyn CompletionBackend,
    glossary: &Glossary,
    settings: &BatchSettings,
    only_tooltips: bool,
    cancel: &AtomicBool,
) -> Result<RunSummary> {
    registry.clear_all();

    let keys: Vec<EntryKey> = document
        .candidates(only_tooltips)
        .into_iter()
        .filter(|k| document.entry(k).is_some_and(|e| !e.is_success()))
        .collect();
    let items = items_for(document, &keys);
    tracing::info!(fields = items.len(), model = backend.model(), "translation run started");

    let mut counts = RunCounts {
        attempted: items.len(),
        ..Default::default()
    };
    let mut failures = Vec::new();

    let (resolved, rest) = batcher::apply_glossary(items.clone(), glossary);
    tracing::debug!(glossary = resolved.len(), "glossary pre-pass");
    merge(document, registry, resolved, &mut counts, &mut failures);

    let run = batcher::run(backend, rest, settings, cancel)?;
    merge(document, registry, run.outcomes, &mut counts, &mut failures);
    counts.skipped = run.skipped.len();

    let summary = summarize(counts, run.stats, failures, &run.skipped, &items, run.cancelled);
    tracing::info!(
        outcome = ?summary.outcome,
        succeeded = summary.counts.succeeded,
        failed = summary.counts.failed,
        skipped = summary.counts.skipped,
        "translation run finished"
    );
    Ok(summary)
}

/// Re-sends the selected registered failures. Successes leave the registry;
/// repeated failures stay with their new cause.
pub fn retry(
    document: &mut TranslationDocument,
    registry: &mut FailureRegistry,
    backend: &dyn CompletionBackend,
    settings: &BatchSettings,
    selection: &Selection,
    cancel: &AtomicBool,
) -> Result<RunSummary> {
    let keys = registry.select(selection);
    for stale in keys.iter().filter(|k| document.entry(k).is_none()) {
        tracing::warn!(key = %stale, "dropping failure for an entry no longer in the document");
        registry.clear(stale);
    }
    let items = items_for(document, &keys);
    tracing::info!(fields = items.len(), "retry started");

    let mut counts = RunCounts {
        attempted: items.len(),
        ..Default::default()
    };
    let mut failures = Vec::new();

    let run = batcher::run(backend, items.clone(), settings, cancel)?;
    merge(document, registry, run.outcomes, &mut counts, &mut failures);
    counts.skipped = run.skipped.len();

    Ok(summarize(counts, run.stats, failures, &run.skipped, &items, run.cancelled))
}
