//! Groups pending entries into node batches and sends them over a bounded
//! worker pool. Workers only return outcomes; merging happens in the caller.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::model::entry::{EntryKey, Failure, FailureCause};
use crate::model::node::Section;
use crate::services::ai::{self, CompletionBackend, RequestOptions};
use crate::services::ai_types::StrategyStats;
use crate::services::glossary::Glossary;
use crate::services::response::extract_json;
use crate::services::validate::check_translation;

const MAX_SPLIT_DEPTH: u32 = 2;

#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Nodes per request.
    pub batch_size: usize,
    pub concurrency: usize,
    pub passes: usize,
    pub request: RequestOptions,
    pub single_user_prompt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub key: EntryKey,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub key: EntryKey,
    pub result: std::result::Result<String, Failure>,
}

impl FieldOutcome {
    fn failed(key: EntryKey, cause: FailureCause, message: impl Into<String>) -> Self {
        FieldOutcome {
            key,
            result: Err(Failure::new(cause, message)),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(&self.result, Err(f) if f.cause == FailureCause::MalformedResponse)
    }
}

/// Fields of one plugin, grouped by node in first-seen order.
#[derive(Debug, Clone)]
pub struct Batch {
    plugin: String,
    nodes: Vec<(String, Vec<BatchItem>)>,
}

impl Batch {
    pub fn keys(&self) -> impl Iterator<Item = &EntryKey> {
        self.nodes
            .iter()
            .flat_map(|(_, items)| items.iter().map(|i| &i.key))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn split(&self) -> (Batch, Batch) {
        let mid = self.nodes.len() / 2;
        let (a, b) = self.nodes.split_at(mid);
        (
            Batch {
                plugin: self.plugin.clone(),
                nodes: a.to_vec(),
            },
            Batch {
                plugin: self.plugin.clone(),
                nodes: b.to_vec(),
            },
        )
    }

    /// Loader-shaped request body holding only the pending fields.
    pub fn payload(&self) -> Value {
        let mut root = Map::new();
        for (node, items) in &self.nodes {
            let mut obj = Map::new();
            for item in items {
                let field = &item.key.field;
                if field.section == Section::Title {
                    obj.insert("title".into(), Value::String(item.source.clone()));
                    continue;
                }
                let section = obj
                    .entry(field.section.as_str())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(map) = section {
                    map.insert(field.name.clone(), Value::String(item.source.clone()));
                }
            }
            root.insert(node.clone(), Value::Object(obj));
        }
        Value::Object(root)
    }
}

pub fn make_batches(items: Vec<BatchItem>, batch_size: usize) -> Vec<Batch> {
    let mut plugins: Vec<(String, Vec<(String, Vec<BatchItem>)>)> = Vec::new();

    for item in items {
        let plugin_pos = match plugins.iter().position(|(p, _)| *p == item.key.plugin) {
            Some(i) => i,
            None => {
                plugins.push((item.key.plugin.clone(), Vec::new()));
                plugins.len() - 1
            }
        };
        let nodes = &mut plugins[plugin_pos].1;
        match nodes.iter_mut().find(|(n, _)| *n == item.key.field.node) {
            Some((_, list)) => list.push(item),
            None => nodes.push((item.key.field.node.clone(), vec![item])),
        }
    }

    let size = batch_size.max(1);
    let mut batches = Vec::new();
    for (plugin, nodes) in plugins {
        for chunk in nodes.chunks(size) {
            batches.push(Batch {
                plugin: plugin.clone(),
                nodes: chunk.to_vec(),
            });
        }
    }
    batches
}

/// Label fields resolved from the glossary without a request, and the rest.
pub fn apply_glossary(items: Vec<BatchItem>, glossary: &Glossary) -> (Vec<FieldOutcome>, Vec<BatchItem>) {
    let mut resolved = Vec::new();
    let mut rest = Vec::new();

    for item in items {
        let hit = if item.key.field.section.is_label() {
            glossary.lookup_label(&item.key.field.name)
        } else {
            None
        };
        match hit {
            Some(hit) => resolved.push(FieldOutcome {
                key: item.key,
                result: Ok(hit.text().to_string()),
            }),
            None => rest.push(item),
        }
    }
    (resolved, rest)
}

fn reply_field<'a>(reply: &'a Value, item: &BatchItem) -> Option<&'a str> {
    let field = &item.key.field;
    let node = reply.get(&field.node)?;
    match field.section {
        Section::Title => node.get("title")?.as_str(),
        section => node.get(section.as_str())?.get(&field.name)?.as_str(),
    }
}

fn assign(batch: &Batch, reply: &Value) -> Vec<FieldOutcome> {
    batch
        .nodes
        .iter()
        .flat_map(|(_, items)| items.iter())
        .map(|item| match reply_field(reply, item) {
            None => FieldOutcome::failed(
                item.key.clone(),
                FailureCause::MalformedResponse,
                "field missing from response",
            ),
            Some(text) => match check_translation(item.key.field.section, &item.source, text) {
                Ok(()) => FieldOutcome {
                    key: item.key.clone(),
                    result: Ok(text.trim().to_string()),
                },
                Err(msg) => {
                    FieldOutcome::failed(item.key.clone(), FailureCause::MalformedResponse, msg)
                }
            },
        })
        .collect()
}

fn fail_all(batch: &Batch, cause: FailureCause, message: &str) -> Vec<FieldOutcome> {
    batch
        .keys()
        .map(|k| FieldOutcome::failed(k.clone(), cause, message))
        .collect()
}

fn run_batch(
    backend: &dyn CompletionBackend,
    batch: &Batch,
    opts: &RequestOptions,
    single_user: &AtomicBool,
    depth: u32,
    stats: &mut StrategyStats,
) -> Vec<FieldOutcome> {
    let payload = batch.payload().to_string();

    let (cause, message) = match ai::request_translation(backend, &payload, opts, single_user, stats) {
        Ok(reply) => match extract_json(&reply.content) {
            Ok(v) => return assign(batch, &v),
            Err(msg) => (FailureCause::MalformedResponse, msg),
        },
        Err(e) => (e.cause(), e.to_string()),
    };

    let splittable = matches!(cause, FailureCause::MalformedResponse | FailureCause::Service);
    if splittable && batch.node_count() > 1 && depth < MAX_SPLIT_DEPTH {
        tracing::info!(plugin = %batch.plugin, nodes = batch.node_count(), depth, "splitting batch");
        stats.split_batch += 1;
        let (a, b) = batch.split();
        let mut out = run_batch(backend, &a, opts, single_user, depth + 1, stats);
        out.extend(run_batch(backend, &b, opts, single_user, depth + 1, stats));
        return out;
    }

    tracing::warn!(plugin = %batch.plugin, cause = cause.as_str(), %message, "batch failed");
    fail_all(batch, cause, &message)
}

#[derive(Debug, Default)]
pub struct BatchRun {
    pub outcomes: Vec<FieldOutcome>,
    /// Entries whose batch was never dispatched.
    pub skipped: Vec<EntryKey>,
    pub stats: StrategyStats,
    pub cancelled: bool,
}

enum BatchResult {
    Done(Vec<FieldOutcome>, StrategyStats),
    Skipped(Vec<EntryKey>),
}

fn dispatch(
    pool: &rayon::ThreadPool,
    backend: &dyn CompletionBackend,
    batches: &[Batch],
    settings: &BatchSettings,
    single_user: &AtomicBool,
    cancel: &AtomicBool,
) -> Vec<BatchResult> {
    let total = batches.len();
    pool.install(|| {
        batches
            .par_iter()
            .enumerate()
            .map(|(i, batch)| {
                if cancel.load(Ordering::Relaxed) {
                    return BatchResult::Skipped(batch.keys().cloned().collect());
                }
                let mut stats = StrategyStats::default();
                let outcomes = run_batch(backend, batch, &settings.request, single_user, 0, &mut stats);
                let ok = outcomes.iter().filter(|o| o.result.is_ok()).count();
                tracing::info!(batch = i + 1, total, ok, fields = outcomes.len(), "batch finished");
                BatchResult::Done(outcomes, stats)
            })
            .collect()
    })
}

/// Runs every item through the backend, re-sending malformed results for up
/// to `settings.passes` passes. Outcomes hold at most one entry per key.
pub fn run(
    backend: &dyn CompletionBackend,
    items: Vec<BatchItem>,
    settings: &BatchSettings,
    cancel: &AtomicBool,
) -> Result<BatchRun> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.concurrency.max(1))
        .build()
        .map_err(|e| CoreError::Invalid(format!("cannot build worker pool: {e}")))?;

    let single_user = AtomicBool::new(settings.single_user_prompt);
    let mut merged: BTreeMap<EntryKey, FieldOutcome> = BTreeMap::new();
    let mut skipped: Vec<EntryKey> = Vec::new();
    let mut stats = StrategyStats::default();
    let mut cancelled = false;

    let sources: BTreeMap<EntryKey, String> =
        items.iter().map(|i| (i.key.clone(), i.source.clone())).collect();
    let mut pending = items;

    for pass in 0..settings.passes.max(1) {
        if pending.is_empty() {
            break;
        }
        let resent: HashSet<EntryKey> = pending.iter().map(|i| i.key.clone()).collect();
        let batches = make_batches(pending, settings.batch_size);
        tracing::info!(pass = pass + 1, batches = batches.len(), fields = resent.len(), "dispatching");

        for result in dispatch(&pool, backend, &batches, settings, &single_user, cancel) {
            match result {
                BatchResult::Done(outcomes, s) => {
                    stats.absorb(&s);
                    for o in outcomes {
                        merged.insert(o.key.clone(), o);
                    }
                }
                BatchResult::Skipped(keys) => {
                    // a key failed in an earlier pass keeps that failure
                    skipped.extend(keys.into_iter().filter(|k| !merged.contains_key(k)));
                    cancelled = true;
                }
            }
        }

        if cancelled || cancel.load(Ordering::Relaxed) {
            cancelled = true;
            break;
        }

        if pass > 0 {
            let fixed = resent
                .iter()
                .filter(|k| merged.get(*k).is_some_and(|o| o.result.is_ok()))
                .count();
            if fixed == 0 {
                tracing::info!(pass = pass + 1, "refinement pass fixed nothing, stopping");
                break;
            }
        }

        pending = merged
            .values()
            .filter(|o| o.is_malformed())
            .filter_map(|o| {
                sources.get(&o.key).map(|s| BatchItem {
                    key: o.key.clone(),
                    source: s.clone(),
                })
            })
            .collect();
    }

    Ok(BatchRun {
        outcomes: merged.into_values().collect(),
        skipped,
        stats,
        cancelled,
    })
}
