use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::model::config::{AppConfig, ServiceSettings};
use crate::model::document::TranslationDocument;
use crate::model::node::ParseWarning;
use crate::parsers;
use crate::services::ai::{self, CompletionBackend, HttpBackend, RequestOptions};
use crate::services::batcher::BatchSettings;
use crate::services::glossary::Glossary;
use crate::services::pipeline::{self, RunSummary};
use crate::services::registry::{FailureRegistry, Selection};
use crate::services::{output, prompts, rebuild, report};

#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    pub name: String,
    pub path: PathBuf,
    pub nodes: usize,
    pub fields: usize,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub outputs: Vec<PathBuf>,
    pub loader_files: Vec<PathBuf>,
    pub report: PathBuf,
}

/// Tracks requests between the stdin reader and the coordinator so a
/// `terminate` reaches work that is queued or running, and is dropped once
/// nothing is left.
pub struct RequestGate {
    pending: Mutex<usize>,
    cancel: Arc<AtomicBool>,
}

impl RequestGate {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        RequestGate {
            pending: Mutex::new(0),
            cancel,
        }
    }

    pub fn enqueue(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending += 1;
    }

    /// Returns false when there was nothing to terminate.
    pub fn terminate(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if *pending == 0 {
            return false;
        }
        self.cancel.store(true, Ordering::SeqCst);
        true
    }

    pub fn finish(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.cancel.store(false, Ordering::SeqCst);
        }
    }
}

/// State shared by the commands of one front-end connection. Only the
/// coordinating thread holds it; `cancel` is the one piece other threads see.
pub struct Session {
    config_path: PathBuf,
    pub config: AppConfig,
    pub document: TranslationDocument,
    pub registry: FailureRegistry,
    cancel: Arc<AtomicBool>,
    backend: Option<Arc<dyn CompletionBackend>>,
}

impl Session {
    pub fn open(config_path: &Path) -> Result<Self> {
        let config = AppConfig::load(config_path)?;
        Ok(Session::with_config(config_path, config))
    }

    pub fn with_config(config_path: &Path, config: AppConfig) -> Self {
        Session {
            config_path: config_path.to_path_buf(),
            config,
            document: TranslationDocument::new(),
            registry: FailureRegistry::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            backend: None,
        }
    }

    /// Replaces the HTTP backend, e.g. with an in-memory one.
    pub fn set_backend(&mut self, backend: Arc<dyn CompletionBackend>) {
        self.backend = Some(backend);
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn terminate(&self) {
        tracing::info!("termination requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn save_config(&mut self, config: AppConfig) -> Result<()> {
        config.validate()?;
        config.save(&self.config_path)?;
        self.config = config;
        Ok(())
    }

    pub fn parse_paths(&mut self, paths: &[PathBuf]) -> Result<Vec<PluginSummary>> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let plugin = parsers::parse_plugin(path, &self.config.parser)?;
            let summary = PluginSummary {
                name: plugin.name.clone(),
                path: plugin.path.clone(),
                nodes: plugin.nodes.len(),
                fields: plugin.nodes.iter().map(|n| n.fields().len()).sum(),
                warnings: plugin.warnings.clone(),
            };
            // stale failures would point at entries that no longer exist
            let name = plugin.name.clone();
            for key in self.registry.select(&Selection::All) {
                if key.plugin == name {
                    self.registry.clear(&key);
                }
            }
            self.document.add_plugin(plugin);
            out.push(summary);
        }
        Ok(out)
    }

    fn backend(&self, settings: &ServiceSettings) -> Result<Arc<dyn CompletionBackend>> {
        match &self.backend {
            Some(b) => Ok(Arc::clone(b)),
            None => Ok(Arc::new(HttpBackend::new(settings)?)),
        }
    }

    fn batch_settings(&self, settings: &ServiceSettings) -> BatchSettings {
        BatchSettings {
            batch_size: self.config.batch_size,
            concurrency: self.config.concurrency,
            passes: self.config.rounds,
            request: RequestOptions {
                temperature: settings.temperature,
                top_p: settings.top_p,
                policy: self.config.error_policy.clone(),
            },
            single_user_prompt: prompts::needs_single_user(&settings.model),
        }
    }

    pub fn translate(&mut self) -> Result<RunOutput> {
        if self.document.is_empty() {
            return Err(CoreError::Invalid("no plugin has been parsed".into()));
        }
        self.config.validate()?;
        let settings = self.config.service_settings()?;
        let backend = self.backend(&settings)?;
        let batch = self.batch_settings(&settings);
        let glossary = Glossary::new(&self.config.glossary);

        let summary = pipeline::translate(
            &mut self.document,
            &mut self.registry,
            backend.as_ref(),
            &glossary,
            &batch,
            settings.only_tooltips,
            &self.cancel,
        )?;
        self.finish_run(summary, &settings)
    }

    /// Uses the current configuration, so a fixed key or model takes effect.
    pub fn retry(&mut self, selection: &Selection) -> Result<RunOutput> {
        self.config.validate()?;
        let settings = self.config.service_settings()?;
        let backend = self.backend(&settings)?;
        let batch = self.batch_settings(&settings);

        let summary = pipeline::retry(
            &mut self.document,
            &mut self.registry,
            backend.as_ref(),
            &batch,
            selection,
            &self.cancel,
        )?;
        self.finish_run(summary, &settings)
    }

    fn finish_run(&self, summary: RunSummary, settings: &ServiceSettings) -> Result<RunOutput> {
        let mut outputs = Vec::new();
        let mut loader_files = Vec::new();

        for result in &summary.plugins {
            let Some(section) = self.document.section(&result.plugin) else {
                continue;
            };
            let value = rebuild::render_plugin(section, self.config.fill_missing_tooltips);
            let written = output::write_plugin_output(&self.config.output_dir, &result.plugin, &value)?;

            if section.has_unfinished(settings.only_tooltips) {
                tracing::info!(plugin = %result.plugin, "translation incomplete, loader copy skipped");
            } else {
                match output::locate_loader_dir(&section.plugin.path, self.config.loader_dir.as_deref()) {
                    Some(dir) => loader_files.push(output::install_for_loader(&written, &dir, &result.plugin)?),
                    None => tracing::warn!(
                        plugin = %result.plugin,
                        "no custom_nodes directory above plugin, loader copy skipped"
                    ),
                }
            }
            outputs.push(written);
        }

        let run_report = report::build_report(&summary, &settings.service, &settings.model);
        let report = report::write_report(&run_report, &self.config.output_dir)?;

        Ok(RunOutput {
            summary,
            outputs,
            loader_files,
            report,
        })
    }

    pub fn test_connection(&self) -> Result<String> {
        let settings = self.config.service_settings()?;
        let backend = self.backend(&settings)?;
        ai::test_connection(backend.as_ref(), &settings).map_err(|e| CoreError::Backend(e.to_string()))
    }
}
