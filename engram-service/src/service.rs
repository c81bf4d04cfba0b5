//! EngramService: owns every subsystem, wires the data flow between
//! them, and exposes one method per boundary operation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use engram_core::activation::ConceptId;
use engram_core::config::{defaults, EngramConfig};
use engram_core::episode::{Episode, EpisodeFilter};
use engram_core::errors::{
    CouplingError, EngramError, EngramResult, ErrorKind, GraphError,
};
use engram_core::job::{Job, JobCounters, JobKind, JobState};
use engram_core::models::{ActivationTrace, ConsolidationReport, ProcessingReport, VaultStats};
use engram_core::params::ReplayParameters;
use engram_core::traits::{ICompletionHook, IEpisodeStore};
use engram_coupling::{CouplingMap, CouplingUpdateRequest};
use engram_graph::store::GraphStore;
use engram_graph::{WeightGraph, WeightSnapshot};
use engram_jobs::{JobController, Scheduler};
use engram_replay::{selection, ReplayContext, ReplayEngine, TraceBuffer};
use engram_spectral::stability::{self, StabilityAnalysis};
use engram_spectral::store::{HistorySample, SpectrumStore};
use engram_spectral::{ModeQuery, ModeSort, SpectralEngine};
use engram_vault::VaultEngine;

use crate::api::*;

/// Queue depth for the worker pool.
const JOB_QUEUE_CAPACITY: usize = 32;
/// Sync waits give a job this long before timing out.
const SYNC_WAIT: StdDuration = StdDuration::from_secs(600);

/// Stored results of finished (or cancelled) jobs.
enum JobArtifacts {
    Consolidation(ConsolidationReport),
    Processing {
        report: ProcessingReport,
        stability: Option<StabilityAnalysis>,
    },
}

/// The substrate behind the boundary surface.
pub struct EngramService {
    config: RwLock<EngramConfig>,
    #[allow(dead_code)]
    data_dir: PathBuf,
    vault: Arc<VaultEngine>,
    graph: Arc<Mutex<WeightGraph>>,
    /// Latest point-in-time snapshot; refreshed when a consolidation
    /// commits, so readers never wait on the writer lock.
    graph_view: Arc<RwLock<WeightSnapshot>>,
    graph_store: Arc<GraphStore>,
    replay: Arc<ReplayEngine>,
    spectral: Arc<RwLock<SpectralEngine>>,
    couplings: Arc<RwLock<CouplingMap>>,
    spectrum_store: Arc<SpectrumStore>,
    jobs: JobController,
    scheduler: Scheduler,
    artifacts: Arc<DashMap<String, JobArtifacts>>,
    /// Traces produced by consolidation, awaiting the learner.
    pending_traces: Arc<Mutex<Vec<ActivationTrace>>>,
}

impl EngramService {
    /// Open the whole substrate under one data directory:
    /// `vault/`, `weights/`, `spectrum/`, and `jobs/`.
    pub fn open(
        data_dir: &Path,
        config: EngramConfig,
        hook: Option<Arc<dyn ICompletionHook>>,
    ) -> EngramResult<Self> {
        let vault = Arc::new(VaultEngine::open(
            &data_dir.join("vault"),
            config.vault.clone(),
        )?);
        let graph_store = Arc::new(GraphStore::open(&data_dir.join("weights"))?);
        let loaded_graph = graph_store.load(defaults::DEFAULT_PRUNE_THRESHOLD)?;
        let graph_view = Arc::new(RwLock::new(loaded_graph.snapshot()));
        let graph = Arc::new(Mutex::new(loaded_graph));

        let spectrum_store = Arc::new(SpectrumStore::open(&data_dir.join("spectrum"))?);
        let mut spectral_engine = SpectralEngine::new(config.learner.clone());
        if let Some(state) = spectrum_store.load_modes()? {
            spectral_engine.restore_state(state);
        }

        let jobs = JobController::open(
            config.scheduler.max_concurrent_jobs.max(1),
            JOB_QUEUE_CAPACITY,
            Some(&data_dir.join("jobs")),
            hook,
        )?;

        let service = Self {
            replay: Arc::new(ReplayEngine::new(config.vault.binary_width)),
            config: RwLock::new(config),
            data_dir: data_dir.to_path_buf(),
            vault,
            graph,
            graph_view,
            graph_store,
            spectral: Arc::new(RwLock::new(spectral_engine)),
            couplings: Arc::new(RwLock::new(CouplingMap::new())),
            spectrum_store,
            jobs,
            scheduler: Scheduler::new(),
            artifacts: Arc::new(DashMap::new()),
            pending_traces: Arc::new(Mutex::new(Vec::new())),
        };
        service.arm_auto_schedule()?;
        info!(dir = %data_dir.display(), "engram service opened");
        Ok(service)
    }

    /// The vault engine (for embedders that need direct read access).
    pub fn vault(&self) -> &VaultEngine {
        &self.vault
    }

    /// Point-in-time read-only view of the weight graph. Reads the cached
    /// snapshot, so a running consolidation never blocks it.
    pub fn graph_snapshot(&self) -> WeightSnapshot {
        self.graph_view.read().clone()
    }

    /// What startup recovery found and did across the stores.
    pub fn recovery_summary(&self) -> engram_core::models::RecoveryReport {
        let mut report = self.vault.recovery_report().clone();
        report.jobs_failed_on_recovery = self.jobs.recovered_failures();
        report
    }

    // --- vault surface ---------------------------------------------------

    pub fn put_episode(&self, episode: Episode) -> PutEpisodeResponse {
        match self.vault.put(episode) {
            Ok(id) => PutEpisodeResponse {
                success: true,
                id: Some(id),
                error: None,
            },
            Err(e) => PutEpisodeResponse {
                success: false,
                id: None,
                error: Some(ApiError::from(&e)),
            },
        }
    }

    pub fn get_episode(&self, id: &str) -> EngramResult<Episode> {
        self.vault
            .get(id)?
            .ok_or_else(|| EngramError::not_found(format!("episode {id}")))
    }

    pub fn list_recent(&self, request: &ListRecentRequest) -> EngramResult<ListRecentResponse> {
        let limit = if request.limit == 0 { 50 } else { request.limit };
        let (episodes, total, has_more) = self.vault.list_recent(&request.filter, limit)?;
        Ok(ListRecentResponse {
            episodes,
            total,
            has_more,
        })
    }

    pub fn get_stats(&self, request: &StatsRequest) -> EngramResult<VaultStats> {
        self.vault.stats(request.since, request.until)
    }

    pub fn purge_ttl(&self, request: &PurgeTtlRequest) -> PurgeTtlResponse {
        match self
            .vault
            .purge_ttl(request.max_age_hours, request.min_ref_count, request.dry_run)
        {
            Ok((purged_count, freed_bytes)) => PurgeTtlResponse {
                success: true,
                purged_count,
                freed_bytes,
                error: None,
            },
            Err(e) => PurgeTtlResponse {
                success: false,
                purged_count: 0,
                freed_bytes: 0,
                error: Some(ApiError::from(&e)),
            },
        }
    }

    // --- scheduler surface -----------------------------------------------

    pub fn start_consolidation(
        &self,
        request: StartConsolidationRequest,
    ) -> EngramResult<StartConsolidationResponse> {
        let (mut params, filter, max_episodes) = {
            let cfg = self.config.read();
            let mut params = request
                .replay_params
                .clone()
                .unwrap_or_else(|| cfg.scheduler.default_replay_params.clone());
            if params.calendars.is_empty() {
                params.calendars = cfg.scheduler.temperature_calendars.clone();
            }
            let mut filter = request
                .filter
                .clone()
                .unwrap_or_else(|| cfg.scheduler.default_filter.clone());
            if filter.min_energy.is_none() && cfg.scheduler.energy_threshold > 0.0 {
                filter.min_energy = Some(cfg.scheduler.energy_threshold);
            }
            let max_episodes = if request.max_episodes == 0 {
                cfg.scheduler.max_episodes_per_job
            } else {
                request.max_episodes
            };
            (params, filter, max_episodes)
        };
        params.validate()?;
        let max_episodes =
            max_episodes.min(engram_core::constants::MAX_EPISODES_PER_BATCH);

        let (candidates, _, _) = self.vault.list_recent(&filter, usize::MAX)?;
        let seed = selection_seed(&candidates, request.description.as_deref());
        let batch =
            selection::select_batch(&candidates, &EpisodeFilter::default(), max_episodes, seed);
        let selected_episodes = batch.len();

        let graph = Arc::clone(&self.graph);
        let graph_view = Arc::clone(&self.graph_view);
        let replay = Arc::clone(&self.replay);
        let graph_store = Arc::clone(&self.graph_store);
        let artifacts = Arc::clone(&self.artifacts);
        let pending_traces = Arc::clone(&self.pending_traces);
        let emit_deltas = request.emit_deltas;
        let job_params = params.clone();

        let job_id = self.jobs.submit(
            JobKind::Consolidation,
            request.description.clone(),
            request.client_id.clone(),
            move |ctx| {
                run_consolidation_job(
                    ctx,
                    batch,
                    job_params,
                    graph,
                    graph_view,
                    replay,
                    graph_store,
                    artifacts,
                    pending_traces,
                    emit_deltas,
                )
            },
        )?;

        let estimated_completion =
            estimate_completion(selected_episodes, params.annealing_steps);
        let status = if request.sync {
            let job = self.jobs.wait(&job_id, SYNC_WAIT)?;
            Some(self.consolidation_status_from(job))
        } else {
            None
        };
        Ok(StartConsolidationResponse {
            job_id,
            accepted: true,
            selected_episodes,
            estimated_completion,
            status,
        })
    }

    pub fn get_consolidation_status(&self, job_id: &str) -> EngramResult<ConsolidationStatus> {
        let job = self.jobs.status(job_id)?;
        Ok(self.consolidation_status_from(job))
    }

    fn consolidation_status_from(&self, job: Job) -> ConsolidationStatus {
        let report = self.artifacts.get(&job.id).and_then(|entry| match entry.value() {
            JobArtifacts::Consolidation(report) => Some(report.clone()),
            _ => None,
        });
        match report {
            Some(report) => ConsolidationStatus {
                episodes_processed: report.episodes_processed,
                episodes_failed: report.episodes_failed,
                episodes_remaining: report.episodes_skipped,
                total_energy_improvement: report.total_energy_improvement,
                edges_pruned: report.edges_pruned,
                sparsity_after: report.sparsity_after,
                deltas: if report.deltas.is_empty() {
                    None
                } else {
                    Some(report.deltas.clone())
                },
                job,
            },
            None => ConsolidationStatus {
                episodes_processed: job.counters.items_processed as usize,
                episodes_failed: job.counters.items_failed as usize,
                episodes_remaining: (job.counters.items_total
                    - job.counters.items_processed.min(job.counters.items_total))
                    as usize,
                total_energy_improvement: 0.0,
                edges_pruned: 0,
                sparsity_after: 0.0,
                deltas: None,
                job,
            },
        }
    }

    pub fn cancel_consolidation(&self, job_id: &str) -> EngramResult<CancelConsolidationResponse> {
        let cancelled = self.jobs.cancel(job_id)?;
        Ok(CancelConsolidationResponse { cancelled })
    }

    pub fn schedule_consolidation(
        &self,
        request: ScheduleConsolidationRequest,
    ) -> EngramResult<ScheduleConsolidationResponse> {
        let payload =
            serde_json::to_string(&request.request).map_err(|e| EngramError::Serialization {
                message: e.to_string(),
            })?;
        let entry = self.scheduler.schedule(
            request.scheduled_time,
            request.recurrence.as_deref(),
            payload,
        )?;
        Ok(ScheduleConsolidationResponse {
            scheduled_job_id: entry.id,
            scheduled_time: entry.run_at,
        })
    }

    /// Drive the schedule: launch (or defer) whatever is due. Embedders
    /// call this from their clock; returns the number launched.
    pub fn tick_scheduler(&self) -> EngramResult<usize> {
        let (adaptive, threshold) = {
            let cfg = self.config.read();
            (
                cfg.scheduler.adaptive_scheduling,
                cfg.scheduler.load_threshold,
            )
        };
        let load = self.jobs.active_count();
        let (due, _decision) = self
            .scheduler
            .collect_due(Utc::now(), load, adaptive, threshold);
        let mut launched = 0usize;
        for entry in due {
            let request: StartConsolidationRequest = serde_json::from_str(&entry.payload)
                .map_err(|e| EngramError::Serialization {
                    message: format!("scheduled request unreadable: {e}"),
                })?;
            self.start_consolidation(request)?;
            launched += 1;
        }
        Ok(launched)
    }

    /// Escalate running jobs past the hard timeout.
    pub fn enforce_job_timeout(&self, max_runtime: StdDuration) -> usize {
        self.jobs.fail_overdue(max_runtime)
    }

    /// Pull trace files external agents dropped in the inbox directory.
    /// Each file holds one JSON `ActivationTrace`; ingested files are
    /// removed. With `auto_processing` a batch job is launched when
    /// anything arrived. Returns the number of traces ingested.
    pub fn ingest_trace_inbox(&self) -> EngramResult<usize> {
        let (inbox, auto_processing) = {
            let cfg = self.config.read();
            (
                cfg.learner.trace_inbox_dir.clone(),
                cfg.learner.auto_processing,
            )
        };
        let Some(inbox) = inbox else { return Ok(0) };
        if !inbox.exists() {
            return Ok(0);
        }
        let mut ingested = 0usize;
        for entry in std::fs::read_dir(&inbox)? {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<ActivationTrace>(&raw) {
                Ok(trace) => {
                    self.pending_traces.lock().push(trace);
                    std::fs::remove_file(&path)?;
                    ingested += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable inbox trace skipped");
                }
            }
        }
        if auto_processing && ingested > 0 {
            self.process_activation_batch(ProcessBatchRequest {
                include_replay_traces: true,
                description: Some("auto inbox processing".to_string()),
                ..Default::default()
            })?;
        }
        Ok(ingested)
    }

    pub fn get_replay_stats(&self, request: &StatsRequest) -> ReplayStatsResponse {
        let mut stats = ReplayStatsResponse::default();
        for job in self.jobs.jobs() {
            if job.kind != JobKind::Consolidation {
                continue;
            }
            if let Some(since) = request.since {
                if job.created_at < since {
                    continue;
                }
            }
            if let Some(until) = request.until {
                if job.created_at > until {
                    continue;
                }
            }
            match job.state {
                JobState::Completed => stats.jobs_completed += 1,
                JobState::Failed => stats.jobs_failed += 1,
                JobState::Cancelled => stats.jobs_cancelled += 1,
                _ => continue,
            }
            if let Some(entry) = self.artifacts.get(&job.id) {
                if let JobArtifacts::Consolidation(report) = entry.value() {
                    stats.episodes_processed += report.episodes_processed;
                    stats.episodes_failed += report.episodes_failed;
                    stats.total_energy_improvement += report.total_energy_improvement;
                    stats.edges_pruned += report.edges_pruned;
                }
            }
        }
        stats
    }

    // --- learner surface -------------------------------------------------

    pub fn process_activation_batch(
        &self,
        request: ProcessBatchRequest,
    ) -> EngramResult<ProcessBatchResponse> {
        let params = {
            let cfg = self.config.read();
            request.parameters.clone().unwrap_or_else(|| {
                let mut params = cfg.learner.default_parameters.clone();
                if cfg.learner.dmd_algorithm == engram_core::params::DmdAlgorithm::Incremental {
                    params.use_incremental = true;
                }
                params
            })
        };
        params.validate()?;

        let mut traces = request.traces;
        if request.include_replay_traces {
            traces.extend(self.pending_traces.lock().drain(..));
        }
        let trace_count = traces.len();
        let snapshot_count: usize = traces.iter().map(|t| t.len()).sum();
        if snapshot_count < 2 {
            return Err(engram_core::errors::SpectralError::NotEnoughSnapshots {
                got: snapshot_count,
                need: 2,
            }
            .into());
        }

        let spectral = Arc::clone(&self.spectral);
        let couplings = Arc::clone(&self.couplings);
        let spectrum_store = Arc::clone(&self.spectrum_store);
        let artifacts = Arc::clone(&self.artifacts);
        let update_couplings = request.update_couplings;
        let generate_stability = request.generate_stability;
        let coupling_request = self.coupling_request_from(&UpdateCouplingsRequest::default());

        let job_id = self.jobs.submit(
            JobKind::DmdProcessing,
            request.description.clone(),
            request.client_id.clone(),
            move |ctx| {
                // Safe point: before the snapshot batch.
                if ctx.is_cancelled() {
                    return Err(EngramError::Cancelled);
                }
                ctx.set_progress(5);
                let report = spectral.write().process(&traces, &params)?;
                ctx.set_counters(JobCounters {
                    items_total: report.snapshots_consumed as u64,
                    items_processed: report.snapshots_consumed as u64,
                    items_failed: 0,
                    items_skipped: 0,
                });
                ctx.set_progress(70);

                spectrum_store.save_modes(&spectral.read().snapshot_state())?;
                spectrum_store.append_history(&HistorySample {
                    timestamp: Utc::now(),
                    prediction_error: report.prediction_error,
                    stability_index: report.stability_index,
                    modes_retained: report.modes_retained,
                })?;

                if update_couplings {
                    let engine = spectral.read();
                    let mut map = couplings.write();
                    match map.update_from_spectrum(engine.modes(), &coupling_request) {
                        Ok(outcome) => {
                            info!(pairs = outcome.proposals.len(), "couplings refreshed")
                        }
                        Err(e)
                            if matches!(
                                e.kind(),
                                ErrorKind::StabilityViolation | ErrorKind::NotFound
                            ) =>
                        {
                            warn!(error = %e, "coupling refresh skipped, keeping previous map")
                        }
                        Err(e) => return Err(e),
                    }
                }

                let stability = if generate_stability {
                    let engine = spectral.read();
                    let map = couplings.read();
                    Some(stability::analyze(engine.modes(), &map.pairs(), true, true))
                } else {
                    None
                };
                ctx.set_progress(100);
                artifacts.insert(ctx.job_id(), JobArtifacts::Processing { report, stability });
                Ok(())
            },
        )?;

        let estimated_completion = estimate_completion(snapshot_count, 1);
        let status = if request.sync {
            let job = self.jobs.wait(&job_id, SYNC_WAIT)?;
            Some(self.processing_status_from(job))
        } else {
            None
        };
        Ok(ProcessBatchResponse {
            job_id,
            accepted: true,
            trace_count,
            estimated_completion,
            status,
        })
    }

    pub fn get_processing_status(&self, job_id: &str) -> EngramResult<ProcessingStatus> {
        let job = self.jobs.status(job_id)?;
        Ok(self.processing_status_from(job))
    }

    fn processing_status_from(&self, job: Job) -> ProcessingStatus {
        let (report, stability) = self
            .artifacts
            .get(&job.id)
            .and_then(|entry| match entry.value() {
                JobArtifacts::Processing { report, stability } => {
                    Some((Some(report.clone()), stability.clone()))
                }
                _ => None,
            })
            .unwrap_or((None, None));
        ProcessingStatus {
            job,
            report,
            stability,
        }
    }

    pub fn get_spectral_modes(
        &self,
        request: &SpectralModesRequest,
    ) -> EngramResult<SpectralModesResponse> {
        let sort_by = match request.sort_by.as_str() {
            "magnitude" => ModeSort::Magnitude,
            "frequency" => ModeSort::Frequency,
            "sparsity" => ModeSort::Sparsity,
            "dominance" | "" => ModeSort::Dominance,
            other => {
                return Err(EngramError::invalid_input(format!(
                    "unknown sort key: {other}"
                )))
            }
        };
        let engine = self.spectral.read();
        let modes = engine.query_modes(&ModeQuery {
            max_modes: request.max_modes,
            sort_by,
            min_eigenvalue_magnitude: request.min_eigenvalue_magnitude,
            exclude_unstable: request.exclude_unstable,
        });
        Ok(SpectralModesResponse {
            total_retained: engine.modes().len(),
            modes,
        })
    }

    fn coupling_request_from(&self, request: &UpdateCouplingsRequest) -> CouplingUpdateRequest {
        let cfg = self.config.read();
        let d = &cfg.learner.default_coupling;
        CouplingUpdateRequest {
            max_pairs: request.max_pairs.unwrap_or(64),
            apply_immediately: request.apply_immediately.unwrap_or(true),
            gain: request.coupling_gain.unwrap_or(d.gain),
            min_eigenvalue_magnitude: request.min_eigenvalue_magnitude.unwrap_or(0.0),
            enforce_stability: request.enforce_stability.unwrap_or(d.enforce_stability),
            max_coupling_strength: request.max_coupling_strength.unwrap_or(d.max_strength),
            stability_epsilon: d.stability_epsilon,
        }
    }

    pub fn update_oscillator_couplings(
        &self,
        request: &UpdateCouplingsRequest,
    ) -> EngramResult<CouplingResponse> {
        let coupling_request = self.coupling_request_from(request);
        let engine = self.spectral.read();
        let mut map = self.couplings.write();
        match map.update_from_spectrum(engine.modes(), &coupling_request) {
            Ok(outcome) => Ok(CouplingResponse {
                success: true,
                applied: outcome.applied,
                couplings: outcome.proposals,
                stability_before: outcome.stability_before,
                stability_after: outcome.stability_after,
                stability_improvement: outcome.stability_improvement,
                error: None,
            }),
            Err(e) => {
                if let EngramError::Coupling(CouplingError::StabilityViolation {
                    reference,
                    proposed,
                    ..
                }) = e
                {
                    // Rejection is a structured answer, not a failure of
                    // the operation itself.
                    Ok(CouplingResponse {
                        success: false,
                        applied: false,
                        couplings: Vec::new(),
                        stability_before: reference,
                        stability_after: proposed,
                        stability_improvement: proposed - reference,
                        error: Some(ApiError::from(&EngramError::Coupling(
                            CouplingError::StabilityViolation {
                                reference,
                                proposed,
                                epsilon: coupling_request.stability_epsilon,
                            },
                        ))),
                    })
                } else {
                    Err(e)
                }
            }
        }
    }

    pub fn predict_activations(
        &self,
        request: &PredictRequest,
    ) -> EngramResult<PredictionResponse> {
        let engine = self.spectral.read();
        let prediction = engine.predict(
            &request.initial_state,
            request.timesteps,
            request.timestep_size_secs,
            request.include_uncertainty,
            request.max_modes,
        )?;
        Ok(PredictionResponse {
            basis: prediction.basis,
            states: prediction.states,
            uncertainty: prediction.uncertainty,
        })
    }

    pub fn get_stability_analysis(
        &self,
        request: &StabilityRequest,
    ) -> EngramResult<StabilityAnalysis> {
        let engine = self.spectral.read();
        let modes: Vec<_> = engine
            .modes()
            .iter()
            .take(request.max_modes)
            .cloned()
            .collect();
        let map = self.couplings.read();
        Ok(stability::analyze(
            &modes,
            &map.pairs(),
            request.include_details,
            request.include_recommendations,
        ))
    }

    pub fn reset_system(&self, request: ResetRequest) -> EngramResult<ResetResponse> {
        let couplings_kept = {
            let mut map = self.couplings.write();
            if request.keep_couplings {
                map.len()
            } else {
                map.clear();
                0
            }
        };
        let modes_kept = {
            let mut engine = self.spectral.write();
            let kept = engine.reset(request.keep_modes, request.initial_modes.clone());
            self.spectrum_store.save_modes(&engine.snapshot_state())?;
            kept
        };
        info!(modes_kept, couplings_kept, "system reset");
        Ok(ResetResponse {
            success: true,
            modes_kept,
            couplings_kept,
        })
    }

    pub fn update_config(&self, learner: KclConfig) -> EngramResult<()> {
        self.spectral.write().set_config(learner.clone());
        self.config.write().learner = learner;
        Ok(())
    }

    pub fn get_kcl_stats(&self) -> EngramResult<KclStats> {
        let engine = self.spectral.read();
        let map = self.couplings.read();
        Ok(KclStats {
            batches_processed: engine.batches_processed(),
            snapshots_seen: engine.snapshots_seen(),
            modes_retained: engine.modes().len(),
            couplings: map.len(),
            stability_index: stability::system_index(engine.modes(), &map.pairs()),
            history_samples: self.spectrum_store.read_history()?.len(),
        })
    }

    /// Persist everything that is cheap to rewrite: the graph base (with
    /// delta compaction), the mode set, and the vault indexes.
    pub fn checkpoint(&self) -> EngramResult<()> {
        if let Some(graph) = self.graph.try_lock() {
            self.graph_store.compact(&graph)?;
        }
        self.spectrum_store
            .save_modes(&self.spectral.read().snapshot_state())?;
        self.vault.flush()?;
        Ok(())
    }

    fn arm_auto_schedule(&self) -> EngramResult<()> {
        let expr = {
            let cfg = self.config.read();
            if !cfg.scheduler.auto_schedule {
                return Ok(());
            }
            match cfg.scheduler.schedule_cron {
                Some(ref expr) => expr.clone(),
                None => return Ok(()),
            }
        };
        let normalised = engram_jobs::normalise_cron(&expr)?;
        let Some(first) = engram_jobs::next_occurrence(&normalised, Utc::now()) else {
            return Ok(());
        };
        let payload = serde_json::to_string(&StartConsolidationRequest::default()).map_err(
            |e| EngramError::Serialization {
                message: e.to_string(),
            },
        )?;
        self.scheduler.schedule(first, Some(&expr), payload)?;
        info!(cron = %expr, "auto consolidation schedule armed");
        Ok(())
    }
}

/// The consolidation job body: lock the graph (retry once, then report
/// the conflict), replay the batch, persist the delta, queue the trace.
#[allow(clippy::too_many_arguments)]
fn run_consolidation_job(
    ctx: &engram_jobs::JobCtx,
    batch: Vec<Episode>,
    params: ReplayParameters,
    graph: Arc<Mutex<WeightGraph>>,
    graph_view: Arc<RwLock<WeightSnapshot>>,
    replay: Arc<ReplayEngine>,
    graph_store: Arc<GraphStore>,
    artifacts: Arc<DashMap<String, JobArtifacts>>,
    pending_traces: Arc<Mutex<Vec<ActivationTrace>>>,
    emit_deltas: bool,
) -> EngramResult<()> {
    let job_id = ctx.job_id();
    if batch.is_empty() {
        artifacts.insert(
            job_id,
            JobArtifacts::Consolidation(ConsolidationReport::default()),
        );
        return Ok(());
    }

    // Single writer: try, retry once, then surface the conflict.
    let mut graph_guard = match graph.try_lock() {
        Some(guard) => guard,
        None => {
            std::thread::sleep(StdDuration::from_millis(100));
            graph
                .try_lock()
                .ok_or(EngramError::Graph(GraphError::WriterBusy))?
        }
    };

    let mut buffer = TraceBuffer::new("replay", 1.0, batch.len());
    let progress_ctx = ctx.clone();
    let replay_ctx = ReplayContext::new(ctx.cancel_token().as_arc())
        .with_progress(move |p| progress_ctx.set_progress(p));
    let mut report = replay.consolidate(
        &batch,
        &params,
        &mut graph_guard,
        &job_id,
        &replay_ctx,
        Some(&mut buffer),
    )?;
    ctx.set_counters(JobCounters {
        items_total: report.episodes_selected as u64,
        items_processed: report.episodes_processed as u64,
        items_failed: report.episodes_failed as u64,
        items_skipped: report.episodes_skipped as u64,
    });

    // Persist the touched edges as this job's delta (absolute values).
    let mut touched: BTreeSet<(ConceptId, ConceptId)> = BTreeSet::new();
    for delta in &report.deltas {
        for &neighbour in delta.weight_changes.keys() {
            let pair = if delta.concept < neighbour {
                (delta.concept, neighbour)
            } else {
                (neighbour, delta.concept)
            };
            touched.insert(pair);
        }
    }
    let assignments: Vec<(ConceptId, ConceptId, f64)> = touched
        .into_iter()
        .map(|(a, b)| (a, b, graph_guard.get(a, b)))
        .collect();
    if !assignments.is_empty() {
        graph_store.append_delta(&job_id, assignments)?;
    }
    *graph_view.write() = graph_guard.snapshot();
    drop(graph_guard);

    if !buffer.is_empty() {
        pending_traces.lock().push(buffer.freeze());
    }
    let cancelled = report.cancelled;
    if !emit_deltas {
        report.deltas.clear();
    }
    artifacts.insert(job_id, JobArtifacts::Consolidation(report));
    if cancelled {
        return Err(EngramError::Cancelled);
    }
    Ok(())
}

/// Deterministic selection seed from the candidate ids (and request
/// description, so distinct requests explore differently).
fn selection_seed(candidates: &[Episode], description: Option<&str>) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for episode in candidates {
        hasher.update(episode.id.as_bytes());
        hasher.update(&[0u8]);
    }
    if let Some(desc) = description {
        hasher.update(desc.as_bytes());
    }
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Coarse completion estimate from the work volume.
fn estimate_completion(items: usize, steps_per_item: usize) -> Option<DateTime<Utc>> {
    let millis = ((items * steps_per_item) / 10).max(50) as i64;
    Some(Utc::now() + Duration::milliseconds(millis))
}
