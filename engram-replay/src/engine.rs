//! ReplayEngine: the annealed wake-sleep consolidation cycle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use engram_core::activation::{ConceptActivation, ConceptId};
use engram_core::constants::ENERGY_WINDOW;
use engram_core::episode::Episode;
use engram_core::errors::{EngramResult, GraphError, ReplayError};
use engram_core::models::{ConceptDelta, ConsolidationReport};
use engram_core::params::ReplayParameters;
use engram_graph::WeightGraph;

use crate::annealing;
use crate::context::ReplayContext;
use crate::energy;
use crate::sampler;
use crate::trace::TraceBuffer;

/// Accumulates one concept's share of the cycle.
#[derive(Default)]
struct DeltaBuilder {
    source_episodes: Vec<String>,
    weight_changes: HashMap<ConceptId, f64>,
    energy_improvement: f64,
    activation: Option<ConceptActivation>,
}

/// The consolidation engine.
///
/// Owns the single-execution guard; the weight graph is mutated in place
/// and stays consistent at every cancellation safe point.
pub struct ReplayEngine {
    /// Width negatives are sampled over.
    binary_width: u32,
    /// Guard: only one consolidation may mutate the graph at a time.
    is_running: Arc<AtomicBool>,
}

impl ReplayEngine {
    pub fn new(binary_width: u32) -> Self {
        Self {
            binary_width,
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Run one consolidation cycle over the batch.
    ///
    /// Safe points: between episodes and between annealing steps. On
    /// cancellation the in-place updates so far are kept, the report is
    /// flagged `cancelled`, and the graph invariants hold.
    pub fn consolidate(
        &self,
        episodes: &[Episode],
        params: &ReplayParameters,
        graph: &mut WeightGraph,
        job_id: &str,
        ctx: &ReplayContext,
        mut trace: Option<&mut TraceBuffer>,
    ) -> EngramResult<ConsolidationReport> {
        params.validate()?;
        if episodes.is_empty() {
            return Err(ReplayError::EmptyBatch.into());
        }
        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(GraphError::WriterBusy.into());
        }
        let result = self.run_cycle(episodes, params, graph, job_id, ctx, trace.as_deref_mut());
        self.is_running.store(false, Ordering::SeqCst);
        result
    }

    fn run_cycle(
        &self,
        episodes: &[Episode],
        params: &ReplayParameters,
        graph: &mut WeightGraph,
        job_id: &str,
        ctx: &ReplayContext,
        mut trace: Option<&mut TraceBuffer>,
    ) -> EngramResult<ConsolidationReport> {
        let mut report = ConsolidationReport {
            episodes_selected: episodes.len(),
            sparsity_before: graph.sparsity(),
            ..Default::default()
        };
        let mut builders: HashMap<ConceptId, DeltaBuilder> = HashMap::new();
        let now = Utc::now();
        let prune_threshold = params.prune_threshold.unwrap_or(graph.prune_threshold());

        'episodes: for (idx, episode) in episodes.iter().enumerate() {
            // Safe point: between episodes.
            if ctx.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let pattern = match episode.activation.canonicalize(self.binary_width) {
                Ok(pattern) => pattern,
                Err(e) => {
                    warn!(episode = %episode.id, error = %e, "episode skipped: bad activation");
                    report.episodes_failed += 1;
                    let failed_fraction = report.episodes_failed as f64 / episodes.len() as f64;
                    if failed_fraction > params.max_failure_fraction {
                        return Err(ReplayError::TooManyFailures {
                            failed: report.episodes_failed,
                            total: episodes.len(),
                            threshold: params.max_failure_fraction,
                        }
                        .into());
                    }
                    continue;
                }
            };

            let mut rng = sampler::rng_for(job_id, &episode.id);
            let age_hours = episode.age_hours(now).max(0) as u64;
            let energy_before = energy::pattern_energy(&pattern, graph);
            let mut previous_energy = energy_before;
            let mut window: VecDeque<f64> = VecDeque::with_capacity(ENERGY_WINDOW);
            let mut eta_scale = 1.0f64;
            let mut episode_changes: HashMap<(ConceptId, ConceptId), f64> = HashMap::new();

            for step in 0..params.annealing_steps {
                // Safe point: between annealing steps.
                if ctx.is_cancelled() {
                    report.cancelled = true;
                    self.finish_episode(
                        episode,
                        &pattern,
                        energy_before,
                        previous_energy,
                        &episode_changes,
                        &mut builders,
                        &mut report,
                        trace.as_deref_mut(),
                    );
                    break 'episodes;
                }

                let temperature = annealing::temperature_at(params, step, age_hours);
                let eta = params.learning_rate
                    * (temperature / params.initial_temperature).clamp(0.0, 1.0)
                    * eta_scale;

                let negatives: Vec<ConceptActivation> = (0..params.negative_samples)
                    .map(|_| sampler::negative_sample(&mut rng, &pattern, self.binary_width))
                    .collect();
                let gradient = energy::wake_sleep_gradient(&pattern, &negatives);

                for ((i, j), g) in gradient {
                    let w = graph.get(i, j);
                    let boost = if params.prioritize_threshold_edges
                        && w != 0.0
                        && w.abs() < 2.0 * prune_threshold
                    {
                        1.5
                    } else {
                        1.0
                    };
                    let update = eta * boost * (g - params.l1_strength * w.signum());
                    if update != 0.0 {
                        graph.add(i, j, update)?;
                        *episode_changes.entry((i, j)).or_insert(0.0) += update;
                    }
                }

                let current_energy = energy::pattern_energy(&pattern, graph);
                let step_improvement = previous_energy - current_energy;
                previous_energy = current_energy;

                if window.len() == ENERGY_WINDOW {
                    window.pop_front();
                }
                window.push_back(step_improvement.abs());
                if window.len() == ENERGY_WINDOW {
                    let mean: f64 = window.iter().sum::<f64>() / window.len() as f64;
                    if mean < params.min_energy_improvement {
                        debug!(episode = %episode.id, step, "early stop: energy plateau");
                        break;
                    }
                    if params.adaptive_rate && mean < 2.0 * params.min_energy_improvement {
                        eta_scale = (eta_scale * 0.5).max(0.125);
                    }
                }
            }

            self.finish_episode(
                episode,
                &pattern,
                energy_before,
                previous_energy,
                &episode_changes,
                &mut builders,
                &mut report,
                trace.as_deref_mut(),
            );
            ctx.report_progress((((idx + 1) * 100) / episodes.len()) as u8);
        }

        report.episodes_skipped =
            report.episodes_selected - report.episodes_processed - report.episodes_failed;
        report.edges_pruned = graph.prune(prune_threshold);
        report.sparsity_after = graph.sparsity();
        report.deltas = builders
            .into_iter()
            .map(|(concept, b)| ConceptDelta {
                concept,
                source_episodes: b.source_episodes,
                weight_changes: b.weight_changes,
                resulting_activation: b.activation.unwrap_or(ConceptActivation::SparseIds {
                    active: vec![concept],
                }),
                energy_improvement: b.energy_improvement,
            })
            .collect();

        info!(
            processed = report.episodes_processed,
            failed = report.episodes_failed,
            cancelled = report.cancelled,
            pruned = report.edges_pruned,
            improvement = report.total_energy_improvement,
            "consolidation cycle done"
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_episode(
        &self,
        episode: &Episode,
        pattern: &ConceptActivation,
        energy_before: f64,
        energy_after: f64,
        episode_changes: &HashMap<(ConceptId, ConceptId), f64>,
        builders: &mut HashMap<ConceptId, DeltaBuilder>,
        report: &mut ConsolidationReport,
        trace: Option<&mut TraceBuffer>,
    ) {
        let improvement = energy_before - energy_after;
        report.episodes_processed += 1;
        report.total_energy_improvement += improvement;

        for (&(i, j), &dw) in episode_changes {
            for (concept, neighbour) in [(i, j), (j, i)] {
                let builder = builders.entry(concept).or_default();
                *builder.weight_changes.entry(neighbour).or_insert(0.0) += dw;
                if builder.source_episodes.last() != Some(&episode.id) {
                    builder.source_episodes.push(episode.id.clone());
                }
            }
        }
        for concept in pattern.active_ids() {
            let builder = builders.entry(concept).or_default();
            builder.energy_improvement += improvement;
            builder.activation = Some(match builder.activation.take() {
                Some(prev) => prev.merge(pattern, 0.5),
                None => pattern.clone(),
            });
        }
        if let Some(trace) = trace {
            trace.record(pattern.clone(), energy_after);
        }
    }
}
