//! Backfills missing build coordinates by chaining direct transforms.
//!
//! Work is planned as a small DAG of batched jobs, one per `(level, source, target)`.
//! Jobs on the same level run concurrently; a level starts only after every job of the
//! previous level has finished, and only with the loci that level actually mapped.
//! When a hop leaves a locus unmapped, the locus is replanned around that edge so an
//! equally valid route from another known build still gets a chance.

pub mod plan;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

pub use plan::{DeadEdges, Hop, Locus, SOURCE_PREFERENCE};

use crate::app::ports::{CoordinateTransformPort, TransformRequest};
use crate::domain::{Build, MarkerExtract};
use crate::error::ReconcileError;
use crate::observability::metrics;
use crate::pipeline::processing::catalog::MergeEngine;
use crate::pipeline::storage::Registry;

#[derive(Debug, Clone)]
pub struct HarmonizerSettings {
    /// Upper bound on transform jobs in flight within one level
    pub max_concurrent_jobs: usize,
    /// Per-job deadline
    pub timeout: Duration,
}

impl Default for HarmonizerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HopStatus {
    Completed,
    TimedOut,
    Unavailable,
    /// Every locus was answered from the memo
    Memoized,
    /// No locus reached this hop's source build
    Skipped,
}

/// Outcome of one `(source, target)` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HopStats {
    pub level: usize,
    pub source: Build,
    pub target: Build,
    pub requested: usize,
    pub mapped: usize,
    pub unmapped: usize,
    pub memo_hits: usize,
    pub status: HopStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarmonizeSummary {
    pub hops: Vec<HopStats>,
    pub derived_committed: usize,
}

type MemoKey = (Build, Build, u64);

/// A job's loci before the service answers
struct PendingJob {
    requested: Vec<(String, u64)>,
    memo_answers: BTreeMap<String, Option<u64>>,
}

enum JobResult {
    Mapped(BTreeMap<String, u64>),
    TimedOut,
    Unavailable(ReconcileError),
}

pub struct CoordinateHarmonizer {
    transform: Arc<dyn CoordinateTransformPort>,
    settings: HarmonizerSettings,
    /// `(source, target, position) -> lifted`, `None` when the service left it unmapped
    memo: HashMap<MemoKey, Option<u64>>,
    /// Pairs the service reported unavailable; not requested again for this run
    unavailable: HashSet<(Build, Build)>,
}

impl CoordinateHarmonizer {
    pub fn new(transform: Arc<dyn CoordinateTransformPort>, settings: HarmonizerSettings) -> Self {
        Self {
            transform,
            settings,
            memo: HashMap::new(),
            unavailable: HashSet::new(),
        }
    }

    /// Fill builds that hold no position on any record with a direct position somewhere.
    /// Derived values are committed through `merge`, so direct positions are never
    /// replaced.
    pub async fn harmonize_registry(
        &mut self,
        registry: &mut Registry,
        merge: &MergeEngine,
    ) -> HarmonizeSummary {
        let loci: Vec<Locus> = registry
            .iter()
            .filter_map(|record| {
                let known: BTreeMap<Build, u64> = record
                    .positions
                    .iter()
                    .filter(|(_, p)| p.is_direct())
                    .map(|(b, p)| (*b, p.value))
                    .collect();
                let wanted: BTreeSet<Build> = record.missing_builds().into_iter().collect();
                (!known.is_empty() && !wanted.is_empty()).then(|| Locus {
                    id: record.canonical_id.clone(),
                    known,
                    wanted,
                })
            })
            .collect();

        if loci.is_empty() {
            return HarmonizeSummary::default();
        }
        info!("Harmonizing {} records with missing builds", loci.len());

        let (lifted, hops) = self.run(&loci).await;

        let mut derived_committed = 0;
        for (canonical_id, positions) in &lifted {
            for (build, value) in positions {
                if merge.commit_derived(registry, canonical_id, *build, *value) {
                    derived_committed += 1;
                }
            }
        }
        info!("Committed {} derived positions", derived_committed);

        HarmonizeSummary {
            hops,
            derived_committed,
        }
    }

    /// Lift each extract's observed positions onto the builds it did not report. The
    /// result is index-aligned with `extracts`.
    pub async fn project_extracts(
        &mut self,
        extracts: &[MarkerExtract],
    ) -> (Vec<BTreeMap<Build, u64>>, Vec<HopStats>) {
        let loci: Vec<Locus> = extracts
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.positions.is_empty() && e.positions.len() < Build::ALL.len())
            .map(|(idx, e)| Locus {
                id: idx.to_string(),
                known: e.positions.clone(),
                wanted: Build::ALL
                    .iter()
                    .copied()
                    .filter(|b| !e.positions.contains_key(b))
                    .collect(),
            })
            .collect();

        let mut projected = vec![BTreeMap::new(); extracts.len()];
        if loci.is_empty() {
            return (projected, Vec::new());
        }

        let (lifted, hops) = self.run(&loci).await;
        for (id, positions) in lifted {
            if let Some(slot) = id.parse::<usize>().ok().and_then(|idx| projected.get_mut(idx)) {
                *slot = positions;
            }
        }
        (projected, hops)
    }

    /// Execute the hop plan for `loci`, returning the lifted values for each locus'
    /// wanted builds.
    async fn run(&mut self, loci: &[Locus]) -> (BTreeMap<String, BTreeMap<Build, u64>>, Vec<HopStats>) {
        let mut values: HashMap<&str, BTreeMap<Build, u64>> =
            loci.iter().map(|l| (l.id.as_str(), l.known.clone())).collect();
        let mut dead: DeadEdges = HashMap::new();
        let mut stats = Vec::new();
        let mut remaining: Vec<Locus> = loci.to_vec();

        // Each round either marks a new dead edge or stops, so this terminates
        for round in 1.. {
            let plan = plan::plan_avoiding(&remaining, &dead);
            if plan.is_empty() {
                break;
            }
            let dead_before: usize = dead.values().map(BTreeSet::len).sum();

            for (level, jobs) in &plan {
                let span = info_span!("hop_level", round, level = *level);
                let level_stats = self
                    .run_level(*level, jobs, &mut values, &mut dead)
                    .instrument(span)
                    .await;
                stats.extend(level_stats);
            }

            if dead.values().map(BTreeSet::len).sum::<usize>() == dead_before {
                break;
            }
            remaining = loci
                .iter()
                .filter_map(|locus| {
                    let known = values.get(locus.id.as_str())?;
                    let wanted: BTreeSet<Build> = locus
                        .wanted
                        .iter()
                        .copied()
                        .filter(|b| !known.contains_key(b))
                        .collect();
                    (!wanted.is_empty()).then(|| Locus {
                        id: locus.id.clone(),
                        known: known.clone(),
                        wanted,
                    })
                })
                .collect();
            debug!("Replanning {} loci around unmapped hops", remaining.len());
        }

        let mut lifted = BTreeMap::new();
        for locus in loci {
            let Some(known) = values.get(locus.id.as_str()) else {
                continue;
            };
            let derived: BTreeMap<Build, u64> = known
                .iter()
                .filter(|(b, _)| locus.wanted.contains(b) && !locus.known.contains_key(b))
                .map(|(b, v)| (*b, *v))
                .collect();
            if !derived.is_empty() {
                lifted.insert(locus.id.clone(), derived);
            }
        }
        (lifted, stats)
    }

    async fn run_level(
        &mut self,
        level: usize,
        jobs: &BTreeMap<(Build, Build), Vec<String>>,
        values: &mut HashMap<&str, BTreeMap<Build, u64>>,
        dead: &mut DeadEdges,
    ) -> Vec<HopStats> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_jobs.max(1)));
        let mut set = JoinSet::new();
        let mut pending: BTreeMap<(Build, Build), PendingJob> = BTreeMap::new();

        for ((source, target), ids) in jobs {
            // Only loci whose source coordinate is known by now take part
            let mut memo_answers = BTreeMap::new();
            let mut to_request = Vec::new();
            for id in ids {
                let Some(position) = values.get(id.as_str()).and_then(|v| v.get(source)).copied() else {
                    continue;
                };
                match self.memo.get(&(*source, *target, position)) {
                    Some(answer) => {
                        memo_answers.insert(id.clone(), *answer);
                    }
                    None => to_request.push((id.clone(), position)),
                }
            }

            if !memo_answers.is_empty() {
                metrics::harmonize::memo_hits(memo_answers.len());
            }
            let known_unavailable = self.unavailable.contains(&(*source, *target));
            if known_unavailable && !to_request.is_empty() {
                debug!(
                    "{}->{} unavailable earlier in this run; {} loci left unmapped",
                    source,
                    target,
                    to_request.len()
                );
            }
            if !to_request.is_empty() && !known_unavailable {
                let request = TransformRequest {
                    source: *source,
                    target: *target,
                    loci: to_request.clone(),
                };
                let transform = Arc::clone(&self.transform);
                let semaphore = Arc::clone(&semaphore);
                let timeout = self.settings.timeout;
                set.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let _timing = metrics::harmonize::time_hop(request.source, request.target);
                    let key = (request.source, request.target);
                    let result = match tokio::time::timeout(timeout, transform.transform(request)).await {
                        Ok(Ok(mapped)) => JobResult::Mapped(mapped),
                        Ok(Err(e)) => JobResult::Unavailable(e),
                        Err(_) => JobResult::TimedOut,
                    };
                    (key, result)
                });
            }
            pending.insert(
                (*source, *target),
                PendingJob {
                    requested: to_request,
                    memo_answers,
                },
            );
        }

        // Barrier: every job of this level finishes before any result is applied
        let mut results: BTreeMap<(Build, Build), JobResult> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((key, result)) => {
                    results.insert(key, result);
                }
                Err(e) => warn!("Transform job failed to complete: {}", e),
            }
        }

        let mut stats = Vec::new();
        for ((source, target), job) in pending {
            let PendingJob {
                requested,
                memo_answers,
            } = job;
            let memo_hits = memo_answers.len();
            let attempted: Vec<String> = requested
                .iter()
                .map(|(id, _)| id.clone())
                .chain(memo_answers.keys().cloned())
                .collect();
            let mut mapped = 0;
            let mut unmapped = 0;

            for (id, answer) in memo_answers {
                match answer {
                    Some(value) => {
                        Self::store(values, &id, target, value);
                        mapped += 1;
                    }
                    None => unmapped += 1,
                }
            }

            let status = match results.remove(&(source, target)) {
                None if requested.is_empty() && memo_hits == 0 => HopStatus::Skipped,
                None if requested.is_empty() => HopStatus::Memoized,
                None => {
                    unmapped += requested.len();
                    HopStatus::Unavailable
                }
                Some(JobResult::Mapped(response)) => {
                    for (id, position) in &requested {
                        let lifted = response.get(id).copied();
                        self.memo.insert((source, target, *position), lifted);
                        match lifted {
                            Some(value) => {
                                Self::store(values, id, target, value);
                                mapped += 1;
                            }
                            None => unmapped += 1,
                        }
                    }
                    HopStatus::Completed
                }
                Some(JobResult::TimedOut) => {
                    warn!(
                        "{}",
                        ReconcileError::TransformTimeout {
                            source_build: source,
                            target_build: target,
                            seconds: self.settings.timeout.as_secs(),
                        }
                    );
                    metrics::harmonize::hop_timed_out(source, target);
                    unmapped += requested.len();
                    HopStatus::TimedOut
                }
                Some(JobResult::Unavailable(e)) => {
                    warn!("Leaving {} loci unmapped: {}", requested.len(), e);
                    self.unavailable.insert((source, target));
                    unmapped += requested.len();
                    HopStatus::Unavailable
                }
            };

            for id in attempted {
                let reached = values
                    .get(id.as_str())
                    .is_some_and(|known| known.contains_key(&target));
                if !reached {
                    dead.entry(id).or_default().insert((source, target));
                }
            }

            metrics::harmonize::hop_completed(source, target, requested.len() + memo_hits, mapped);
            debug!(
                "Hop {}->{} (level {}): {} mapped, {} unmapped, {} from memo",
                source, target, level, mapped, unmapped, memo_hits
            );
            stats.push(HopStats {
                level,
                source,
                target,
                requested: requested.len() + memo_hits,
                mapped,
                unmapped,
                memo_hits,
                status,
            });
        }
        stats
    }

    fn store(values: &mut HashMap<&str, BTreeMap<Build, u64>>, id: &str, build: Build, value: u64) {
        if let Some(known) = values.get_mut(id) {
            known.insert(build, value);
        }
    }
}
