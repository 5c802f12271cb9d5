//! Turns clipped geometry into new site polygon versions.
//!
//! A run executes inside one transaction. Input ids are processed in chunks
//! of `batch_size`; each chunk is classified and clipped against the live
//! state left by earlier chunks, and every replaced polygon is persisted
//! under its own savepoint so a failing polygon is dropped without touching
//! the rest of the run.

use std::collections::{HashMap, HashSet};

use geo::Centroid;
use geo_types::MultiPolygon;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::classifier::{pair_key, FixablePair, OverlapClassifier, PairKey};
use super::orchestrator::{Clipper, Replacement};
use super::progress::ProgressReporter;
use crate::broadcast::JobEvent;
use crate::error::Result;
use crate::geometry::{area, deg_to_hectares, Feature, FeatureCollection};
use crate::model::{Actor, BatchMeta, ClippedVersionResult, OverlapObservation};
use crate::store::{PolygonRepository, Transactional};

pub const DEFAULT_BATCH_SIZE: usize = 20;

pub struct VersioningWorkflow {
    classifier: OverlapClassifier,
    clipper: Clipper,
    batch_size: usize,
}

impl VersioningWorkflow {
    pub fn new(classifier: OverlapClassifier, clipper: Clipper, batch_size: usize) -> Self {
        Self {
            classifier,
            clipper,
            batch_size: batch_size.max(1),
        }
    }

    pub fn classifier(&self) -> &OverlapClassifier {
        &self.classifier
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Clips the fixable overlaps among `polygon_ids` and persists a new
    /// version for every changed polygon. Commits once; a storage error
    /// anywhere rolls the whole run back.
    pub fn clip_and_version<T: Transactional>(
        &self,
        db: &T,
        polygon_ids: &[Uuid],
        actor: &Actor,
        meta: &BatchMeta,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<ClippedVersionResult>> {
        let ids = dedupe(polygon_ids);
        let span = info_span!(
            "clip_and_version",
            polygons = ids.len(),
            entity = %meta.entity_label
        );
        let _guard = span.enter();

        let results = db.in_transaction(|repo| {
            let mut run = RunState::default();
            let total = ids.len();
            let mut processed = 0;
            for (index, chunk) in ids.chunks(self.batch_size).enumerate() {
                let chunk_span = info_span!("chunk", index, size = chunk.len());
                let _chunk_guard = chunk_span.enter();

                self.process_chunk(repo, chunk, actor, &mut run)?;

                processed += chunk.len();
                progress.report(JobEvent::Progress {
                    processed,
                    total,
                    message: format!("Processed {} of {} polygons", processed, total),
                });
            }
            Ok(run.into_results())
        })?;

        info!(clipped = results.len(), "clip run committed");
        Ok(results)
    }

    fn process_chunk(
        &self,
        repo: &dyn PolygonRepository,
        chunk: &[Uuid],
        actor: &Actor,
        run: &mut RunState,
    ) -> Result<()> {
        let current: Vec<Uuid> = dedupe(&chunk.iter().map(|id| run.resolve(*id)).collect::<Vec<_>>());
        let resolved: Vec<FixablePair> = self
            .classifier
            .classify(repo, &current)?
            .into_iter()
            .map(|pair| FixablePair {
                first: run.resolve(pair.first),
                second: run.resolve(pair.second),
                ..pair
            })
            .collect();
        let pairs: Vec<FixablePair> = resolved
            .into_iter()
            .filter(|pair| run.mark_seen(pair))
            .collect();
        if pairs.is_empty() {
            debug!("no fixable pairs in chunk");
            return Ok(());
        }

        let plan = self.clipper.clip_pairs(repo, &pairs)?;
        for (geometry_id, replacement) in plan.iter() {
            let mut persisted = None;
            let outcome = repo.within_savepoint(&mut || {
                persisted = persist(repo, geometry_id, replacement, actor, run)?;
                Ok(())
            });
            match outcome {
                Ok(()) => {
                    if let Some((new_id, result)) = persisted {
                        run.record(geometry_id, new_id, result);
                    }
                }
                Err(e) => {
                    warn!(polygon = %geometry_id, error = %e, "failed to version clipped polygon");
                }
            }
        }
        Ok(())
    }

    /// Computes the clipped shapes of `polygon_ids` without persisting
    /// anything. Only polygons that would change are returned.
    pub fn preview<T: Transactional>(&self, db: &T, polygon_ids: &[Uuid]) -> Result<FeatureCollection> {
        let ids = dedupe(polygon_ids);
        db.read(|repo| {
            let mut seen = HashSet::new();
            let mut pairs = Vec::new();
            for chunk in ids.chunks(self.batch_size) {
                for pair in self.classifier.classify(repo, chunk)? {
                    if seen.insert(pair.key()) {
                        pairs.push(pair);
                    }
                }
            }
            let plan = self.clipper.clip_pairs(repo, &pairs)?;

            let mut features = Vec::with_capacity(plan.len());
            for (geometry_id, replacement) in plan.iter() {
                let name = repo
                    .active_version_for_geometry(geometry_id)?
                    .map(|version| version.display_name())
                    .unwrap_or_else(|| geometry_id.to_string());
                features.push(Feature::new(geometry_id, name, &replacement.geometry));
            }
            Ok(FeatureCollection::new(features))
        })
    }
}

impl Default for VersioningWorkflow {
    fn default() -> Self {
        Self::new(
            OverlapClassifier::default(),
            Clipper::default(),
            DEFAULT_BATCH_SIZE,
        )
    }
}

/// Bookkeeping that spans the chunks of one run.
#[derive(Default)]
struct RunState {
    /// Pairs already handled, keyed on the first geometry of each lineage.
    seen: HashSet<PairKey>,
    /// Old geometry id to the geometry that replaced it.
    renamed: HashMap<Uuid, Uuid>,
    /// Replacement geometry id to the first geometry of its lineage in this run.
    origin: HashMap<Uuid, Uuid>,
    results: Vec<ClippedVersionResult>,
    result_index: HashMap<Uuid, usize>,
}

impl RunState {
    fn resolve(&self, mut id: Uuid) -> Uuid {
        while let Some(next) = self.renamed.get(&id) {
            id = *next;
        }
        id
    }

    fn origin_of(&self, id: Uuid) -> Uuid {
        self.origin.get(&id).copied().unwrap_or(id)
    }

    /// True the first time a pair is offered in this run.
    fn mark_seen(&mut self, pair: &FixablePair) -> bool {
        let key = pair_key(self.origin_of(pair.first), self.origin_of(pair.second));
        self.seen.insert(key)
    }

    fn record(&mut self, old_id: Uuid, new_id: Uuid, result: ClippedVersionResult) {
        let origin = self.origin_of(old_id);
        self.renamed.insert(old_id, new_id);
        self.origin.insert(new_id, origin);

        match self.result_index.get(&origin) {
            Some(&index) => {
                let merged = &mut self.results[index];
                *merged = ClippedVersionResult::new(
                    result.id,
                    result.poly_name,
                    merged.original_area,
                    result.new_area,
                );
            }
            None => {
                self.result_index.insert(origin, self.results.len());
                self.results.push(result);
            }
        }
    }

    fn into_results(self) -> Vec<ClippedVersionResult> {
        self.results
    }
}

/// Writes one replacement. `Ok(None)` means the polygon was skipped.
fn persist(
    repo: &dyn PolygonRepository,
    geometry_id: Uuid,
    replacement: &Replacement,
    actor: &Actor,
    run: &RunState,
) -> Result<Option<(Uuid, ClippedVersionResult)>> {
    let Some(version) = repo.active_version_for_geometry(geometry_id)? else {
        debug!(polygon = %geometry_id, "no active version, skipping");
        return Ok(None);
    };
    if version.geometry_id != geometry_id {
        debug!(
            polygon = %geometry_id,
            active = %version.geometry_id,
            "lineage already superseded, skipping"
        );
        return Ok(None);
    }

    let latitude = centroid_latitude(&replacement.original);
    let original_area = deg_to_hectares(area(&replacement.original), latitude);
    let new_area = deg_to_hectares(area(&replacement.geometry), latitude);

    let record = repo.insert_geometry(&replacement.geometry)?;
    repo.create_version(&version, record.id, new_area, actor)?;

    let clipped_against: HashSet<Uuid> = replacement
        .clipped_against
        .iter()
        .map(|id| run.resolve(*id))
        .collect();
    reconcile_overlaps(repo, geometry_id, record.id, &clipped_against)?;

    debug!(
        polygon = %geometry_id,
        replacement = %record.id,
        original_area,
        new_area,
        "polygon versioned"
    );
    Ok(Some((
        record.id,
        ClippedVersionResult::new(record.id, version.display_name(), original_area, new_area),
    )))
}

/// Moves the overlap observations of `old_id` onto `new_id`. Overlaps with
/// `resolved` counterparts are dropped on both sides; every other
/// counterpart's observation is re-pointed to the new geometry.
fn reconcile_overlaps(
    repo: &dyn PolygonRepository,
    old_id: Uuid,
    new_id: Uuid,
    resolved: &HashSet<Uuid>,
) -> Result<()> {
    let observations = repo
        .overlap_records(&[old_id])?
        .pop()
        .map(|record| record.observations)
        .unwrap_or_default();
    repo.retire_overlaps(old_id)?;

    let remaining: Vec<OverlapObservation> = observations
        .iter()
        .filter(|o| !resolved.contains(&o.counterpart))
        .cloned()
        .collect();
    repo.save_overlaps(new_id, &remaining)?;

    let counterparts: Vec<Uuid> = dedupe(
        &observations
            .iter()
            .map(|o| o.counterpart)
            .chain(resolved.iter().copied())
            .collect::<Vec<_>>(),
    );
    for record in repo.overlap_records(&counterparts)? {
        if !record.observations.iter().any(|o| o.counterpart == old_id) {
            continue;
        }
        let updated: Vec<OverlapObservation> = if resolved.contains(&record.geometry_id) {
            record
                .observations
                .into_iter()
                .filter(|o| o.counterpart != old_id)
                .collect()
        } else {
            record
                .observations
                .into_iter()
                .map(|o| {
                    if o.counterpart == old_id {
                        OverlapObservation {
                            counterpart: new_id,
                            ..o
                        }
                    } else {
                        o
                    }
                })
                .collect()
        };
        repo.save_overlaps(record.geometry_id, &updated)?;
    }
    Ok(())
}

fn centroid_latitude(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.centroid().map(|c| c.y()).unwrap_or(0.0)
}

fn dedupe(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
