//! Pairwise clipping of fixable overlaps.
//!
//! Pairs are visited in the order given. The current shape of a polygon is
//! its replacement from an earlier pair of the same plan, else its stored
//! geometry, so chained overlaps depend on pair order.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};

use geo_types::MultiPolygon;
use tracing::{debug, warn};
use uuid::Uuid;

use super::classifier::{FixablePair, OverlapClassifier, PairKey};
use crate::error::Result;
use crate::geometry::{area, buffer, difference, intersects, validate_and_repair};
use crate::store::{CriteriaStore, GeometryStore};

/// New shape of a polygon that was clipped one or more times.
#[derive(Debug, Clone)]
pub struct Replacement {
    /// Shape before this plan touched it, after validity repair.
    pub original: MultiPolygon<f64>,
    pub geometry: MultiPolygon<f64>,
    /// Counterparts subtracted from this polygon, in clip order.
    pub clipped_against: Vec<Uuid>,
}

/// Result of clipping a set of pairs. Only changed polygons appear.
#[derive(Debug, Clone, Default)]
pub struct ClipPlan {
    replacements: HashMap<Uuid, Replacement>,
    order: Vec<Uuid>,
    processed: Vec<PairKey>,
}

impl ClipPlan {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn get(&self, id: Uuid) -> Option<&Replacement> {
        self.replacements.get(&id)
    }

    /// Replacements in the order polygons were first clipped.
    pub fn iter(&self) -> impl Iterator<Item = (Uuid, &Replacement)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.replacements.get(id).map(|r| (*id, r)))
    }

    /// Pairs that produced a clip.
    pub fn processed_pairs(&self) -> &[PairKey] {
        &self.processed
    }

    /// The replacement map: polygon id to new geometry.
    pub fn geometries(&self) -> HashMap<Uuid, MultiPolygon<f64>> {
        self.replacements
            .iter()
            .map(|(id, r)| (*id, r.geometry.clone()))
            .collect()
    }

    fn current(&self, id: Uuid) -> Option<&MultiPolygon<f64>> {
        self.replacements.get(&id).map(|r| &r.geometry)
    }

    fn record(&mut self, step: ClipStep, key: PairKey) {
        match self.replacements.get_mut(&step.target) {
            Some(existing) => {
                existing.geometry = step.geometry;
                if !existing.clipped_against.contains(&step.against) {
                    existing.clipped_against.push(step.against);
                }
            }
            None => {
                self.order.push(step.target);
                self.replacements.insert(
                    step.target,
                    Replacement {
                        original: step.before,
                        geometry: step.geometry,
                        clipped_against: vec![step.against],
                    },
                );
            }
        }
        self.processed.push(key);
    }
}

struct ClipStep {
    target: Uuid,
    against: Uuid,
    /// Repaired shape of `target` the difference was taken from.
    before: MultiPolygon<f64>,
    geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairSkip {
    MissingGeometry,
    Unrepairable,
    Disjoint,
    BufferFailed,
    EmptyDifference,
    AreaGrew,
}

impl PairSkip {
    fn as_str(&self) -> &'static str {
        match self {
            PairSkip::MissingGeometry => "geometry not found",
            PairSkip::Unrepairable => "geometry invalid and unrepairable",
            PairSkip::Disjoint => "polygons no longer intersect",
            PairSkip::BufferFailed => "buffering the smaller polygon failed",
            PairSkip::EmptyDifference => "difference is empty or invalid",
            PairSkip::AreaGrew => "clipped area exceeds original",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Clipper {
    buffer_epsilon: f64,
}

impl Clipper {
    /// `buffer_epsilon` is in coordinate units (degrees).
    pub fn new(buffer_epsilon: f64) -> Self {
        Self { buffer_epsilon }
    }

    /// Classifies `polygon_ids` and clips every fixable pair.
    pub fn clip<S: GeometryStore + CriteriaStore + ?Sized>(
        &self,
        classifier: &OverlapClassifier,
        store: &S,
        polygon_ids: &[Uuid],
    ) -> Result<ClipPlan> {
        let pairs = classifier.classify(store, polygon_ids)?;
        self.clip_pairs(store, &pairs)
    }

    /// Clips `pairs` in order. Per-pair failures are logged and skipped.
    pub fn clip_pairs<S: GeometryStore + ?Sized>(
        &self,
        store: &S,
        pairs: &[FixablePair],
    ) -> Result<ClipPlan> {
        let mut ids = Vec::new();
        let mut listed = HashSet::new();
        for pair in pairs {
            for id in [pair.first, pair.second] {
                if listed.insert(id) {
                    ids.push(id);
                }
            }
        }
        let stored: HashMap<Uuid, MultiPolygon<f64>> = store
            .fetch_geometries(&ids)?
            .into_iter()
            .map(|record| (record.id, record.geometry))
            .collect();

        let mut plan = ClipPlan::default();
        for pair in pairs {
            let attempt = catch_unwind(AssertUnwindSafe(|| self.clip_pair(&stored, &plan, pair)));
            match attempt {
                Ok(Ok(step)) => {
                    debug!(clipped = %step.target, against = %step.against, "pair clipped");
                    plan.record(step, pair.key());
                }
                Ok(Err(skip)) => {
                    debug!(
                        first = %pair.first,
                        second = %pair.second,
                        reason = skip.as_str(),
                        "pair skipped"
                    );
                }
                Err(_) => {
                    warn!(
                        first = %pair.first,
                        second = %pair.second,
                        "geometry kernel panicked, pair skipped"
                    );
                }
            }
        }
        Ok(plan)
    }

    fn clip_pair(
        &self,
        stored: &HashMap<Uuid, MultiPolygon<f64>>,
        plan: &ClipPlan,
        pair: &FixablePair,
    ) -> std::result::Result<ClipStep, PairSkip> {
        let current = |id: Uuid| {
            plan.current(id)
                .or_else(|| stored.get(&id))
                .ok_or(PairSkip::MissingGeometry)
        };
        let first = validate_and_repair(current(pair.first)?).ok_or(PairSkip::Unrepairable)?;
        let second = validate_and_repair(current(pair.second)?).ok_or(PairSkip::Unrepairable)?;

        if !intersects(&first, &second) {
            return Err(PairSkip::Disjoint);
        }

        // Equal areas: the lower id is clipped.
        let first_is_larger = match area(&first).partial_cmp(&area(&second)) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Less) => false,
            _ => pair.first < pair.second,
        };
        let (target, larger, against, smaller) = if first_is_larger {
            (pair.first, first, pair.second, second)
        } else {
            (pair.second, second, pair.first, first)
        };

        let grown = buffer(&smaller, self.buffer_epsilon).ok_or(PairSkip::BufferFailed)?;
        let geometry = difference(&larger, &grown).ok_or(PairSkip::EmptyDifference)?;
        if area(&geometry) > area(&larger) {
            return Err(PairSkip::AreaGrew);
        }

        Ok(ClipStep {
            target,
            against,
            before: larger,
            geometry,
        })
    }
}

impl Default for Clipper {
    fn default() -> Self {
        Self::new(1e-6)
    }
}
