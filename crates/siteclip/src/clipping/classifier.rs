//! Selects the overlap pairs that are small enough to clip automatically.
//!
//! Classification works purely on the figures the upstream validator stored
//! with each geometry's "overlapping" criterion; no geometry math happens here.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use crate::config::OverlapThresholds;
use crate::error::Result;
use crate::store::CriteriaStore;

/// Order-independent identity of a polygon pair.
pub type PairKey = (Uuid, Uuid);

pub fn pair_key(a: Uuid, b: Uuid) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Two overlapping geometries whose overlap is within thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct FixablePair {
    pub first: Uuid,
    pub second: Uuid,
    /// Percentage of the smaller polygon covered by the overlap.
    pub percentage: f64,
    pub area_ha: f64,
}

impl FixablePair {
    pub fn key(&self) -> PairKey {
        pair_key(self.first, self.second)
    }
}

#[derive(Debug, Clone)]
pub struct OverlapClassifier {
    thresholds: OverlapThresholds,
}

impl OverlapClassifier {
    pub fn new(thresholds: OverlapThresholds) -> Self {
        Self { thresholds }
    }

    /// Returns the deduplicated fixable pairs touching `polygon_ids`, in
    /// request order and then observation order.
    ///
    /// The first observation of a pair decides it: a symmetric observation
    /// seen later is ignored even if its figures differ.
    pub fn classify<S: CriteriaStore + ?Sized>(
        &self,
        store: &S,
        polygon_ids: &[Uuid],
    ) -> Result<Vec<FixablePair>> {
        let records = store.overlap_records(polygon_ids)?;

        let mut seen: HashSet<PairKey> = HashSet::new();
        let mut pairs = Vec::new();
        for record in records {
            for observation in record.observations {
                if observation.counterpart == record.geometry_id {
                    continue;
                }
                let key = pair_key(record.geometry_id, observation.counterpart);
                if !seen.insert(key) {
                    continue;
                }
                if !self
                    .thresholds
                    .admits(observation.percentage, observation.area_ha)
                {
                    debug!(
                        polygon = %record.geometry_id,
                        counterpart = %observation.counterpart,
                        percentage = observation.percentage,
                        area_ha = observation.area_ha,
                        "overlap exceeds thresholds"
                    );
                    continue;
                }
                pairs.push(FixablePair {
                    first: record.geometry_id,
                    second: observation.counterpart,
                    percentage: observation.percentage,
                    area_ha: observation.area_ha,
                });
            }
        }
        Ok(pairs)
    }
}

impl Default for OverlapClassifier {
    fn default() -> Self {
        Self::new(OverlapThresholds::default())
    }
}

/// The ids from `requested` that belong to at least one pair, in request
/// order without duplicates.
pub fn fixable_ids(requested: &[Uuid], pairs: &[FixablePair]) -> Vec<Uuid> {
    let members: HashSet<Uuid> = pairs.iter().flat_map(|p| [p.first, p.second]).collect();
    let mut emitted = HashSet::new();
    requested
        .iter()
        .copied()
        .filter(|id| members.contains(id) && emitted.insert(*id))
        .collect()
}
