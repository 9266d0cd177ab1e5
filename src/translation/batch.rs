/*!
 * Batch formation.
 *
 * Groups the ordered text units of a job into request-sized batches with a
 * greedy linear scan. Batches are contiguous slices of the input order, so
 * concatenating them reproduces the input exactly.
 */

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::document::TextUnit;

/// Size limits applied to every batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLimits {
    /// Maximum total source bytes in one batch
    pub max_batch_bytes: usize,
    /// Maximum number of units in one batch
    pub max_batch_units: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_batch_bytes: 8 * 1024,
            max_batch_units: 40,
        }
    }
}

/// A contiguous slice of a job's text units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of the batch in the job's batch order
    pub index: usize,
    /// Indices into the job's unit list
    pub range: Range<usize>,
    /// Total source bytes of the batch
    pub byte_size: usize,
}

impl Batch {
    /// Number of units in the batch
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// The units of this batch
    pub fn units<'a>(&self, units: &'a [TextUnit]) -> &'a [TextUnit] {
        &units[self.range.clone()]
    }
}

/// Greedy chunker for text units
#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
    limits: BatchLimits,
}

impl BatchPlanner {
    pub fn new(limits: BatchLimits) -> Self {
        // Zero limits would never close a batch; treat them as one
        Self {
            limits: BatchLimits {
                max_batch_bytes: limits.max_batch_bytes.max(1),
                max_batch_units: limits.max_batch_units.max(1),
            },
        }
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Partition units into batches.
    ///
    /// A unit is added to the current batch unless that would exceed either
    /// limit, in which case the batch is closed first. A unit larger than
    /// `max_batch_bytes` on its own therefore always ends up alone.
    pub fn plan(&self, units: &[TextUnit]) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut start = 0;
        let mut bytes = 0;

        for (i, unit) in units.iter().enumerate() {
            let size = unit.byte_len();
            let count = i - start;
            let would_overflow =
                count + 1 > self.limits.max_batch_units || bytes + size > self.limits.max_batch_bytes;

            if count > 0 && would_overflow {
                batches.push(Batch {
                    index: batches.len(),
                    range: start..i,
                    byte_size: bytes,
                });
                start = i;
                bytes = 0;
            }
            bytes += size;
        }

        if start < units.len() {
            batches.push(Batch {
                index: batches.len(),
                range: start..units.len(),
                byte_size: bytes,
            });
        }

        batches
    }
}
