use crate::types::{SectionError, SectionResult};
use ndarray::{Array1, ArrayView2};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Reference point stored in the R-tree together with its position in the input
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    coords: [f64; 2],
    index: usize,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.coords[0] - point[0];
        let dy = self.coords[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Closest reference point to a single query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    pub index: usize,
    pub distance: f64,
}

/// Batch nearest-neighbour result. Queries with no reference point within the
/// cut-off have `None` as index and `f64::INFINITY` as distance.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestNeighbours {
    pub distances: Array1<f64>,
    pub indices: Vec<Option<usize>>,
}

impl NearestNeighbours {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of queries that found a match
    pub fn valid_count(&self) -> usize {
        self.indices.iter().filter(|i| i.is_some()).count()
    }

    /// Per-query matches, in query order
    pub fn iter(&self) -> impl Iterator<Item = Option<Neighbour>> + '_ {
        self.indices
            .iter()
            .zip(self.distances.iter())
            .map(|(&index, &distance)| index.map(|index| Neighbour { index, distance }))
    }
}

/// Nearest-neighbour lookup over a fixed set of 2D reference points
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    /// Build the index from an M×2 array of (x, y). Non-finite rows are skipped
    /// but keep their index slot so results stay aligned with the input.
    pub fn new(reference: ArrayView2<'_, f64>) -> SectionResult<Self> {
        if reference.ncols() != 2 {
            return Err(SectionError::InvalidQuery(format!(
                "reference points must be M×2, got {:?}",
                reference.dim()
            )));
        }

        let points: Vec<IndexedPoint> = reference
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row[0].is_finite() && row[1].is_finite())
            .map(|(index, row)| IndexedPoint {
                coords: [row[0], row[1]],
                index,
            })
            .collect();

        if points.is_empty() {
            return Err(SectionError::EmptyReference);
        }

        let skipped = reference.nrows() - points.len();
        if skipped > 0 {
            log::warn!("Skipped {} non-finite reference points", skipped);
        }

        Ok(Self {
            tree: RTree::bulk_load(points),
        })
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Nearest reference point to (x, y), or `None` if it lies beyond `max_distance`.
    /// Equidistant candidates resolve to the lowest reference index.
    pub fn nearest_one(&self, x: f64, y: f64, max_distance: f64) -> Option<Neighbour> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let query = [x, y];
        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&query);
        let (first, best_d2) = candidates.next()?;

        let index = candidates
            .take_while(|(_, d2)| *d2 <= best_d2)
            .fold(first.index, |lowest, (p, _)| lowest.min(p.index));

        let distance = best_d2.sqrt();
        if distance > max_distance {
            None
        } else {
            Some(Neighbour { index, distance })
        }
    }

    /// Nearest reference point for every row of an N×2 query array.
    /// A miss is recorded per query; it never fails the batch.
    pub fn nearest(
        &self,
        query: ArrayView2<'_, f64>,
        max_distance: f64,
    ) -> SectionResult<NearestNeighbours> {
        if query.ncols() != 2 {
            return Err(SectionError::InvalidQuery(format!(
                "query points must be N×2, got {:?}",
                query.dim()
            )));
        }
        if max_distance.is_nan() || max_distance < 0.0 {
            return Err(SectionError::InvalidQuery(format!(
                "max_distance must be non-negative, got {}",
                max_distance
            )));
        }

        let n = query.nrows();
        let mut distances = Array1::from_elem(n, f64::INFINITY);
        let mut indices = vec![None; n];

        for (i, row) in query.rows().into_iter().enumerate() {
            if let Some(hit) = self.nearest_one(row[0], row[1], max_distance) {
                distances[i] = hit.distance;
                indices[i] = Some(hit.index);
            }
        }

        Ok(NearestNeighbours { distances, indices })
    }
}

/// One-shot nearest-neighbour query of `query` (N×2) against `reference` (M×2)
pub fn nearest_neighbours(
    query: ArrayView2<'_, f64>,
    reference: ArrayView2<'_, f64>,
    max_distance: f64,
) -> SectionResult<NearestNeighbours> {
    SpatialIndex::new(reference)?.nearest(query, max_distance)
}
