use crate::io::dataset::InversionData;
use crate::types::{LineId, SectionError, SectionResult};
use ndarray::Array1;
use std::collections::BTreeMap;

/// Selects the samples of a flight line through the dataset's line lookup table
pub struct LineLocator;

impl LineLocator {
    fn table_position(line: LineId, dataset: &InversionData) -> SectionResult<usize> {
        dataset
            .lines()
            .iter()
            .position(|&l| l == line)
            .ok_or(SectionError::LineNotFound(line))
    }

    /// Boolean mask over all samples, true where the sample lies on `line`.
    /// A line listed in the lookup table without samples gives an all-false mask.
    pub fn mask_for_line(line: LineId, dataset: &InversionData) -> SectionResult<Array1<bool>> {
        let position = Self::table_position(line, dataset)?;
        Ok(dataset.line_index().mapv(|i| i == position))
    }

    /// Sample indices on `line`, in acquisition order
    pub fn indices_for_line(line: LineId, dataset: &InversionData) -> SectionResult<Vec<usize>> {
        let position = Self::table_position(line, dataset)?;
        let indices: Vec<usize> = dataset
            .line_index()
            .iter()
            .enumerate()
            .filter(|(_, &i)| i == position)
            .map(|(sample, _)| sample)
            .collect();
        log::debug!("Line {}: {} samples in '{}'", line, indices.len(), dataset.name());
        Ok(indices)
    }

    /// Sample indices of every line in the lookup table
    pub fn partition(dataset: &InversionData) -> BTreeMap<LineId, Vec<usize>> {
        let mut groups: BTreeMap<LineId, Vec<usize>> =
            dataset.lines().iter().map(|&l| (l, Vec::new())).collect();
        for (sample, &position) in dataset.line_index().iter().enumerate() {
            let line = dataset.lines()[position];
            groups.entry(line).or_default().push(sample);
        }
        groups
    }
}
