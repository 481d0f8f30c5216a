use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::{
    ProtQuantError,
    Result,
};

/// A condition: a label plus the indices of the samples measured under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleGroup {
    pub label: String,
    pub samples: Vec<usize>,
}

/// Partition of the sample indices `0..num_samples` into condition groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleGroups {
    groups: Vec<SampleGroup>,
    num_samples: usize,
}

impl SampleGroups {
    /// Every group must be non-empty and every sample must belong to exactly
    /// one group.
    ///
    /// ```
    /// use protquant::models::{SampleGroup, SampleGroups};
    ///
    /// let groups = SampleGroups::new(vec![
    ///     SampleGroup { label: "ctrl".into(), samples: vec![0, 1] },
    ///     SampleGroup { label: "treated".into(), samples: vec![2, 3] },
    /// ])
    /// .unwrap();
    /// assert_eq!(groups.num_samples(), 4);
    /// assert_eq!(groups.pairs().collect::<Vec<_>>(), vec![(0, 1)]);
    /// ```
    pub fn new(groups: Vec<SampleGroup>) -> Result<Self> {
        if groups.is_empty() {
            return Err(ProtQuantError::config("at least one group is required"));
        }
        let num_samples: usize = groups.iter().map(|g| g.samples.len()).sum();
        let mut seen = vec![false; num_samples];
        for group in groups.iter() {
            if group.samples.is_empty() {
                return Err(ProtQuantError::config(format!(
                    "group '{}' has no samples",
                    group.label
                )));
            }
            for &s in group.samples.iter() {
                match seen.get_mut(s) {
                    None => {
                        return Err(ProtQuantError::config(format!(
                            "sample index {} of group '{}' is out of range for {} samples",
                            s, group.label, num_samples
                        )));
                    }
                    Some(true) => {
                        return Err(ProtQuantError::config(format!(
                            "sample index {} is assigned to more than one group",
                            s
                        )));
                    }
                    Some(x) => *x = true,
                }
            }
        }
        Ok(Self {
            groups,
            num_samples,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SampleGroup> {
        self.groups.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleGroup> {
        self.groups.iter()
    }

    /// All unordered group pairs `(i, j)` with `i < j`, in lexicographic order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = self.groups.len();
        (0..n).flat_map(move |i| ((i + 1)..n).map(move |j| (i, j)))
    }
}
