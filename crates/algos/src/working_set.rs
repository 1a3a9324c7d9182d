/// Partition of the inequality indices `0..size` into constraints that are
/// included (treated as equalities) and excluded (ignored).
///
/// Included indices keep their order of inclusion; excluded indices are
/// kept sorted so scans over them visit the lowest index first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingSet {
    included: Vec<usize>,
    excluded: Vec<usize>,
    last_included: Option<usize>,
    last_excluded: Option<usize>,
}

impl WorkingSet {
    /// Every constraint starts excluded.
    pub fn new(size: usize) -> Self {
        Self {
            included: Vec::with_capacity(size),
            excluded: (0..size).collect(),
            last_included: None,
            last_excluded: None,
        }
    }

    pub fn size(&self) -> usize {
        self.included.len() + self.excluded.len()
    }

    pub fn included(&self) -> &[usize] {
        &self.included
    }

    pub fn excluded(&self) -> &[usize] {
        &self.excluded
    }

    pub fn last_included(&self) -> Option<usize> {
        self.last_included
    }

    pub fn last_excluded(&self) -> Option<usize> {
        self.last_excluded
    }

    /// Moves `index` to the included set. Returns false if it was not excluded.
    pub fn include(&mut self, index: usize) -> bool {
        let Ok(position) = self.excluded.binary_search(&index) else {
            return false;
        };
        self.excluded.remove(position);
        self.included.push(index);
        self.last_included = Some(index);
        debug_assert!(self.is_partition());
        true
    }

    /// Moves `index` to the excluded set. Returns false if it was not included.
    pub fn exclude(&mut self, index: usize) -> bool {
        let Some(position) = self.included.iter().position(|&i| i == index) else {
            return false;
        };
        self.included.remove(position);
        let slot = self.excluded.binary_search(&index).unwrap_or_else(|slot| slot);
        self.excluded.insert(slot, index);
        self.last_excluded = Some(index);
        debug_assert!(self.is_partition());
        true
    }

    /// Forgets the most recent include/exclude, e.g. after seeding.
    pub fn clear_history(&mut self) {
        self.last_included = None;
        self.last_excluded = None;
    }

    fn is_partition(&self) -> bool {
        let mut seen = vec![false; self.size()];
        self.included
            .iter()
            .chain(self.excluded.iter())
            .all(|&i| i < seen.len() && !std::mem::replace(&mut seen[i], true))
    }
}
