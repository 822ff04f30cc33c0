use indexmap::IndexMap;

use crate::error::{LmmError, Result};

/// A grouping factor: the categorical variable whose levels define the groups
/// of a random-effects term.
///
/// Levels are stored in order (first appearance when built from labels) and
/// each observation carries a 0-based code into them. External callers hand
/// over 1-based level references through [`GroupingFactor::from_refs`].
#[derive(Debug, Clone, PartialEq)]
pub struct GroupingFactor {
    name: String,
    /// Maps level label -> code (0-based), ordered.
    levels: IndexMap<String, usize>,
    /// The code for each observation.
    codes: Vec<usize>,
}

impl GroupingFactor {
    /// Build a factor from per-observation labels.
    ///
    /// # Examples
    /// ```
    /// use remat_core::data::GroupingFactor;
    ///
    /// let g = GroupingFactor::new("subj", &["A", "B", "A", "C", "B"]);
    /// assert_eq!(g.n_levels(), 3);
    /// assert_eq!(g.codes(), &[0, 1, 0, 2, 1]);
    /// ```
    pub fn new(name: &str, values: &[&str]) -> Self {
        let mut levels = IndexMap::new();
        let mut codes = Vec::with_capacity(values.len());

        for &val in values {
            let next_code = levels.len();
            let code = *levels.entry(val.to_string()).or_insert(next_code);
            codes.push(code);
        }

        GroupingFactor {
            name: name.to_string(),
            levels,
            codes,
        }
    }

    /// Build a factor from an explicit level list and 1-based level references.
    ///
    /// Every reference must lie in `1..=levels.len()`. Levels that no
    /// observation refers to are kept.
    pub fn from_refs(name: &str, levels: Vec<String>, refs: &[usize]) -> Result<Self> {
        let nlevels = levels.len();
        let mut level_map = IndexMap::with_capacity(nlevels);
        for (code, label) in levels.into_iter().enumerate() {
            if level_map.insert(label.clone(), code).is_some() {
                return Err(LmmError::Data(format!(
                    "duplicate level '{}' in grouping factor '{}'",
                    label, name
                )));
            }
        }

        let mut codes = Vec::with_capacity(refs.len());
        for (index, &value) in refs.iter().enumerate() {
            if value == 0 || value > nlevels {
                return Err(LmmError::InvalidLevelRef {
                    index,
                    value,
                    nlevels,
                });
            }
            codes.push(value - 1);
        }

        Ok(GroupingFactor {
            name: name.to_string(),
            levels: level_map,
            codes,
        })
    }

    /// Name of the grouping variable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of distinct levels (used or not).
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns the 0-based level code of each observation.
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Returns the 1-based level references, as handed to external callers.
    pub fn refs(&self) -> Vec<usize> {
        self.codes.iter().map(|&c| c + 1).collect()
    }

    /// Returns a reference to the ordered level map (label -> code).
    pub fn levels(&self) -> &IndexMap<String, usize> {
        &self.levels
    }

    /// Returns the level label for a given code, or `None` if out of range.
    pub fn level_name(&self, code: usize) -> Option<&str> {
        self.levels.get_index(code).map(|(name, _)| name.as_str())
    }

    /// Codes of the levels referenced by at least one observation, ascending.
    pub fn used_codes(&self) -> Vec<usize> {
        let mut seen = vec![false; self.n_levels()];
        for &c in &self.codes {
            seen[c] = true;
        }
        seen.into_iter()
            .enumerate()
            .filter_map(|(code, used)| used.then_some(code))
            .collect()
    }

    /// Levels referenced by at least one observation, in level order.
    pub fn used_levels(&self) -> Vec<&str> {
        self.used_codes()
            .into_iter()
            .filter_map(|code| self.level_name(code))
            .collect()
    }

    /// Returns the number of observations.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns `true` if the factor has no observations.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
