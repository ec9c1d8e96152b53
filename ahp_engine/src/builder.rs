use crate::config::*;
use crate::hierarchy::{Alternative, Element, Hierarchy};

/// A builder for assembling a hierarchy one element at a time.
///
/// Levels are derived from the parents, and the final structure is checked by
/// [Hierarchy::new] when calling `build`.
///
/// ```
/// use ahp_engine::builder::HierarchyBuilder;
/// # use ahp_engine::AhpError;
///
/// let hierarchy = HierarchyBuilder::new()
///     .criterion("cost", "Cost")?
///     .criterion("quality", "Quality")?
///     .sub_criterion("quality", "speed", "Speed")?
///     .sub_criterion("quality", "comfort", "Comfort")?
///     .alternatives(&["car".to_string(), "bike".to_string()])?
///     .build()?;
///
/// assert_eq!(hierarchy.leaf_criteria().len(), 3);
/// assert_eq!(hierarchy.criterion("speed").map(|c| c.level), Some(2));
/// # Ok::<(), AhpError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct HierarchyBuilder {
    _criteria: Vec<Element>,
    _alternatives: Vec<Alternative>,
}

impl HierarchyBuilder {
    pub fn new() -> HierarchyBuilder {
        HierarchyBuilder::default()
    }

    /// Adds a top-level criterion, directly under the goal.
    pub fn criterion(mut self, id: &str, name: &str) -> AhpResult<HierarchyBuilder> {
        self._criteria.push(Element {
            id: id.to_string(),
            name: name.to_string(),
            level: 1,
            parent_id: None,
        });
        Ok(self)
    }

    /// Adds a criterion under a parent that was already added.
    pub fn sub_criterion(mut self, parent: &str, id: &str, name: &str) -> AhpResult<HierarchyBuilder> {
        let level = match self._criteria.iter().find(|c| c.id == parent) {
            Some(p) => p.level + 1,
            None => return UnknownElementSnafu { id: parent }.fail(),
        };
        self._criteria.push(Element {
            id: id.to_string(),
            name: name.to_string(),
            level,
            parent_id: Some(parent.to_string()),
        });
        Ok(self)
    }

    pub fn alternative(mut self, id: &str, name: &str) -> AhpResult<HierarchyBuilder> {
        self._alternatives.push(Alternative {
            id: id.to_string(),
            name: name.to_string(),
        });
        Ok(self)
    }

    /// Adds alternatives named after their ids.
    pub fn alternatives(self, ids: &[String]) -> AhpResult<HierarchyBuilder> {
        ids.iter()
            .try_fold(self, |b, id| b.alternative(id.as_str(), id.as_str()))
    }

    pub fn build(self) -> AhpResult<Hierarchy> {
        Hierarchy::new(self._criteria, self._alternatives)
    }
}
