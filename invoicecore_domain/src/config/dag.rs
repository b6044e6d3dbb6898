// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! The stage dependency DAG and its topological sort (§4.2).
//!
//! Generalizes the teacher's two-bucket `validate_stage_ordering`
//! (pre-binary/post-binary) into a full dependency-set DAG solved with
//! Kahn's algorithm, tie-broken by `StageKind`'s canonical enumeration
//! order.

use crate::error::CoreError;
use crate::stage_result::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Dependency set per stage: `dependencies[stage]` must all have executed
/// before `stage` can run. A cycle here is a configuration error (§4.2,
/// §7 `ConfigError`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageDag {
    dependencies: BTreeMap<StageKind, BTreeSet<StageKind>>,
}

impl StageDag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, stage: StageKind) -> &mut Self {
        self.dependencies.entry(stage).or_default();
        self
    }

    pub fn add_dependency(&mut self, stage: StageKind, depends_on: StageKind) -> &mut Self {
        self.dependencies.entry(stage).or_default().insert(depends_on);
        self.dependencies.entry(depends_on).or_default();
        self
    }

    pub fn stages(&self) -> impl Iterator<Item = StageKind> + '_ {
        self.dependencies.keys().copied()
    }

    pub fn dependencies_of(&self, stage: StageKind) -> BTreeSet<StageKind> {
        self.dependencies.get(&stage).cloned().unwrap_or_default()
    }

    /// Kahn's algorithm: repeatedly remove a zero-in-degree vertex, breaking
    /// ties by `StageKind::enumeration_rank`, as mandated by §4.2. An empty
    /// DAG returns an empty order (§8 boundary case: "no-op pipeline returns
    /// raw with confidence 0").
    pub fn topological_sort(&self) -> Result<Vec<StageKind>, CoreError> {
        let mut in_degree: BTreeMap<StageKind, usize> = self
            .dependencies
            .keys()
            .map(|s| (*s, 0usize))
            .collect();
        // edge direction: depends_on -> stage
        let mut dependents: BTreeMap<StageKind, Vec<StageKind>> = BTreeMap::new();
        for (stage, deps) in &self.dependencies {
            *in_degree.entry(*stage).or_insert(0) += deps.len();
            for dep in deps {
                dependents.entry(*dep).or_default().push(*stage);
            }
        }

        let mut ready: VecDeque<StageKind> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(stage, _)| *stage)
            .collect();
        let mut ready_sorted: Vec<StageKind> = ready.drain(..).collect();
        ready_sorted.sort_by_key(|s| s.enumeration_rank());
        let mut queue: VecDeque<StageKind> = ready_sorted.into();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(stage) = queue.pop_front() {
            order.push(stage);
            if let Some(next) = dependents.get(&stage) {
                let mut newly_ready = Vec::new();
                for dependent in next {
                    let degree = in_degree.get_mut(dependent).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        newly_ready.push(*dependent);
                    }
                }
                newly_ready.sort_by_key(|s| s.enumeration_rank());
                for stage in newly_ready {
                    // keep overall queue ordered by rank among currently-ready stages
                    let pos = queue
                        .iter()
                        .position(|s| s.enumeration_rank() > stage.enumeration_rank())
                        .unwrap_or(queue.len());
                    queue.insert(pos, stage);
                }
            }
        }

        if order.len() != in_degree.len() {
            return Err(CoreError::invalid_config(
                "stage dependency graph contains a cycle",
            ));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_dag() -> StageDag {
        let mut dag = StageDag::new();
        dag.add_stage(StageKind::RawInput);
        dag.add_dependency(StageKind::Validation, StageKind::RawInput);
        dag.add_dependency(StageKind::DuplicateDetection, StageKind::Validation);
        dag.add_dependency(StageKind::AmountValidation, StageKind::Validation);
        dag.add_dependency(StageKind::BusinessRules, StageKind::DuplicateDetection);
        dag.add_dependency(StageKind::BusinessRules, StageKind::AmountValidation);
        dag.add_dependency(StageKind::PatternMatching, StageKind::BusinessRules);
        dag.add_dependency(StageKind::Enrichment, StageKind::PatternMatching);
        dag.add_dependency(StageKind::Finalization, StageKind::Enrichment);
        dag
    }

    #[test]
    fn topological_sort_respects_dependencies() {
        let dag = linear_dag();
        let order = dag.topological_sort().unwrap();
        let pos = |s: StageKind| order.iter().position(|x| *x == s).unwrap();
        assert!(pos(StageKind::RawInput) < pos(StageKind::Validation));
        assert!(pos(StageKind::Validation) < pos(StageKind::DuplicateDetection));
        assert!(pos(StageKind::BusinessRules) < pos(StageKind::PatternMatching));
        assert!(pos(StageKind::Finalization) == order.len() - 1);
    }

    #[test]
    fn empty_dag_returns_empty_order() {
        let dag = StageDag::new();
        assert_eq!(dag.topological_sort().unwrap(), Vec::new());
    }

    #[test]
    fn cycle_is_a_configuration_error() {
        let mut dag = StageDag::new();
        dag.add_dependency(StageKind::Validation, StageKind::BusinessRules);
        dag.add_dependency(StageKind::BusinessRules, StageKind::Validation);
        assert!(dag.topological_sort().is_err());
    }

    #[test]
    fn ties_break_by_canonical_enumeration_order() {
        let mut dag = StageDag::new();
        dag.add_stage(StageKind::PatternMatching);
        dag.add_stage(StageKind::Validation);
        dag.add_stage(StageKind::AmountValidation);
        let order = dag.topological_sort().unwrap();
        assert_eq!(
            order,
            vec![
                StageKind::Validation,
                StageKind::AmountValidation,
                StageKind::PatternMatching,
            ]
        );
    }
}
