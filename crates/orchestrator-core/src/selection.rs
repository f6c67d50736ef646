//! Artifact selection
//!
//! Every variant is tested in priority order unless the device reports too
//! little memory for the heaviest one, which is then skipped up front.

use std::path::PathBuf;

use serde::Serialize;

use bench_config::{CorpusSettings, SelectionSettings};
use common::models::{ArtifactVariant, CapabilityProfile, ModelResult};

/// What one run will do
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionPlan {
    /// Variants to load, in order
    pub tested: Vec<ArtifactVariant>,
    /// Zeroed records of variants removed by the policy
    pub skipped: Vec<ModelResult>,
    /// Inputs every tested variant runs through, in order
    pub corpus: Vec<PathBuf>,
}

impl SelectionPlan {
    /// Tested artifacts times corpus size
    pub fn total_planned(&self) -> usize {
        self.tested.len() * self.corpus.len()
    }
}

/// Builds the plan of a run on `profile`
pub fn select(profile: &CapabilityProfile, selection: &SelectionSettings, corpus: &CorpusSettings) -> SelectionPlan {
    let mut tested = ArtifactVariant::ALL.to_vec();
    let mut skipped = Vec::new();

    if profile.device_memory_gb <= selection.skip_heaviest_at_or_below_gb {
        let heaviest = ArtifactVariant::heaviest();
        tested.retain(|variant| *variant != heaviest);
        skipped.push(ModelResult::skipped(
            heaviest,
            format!(
                "Skipped due to insufficient RAM: {}GB (more than {}GB required)",
                profile.device_memory_gb, selection.skip_heaviest_at_or_below_gb
            ),
        ));
    }

    let mut paths = corpus.paths();
    if profile.low_end {
        if let Some(limit) = corpus.constrained_limit {
            paths.truncate(limit);
        }
    }

    SelectionPlan {
        tested,
        skipped,
        corpus: paths,
    }
}
