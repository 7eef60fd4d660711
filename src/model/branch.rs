//! Branch presence and width, resolved once at construction

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ArterialError, Result};

/// The three feature pathways, in fusion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchKind {
    Global,
    Segment,
    Dense,
}

impl BranchKind {
    /// Fusion order
    pub fn all() -> [BranchKind; 3] {
        [BranchKind::Global, BranchKind::Segment, BranchKind::Dense]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BranchKind::Global => "global",
            BranchKind::Segment => "segment",
            BranchKind::Dense => "dense",
        }
    }
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a branch exists, and if so its depth and output width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchSpec {
    Disabled,
    Active { layers: usize, width: usize },
}

impl BranchSpec {
    /// Resolve from a layer count; zero layers disables the branch
    pub fn resolve(kind: BranchKind, layers: usize, width: usize) -> Result<Self> {
        if layers == 0 {
            return Ok(BranchSpec::Disabled);
        }
        if width == 0 {
            return Err(ArterialError::InvalidDimension {
                name: format!("{} branch width", kind),
                value: width,
            });
        }
        Ok(BranchSpec::Active { layers, width })
    }

    pub fn is_active(&self) -> bool {
        matches!(self, BranchSpec::Active { .. })
    }

    /// Contribution to the fusion input width (0 when disabled)
    pub fn width(&self) -> usize {
        match self {
            BranchSpec::Disabled => 0,
            BranchSpec::Active { width, .. } => *width,
        }
    }

    pub fn layers(&self) -> usize {
        match self {
            BranchSpec::Disabled => 0,
            BranchSpec::Active { layers, .. } => *layers,
        }
    }
}

/// Fusion input width of a set of resolved branches
pub fn fusion_width(specs: &[BranchSpec]) -> Result<usize> {
    if !specs.iter().any(BranchSpec::is_active) {
        return Err(ArterialError::NoActiveBranches);
    }
    Ok(specs.iter().map(BranchSpec::width).sum())
}
