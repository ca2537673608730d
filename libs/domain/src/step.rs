//! Step tree node definitions
//!
//! The workflow body is a tagged sum: orchestration nodes (`sequence`, `if`)
//! coordinate children, leaf nodes (`log`, `work`) perform work and produce
//! step results. Decoding and evaluation dispatch on the `type` tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum nesting depth of a step tree
pub const MAX_NESTING_DEPTH: usize = 10;

/// Discriminator for step tree nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Sequence,
    If,
    Log,
    Work,
}

impl StepType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::If => "if",
            Self::Log => "log",
            Self::Work => "work",
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequence" => Ok(Self::Sequence),
            "if" => Ok(Self::If),
            "log" => Ok(Self::Log),
            "work" => Ok(Self::Work),
            other => Err(format!("unknown step type: {other}")),
        }
    }
}

/// A node of the workflow step tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Ordered list of children; fails fast on the first failing child
    Sequence {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        children: Vec<Step>,
    },

    /// Conditional branch over the minimal predicate dialect
    /// (`true`, `false`, `params.<name>`)
    If {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        condition: String,
        #[serde(default)]
        then: Vec<Step>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Step>,
    },

    /// Writes a message to the process log after `{name}` substitution
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        message: String,
    },

    /// Opaque leaf delegated to the work executor registered for `kind`
    Work {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        kind: String,
        #[serde(default)]
        config: Value,
    },
}

impl Step {
    /// The node's discriminator.
    #[must_use]
    pub const fn step_type(&self) -> StepType {
        match self {
            Self::Sequence { .. } => StepType::Sequence,
            Self::If { .. } => StepType::If,
            Self::Log { .. } => StepType::Log,
            Self::Work { .. } => StepType::Work,
        }
    }

    /// Explicit step id, when the document supplied one.
    #[must_use]
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::Sequence { step_id, .. }
            | Self::If { step_id, .. }
            | Self::Log { step_id, .. }
            | Self::Work { step_id, .. } => step_id.as_deref(),
        }
    }

    /// Whether this node is a leaf (produces a step result when visited).
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Log { .. } | Self::Work { .. })
    }

    /// Depth of the subtree rooted at this node (a leaf has depth 1).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Log { .. } | Self::Work { .. } => 1,
            Self::Sequence { children, .. } => {
                1 + children.iter().map(Self::depth).max().unwrap_or(0)
            }
            Self::If {
                then, otherwise, ..
            } => {
                1 + then
                    .iter()
                    .chain(otherwise)
                    .map(Self::depth)
                    .max()
                    .unwrap_or(0)
            }
        }
    }
}
