//! Data-sharing attributes
//!
//! A [`DirectiveRegionStack`] holds one [`SharingMap`] per open construct.
//! The [`AttributeResolver`] answers attribute queries over it, and the
//! [`ClauseProcessor`] registers explicit attributes after checking them
//! against what is already visible.
//!
//! Registration never validates: [`DirectiveRegionStack::add_dsa`] silently
//! overwrites. Conflict detection is the caller's job, through
//! [`AttributeResolver::get_top_dsa`], [`AttributeResolver::has_dsa`] and
//! [`AttributeResolver::has_innermost_dsa`].

pub mod clauses;
pub mod resolver;
pub mod stack;

pub use clauses::{ClauseOutcome, ClauseProcessor};
pub use resolver::{AttributeResolver, DsaResolution};
pub use stack::{DefaultAttribute, DirectiveRegionStack, DsaEntry, SharingMap};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data-sharing attribute of a variable in a construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttributeKind {
    Shared,
    Private,
    FirstPrivate,
    LastPrivate,
    Linear,
    Reduction,
    ThreadPrivate,
    /// Undecided; the caller applies its own fallback
    #[default]
    Unknown,
}

impl AttributeKind {
    /// Gives each thread its own copy
    pub fn is_private_like(self) -> bool {
        matches!(
            self,
            AttributeKind::Private
                | AttributeKind::FirstPrivate
                | AttributeKind::LastPrivate
                | AttributeKind::Linear
                | AttributeKind::Reduction
        )
    }

    /// Clause spelling
    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Shared => "shared",
            AttributeKind::Private => "private",
            AttributeKind::FirstPrivate => "firstprivate",
            AttributeKind::LastPrivate => "lastprivate",
            AttributeKind::Linear => "linear",
            AttributeKind::Reduction => "reduction",
            AttributeKind::ThreadPrivate => "threadprivate",
            AttributeKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
