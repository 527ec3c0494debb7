//! Loop analysis for loop-bearing directives
//!
//! [`form`] recognises the canonical loop shape, [`space`] derives the
//! iteration space of one loop, and [`collapse`] flattens a nest of them
//! into a single induction variable.

pub mod collapse;
pub mod expr;
pub mod form;
pub mod space;

pub use collapse::{CollapseLinearizer, LinearizedLoop, WorksharingBounds};
pub use expr::{BoundValues, IterEnv, IterExpr, IterOp, WorksharingBound};
pub use form::{CondForm, IncForm, LoopForm, LoopFormChecker};
pub use space::{IterationSpaceBuilder, LoopIterationSpace};
