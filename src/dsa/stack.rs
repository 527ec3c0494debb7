//! Directive region stack

use super::AttributeKind;
use crate::ast::{ExprId, ScopeId, SourceLoc, VarId};
use crate::directive::DirectiveKind;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Explicit attribute registered in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DsaEntry {
    /// Attribute
    pub kind: AttributeKind,
    /// Clause item that established it
    pub source_ref: Option<ExprId>,
}

/// State of the `default` clause of a construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DefaultAttribute {
    /// No `default` clause
    #[default]
    Unspecified,
    /// `default(none)`
    None,
    /// `default(shared)`
    Shared,
}

/// Attribute frame of one open construct
#[derive(Debug, Clone, Serialize)]
pub struct SharingMap {
    /// Explicit attributes
    pub entries: HashMap<VarId, DsaEntry>,
    /// Variables named in an `aligned` clause
    pub aligned: HashMap<VarId, ExprId>,
    /// Loop-control variables of the associated loops
    pub loop_control: HashSet<VarId>,
    /// `default` clause state
    pub default_attr: DefaultAttribute,
    /// Location of the `default` clause, or of the construct when absent
    pub default_loc: SourceLoc,
    /// Directive kind; `Unknown` for the sentinel
    pub directive: DirectiveKind,
    /// Name of a `critical` construct
    pub name: Option<String>,
    /// Lexical scope of the region
    pub scope: Option<ScopeId>,
    /// Directive location
    pub construct_loc: SourceLoc,
    /// Carries an `ordered` clause
    pub ordered_region: bool,
    /// Carries a `nowait` clause
    pub nowait_region: bool,
    /// Loops associated through `collapse`
    pub collapse_number: u32,
    /// Location of the `teams` construct nested in a `target` region
    pub inner_teams_region_loc: Option<SourceLoc>,
}

impl SharingMap {
    fn new(
        directive: DirectiveKind,
        name: Option<String>,
        scope: Option<ScopeId>,
        loc: SourceLoc,
    ) -> Self {
        SharingMap {
            entries: HashMap::new(),
            aligned: HashMap::new(),
            loop_control: HashSet::new(),
            default_attr: DefaultAttribute::Unspecified,
            default_loc: loc,
            directive,
            name,
            scope,
            construct_loc: loc,
            ordered_region: false,
            nowait_region: false,
            collapse_number: 1,
            inner_teams_region_loc: None,
        }
    }

    /// Explicit entry for `var`
    pub fn entry(&self, var: VarId) -> Option<&DsaEntry> {
        self.entries.get(&var)
    }
}

/// Stack of attribute frames, oldest first
///
/// Frame 0 is a permanent sentinel standing for "outside any construct";
/// it also holds every `threadprivate` registration.
#[derive(Debug, Clone)]
pub struct DirectiveRegionStack {
    frames: Vec<SharingMap>,
}

impl Default for DirectiveRegionStack {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectiveRegionStack {
    /// Stack holding only the sentinel frame
    pub fn new() -> Self {
        DirectiveRegionStack {
            frames: vec![SharingMap::new(
                DirectiveKind::Unknown,
                None,
                None,
                SourceLoc::default(),
            )],
        }
    }

    /// Opens a frame for a construct.
    pub fn push(
        &mut self,
        directive: DirectiveKind,
        name: Option<String>,
        scope: Option<ScopeId>,
        loc: SourceLoc,
    ) {
        tracing::debug!(
            directive = %directive,
            depth = self.frames.len(),
            at = %loc,
            "push region"
        );
        self.frames.push(SharingMap::new(directive, name, scope, loc));
    }

    /// Closes the innermost frame and hands it back.
    pub fn pop(&mut self) -> Result<SharingMap> {
        if self.frames.len() <= 1 {
            return Err(Error::PopSentinel);
        }
        let frame = self.frames.pop().ok_or(Error::PopSentinel)?;
        tracing::debug!(directive = %frame.directive, depth = self.frames.len(), "pop region");
        Ok(frame)
    }

    /// Number of frames, sentinel included (always at least 1)
    pub fn size(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if no construct is open.
    pub fn at_sentinel(&self) -> bool {
        self.frames.len() == 1
    }

    /// All frames, oldest first
    pub fn frames(&self) -> &[SharingMap] {
        &self.frames
    }

    /// Frame at `index`
    pub fn frame(&self, index: usize) -> Option<&SharingMap> {
        self.frames.get(index)
    }

    /// Innermost frame
    pub fn top(&self) -> &SharingMap {
        let last = self.frames.len() - 1;
        &self.frames[last]
    }

    fn top_mut(&mut self) -> &mut SharingMap {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn parent(&self) -> Option<&SharingMap> {
        let len = self.frames.len();
        if len > 2 {
            self.frames.get(len - 2)
        } else {
            None
        }
    }

    /// Registers an explicit attribute in the innermost frame (threadprivate
    /// goes to the sentinel). An existing entry is overwritten.
    pub fn add_dsa(&mut self, var: VarId, source_ref: Option<ExprId>, kind: AttributeKind) {
        let entry = DsaEntry { kind, source_ref };
        tracing::trace!(var = var.0, kind = %kind, "add dsa");
        if kind == AttributeKind::ThreadPrivate {
            self.frames[0].entries.insert(var, entry);
        } else {
            self.top_mut().entries.insert(var, entry);
        }
    }

    /// `default(none)`
    pub fn set_default_dsa_none(&mut self, loc: SourceLoc) {
        let top = self.top_mut();
        top.default_attr = DefaultAttribute::None;
        top.default_loc = loc;
    }

    /// `default(shared)`
    pub fn set_default_dsa_shared(&mut self, loc: SourceLoc) {
        let top = self.top_mut();
        top.default_attr = DefaultAttribute::Shared;
        top.default_loc = loc;
    }

    /// Marks the innermost region as `ordered`.
    pub fn set_ordered_region(&mut self, ordered: bool) {
        self.top_mut().ordered_region = ordered;
    }

    /// Marks the innermost region as `nowait`.
    pub fn set_nowait_region(&mut self, nowait: bool) {
        self.top_mut().nowait_region = nowait;
    }

    /// Records the `collapse` count of the innermost region.
    pub fn set_collapse_number(&mut self, n: u32) {
        self.top_mut().collapse_number = n;
    }

    /// `collapse` count of the innermost region
    pub fn collapse_number(&self) -> u32 {
        self.top().collapse_number
    }

    /// Records a loop-control variable of the innermost region.
    pub fn add_loop_control_variable(&mut self, var: VarId) {
        self.top_mut().loop_control.insert(var);
    }

    /// Returns true if `var` controls a loop of the innermost region.
    pub fn is_loop_control_variable(&self, var: VarId) -> bool {
        self.top().loop_control.contains(&var)
    }

    /// Records an `aligned` use; returns the earlier item if `var` was
    /// already aligned in this region.
    pub fn add_unique_aligned(&mut self, var: VarId, item: ExprId) -> Option<ExprId> {
        let top = self.top_mut();
        match top.aligned.get(&var) {
            Some(previous) => Some(*previous),
            None => {
                top.aligned.insert(var, item);
                None
            }
        }
    }

    /// Directive of the innermost frame
    pub fn current_directive(&self) -> DirectiveKind {
        self.top().directive
    }

    /// Directive enclosing the innermost frame
    pub fn parent_directive(&self) -> DirectiveKind {
        self.parent().map_or(DirectiveKind::Unknown, |f| f.directive)
    }

    /// The enclosing region carries `ordered`.
    pub fn is_parent_ordered_region(&self) -> bool {
        self.parent().is_some_and(|f| f.ordered_region)
    }

    /// The enclosing region carries `nowait`.
    pub fn is_parent_nowait_region(&self) -> bool {
        self.parent().is_some_and(|f| f.nowait_region)
    }

    /// Records the nested `teams` location on the enclosing frame.
    pub fn set_parent_teams_region_loc(&mut self, loc: SourceLoc) {
        let len = self.frames.len();
        if len > 2 {
            self.frames[len - 2].inner_teams_region_loc = Some(loc);
        }
    }

    /// Records the nested `teams` location on the innermost frame.
    pub fn set_inner_teams_region_loc(&mut self, loc: SourceLoc) {
        if !self.at_sentinel() {
            self.top_mut().inner_teams_region_loc = Some(loc);
        }
    }

    /// `teams` location recorded on the innermost frame
    pub fn inner_teams_region_loc(&self) -> Option<SourceLoc> {
        self.top().inner_teams_region_loc
    }

    /// Innermost construct frame satisfying `pred`, searching every frame
    /// except the sentinel
    pub fn find_enclosing<P>(&self, pred: P) -> Option<&SharingMap>
    where
        P: Fn(&SharingMap) -> bool,
    {
        self.frames.iter().skip(1).rev().find(|f| pred(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32) -> SourceLoc {
        SourceLoc::new(line, 1)
    }

    #[test]
    fn test_sentinel_cannot_be_popped() {
        let mut stack = DirectiveRegionStack::new();
        assert_eq!(stack.pop().unwrap_err(), Error::PopSentinel);
        assert_eq!(stack.size(), 1);
    }

    #[test]
    fn test_push_pop_balance() {
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Parallel, None, None, loc(1));
        stack.push(DirectiveKind::For, None, None, loc(2));
        assert_eq!(stack.size(), 3);
        assert_eq!(stack.current_directive(), DirectiveKind::For);
        assert_eq!(stack.parent_directive(), DirectiveKind::Parallel);
        assert_eq!(stack.pop().unwrap().directive, DirectiveKind::For);
        assert_eq!(stack.pop().unwrap().directive, DirectiveKind::Parallel);
        assert!(stack.at_sentinel());
    }

    #[test]
    fn test_add_dsa_overwrites() {
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Parallel, None, None, loc(1));
        let x = VarId(0);
        stack.add_dsa(x, Some(ExprId(1)), AttributeKind::Private);
        stack.add_dsa(x, Some(ExprId(2)), AttributeKind::Shared);
        let entry = stack.top().entry(x).copied().unwrap();
        assert_eq!(entry.kind, AttributeKind::Shared);
        assert_eq!(entry.source_ref, Some(ExprId(2)));
    }

    #[test]
    fn test_threadprivate_goes_to_sentinel() {
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Parallel, None, None, loc(1));
        stack.add_dsa(VarId(3), None, AttributeKind::ThreadPrivate);
        assert!(stack.top().entry(VarId(3)).is_none());
        assert_eq!(
            stack.frames()[0].entry(VarId(3)).map(|e| e.kind),
            Some(AttributeKind::ThreadPrivate)
        );
        stack.pop().unwrap();
        assert!(stack.frames()[0].entry(VarId(3)).is_some());
    }

    #[test]
    fn test_unique_aligned_returns_first_registration() {
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Simd, None, None, loc(1));
        assert_eq!(stack.add_unique_aligned(VarId(0), ExprId(10)), None);
        assert_eq!(stack.add_unique_aligned(VarId(0), ExprId(11)), Some(ExprId(10)));
        assert_eq!(stack.add_unique_aligned(VarId(0), ExprId(12)), Some(ExprId(10)));
    }

    #[test]
    fn test_default_and_region_flags() {
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::Parallel, None, None, loc(1));
        assert_eq!(stack.top().default_loc, loc(1));
        stack.set_default_dsa_none(loc(5));
        assert_eq!(stack.top().default_attr, DefaultAttribute::None);
        assert_eq!(stack.top().default_loc, loc(5));

        stack.push(DirectiveKind::For, None, None, loc(2));
        stack.set_ordered_region(true);
        stack.set_collapse_number(2);
        assert_eq!(stack.collapse_number(), 2);
        stack.push(DirectiveKind::Ordered, None, None, loc(3));
        assert!(stack.is_parent_ordered_region());
        assert!(!stack.is_parent_nowait_region());
    }

    #[test]
    fn test_loop_control_is_per_frame() {
        let mut stack = DirectiveRegionStack::new();
        stack.push(DirectiveKind::For, None, None, loc(1));
        stack.add_loop_control_variable(VarId(1));
        assert!(stack.is_loop_control_variable(VarId(1)));
        stack.push(DirectiveKind::Parallel, None, None, loc(2));
        assert!(!stack.is_loop_control_variable(VarId(1)));
    }
}
