//! Attribute resolution over the region stack
//!
//! [`AttributeResolver::get_dsa`] evaluates the attribute rules frame by
//! frame from the sentinel upwards. Each frame's answer depends only on the
//! frames below it, so one forward pass over the stack yields the answer for
//! every position at once; the `task` rule reads the already computed answers
//! of the enclosing frames instead of recursing.

use super::stack::DirectiveRegionStack;
use super::{AttributeKind, DefaultAttribute};
use crate::ast::{Ast, DeclKind, ExprId, SourceLoc, StorageClass, VarDecl, VarId};
use crate::directive::DirectiveKind;
use serde::Serialize;

/// Answer to "what is this variable's attribute here"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DsaResolution {
    /// Directive of the construct that decided the attribute
    pub directive: DirectiveKind,
    /// Attribute; `Unknown` leaves the fallback to the caller
    pub kind: AttributeKind,
    /// Clause item that established the attribute
    pub source_ref: Option<ExprId>,
    /// Location of the `default` clause (or construct) the answer came through
    pub implicit_loc: Option<SourceLoc>,
    /// Stack position whose rule decided the attribute
    pub frame: usize,
}

impl Default for DsaResolution {
    fn default() -> Self {
        DsaResolution {
            directive: DirectiveKind::Unknown,
            kind: AttributeKind::Unknown,
            source_ref: None,
            implicit_loc: None,
            frame: 0,
        }
    }
}

impl DsaResolution {
    fn unknown_at(frame: usize) -> Self {
        DsaResolution {
            frame,
            ..Default::default()
        }
    }

    fn with_kind(mut self, kind: AttributeKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Read-only attribute queries over a [`DirectiveRegionStack`]
pub struct AttributeResolver<'a> {
    stack: &'a DirectiveRegionStack,
    ast: &'a Ast,
}

impl<'a> AttributeResolver<'a> {
    /// Creates a resolver borrowing the stack and the syntax tree.
    pub fn new(stack: &'a DirectiveRegionStack, ast: &'a Ast) -> Self {
        AttributeResolver { stack, ast }
    }

    /// Attribute of `var` as decided at stack position `frame` (clamped to
    /// the innermost frame).
    pub fn get_dsa(&self, frame: usize, var: VarId) -> DsaResolution {
        let frame = frame.min(self.stack.size() - 1);
        let mut results = self.resolve_through(frame, var);
        results.pop().unwrap_or_default()
    }

    /// Answers for positions `0..=frame`, computed in one forward pass.
    fn resolve_through(&self, frame: usize, var: VarId) -> Vec<DsaResolution> {
        let decl = self.ast.var(var);
        let mut results = Vec::with_capacity(frame + 1);
        results.push(self.sentinel_dsa(decl));
        for index in 1..=frame {
            let resolution = self.frame_dsa(index, var, decl, &results);
            results.push(resolution);
        }
        results
    }

    fn sentinel_dsa(&self, decl: &VarDecl) -> DsaResolution {
        let mut dvar = DsaResolution::unknown_at(0);
        if !decl.is_function_local() || decl.has_global_storage() {
            dvar.kind = AttributeKind::Shared;
        }
        dvar
    }

    /// Rule evaluation at `index`; `outer` holds the answers below it.
    fn frame_dsa(
        &self,
        index: usize,
        var: VarId,
        decl: &VarDecl,
        outer: &[DsaResolution],
    ) -> DsaResolution {
        let frames = self.stack.frames();
        let frame = &frames[index];
        let mut dvar = DsaResolution {
            directive: frame.directive,
            frame: index,
            ..Default::default()
        };

        // Automatic variables declared inside the region are private
        if decl.is_local_auto() && self.is_openmp_local(decl, index) {
            return dvar.with_kind(AttributeKind::Private);
        }

        if let Some(entry) = frame.entry(var) {
            dvar.kind = entry.kind;
            dvar.source_ref = entry.source_ref;
            dvar.implicit_loc = Some(frame.default_loc);
            return dvar;
        }

        dvar.implicit_loc = Some(frame.default_loc);
        match frame.default_attr {
            DefaultAttribute::Shared => dvar.with_kind(AttributeKind::Shared),
            DefaultAttribute::None => dvar,
            DefaultAttribute::Unspecified => {
                if frame.directive.is_parallel() || frame.directive.is_teams() {
                    return dvar.with_kind(AttributeKind::Shared);
                }
                if frame.directive == DirectiveKind::Task {
                    dvar.directive = DirectiveKind::Task;
                    for enclosing in (0..index).rev() {
                        if outer[enclosing].kind != AttributeKind::Shared {
                            dvar.source_ref = None;
                            return dvar.with_kind(AttributeKind::FirstPrivate);
                        }
                        if frames[enclosing].directive.is_parallel_or_task() {
                            break;
                        }
                    }
                    return dvar.with_kind(AttributeKind::Shared);
                }
                outer[index - 1]
            }
        }
    }

    /// Declared inside the nearest enclosing parallel/task/teams region
    /// at or below `index`.
    fn is_openmp_local(&self, decl: &VarDecl, index: usize) -> bool {
        let frames = self.stack.frames();
        for i in (1..=index).rev() {
            if frames[i].directive.is_parallel_or_task() {
                return frames[i]
                    .scope
                    .is_some_and(|scope| self.ast.is_scope_within(decl.scope, scope));
            }
        }
        false
    }

    fn start_frame(&self, from_parent: bool) -> usize {
        let top = self.stack.size() - 1;
        if from_parent && top > 0 {
            top - 1
        } else {
            top
        }
    }

    /// Attribute of `var` in the innermost construct (or its parent),
    /// applying the threadprivate, predetermined-private, static data member
    /// and const shortcuts before the frame rules.
    pub fn get_top_dsa(&self, var: VarId, from_parent: bool) -> DsaResolution {
        let decl = self.ast.var(var);
        let start = self.start_frame(from_parent);

        if let Some(entry) = self.stack.frames()[0].entry(var) {
            if entry.kind == AttributeKind::ThreadPrivate {
                return DsaResolution {
                    kind: AttributeKind::ThreadPrivate,
                    source_ref: entry.source_ref,
                    ..Default::default()
                };
            }
        }
        if decl.storage == StorageClass::ThreadLocal {
            return DsaResolution::default().with_kind(AttributeKind::ThreadPrivate);
        }

        let directive = self.stack.frames()[start].directive;
        if !directive.is_parallel_or_task()
            && decl.is_local_auto()
            && self.is_openmp_local(decl, start)
        {
            return DsaResolution {
                directive,
                frame: start,
                ..Default::default()
            }
            .with_kind(AttributeKind::Private);
        }

        if decl.kind == DeclKind::StaticMember {
            let found = self.has_dsa(var, AttributeKind::is_private_like, |_| true, from_parent);
            if found.kind != AttributeKind::Unknown && found.source_ref.is_some() {
                return DsaResolution::unknown_at(start);
            }
            return DsaResolution::unknown_at(start).with_kind(AttributeKind::Shared);
        }

        if decl.is_const && !decl.ty.has_mutable_fields() {
            let found = self.has_dsa(
                var,
                |kind| kind == AttributeKind::FirstPrivate,
                |_| true,
                from_parent,
            );
            if found.kind == AttributeKind::FirstPrivate && found.source_ref.is_some() {
                return DsaResolution::unknown_at(start);
            }
            return DsaResolution::unknown_at(start).with_kind(AttributeKind::Shared);
        }

        let resolution = self.get_dsa(start, var);
        tracing::trace!(
            var = %decl.name,
            kind = %resolution.kind,
            frame = resolution.frame,
            "top dsa"
        );
        resolution
    }

    /// Attribute of `var` from the frame rules alone.
    pub fn get_implicit_dsa(&self, var: VarId, from_parent: bool) -> DsaResolution {
        self.get_dsa(self.start_frame(from_parent), var)
    }

    /// First frame, nearest first, whose directive satisfies `dpred` (or is a
    /// parallel/task/teams region) and whose answer satisfies `cpred`.
    /// Scanning starts at the parent of the innermost construct.
    pub fn has_dsa<C, D>(&self, var: VarId, cpred: C, dpred: D, from_parent: bool) -> DsaResolution
    where
        C: Fn(AttributeKind) -> bool,
        D: Fn(DirectiveKind) -> bool,
    {
        let Some(start) = self.scan_start(from_parent) else {
            return DsaResolution::default();
        };
        let results = self.resolve_through(start, var);
        let frames = self.stack.frames();
        for index in (1..=start).rev() {
            let directive = frames[index].directive;
            if !dpred(directive) && !directive.is_parallel_or_task() {
                continue;
            }
            if cpred(results[index].kind) {
                return results[index];
            }
        }
        DsaResolution::default()
    }

    /// Like [`has_dsa`](Self::has_dsa) but inspects only the nearest frame:
    /// a frame failing `dpred` ends the search, and the first frame that
    /// passes decides.
    pub fn has_innermost_dsa<C, D>(
        &self,
        var: VarId,
        cpred: C,
        dpred: D,
        from_parent: bool,
    ) -> DsaResolution
    where
        C: Fn(AttributeKind) -> bool,
        D: Fn(DirectiveKind) -> bool,
    {
        let Some(start) = self.scan_start(from_parent) else {
            return DsaResolution::default();
        };
        if start == 0 || !dpred(self.stack.frames()[start].directive) {
            return DsaResolution::default();
        }
        let resolution = self.get_dsa(start, var);
        if cpred(resolution.kind) {
            resolution
        } else {
            DsaResolution::default()
        }
    }

    /// Parent of the innermost construct, shifted once more for `from_parent`.
    fn scan_start(&self, from_parent: bool) -> Option<usize> {
        let top = self.stack.size() - 1;
        if top == 0 {
            return None;
        }
        let start = top - 1;
        Some(if from_parent && start > 0 { start - 1 } else { start })
    }
}
