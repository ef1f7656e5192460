//! Lexically nested symbol scopes, the break/continue jump-target stack,
//! and the per-function label table.
//!
//! All three are mutable singletons for the lifetime of one compilation
//! — there is exactly one `ScopeStack`, one jump-context stack,
//! and the label table is cleared on every function exit.

use crate::types::TypeIdx;
use std::collections::{HashMap, HashSet};

/// A variable binding: its backend storage slot (an `alloca`'d SSA name,
/// without the leading `%`) and its type.
#[derive(Debug, Clone)]
pub struct Binding {
    pub slot: String,
    pub ty: TypeIdx,
}

/// Parallel stack of scopes. Lookup walks from innermost
/// outward; insertion always targets the innermost scope. The global scope
/// lives at the bottom and is never popped during a function body.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<HashMap<String, Binding>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { scopes: Vec::new() }
    }

    pub fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declares `name` in the innermost scope. Returns `false` if `name`
    /// already exists in that *same* scope, in which case the caller should report a semantic error
    /// rather than shadow it.
    pub fn declare(&mut self, name: &str, binding: Binding) -> bool {
        let scope = self.scopes.last_mut().expect("no active scope");
        if scope.contains_key(name) {
            return false;
        }
        scope.insert(name.to_string(), binding);
        true
    }

    /// Unconditionally (re)binds `name` in the innermost scope — used only
    /// to complete a forward function prototype, never for ordinary
    /// variables.
    pub fn force_declare(&mut self, name: &str, binding: Binding) {
        self.scopes
            .last_mut()
            .expect("no active scope")
            .insert(name.to_string(), binding);
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    pub fn is_declared_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|s| s.contains_key(name))
    }
}

/// A record on the break/continue target stack. Loops push a
/// context with both targets set; `switch` pushes one with `continue_target
/// = None` (only `break` is valid directly inside a switch body).
#[derive(Debug, Clone)]
pub struct JumpContext {
    pub continue_target: Option<String>,
    pub break_target: String,
}

/// Stack of `JumpContext`s used to resolve `break`/`continue`. `break` consults the innermost context; `continue` walks outward
/// until it finds one that supports continuing.
#[derive(Debug, Default)]
pub struct JumpStack {
    contexts: Vec<JumpContext>,
}

impl JumpStack {
    pub fn new() -> Self {
        JumpStack::default()
    }

    pub fn push(&mut self, ctx: JumpContext) {
        self.contexts.push(ctx);
    }

    pub fn pop(&mut self) {
        self.contexts.pop();
    }

    pub fn break_target(&self) -> Option<&str> {
        self.contexts.last().map(|c| c.break_target.as_str())
    }

    pub fn continue_target(&self) -> Option<&str> {
        self.contexts
            .iter()
            .rev()
            .find_map(|c| c.continue_target.as_deref())
    }
}

/// Per-function mapping from label name to its backend basic block, plus
/// the set of labels referenced by a `goto` before they were declared
///. Cleared on function exit; a non-empty `pending` set at
/// that point is a fatal "unresolved goto" error.
#[derive(Debug, Default)]
pub struct LabelTable {
    blocks: HashMap<String, String>,
    pending: HashSet<String>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    /// Returns the block name for `label`, creating a fresh placeholder (and
    /// marking it pending) if this is the first reference — covers both a
    /// forward `goto` and the eventual `label:` declaration.
    pub fn block_for(&mut self, label: &str, mut alloc: impl FnMut() -> String) -> String {
        if let Some(existing) = self.blocks.get(label) {
            return existing.clone();
        }
        let block = alloc();
        self.blocks.insert(label.to_string(), block.clone());
        self.pending.insert(label.to_string());
        block
    }

    /// Marks `label` as resolved (its `label:` statement has been emitted).
    pub fn resolve(&mut self, label: &str) {
        self.pending.remove(label);
    }

    pub fn pending_labels(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(|s| s.as_str())
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTable;

    #[test]
    fn scope_lookup_walks_outward() {
        let mut types = TypeTable::new();
        let int = types.primitive(crate::types::PrimitiveKind::Int);
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare(
            "x",
            Binding {
                slot: "x.addr".into(),
                ty: int,
            },
        );
        scopes.push();
        assert!(scopes.lookup("x").is_some());
        scopes.pop();
        assert!(scopes.lookup("x").is_some());
        scopes.pop();
        assert!(scopes.lookup("x").is_none());
    }

    #[test]
    fn redeclaration_in_same_scope_rejected() {
        let mut types = TypeTable::new();
        let int = types.primitive(crate::types::PrimitiveKind::Int);
        let mut scopes = ScopeStack::new();
        scopes.push();
        assert!(scopes.declare(
            "x",
            Binding {
                slot: "a".into(),
                ty: int
            }
        ));
        assert!(!scopes.declare(
            "x",
            Binding {
                slot: "b".into(),
                ty: int
            }
        ));
    }

    #[test]
    fn continue_walks_past_switch_context() {
        let mut jumps = JumpStack::new();
        jumps.push(JumpContext {
            continue_target: Some("loop.cont".into()),
            break_target: "loop.exit".into(),
        });
        jumps.push(JumpContext {
            continue_target: None,
            break_target: "switch.merge".into(),
        });
        assert_eq!(jumps.break_target(), Some("switch.merge"));
        assert_eq!(jumps.continue_target(), Some("loop.cont"));
    }

    #[test]
    fn label_table_tracks_pending_gotos() {
        let mut labels = LabelTable::new();
        let mut counter = 0;
        let block = labels.block_for("L", || {
            counter += 1;
            format!("label.{}", counter)
        });
        assert_eq!(block, "label.1");
        assert_eq!(labels.pending_labels().count(), 1);
        labels.resolve("L");
        assert_eq!(labels.pending_labels().count(), 0);
    }
}
