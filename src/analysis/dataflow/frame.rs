//! Frames: per-slot abstract state for stack-and-locals analyses.
//!
//! A [`Frame`] holds one abstract value per local-variable slot plus an
//! operand-stack list, modelled slot-by-slot exactly as the JVM lays values
//! out: a category-2 value (long, double) occupies two consecutive entries,
//! with the analysis's designated filler value in the second slot. Transfer
//! functions use [`Op::stack_slots_consumed`](crate::bytecode::Op::stack_slots_consumed)
//! and its counterpart for every opcode they do not special-case, so pop and
//! push counts stay exact without per-value category queries.
//!
//! The nullness, value-numbering and type analyses all instantiate `Frame`
//! with their own slot value; the lattice meet merges locals and stack
//! pairwise through the slot value's own meet.

use std::fmt::Debug;

use crate::analysis::dataflow::lattice::MeetSemiLattice;

/// Abstract state of the local-variable array and operand stack at one
/// program point, one value of type `V` per JVM slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<V> {
    locals: Vec<V>,
    stack: Vec<V>,
}

impl<V: Clone + Debug + PartialEq> Frame<V> {
    /// Creates a frame with `max_locals` local slots, all holding `fill`,
    /// and an empty operand stack.
    #[must_use]
    pub fn new(max_locals: u16, fill: V) -> Self {
        Self {
            locals: vec![fill; usize::from(max_locals)],
            stack: Vec::new(),
        }
    }

    /// Returns the local-variable slots.
    #[must_use]
    pub fn locals(&self) -> &[V] {
        &self.locals
    }

    /// Returns the value in a local slot, or `None` if out of range.
    #[must_use]
    pub fn local(&self, slot: u16) -> Option<&V> {
        self.locals.get(usize::from(slot))
    }

    /// Sets a local slot. Out-of-range slots (malformed input) are ignored.
    pub fn set_local(&mut self, slot: u16, value: V) {
        if let Some(entry) = self.locals.get_mut(usize::from(slot)) {
            *entry = value;
        }
    }

    /// Returns the operand stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[V] {
        &self.stack
    }

    /// Returns the current operand-stack depth in slots.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Pushes one slot.
    pub fn push(&mut self, value: V) {
        self.stack.push(value);
    }

    /// Pops one slot. Underflow (malformed input) yields `None`.
    pub fn pop(&mut self) -> Option<V> {
        self.stack.pop()
    }

    /// Pops `count` slots, discarding them.
    pub fn pop_n(&mut self, count: usize) {
        let new_len = self.stack.len().saturating_sub(count);
        self.stack.truncate(new_len);
    }

    /// Returns the top-of-stack slot.
    #[must_use]
    pub fn top(&self) -> Option<&V> {
        self.stack.last()
    }

    /// Returns the slot `depth` positions below the top (`peek(0)` is the top).
    #[must_use]
    pub fn peek(&self, depth: usize) -> Option<&V> {
        self.stack.len().checked_sub(depth + 1).map(|i| &self.stack[i])
    }

    /// Replaces the top-of-stack slot; a no-op on an empty stack.
    pub fn set_top(&mut self, value: V) {
        if let Some(top) = self.stack.last_mut() {
            *top = value;
        }
    }

    /// Empties the operand stack (used at exception-handler entries, where
    /// the JVM discards the stack and pushes the thrown reference).
    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Applies the default slot effect of an opcode: pop the consumed slots,
    /// push `fill` for each produced slot.
    pub fn apply_generic(&mut self, consumed: usize, produced: usize, fill: V) {
        self.pop_n(consumed);
        for _ in 0..produced {
            self.push(fill.clone());
        }
    }

    /// Applies a `dup`/`pop`/`swap`-family opcode as a slot permutation,
    /// preserving the duplicated values (and whatever the analysis attaches
    /// to them).
    ///
    /// On underflow (malformed input) the available slots are discarded and
    /// nothing is pushed.
    pub fn apply_stack_op(&mut self, op: crate::bytecode::StackOp) {
        use crate::bytecode::StackOp;

        let needed = match op {
            StackOp::Pop | StackOp::Dup => 1,
            StackOp::Pop2 | StackOp::DupX1 | StackOp::Dup2 | StackOp::Swap => 2,
            StackOp::DupX2 | StackOp::Dup2X1 => 3,
            StackOp::Dup2X2 => 4,
        };
        if self.stack.len() < needed {
            self.stack.clear();
            return;
        }
        let top = self.stack.len();
        let popped: Vec<V> = self.stack.split_off(top - needed);
        // popped[needed - 1] is the old top of stack.
        match op {
            StackOp::Pop | StackOp::Pop2 => {}
            StackOp::Dup => {
                self.stack.push(popped[0].clone());
                self.stack.push(popped[0].clone());
            }
            StackOp::DupX1 => {
                // [b, a] -> [a, b, a]
                self.stack.push(popped[1].clone());
                self.stack.push(popped[0].clone());
                self.stack.push(popped[1].clone());
            }
            StackOp::DupX2 => {
                // [c, b, a] -> [a, c, b, a]
                self.stack.push(popped[2].clone());
                self.stack.push(popped[0].clone());
                self.stack.push(popped[1].clone());
                self.stack.push(popped[2].clone());
            }
            StackOp::Dup2 => {
                // [b, a] -> [b, a, b, a]
                self.stack.push(popped[0].clone());
                self.stack.push(popped[1].clone());
                self.stack.push(popped[0].clone());
                self.stack.push(popped[1].clone());
            }
            StackOp::Dup2X1 => {
                // [c, b, a] -> [b, a, c, b, a]
                self.stack.push(popped[1].clone());
                self.stack.push(popped[2].clone());
                self.stack.push(popped[0].clone());
                self.stack.push(popped[1].clone());
                self.stack.push(popped[2].clone());
            }
            StackOp::Dup2X2 => {
                // [d, c, b, a] -> [b, a, d, c, b, a]
                self.stack.push(popped[2].clone());
                self.stack.push(popped[3].clone());
                self.stack.push(popped[0].clone());
                self.stack.push(popped[1].clone());
                self.stack.push(popped[2].clone());
                self.stack.push(popped[3].clone());
            }
            StackOp::Swap => {
                // [b, a] -> [a, b]
                self.stack.push(popped[1].clone());
                self.stack.push(popped[0].clone());
            }
        }
    }

    /// Merges another frame into this one, combining corresponding slots
    /// with `merge`.
    ///
    /// Stack depths agree for verified bytecode; if they differ the stacks
    /// are truncated to the common depth (counted from the bottom) rather
    /// than failing, consistent with the engine's tolerance of unverifiable
    /// input.
    pub fn merge_with(&mut self, other: &Self, mut merge: impl FnMut(&V, &V) -> V) {
        for (mine, theirs) in self.locals.iter_mut().zip(&other.locals) {
            *mine = merge(mine, theirs);
        }
        let depth = self.stack.len().min(other.stack.len());
        self.stack.truncate(depth);
        for (mine, theirs) in self.stack.iter_mut().zip(&other.stack) {
            *mine = merge(mine, theirs);
        }
    }
}

impl<V: MeetSemiLattice> MeetSemiLattice for Frame<V> {
    fn meet(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge_with(other, V::meet);
        result
    }
}
