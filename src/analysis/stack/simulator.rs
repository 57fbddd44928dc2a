//! The single-pass operand-stack simulator.
//!
//! [`OpcodeStack`] walks a method's instructions once, in program order,
//! maintaining an operand stack and local array of [`Item`]s with exact JVM
//! slot effects. There is no fixpoint: at any pc reachable along more than
//! one path the simulator scrubs path-dependent metadata instead of merging
//! it, and after an unconditional transfer it discards the stack outright.
//! Consumers accept both false positives and negatives in exchange for O(n)
//! cost; the dataflow engine is the precise alternative.

use std::collections::HashMap;

use crate::{
    analysis::{
        dataflow::Frame,
        stack::item::{Item, ItemFlags},
    },
    bytecode::{ArithOp, ClassRef, Const, Instruction, MethodBody, Op, ValueKind},
};

/// The simulator state: an operand stack and local array of [`Item`]s,
/// advanced one instruction at a time with [`execute`](OpcodeStack::execute).
///
/// Instructions must be fed in program order; the pc-indexed join and
/// handler tables are precomputed from the method at construction.
#[derive(Debug)]
pub struct OpcodeStack {
    frame: Frame<Item>,
    /// Count of jump edges landing on each pc.
    jump_targets: HashMap<u32, u32>,
    /// Exception-handler entry pcs and their catch types.
    handlers: HashMap<u32, Option<ClassRef>>,
    /// Whether the previous instruction can fall through to the next.
    fell_through: bool,
}

impl OpcodeStack {
    /// Creates a simulator for one method, positioned before its first
    /// instruction.
    #[must_use]
    pub fn new(method: &MethodBody) -> Self {
        let mut jump_targets: HashMap<u32, u32> = HashMap::new();
        let mut targets = Vec::new();
        for insn in method.instructions() {
            targets.clear();
            insn.branch_targets(&mut targets);
            for &pc in &targets {
                *jump_targets.entry(pc).or_insert(0) += 1;
            }
        }
        let handlers = method
            .exception_table()
            .iter()
            .map(|h| (h.handler_pc, h.catch_type.clone()))
            .collect();

        Self {
            frame: Frame::new(method.max_locals(), Item::unknown()),
            jump_targets,
            handlers,
            fell_through: true,
        }
    }

    /// Returns the current operand-stack depth in slots.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.frame.stack_depth()
    }

    /// Returns the item `depth` slots below the top (`item_at(0)` is the top).
    #[must_use]
    pub fn item_at(&self, depth: usize) -> Option<&Item> {
        self.frame.peek(depth)
    }

    /// Returns the item in a local slot.
    #[must_use]
    pub fn local(&self, slot: u16) -> Option<&Item> {
        self.frame.local(slot)
    }

    /// Runs the simulator over the whole method, snapshotting the state
    /// after every instruction.
    #[must_use]
    pub fn scan(method: &MethodBody) -> StackScan {
        let mut stack = OpcodeStack::new(method);
        let mut after = Vec::with_capacity(method.len());
        for insn in method.instructions() {
            stack.execute(insn);
            after.push(stack.frame.clone());
        }
        StackScan { after }
    }

    /// Advances the simulation by one instruction.
    pub fn execute(&mut self, insn: &Instruction) {
        self.arrive_at(insn.pc);
        self.transfer(insn);
        self.fell_through = !insn.is_unconditional_transfer();
    }

    /// Adjusts state for how control reaches `pc` before transferring.
    fn arrive_at(&mut self, pc: u32) {
        if let Some(catch_type) = self.handlers.get(&pc) {
            // The JVM discards the stack and pushes the thrown reference.
            self.frame.clear_stack();
            let descriptor = catch_type
                .as_ref()
                .map_or_else(|| "Ljava/lang/Throwable;".to_string(), |c| format!("L{c};"));
            let mut thrown = Item::with_signature(descriptor, pc);
            thrown.add_flags(ItemFlags::EXCEPTION);
            self.frame.push(thrown);
            self.fell_through = true;
            return;
        }

        let jumped_to = self.jump_targets.get(&pc).copied().unwrap_or(0) > 0;
        if !self.fell_through {
            // Only a jump (whose state we did not track) reaches here.
            self.frame.clear_stack();
            self.scrub_all();
        } else if jumped_to {
            // Fall-through and at least one jump merge here; per-path
            // metadata cannot be trusted.
            self.scrub_all();
        }
    }

    fn scrub_all(&mut self) {
        let stack: Vec<Item> = self
            .frame
            .stack()
            .iter()
            .map(|item| {
                let mut copy = item.clone();
                copy.scrub();
                copy
            })
            .collect();
        self.frame.clear_stack();
        for item in stack {
            self.frame.push(item);
        }
        for slot in 0..self.frame.locals().len() {
            let slot = slot as u16;
            if let Some(item) = self.frame.local(slot) {
                let mut copy = item.clone();
                copy.scrub();
                self.frame.set_local(slot, copy);
            }
        }
    }

    fn push_value(&mut self, item: Item, wide: bool) {
        self.frame.push(item);
        if wide {
            self.frame.push(Item::wide_upper());
        }
    }

    fn transfer(&mut self, insn: &Instruction) {
        let pc = insn.pc;
        match &insn.op {
            Op::Const(c) => {
                let wide = c.kind().is_wide();
                self.push_value(Item::with_constant(c.clone(), pc), wide);
            }
            Op::Load { kind, slot } => {
                let mut item = self
                    .frame
                    .local(*slot)
                    .cloned()
                    .unwrap_or_else(Item::unknown);
                item.set_register(*slot);
                self.push_value(item, kind.is_wide());
            }
            Op::Store { kind, slot } => {
                if kind.is_wide() {
                    self.frame.pop_n(1);
                    let item = self.frame.pop().unwrap_or_else(Item::unknown);
                    self.frame.set_local(*slot, item);
                    self.frame.set_local(slot + 1, Item::wide_upper());
                } else {
                    let item = self.frame.pop().unwrap_or_else(Item::unknown);
                    self.frame.set_local(*slot, item);
                }
            }
            Op::Stack(op) => {
                // The permutation copies items whole, provenance included.
                self.frame.apply_stack_op(*op);
            }
            Op::GetStatic(field) => {
                let wide = field_is_wide(&field.descriptor);
                self.push_value(Item::from_static_field(field.clone(), pc), wide);
            }
            Op::GetField(field) => {
                let receiver = self.frame.pop().unwrap_or_else(Item::unknown);
                let wide = field_is_wide(&field.descriptor);
                self.push_value(
                    Item::from_instance_field(field.clone(), receiver.register(), pc),
                    wide,
                );
            }
            Op::Invoke { method, .. } => {
                self.frame.pop_n(insn.op.stack_slots_consumed());
                if method.returns_value() {
                    let wide = field_is_wide(method.return_descriptor());
                    self.push_value(Item::returned_by(method.clone(), pc), wide);
                }
            }
            Op::Arith { kind, op } => self.transfer_arith(*kind, *op, insn, pc),
            Op::Iinc { slot, delta } => {
                let item = match self.frame.local(*slot).and_then(Item::constant_int) {
                    Some(n) => Item::with_constant(Const::Int(n.wrapping_add(i32::from(*delta))), pc),
                    None => Item::with_signature("I", pc),
                };
                self.frame.set_local(*slot, item);
            }
            Op::ArrayLength => {
                self.frame.pop_n(1);
                let mut item = Item::with_signature("I", pc);
                item.add_flags(ItemFlags::ARRAY_LENGTH | ItemFlags::NON_NEGATIVE);
                self.frame.push(item);
            }
            Op::New(class) => {
                let mut item = Item::with_signature(format!("L{class};"), pc);
                item.add_flags(ItemFlags::NEWLY_ALLOCATED);
                self.frame.push(item);
            }
            Op::NewArray { element, dims } => {
                self.frame.pop_n(usize::from(*dims));
                let mut descriptor = "[".repeat(usize::from(*dims));
                descriptor.push_str(element);
                let mut item = Item::with_signature(descriptor, pc);
                item.add_flags(ItemFlags::NEWLY_ALLOCATED | ItemFlags::NON_NEGATIVE);
                self.frame.push(item);
            }
            Op::CheckCast(class) => {
                if let Some(top) = self.frame.top() {
                    let mut item = top.clone();
                    item.set_signature(format!("L{class};"));
                    self.frame.set_top(item);
                }
            }
            op => {
                let produced = op.stack_slots_produced();
                self.frame.pop_n(op.stack_slots_consumed());
                for _ in 0..produced {
                    self.frame.push(Item::unknown());
                }
            }
        }
    }

    /// Arithmetic clears provenance but folds int constants where both
    /// operands are known.
    fn transfer_arith(&mut self, kind: ValueKind, op: ArithOp, insn: &Instruction, pc: u32) {
        let folded = if kind == ValueKind::Int && !op.is_unary() {
            let b = self.frame.peek(0).and_then(Item::constant_int);
            let a = self.frame.peek(1).and_then(Item::constant_int);
            match (a, b) {
                (Some(a), Some(b)) => fold_int(op, a, b),
                _ => None,
            }
        } else if kind == ValueKind::Int && op == ArithOp::Neg {
            self.frame
                .peek(0)
                .and_then(Item::constant_int)
                .map(i32::wrapping_neg)
        } else {
            None
        };

        self.frame.pop_n(insn.op.stack_slots_consumed());
        match folded {
            Some(value) => self.frame.push(Item::with_constant(Const::Int(value), pc)),
            None => {
                let mut item = Item::with_signature(kind.descriptor(), pc);
                item.add_flags(ItemFlags::ARITHMETIC);
                self.push_value(item, kind.is_wide());
            }
        }
    }
}

/// Per-instruction snapshots from [`OpcodeStack::scan`].
#[derive(Debug)]
pub struct StackScan {
    after: Vec<Frame<Item>>,
}

impl StackScan {
    /// Returns the simulator state after the instruction at `index` (the
    /// position in the method's instruction stream).
    #[must_use]
    pub fn after(&self, index: usize) -> Option<&Frame<Item>> {
        self.after.get(index)
    }

    /// Returns the number of snapshots (one per instruction).
    #[must_use]
    pub fn len(&self) -> usize {
        self.after.len()
    }

    /// Returns `true` if the scan covered no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.after.is_empty()
    }
}

fn field_is_wide(descriptor: &str) -> bool {
    crate::bytecode::descriptor_slot_width(descriptor) == 2
}

fn fold_int(op: ArithOp, a: i32, b: i32) -> Option<i32> {
    match op {
        ArithOp::Add => Some(a.wrapping_add(b)),
        ArithOp::Sub => Some(a.wrapping_sub(b)),
        ArithOp::Mul => Some(a.wrapping_mul(b)),
        ArithOp::And => Some(a & b),
        ArithOp::Or => Some(a | b),
        ArithOp::Xor => Some(a ^ b),
        // Division folds would need the zero check; not worth modelling.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::asm::{self, MethodBuilder};

    #[test]
    fn dup_copies_field_provenance() {
        let method = MethodBuilder::new_static(1)
            .getstatic("com/example/C", "count", "I")
            .dup()
            .return_()
            .finish();
        let scan = OpcodeStack::scan(&method);

        let after_dup = scan.after(1).expect("snapshot");
        let top = after_dup.peek(0).expect("top");
        let below = after_dup.peek(1).expect("below");
        assert_eq!(top.field(), below.field());
        assert!(top.field().is_some_and(|f| f.name == "count"));
    }

    #[test]
    fn constants_fold_through_arithmetic() {
        let method = MethodBuilder::new_static(1)
            .iconst(2)
            .iconst(3)
            .iadd()
            .ireturn()
            .finish();
        let scan = OpcodeStack::scan(&method);

        let after_add = scan.after(2).expect("snapshot");
        assert_eq!(after_add.peek(0).and_then(Item::constant_int), Some(5));
    }

    #[test]
    fn loads_track_their_register() {
        let method = MethodBuilder::new_static(2)
            .aload(1)
            .return_()
            .finish();
        let scan = OpcodeStack::scan(&method);

        let item = scan.after(0).and_then(|f| f.peek(0)).expect("top");
        assert_eq!(item.register(), Some(1));
    }

    #[test]
    fn calls_tag_their_return_value() {
        let method = MethodBuilder::new_static(1)
            .invokestatic("com/example/C", "size", "()I")
            .ireturn()
            .finish();
        let scan = OpcodeStack::scan(&method);

        let item = scan.after(0).and_then(|f| f.peek(0)).expect("top");
        assert_eq!(item.return_of().map(|m| m.name.as_str()), Some("size"));
        assert_eq!(item.signature(), Some("I"));
    }

    #[test]
    fn merge_point_scrubs_provenance() {
        //   getstatic C.f I
        //   dup
        //   ifeq "join"
        //   nop
        // join:
        //   nop          <- reached by fall-through and jump
        //   return
        let method = MethodBuilder::new_static(1)
            .getstatic("com/example/C", "f", "I")
            .dup()
            .ifeq("join")
            .nop()
            .label("join")
            .nop()
            .return_()
            .finish();
        let scan = OpcodeStack::scan(&method);

        // Before the join the field provenance is intact.
        let before = scan.after(3).and_then(|f| f.peek(0)).expect("top");
        assert!(before.field().is_some());
        // At the join it is scrubbed; the signature survives.
        let after = scan.after(4).and_then(|f| f.peek(0)).expect("top");
        assert!(after.field().is_none());
        assert_eq!(after.signature(), Some("I"));
    }

    #[test]
    fn handler_entry_carries_the_thrown_reference() {
        let method = asm::try_catch_method();
        let scan = OpcodeStack::scan(&method);

        // Instruction 3 is the handler's astore; the stored item is the
        // thrown reference.
        let local = scan.after(3).and_then(|f| f.local(1)).expect("local 1");
        assert!(local.flags().contains(ItemFlags::EXCEPTION));
        assert_eq!(local.signature(), Some("Ljava/lang/Exception;"));
    }

    #[test]
    fn jump_target_after_unconditional_transfer_starts_clean() {
        let method = MethodBuilder::new_static(1)
            .iconst(1)
            .goto_("end")
            .label("end")
            .return_()
            .finish();
        let mut stack = OpcodeStack::new(&method);
        for insn in method.instructions() {
            stack.execute(insn);
        }
        // The target is reachable only by jump; the simulator never carries
        // a stack across one, so the pending constant is gone.
        assert_eq!(stack.stack_depth(), 0);
    }
}
