//! Fixture method bodies assembled through the public API.
#![allow(dead_code)] // not every test binary uses every fixture

use jvmscope::prelude::*;

/// One pc per instruction keeps locations easy to address in assertions.
pub fn body(ops: Vec<Op>, max_locals: u16, is_static: bool) -> MethodBody {
    let instructions = ops
        .into_iter()
        .enumerate()
        .map(|(idx, op)| Instruction::new(idx as u32, op))
        .collect();
    MethodBody::new(instructions, Vec::new(), max_locals, is_static, Vec::new())
        .expect("fixture body")
}

/// `if (cond) { synchronized(local 1) { nop; } } nop; return;`
///
/// ```text
/// 0: iload 0
/// 1: ifeq 7
/// 2: aload 1
/// 3: monitorenter
/// 4: nop            <- inside the synchronized region
/// 5: aload 1
/// 6: monitorexit
/// 7: nop            <- after the join
/// 8: return
/// ```
pub fn conditional_synchronized() -> MethodBody {
    body(
        vec![
            Op::Load { kind: ValueKind::Int, slot: 0 },
            Op::Branch { cond: Cond::Eq, target: 7 },
            Op::Load { kind: ValueKind::Ref, slot: 1 },
            Op::MonitorEnter,
            Op::Nop,
            Op::Load { kind: ValueKind::Ref, slot: 1 },
            Op::MonitorExit,
            Op::Nop,
            Op::Return { kind: None },
        ],
        2,
        true,
    )
}

/// `Object o = maybeNull(); if (o != null) { o.foo(); }`
///
/// ```text
/// 0: invokestatic C.maybeNull()Ljava/lang/Object;
/// 1: astore 1
/// 2: aload 1
/// 3: ifnull 6
/// 4: aload 1
/// 5: invokevirtual Object.foo()V    <- narrowed call site
/// 6: return
/// ```
pub fn null_checked_call() -> MethodBody {
    body(
        vec![
            Op::Invoke {
                kind: InvokeKind::Static,
                method: MethodRef::new("com/example/C", "maybeNull", "()Ljava/lang/Object;"),
            },
            Op::Store { kind: ValueKind::Ref, slot: 1 },
            Op::Load { kind: ValueKind::Ref, slot: 1 },
            Op::Branch { cond: Cond::IsNull, target: 6 },
            Op::Load { kind: ValueKind::Ref, slot: 1 },
            Op::Invoke {
                kind: InvokeKind::Virtual,
                method: MethodRef::new("java/lang/Object", "foo", "()V"),
            },
            Op::Return { kind: None },
        ],
        2,
        true,
    )
}

/// A throw followed by instructions nothing can reach.
///
/// ```text
/// 0: aconst_null
/// 1: athrow
/// 2: nop            <- unreachable
/// 3: return
/// ```
pub fn code_after_throw() -> MethodBody {
    body(
        vec![
            Op::Const(Const::Null),
            Op::Throw,
            Op::Nop,
            Op::Return { kind: None },
        ],
        1,
        true,
    )
}

/// A diamond over an int condition, no exceptions anywhere.
///
/// ```text
/// 0: iload 0
/// 1: ifeq 5
/// 2: iconst 1
/// 3: istore 1
/// 4: goto 7
/// 5: iconst 2
/// 6: istore 1
/// 7: iload 1
/// 8: ireturn
/// ```
pub fn diamond() -> MethodBody {
    body(
        vec![
            Op::Load { kind: ValueKind::Int, slot: 0 },
            Op::Branch { cond: Cond::Eq, target: 5 },
            Op::Const(Const::Int(1)),
            Op::Store { kind: ValueKind::Int, slot: 1 },
            Op::Goto { target: 7 },
            Op::Const(Const::Int(2)),
            Op::Store { kind: ValueKind::Int, slot: 1 },
            Op::Load { kind: ValueKind::Int, slot: 1 },
            Op::Return { kind: Some(ValueKind::Int) },
        ],
        2,
        true,
    )
}

/// The unsynchronized lazy-init idiom the pattern scenario targets.
///
/// ```text
/// 0: getstatic C.instance
/// 1: ifnonnull 4
/// 2: new C
/// 3: putstatic C.instance
/// 4: return
/// ```
pub fn lazy_init() -> MethodBody {
    let field = || FieldRef::new("com/example/C", "instance", "Lcom/example/C;");
    body(
        vec![
            Op::GetStatic(field()),
            Op::Branch { cond: Cond::NonNull, target: 4 },
            Op::New(ClassRef::new("com/example/C")),
            Op::PutStatic(field()),
            Op::Return { kind: None },
        ],
        0,
        true,
    )
}
