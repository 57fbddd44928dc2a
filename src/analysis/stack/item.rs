//! The per-slot record the operand-stack simulator tracks.

use bitflags::bitflags;

use crate::bytecode::{Const, FieldRef, MethodRef};

bitflags! {
    /// Advisory facts about a simulated value. These are hints, not proofs:
    /// the simulator trades precision for a single linear pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ItemFlags: u8 {
        /// Produced by `new`/`newarray`; cannot alias an existing object.
        const NEWLY_ALLOCATED = 1 << 0;
        /// Result of an arithmetic or logic opcode.
        const ARITHMETIC = 1 << 1;
        /// Result of `arraylength`.
        const ARRAY_LENGTH = 1 << 2;
        /// Known to be >= 0 (array lengths, non-negative constants).
        const NON_NEGATIVE = 1 << 3;
        /// The thrown reference at an exception-handler entry.
        const EXCEPTION = 1 << 4;
    }
}

/// One simulated stack or local slot: an optional constant, an optional
/// type signature, and the provenance of the value if the simulator could
/// keep it.
///
/// Provenance fields are cleared, never guessed, whenever control-flow
/// merges make them unreliable. The upper slot of a category-2 value holds
/// [`Item::wide_upper`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Item {
    constant: Option<Const>,
    signature: Option<String>,
    field: Option<FieldRef>,
    /// For `getfield` results, the local slot the receiver was loaded from.
    field_receiver: Option<u16>,
    /// The local slot this value was loaded from, if any.
    register: Option<u16>,
    /// The return value of this call, if any.
    returned_by: Option<MethodRef>,
    /// The pc of the producing instruction, if tracked.
    produced_at: Option<u32>,
    flags: ItemFlags,
}

impl Item {
    /// An item carrying no information.
    #[must_use]
    pub fn unknown() -> Self {
        Item::default()
    }

    /// The filler occupying the upper slot of a long/double value.
    #[must_use]
    pub fn wide_upper() -> Self {
        Item::default()
    }

    /// An item holding a known constant.
    #[must_use]
    pub fn with_constant(constant: Const, pc: u32) -> Self {
        let mut flags = ItemFlags::empty();
        if matches!(constant, Const::Int(n) if n >= 0) {
            flags |= ItemFlags::NON_NEGATIVE;
        }
        Item {
            signature: Some(constant.kind().descriptor().to_string()),
            constant: Some(constant),
            produced_at: Some(pc),
            flags,
            ..Item::default()
        }
    }

    /// A value loaded from a static field.
    #[must_use]
    pub fn from_static_field(field: FieldRef, pc: u32) -> Self {
        Item {
            signature: Some(field.descriptor.clone()),
            field: Some(field),
            produced_at: Some(pc),
            ..Item::default()
        }
    }

    /// A value loaded from an instance field of the object in `receiver`
    /// (the local slot the receiver came from, when known).
    #[must_use]
    pub fn from_instance_field(field: FieldRef, receiver: Option<u16>, pc: u32) -> Self {
        Item {
            signature: Some(field.descriptor.clone()),
            field: Some(field),
            field_receiver: receiver,
            produced_at: Some(pc),
            ..Item::default()
        }
    }

    /// The return value of a call.
    #[must_use]
    pub fn returned_by(method: MethodRef, pc: u32) -> Self {
        Item {
            signature: Some(method.return_descriptor().to_string()),
            returned_by: Some(method),
            produced_at: Some(pc),
            ..Item::default()
        }
    }

    /// A value of known signature but no provenance.
    #[must_use]
    pub fn with_signature(signature: impl Into<String>, pc: u32) -> Self {
        Item {
            signature: Some(signature.into()),
            produced_at: Some(pc),
            ..Item::default()
        }
    }

    /// Returns the known constant, if any.
    #[must_use]
    pub fn constant(&self) -> Option<&Const> {
        self.constant.as_ref()
    }

    /// Returns the known int constant, if any.
    #[must_use]
    pub fn constant_int(&self) -> Option<i32> {
        match self.constant {
            Some(Const::Int(n)) => Some(n),
            _ => None,
        }
    }

    /// Returns the type signature, if known.
    #[must_use]
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// Returns the field this value was loaded from, if tracked.
    #[must_use]
    pub fn field(&self) -> Option<&FieldRef> {
        self.field.as_ref()
    }

    /// Returns the receiver's local slot for a `getfield` result.
    #[must_use]
    pub fn field_receiver(&self) -> Option<u16> {
        self.field_receiver
    }

    /// Returns the local slot this value was loaded from, if tracked.
    #[must_use]
    pub fn register(&self) -> Option<u16> {
        self.register
    }

    /// Returns the called method whose return value this is, if tracked.
    #[must_use]
    pub fn return_of(&self) -> Option<&MethodRef> {
        self.returned_by.as_ref()
    }

    /// Returns the pc of the producing instruction, if tracked.
    #[must_use]
    pub fn produced_at(&self) -> Option<u32> {
        self.produced_at
    }

    /// Returns the advisory flags.
    #[must_use]
    pub fn flags(&self) -> ItemFlags {
        self.flags
    }

    /// Returns `true` if this is the null constant.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.constant, Some(Const::Null))
    }

    pub(crate) fn set_register(&mut self, slot: u16) {
        self.register = Some(slot);
    }

    pub(crate) fn set_signature(&mut self, signature: String) {
        self.signature = Some(signature);
    }

    pub(crate) fn add_flags(&mut self, flags: ItemFlags) {
        self.flags |= flags;
    }

    /// Drops everything computed along a single path: constants, provenance
    /// and flags. The signature survives a merge only because both paths
    /// agreed on the slot layout; everything else is path-dependent.
    pub(crate) fn scrub(&mut self) {
        let signature = self.signature.take();
        *self = Item {
            signature,
            ..Item::default()
        };
    }
}
