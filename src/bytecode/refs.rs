//! Resolved constant-pool identities.
//!
//! The engine consumes an already-decoded instruction stream, so constant-pool
//! indices have been resolved into these identity types by the decoder. A
//! reference compares equal exactly when it names the same class member, which
//! is what the analyses (lock identification, pattern bindings, provenance
//! tracking) rely on.

use std::fmt;

/// A class identified by its JVM binary name, e.g. `java/lang/Object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef {
    /// The internal (slash-separated) binary name.
    pub name: String,
}

impl ClassRef {
    /// Creates a class reference from an internal binary name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A field identified by owning class, name and field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    /// The class declaring the field.
    pub class: ClassRef,
    /// The field name.
    pub name: String,
    /// The field descriptor, e.g. `Ljava/lang/String;` or `[I`.
    pub descriptor: String,
}

impl FieldRef {
    /// Creates a field reference.
    #[must_use]
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            class: ClassRef::new(class),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Returns `true` if the field holds a reference (object or array) value.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self.descriptor.as_bytes().first(), Some(b'L' | b'['))
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor)
    }
}

/// A method identified by owning class, name and method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef {
    /// The class declaring the method.
    pub class: ClassRef,
    /// The method name (`<init>` for constructors).
    pub name: String,
    /// The method descriptor, e.g. `(ILjava/lang/String;)V`.
    pub descriptor: String,
}

impl MethodRef {
    /// Creates a method reference.
    #[must_use]
    pub fn new(
        class: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            class: ClassRef::new(class),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    /// Returns the declared argument descriptors, in order.
    ///
    /// Returns an empty list when the descriptor is malformed; the decoder is
    /// expected to have validated descriptors, so this is a defensive bound
    /// rather than an error path.
    #[must_use]
    pub fn arg_types(&self) -> Vec<String> {
        parse_arg_descriptors(&self.descriptor).unwrap_or_default()
    }

    /// Returns the number of declared arguments (excluding any receiver).
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.arg_types().len()
    }

    /// Returns the return-type descriptor, e.g. `V` or `Ljava/lang/String;`.
    #[must_use]
    pub fn return_descriptor(&self) -> &str {
        match self.descriptor.rfind(')') {
            Some(idx) => &self.descriptor[idx + 1..],
            None => "V",
        }
    }

    /// Returns `true` if the method produces a value (non-`void` return type).
    #[must_use]
    pub fn returns_value(&self) -> bool {
        self.return_descriptor() != "V"
    }

    /// Returns the total operand-stack slot count of the declared arguments
    /// (category-2 arguments count as two slots; the receiver is excluded).
    #[must_use]
    pub fn arg_slot_width(&self) -> usize {
        self.arg_types()
            .iter()
            .map(|d| descriptor_slot_width(d))
            .sum()
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.class, self.name, self.descriptor)
    }
}

/// Returns the number of operand-stack slots a value of the given field
/// descriptor occupies: 2 for `J`/`D`, 0 for `V`, 1 otherwise.
#[must_use]
pub fn descriptor_slot_width(descriptor: &str) -> usize {
    match descriptor.as_bytes().first() {
        Some(b'J' | b'D') => 2,
        Some(b'V') | None => 0,
        _ => 1,
    }
}

/// Splits the argument portion of a method descriptor into individual
/// field descriptors. Returns `None` if the descriptor is malformed.
#[must_use]
pub fn parse_arg_descriptors(descriptor: &str) -> Option<Vec<String>> {
    let inner = descriptor.strip_prefix('(')?;
    let close = inner.find(')')?;
    let args = &inner[..close];

    let mut result = Vec::new();
    let bytes = args.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        let start = idx;
        while idx < bytes.len() && bytes[idx] == b'[' {
            idx += 1;
        }
        match bytes.get(idx)? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => idx += 1,
            b'L' => {
                let semi = args[idx..].find(';')?;
                idx += semi + 1;
            }
            _ => return None,
        }
        result.push(args[start..idx].to_string());
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_descriptor_parsing() {
        let args = parse_arg_descriptors("(IJLjava/lang/String;[[D)V").unwrap();
        assert_eq!(args, vec!["I", "J", "Ljava/lang/String;", "[[D"]);

        assert_eq!(parse_arg_descriptors("()V").unwrap(), Vec::<String>::new());
        assert!(parse_arg_descriptors("(Q)V").is_none());
        assert!(parse_arg_descriptors("I)V").is_none());
    }

    #[test]
    fn method_ref_return_type() {
        let m = MethodRef::new("java/util/List", "size", "()I");
        assert!(m.returns_value());
        assert_eq!(m.return_descriptor(), "I");

        let v = MethodRef::new("java/io/PrintStream", "println", "(Ljava/lang/String;)V");
        assert!(!v.returns_value());
        assert_eq!(v.arg_count(), 1);
    }

    #[test]
    fn slot_widths() {
        assert_eq!(descriptor_slot_width("J"), 2);
        assert_eq!(descriptor_slot_width("[J"), 1);
        assert_eq!(descriptor_slot_width("Ljava/lang/Long;"), 1);
        assert_eq!(descriptor_slot_width("V"), 0);

        let m = MethodRef::new("C", "m", "(IJLjava/lang/String;D)V");
        assert_eq!(m.arg_slot_width(), 6);
    }

    #[test]
    fn field_ref_reference_kinds() {
        assert!(FieldRef::new("C", "f", "Ljava/lang/Object;").is_reference());
        assert!(FieldRef::new("C", "f", "[I").is_reference());
        assert!(!FieldRef::new("C", "f", "I").is_reference());
    }
}
