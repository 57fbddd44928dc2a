//! Declarative bytecode pattern matching.
//!
//! A [`Pattern`] is an ordered list of [`Step`]s matched against the
//! method's locations in program order. Matching is attempted from every
//! candidate start location; a wildcard step consumes a bounded run of
//! instructions; a binding conflict or a violated dominance constraint
//! aborts that candidate. Before any per-location work, the method is
//! filtered by the [`Prescreen`]: every concrete opcode class the pattern
//! names must occur somewhere in the method, an O(n) check that is the
//! matcher's documented performance contract.

use std::collections::HashMap;

use crate::{
    analysis::{
        cfg::{Cfg, DominatorInfo, Location},
        pattern::element::{bound_value, BoundValue, OpClass, PatternElement, Step},
    },
    bytecode::MethodBody,
};

/// A compiled pattern, built step by step.
///
/// # Examples
///
/// ```rust,ignore
/// // The unsynchronized lazy-init shape:
/// //   getstatic f; ifnonnull done; ...; putstatic f
/// let pattern = Pattern::new()
///     .op(OpClass::GetStatic).bind("f")
///     .op(OpClass::NullTest).labeled("test")
///     .wild(1, 8)
///     .op(OpClass::PutStatic).bind("f").dominated_by("test");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    steps: Vec<Step>,
}

impl Pattern {
    /// Creates an empty pattern.
    #[must_use]
    pub fn new() -> Self {
        Pattern::default()
    }

    /// Appends a concrete element matching one instruction of `op_class`.
    #[must_use]
    pub fn op(mut self, op_class: OpClass) -> Self {
        self.steps.push(Step::Op(PatternElement::new(op_class)));
        self
    }

    /// Binds the identity of the last appended element to `name`.
    ///
    /// Two bindings of the same name must match identical values or the
    /// candidate is abandoned.
    #[must_use]
    pub fn bind(mut self, name: &str) -> Self {
        if let Some(Step::Op(element)) = self.steps.last_mut() {
            element.bind = Some(name.to_string());
        }
        self
    }

    /// Labels the last appended element for later dominance references.
    #[must_use]
    pub fn labeled(mut self, name: &str) -> Self {
        if let Some(Step::Op(element)) = self.steps.last_mut() {
            element.label = Some(name.to_string());
        }
        self
    }

    /// Requires the last appended element's block to be dominated by the
    /// block of the element labelled `label`.
    #[must_use]
    pub fn dominated_by(mut self, label: &str) -> Self {
        if let Some(Step::Op(element)) = self.steps.last_mut() {
            element.dominated_by = Some(label.to_string());
        }
        self
    }

    /// Appends a wildcard consuming between `min` and `max` instructions.
    #[must_use]
    pub fn wild(mut self, min: usize, max: usize) -> Self {
        self.steps.push(Step::Wild { min, max });
        self
    }

    /// Returns the steps.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the prescreen for this pattern.
    #[must_use]
    pub fn prescreen(&self) -> Prescreen {
        let required = self
            .steps
            .iter()
            .filter_map(|step| match step {
                Step::Op(element) => Some(element.op_class),
                Step::Wild { .. } => None,
            })
            .collect();
        Prescreen { required }
    }
}

/// The cheap opcode-class presence filter run before matching.
#[derive(Debug, Clone)]
pub struct Prescreen {
    required: Vec<OpClass>,
}

impl Prescreen {
    /// Returns `true` if every required opcode class occurs in the method.
    #[must_use]
    pub fn passes(&self, method: &MethodBody) -> bool {
        self.required.iter().all(|&class| {
            method
                .instructions()
                .iter()
                .any(|insn| class.matches(&insn.op))
        })
    }
}

/// One completed pattern match: the matched locations (concrete elements
/// only, in step order) and the variable bindings.
#[derive(Debug, Clone)]
pub struct Match {
    /// Location of each matched concrete element, in pattern order.
    pub locations: Vec<Location>,
    /// Variable bindings established by `bind` elements.
    pub bindings: HashMap<String, BoundValue>,
}

impl Match {
    /// Returns the binding for a variable, if the pattern bound it.
    #[must_use]
    pub fn binding(&self, name: &str) -> Option<&BoundValue> {
        self.bindings.get(name)
    }
}

/// Matches patterns against one method's CFG.
pub struct PatternMatcher<'a> {
    cfg: &'a Cfg,
    dominators: &'a DominatorInfo,
    locations: Vec<Location>,
}

impl<'a> PatternMatcher<'a> {
    /// Creates a matcher over a CFG and its dominator relation.
    #[must_use]
    pub fn new(cfg: &'a Cfg, dominators: &'a DominatorInfo) -> Self {
        Self {
            cfg,
            dominators,
            locations: cfg.locations().collect(),
        }
    }

    /// Finds every match of `pattern`, in program order of the start
    /// location. Returns no matches when the prescreen rejects the method.
    #[must_use]
    pub fn find(&self, pattern: &Pattern) -> Vec<Match> {
        if pattern.steps().is_empty() || !pattern.prescreen().passes(self.cfg.method()) {
            return Vec::new();
        }

        let mut matches = Vec::new();
        for start in 0..self.locations.len() {
            let mut state = Candidate {
                locations: Vec::new(),
                bindings: HashMap::new(),
                labelled: HashMap::new(),
            };
            if self.try_match(pattern.steps(), 0, start, &mut state) {
                matches.push(Match {
                    locations: state.locations,
                    bindings: state.bindings,
                });
            }
        }
        matches
    }

    /// Attempts steps `step_idx..` starting at location index `loc_idx`.
    fn try_match(
        &self,
        steps: &[Step],
        step_idx: usize,
        loc_idx: usize,
        state: &mut Candidate,
    ) -> bool {
        let Some(step) = steps.get(step_idx) else {
            return true;
        };
        match step {
            Step::Op(element) => {
                let Some(&location) = self.locations.get(loc_idx) else {
                    return false;
                };
                if !self.element_matches(element, location, state) {
                    return false;
                }
                let bind_added = self.record(element, location, state);
                if self.try_match(steps, step_idx + 1, loc_idx + 1, state) {
                    return true;
                }
                self.unrecord(element, bind_added, state);
                false
            }
            Step::Wild { min, max } => {
                for consumed in *min..=*max {
                    if loc_idx + consumed > self.locations.len() {
                        break;
                    }
                    if self.try_match(steps, step_idx + 1, loc_idx + consumed, state) {
                        return true;
                    }
                }
                false
            }
        }
    }

    fn element_matches(
        &self,
        element: &PatternElement,
        location: Location,
        state: &Candidate,
    ) -> bool {
        let Some(insn) = self.cfg.instruction_at(location) else {
            return false;
        };
        if !element.op_class.matches(&insn.op) {
            return false;
        }
        if let Some(name) = &element.bind {
            match (bound_value(&insn.op), state.bindings.get(name)) {
                // A rebinding must agree with the existing value.
                (Some(value), Some(existing)) if &value != existing => return false,
                (None, _) => return false,
                _ => {}
            }
        }
        if let Some(label) = &element.dominated_by {
            let Some(&dominator) = state.labelled.get(label) else {
                return false;
            };
            if !self.dominators.dominates(dominator.block, location.block) {
                return false;
            }
        }
        true
    }

    /// Records bindings and labels; returns whether a new binding was added.
    fn record(&self, element: &PatternElement, location: Location, state: &mut Candidate) -> bool {
        state.locations.push(location);
        if let Some(label) = &element.label {
            state.labelled.insert(label.clone(), location);
        }
        if let Some(name) = &element.bind {
            if !state.bindings.contains_key(name) {
                if let Some(value) = self
                    .cfg
                    .instruction_at(location)
                    .and_then(|insn| bound_value(&insn.op))
                {
                    state.bindings.insert(name.clone(), value);
                    return true;
                }
            }
        }
        false
    }

    fn unrecord(&self, element: &PatternElement, bind_added: bool, state: &mut Candidate) {
        state.locations.pop();
        if let Some(label) = &element.label {
            state.labelled.remove(label);
        }
        if bind_added {
            if let Some(name) = &element.bind {
                state.bindings.remove(name);
            }
        }
    }
}

struct Candidate {
    locations: Vec<Location>,
    bindings: HashMap<String, BoundValue>,
    labelled: HashMap<String, Location>,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        analysis::cfg::build_cfg,
        test::asm::MethodBuilder,
    };

    fn matcher_parts(method: crate::bytecode::MethodBody) -> (Arc<Cfg>, DominatorInfo) {
        let cfg = Arc::new(build_cfg(Arc::new(method)).expect("CFG"));
        let dom = DominatorInfo::compute(&cfg);
        (cfg, dom)
    }

    fn lazy_init_pattern() -> Pattern {
        Pattern::new()
            .op(OpClass::GetStatic)
            .bind("f")
            .op(OpClass::NullTest)
            .labeled("test")
            .wild(1, 4)
            .op(OpClass::PutStatic)
            .bind("f")
            .dominated_by("test")
    }

    fn lazy_init_method() -> crate::bytecode::MethodBody {
        //   getstatic C.instance
        //   ifnonnull "done"
        //   new C
        //   putstatic C.instance
        // done:
        //   return
        MethodBuilder::new_static(0)
            .getstatic("com/example/C", "instance", "Lcom/example/C;")
            .ifnonnull("done")
            .new_object("com/example/C")
            .putstatic("com/example/C", "instance", "Lcom/example/C;")
            .label("done")
            .return_()
            .finish()
    }

    #[test]
    fn lazy_init_idiom_matches_once() {
        let (cfg, dom) = matcher_parts(lazy_init_method());
        let matches = PatternMatcher::new(&cfg, &dom).find(&lazy_init_pattern());

        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.locations.len(), 3);
        let Some(BoundValue::Field(field)) = m.binding("f") else {
            panic!("expected a field binding");
        };
        assert_eq!(field.name, "instance");
    }

    #[test]
    fn binding_conflict_aborts_the_candidate() {
        // The store goes to a different field, so "f" cannot rebind.
        let method = MethodBuilder::new_static(0)
            .getstatic("com/example/C", "instance", "Lcom/example/C;")
            .ifnonnull("done")
            .new_object("com/example/C")
            .putstatic("com/example/C", "other", "Lcom/example/C;")
            .label("done")
            .return_()
            .finish();
        let (cfg, dom) = matcher_parts(method);

        assert!(PatternMatcher::new(&cfg, &dom)
            .find(&lazy_init_pattern())
            .is_empty());
    }

    #[test]
    fn prescreen_rejects_without_scanning() {
        // No putstatic anywhere: the prescreen alone rejects.
        let method = MethodBuilder::new_static(0)
            .getstatic("com/example/C", "instance", "Lcom/example/C;")
            .ifnonnull("done")
            .nop()
            .label("done")
            .return_()
            .finish();
        let pattern = lazy_init_pattern();
        assert!(!pattern.prescreen().passes(&method));

        let (cfg, dom) = matcher_parts(method);
        assert!(PatternMatcher::new(&cfg, &dom).find(&pattern).is_empty());
    }

    #[test]
    fn dominance_constraint_rejects_unrelated_stores() {
        // The putstatic is on a path that jumps over the null test, so the
        // test's block does not dominate it.
        let method = MethodBuilder::new_static(1)
            .iload(0)
            .ifeq("store")
            .getstatic("com/example/C", "instance", "Lcom/example/C;")
            .ifnonnull("done")
            .nop()
            .goto_("done")
            .label("store")
            .new_object("com/example/C")
            .putstatic("com/example/C", "instance", "Lcom/example/C;")
            .label("done")
            .return_()
            .finish();
        let (cfg, dom) = matcher_parts(method);

        assert!(PatternMatcher::new(&cfg, &dom)
            .find(&lazy_init_pattern())
            .is_empty());
    }

    #[test]
    fn wildcard_respects_its_bounds() {
        // Five instructions between the test and the store; wild(1, 4)
        // cannot bridge them.
        let method = MethodBuilder::new_static(2)
            .getstatic("com/example/C", "instance", "Lcom/example/C;")
            .ifnonnull("done")
            .nop()
            .nop()
            .nop()
            .nop()
            .new_object("com/example/C")
            .putstatic("com/example/C", "instance", "Lcom/example/C;")
            .label("done")
            .return_()
            .finish();
        let (cfg, dom) = matcher_parts(method);

        assert!(PatternMatcher::new(&cfg, &dom)
            .find(&lazy_init_pattern())
            .is_empty());
    }
}
