//! Lexical environments with copy-on-extend semantics.
//!
//! An [`Environment`] maps names to shared mutable cells. There is no parent pointer:
//! extending an environment copies the parent's name → cell associations (the cells are
//! shared, never duplicated) and then adds the new bindings on top. As a result:
//!
//! - `set!` writes into a cell, so the change is seen through every environment holding
//!   that cell, including closures captured long before.
//! - `define` and parameter binding add entries to one map only, so a child never leaks
//!   names into its parent.
//! - A binding created in an enclosing scope after a closure was built is not visible in
//!   that closure, because the closure holds the association set as it was at capture time.
//!
//! The last point is observable and relied upon: it is not replaced by a parent-chain walk.
//!
//! Each entry remembers whether it was created in this environment or inherited from the
//! parent at extension time. `define` on a local name rebinds its cell in place, which is
//! what lets `(define f #f)` followed by `(define (f ...) ...)` build a self-recursive
//! closure. `define` on an inherited name shadows it with a fresh cell instead of writing
//! into the parent's.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::Error;
use crate::ast::{CellPairs, Value};

/// Shared mutable storage for one binding
pub type Cell = Rc<RefCell<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Local,
    Inherited,
}

#[derive(Clone)]
struct Binding {
    cell: Cell,
    origin: Origin,
}

/// Environment for variable bindings
///
/// Cloning is cheap: the association map is shared until one side defines a new name,
/// at which point that side takes its own copy.
#[derive(Clone, Default)]
pub struct Environment {
    bindings: Rc<HashMap<String, Binding>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Environment").field("names", &names).finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Look up the current value bound to `name`
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.bindings
            .get(name)
            .map(|binding| binding.cell.borrow().clone())
            .ok_or_else(|| Error::unbound_var("Getting an unbound variable", name))
    }

    /// Overwrite the value of an existing binding, returning the new value
    pub fn set(&self, name: &str, value: Value) -> Result<Value, Error> {
        let binding = self
            .bindings
            .get(name)
            .ok_or_else(|| Error::unbound_var("Setting an unbound variable", name))?;
        *binding.cell.borrow_mut() = value.clone();
        Ok(value)
    }

    /// Bind `name` in this environment; never fails
    pub fn define(&mut self, name: &str, value: Value) -> Value {
        if let Some(binding) = self.bindings.get(name)
            && binding.origin == Origin::Local
        {
            *binding.cell.borrow_mut() = value.clone();
            return value;
        }

        Rc::make_mut(&mut self.bindings).insert(
            name.to_owned(),
            Binding {
                cell: Rc::new(RefCell::new(value.clone())),
                origin: Origin::Local,
            },
        );
        value
    }

    /// Build a child environment: the parent's associations plus `bindings`, in order
    pub fn extend<I>(&self, bindings: I) -> Environment
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let inherited = self
            .bindings
            .iter()
            .map(|(name, binding)| {
                (
                    name.clone(),
                    Binding {
                        cell: Rc::clone(&binding.cell),
                        origin: Origin::Inherited,
                    },
                )
            })
            .collect();

        let mut child = Environment {
            bindings: Rc::new(inherited),
        };
        for (name, value) in bindings {
            child.define(&name, value);
        }
        log::debug!("extended environment ({} bindings)", child.bindings.len());
        child
    }

    /// Check whether `name` is bound
    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Get all bindings in this environment
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut result: Vec<_> = self
            .bindings
            .iter()
            .map(|(name, binding)| (name.clone(), binding.cell.borrow().clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Structural comparison: same names, and each pair of cells is either the same cell
    /// or holds equal values
    pub(crate) fn eq_tracked(&self, other: &Environment, seen: &mut CellPairs) -> bool {
        if Rc::ptr_eq(&self.bindings, &other.bindings) {
            return true;
        }
        if self.bindings.len() != other.bindings.len() {
            return false;
        }

        self.bindings.iter().all(|(name, mine)| {
            let Some(theirs) = other.bindings.get(name) else {
                return false;
            };
            if Rc::ptr_eq(&mine.cell, &theirs.cell) {
                return true;
            }
            let pair = (Rc::as_ptr(&mine.cell), Rc::as_ptr(&theirs.cell));
            if seen.contains(&pair) {
                return true;
            }
            seen.push(pair);
            mine.cell.borrow().eq_tracked(&theirs.cell.borrow(), seen)
        })
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.eq_tracked(other, &mut Vec::new())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    #[test]
    fn test_lookup_and_define() {
        let mut env = Environment::new();
        assert!(matches!(env.lookup("x"), Err(Error::UnboundVar { .. })));

        assert_eq!(env.define("x", val(1)), val(1));
        assert_eq!(env.lookup("x").unwrap(), val(1));

        // Redefinition replaces the value
        env.define("x", val(2));
        assert_eq!(env.lookup("x").unwrap(), val(2));
        assert!(env.is_bound("x"));
    }

    #[test]
    fn test_set_requires_existing_binding() {
        let env = Environment::new();
        let err = env.set("missing", val(1)).unwrap_err();
        assert_eq!(err.to_string(), "Setting an unbound variable: missing");
    }

    #[test]
    fn test_set_is_visible_through_shared_cells() {
        let mut parent = Environment::new();
        parent.define("counter", val(0));

        let child = parent.extend(vec![]);
        assert_eq!(child.set("counter", val(5)).unwrap(), val(5));

        assert_eq!(parent.lookup("counter").unwrap(), val(5));
        assert_eq!(child.lookup("counter").unwrap(), val(5));
    }

    #[test]
    fn test_child_definitions_do_not_leak() {
        let mut parent = Environment::new();
        parent.define("x", val(1));

        let mut child = parent.extend(vec![("y".to_owned(), val(2))]);
        child.define("z", val(3));
        // Shadowing an inherited name gets a fresh cell
        child.define("x", val(10));

        assert!(!parent.is_bound("y"));
        assert!(!parent.is_bound("z"));
        assert_eq!(parent.lookup("x").unwrap(), val(1));
        assert_eq!(child.lookup("x").unwrap(), val(10));
    }

    #[test]
    fn test_later_parent_bindings_are_invisible_to_child() {
        let mut parent = Environment::new();
        let child = parent.extend(vec![]);
        parent.define("late", val(1));

        assert!(parent.is_bound("late"));
        assert!(matches!(child.lookup("late"), Err(Error::UnboundVar { .. })));
    }

    #[test]
    fn test_extend_later_bindings_override_earlier() {
        let mut parent = Environment::new();
        parent.define("a", val("outer"));

        let child = parent.extend(vec![
            ("a".to_owned(), val(1)),
            ("b".to_owned(), val(2)),
            ("a".to_owned(), val(3)),
        ]);

        assert_eq!(child.lookup("a").unwrap(), val(3));
        assert_eq!(child.lookup("b").unwrap(), val(2));
        assert_eq!(parent.lookup("a").unwrap(), val("outer"));
    }

    #[test]
    fn test_define_rebinds_local_cell_for_captured_copies() {
        let mut env = Environment::new();
        env.define("f", val(false));
        let captured = env.clone();

        env.define("f", val(42));
        assert_eq!(captured.lookup("f").unwrap(), val(42));

        env.define("g", val(1));
        assert!(!captured.is_bound("g"));
    }

    #[test]
    fn test_get_all_bindings_sorted() {
        let mut env = Environment::new();
        env.define("b", val(2));
        env.define("a", val(1));
        let names: Vec<String> = env.get_all_bindings().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a".to_owned(), "b".to_owned()]);
    }
}
