use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::{DashMap, mapref::entry::Entry};
use once_cell::sync::Lazy;
use tracing::debug;

use super::builder::Builder;
use super::command::Command;
use crate::error::{Result, TransformError};

/// A schema-authoring function together with the stable name it is
/// registered under. Build rules with [`rule!`](crate::rule).
#[derive(Clone, Copy)]
pub struct Rule {
    name: &'static str,
    build: fn(&mut Builder),
}

impl Rule {
    pub const fn new(name: &'static str, build: fn(&mut Builder)) -> Self {
        Self { name, build }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Rule {}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({})", self.name)
    }
}

/// Wrap a rule function under a name derived from its module path.
#[macro_export]
macro_rules! rule {
    ($f:ident) => {
        $crate::engine::Rule::new(concat!(module_path!(), "::", stringify!($f)), $f)
    };
}

#[derive(Debug, Clone)]
enum Slot {
    /// Compilation in progress on the given thread; `Call`s to it are
    /// recorded but not resolvable yet.
    Reserved(ThreadId),
    Ready(Arc<[Command]>),
    Failed(TransformError),
}

/// Observable lifecycle of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    Reserved,
    Ready,
    Failed,
}

/// Compile-once table from rule name to compiled commands. Entries are
/// never removed.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: DashMap<&'static str, Slot>,
}

static SHARED: Lazy<Arc<RuleRegistry>> = Lazy::new(|| Arc::new(RuleRegistry::new()));

impl RuleRegistry {
    pub fn new() -> Self {
        Self { rules: DashMap::new() }
    }

    /// Process-wide registry, for amortising compilation across many engines.
    pub fn shared() -> Arc<RuleRegistry> {
        SHARED.clone()
    }

    /// Compile `rule` unless an entry for it already exists. The slot is
    /// reserved before the rule body runs, so self-referencing rules see
    /// the reservation instead of recursing.
    pub fn compile(&self, rule: Rule) -> Result<()> {
        if rule.name.is_empty() {
            return Err(TransformError::registry("call() can only be used with named rules"));
        }
        let reserved = match self.rules.entry(rule.name) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Reserved(thread::current().id()));
                true
            }
            Entry::Occupied(occupied) => match occupied.get() {
                Slot::Failed(err) => return Err(err.clone()),
                _ => false,
            },
        };
        if !reserved {
            return Ok(());
        }

        debug!(rule = rule.name, "building rule");
        let mut guard = Reservation {
            registry: self,
            name: rule.name,
            armed: true,
        };
        let mut builder = Builder::new(self);
        (rule.build)(&mut builder);
        guard.armed = false;
        match builder.finish() {
            Ok(commands) => {
                self.rules.insert(rule.name, Slot::Ready(Arc::from(commands)));
                Ok(())
            }
            Err(err) => {
                let err = err.with_path(|| rule.name.to_string());
                self.rules.insert(rule.name, Slot::Failed(err.clone()));
                Err(err)
            }
        }
    }

    /// Compiled commands for `name`. Waits while another thread is still
    /// building the rule; `compile` never blocks, so that thread finishes.
    pub fn get(&self, name: &str) -> Result<Arc<[Command]>> {
        loop {
            match self.rules.get(name).map(|slot| slot.value().clone()) {
                Some(Slot::Ready(commands)) => return Ok(commands),
                Some(Slot::Reserved(owner)) if owner == thread::current().id() => {
                    return Err(TransformError::registry(format!("rule {} is still being compiled", name)));
                }
                Some(Slot::Reserved(_)) => thread::yield_now(),
                Some(Slot::Failed(err)) => return Err(err),
                None => return Err(TransformError::registry(format!("rule {} was never compiled", name))),
            }
        }
    }

    pub fn status(&self, name: &str) -> Option<RuleStatus> {
        self.rules.get(name).map(|slot| match slot.value() {
            Slot::Reserved(_) => RuleStatus::Reserved,
            Slot::Ready(_) => RuleStatus::Ready,
            Slot::Failed(_) => RuleStatus::Failed,
        })
    }

    /// Registered rule names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.rules.iter().map(|entry| *entry.key()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Marks a reservation failed if its rule body unwinds, so waiting readers
/// do not spin on it forever.
struct Reservation<'a> {
    registry: &'a RuleRegistry,
    name: &'static str,
    armed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            let err = TransformError::registry(format!("rule {} panicked while building", self.name));
            self.registry.rules.insert(self.name, Slot::Failed(err));
        }
    }
}
