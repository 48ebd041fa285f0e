use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::context::Context;
use super::registry::Rule;
use crate::error::Result;

/// Upper bound used by sentinel loops on load. The real end is a `Break`.
pub const SENTINEL_LOOP_BOUND: u64 = 999_999_999;

/// How a command addresses a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldRef {
    /// Key in the current document node.
    Literal(String),
    /// The active loop index, used as a position in the current array node.
    LoopIndex,
    /// Frame-scoped temporary; reads search enclosing frames outward.
    Temporary(String),
    /// Key in the node that owns the current node.
    Parent(String),
}

impl FieldRef {
    pub fn tmp(name: impl Into<String>) -> Self {
        FieldRef::Temporary(name.into())
    }

    pub fn parent(name: impl Into<String>) -> Self {
        FieldRef::Parent(name.into())
    }
}

impl From<&str> for FieldRef {
    fn from(name: &str) -> Self {
        FieldRef::Literal(name.to_string())
    }
}

impl From<String> for FieldRef {
    fn from(name: String) -> Self {
        FieldRef::Literal(name)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Literal(name) => write!(f, "{}", name),
            FieldRef::LoopIndex => write!(f, "[index]"),
            FieldRef::Temporary(name) => write!(f, "tmp:{}", name),
            FieldRef::Parent(name) => write!(f, "parent:{}", name),
        }
    }
}

/// Iteration bound of a loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopCount {
    Fixed(u64),
    Var(FieldRef),
    /// Load runs until `Break`; save iterates over the current array node.
    Sentinel,
}

impl From<u64> for LoopCount {
    fn from(n: u64) -> Self {
        LoopCount::Fixed(n)
    }
}

impl From<FieldRef> for LoopCount {
    fn from(field: FieldRef) -> Self {
        LoopCount::Var(field)
    }
}

pub type ExecFn = Arc<dyn Fn(&mut Context) -> Result<()> + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&Context) -> bool + Send + Sync>;
pub type DefaultFn = Arc<dyn Fn(&Context) -> Value + Send + Sync>;

/// Payload shared by the fixed-width scalar commands.
#[derive(Clone)]
pub struct Scalar {
    pub field: FieldRef,
    pub default: Option<DefaultFn>,
    pub counted: bool,
}

impl Scalar {
    pub fn new(field: FieldRef) -> Self {
        Self {
            field,
            default: None,
            counted: true,
        }
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scalar")
            .field("field", &self.field)
            .field("default", &self.default.as_ref().map(|_| ".."))
            .field("counted", &self.counted)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int,
    Long,
    Byte,
    Float,
    Str,
    Hex(usize),
}

/// One instruction of a compiled schema.
#[derive(Clone)]
pub enum Command {
    EnterObject(String),
    LeaveObject,
    EnterArray(String),
    LeaveArray,
    EnterElem(FieldRef),
    LeaveElem,
    Int(Scalar),
    Long(Scalar),
    Byte(Scalar),
    Float(Scalar),
    Str(Scalar),
    Hex { scalar: Scalar, width: usize },
    HexRemaining { field: FieldRef, length: FieldRef },
    AssertNullByte { counted: bool },
    Exec(ExecFn),
    Cond {
        predicate: PredicateFn,
        then_branch: Vec<Command>,
        else_branch: Option<Vec<Command>>,
    },
    LoopHeader(LoopCount),
    LoopBody(Vec<Command>),
    Break,
    Switch {
        selector: FieldRef,
        cases: BTreeMap<String, Vec<Command>>,
        default: Option<Vec<Command>>,
    },
    BufferStart { length: FieldRef, reset: bool },
    BufferEnd,
    Call(Rule),
    Debugger,
}

impl Command {
    /// Scalar payload and kind, for the commands that move a single value.
    pub fn scalar(&self) -> Option<(ScalarKind, &Scalar)> {
        match self {
            Command::Int(s) => Some((ScalarKind::Int, s)),
            Command::Long(s) => Some((ScalarKind::Long, s)),
            Command::Byte(s) => Some((ScalarKind::Byte, s)),
            Command::Float(s) => Some((ScalarKind::Float, s)),
            Command::Str(s) => Some((ScalarKind::Str, s)),
            Command::Hex { scalar, width } => Some((ScalarKind::Hex(*width), scalar)),
            _ => None,
        }
    }

    pub(crate) fn scalar_mut(&mut self) -> Option<&mut Scalar> {
        match self {
            Command::Int(s) | Command::Long(s) | Command::Byte(s) | Command::Float(s) | Command::Str(s) => Some(s),
            Command::Hex { scalar, .. } => Some(scalar),
            _ => None,
        }
    }

    /// Nested command lists, in execution order.
    pub fn children(&self) -> Vec<&[Command]> {
        match self {
            Command::Cond {
                then_branch,
                else_branch,
                ..
            } => {
                let mut out = vec![then_branch.as_slice()];
                if let Some(other) = else_branch {
                    out.push(other.as_slice());
                }
                out
            }
            Command::LoopBody(body) => vec![body.as_slice()],
            Command::Switch { cases, default, .. } => {
                let mut out: Vec<&[Command]> = cases.values().map(Vec::as_slice).collect();
                if let Some(other) = default {
                    out.push(other.as_slice());
                }
                out
            }
            _ => Vec::new(),
        }
    }
}

/// Count commands in a list, including nested subtrees.
pub fn command_count(commands: &[Command]) -> usize {
    commands
        .iter()
        .map(|cmd| 1 + cmd.children().into_iter().map(command_count).sum::<usize>())
        .sum()
}

/// Whether running `commands` can consume or emit archive bytes. Calls are
/// assumed to.
pub(crate) fn moves_bytes(commands: &[Command]) -> bool {
    commands.iter().any(|cmd| match cmd {
        Command::HexRemaining { .. } | Command::AssertNullByte { .. } | Command::BufferStart { .. } | Command::Call(_) => {
            true
        }
        other if other.scalar().is_some() => true,
        other => other.children().into_iter().any(moves_bytes),
    })
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::EnterObject(name) => f.debug_tuple("EnterObject").field(name).finish(),
            Command::LeaveObject => f.write_str("LeaveObject"),
            Command::EnterArray(name) => f.debug_tuple("EnterArray").field(name).finish(),
            Command::LeaveArray => f.write_str("LeaveArray"),
            Command::EnterElem(index) => f.debug_tuple("EnterElem").field(index).finish(),
            Command::LeaveElem => f.write_str("LeaveElem"),
            Command::Int(s) => f.debug_tuple("Int").field(s).finish(),
            Command::Long(s) => f.debug_tuple("Long").field(s).finish(),
            Command::Byte(s) => f.debug_tuple("Byte").field(s).finish(),
            Command::Float(s) => f.debug_tuple("Float").field(s).finish(),
            Command::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Command::Hex { scalar, width } => f
                .debug_struct("Hex")
                .field("scalar", scalar)
                .field("width", width)
                .finish(),
            Command::HexRemaining { field, length } => f
                .debug_struct("HexRemaining")
                .field("field", field)
                .field("length", length)
                .finish(),
            Command::AssertNullByte { counted } => f.debug_struct("AssertNullByte").field("counted", counted).finish(),
            Command::Exec(_) => f.write_str("Exec(..)"),
            Command::Cond {
                then_branch,
                else_branch,
                ..
            } => f
                .debug_struct("Cond")
                .field("then_branch", then_branch)
                .field("else_branch", else_branch)
                .finish(),
            Command::LoopHeader(count) => f.debug_tuple("LoopHeader").field(count).finish(),
            Command::LoopBody(body) => f.debug_tuple("LoopBody").field(body).finish(),
            Command::Break => f.write_str("Break"),
            Command::Switch {
                selector,
                cases,
                default,
            } => f
                .debug_struct("Switch")
                .field("selector", selector)
                .field("cases", cases)
                .field("default", default)
                .finish(),
            Command::BufferStart { length, reset } => f
                .debug_struct("BufferStart")
                .field("length", length)
                .field("reset", reset)
                .finish(),
            Command::BufferEnd => f.write_str("BufferEnd"),
            Command::Call(rule) => f.debug_tuple("Call").field(&rule.name()).finish(),
            Command::Debugger => f.write_str("Debugger"),
        }
    }
}
