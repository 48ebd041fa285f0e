//! Schema compiler and interpreter.
//!
//! Rule functions record [`Command`]s into a [`Builder`] once; the
//! [`RuleRegistry`] keeps the compiled lists; [`TransformationEngine`] walks
//! them against an [`Archive`](crate::archive::Archive) in either direction.

mod builder;
mod command;
mod context;
mod interp;
mod registry;

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use tracing::debug;

pub use builder::{Builder, SwitchCases};
pub use command::{
    Command, DefaultFn, ExecFn, FieldRef, LoopCount, PredicateFn, SENTINEL_LOOP_BOUND, Scalar, ScalarKind,
    command_count,
};
pub use context::Context;
pub use registry::{Rule, RuleRegistry, RuleStatus};

use crate::archive::Archive;
use crate::config::EngineOptions;
use crate::error::{Result, TransformError, Warning};
use interp::Interpreter;

/// What to transform: bytes are loaded into a document, a document is saved to bytes.
#[derive(Debug, Clone)]
pub enum Input {
    Bytes(Vec<u8>),
    Document(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Document(Value),
    Bytes(Vec<u8>),
}

impl Output {
    pub fn as_document(&self) -> Option<&Value> {
        match self {
            Output::Document(doc) => Some(doc),
            Output::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Output::Bytes(bytes) => Some(bytes),
            Output::Document(_) => None,
        }
    }

    pub fn into_document(self) -> Option<Value> {
        match self {
            Output::Document(doc) => Some(doc),
            Output::Bytes(_) => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Output::Bytes(bytes) => Some(bytes),
            Output::Document(_) => None,
        }
    }
}

/// A successful traversal plus the soft anomalies it met.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub output: Output,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Leftover {
    offset: usize,
    bytes: usize,
}

/// Entry point: owns the root rule, a registry and the engine options.
#[derive(Debug)]
pub struct TransformationEngine {
    root: Rule,
    registry: Arc<RuleRegistry>,
    options: EngineOptions,
    prepared: bool,
    leftover: Leftover,
}

impl TransformationEngine {
    /// Engine with a private registry.
    pub fn new(root: Rule) -> Self {
        Self::with_registry(root, Arc::new(RuleRegistry::new()))
    }

    /// Engine sharing `registry`, e.g. [`RuleRegistry::shared`].
    pub fn with_registry(root: Rule, registry: Arc<RuleRegistry>) -> Self {
        Self {
            root,
            registry,
            options: EngineOptions::default(),
            prepared: false,
            leftover: Leftover::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(&self) -> Rule {
        self.root
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    /// Compile the root rule and everything it calls. With `eager`, also
    /// check that every rule reachable through `Call` compiled cleanly.
    pub fn prepare(&mut self, eager: bool) -> Result<()> {
        self.registry.compile(self.root)?;
        if eager {
            let root = self.registry.get(self.root.name())?;
            let mut seen = FxHashSet::default();
            seen.insert(self.root.name());
            verify_calls(&self.registry, &root, &mut seen)?;
        }
        self.prepared = true;
        debug!(rule = self.root.name(), rules = self.registry.len(), eager, "engine prepared");
        Ok(())
    }

    /// Run one traversal. The direction follows the input.
    pub fn transform(&mut self, input: Input) -> Result<Transformed> {
        if !self.prepared {
            self.prepare(false)?;
        }
        let commands = self.registry.get(self.root.name())?;
        let max_depth = self.options.max_call_depth;
        match input {
            Input::Bytes(bytes) => {
                let ctx = Context::new(Value::Object(Map::new()), true);
                let finished = Interpreter::new(&self.registry, Archive::loading(bytes), ctx, max_depth).run(&commands)?;
                self.leftover = Leftover {
                    offset: finished.archive.position(),
                    bytes: finished.archive.remaining(),
                };
                Ok(Transformed {
                    output: Output::Document(finished.document),
                    warnings: finished.warnings,
                })
            }
            Input::Document(document) => {
                let ctx = Context::new(document, false);
                let finished = Interpreter::new(&self.registry, Archive::saving(), ctx, max_depth).run(&commands)?;
                self.leftover = Leftover::default();
                Ok(Transformed {
                    output: Output::Bytes(finished.archive.into_bytes()),
                    warnings: finished.warnings,
                })
            }
        }
    }

    /// Finish the session. Fails when the last load left input unread,
    /// unless `allow_trailing_bytes` is set.
    pub fn end(&mut self) -> Result<()> {
        let leftover = std::mem::take(&mut self.leftover);
        if leftover.bytes > 0 && !self.options.allow_trailing_bytes {
            return Err(TransformError::structural(format!(
                "{} trailing byte(s) after the last field",
                leftover.bytes
            ))
            .with_offset(leftover.offset));
        }
        debug!(rule = self.root.name(), "transformation finished");
        Ok(())
    }
}

fn verify_calls(registry: &RuleRegistry, commands: &[Command], seen: &mut FxHashSet<&'static str>) -> Result<()> {
    for command in commands {
        if let Command::Call(rule) = command
            && seen.insert(rule.name())
        {
            let callee = registry.get(rule.name())?;
            verify_calls(registry, &callee, seen)?;
        }
        for child in command.children() {
            verify_calls(registry, child, seen)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod engine_test;
