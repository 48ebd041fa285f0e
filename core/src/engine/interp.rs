use serde_json::Value;
use tracing::{debug, trace, warn};

use super::command::{Command, DefaultFn, FieldRef, LoopCount, SENTINEL_LOOP_BOUND, Scalar, moves_bytes};
use super::context::{Context, FrameKind};
use super::registry::{Rule, RuleRegistry};
use crate::archive::Archive;
use crate::error::{ErrorKind, Result, TransformError, Warning, WarningKind};

/// How control leaves a command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Next,
    Break,
}

/// State left once a traversal has completed.
pub(crate) struct Finished {
    pub archive: Archive,
    pub document: Value,
    pub warnings: Vec<Warning>,
}

/// Walks compiled command lists against one archive and one context.
pub(crate) struct Interpreter<'a> {
    registry: &'a RuleRegistry,
    archive: Archive,
    ctx: Context,
    max_call_depth: usize,
    call_depth: usize,
    /// Length references of the open buffers, innermost last.
    lengths: Vec<FieldRef>,
    warnings: Vec<Warning>,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(registry: &'a RuleRegistry, archive: Archive, ctx: Context, max_call_depth: usize) -> Self {
        Self {
            registry,
            archive,
            ctx,
            max_call_depth,
            call_depth: 0,
            lengths: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn run(mut self, commands: &[Command]) -> Result<Finished> {
        if self.exec_block(commands)? == Flow::Break {
            return Err(TransformError::structural("break outside of a loop"));
        }
        if self.ctx.depth() != 1 {
            let open = self.ctx.depth() - 1;
            return Err(TransformError::structural(format!("{} frame(s) left open", open)).with_path(|| self.ctx.path()));
        }
        if self.archive.region_depth() != 0 {
            return Err(TransformError::structural("buffer start without buffer end")
                .with_offset(self.archive.position()));
        }
        Ok(Finished {
            archive: self.archive,
            document: self.ctx.into_root(),
            warnings: self.warnings,
        })
    }

    fn exec_block(&mut self, commands: &[Command]) -> Result<Flow> {
        let mut header: Option<&LoopCount> = None;
        for command in commands {
            let flow = self
                .step(command, &mut header)
                .map_err(|err| err.with_path(|| self.ctx.path()).with_offset(self.archive.position()))?;
            if flow == Flow::Break {
                return Ok(Flow::Break);
            }
        }
        Ok(Flow::Next)
    }

    fn step<'c>(&mut self, command: &'c Command, header: &mut Option<&'c LoopCount>) -> Result<Flow> {
        match command {
            Command::EnterObject(name) => self.ctx.enter_object(name)?,
            Command::LeaveObject => self.ctx.leave(FrameKind::Object)?,
            Command::EnterArray(name) => self.ctx.enter_array(name)?,
            Command::LeaveArray => self.ctx.leave(FrameKind::Array)?,
            Command::EnterElem(index) => self.ctx.enter_elem(index)?,
            Command::LeaveElem => self.ctx.leave(FrameKind::Elem)?,
            Command::Int(scalar) => self.scalar(scalar, Archive::int32)?,
            Command::Long(scalar) => self.scalar(scalar, Archive::int64)?,
            Command::Byte(scalar) => self.scalar(scalar, Archive::byte)?,
            Command::Float(scalar) => self.scalar(scalar, Archive::float32)?,
            Command::Str(scalar) => self.scalar(scalar, Archive::string)?,
            Command::Hex { scalar, width } => {
                let width = *width;
                self.scalar(scalar, |ar, slot| ar.fixed_hex(width, slot))?
            }
            Command::HexRemaining { field, length } => {
                // Save writes whatever the field holds.
                let len = if self.archive.is_loading() { self.resolve_count(length)? } else { 0 };
                let len = usize::try_from(len).map_err(|_| overflow("usize", len))?;
                self.transfer(field, None, true, |ar, slot| ar.variable_hex(len, slot))?
            }
            Command::AssertNullByte { counted } => {
                let offset = self.archive.position();
                let mut slot = Value::from(0u8);
                self.archive.counted(*counted, |ar| ar.byte(&mut slot))?;
                if slot.as_u64() != Some(0) {
                    return Err(TransformError::at_offset(
                        ErrorKind::StructuralMismatch(format!("expected a null byte, found {}", slot)),
                        offset,
                    ));
                }
            }
            Command::Exec(code) => code(&mut self.ctx)?,
            Command::Cond {
                predicate,
                then_branch,
                else_branch,
            } => {
                let branch = if predicate(&self.ctx) {
                    Some(then_branch.as_slice())
                } else {
                    else_branch.as_deref()
                };
                if let Some(branch) = branch {
                    return self.exec_block(branch);
                }
            }
            Command::LoopHeader(count) => *header = Some(count),
            Command::LoopBody(body) => {
                let count = header
                    .take()
                    .ok_or_else(|| TransformError::structural("loop body without loop header"))?;
                self.run_loop(count, body)?;
            }
            Command::Break => return Ok(Flow::Break),
            Command::Switch {
                selector,
                cases,
                default,
            } => {
                let label = self.selector_label(selector)?;
                let branch = match (cases.get(&label), default) {
                    (Some(branch), _) => branch,
                    (None, Some(branch)) => {
                        debug!(selector = %selector, value = %label, "no case matched, using default");
                        branch
                    }
                    (None, None) => {
                        return Err(ErrorKind::UnknownVariant {
                            selector: selector.to_string(),
                            value: label,
                        }
                        .into());
                    }
                };
                return self.exec_block(branch);
            }
            Command::BufferStart { length, reset } => {
                let mut declared = Value::Null;
                self.archive.begin_region(&mut declared, *reset)?;
                if self.archive.is_loading() {
                    self.ctx.set(length, declared)?;
                }
                self.lengths.push(length.clone());
            }
            Command::BufferEnd => {
                let length = self
                    .lengths
                    .pop()
                    .ok_or_else(|| TransformError::structural("buffer end without buffer start"))?;
                let measured = self.archive.end_region()?;
                if !self.archive.is_loading() {
                    self.ctx.set(&length, Value::from(measured))?;
                }
            }
            Command::Call(rule) => return self.call(*rule),
            Command::Debugger => {
                trace!(path = %self.ctx.path(), offset = self.archive.position(), "debugger");
            }
        }
        Ok(Flow::Next)
    }

    fn scalar(&mut self, scalar: &Scalar, op: impl FnOnce(&mut Archive, &mut Value) -> Result<()>) -> Result<()> {
        self.transfer(&scalar.field, scalar.default.as_ref(), scalar.counted, op)
    }

    /// Move one value between the archive and `field`. On save a field with
    /// a default only looks at its own frame's temporaries; when absent the
    /// default is computed and stored back.
    fn transfer(
        &mut self,
        field: &FieldRef,
        default: Option<&DefaultFn>,
        counted: bool,
        op: impl FnOnce(&mut Archive, &mut Value) -> Result<()>,
    ) -> Result<()> {
        if self.archive.is_loading() {
            let mut slot = Value::Null;
            self.archive.counted(counted, |ar| op(ar, &mut slot))?;
            return self.ctx.set(field, slot);
        }
        let existing = match default {
            Some(_) => self.ctx.get_own(field),
            None => self.ctx.get(field),
        }
        .filter(|value| !value.is_null())
        .cloned();
        let mut slot = match (existing, default) {
            (Some(value), _) => value,
            (_, Some(produce)) => {
                let value = produce(&self.ctx);
                self.ctx.set(field, value.clone())?;
                value
            }
            _ => return Err(ErrorKind::MissingValue(field.to_string()).into()),
        };
        self.archive.counted(counted, |ar| op(ar, &mut slot))
    }

    fn resolve_count(&self, field: &FieldRef) -> Result<u64> {
        match self.ctx.get(field) {
            Some(value) => value
                .as_u64()
                .ok_or_else(|| TransformError::invalid(format!("{} is not a count: {}", field, value))),
            None => Err(ErrorKind::MissingValue(field.to_string()).into()),
        }
    }

    fn selector_label(&self, selector: &FieldRef) -> Result<String> {
        match self.ctx.get(selector) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(value @ (Value::Number(_) | Value::Bool(_))) => Ok(value.to_string()),
            Some(other) => Err(ErrorKind::UnknownVariant {
                selector: selector.to_string(),
                value: other.to_string(),
            }
            .into()),
            None => Err(ErrorKind::MissingValue(selector.to_string()).into()),
        }
    }

    fn run_loop(&mut self, count: &LoopCount, body: &[Command]) -> Result<()> {
        let loading = self.archive.is_loading();
        let (limit, bounded) = match count {
            LoopCount::Fixed(n) => (*n, true),
            LoopCount::Var(field) => (self.resolve_count(field)?, true),
            LoopCount::Sentinel if loading => (SENTINEL_LOOP_BOUND, false),
            LoopCount::Sentinel => (self.ctx.node().as_array().map_or(0, |items| items.len() as u64), false),
        };

        // A body that never touches the archive cannot run out of input.
        let guarded = bounded && moves_bytes(body);
        let depth = self.ctx.depth();
        let regions = self.archive.region_depth();
        let lengths = self.lengths.len();
        for i in 0..limit {
            if guarded && self.archive.region_exhausted() {
                self.count_mismatch(limit, i);
                break;
            }
            self.ctx.push_scope(FrameKind::Iteration, Some(i));
            match self.exec_block(body)? {
                Flow::Next => self.ctx.leave(FrameKind::Iteration)?,
                Flow::Break => {
                    self.ctx.unwind_to(depth);
                    self.archive.abandon_regions(regions);
                    self.lengths.truncate(lengths);
                    break;
                }
            }
        }
        Ok(())
    }

    fn count_mismatch(&mut self, expected: u64, observed: u64) {
        let warning = Warning {
            kind: WarningKind::CountMismatch { expected, observed },
            path: self.ctx.path(),
            offset: self.archive.position(),
        };
        warn!(path = %warning.path, offset = warning.offset, "{}", warning.kind);
        self.warnings.push(warning);
    }

    fn call(&mut self, rule: Rule) -> Result<Flow> {
        if self.call_depth >= self.max_call_depth {
            return Err(TransformError::structural(format!(
                "call depth limit of {} exceeded entering {}",
                self.max_call_depth,
                rule.name()
            )));
        }
        let commands = self.registry.get(rule.name())?;
        self.call_depth += 1;
        self.ctx.push_scope(FrameKind::Call, None);
        let flow = self.exec_block(&commands[..]);
        self.call_depth -= 1;
        match flow? {
            Flow::Next => {
                self.ctx.leave(FrameKind::Call)?;
                Ok(Flow::Next)
            }
            Flow::Break => Ok(Flow::Break),
        }
    }
}

fn overflow(target: &str, value: u64) -> TransformError {
    TransformError::new(ErrorKind::EncodingOverflow {
        target: target.to_string(),
        value: value.to_string(),
    })
}
