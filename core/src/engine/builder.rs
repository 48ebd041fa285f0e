use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::command::{Command, FieldRef, LoopCount, Scalar};
use super::context::Context;
use super::registry::{Rule, RuleRegistry};
use crate::error::{ErrorKind, Result, TransformError};

/// Records the commands of one rule function.
///
/// Every operation appends to the command list and returns the builder for
/// chaining. Nested constructs run their closure against a fresh builder and
/// splice the result in as a subtree. Nothing here touches bytes.
///
/// Misuse (an anonymous `call`, `uncounted` after a non-scalar, a duplicate
/// switch label) is recorded and reported by [`Builder::finish`].
pub struct Builder<'r> {
    registry: &'r RuleRegistry,
    commands: Vec<Command>,
    error: Option<TransformError>,
}

impl<'r> Builder<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self {
            registry,
            commands: Vec::new(),
            error: None,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// The recorded commands, or the first configuration error.
    pub fn finish(self) -> Result<Vec<Command>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.commands),
        }
    }

    fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    fn record(&mut self, err: TransformError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn nested(&mut self, body: impl FnOnce(&mut Builder<'r>)) -> Vec<Command> {
        let mut inner = Builder::new(self.registry);
        body(&mut inner);
        if let Some(err) = inner.error {
            self.record(err);
        }
        inner.commands
    }

    /// Descend into the object stored under `name`.
    pub fn obj(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Command::EnterObject(name.into()))
    }

    pub fn end_obj(&mut self) -> &mut Self {
        self.push(Command::LeaveObject)
    }

    /// Descend into the array stored under `name`.
    pub fn arr(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(Command::EnterArray(name.into()))
    }

    pub fn end_arr(&mut self) -> &mut Self {
        self.push(Command::LeaveArray)
    }

    /// Descend into one slot of the current array, usually `FieldRef::LoopIndex`.
    pub fn elem(&mut self, index: impl Into<FieldRef>) -> &mut Self {
        self.push(Command::EnterElem(index.into()))
    }

    pub fn end_elem(&mut self) -> &mut Self {
        self.push(Command::LeaveElem)
    }

    pub fn int(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.push(Command::Int(Scalar::new(field.into())))
    }

    /// Int whose value is computed from the context when absent on save.
    pub fn int_with<V: Into<Value>>(
        &mut self,
        field: impl Into<FieldRef>,
        default: impl Fn(&Context) -> V + Send + Sync + 'static,
    ) -> &mut Self {
        self.push(Command::Int(with_default(field.into(), default)))
    }

    pub fn long(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.push(Command::Long(Scalar::new(field.into())))
    }

    pub fn long_with<V: Into<Value>>(
        &mut self,
        field: impl Into<FieldRef>,
        default: impl Fn(&Context) -> V + Send + Sync + 'static,
    ) -> &mut Self {
        self.push(Command::Long(with_default(field.into(), default)))
    }

    pub fn byte(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.push(Command::Byte(Scalar::new(field.into())))
    }

    pub fn byte_with<V: Into<Value>>(
        &mut self,
        field: impl Into<FieldRef>,
        default: impl Fn(&Context) -> V + Send + Sync + 'static,
    ) -> &mut Self {
        self.push(Command::Byte(with_default(field.into(), default)))
    }

    pub fn float(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.push(Command::Float(Scalar::new(field.into())))
    }

    pub fn str(&mut self, field: impl Into<FieldRef>) -> &mut Self {
        self.push(Command::Str(Scalar::new(field.into())))
    }

    pub fn str_with<V: Into<Value>>(
        &mut self,
        field: impl Into<FieldRef>,
        default: impl Fn(&Context) -> V + Send + Sync + 'static,
    ) -> &mut Self {
        self.push(Command::Str(with_default(field.into(), default)))
    }

    /// `width` raw bytes stored as hex text.
    pub fn hex(&mut self, field: impl Into<FieldRef>, width: usize) -> &mut Self {
        self.push(Command::Hex {
            scalar: Scalar::new(field.into()),
            width,
        })
    }

    /// Raw bytes whose length is read from `length` at run time.
    pub fn hex_remaining(&mut self, field: impl Into<FieldRef>, length: impl Into<FieldRef>) -> &mut Self {
        self.push(Command::HexRemaining {
            field: field.into(),
            length: length.into(),
        })
    }

    pub fn assert_null_byte(&mut self) -> &mut Self {
        self.push(Command::AssertNullByte { counted: true })
    }

    /// A zero `i32`, checked on load.
    pub fn assert_null_int(&mut self) -> &mut Self {
        self.int_with(FieldRef::tmp("_zero"), |_| 0).exec(|ctx| {
            match ctx.tmp("_zero") {
                Some(v) if v.as_i64() == Some(0) => Ok(()),
                other => Err(TransformError::structural(format!(
                    "expected zero, found {}",
                    other.cloned().unwrap_or(Value::Null)
                ))),
            }
        })
    }

    /// Exclude the most recently recorded scalar (or null-byte assertion)
    /// from the enclosing buffer's length.
    pub fn uncounted(&mut self) -> &mut Self {
        let target = match self.commands.iter_mut().rev().find(|cmd| !matches!(cmd, Command::Exec(_))) {
            Some(Command::AssertNullByte { counted }) => Some(counted),
            Some(other) => other.scalar_mut().map(|s| &mut s.counted),
            None => None,
        };
        match target {
            Some(counted) => *counted = false,
            None => self.record(TransformError::structural("uncounted() must follow a scalar command")),
        }
        self
    }

    /// Run `code` against the context when execution reaches this point.
    pub fn exec(&mut self, code: impl Fn(&mut Context) -> Result<()> + Send + Sync + 'static) -> &mut Self {
        self.push(Command::Exec(Arc::new(code)))
    }

    /// Log `probe(ctx)` at debug level.
    pub fn debug(
        &mut self,
        label: &'static str,
        probe: impl Fn(&Context) -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        self.exec(move |ctx| {
            debug!(path = %ctx.path(), value = %probe(ctx), "{}", label);
            Ok(())
        })
    }

    /// Fail the traversal with a structural mismatch.
    pub fn error(&mut self, message: impl Fn(&Context) -> String + Send + Sync + 'static) -> &mut Self {
        self.exec(move |ctx| Err(TransformError::structural(message(ctx))))
    }

    pub fn debugger(&mut self) -> &mut Self {
        self.push(Command::Debugger)
    }

    pub fn when(
        &mut self,
        predicate: impl Fn(&Context) -> bool + Send + Sync + 'static,
        then_branch: impl FnOnce(&mut Builder<'r>),
    ) -> &mut Self {
        let then_branch = self.nested(then_branch);
        self.push(Command::Cond {
            predicate: Arc::new(predicate),
            then_branch,
            else_branch: None,
        })
    }

    pub fn when_else(
        &mut self,
        predicate: impl Fn(&Context) -> bool + Send + Sync + 'static,
        then_branch: impl FnOnce(&mut Builder<'r>),
        else_branch: impl FnOnce(&mut Builder<'r>),
    ) -> &mut Self {
        let then_branch = self.nested(then_branch);
        let else_branch = self.nested(else_branch);
        self.push(Command::Cond {
            predicate: Arc::new(predicate),
            then_branch,
            else_branch: Some(else_branch),
        })
    }

    /// Repeat `body` `count` times. Inside the body the loop index is
    /// available as `FieldRef::LoopIndex`.
    pub fn repeat(&mut self, count: impl Into<LoopCount>, body: impl FnOnce(&mut Builder<'r>)) -> &mut Self {
        let body = self.nested(body);
        self.push(Command::LoopHeader(count.into()));
        self.push(Command::LoopBody(body))
    }

    pub fn break_loop(&mut self) -> &mut Self {
        self.push(Command::Break)
    }

    /// Dispatch on the string form of `selector`.
    pub fn switch(&mut self, selector: impl Into<FieldRef>, cases: impl FnOnce(&mut SwitchCases<'r>)) -> &mut Self {
        let mut table = SwitchCases {
            registry: self.registry,
            cases: BTreeMap::new(),
            default: None,
            error: None,
        };
        cases(&mut table);
        if let Some(err) = table.error {
            self.record(err);
        }
        self.push(Command::Switch {
            selector: selector.into(),
            cases: table.cases,
            default: table.default,
        })
    }

    /// Start a length-prefixed region. `reset` restarts the byte counter.
    pub fn buffer_start(&mut self, length: impl Into<FieldRef>, reset: bool) -> &mut Self {
        self.push(Command::BufferStart {
            length: length.into(),
            reset,
        })
    }

    pub fn buffer_end(&mut self) -> &mut Self {
        self.push(Command::BufferEnd)
    }

    /// Invoke another rule, compiling it on first use.
    pub fn call(&mut self, rule: Rule) -> &mut Self {
        if let Err(err) = self.registry.compile(rule) {
            self.record(err);
            return self;
        }
        self.push(Command::Call(rule))
    }
}

fn with_default<V: Into<Value>>(field: FieldRef, default: impl Fn(&Context) -> V + Send + Sync + 'static) -> Scalar {
    Scalar {
        field,
        default: Some(Arc::new(move |ctx| default(ctx).into())),
        counted: true,
    }
}

/// Case table handed to the closure of [`Builder::switch`].
pub struct SwitchCases<'r> {
    registry: &'r RuleRegistry,
    cases: BTreeMap<String, Vec<Command>>,
    default: Option<Vec<Command>>,
    error: Option<TransformError>,
}

impl<'r> SwitchCases<'r> {
    fn build(&mut self, body: impl FnOnce(&mut Builder<'r>)) -> Vec<Command> {
        let mut inner = Builder::new(self.registry);
        body(&mut inner);
        if let Some(err) = inner.error
            && self.error.is_none()
        {
            self.error = Some(err);
        }
        inner.commands
    }

    pub fn case(&mut self, label: impl Into<String>, body: impl FnOnce(&mut Builder<'r>)) -> &mut Self {
        let label = label.into();
        let commands = self.build(body);
        if self.cases.insert(label.clone(), commands).is_some() && self.error.is_none() {
            self.error = Some(TransformError::new(ErrorKind::StructuralMismatch(format!(
                "duplicate switch case {:?}",
                label
            ))));
        }
        self
    }

    /// Register the same body under several labels.
    pub fn cases<'l>(
        &mut self,
        labels: impl IntoIterator<Item = &'l str>,
        body: impl Fn(&mut Builder<'r>),
    ) -> &mut Self {
        for label in labels {
            self.case(label, &body);
        }
        self
    }

    pub fn default(&mut self, body: impl FnOnce(&mut Builder<'r>)) -> &mut Self {
        let commands = self.build(body);
        self.default = Some(commands);
        self
    }
}
