use std::fmt::Write;

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use super::command::FieldRef;
use crate::error::{ErrorKind, Result, TransformError};

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Root,
    Object,
    Array,
    Elem,
    Iteration,
    Call,
}

/// Where a frame's node lives inside the node below it.
#[derive(Debug, Clone)]
enum Place {
    Key(String),
    Index(usize),
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    /// Owned document node; `None` for pure scope frames.
    node: Option<Value>,
    place: Option<Place>,
    tmp: FxHashMap<String, Value>,
    loop_index: Option<u64>,
}

impl Frame {
    fn scope(kind: FrameKind, loop_index: Option<u64>) -> Self {
        Self {
            kind,
            node: None,
            place: None,
            tmp: FxHashMap::default(),
            loop_index,
        }
    }

    fn owning(kind: FrameKind, node: Value, place: Option<Place>) -> Self {
        Self {
            kind,
            node: Some(node),
            place,
            tmp: FxHashMap::default(),
            loop_index: None,
        }
    }
}

/// Scoped execution state visible to rule callbacks.
///
/// The bottom frame owns the whole document. Entering a child moves the
/// child node into a new frame and leaves a `null` placeholder behind, so
/// key order survives; leaving moves it back.
#[derive(Debug)]
pub struct Context {
    frames: Vec<Frame>,
    loading: bool,
}

impl Context {
    pub(crate) fn new(root: Value, loading: bool) -> Self {
        Self {
            frames: vec![Frame::owning(FrameKind::Root, root, None)],
            loading,
        }
    }

    /// Close every open frame and hand back the document.
    pub(crate) fn into_root(mut self) -> Value {
        self.unwind_to(1);
        self.frames.pop().and_then(|frame| frame.node).unwrap_or(Value::Null)
    }

    #[inline]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Document path of the current node, e.g. `$.properties[3].value`.
    pub fn path(&self) -> String {
        let mut out = String::from("$");
        for frame in &self.frames {
            match &frame.place {
                Some(Place::Key(key)) => {
                    let _ = write!(out, ".{}", key);
                }
                Some(Place::Index(i)) => {
                    let _ = write!(out, "[{}]", i);
                }
                None => {}
            }
        }
        out
    }

    fn current(&self) -> usize {
        self.frames.iter().rposition(|f| f.node.is_some()).unwrap_or(0)
    }

    fn parent_index(&self) -> Option<usize> {
        let current = self.current();
        self.frames[..current].iter().rposition(|f| f.node.is_some())
    }

    /// The document node of the innermost owning frame.
    pub fn node(&self) -> &Value {
        self.frames[self.current()].node.as_ref().unwrap_or(&NULL)
    }

    pub fn node_mut(&mut self) -> &mut Value {
        let current = self.current();
        self.frames[current].node.get_or_insert_with(Value::default)
    }

    /// The node that owns the current node.
    pub fn parent_node(&self) -> Option<&Value> {
        self.parent_index().and_then(|i| self.frames[i].node.as_ref())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.node().get(name)
    }

    /// Temporary lookup, innermost frame first.
    pub fn tmp(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.tmp.get(name))
    }

    pub fn set_tmp(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.tmp.insert(name.into(), value.into());
        }
    }

    /// Index of the innermost active loop iteration.
    pub fn loop_index(&self) -> Option<u64> {
        self.frames.iter().rev().find_map(|f| f.loop_index)
    }

    /// Element count of an array (or object) field of the current node; 0 when absent.
    pub fn len_of(&self, name: &str) -> u64 {
        match self.field(name) {
            Some(Value::Array(items)) => items.len() as u64,
            Some(Value::Object(map)) => map.len() as u64,
            _ => 0,
        }
    }

    pub fn get(&self, field: &FieldRef) -> Option<&Value> {
        match field {
            FieldRef::Literal(name) => self.node().get(name.as_str()),
            FieldRef::LoopIndex => {
                let i = usize::try_from(self.loop_index()?).ok()?;
                self.node().get(i)
            }
            FieldRef::Temporary(name) => self.tmp(name),
            FieldRef::Parent(name) => self.parent_node()?.get(name.as_str()),
        }
    }

    /// Like [`Context::get`], but temporaries are only looked up in the
    /// innermost frame. Save-side scalars use this so a value left by an
    /// enclosing scope is not mistaken for their own.
    pub(crate) fn get_own(&self, field: &FieldRef) -> Option<&Value> {
        match field {
            FieldRef::Temporary(name) => self.frames.last()?.tmp.get(name),
            other => self.get(other),
        }
    }

    pub fn set(&mut self, field: &FieldRef, value: Value) -> Result<()> {
        match field {
            FieldRef::Literal(name) => {
                object_mut(self.node_mut())?.insert(name.clone(), value);
            }
            FieldRef::LoopIndex => {
                let i = self.active_index()?;
                let items = array_mut(self.node_mut())?;
                if i >= items.len() {
                    items.resize(i + 1, Value::Null);
                }
                items[i] = value;
            }
            FieldRef::Temporary(name) => self.set_tmp(name.clone(), value),
            FieldRef::Parent(name) => {
                let parent = self
                    .parent_index()
                    .ok_or_else(|| TransformError::structural(format!("{} has no parent node", field)))?;
                let node = self.frames[parent].node.get_or_insert_with(Value::default);
                object_mut(node)?.insert(name.clone(), value);
            }
        }
        Ok(())
    }

    fn active_index(&self) -> Result<usize> {
        let i = self
            .loop_index()
            .ok_or_else(|| TransformError::structural("loop index used outside of a loop"))?;
        usize::try_from(i).map_err(|_| TransformError::new(ErrorKind::EncodingOverflow {
            target: "usize".into(),
            value: i.to_string(),
        }))
    }

    fn resolve_index(&self, index: &FieldRef) -> Result<usize> {
        if let FieldRef::LoopIndex = index {
            return self.active_index();
        }
        self.get(index)
            .and_then(Value::as_u64)
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| TransformError::invalid(format!("{} is not an index", index)))
    }

    pub(crate) fn enter_object(&mut self, name: &str) -> Result<()> {
        self.enter_keyed(name, FrameKind::Object)
    }

    pub(crate) fn enter_array(&mut self, name: &str) -> Result<()> {
        self.enter_keyed(name, FrameKind::Array)
    }

    fn enter_keyed(&mut self, name: &str, kind: FrameKind) -> Result<()> {
        let loading = self.loading;
        let map = object_mut(self.node_mut())?;
        match map.get(name) {
            None | Some(Value::Null) if !loading => {
                return Err(ErrorKind::MissingValue(name.to_string()).into());
            }
            Some(existing) if !existing.is_null() && !has_kind(existing, kind) => {
                return Err(TransformError::invalid(format!(
                    "{} should be {}, found {}",
                    name,
                    kind_name(kind),
                    existing
                )));
            }
            _ => {}
        }
        let slot = map.entry(name).or_insert(Value::Null);
        let mut child = std::mem::take(slot);
        if child.is_null() {
            child = empty(kind);
        }
        self.frames
            .push(Frame::owning(kind, child, Some(Place::Key(name.to_string()))));
        Ok(())
    }

    pub(crate) fn enter_elem(&mut self, index: &FieldRef) -> Result<()> {
        let loading = self.loading;
        let i = self.resolve_index(index)?;
        let items = array_mut(self.node_mut())?;
        if i >= items.len() {
            if !loading {
                return Err(ErrorKind::MissingValue(format!("[{}]", i)).into());
            }
            items.resize(i + 1, Value::Null);
        }
        let slot = &mut items[i];
        match &*slot {
            Value::Null if !loading => return Err(ErrorKind::MissingValue(format!("[{}]", i)).into()),
            Value::Null | Value::Object(_) => {}
            other => {
                return Err(TransformError::invalid(format!("[{}] should be an object, found {}", i, other)));
            }
        }
        let mut child = std::mem::take(slot);
        if child.is_null() {
            child = empty(FrameKind::Elem);
        }
        self.frames
            .push(Frame::owning(FrameKind::Elem, child, Some(Place::Index(i))));
        Ok(())
    }

    /// Pop the innermost frame, which must be of `kind`.
    pub(crate) fn leave(&mut self, kind: FrameKind) -> Result<()> {
        match self.frames.last() {
            Some(frame) if frame.kind == kind && kind != FrameKind::Root => {
                self.pop_frame();
                Ok(())
            }
            Some(frame) => Err(TransformError::structural(format!(
                "unbalanced leave: expected {:?}, innermost frame is {:?}",
                kind, frame.kind
            ))),
            None => Err(TransformError::structural("context has no frames")),
        }
    }

    pub(crate) fn push_scope(&mut self, kind: FrameKind, loop_index: Option<u64>) {
        self.frames.push(Frame::scope(kind, loop_index));
    }

    /// Pop frames until `depth` remain, writing owned nodes back.
    pub(crate) fn unwind_to(&mut self, depth: usize) {
        while self.frames.len() > depth.max(1) {
            self.pop_frame();
        }
    }

    fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let (Some(node), Some(place)) = (frame.node, frame.place) else {
            return;
        };
        match (self.node_mut(), place) {
            (Value::Object(map), Place::Key(key)) => {
                map.insert(key, node);
            }
            (Value::Array(items), Place::Index(i)) if i < items.len() => items[i] = node,
            _ => {}
        }
    }
}

fn has_kind(value: &Value, kind: FrameKind) -> bool {
    match kind {
        FrameKind::Array => value.is_array(),
        _ => value.is_object(),
    }
}

fn kind_name(kind: FrameKind) -> &'static str {
    match kind {
        FrameKind::Array => "an array",
        _ => "an object",
    }
}

fn empty(kind: FrameKind) -> Value {
    match kind {
        FrameKind::Array => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    }
}

fn object_mut(node: &mut Value) -> Result<&mut Map<String, Value>> {
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => Ok(map),
        other => Err(TransformError::invalid(format!("expected an object, found {}", other))),
    }
}

fn array_mut(node: &mut Value) -> Result<&mut Vec<Value>> {
    if node.is_null() {
        *node = Value::Array(Vec::new());
    }
    match node {
        Value::Array(items) => Ok(items),
        other => Err(TransformError::invalid(format!("expected an array, found {}", other))),
    }
}
