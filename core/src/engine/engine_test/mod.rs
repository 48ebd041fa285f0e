pub(super) use serde_json::{Value, json};

pub(super) use crate::config::EngineOptions;
pub(super) use crate::engine::{Builder, FieldRef, Input, LoopCount, Rule, TransformationEngine, Transformed};
pub(super) use crate::error::{ErrorKind, Result, WarningKind};
pub(super) use crate::rule;

pub(super) fn load(rule: Rule, bytes: &[u8]) -> Result<Transformed> {
    TransformationEngine::new(rule).transform(Input::Bytes(bytes.to_vec()))
}

pub(super) fn load_doc(rule: Rule, bytes: &[u8]) -> Value {
    load(rule, bytes).unwrap().output.into_document().unwrap()
}

pub(super) fn save(rule: Rule, doc: Value) -> Result<Vec<u8>> {
    let out = TransformationEngine::new(rule).transform(Input::Document(doc))?;
    Ok(out.output.into_bytes().unwrap_or_default())
}

pub(super) fn save_bytes(rule: Rule, doc: Value) -> Vec<u8> {
    save(rule, doc).unwrap()
}

/// `i32` length prefix, text, NUL.
pub(super) fn ansi(s: &str) -> Vec<u8> {
    let mut out = (s.len() as i32 + 1).to_le_bytes().to_vec();
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    out
}

mod buffers;
mod control_flow;
mod errors;
mod recursion;
mod scalars;
