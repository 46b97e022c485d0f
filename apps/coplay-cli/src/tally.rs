//! Shared tally: a running total plus a log of notes, driven by two relayable
//! actions.

use coplay_session::{ActionRegistry, LocalDispatch};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const ADJUST: &str = "adjust";
pub const NOTE: &str = "note";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: i64,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyAction {
    Adjust(i64),
    Note(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct AdjustArgs {
    delta: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct NoteArgs {
    text: String,
}

pub fn reduce(state: &Tally, action: &TallyAction) -> Tally {
    let mut next = state.clone();
    match action {
        TallyAction::Adjust(delta) => next.total = next.total.saturating_add(*delta),
        TallyAction::Note(text) => next.notes.push(text.clone()),
    }
    next
}

fn adjust(args: &Value, local: &mut LocalDispatch<'_, Tally, TallyAction>) -> Option<Value> {
    let AdjustArgs { delta } = serde_json::from_value(args.clone()).ok()?;
    if delta == 0 {
        return None;
    }
    local.apply(TallyAction::Adjust(delta));
    Some(json!({ "delta": delta }))
}

fn note(args: &Value, local: &mut LocalDispatch<'_, Tally, TallyAction>) -> Option<Value> {
    let NoteArgs { text } = serde_json::from_value(args.clone()).ok()?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    local.apply(TallyAction::Note(text.to_string()));
    Some(json!({ "text": text }))
}

pub fn registry() -> ActionRegistry<Tally, TallyAction> {
    let mut registry = ActionRegistry::new();
    registry.register(ADJUST, adjust).register(NOTE, note);
    registry
}

pub fn adjust_args(delta: i64) -> Value {
    json!({ "delta": delta })
}

pub fn note_args(text: &str) -> Value {
    json!({ "text": text })
}
