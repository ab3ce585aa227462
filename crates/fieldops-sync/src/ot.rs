// File: fieldops-sync/src/ot.rs
// Purpose: Operational transform for mergeable text and list fields
//
// Classic OT, not a CRDT: edits are derived at conflict time by diffing each
// side against the common base, then the client's operations are transformed
// against the server's so indices shift consistently. Overlapping base spans
// fall back to last-write-wins for that span only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{Result, SyncError};

/// Text operation over character positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOp {
    Retain(usize),
    Insert(String),
    Delete(usize),
}

/// List operation over element indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOp {
    InsertAt { index: usize, value: Value },
    DeleteAt { index: usize },
    Move { from: usize, to: usize },
}

/// Result of a text merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedText {
    pub text: String,
    /// Both sides edited the same span; the losing edit was discarded
    pub overlap_fallback: bool,
}

/// Result of a list merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedList {
    pub values: Vec<Value>,
    pub overlap_fallback: bool,
}

// ---- text ----

/// Derive the edit between `base` and `target` as retain/insert/delete ops,
/// anchored on the longest common prefix and suffix.
pub fn diff_text(base: &str, target: &str) -> Vec<TextOp> {
    let b: Vec<char> = base.chars().collect();
    let t: Vec<char> = target.chars().collect();

    let mut prefix = 0;
    while prefix < b.len() && prefix < t.len() && b[prefix] == t[prefix] {
        prefix += 1;
    }

    let mut suffix = 0;
    while suffix < b.len() - prefix
        && suffix < t.len() - prefix
        && b[b.len() - 1 - suffix] == t[t.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let deleted = b.len() - prefix - suffix;
    let inserted: String = t[prefix..t.len() - suffix].iter().collect();

    let mut ops = Vec::new();
    if prefix > 0 {
        ops.push(TextOp::Retain(prefix));
    }
    if deleted > 0 {
        ops.push(TextOp::Delete(deleted));
    }
    if !inserted.is_empty() {
        ops.push(TextOp::Insert(inserted));
    }
    if suffix > 0 {
        ops.push(TextOp::Retain(suffix));
    }
    ops
}

/// Apply text ops to a document. Ops must span the document exactly.
pub fn apply_text(base: &str, ops: &[TextOp]) -> Result<String> {
    let chars: Vec<char> = base.chars().collect();
    let mut pos = 0;
    let mut out = String::new();

    for op in ops {
        match op {
            TextOp::Retain(n) => {
                if pos + n > chars.len() {
                    return Err(SyncError::validation("text ops overrun the document"));
                }
                out.extend(&chars[pos..pos + n]);
                pos += n;
            }
            TextOp::Insert(s) => out.push_str(s),
            TextOp::Delete(n) => {
                if pos + n > chars.len() {
                    return Err(SyncError::validation("text ops overrun the document"));
                }
                pos += n;
            }
        }
    }

    if pos != chars.len() {
        return Err(SyncError::validation("text ops do not span the document"));
    }
    Ok(out)
}

fn push_retain(ops: &mut Vec<TextOp>, n: usize) {
    if n == 0 {
        return;
    }
    if let Some(TextOp::Retain(m)) = ops.last_mut() {
        *m += n;
    } else {
        ops.push(TextOp::Retain(n));
    }
}

fn push_delete(ops: &mut Vec<TextOp>, n: usize) {
    if n == 0 {
        return;
    }
    if let Some(TextOp::Delete(m)) = ops.last_mut() {
        *m += n;
    } else {
        ops.push(TextOp::Delete(n));
    }
}

fn push_insert(ops: &mut Vec<TextOp>, s: String) {
    if s.is_empty() {
        return;
    }
    if let Some(TextOp::Insert(prev)) = ops.last_mut() {
        prev.push_str(&s);
    } else {
        ops.push(TextOp::Insert(s));
    }
}

/// Transform `a` against `b` so the result applies to a document that has
/// already received `b`. When both sides insert at the same position,
/// `a_priority` decides whose insert lands first.
pub fn transform_text(a: &[TextOp], b: &[TextOp], a_priority: bool) -> Vec<TextOp> {
    let mut out = Vec::new();
    let mut a_ops = a.to_vec().into_iter();
    let mut b_ops = b.to_vec().into_iter();
    let mut a_cur = a_ops.next();
    let mut b_cur = b_ops.next();

    loop {
        match (a_cur.take(), b_cur.take()) {
            (None, None) => break,
            (Some(TextOp::Insert(s)), other) => {
                if let Some(TextOp::Insert(theirs)) = &other {
                    if !a_priority {
                        push_retain(&mut out, theirs.chars().count());
                        a_cur = Some(TextOp::Insert(s));
                        b_cur = b_ops.next();
                        continue;
                    }
                }
                push_insert(&mut out, s);
                a_cur = a_ops.next();
                b_cur = other;
            }
            (other, Some(TextOp::Insert(s))) => {
                push_retain(&mut out, s.chars().count());
                a_cur = other;
                b_cur = b_ops.next();
            }
            (Some(TextOp::Retain(n)), Some(TextOp::Retain(m))) => {
                let k = n.min(m);
                push_retain(&mut out, k);
                a_cur = (n > k).then_some(TextOp::Retain(n - k)).or_else(|| a_ops.next());
                b_cur = (m > k).then_some(TextOp::Retain(m - k)).or_else(|| b_ops.next());
            }
            (Some(TextOp::Delete(n)), Some(TextOp::Delete(m))) => {
                let k = n.min(m);
                a_cur = (n > k).then_some(TextOp::Delete(n - k)).or_else(|| a_ops.next());
                b_cur = (m > k).then_some(TextOp::Delete(m - k)).or_else(|| b_ops.next());
            }
            (Some(TextOp::Retain(n)), Some(TextOp::Delete(m))) => {
                let k = n.min(m);
                a_cur = (n > k).then_some(TextOp::Retain(n - k)).or_else(|| a_ops.next());
                b_cur = (m > k).then_some(TextOp::Delete(m - k)).or_else(|| b_ops.next());
            }
            (Some(TextOp::Delete(n)), Some(TextOp::Retain(m))) => {
                let k = n.min(m);
                push_delete(&mut out, k);
                a_cur = (n > k).then_some(TextOp::Delete(n - k)).or_else(|| a_ops.next());
                b_cur = (m > k).then_some(TextOp::Retain(m - k)).or_else(|| b_ops.next());
            }
            (Some(TextOp::Retain(n)), None) => {
                push_retain(&mut out, n);
                a_cur = a_ops.next();
            }
            (Some(TextOp::Delete(n)), None) => {
                push_delete(&mut out, n);
                a_cur = a_ops.next();
            }
            (None, Some(_)) => {
                // b consumed base beyond a's span; nothing left to place
                b_cur = b_ops.next();
            }
        }
    }

    out
}

/// Replaced span over the base, if the ops change anything.
/// `start == end` marks a pure insertion point.
fn text_span(ops: &[TextOp]) -> Option<(usize, usize)> {
    let mut pos = 0;
    let mut start = None;
    let mut end = 0;

    for op in ops {
        match op {
            TextOp::Retain(n) => pos += n,
            TextOp::Delete(n) => {
                start.get_or_insert(pos);
                pos += n;
                end = pos;
            }
            TextOp::Insert(_) => {
                start.get_or_insert(pos);
                end = end.max(pos);
            }
        }
    }

    start.map(|s| (s, end.max(s)))
}

fn spans_overlap(a: Option<(usize, usize)>, b: Option<(usize, usize)>) -> bool {
    let (Some((a0, a1)), Some((b0, b1))) = (a, b) else {
        return false;
    };

    match (a0 == a1, b0 == b1) {
        // two pure insertion points never overlap; transform orders them
        (true, true) => false,
        (true, false) => a0 > b0 && a0 < b1,
        (false, true) => b0 > a0 && b0 < a1,
        (false, false) => a0 < b1 && b0 < a1,
    }
}

/// Three-way text merge. Non-overlapping edits from both sides are preserved;
/// overlapping spans fall back to the winning side wholesale.
pub fn merge_text(base: &str, client: &str, server: &str, client_wins: bool) -> Result<MergedText> {
    let client_ops = diff_text(base, client);
    let server_ops = diff_text(base, server);

    if spans_overlap(text_span(&client_ops), text_span(&server_ops)) {
        let text = if client_wins { client } else { server };
        return Ok(MergedText {
            text: text.to_string(),
            overlap_fallback: true,
        });
    }

    let server_applied = apply_text(base, &server_ops)?;
    let transformed = transform_text(&client_ops, &server_ops, false);
    let text = apply_text(&server_applied, &transformed)?;

    Ok(MergedText {
        text,
        overlap_fallback: false,
    })
}

// ---- lists ----

/// Slot identity used to track elements across both sides' edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Base(usize),
    Ours(usize),
    Theirs(usize),
}

/// Derive the edit between `base` and `target` as list ops. Deletions are
/// emitted highest-index first, then insertions lowest-index first; a single
/// delete/insert pair of an equal value collapses to a move.
pub fn diff_list(base: &[Value], target: &[Value]) -> Vec<ListOp> {
    // LCS table over value equality
    let n = base.len();
    let m = target.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if base[i] == target[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut kept_base = HashSet::new();
    let mut kept_target = HashSet::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if base[i] == target[j] {
            kept_base.insert(i);
            kept_target.insert(j);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }

    let deletes: Vec<usize> = (0..n).rev().filter(|i| !kept_base.contains(i)).collect();
    let inserts: Vec<usize> = (0..m).filter(|j| !kept_target.contains(j)).collect();

    if deletes.len() == 1 && inserts.len() == 1 && base[deletes[0]] == target[inserts[0]] {
        return vec![ListOp::Move {
            from: deletes[0],
            to: inserts[0],
        }];
    }

    let mut ops: Vec<ListOp> = deletes
        .into_iter()
        .map(|index| ListOp::DeleteAt { index })
        .collect();
    ops.extend(inserts.into_iter().map(|index| ListOp::InsertAt {
        index,
        value: target[index].clone(),
    }));
    ops
}

/// Apply list ops in sequence.
pub fn apply_list(base: &[Value], ops: &[ListOp]) -> Result<Vec<Value>> {
    let mut list = base.to_vec();

    for op in ops {
        match op {
            ListOp::InsertAt { index, value } => {
                if *index > list.len() {
                    return Err(SyncError::validation("list insert out of bounds"));
                }
                list.insert(*index, value.clone());
            }
            ListOp::DeleteAt { index } => {
                if *index >= list.len() {
                    return Err(SyncError::validation("list delete out of bounds"));
                }
                list.remove(*index);
            }
            ListOp::Move { from, to } => {
                if *from >= list.len() {
                    return Err(SyncError::validation("list move out of bounds"));
                }
                let value = list.remove(*from);
                list.insert((*to).min(list.len()), value);
            }
        }
    }

    Ok(list)
}

fn apply_script_slots<F>(slots: &mut Vec<Slot>, ops: &[ListOp], mut fresh: F)
where
    F: FnMut(usize) -> Slot,
{
    let mut counter = 0;
    for op in ops {
        match op {
            ListOp::InsertAt { index, .. } => {
                let idx = (*index).min(slots.len());
                let slot = fresh(counter);
                counter += 1;
                slots.insert(idx, slot);
            }
            ListOp::DeleteAt { index } => {
                if *index < slots.len() {
                    slots.remove(*index);
                }
            }
            ListOp::Move { from, to } => {
                if *from < slots.len() {
                    let slot = slots.remove(*from);
                    slots.insert((*to).min(slots.len()), slot);
                }
            }
        }
    }
}

/// Position in `merged` for an insert anchored at `idx` of `ours`: directly
/// before the first surviving slot at or after the anchor.
fn anchor_position(ours: &[Slot], merged: &[Slot], idx: usize, a_priority: bool) -> usize {
    for slot in &ours[idx..] {
        if let Some(mut pos) = merged.iter().position(|s| s == slot) {
            if a_priority {
                while pos > 0 && matches!(merged[pos - 1], Slot::Theirs(_)) {
                    pos -= 1;
                }
            }
            return pos;
        }
    }
    merged.len()
}

/// Transform list ops `a` against `b` (both derived from a base of
/// `base_len` elements) so the result applies after `b`. Ops whose target
/// element `b` already deleted are dropped.
pub fn transform_list(a: &[ListOp], b: &[ListOp], base_len: usize, a_priority: bool) -> Vec<ListOp> {
    let mut merged: Vec<Slot> = (0..base_len).map(Slot::Base).collect();
    apply_script_slots(&mut merged, b, Slot::Theirs);

    let mut ours: Vec<Slot> = (0..base_len).map(Slot::Base).collect();
    let mut out = Vec::new();
    let mut counter = 0;

    for op in a {
        match op {
            ListOp::DeleteAt { index } => {
                if *index >= ours.len() {
                    continue;
                }
                let slot = ours.remove(*index);
                if let Some(pos) = merged.iter().position(|s| *s == slot) {
                    merged.remove(pos);
                    out.push(ListOp::DeleteAt { index: pos });
                }
            }
            ListOp::InsertAt { index, value } => {
                let idx = (*index).min(ours.len());
                let pos = anchor_position(&ours, &merged, idx, a_priority);
                let slot = Slot::Ours(counter);
                counter += 1;
                ours.insert(idx, slot);
                merged.insert(pos, slot);
                out.push(ListOp::InsertAt {
                    index: pos,
                    value: value.clone(),
                });
            }
            ListOp::Move { from, to } => {
                if *from >= ours.len() {
                    continue;
                }
                let slot = ours.remove(*from);
                let to_idx = (*to).min(ours.len());
                if let Some(from_pos) = merged.iter().position(|s| *s == slot) {
                    merged.remove(from_pos);
                    let to_pos = anchor_position(&ours, &merged, to_idx, a_priority);
                    merged.insert(to_pos, slot);
                    out.push(ListOp::Move {
                        from: from_pos,
                        to: to_pos,
                    });
                }
                ours.insert(to_idx, slot);
            }
        }
    }

    out
}

/// Base indices a script deletes or moves.
fn touched_base_indices(ops: &[ListOp], base_len: usize) -> HashSet<usize> {
    let mut slots: Vec<Slot> = (0..base_len).map(Slot::Base).collect();
    let mut touched = HashSet::new();
    let mut counter = 0;

    for op in ops {
        match op {
            ListOp::InsertAt { index, .. } => {
                let idx = (*index).min(slots.len());
                slots.insert(idx, Slot::Ours(counter));
                counter += 1;
            }
            ListOp::DeleteAt { index } | ListOp::Move { from: index, .. } => {
                if *index < slots.len() {
                    if let Slot::Base(i) = slots[*index] {
                        touched.insert(i);
                    }
                    let slot = slots.remove(*index);
                    if let ListOp::Move { to, .. } = op {
                        slots.insert((*to).min(slots.len()), slot);
                    }
                }
            }
        }
    }

    touched
}

/// Three-way list merge. Both sides touching the same base element falls
/// back to the winning side wholesale.
pub fn merge_list(
    base: &[Value],
    client: &[Value],
    server: &[Value],
    client_wins: bool,
) -> Result<MergedList> {
    let client_ops = diff_list(base, client);
    let server_ops = diff_list(base, server);

    let client_touched = touched_base_indices(&client_ops, base.len());
    let server_touched = touched_base_indices(&server_ops, base.len());

    if client_touched.intersection(&server_touched).next().is_some() {
        let values = if client_wins { client } else { server };
        return Ok(MergedList {
            values: values.to_vec(),
            overlap_fallback: true,
        });
    }

    let server_applied = apply_list(base, &server_ops)?;
    let transformed = transform_list(&client_ops, &server_ops, base.len(), false);
    let values = apply_list(&server_applied, &transformed)?;

    Ok(MergedList {
        values,
        overlap_fallback: false,
    })
}
