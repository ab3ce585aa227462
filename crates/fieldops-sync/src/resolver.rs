// File: fieldops-sync/src/resolver.rs
// Purpose: Conflict resolution strategies applied to conflict records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::Result;
use crate::models::{ConflictPolicy, ConflictRecord, Payload};
use crate::ot;
use crate::registry::EntitySchema;

/// Which side's record survived resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Client,
    Server,
    Merged,
}

/// An automatic resolution outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub data: Payload,
    /// The policy that actually produced the result; an operational
    /// transform without a recoverable base reports last_write_wins here
    pub applied_policy: ConflictPolicy,
    pub winner: Winner,
}

/// Resolver verdict for one conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Auto(Resolution),
    /// Record persists until an explicit resolution is submitted
    Manual,
}

/// Pure resolution logic; no storage access. The caller supplies the base
/// payload (looked up by the client's etag) when the policy needs one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        conflict: &ConflictRecord,
        policy: ConflictPolicy,
        schema: &EntitySchema,
        base: Option<&Payload>,
    ) -> Result<Resolved> {
        match policy {
            ConflictPolicy::Manual => Ok(Resolved::Manual),
            ConflictPolicy::ClientWins => Ok(Resolved::Auto(Resolution {
                data: conflict.client_data.clone(),
                applied_policy: ConflictPolicy::ClientWins,
                winner: Winner::Client,
            })),
            ConflictPolicy::ServerWins => Ok(Resolved::Auto(Resolution {
                data: conflict.server_data.clone(),
                applied_policy: ConflictPolicy::ServerWins,
                winner: Winner::Server,
            })),
            ConflictPolicy::LastWriteWins => Ok(Resolved::Auto(last_write_wins(conflict))),
            ConflictPolicy::OperationalTransform => {
                // create/create conflicts merge from an empty base
                let empty = Payload::new();
                let base = match (base, &conflict.client_etag) {
                    (Some(base), _) => base,
                    (None, None) => &empty,
                    // base version no longer retained: merge is impossible
                    (None, Some(_)) => return Ok(Resolved::Auto(last_write_wins(conflict))),
                };

                Ok(Resolved::Auto(merge(conflict, schema, base)?))
            }
        }
    }
}

/// Later timestamp's full record wins wholesale; equal timestamps resolve to
/// the server side.
fn last_write_wins(conflict: &ConflictRecord) -> Resolution {
    if conflict.client_timestamp > conflict.server_timestamp {
        Resolution {
            data: conflict.client_data.clone(),
            applied_policy: ConflictPolicy::LastWriteWins,
            winner: Winner::Client,
        }
    } else {
        Resolution {
            data: conflict.server_data.clone(),
            applied_policy: ConflictPolicy::LastWriteWins,
            winner: Winner::Server,
        }
    }
}

fn merge(conflict: &ConflictRecord, schema: &EntitySchema, base: &Payload) -> Result<Resolution> {
    let client_wins = conflict.client_timestamp > conflict.server_timestamp;
    let client = &conflict.client_data;
    let server = &conflict.server_data;

    let keys: BTreeSet<&String> = base
        .keys()
        .chain(client.keys())
        .chain(server.keys())
        .collect();

    let mut data = Payload::new();
    for key in keys {
        let b = base.get(key.as_str());
        let c = client.get(key.as_str());
        let s = server.get(key.as_str());

        let merged = if c == s {
            c.cloned()
        } else if schema.is_mergeable_text(key) && is_textual(b, c, s) {
            let merged = ot::merge_text(
                text_of(b),
                text_of(c),
                text_of(s),
                client_wins,
            )?;
            Some(Value::String(merged.text))
        } else if schema.is_mergeable_list(key) && is_listual(b, c, s) {
            let merged = ot::merge_list(
                &items_of(b),
                &items_of(c),
                &items_of(s),
                client_wins,
            )?;
            Some(Value::Array(merged.values))
        } else if c == b {
            // client untouched, server changed
            s.cloned()
        } else if s == b {
            // server untouched, client changed
            c.cloned()
        } else if client_wins {
            c.cloned()
        } else {
            s.cloned()
        };

        if let Some(value) = merged {
            data.insert(key.to_string(), value);
        }
    }

    Ok(Resolution {
        data,
        applied_policy: ConflictPolicy::OperationalTransform,
        winner: Winner::Merged,
    })
}

fn is_textual(b: Option<&Value>, c: Option<&Value>, s: Option<&Value>) -> bool {
    [b, c, s]
        .iter()
        .all(|v| matches!(v, None | Some(Value::String(_)) | Some(Value::Null)))
}

fn is_listual(b: Option<&Value>, c: Option<&Value>, s: Option<&Value>) -> bool {
    [b, c, s]
        .iter()
        .all(|v| matches!(v, None | Some(Value::Array(_)) | Some(Value::Null)))
}

fn text_of(v: Option<&Value>) -> &str {
    v.and_then(Value::as_str).unwrap_or("")
}

fn items_of(v: Option<&Value>) -> Vec<Value> {
    v.and_then(Value::as_array).cloned().unwrap_or_default()
}
