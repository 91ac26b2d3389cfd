//! Change-log decoding from transaction logs.
//!
//! Events arrive as `Program data: <base64>` log lines. The runtime writes
//! them on behalf of whichever program is executing, so lines are
//! attributed by tracking `invoke [n]` / `success` / `failed` nesting and
//! only those written while the graph program is on top are decoded.
//!
//! The runtime caps a transaction's log output. Past the cap it writes a
//! single `Log truncated` line and drops everything else, events included,
//! so such a transaction cannot be mirrored from its logs.

use anchor_lang::prelude::Pubkey;
use anchor_lang::{AnchorDeserialize, Discriminator, Event};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use graph::RelationEvent;

use crate::error::{IndexerError, IndexerResult};
use crate::source::SourceTransaction;

const PROGRAM_DATA: &str = "Program data: ";
const LOG_TRUNCATED: &str = "Log truncated";

/// Whether the runtime cut `logs` short.
pub fn logs_truncated(logs: &[String]) -> bool {
    logs.iter().any(|line| line.starts_with(LOG_TRUNCATED))
}

/// Payloads of every `Program data:` line written by `program_id`.
pub fn program_data<'a>(logs: &'a [String], program_id: &Pubkey) -> Vec<&'a str> {
    let program = program_id.to_string();
    let mut stack: Vec<&str> = Vec::new();
    let mut payloads = Vec::new();

    for line in logs {
        if let Some(payload) = line.strip_prefix(PROGRAM_DATA) {
            if stack.last() == Some(&program.as_str()) {
                payloads.push(payload);
            }
            continue;
        }
        let Some(rest) = line.strip_prefix("Program ") else {
            continue;
        };
        let mut words = rest.split_whitespace();
        let (Some(id), Some(verb)) = (words.next(), words.next()) else {
            continue;
        };
        match verb {
            "invoke" => stack.push(id),
            "success" | "failed:" => {
                stack.pop();
            }
            _ => {}
        }
    }

    payloads
}

/// Decode one payload. `Ok(None)` means a well-formed payload of some other
/// event type.
pub fn decode_event(payload: &str) -> IndexerResult<Option<RelationEvent>> {
    let mut bytes = Vec::new();
    for chunk in payload.split_whitespace() {
        let decoded = STANDARD
            .decode(chunk)
            .map_err(|e| IndexerError::decode_error(format!("base64: {e}")))?;
        bytes.extend_from_slice(&decoded);
    }

    if bytes.len() < 8 {
        return Err(IndexerError::decode_error(format!(
            "payload of {} bytes has no discriminator",
            bytes.len()
        )));
    }
    if bytes[..8] != RelationEvent::DISCRIMINATOR[..] {
        return Ok(None);
    }

    RelationEvent::try_from_slice(&bytes[8..])
        .map(Some)
        .map_err(|e| IndexerError::decode_error(format!("borsh: {e}")))
}

/// Every relation event in `tx`, in log order. A bad payload yields an
/// error entry and does not hide the events around it.
pub fn decode_transaction(
    tx: &SourceTransaction,
    program_id: &Pubkey,
) -> Vec<IndexerResult<RelationEvent>> {
    program_data(&tx.logs, program_id)
        .into_iter()
        .filter_map(|payload| decode_event(payload).transpose())
        .collect()
}

/// Log line carrying `event`, as the runtime prints it.
pub fn event_log_line(event: &RelationEvent) -> String {
    format!("{PROGRAM_DATA}{}", STANDARD.encode(event.data()))
}

/// Log lines of a top-level invocation of `program_id` emitting `events`.
pub fn invocation_logs(program_id: &Pubkey, events: &[RelationEvent]) -> Vec<String> {
    let mut logs = vec![format!("Program {program_id} invoke [1]")];
    logs.extend(events.iter().map(event_log_line));
    logs.push(format!("Program {program_id} consumed 4200 of 200000 compute units"));
    logs.push(format!("Program {program_id} success"));
    logs
}
