// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Statically embedded operational guidance ("ROM").
//!
//! Orthogonal to the memory engine: a read-only document an agent can read
//! at discovery time to learn how the memory tools fit together.  `install`
//! drops it into the state directory without overwriting user edits.

use std::path::Path;

/// The guidance document, embedded at compile time.
pub const START_HERE: &str = r#"# START HERE: working with conversation memory

This runtime keeps your conversation in three tiers:

- **Live context**: the most recent messages, sent to you verbatim.
- **Summary**: older turns compressed into a running summary (you will see
  it as a system message starting with "Summary of earlier conversation").
- **Archive**: every message ever exchanged, stored durably and searchable.

## Large tool results

Tool outputs that are too big for the context window are stored out of band.
In their place you will see a reference like:

    DataRef[res_01HX, MEMORY, 482133]

Never guess at the contents behind a reference. Instead:

1. Call `get_tool_result` with the reference id. You get the data type, size,
   column schema, a small preview, and hints for the next step. You never get
   the full payload from this call.
2. Call `query_tool_result` to fetch what you actually need:
   - `offset`/`limit` pages through items;
   - `sql` filters server-side; reference the data as the table `results`,
     e.g. `SELECT name, total FROM results WHERE total > 100 ORDER BY total`.
   JSON arrays and CSV are converted to tables on demand.

Prefer SQL filtering over paging through thousands of items.

## Recalling older conversation

- `search_conversation` finds archived messages by content. Pass
  `promote: true` to pull the best hits back into your live context.
- `recall_conversation` pulls an exact offset/limit slice of the archive.
- `clear_recalled_context` removes everything you promoted, freeing budget.

Promotion is budget-checked: if the hits will not fit in the context window
the call fails with `token_budget_exceeded`; narrow the search instead.

## When tools keep failing

After repeated identical failures the result carries an escalation notice.
Do not retry the same call again: change the parameters, pick another tool,
or tell the user what is blocking you. `get_error_details` shows the failure
history for this session.
"#;

/// Write `START_HERE.md` into `dir` unless one already exists.
/// Returns true when the file was written.
pub fn install(dir: &Path) -> std::io::Result<bool> {
    let path = dir.join("START_HERE.md");
    if path.exists() {
        return Ok(false);
    }
    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, START_HERE)?;
    Ok(true)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
