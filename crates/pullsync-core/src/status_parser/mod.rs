//! Parser for lftp's `jobs -v` status dump.
//!
//! The dump is polled from a live process and may be observed mid-write, so
//! parsing is best-effort per block: a block that cannot be read is dropped
//! and reported in [`ParsedStatus::diagnostics`], the rest still parse.
//!
//! Block layout:
//! - `[N] queue (url) ...` with a `Commands queued:` list of ` n. mirror|pget ...`
//!   entries, each a queued job without an assigned id.
//! - `[N] mirror <flags> <remote> <local> [-- <total progress>]`, followed by
//!   `\transfer` / per-file progress lines.
//! - `[N] pget <flags> <remote> -o <local>`, followed by one per-file progress line.

mod command;
mod progress;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::job_status::{
    InvalidOperation, JobKind, JobState, JobStatus, TransferState, UNASSIGNED_JOB_ID,
};

use command::{parse_command, JobCommand};
use progress::{parse_file_line, parse_total, parse_transfer_line, FileProgress};

pub use progress::{parse_eta, parse_size};

/// `[<id>] <command...>` at column 0.
static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(?P<id>\d+)\]\s+(?P<rest>.*)$").expect("valid header regex"));

/// ` <n>. <command...>` inside a queue block.
static QUEUED_ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<ord>\d+)\.\s+(?P<rest>.+)$").expect("valid queue entry regex"));

/// Why one block of the dump was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("line {line}: unterminated quote in `{text}`")]
    UnterminatedQuote { line: usize, text: String },
    #[error("line {line}: {command} is missing its {argument}")]
    MissingArgument {
        line: usize,
        command: &'static str,
        argument: &'static str,
    },
    #[error("line {line}: malformed progress `{text}`")]
    MalformedProgress { line: usize, text: String },
    #[error("line {line}: unsupported job command `{command}`")]
    UnsupportedCommand { line: usize, command: String },
    #[error("line {line}: pget job reports more than one transfer")]
    ExtraPgetTransfer { line: usize },
    #[error(transparent)]
    InvalidOperation(#[from] InvalidOperation),
}

/// Result of parsing one dump: jobs in dump order plus dropped-block diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedStatus {
    pub jobs: Vec<JobStatus>,
    pub diagnostics: Vec<ParseError>,
    /// Ids of the blocks that were dropped. An unreadable queued entry is
    /// recorded as [`UNASSIGNED_JOB_ID`].
    pub dropped_job_ids: Vec<i64>,
}

impl ParsedStatus {
    pub fn into_jobs(self) -> Vec<JobStatus> {
        self.jobs
    }

    /// Whether the job with `id` may be in the dump but could not be read.
    pub fn was_dropped(&self, id: i64) -> bool {
        self.dropped_job_ids.contains(&id)
    }

    fn record_drop(&mut self, id: i64, error: ParseError) {
        if !self.dropped_job_ids.contains(&id) {
            self.dropped_job_ids.push(id);
        }
        self.diagnostics.push(error);
    }
}

/// One header line plus its indented body. Line numbers are 1-based.
struct Block<'a> {
    line: usize,
    id: i64,
    rest: &'a str,
    body: Vec<(usize, &'a str)>,
}

fn split_blocks(raw: &str) -> Vec<Block<'_>> {
    let mut blocks: Vec<Block<'_>> = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(caps) = HEADER_RE.captures(line) {
            // Only an id overflowing i64 fails here.
            let id = caps["id"].parse::<i64>().unwrap_or(UNASSIGNED_JOB_ID);
            let rest = caps.name("rest").map_or("", |m| m.as_str());
            blocks.push(Block {
                line: line_no,
                id,
                rest,
                body: Vec::new(),
            });
        } else if line.trim().is_empty() {
            continue;
        } else if let Some(block) = blocks.last_mut() {
            block.body.push((line_no, line.trim()));
        } else {
            tracing::debug!(line = line_no, "status text before first job header: {}", line);
        }
    }
    blocks
}

/// Parse a full `jobs -v` dump. Empty input yields an empty result.
pub fn parse(raw: &str) -> ParsedStatus {
    let mut parsed = ParsedStatus::default();
    for block in split_blocks(raw) {
        let outcome = if block.rest.starts_with("queue ") || block.rest == "queue" {
            parse_queue_block(&block, &mut parsed)
        } else {
            parse_job_block(&block).map(|job| vec![job])
        };
        match outcome {
            Ok(jobs) => parsed.jobs.extend(jobs),
            Err(e) => {
                tracing::warn!(job_id = block.id, "dropping status block: {}", e);
                parsed.record_drop(block.id, e);
            }
        }
    }
    parsed
}

/// Queued entries of a `[N] queue (...)` block. Each entry is independent:
/// an unreadable one is reported and the others are kept.
fn parse_queue_block(
    block: &Block<'_>,
    parsed: &mut ParsedStatus,
) -> Result<Vec<JobStatus>, ParseError> {
    let mut jobs = Vec::new();
    let mut in_queued_section = false;
    for &(line, text) in &block.body {
        if text.starts_with("Commands queued:") {
            in_queued_section = true;
            continue;
        }
        if text.starts_with("Now executing:") {
            continue;
        }
        if !in_queued_section {
            continue;
        }
        let Some(caps) = QUEUED_ENTRY_RE.captures(text) else {
            continue;
        };
        match parse_command(&caps["rest"], line) {
            Ok(cmd) => jobs.push(JobStatus::new(
                UNASSIGNED_JOB_ID,
                cmd.kind,
                JobState::Queued,
                cmd.name,
                cmd.flags,
            )),
            Err(e) => {
                tracing::warn!(line, "dropping queued entry: {}", e);
                parsed.record_drop(UNASSIGNED_JOB_ID, e);
            }
        }
    }
    Ok(jobs)
}

fn parse_job_block(block: &Block<'_>) -> Result<JobStatus, ParseError> {
    let cmd = parse_command(block.rest, block.line)?;
    let total = match &cmd.progress {
        Some(text) => parse_total(text).map_err(|()| ParseError::MalformedProgress {
            line: block.line,
            text: text.clone(),
        })?,
        None => None,
    };
    let files = parse_file_lines(block)?;

    match cmd.kind {
        JobKind::Mirror => build_mirror(block, cmd, total, files),
        JobKind::Pget => build_pget(block, cmd, files),
    }
}

/// Per-file lines of a block, named by the preceding `\transfer` line when present.
fn parse_file_lines(block: &Block<'_>) -> Result<Vec<(usize, FileProgress)>, ParseError> {
    let mut files = Vec::new();
    let mut announced: Option<String> = None;
    for &(line, text) in &block.body {
        if let Some(path) = parse_transfer_line(text) {
            announced = Some(path);
            continue;
        }
        if text.starts_with("\\mirror") {
            announced = None;
            continue;
        }
        match parse_file_line(text) {
            None => {}
            Some(Ok(mut file)) => {
                if let Some(path) = announced.take() {
                    file.name = path;
                }
                files.push((line, file));
            }
            Some(Err(())) => {
                return Err(ParseError::MalformedProgress {
                    line,
                    text: text.to_string(),
                })
            }
        }
    }
    Ok(files)
}

fn build_mirror(
    block: &Block<'_>,
    cmd: JobCommand,
    total: Option<TransferState>,
    files: Vec<(usize, FileProgress)>,
) -> Result<JobStatus, ParseError> {
    let started = cmd.progress.is_some() || !files.is_empty();
    let state = if started {
        JobState::Running
    } else {
        JobState::Queued
    };
    let mut status = JobStatus::new(block.id, JobKind::Mirror, state, cmd.name, cmd.flags);
    if let Some(total) = total {
        status.set_total_transfer_state(total)?;
    }
    for (_, file) in files {
        status.add_active_file_transfer_state(file.name, file.state)?;
    }
    Ok(status)
}

fn build_pget(
    block: &Block<'_>,
    cmd: JobCommand,
    files: Vec<(usize, FileProgress)>,
) -> Result<JobStatus, ParseError> {
    if let Some((line, _)) = files.get(1) {
        return Err(ParseError::ExtraPgetTransfer { line: *line });
    }
    let Some((_, file)) = files.into_iter().next() else {
        return Ok(JobStatus::new(
            block.id,
            JobKind::Pget,
            JobState::Queued,
            cmd.name,
            cmd.flags,
        ));
    };
    let mut status = JobStatus::new(block.id, JobKind::Pget, JobState::Running, cmd.name, cmd.flags);
    status.set_total_transfer_state(file.state)?;
    Ok(status)
}
