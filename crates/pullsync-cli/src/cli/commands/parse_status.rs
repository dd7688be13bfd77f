//! `pullsync parse-status` – inspect a saved `jobs -v` dump offline.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use pullsync_core::job_status::{JobStatus, TransferState};
use pullsync_core::status_parser::{self, ParsedStatus};
use serde_json::{json, Value};

pub fn run_parse_status(file: &Path, as_json: bool) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read status dump {}", file.display()))?;
    let parsed = status_parser::parse(&raw);
    if as_json {
        let text = serde_json::to_string_pretty(&to_json(&parsed)).context("encode JSON")?;
        println!("{}", text);
    } else {
        print!("{}", render_table(&parsed));
    }
    Ok(())
}

fn job_json(job: &JobStatus) -> Value {
    let mut files: Vec<(&str, &TransferState)> = job.active_file_transfer_states().collect();
    files.sort_by(|a, b| a.0.cmp(b.0));
    let files: serde_json::Map<String, Value> = files
        .into_iter()
        .map(|(name, state)| (name.to_string(), json!(state)))
        .collect();
    json!({
        "id": job.id(),
        "kind": job.kind().as_str(),
        "state": job.state().to_string(),
        "name": job.name(),
        "flags": job.flags(),
        "total": job.total_transfer_state(),
        "files": files,
    })
}

pub(crate) fn to_json(parsed: &ParsedStatus) -> Value {
    json!({
        "jobs": parsed.jobs.iter().map(job_json).collect::<Vec<_>>(),
        "diagnostics": parsed.diagnostics.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        "dropped_job_ids": parsed.dropped_job_ids,
    })
}

fn progress(state: Option<&TransferState>) -> String {
    match state {
        Some(s) => format!(
            "{:>3.0}% {}/{} {}/s",
            s.fraction() * 100.0,
            human_bytes(s.bytes_done),
            human_bytes(s.bytes_total),
            human_bytes(s.speed_bytes_per_sec)
        ),
        None => "-".to_string(),
    }
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub(crate) fn render_table(parsed: &ParsedStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>4}  {:<6}  {:<7}  {:<40}  NAME", "ID", "KIND", "STATE", "PROGRESS");
    for job in &parsed.jobs {
        let _ = writeln!(
            out,
            "{:>4}  {:<6}  {:<7}  {:<40}  {}",
            job.id(),
            job.kind().as_str(),
            job.state().to_string(),
            progress(job.total_transfer_state()),
            job.name()
        );
        let mut files: Vec<_> = job.active_file_transfer_states().collect();
        files.sort_by(|a, b| a.0.cmp(b.0));
        for (name, state) in files {
            let _ = writeln!(out, "{:>4}  {:<6}  {:<7}  {:<40}    {}", "", "", "", progress(Some(state)), name);
        }
    }
    for diag in &parsed.diagnostics {
        let _ = writeln!(out, "dropped block: {}", diag);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
[1] mirror -c /r/Show /l/Show  -- 1024/4096 (25%) 1.0 KiB/s
\t\\transfer `Show/e1.mkv'
\t`e1.mkv' at 512 (50%) 256b/s
[2] pget \"/r/unterminated
[3] pget -c /r/a.iso -o /l/
";

    #[test]
    fn table_lists_jobs_files_and_diagnostics() {
        let table = render_table(&status_parser::parse(DUMP));
        let lines: Vec<_> = table.lines().collect();
        assert!(lines[0].starts_with("  ID  KIND"));
        assert!(lines[1].contains("mirror") && lines[1].contains("running"));
        assert!(lines[1].contains(" 25% 1.0 KiB/4.0 KiB 1.0 KiB/s"));
        assert!(lines[1].ends_with("Show"));
        assert!(lines[2].ends_with("Show/e1.mkv"));
        assert!(lines[3].contains("pget") && lines[3].contains("queued"));
        assert!(lines[4].starts_with("dropped block: line 4"));
    }

    #[test]
    fn progress_uses_byte_counts() {
        // Byte counts win over the integer percentage.
        let state = TransferState::new(999, 1000, 99, 0, 0);
        assert!(progress(Some(&state)).starts_with("100% "));
        assert_eq!(progress(None), "-");
    }

    #[test]
    fn json_shape() {
        let v = to_json(&status_parser::parse(DUMP));
        assert_eq!(v["jobs"][0]["kind"], "mirror");
        assert_eq!(v["jobs"][0]["total"]["bytes_total"], 4096);
        assert_eq!(v["jobs"][0]["files"]["Show/e1.mkv"]["percent_complete"], 50);
        assert_eq!(v["jobs"][1]["id"], 3);
        assert!(v["jobs"][1]["total"].is_null());
        assert_eq!(v["diagnostics"].as_array().unwrap().len(), 1);
        assert_eq!(v["dropped_job_ids"], json!([2]));
    }

    #[test]
    fn human_sizes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }
}
