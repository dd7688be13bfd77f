//! Progress fragments: job totals after ` -- `, per-file lines, sizes and ETAs.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::job_status::TransferState;

/// `<done>/<total> (<pct>%) [<speed>/s] [eta:<eta>]`
static TOTAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<done>[\d.]+\s?[A-Za-z]*)/(?P<total>[\d.]+\s?[A-Za-z]*)\s+\((?P<pct>\d+)%\)(?:\s+(?P<speed>[\d.]+\s?[A-Za-z]*)/s)?(?:\s+eta:(?P<eta>\w+))?\s*$",
    )
    .expect("valid total regex")
});

/// `` `<file>' at <done> (<pct>%) ... `` or `` `<file>', got <done> of <total> (<pct>%) ... ``
static FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^`(?P<name>.*)'(?:,\s+got\s+(?P<got>\d+)\s+of\s+(?P<of>\d+)|\s+at\s+(?P<at>\d+))(?:\s+\((?P<pct>\d+)%\))?(?:\s+(?P<speed>[\d.]+\s?[A-Za-z]*)/s)?(?:\s+eta:(?P<eta>\w+))?(?:\s+\[(?P<desc>[^\]]*)\])?\s*$",
    )
    .expect("valid file regex")
});

/// `\transfer `<path>'`
static TRANSFER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\transfer\s+`(?P<name>.*)'\s*$").expect("valid transfer regex"));

static ETA_PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)([dhms])").expect("valid eta regex"));

/// A per-file progress line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileProgress {
    pub name: String,
    pub state: TransferState,
}

/// Parse a size like `1433`, `1.4k`, `26M`, `15.8 KiB`. Binary multiples.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    let value: f64 = number.parse().ok()?;
    let unit = unit.trim();
    let mut unit_chars = unit.chars();
    let multiplier: f64 = match unit_chars.next().map(|c| c.to_ascii_lowercase()) {
        None | Some('b') if unit.len() <= 1 => 1.0,
        Some('k') => 1024.0,
        Some('m') => 1024.0 * 1024.0,
        Some('g') => 1024.0 * 1024.0 * 1024.0,
        Some('t') => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    let suffix = unit_chars.as_str().to_ascii_lowercase();
    if !matches!(suffix.as_str(), "" | "b" | "ib") {
        return None;
    }
    Some((value * multiplier).round() as u64)
}

/// Parse an lftp ETA such as `11s`, `2m`, `1h5m`, `1d3h`.
pub fn parse_eta(text: &str) -> Option<u64> {
    let mut seconds = 0u64;
    let mut consumed = 0usize;
    for caps in ETA_PART_RE.captures_iter(text) {
        let whole = caps.get(0)?;
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();
        let n: u64 = caps[1].parse().ok()?;
        let unit = match &caps[2] {
            "d" => 86_400,
            "h" => 3_600,
            "m" => 60,
            _ => 1,
        };
        seconds = seconds.saturating_add(n.saturating_mul(unit));
    }
    if consumed == 0 || consumed != text.len() {
        return None;
    }
    Some(seconds)
}

fn optional<T>(
    caps: &Captures<'_>,
    group: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, ()> {
    match caps.name(group) {
        None => Ok(None),
        Some(m) => parse(m.as_str()).map(Some).ok_or(()),
    }
}

fn percent(caps: &Captures<'_>) -> Option<u8> {
    match caps.name("pct") {
        None => Some(0),
        Some(m) => m.as_str().parse::<u16>().ok().map(|p| p.min(100) as u8),
    }
}

/// Job total from the text after ` -- `. `Ok(None)` for an empty fragment.
pub(crate) fn parse_total(text: &str) -> Result<Option<TransferState>, ()> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let caps = TOTAL_RE.captures(text).ok_or(())?;
    let done = parse_size(&caps["done"]).ok_or(())?;
    let total = parse_size(&caps["total"]).ok_or(())?;
    let pct = percent(&caps).ok_or(())?;
    let speed = optional(&caps, "speed", parse_size)?.unwrap_or(0);
    let eta = optional(&caps, "eta", parse_eta)?.unwrap_or(0);
    Ok(Some(TransferState::new(done, total, pct, speed, eta)))
}

/// Per-file progress line (already trimmed). `None` if the line is not a file line.
/// `Some(Err(()))` if it starts like one but cannot be read.
pub(crate) fn parse_file_line(line: &str) -> Option<Result<FileProgress, ()>> {
    if !line.starts_with('`') {
        return None;
    }
    let Some(caps) = FILE_RE.captures(line) else {
        return Some(Err(()));
    };
    Some(file_progress(&caps))
}

fn file_progress(caps: &Captures<'_>) -> Result<FileProgress, ()> {
    let pct = percent(caps).ok_or(())?;
    let (done, total) = match (caps.name("got"), caps.name("of"), caps.name("at")) {
        (Some(got), Some(of), _) => (
            got.as_str().parse::<u64>().map_err(|_| ())?,
            of.as_str().parse::<u64>().map_err(|_| ())?,
        ),
        (_, _, Some(at)) => {
            let done = at.as_str().parse::<u64>().map_err(|_| ())?;
            let total = if pct == 0 {
                0
            } else {
                done.saturating_mul(100) / u64::from(pct)
            };
            (done, total)
        }
        _ => return Err(()),
    };
    let speed = optional(caps, "speed", parse_size)?.unwrap_or(0);
    let eta = optional(caps, "eta", parse_eta)?.unwrap_or(0);
    Ok(FileProgress {
        name: caps["name"].to_string(),
        state: TransferState::new(done, total, pct, speed, eta),
    })
}

/// File path announced by a `\transfer` line.
pub(crate) fn parse_transfer_line(line: &str) -> Option<String> {
    TRANSFER_RE
        .captures(line)
        .map(|caps| caps["name"].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(parse_size("1433"), Some(1433));
        assert_eq!(parse_size("1.4k"), Some(1434));
        assert_eq!(parse_size("26M"), Some(26 * 1024 * 1024));
        assert_eq!(parse_size("15.8 KiB"), Some(16179));
        assert_eq!(parse_size("2 GB"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("12b"), Some(12));
        assert_eq!(parse_size("3 parsecs"), None);
        assert_eq!(parse_size("abc"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn etas() {
        assert_eq!(parse_eta("11s"), Some(11));
        assert_eq!(parse_eta("2m"), Some(120));
        assert_eq!(parse_eta("1h5m"), Some(3900));
        assert_eq!(parse_eta("1d3h"), Some(97_200));
        assert_eq!(parse_eta("soon"), None);
        assert_eq!(parse_eta("5m!"), None);
        assert_eq!(parse_eta(""), None);
    }

    #[test]
    fn total_fragment() {
        let t = parse_total("25M/26M (96%) 1.2 MiB/s eta:2s").unwrap().unwrap();
        assert_eq!(t.bytes_done, 25 * 1024 * 1024);
        assert_eq!(t.bytes_total, 26 * 1024 * 1024);
        assert_eq!(t.percent_complete, 96);
        assert_eq!(t.speed_bytes_per_sec, 1_258_291);
        assert_eq!(t.eta_seconds, 2);
        assert_eq!(parse_total("   "), Ok(None));
        assert_eq!(parse_total("1.4k/"), Err(()));
    }

    #[test]
    fn file_line_at_form_derives_total() {
        let f = parse_file_line("`c.iso' at 2424832 (17%) 1.1M/s eta:11s [Receiving data]")
            .unwrap()
            .unwrap();
        assert_eq!(f.name, "c.iso");
        assert_eq!(f.state.bytes_done, 2_424_832);
        assert_eq!(f.state.bytes_total, 14_263_717);
        assert_eq!(f.state.percent_complete, 17);
        assert_eq!(f.state.speed_bytes_per_sec, 1_153_434);
        assert_eq!(f.state.eta_seconds, 11);
    }

    #[test]
    fn file_line_got_form() {
        let f = parse_file_line("`aa1', got 512 of 2048 (25%) 2.6K/s eta:1m")
            .unwrap()
            .unwrap();
        assert_eq!(f.state, TransferState::new(512, 2048, 25, 2662, 60));
    }

    #[test]
    fn file_line_without_percent() {
        let f = parse_file_line("`x' at 0 [Connecting...]").unwrap().unwrap();
        assert_eq!(f.state, TransferState::new(0, 0, 0, 0, 0));
    }

    #[test]
    fn non_file_and_truncated_lines() {
        assert!(parse_file_line("sftp://user@host/dir").is_none());
        assert_eq!(parse_file_line("`half-writ"), Some(Err(())));
        assert_eq!(
            parse_transfer_line("\\transfer `a/aa1'").as_deref(),
            Some("a/aa1")
        );
        assert!(parse_transfer_line("\\mirror `ab'  -- ").is_none());
    }
}
