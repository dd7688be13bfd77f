//! lftp command text builders.

/// Double-quote an argument for the lftp command line.
pub(crate) fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub(crate) fn set(key: &str, value: &str) -> String {
    format!("set {} {}", key, value)
}

pub(crate) fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// `open` with inline credentials. An empty password still carries the comma so
/// lftp does not prompt (key-based auth).
pub(crate) fn open(address: &str, port: u16, username: &str, password: &str) -> String {
    let user = format!("{},{}", username, password);
    format!("open -u {} -p {} sftp://{}", quote(&user), port, address)
}

pub(crate) fn queue_mirror(remote: &str, local: &str, parallel_files: u32, connections: u32) -> String {
    format!(
        "queue mirror -c --parallel={} --use-pget-n={} {} {}",
        parallel_files,
        connections,
        quote(remote),
        quote(local)
    )
}

pub(crate) fn queue_pget(remote: &str, local: &str, connections: u32) -> String {
    format!(
        "queue pget -c -n {} {} -o {}",
        connections,
        quote(remote),
        quote(local)
    )
}

pub(crate) fn kill(job_id: i64) -> String {
    format!("kill {}", job_id)
}

/// `queue --delete` with a wildcard matching the quoted remote path of a
/// queued `mirror`/`pget` command. The closing quote keeps `/r/a` from
/// matching `/r/ab`.
pub(crate) fn dequeue(remote: &str) -> String {
    format!("queue --delete {}", quote(&format!("*{}\"*", remote)))
}

pub(crate) const JOBS: &str = "jobs -v";
