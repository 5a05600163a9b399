//! Parsers for `/proc` filesystem files.
//!
//! Pure functions over file contents, so they are testable with string inputs.
//! Only the fields the metric source consumes are extracted.

use std::collections::HashMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Fields of `/proc/[pid]/stat` used for sampling.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    pub comm: String,
    pub utime: u64,
    pub stime: u64,
    pub num_threads: u32,
    /// Start time after boot, in clock ticks.
    pub starttime: u64,
    /// Resident set size, in pages.
    pub rss: u64,
}

/// Parses `/proc/[pid]/stat` content.
///
/// The comm field is enclosed in parentheses and may itself contain spaces
/// and parentheses, so fields are located relative to the last `)`.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let open = content
        .find('(')
        .ok_or_else(|| ParseError::new("missing '(' in stat"))?;
    let close = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;
    if close <= open {
        return Err(ParseError::new("invalid parentheses in stat"));
    }

    let comm = content[open + 1..close].to_string();

    // Indices below are relative to the first field after the comm (state = 0).
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if fields.len() < 22 {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected 22+, got {}",
            fields.len()
        )));
    }

    let num = |idx: usize, name: &str| -> Result<u64, ParseError> {
        fields[idx]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid {}", name)))
    };
    // rss is signed in the kernel ABI; clamp garbage negatives to zero.
    let rss: i64 = fields[21]
        .parse()
        .map_err(|_| ParseError::new("invalid rss"))?;

    Ok(ProcStat {
        comm,
        utime: num(11, "utime")?,
        stime: num(12, "stime")?,
        num_threads: num(17, "num_threads")? as u32,
        starttime: num(19, "starttime")?,
        rss: rss.max(0) as u64,
    })
}

/// Fields of `/proc/[pid]/status` used for sampling.
#[derive(Debug, Clone, Default)]
pub struct ProcStatus {
    /// Real uid.
    pub uid: u32,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
}

/// Parses `/proc/[pid]/status` content (`Key:\tvalue` lines).
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let mut status = ProcStatus::default();
    let mut seen_uid = false;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Uid" => {
                // real effective saved fs
                status.uid = value
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| ParseError::new("invalid Uid line"))?;
                seen_uid = true;
            }
            "voluntary_ctxt_switches" => {
                status.voluntary_ctxt_switches = value.parse().unwrap_or(0);
            }
            "nonvoluntary_ctxt_switches" => {
                status.nonvoluntary_ctxt_switches = value.parse().unwrap_or(0);
            }
            _ => {}
        }
    }

    if !seen_uid {
        return Err(ParseError::new("missing Uid in status"));
    }
    Ok(status)
}

/// Storage-layer byte counters from `/proc/[pid]/io`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Parses `/proc/[pid]/io` content. Unknown keys are ignored.
pub fn parse_proc_io(content: &str) -> ProcIo {
    let mut io = ProcIo::default();
    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().parse().unwrap_or(0);
            match key.trim() {
                "read_bytes" => io.read_bytes = value,
                "write_bytes" => io.write_bytes = value,
                _ => {}
            }
        }
    }
    io
}

/// Memory totals from `/proc/meminfo`, in kB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemInfo {
    pub mem_total: u64,
    pub mem_available: u64,
}

/// Parses `/proc/meminfo` content.
pub fn parse_meminfo(content: &str) -> Result<MemInfo, ParseError> {
    let mut info = MemInfo::default();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next();
        let kb = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        match key {
            Some("MemTotal:") => info.mem_total = kb,
            Some("MemAvailable:") => info.mem_available = kb,
            _ => {}
        }
    }

    if info.mem_total == 0 {
        return Err(ParseError::new("MemTotal missing or zero"));
    }
    Ok(info)
}

/// Aggregate cpu line and boot time from `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalStat {
    /// Ticks spent in any non-idle state.
    pub cpu_busy: u64,
    /// Ticks spent in all states (busy + idle + iowait).
    pub cpu_total: u64,
    /// Boot time, seconds since the epoch.
    pub btime: u64,
}

/// Parses `/proc/stat` content.
///
/// Guest time is already folded into user/nice by the kernel, so only the
/// first eight columns are summed.
pub fn parse_global_stat(content: &str) -> Result<GlobalStat, ParseError> {
    let mut stat = GlobalStat::default();
    let mut seen_cpu = false;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("cpu") => {
                let vals: Vec<u64> = parts.take(8).map(|s| s.parse().unwrap_or(0)).collect();
                let idle = vals.get(3).copied().unwrap_or(0) + vals.get(4).copied().unwrap_or(0);
                stat.cpu_total = vals.iter().sum();
                stat.cpu_busy = stat.cpu_total.saturating_sub(idle);
                seen_cpu = true;
            }
            Some("btime") => {
                stat.btime = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
            }
            _ => {}
        }
    }

    if !seen_cpu {
        return Err(ParseError::new("missing aggregate cpu line in stat"));
    }
    Ok(stat)
}

/// Byte counters summed over every interface in `/proc/net/dev`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetTotals {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Parses `/proc/net/dev` content, summing all interfaces including loopback.
pub fn parse_net_dev(content: &str) -> NetTotals {
    let mut totals = NetTotals::default();

    for line in content.lines() {
        // Header lines carry the '|' column separators.
        if line.contains('|') {
            continue;
        }
        let Some((_iface, rest)) = line.split_once(':') else {
            continue;
        };
        let values: Vec<u64> = rest
            .split_whitespace()
            .map(|s| s.parse().unwrap_or(0))
            .collect();
        if values.len() < 16 {
            continue;
        }
        totals.rx_bytes = totals.rx_bytes.saturating_add(values[0]);
        totals.tx_bytes = totals.tx_bytes.saturating_add(values[8]);
    }

    totals
}

/// Parses `/etc/passwd` content into a uid → username map.
pub fn parse_passwd(content: &str) -> HashMap<u32, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split(':');
            let name = parts.next()?;
            let uid = parts.nth(1)?.parse().ok()?;
            Some((uid, name.to_string()))
        })
        .collect()
}

/// uid → username lookups backed by a cached `/etc/passwd`.
#[derive(Debug, Clone, Default)]
pub struct UserResolver {
    uid_to_name: HashMap<u32, String>,
}

impl UserResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_content(&mut self, content: &str) {
        self.uid_to_name = parse_passwd(content);
    }

    /// Returns the username for `uid`, if known.
    pub fn resolve(&self, uid: u32) -> Option<&str> {
        self.uid_to_name.get(&uid).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_passwd() {
        let content = "\
root:x:0:0:root:/root:/bin/bash
# comment
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
broken-line
";
        let map = parse_passwd(content);
        assert_eq!(map.get(&0).map(String::as_str), Some("root"));
        assert_eq!(map.get(&1).map(String::as_str), Some("daemon"));
        assert_eq!(map.get(&65534).map(String::as_str), Some("nobody"));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_user_resolver() {
        let mut resolver = UserResolver::new();
        resolver.load_from_content("root:x:0:0::/root:/bin/bash\nuser:x:1000:1000::/home/user:/bin/bash");

        assert_eq!(resolver.resolve(0), Some("root"));
        assert_eq!(resolver.resolve(1000), Some("user"));
        assert_eq!(resolver.resolve(9999), None);
    }

    #[test]
    fn test_parse_proc_stat_basic() {
        let content = "1234 (bash) S 1233 1234 1234 34816 1235 4194304 5000 50000 10 20 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 5 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.comm, "bash");
        assert_eq!(stat.utime, 100);
        assert_eq!(stat.stime, 50);
        assert_eq!(stat.num_threads, 1);
        assert_eq!(stat.starttime, 100000);
        assert_eq!(stat.rss, 2000);
    }

    #[test]
    fn test_parse_proc_stat_with_parentheses_in_comm() {
        let content = "5001 (test (1)) S 1 5001 5001 0 -1 4194304 1000 0 0 0 10 5 0 0 20 0 3 0 500100 10000000 1000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0";
        let stat = parse_proc_stat(content).unwrap();

        assert_eq!(stat.comm, "test (1)");
        assert_eq!(stat.num_threads, 3);
    }

    #[test]
    fn test_parse_proc_stat_truncated() {
        let err = parse_proc_stat("42 (short) S 1 2 3").unwrap_err();
        assert!(err.message.contains("not enough fields"));
        assert!(parse_proc_stat("garbage").is_err());
    }

    #[test]
    fn test_parse_proc_status() {
        let content = "\
Name:\tbash
Pid:\t1234
PPid:\t1233
Uid:\t1000\t1001\t1000\t1000
Gid:\t1000\t1000\t1000\t1000
voluntary_ctxt_switches:\t500
nonvoluntary_ctxt_switches:\t50
";
        let status = parse_proc_status(content).unwrap();

        assert_eq!(status.uid, 1000);
        assert_eq!(status.voluntary_ctxt_switches, 500);
        assert_eq!(status.nonvoluntary_ctxt_switches, 50);
    }

    #[test]
    fn test_parse_proc_status_without_uid() {
        assert!(parse_proc_status("Name:\tbash\n").is_err());
    }

    #[test]
    fn test_parse_proc_io() {
        let content = "\
rchar: 1000000
wchar: 500000
syscr: 5000
syscw: 2500
read_bytes: 100000
write_bytes: 50000
cancelled_write_bytes: 1000
";
        let io = parse_proc_io(content);
        assert_eq!(io.read_bytes, 100000);
        assert_eq!(io.write_bytes, 50000);
        assert_eq!(parse_proc_io(""), ProcIo::default());
    }

    #[test]
    fn test_parse_meminfo() {
        let content = "MemTotal:       16384000 kB\nMemFree:  100 kB\nMemAvailable:   12000000 kB\n";
        let info = parse_meminfo(content).unwrap();
        assert_eq!(info.mem_total, 16384000);
        assert_eq!(info.mem_available, 12000000);
        assert!(parse_meminfo("MemFree: 1 kB\n").is_err());
    }

    #[test]
    fn test_parse_global_stat() {
        let content = "\
cpu  10000 500 3000 80000 1000 200 100 50 7 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
ctxt 500000
btime 1700000000
";
        let stat = parse_global_stat(content).unwrap();
        assert_eq!(stat.cpu_total, 10000 + 500 + 3000 + 80000 + 1000 + 200 + 100 + 50);
        assert_eq!(stat.cpu_busy, 10000 + 500 + 3000 + 200 + 100 + 50);
        assert_eq!(stat.btime, 1700000000);
        assert!(parse_global_stat("btime 1\n").is_err());
    }

    #[test]
    fn test_parse_net_dev_sums_interfaces() {
        let content = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000     10    0    0    0     0          0         0  2000     10    0    0    0     0       0          0
  eth0: 5000   6543    0    0    0     0          0         0  7000   4567    0    0    0     0       0          0
";
        let totals = parse_net_dev(content);
        assert_eq!(totals.rx_bytes, 6000);
        assert_eq!(totals.tx_bytes, 9000);
    }
}
