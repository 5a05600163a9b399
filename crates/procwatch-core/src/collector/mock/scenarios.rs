//! Pre-built mock filesystem scenarios for testing.

use super::filesystem::MockFs;
use crate::collector::traits::DiskUsage;

/// Boot time written to `/proc/stat` by every scenario.
pub const MOCK_BTIME: u64 = 1_700_000_000;

/// Renders a `/proc/[pid]/stat` line with the fields the source reads.
fn stat_line(
    pid: u32,
    comm: &str,
    ticks: (u64, u64),
    num_threads: u32,
    starttime: u64,
    rss_pages: u64,
) -> String {
    format!(
        "{pid} ({comm}) S 1 {pid} {pid} 0 -1 4194304 1000 0 10 0 {} {} 0 0 20 0 {num_threads} 0 \
         {starttime} 104857600 {rss_pages} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0",
        ticks.0, ticks.1,
    )
}

fn status_lines(name: &str, pid: u32, uid: u32, voluntary: u64, nonvoluntary: u64) -> String {
    format!(
        "Name:\t{name}\nPid:\t{pid}\nPPid:\t1\nUid:\t{uid}\t{uid}\t{uid}\t{uid}\n\
         Gid:\t{uid}\t{uid}\t{uid}\t{uid}\nThreads:\t1\n\
         voluntary_ctxt_switches:\t{voluntary}\nnonvoluntary_ctxt_switches:\t{nonvoluntary}\n"
    )
}

fn io_lines(read_bytes: u64, write_bytes: u64) -> String {
    format!(
        "rchar: {}\nwchar: {}\nsyscr: 10\nsyscw: 5\nread_bytes: {read_bytes}\n\
         write_bytes: {write_bytes}\ncancelled_write_bytes: 0\n",
        read_bytes * 2,
        write_bytes * 2,
    )
}

/// Parameters of one synthetic process.
#[derive(Debug, Clone)]
pub struct MockProcess {
    pub pid: u32,
    pub name: &'static str,
    pub uid: u32,
    pub utime: u64,
    pub stime: u64,
    pub threads: u32,
    pub starttime: u64,
    pub rss_pages: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub ctx_vol: u64,
    pub ctx_invol: u64,
}

impl MockFs {
    /// Writes (or overwrites) all `/proc/[pid]/` files for `p`.
    pub fn put_process(&self, p: &MockProcess) {
        self.add_process(
            p.pid,
            &stat_line(
                p.pid,
                p.name,
                (p.utime, p.stime),
                p.threads,
                p.starttime,
                p.rss_pages,
            ),
            &status_lines(p.name, p.pid, p.uid, p.ctx_vol, p.ctx_invol),
            &io_lines(p.read_bytes, p.write_bytes),
            &format!("{}\n", p.name),
        );
    }

    /// Overwrites `/proc/stat` with the given aggregate cpu ticks.
    pub fn set_cpu_ticks(&self, user: u64, system: u64, idle: u64, iowait: u64) {
        self.add_file(
            "/proc/stat",
            format!(
                "cpu  {user} 0 {system} {idle} {iowait} 0 0 0 0 0\n\
                 cpu0 {user} 0 {system} {idle} {iowait} 0 0 0 0 0\n\
                 ctxt 500000\nbtime {MOCK_BTIME}\nprocesses 10000\n\
                 procs_running 2\nprocs_blocked 0\n"
            ),
        );
    }

    /// Overwrites `/proc/net/dev` with one loopback and one ethernet interface.
    pub fn set_net_counters(&self, rx_bytes: u64, tx_bytes: u64) {
        self.add_file(
            "/proc/net/dev",
            format!(
                "Inter-|   Receive                                                |  Transmit\n \
                 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n    \
                 lo:     1000      10    0    0    0     0          0         0     1000      10    0    0    0     0       0          0\n  \
                 eth0: {rx_bytes}   6543    0    0    0     0          0         0 {tx_bytes}   4567    0    0    0     0       0          0\n"
            ),
        );
    }

    /// A desktop host with four processes.
    ///
    /// | pid  | name    | user    |
    /// |------|---------|---------|
    /// | 1    | systemd | root    |
    /// | 1000 | chrome  | user    |
    /// | 1001 | python3 | user    |
    /// | 1002 | mysqld  | (uid 999, not in passwd) |
    pub fn typical_desktop() -> Self {
        let fs = Self::new();

        fs.add_file(
            "/etc/passwd",
            "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
user:x:1000:1000:User:/home/user:/bin/bash
",
        );

        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         4096000 kB
MemAvailable:   12288000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
",
        );
        fs.set_cpu_ticks(10_000, 3_000, 80_000, 1_000);
        fs.set_net_counters(987_654_321, 123_456_789);
        fs.set_disk_usage(
            "/",
            DiskUsage {
                total: 500_000_000_000,
                used: 200_000_000_000,
                available: 275_000_000_000,
            },
        );

        for p in [
            MockProcess {
                pid: 1,
                name: "systemd",
                uid: 0,
                utime: 500,
                stime: 300,
                threads: 1,
                starttime: 1,
                rss_pages: 3_000,
                read_bytes: 50_000_000,
                write_bytes: 10_000_000,
                ctx_vol: 20_000,
                ctx_invol: 500,
            },
            MockProcess {
                pid: 1000,
                name: "chrome",
                uid: 1000,
                utime: 20_000,
                stime: 4_000,
                threads: 30,
                starttime: 100_000,
                rss_pages: 50_000,
                read_bytes: 1_000,
                write_bytes: 500,
                ctx_vol: 20,
                ctx_invol: 5,
            },
            MockProcess {
                pid: 1001,
                name: "python3",
                uid: 1000,
                utime: 1_200,
                stime: 100,
                threads: 5,
                starttime: 200_000,
                rss_pages: 10_000,
                read_bytes: 200,
                write_bytes: 40,
                ctx_vol: 5,
                ctx_invol: 1,
            },
            MockProcess {
                pid: 1002,
                name: "mysqld",
                uid: 999,
                utime: 9_000,
                stime: 3_000,
                threads: 38,
                starttime: 2_000,
                rss_pages: 120_000,
                read_bytes: 900_000_000,
                write_bytes: 400_000_000,
                ctx_vol: 80_000,
                ctx_invol: 1_200,
            },
        ] {
            fs.put_process(&p);
        }

        fs
    }

    /// `typical_desktop` plus a process whose `/proc/[pid]/stat` is unreadable
    /// (pid 2000), one whose `/proc/[pid]/io` is unreadable (pid 2001) and one
    /// with a comma in its name (pid 3000).
    pub fn with_restricted_processes() -> Self {
        let fs = Self::typical_desktop();

        let hidden = MockProcess {
            pid: 2000,
            name: "sshd",
            uid: 0,
            utime: 10,
            stime: 10,
            threads: 1,
            starttime: 50,
            rss_pages: 1_000,
            read_bytes: 0,
            write_bytes: 0,
            ctx_vol: 1,
            ctx_invol: 1,
        };
        fs.put_process(&hidden);
        fs.deny("/proc/2000/stat");

        let no_io = MockProcess {
            pid: 2001,
            name: "Xorg",
            uid: 0,
            utime: 4_000,
            stime: 2_000,
            threads: 4,
            starttime: 900,
            rss_pages: 20_000,
            read_bytes: 7_000,
            write_bytes: 3_000,
            ctx_vol: 100,
            ctx_invol: 10,
        };
        fs.put_process(&no_io);
        fs.deny("/proc/2001/io");

        fs.put_process(&MockProcess {
            pid: 3000,
            name: "Web, Content",
            uid: 1000,
            utime: 300,
            stime: 100,
            threads: 20,
            starttime: 150_000,
            rss_pages: 25_000,
            read_bytes: 0,
            write_bytes: 0,
            ctx_vol: 3,
            ctx_invol: 0,
        });

        fs
    }
}
