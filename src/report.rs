use std::fmt::Write as _;
use std::io::Write as _;

use tracing::warn;

use crate::config::{OutputConfig, OutputFormat};
use crate::format::{fit_column, format_bytes, format_rate, format_uptime};
use crate::system::poller::SnapshotSubscriber;
use crate::system::process::ProcessSnapshot;
use crate::system::snapshot::SystemSnapshot;

const NAME_WIDTH: usize = 24;

/// Prints each published snapshot to stdout.
#[derive(Debug, Clone)]
pub struct Reporter {
    format: OutputFormat,
    top: usize,
    include_system: bool,
}

impl Reporter {
    pub fn from_config(config: &OutputConfig) -> Self {
        Self {
            format: config.format,
            top: config.top,
            include_system: config.include_system,
        }
    }

    pub fn render(&self, snapshot: &SystemSnapshot) -> Option<String> {
        match self.format {
            OutputFormat::Json => match serde_json::to_string(snapshot) {
                Ok(line) => Some(line),
                Err(err) => {
                    warn!(error = %err, "failed to serialize snapshot");
                    None
                }
            },
            OutputFormat::Text => Some(self.render_text(snapshot)),
        }
    }

    fn render_text(&self, snapshot: &SystemSnapshot) -> String {
        let used = snapshot.memory.total.saturating_sub(snapshot.memory.available);
        let mut out = format!(
            "cpu {:5.1}%  mem {} / {} ({:.1}%)  disk r {} w {}  net tx {} rx {}  {} MHz  up {}  {} procs [{}]\n",
            snapshot.cpu_percent,
            format_bytes(used),
            format_bytes(snapshot.memory.total),
            snapshot.memory.percent,
            format_rate(snapshot.disk.read_rate),
            format_rate(snapshot.disk.write_rate),
            format_rate(snapshot.network.sent_rate),
            format_rate(snapshot.network.recv_rate),
            snapshot.cpu_frequency,
            format_uptime(snapshot.uptime_secs()),
            snapshot.processes.len(),
            snapshot.backend,
        );

        if self.top == 0 {
            return out;
        }

        let _ = writeln!(
            out,
            "{:>7}  {}  {:>6}  {:>9}  {:>11}  {:>11}  {:>11}  {:>11}",
            "PID",
            fit_column("NAME", NAME_WIDTH),
            "CPU%",
            "MEM",
            "READ",
            "WRITE",
            "SENT",
            "RECV"
        );
        for process in self.top_processes(snapshot) {
            let _ = writeln!(
                out,
                "{:>7}  {}  {:>6.1}  {:>9}  {:>11}  {:>11}  {:>11}  {:>11}",
                process.pid,
                fit_column(&process.name, NAME_WIDTH),
                process.cpu_percent,
                format_bytes(process.memory_bytes),
                format_rate(process.disk_read_rate),
                format_rate(process.disk_write_rate),
                format_rate(process.net_sent_rate),
                format_rate(process.net_recv_rate),
            );
        }
        out
    }

    /// Busiest processes first; ties broken by memory, then pid.
    fn top_processes<'a>(&self, snapshot: &'a SystemSnapshot) -> Vec<&'a ProcessSnapshot> {
        let mut processes: Vec<&ProcessSnapshot> = snapshot
            .processes
            .iter()
            .filter(|p| self.include_system || !p.is_system)
            .collect();
        processes.sort_by(|a, b| {
            b.cpu_percent
                .total_cmp(&a.cpu_percent)
                .then(b.memory_bytes.cmp(&a.memory_bytes))
                .then(a.pid.cmp(&b.pid))
        });
        processes.truncate(self.top);
        processes
    }
}

impl SnapshotSubscriber for Reporter {
    fn on_snapshot(&self, snapshot: &SystemSnapshot) {
        let Some(rendered) = self.render(snapshot) else {
            return;
        };
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{}", rendered.trim_end()).and_then(|_| stdout.flush()) {
            warn!(error = %err, "failed to write snapshot");
        }
    }
}
