use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

use crate::core::process::TargetProcess;

/// Processes sharing one name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessGroup {
    pub name: String,
    pub pids: Vec<u32>,
}

pub fn group_by_name(processes: &[TargetProcess]) -> Vec<ProcessGroup> {
    let mut by_name: BTreeMap<(String, String), Vec<u32>> = BTreeMap::new();
    for process in processes {
        by_name
            .entry((process.name.to_lowercase(), process.name.clone()))
            .or_default()
            .push(process.pid);
    }

    by_name
        .into_iter()
        .map(|((_, name), mut pids)| {
            pids.sort_unstable();
            ProcessGroup { name, pids }
        })
        .collect()
}

/// Line-oriented process picker.
///
/// Accepts a list number, a raw PID, or a case-insensitive name filter.
/// `q` or end of input cancels.
pub struct ProcessSelector<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ProcessSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn print_groups(&mut self, groups: &[ProcessGroup]) -> io::Result<()> {
        writeln!(self.output, "\n{}", "=".repeat(60))?;
        writeln!(self.output, "RUNNING PROCESSES")?;
        writeln!(self.output, "{}", "=".repeat(60))?;

        for (idx, group) in groups.iter().enumerate() {
            let mut pid_str = group.pids.iter().take(3).map(u32::to_string).collect::<Vec<_>>().join(", ");
            if group.pids.len() > 3 {
                pid_str.push_str(&format!(", ... ({} total)", group.pids.len()));
            }
            writeln!(self.output, "  {:4}. {:<40} [PIDs: {}]", idx + 1, group.name, pid_str)?;
        }

        writeln!(self.output, "\n{}", "-".repeat(60))?;
        writeln!(self.output, "Enter process number, name filter, or PID directly.")?;
        writeln!(self.output, "Type 'q' to quit.")?;
        writeln!(self.output, "{}", "-".repeat(60))
    }

    fn pick_pid(&mut self, group: &ProcessGroup) -> io::Result<Option<TargetProcess>> {
        if let [pid] = group.pids.as_slice() {
            return Ok(Some(TargetProcess::new(*pid, group.name.clone())));
        }

        writeln!(self.output, "\nMultiple PIDs for {}:", group.name)?;
        for (i, pid) in group.pids.iter().enumerate() {
            writeln!(self.output, "  {}. PID {}", i + 1, pid)?;
        }

        let choice = self.read_line("Select PID number: ")?;
        Ok(choice
            .and_then(|c| c.parse::<usize>().ok())
            .filter(|n| (1..=group.pids.len()).contains(n))
            .map(|n| TargetProcess::new(group.pids[n - 1], group.name.clone())))
    }

    pub fn select(&mut self, processes: &[TargetProcess]) -> io::Result<Option<TargetProcess>> {
        let groups = group_by_name(processes);
        self.print_groups(&groups)?;

        loop {
            let Some(choice) = self.read_line("\nSelect process: ")? else {
                return Ok(None);
            };
            if choice.eq_ignore_ascii_case("q") {
                return Ok(None);
            }
            if choice.is_empty() {
                continue;
            }

            if let Ok(num) = choice.parse::<usize>() {
                if (1..=groups.len()).contains(&num) {
                    match self.pick_pid(&groups[num - 1])? {
                        Some(target) => return Ok(Some(target)),
                        None => continue,
                    }
                }
                if let Some(process) = processes.iter().find(|p| p.pid as usize == num) {
                    return Ok(Some(process.clone()));
                }
            }

            let needle = choice.to_lowercase();
            let matches: Vec<&ProcessGroup> =
                groups.iter().filter(|g| g.name.to_lowercase().contains(&needle)).collect();

            match matches.as_slice() {
                [group] => {
                    if let Some(target) = self.pick_pid(group)? {
                        return Ok(Some(target));
                    }
                }
                [] => writeln!(self.output, "No process found matching '{}'", choice)?,
                many => {
                    writeln!(self.output, "\nMultiple matches for '{}':", choice)?;
                    for (i, group) in many.iter().enumerate() {
                        writeln!(self.output, "  {}. {}", i + 1, group.name)?;
                    }
                }
            }
        }
    }
}
