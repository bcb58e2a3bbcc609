//! Remote command strings for inline and background-task execution.
//!
//! Background tasks live in `$HOME/.flotilla/<task>/` on the node: the script
//! is written to `run.sh`, its streams to `stdout` and `stderr`, and its exit
//! status to `exitstatus` once it finishes. Status checks look the task up by
//! name, so a task name must never collide with the script file name.
//!
//! `timeout(1)` exits 124 both when it kills a command and when the command
//! itself exits 124, so neither mode trusts that status alone. Inline runs
//! report the script's own status on stderr behind [`STATUS_MARKER`], and a
//! background task records [`TASK_TIMED_OUT`] only when its status file was
//! never written.

use shell_escape::unix::escape;
use uuid::Uuid;

use crate::exec::TaskName;

/// Exit status `timeout(1)` reports when it kills the command.
pub(crate) const TIMEOUT_EXIT_STATUS: i32 = 124;

/// Prefix of the stderr line carrying an inline script's own exit status.
pub(crate) const STATUS_MARKER: &str = "__flotilla_exit_status=";

/// Contents of `exitstatus` when the task was killed by its timeout.
pub(crate) const TASK_TIMED_OUT: &str = "timeout";

/// Runs `body` through `sh -c` under a timeout, appending its exit status to
/// stderr.
pub(crate) fn inline_command(body: &str, timeout_secs: u64) -> String {
    let reporting = format!(
        "sh -c {body}; echo \"{STATUS_MARKER}$?\" >&2",
        body = escape(body.into())
    );
    format!("timeout {timeout_secs} sh -c {}", escape(reporting.into()))
}

/// Splits the status line appended by [`inline_command`] off `stderr`.
///
/// Returns `None` when the line is missing, meaning the script never got to
/// report: it was killed, or `ssh` itself failed.
pub(crate) fn split_exit_status(stderr: &str) -> Option<(i32, String)> {
    let start = stderr.rfind(STATUS_MARKER)?;
    let (before, line) = stderr.split_at(start);
    let status = line.strip_prefix(STATUS_MARKER)?.trim().parse().ok()?;
    Some((status, before.to_owned()))
}

fn task_directory(task: &TaskName) -> String {
    format!("\"$HOME/.flotilla/{task}\"")
}

/// Picks a heredoc terminator that no line of `body` can end early.
fn heredoc_marker(body: &str) -> String {
    loop {
        let marker = format!("FLOTILLA_EOF_{}", Uuid::new_v4().simple());
        if !body.lines().any(|line| line == marker) {
            return marker;
        }
    }
}

/// Writes `body` into the task directory and starts it detached.
pub(crate) fn launch_task_command(task: &TaskName, body: &str, timeout_secs: u64) -> String {
    let dir = task_directory(task);
    let mut script = body.to_owned();
    if !script.ends_with('\n') {
        script.push('\n');
    }
    format!(
        concat!(
            "mkdir -p {dir} && cd {dir} && rm -f exitstatus status.tmp stdout stderr && ",
            "cat > run.sh <<'{marker}'\n",
            "{script}",
            "{marker}\n",
            "cat > wrapper.sh <<'{marker}'\n",
            "timeout {timeout} sh -c 'sh ./run.sh > stdout 2> stderr; echo $? > status.tmp'\n",
            "if [ -f status.tmp ]; then mv status.tmp exitstatus; ",
            "else echo {timed_out} > exitstatus; fi\n",
            "{marker}\n",
            "nohup sh ./wrapper.sh >/dev/null 2>&1 &"
        ),
        dir = dir,
        marker = heredoc_marker(&script),
        script = script,
        timeout = timeout_secs,
        timed_out = TASK_TIMED_OUT,
    )
}

/// Prints the task's exit status; fails while the task is still running.
pub(crate) fn status_command(task: &TaskName) -> String {
    format!("cat {}/exitstatus", task_directory(task))
}

/// Prints one captured stream of a finished task.
pub(crate) fn stream_command(task: &TaskName, stream: &str) -> String {
    format!("cat {}/{stream}", task_directory(task))
}
