//! Gateways backed by the real command-line tools (`git`, `tmux`, a docker-compatible
//! container runtime).

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{SandboxGateway, TerminalGateway, VcsGateway};
use crate::config::Settings;
use crate::error::{GatewayError, GatewayResult};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

fn describe(program: &str, args: &[&str]) -> String {
    format!("{} {}", program, args.join(" "))
}

fn run(program: &str, args: &[&str]) -> GatewayResult<Output> {
    debug!(command = %describe(program, args), "Running gateway command");
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| GatewayError::Spawn {
            command: describe(program, args),
            details: e.to_string(),
        })
}

/// Reads a child pipe to the end on its own thread, so a chatty child never
/// blocks on a full pipe while we poll for its exit.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Runs a command, killing it if it has not exited within `timeout`.
fn run_with_timeout(program: &str, args: &[&str], timeout: Duration) -> GatewayResult<Output> {
    let command = describe(program, args);
    debug!(command = %command, timeout_ms = timeout.as_millis() as u64, "Running gateway command");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| GatewayError::Spawn {
            command: command.clone(),
            details: e.to_string(),
        })?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(Output {
                    status,
                    stdout: stdout.join().unwrap_or_default(),
                    stderr: stderr.join().unwrap_or_default(),
                });
            }
            Ok(None) if started.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GatewayError::Timeout {
                    command,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(GatewayError::CommandFailed {
                    command,
                    details: e.to_string(),
                });
            }
        }
    }
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn require_success(program: &str, args: &[&str], output: Output) -> GatewayResult<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(GatewayError::CommandFailed {
            command: describe(program, args),
            details: stderr_of(&output),
        })
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// git
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    fn git(&self, repo: &Path, args: &[&str]) -> GatewayResult<Output> {
        let repo = path_arg(repo);
        let mut full = vec!["-C", repo.as_str()];
        full.extend_from_slice(args);
        run("git", &full)
    }

    fn git_ok(&self, repo: &Path, args: &[&str]) -> GatewayResult<Output> {
        let output = self.git(repo, args)?;
        require_success("git", args, output)
    }
}

impl VcsGateway for GitCli {
    fn branch_exists(&self, repo: &Path, branch: &str) -> GatewayResult<bool> {
        let reference = format!("refs/heads/{}", branch);
        let args = ["rev-parse", "--verify", "--quiet", reference.as_str()];
        let output = self.git(repo, &args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GatewayError::CommandFailed {
                command: describe("git", &args),
                details: stderr_of(&output),
            }),
        }
    }

    fn create_branch(&self, repo: &Path, branch: &str) -> GatewayResult<()> {
        self.git_ok(repo, &["branch", branch, "HEAD"]).map(|_| ())
    }

    fn current_branch(&self, repo: &Path) -> GatewayResult<Option<String>> {
        let args = ["symbolic-ref", "--quiet", "--short", "HEAD"];
        let output = self.git(repo, &args)?;
        match output.status.code() {
            Some(0) => Ok(Some(stdout_of(&output))),
            // Detached HEAD
            Some(1) => Ok(None),
            _ => Err(GatewayError::CommandFailed {
                command: describe("git", &args),
                details: stderr_of(&output),
            }),
        }
    }

    fn list_branches(&self, repo: &Path) -> GatewayResult<Vec<String>> {
        let output = self.git_ok(
            repo,
            &["for-each-ref", "--format=%(refname:short)", "refs/heads/"],
        )?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn delete_branch(&self, repo: &Path, branch: &str) -> GatewayResult<()> {
        if self.current_branch(repo)?.as_deref() == Some(branch) {
            return Err(GatewayError::CheckedOutBranch(branch.to_string()));
        }
        self.git_ok(repo, &["branch", "-D", branch]).map(|_| ())
    }

    fn create_worktree(&self, repo: &Path, path: &Path, branch: &str) -> GatewayResult<()> {
        let path = path_arg(path);
        self.git_ok(repo, &["worktree", "add", path.as_str(), branch])
            .map(|_| ())
    }

    fn remove_worktree(&self, repo: &Path, path: &Path) -> GatewayResult<()> {
        let path = path_arg(path);
        self.git_ok(repo, &["worktree", "remove", "--force", path.as_str()])?;
        self.git_ok(repo, &["worktree", "prune"]).map(|_| ())
    }

    fn list_worktrees(&self, repo: &Path) -> GatewayResult<Vec<PathBuf>> {
        let output = self.git_ok(repo, &["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_worktree_list(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("worktree "))
        .map(|path| PathBuf::from(path.trim()))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// tmux
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct TmuxCli;

impl TerminalGateway for TmuxCli {
    fn session_exists(&self, name: &str) -> GatewayResult<bool> {
        // `=` forces an exact match instead of tmux's prefix matching.
        let target = format!("={}", name);
        let args = ["has-session", "-t", target.as_str()];
        let output = run("tmux", &args)?;
        if output.status.success() {
            return Ok(true);
        }

        let stderr = stderr_of(&output);
        if stderr.contains("can't find session")
            || stderr.contains("no server running")
            || stderr.contains("error connecting to")
        {
            Ok(false)
        } else {
            Err(GatewayError::CommandFailed {
                command: describe("tmux", &args),
                details: stderr,
            })
        }
    }

    fn create_session(&self, name: &str, cwd: &Path) -> GatewayResult<()> {
        let cwd = path_arg(cwd);
        let args = ["new-session", "-d", "-s", name, "-c", cwd.as_str()];
        let output = run("tmux", &args)?;
        require_success("tmux", &args, output).map(|_| ())
    }

    fn kill_session(&self, name: &str) -> GatewayResult<()> {
        let target = format!("={}", name);
        let args = ["kill-session", "-t", target.as_str()];
        let output = run("tmux", &args)?;
        require_success("tmux", &args, output).map(|_| ())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Container runtime
// ═══════════════════════════════════════════════════════════════════════════════

/// Sandboxes as long-lived containers of a docker-compatible runtime.
#[derive(Debug, Clone)]
pub struct ContainerCli {
    runtime: String,
    image: String,
    workdir: String,
    read_timeout: Duration,
}

impl ContainerCli {
    pub fn new(settings: &Settings) -> Self {
        Self {
            runtime: settings.sandbox_runtime.clone(),
            image: settings.sandbox_image.clone(),
            workdir: settings.sandbox_workdir.clone(),
            read_timeout: settings.sandbox_read_timeout(),
        }
    }

    fn is_missing_container(stderr: &str) -> bool {
        let lowered = stderr.to_lowercase();
        lowered.contains("no such container") || lowered.contains("no such object")
    }
}

impl SandboxGateway for ContainerCli {
    fn sandbox_exists(&self, name: &str) -> GatewayResult<bool> {
        let args = ["inspect", "--type", "container", "--format", "{{.Name}}", name];
        let output = run(&self.runtime, &args)?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = stderr_of(&output);
        if Self::is_missing_container(&stderr) {
            Ok(false)
        } else {
            Err(GatewayError::CommandFailed {
                command: describe(&self.runtime, &args),
                details: stderr,
            })
        }
    }

    fn create_sandbox(&self, name: &str, worktree: &Path) -> GatewayResult<()> {
        let mount = format!("{}:{}", path_arg(worktree), self.workdir);
        let args = [
            "run",
            "-d",
            "--name",
            name,
            "-v",
            mount.as_str(),
            "-w",
            self.workdir.as_str(),
            self.image.as_str(),
            "sleep",
            "infinity",
        ];
        let output = run(&self.runtime, &args)?;
        require_success(&self.runtime, &args, output).map(|_| ())
    }

    fn delete_sandbox(&self, name: &str) -> GatewayResult<()> {
        let args = ["rm", "-f", name];
        let output = run(&self.runtime, &args)?;
        require_success(&self.runtime, &args, output).map(|_| ())
    }

    fn read_file(&self, name: &str, relative_path: &str) -> GatewayResult<Option<String>> {
        let full_path = format!("{}/{}", self.workdir.trim_end_matches('/'), relative_path);
        let args = ["exec", name, "cat", full_path.as_str()];
        let output = run_with_timeout(&self.runtime, &args, self.read_timeout)?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()));
        }
        let stderr = stderr_of(&output);
        if stderr.contains("No such file or directory") {
            Ok(None)
        } else {
            Err(GatewayError::CommandFailed {
                command: describe(&self.runtime, &args),
                details: stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_worktree_list_porcelain() {
        let raw = "\
worktree /code/app
HEAD 1234
branch refs/heads/main

worktree /code/app/.worktrees/github-1
HEAD 5678
branch refs/heads/issue/github/1
";
        assert_eq!(
            parse_worktree_list(raw),
            vec![
                PathBuf::from("/code/app"),
                PathBuf::from("/code/app/.worktrees/github-1"),
            ]
        );
    }

    #[test]
    fn test_missing_container_detection() {
        assert!(ContainerCli::is_missing_container(
            "Error: No such container: app-github-1"
        ));
        assert!(ContainerCli::is_missing_container("Error: No such object: x"));
        assert!(!ContainerCli::is_missing_container(
            "Cannot connect to the Docker daemon"
        ));
    }

    #[test]
    fn test_missing_binary_is_a_spawn_error() {
        let err = run("definitely-not-a-real-binary-xyz", &["--version"]).unwrap_err();
        assert!(matches!(err, GatewayError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_kills_slow_commands() {
        let err = run_with_timeout("sleep", &["5"], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_reads_output_larger_than_pipe_buffer() {
        let output = run_with_timeout(
            "head",
            &["-c", "200000", "/dev/zero"],
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.len(), 200_000);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_collects_output() {
        let output = run_with_timeout("echo", &["hello"], Duration::from_secs(5)).unwrap();
        assert!(output.status.success());
        assert_eq!(stdout_of(&output), "hello");
    }
}
