//! Adapter implementing the engine's capability traits by spawning the
//! `svn` command-line client and parsing its plain-text output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::branch_points::BranchCopyData;
use crate::client::{
    ClientError, Depth, FileOutcome, MergeAction, MergeClient, MergeEvent, MergeEventHandler,
};
use crate::history::RepositoryHistory;
use crate::local_changes::{DEFAULT_GROUP_NAME, LocalChangeGroup, WorkingCopyState};
use crate::repo::{
    Changelist, PathChange, Revision, RevisionRange, append_url, is_url_ancestor, url_relative,
};

pub(crate) struct WorkingCopyInfo {
    pub(crate) url: String,
    pub(crate) repository_root: String,
}

pub(crate) struct SvnProcessClient {
    command: String,
}

impl SvnProcessClient {
    pub(crate) fn new(command: String) -> Self {
        Self { command }
    }

    fn svn(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.command);
        cmd.arg("--non-interactive");
        cmd.stdin(std::process::Stdio::null());
        cmd
    }

    fn output(
        &self,
        cmd: &mut std::process::Command,
    ) -> Result<std::process::Output, ClientError> {
        tracing::debug!("running {:?}", cmd);
        cmd.output()
            .map_err(|e| ClientError(format!("failed to spawn process {:?}: {e}", self.command)))
    }

    fn run(&self, cmd: &mut std::process::Command) -> Result<String, ClientError> {
        let output = self.output(cmd)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let subcommand = cmd
                .get_args()
                .nth(1)
                .map(|arg| arg.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(ClientError(format!(
                "{} {subcommand} failed ({}): {}",
                self.command,
                output.status,
                stderr.trim(),
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| ClientError(format!("non-UTF-8 output from {}", self.command)))
    }

    /// URL and repository root of a working copy path, for deriving the
    /// merge context.
    pub(crate) fn working_copy_info(&self, wc: &Path) -> Result<WorkingCopyInfo, ClientError> {
        let mut cmd = self.svn();
        cmd.arg("info").arg("--show-item").arg("url").arg(wc);
        let url = self.run(&mut cmd)?.trim().to_owned();

        let mut cmd = self.svn();
        cmd.arg("info")
            .arg("--show-item")
            .arg("repos-root-url")
            .arg(wc);
        let repository_root = self.run(&mut cmd)?.trim().to_owned();

        Ok(WorkingCopyInfo {
            url,
            repository_root,
        })
    }

    fn status(&self, root: &Path) -> Result<StatusSummary, ClientError> {
        let mut cmd = self.svn();
        cmd.arg("status").arg(root);
        Ok(parse_status(&self.run(&mut cmd)?, root))
    }

    /// The branch-creating log entry of `candidate`, if it was copied from
    /// somewhere under `other`.
    fn copy_point_of(
        &self,
        repository_root: &str,
        candidate: &str,
        other: &str,
    ) -> Result<Option<BranchCopyData>, ClientError> {
        let Some(candidate_path) = repo_path(repository_root, candidate) else {
            return Ok(None);
        };
        let Some(other_path) = repo_path(repository_root, other) else {
            return Ok(None);
        };

        let mut cmd = self.svn();
        cmd.arg("log")
            .arg("-v")
            .arg("-r")
            .arg("1:HEAD")
            .arg("--limit")
            .arg("1")
            .arg(candidate);
        let out = self.run(&mut cmd)?;

        let mut revision = None;
        for line in out.lines() {
            if revision.is_none() {
                if let Some(rev) = parse_log_header_revision(line) {
                    revision = Some(rev);
                    continue;
                }
            }
            let Some((added_path, from_path, from_revision)) = parse_copyfrom_line(line) else {
                continue;
            };
            let creates_candidate = is_url_ancestor(&added_path, &candidate_path);
            let from_other = is_url_ancestor(&from_path, &other_path)
                || is_url_ancestor(&other_path, &from_path);
            if creates_candidate && from_other {
                return Ok(Some(BranchCopyData {
                    source_url: append_url(repository_root, &from_path),
                    source_revision: from_revision,
                    target_url: append_url(repository_root, &added_path),
                    target_revision: revision.unwrap_or(from_revision),
                }));
            }
        }
        Ok(None)
    }
}

impl MergeClient for SvnProcessClient {
    fn supports_mergeinfo(&self) -> Result<bool, ClientError> {
        let mut cmd = self.svn();
        cmd.arg("--version").arg("--quiet");
        let out = self.run(&mut cmd)?;

        // Merge tracking exists since 1.5.
        let mut parts = out.trim().split('.');
        let major: u32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| ClientError(format!("unexpected svn version output: {out:?}")))?;
        let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Ok(major > 1 || (major == 1 && minor >= 5))
    }

    fn mergeinfo(&self, target: &Path) -> Result<Option<String>, ClientError> {
        let mut cmd = self.svn();
        cmd.arg("propget").arg("svn:mergeinfo").arg(target);
        let output = self.output(&mut cmd)?;
        if output.status.success() {
            let text = String::from_utf8_lossy(&output.stdout).into_owned();
            if text.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(text))
            }
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // W200017: property not set on the target.
            if stderr.contains("W200017") {
                Ok(None)
            } else {
                Err(ClientError(format!(
                    "{} propget failed ({}): {}",
                    self.command,
                    output.status,
                    stderr.trim(),
                )))
            }
        }
    }

    fn merge_tracked(
        &self,
        source: &str,
        destination: &Path,
        dry_run: bool,
        handler: &mut dyn MergeEventHandler,
    ) -> Result<(), ClientError> {
        let mut cmd = self.svn();
        cmd.arg("merge")
            .arg("--accept")
            .arg("postpone")
            .arg(source)
            .arg(destination);
        if dry_run {
            cmd.arg("--dry-run");
        }
        let out = self.run(&mut cmd)?;
        parse_merge_output(&out, handler);
        Ok(())
    }

    fn merge_range(
        &self,
        source: &str,
        range: RevisionRange,
        destination: &Path,
        depth: Depth,
        dry_run: bool,
        record_only: bool,
        force: bool,
        handler: &mut dyn MergeEventHandler,
    ) -> Result<(), ClientError> {
        let mut cmd = self.svn();
        cmd.arg("merge")
            .arg("-r")
            .arg(range.to_string())
            .arg("--depth")
            .arg(depth.as_str())
            .arg("--accept")
            .arg("postpone")
            .arg(source)
            .arg(destination);
        if dry_run {
            cmd.arg("--dry-run");
        }
        if record_only {
            cmd.arg("--record-only");
        }
        if force {
            cmd.arg("--force");
        }
        let out = self.run(&mut cmd)?;
        parse_merge_output(&out, handler);
        Ok(())
    }

    fn merge_diff(
        &self,
        source1: &str,
        rev1: Revision,
        source2: &str,
        rev2: Revision,
        destination: &Path,
        depth: Depth,
        use_ancestry: bool,
        dry_run: bool,
        handler: &mut dyn MergeEventHandler,
    ) -> Result<(), ClientError> {
        let mut cmd = self.svn();
        cmd.arg("merge")
            .arg(format!("{source1}@{rev1}"))
            .arg(format!("{source2}@{rev2}"))
            .arg(destination)
            .arg("--depth")
            .arg(depth.as_str())
            .arg("--accept")
            .arg("postpone");
        if !use_ancestry {
            cmd.arg("--ignore-ancestry");
        }
        if dry_run {
            cmd.arg("--dry-run");
        }
        let out = self.run(&mut cmd)?;
        parse_merge_output(&out, handler);
        Ok(())
    }

    fn copy_from(
        &self,
        source: &str,
        revision: Revision,
        destination: &Path,
    ) -> Result<(), ClientError> {
        let mut cmd = self.svn();
        cmd.arg("copy")
            .arg(format!("{source}@{revision}"))
            .arg(destination);
        self.run(&mut cmd).map(|_| ())
    }

    fn delete(&self, target: &Path) -> Result<(), ClientError> {
        let mut cmd = self.svn();
        cmd.arg("delete").arg(target);
        self.run(&mut cmd).map(|_| ())
    }
}

impl RepositoryHistory for SvnProcessClient {
    fn log_range(
        &self,
        location: &str,
        before: Revision,
        after: Revision,
        limit: usize,
    ) -> Result<Vec<Changelist>, ClientError> {
        let mut cmd = self.svn();
        cmd.arg("log")
            .arg("-v")
            .arg("-r")
            .arg(format!("{before}:{after}"))
            .arg("--limit")
            .arg(limit.to_string())
            .arg(location);
        parse_log(&self.run(&mut cmd)?)
    }

    fn find_copy_point(
        &self,
        repository_root: &str,
        url1: &str,
        url2: &str,
    ) -> Result<Option<BranchCopyData>, ClientError> {
        // The younger branch carries the copy in its oldest log entry; try
        // both sides since the caller does not know which one that is.
        for (candidate, other) in [(url1, url2), (url2, url1)] {
            if let Some(data) = self.copy_point_of(repository_root, candidate, other)? {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    fn latest_revision(&self, location: &str) -> Result<Revision, ClientError> {
        let mut cmd = self.svn();
        cmd.arg("info")
            .arg("--show-item")
            .arg("last-changed-revision")
            .arg(location);
        let out = self.run(&mut cmd)?;
        out.trim()
            .parse()
            .map_err(|_| ClientError(format!("unexpected svn info output: {out:?}")))
    }
}

impl WorkingCopyState for SvnProcessClient {
    fn switched_roots(&self, root: &Path) -> Result<Vec<PathBuf>, ClientError> {
        Ok(self.status(root)?.switched)
    }

    fn pending_changes(&self, root: &Path) -> Result<Vec<LocalChangeGroup>, ClientError> {
        Ok(self.status(root)?.groups)
    }

    fn shelve(
        &self,
        root: &Path,
        files: &[PathBuf],
        stash_name: &str,
    ) -> Result<(), ClientError> {
        let mut cmd = self.svn();
        cmd.current_dir(root);
        cmd.arg("x-shelve").arg(stash_name).args(files);
        self.run(&mut cmd).map(|_| ())
    }

    fn assign_change_group(&self, name: &str, files: &[PathBuf]) -> Result<(), ClientError> {
        let mut cmd = self.svn();
        cmd.arg("changelist").arg(name).args(files);
        self.run(&mut cmd).map(|_| ())
    }
}

/// Repository-relative path of a URL, with a leading slash.
fn repo_path(repository_root: &str, url: &str) -> Option<String> {
    url_relative(repository_root, url).map(|rel| format!("/{rel}"))
}

const LOG_SEPARATOR: &str =
    "------------------------------------------------------------------------";

fn parse_log(text: &str) -> Result<Vec<Changelist>, ClientError> {
    let mut out = Vec::new();
    for entry in text.split(LOG_SEPARATOR) {
        let entry = entry.trim_matches('\n');
        if entry.is_empty() {
            continue;
        }
        out.push(parse_log_entry(entry)?);
    }
    Ok(out)
}

/// Revision of an entry header line (`r15 | alice | <date> | 1 line`).
fn parse_log_header_revision(line: &str) -> Option<Revision> {
    let (revision, _) = line.split_once(" | ")?;
    revision.strip_prefix('r')?.parse().ok()
}

fn parse_log_entry(entry: &str) -> Result<Changelist, ClientError> {
    let bad = |line: &str| ClientError(format!("unexpected svn log output: {line:?}"));

    let mut lines = entry.lines();
    let header = lines.next().ok_or_else(|| bad(entry))?;
    let mut fields = header.split(" | ");
    let revision = fields
        .next()
        .and_then(|f| f.trim().strip_prefix('r'))
        .and_then(|f| f.parse().ok())
        .ok_or_else(|| bad(header))?;
    let author = fields.next().unwrap_or("").trim().to_owned();
    let date = fields
        .next()
        .and_then(parse_log_date)
        .ok_or_else(|| bad(header))?;

    let mut changes = Vec::new();
    let mut message_lines: Vec<&str> = Vec::new();
    let mut in_paths = false;
    let mut in_message = false;
    for line in lines {
        if in_message {
            message_lines.push(line);
        } else if line == "Changed paths:" {
            in_paths = true;
        } else if line.is_empty() {
            // First blank line separates the path list from the message.
            in_message = true;
        } else if in_paths {
            if let Some(change) = parse_changed_path(line, revision) {
                changes.push(change);
            }
        }
    }

    Ok(Changelist {
        revision,
        author,
        date,
        message: message_lines.join("\n").trim_end().to_owned(),
        changes,
    })
}

/// `2024-05-02 11:22:33 +0000 (Thu, 02 May 2024)` — the parenthesized part
/// is locale-dependent and ignored.
fn parse_log_date(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    let core = raw
        .trim()
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ");
    chrono::DateTime::parse_from_str(&core, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|date| date.with_timezone(&chrono::Utc))
}

fn parse_changed_path(line: &str, revision: Revision) -> Option<PathChange> {
    let (action, path) = line.trim_start().split_once(' ')?;
    let path = path.trim();
    // Copy-from info (`/new (from /old:14)`) is not tracked per path here.
    let path = path.split(" (from ").next().unwrap_or(path).to_owned();
    let (before, after) = match action {
        "A" => (None, Some(revision)),
        "D" => (Some(revision.saturating_sub(1)), None),
        "M" | "R" => (Some(revision.saturating_sub(1)), Some(revision)),
        _ => return None,
    };
    Some(PathChange {
        path,
        before,
        after,
    })
}

/// `   A /branches/x (from /trunk:8)` -> (added path, copy source, revision).
fn parse_copyfrom_line(line: &str) -> Option<(String, String, Revision)> {
    let rest = line.trim_start().strip_prefix("A ")?;
    let (added, from) = rest.split_once(" (from ")?;
    let from = from.strip_suffix(')')?;
    let (from_path, from_revision) = from.rsplit_once(':')?;
    Some((
        added.trim().to_owned(),
        from_path.to_owned(),
        from_revision.parse().ok()?,
    ))
}

/// Translates `svn merge` item lines into file events. Notice lines
/// (`--- Merging ...`, conflict summaries) produce no event.
fn parse_merge_output(text: &str, handler: &mut dyn MergeEventHandler) {
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("Skipped ") {
            let path = rest.split('\'').nth(1).unwrap_or(rest.trim());
            handler.on_event(MergeEvent {
                path: PathBuf::from(path),
                outcome: FileOutcome::Merged(MergeAction::Skipped),
            });
            continue;
        }

        // Five status columns, then the path.
        let Some((status, path)) = line.split_at_checked(5) else {
            continue;
        };
        let path = path.trim();
        if path.is_empty() || !status.is_ascii() {
            continue;
        }
        let outcome = if status.contains('C') {
            FileOutcome::Conflicted
        } else {
            match status.as_bytes()[0] {
                b'A' => FileOutcome::Merged(MergeAction::Added),
                b'D' => FileOutcome::Merged(MergeAction::Deleted),
                b'U' | b'G' => FileOutcome::Merged(MergeAction::Modified),
                b' ' if matches!(status.as_bytes()[1], b'U' | b'G') => {
                    FileOutcome::Merged(MergeAction::Modified)
                }
                _ => continue,
            }
        };
        handler.on_event(MergeEvent {
            path: PathBuf::from(path),
            outcome,
        });
    }
}

struct StatusSummary {
    switched: Vec<PathBuf>,
    groups: Vec<LocalChangeGroup>,
}

fn parse_status(text: &str, root: &Path) -> StatusSummary {
    let mut switched = Vec::new();
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut current = DEFAULT_GROUP_NAME.to_owned();

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("--- Changelist '") {
            if let Some(name) = rest.strip_suffix("':") {
                current = name.to_owned();
            }
            continue;
        }
        // Eight columns of status flags, then the path.
        let Some((flags, path)) = line.split_at_checked(8) else {
            continue;
        };
        let path = path.trim();
        if path.is_empty() || !flags.is_ascii() {
            continue;
        }
        let flags = flags.as_bytes();
        let full = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            root.join(path)
        };
        if flags[4] == b'S' {
            switched.push(full.clone());
        }
        if matches!(flags[0], b'M' | b'A' | b'D' | b'R' | b'C' | b'!' | b'~') {
            groups.entry(current.clone()).or_default().push(full);
        }
    }

    StatusSummary {
        switched,
        groups: groups
            .into_iter()
            .map(|(name, files)| LocalChangeGroup { name, files })
            .collect(),
    }
}
