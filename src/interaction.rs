use std::path::Path;

use crate::local_changes::Intersection;
use crate::mergeinfo::{MergeCheckResult, MergeInfoClassifier};
use crate::repo::{Changelist, Revision};
use crate::selection::QuantitySelection;
use crate::term_out::ProgressPrint;

/// How the user wants to pick what gets merged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MergeVariant {
    /// Merge everything not yet merged, in one whole-branch operation.
    All,
    /// Show the most recent page of revisions and pick from it.
    Recent,
    /// Load the full candidate list and pick from it.
    Select,
    Cancel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum LocalChangesAction {
    Cancel,
    Continue,
    /// Stash the intersecting local edits first, then continue.
    Shelve,
    /// Only display the overlap; perform no mutation and stop the run.
    Inspect,
}

/// The decision points the pipeline calls out to. All calls happen on the
/// interaction context, serialized, and block the pipeline until answered.
pub(crate) trait QuickMergeInteraction: Send + Sync {
    fn select_merge_variant(&self) -> MergeVariant;

    fn confirm_switched_roots(&self, roots: &[std::path::PathBuf]) -> bool;

    fn confirm_reintegrate(&self, target_url: &str) -> bool;

    /// Picks revisions out of the loaded candidates. `None` cancels the
    /// operation; the selection is interpreted against `lists`.
    fn select_revisions(
        &self,
        lists: &[Changelist],
        classifier: &MergeInfoClassifier,
        all_classified: bool,
        all_loaded: bool,
    ) -> Option<QuantitySelection<Revision>>;

    fn select_local_changes_action(&self, is_merge_all: bool) -> LocalChangesAction;

    fn show_intersected_paths(&self, intersection: &Intersection);

    /// Terminal and accumulated recoverable errors, surfaced once at the
    /// end of the run.
    fn show_errors(&self, message: &str, errors: &[String]);
}

/// Resolves one conflicted file; any conforming 3-way resolver satisfies
/// this. Returns whether the conflict was actually resolved.
pub(crate) trait ConflictResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> bool;
}

/// Console front-end: prompts on stderr (through the progress printer, so
/// the progress line does not clobber them) and reads answers from stdin.
pub(crate) struct ConsoleInteraction {
    progress_print: ProgressPrint,
    assume_yes: bool,
    preset_variant: Option<MergeVariant>,
}

impl ConsoleInteraction {
    pub(crate) fn new(
        progress_print: ProgressPrint,
        assume_yes: bool,
        preset_variant: Option<MergeVariant>,
    ) -> Self {
        Self {
            progress_print,
            assume_yes,
            preset_variant,
        }
    }

    fn say(&self, line: impl Into<String>) {
        let mut line = line.into().into_bytes();
        line.push(b'\n');
        self.progress_print.print_raw_line(line);
    }

    fn ask(&self, prompt: &str) -> String {
        self.say(prompt);
        let mut answer = String::new();
        match std::io::stdin().read_line(&mut answer) {
            Ok(_) => answer.trim().to_owned(),
            Err(_) => String::new(),
        }
    }

    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        matches!(self.ask(&format!("{prompt} [y/N]")).as_str(), "y" | "Y" | "yes")
    }
}

impl QuickMergeInteraction for ConsoleInteraction {
    fn select_merge_variant(&self) -> MergeVariant {
        if let Some(preset) = self.preset_variant {
            return preset;
        }
        loop {
            let answer = self.ask(
                "merge variant: [a]ll not yet merged / [r]ecent revisions / \
                 [s]elect revisions / [q]uit",
            );
            match answer.as_str() {
                "a" | "all" => return MergeVariant::All,
                "r" | "recent" => return MergeVariant::Recent,
                "s" | "select" => return MergeVariant::Select,
                "q" | "quit" | "" => return MergeVariant::Cancel,
                _ => {}
            }
        }
    }

    fn confirm_switched_roots(&self, roots: &[std::path::PathBuf]) -> bool {
        self.say("the working copy contains roots switched to another branch:");
        for root in roots {
            self.say(format!("  {}", root.display()));
        }
        self.confirm("continue anyway?")
    }

    fn confirm_reintegrate(&self, target_url: &str) -> bool {
        self.confirm(&format!(
            "this is a reintegrate merge; the branch will be folded back into \
             {target_url} and should not be reused afterwards. continue?",
        ))
    }

    fn select_revisions(
        &self,
        lists: &[Changelist],
        classifier: &MergeInfoClassifier,
        _all_classified: bool,
        all_loaded: bool,
    ) -> Option<QuantitySelection<Revision>> {
        self.say("candidate revisions:");
        for list in lists {
            let marker = match classifier.classify(list) {
                MergeCheckResult::NotMerged => ' ',
                MergeCheckResult::Merged => '*',
                MergeCheckResult::Foreign => '-',
            };
            self.say(candidate_line(list, marker));
        }
        if !all_loaded {
            self.say("  (more revisions exist; raise the page size to see them)");
        }

        let mut selection = QuantitySelection::none_selected();
        loop {
            self.say(format!(
                "{} of {} selected",
                selection.selected_count(lists.len()),
                lists.len(),
            ));
            let answer = self.ask(
                "revisions to merge: [a]ll unmerged / [n]one / numbers to toggle / \
                 [d]one / [q]uit",
            );
            match answer.as_str() {
                "a" | "all" => selection.select_all(),
                "n" | "none" => selection.clear(),
                "d" | "done" => {
                    if selection.is_empty(lists.len()) {
                        self.say("nothing selected");
                        continue;
                    }
                    return Some(selection);
                }
                "q" | "quit" | "" => return None,
                _ => {
                    for word in answer.split_whitespace() {
                        match word.trim_start_matches('r').parse::<Revision>() {
                            Ok(rev) if lists.iter().any(|list| list.revision == rev) => {
                                selection.toggle(rev);
                            }
                            _ => self.say(format!("not a listed revision: {word}")),
                        }
                    }
                }
            }
        }
    }

    fn select_local_changes_action(&self, is_merge_all: bool) -> LocalChangesAction {
        if is_merge_all {
            self.say("local changes may overlap the whole-branch merge");
        }
        loop {
            let answer = self.ask(
                "local changes overlap the merge: [c]ontinue / [s]helve first / \
                 [i]nspect / [q]uit",
            );
            match answer.as_str() {
                "c" | "continue" => return LocalChangesAction::Continue,
                "s" | "shelve" => return LocalChangesAction::Shelve,
                "i" | "inspect" => return LocalChangesAction::Inspect,
                "q" | "quit" | "" => return LocalChangesAction::Cancel,
                _ => {}
            }
        }
    }

    fn show_intersected_paths(&self, intersection: &Intersection) {
        self.say("locally modified files overlapping the merge:");
        for (group, files) in intersection.groups() {
            self.say(format!("  {group}:"));
            for file in files {
                self.say(format!("    {}", file.display()));
            }
        }
    }

    fn show_errors(&self, message: &str, errors: &[String]) {
        self.say(message);
        for error in errors {
            self.say(format!("  {error}"));
        }
    }
}

/// One row of the revision picker: marker, revision, author, commit date,
/// first message line.
fn candidate_line(list: &Changelist, marker: char) -> String {
    let first_line = list.message.lines().next().unwrap_or("");
    format!(
        "  [{marker}] r{} | {} | {} | {first_line}",
        list.revision,
        list.author,
        list.date.format("%Y-%m-%d"),
    )
}

/// Console conflict handling: the user resolves the file in an external tool
/// and confirms, or skips to stop the merge loop.
pub(crate) struct ConsoleResolver {
    progress_print: ProgressPrint,
}

impl ConsoleResolver {
    pub(crate) fn new(progress_print: ProgressPrint) -> Self {
        Self { progress_print }
    }
}

impl ConflictResolver for ConsoleResolver {
    fn resolve(&self, path: &Path) -> bool {
        let mut line = format!(
            "conflict in {}: resolve it externally, then answer [r]esolved / [s]top",
            path.display(),
        )
        .into_bytes();
        line.push(b'\n');
        self.progress_print.print_raw_line(line);

        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "r" | "resolved" | "y" | "yes")
    }
}
