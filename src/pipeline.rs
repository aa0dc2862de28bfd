use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::branch_points::{BranchPointCache, WrapperInvertor};
use crate::client::{MergeClient, MergeResult};
use crate::history::{RepositoryHistory, RevisionLoader};
use crate::interaction::{
    ConflictResolver, LocalChangesAction, MergeVariant, QuickMergeInteraction,
};
use crate::local_changes::{self, Intersection, WorkingCopyState};
use crate::merger::branch::BranchMerger;
use crate::merger::group::{ChunkSplitter, GroupMerger, Splitter, StepByStepSplitter};
use crate::merger::point::PointMerger;
use crate::merger::{CommentTemplate, Merger};
use crate::mergeinfo::{MergeCheckResult, MergeInfoClassifier};
use crate::repo::{Changelist, MergeContext, Revision, is_url_ancestor};
use crate::runner::{CompletionTracker, InteractionHost, Worker};
use crate::term_out::ProgressPrint;

pub(crate) struct MergeSettings {
    pub(crate) page_size: usize,
    pub(crate) batch_size: usize,
    pub(crate) dry_run: bool,
    pub(crate) record_only: bool,
}

/// One merge operation, fully wired. `execute` consumes it; a second run
/// needs a fresh instance.
pub(crate) struct QuickMerge {
    pub(crate) ctx: MergeContext,
    pub(crate) client: Arc<dyn MergeClient>,
    pub(crate) history: Arc<dyn RepositoryHistory>,
    pub(crate) wc_state: Arc<dyn WorkingCopyState>,
    pub(crate) interaction: Arc<dyn QuickMergeInteraction>,
    pub(crate) resolver: Arc<dyn ConflictResolver>,
    pub(crate) branch_points: Arc<BranchPointCache>,
    pub(crate) comment_template: CommentTemplate,
    pub(crate) settings: MergeSettings,
    pub(crate) host: Arc<dyn InteractionHost>,
    pub(crate) progress: Option<ProgressPrint>,
}

/// Final outcome of a run, in the shape a front-end reports it.
#[derive(Clone, Debug)]
pub(crate) struct MergeReport {
    pub(crate) message: String,
    pub(crate) is_error: bool,
    pub(crate) canceled: bool,
    /// Assembled commit comment for the staged result, when anything was
    /// merged.
    pub(crate) commit_comment: Option<String>,
    pub(crate) changed_files: Vec<PathBuf>,
    pub(crate) conflicts: Vec<PathBuf>,
    pub(crate) errors: Vec<String>,
    pub(crate) skipped_revisions: Vec<Revision>,
}

impl MergeReport {
    fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: false,
            canceled: false,
            commit_comment: None,
            changed_files: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
            skipped_revisions: Vec::new(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::info(message)
        }
    }

    fn canceled(message: impl Into<String>) -> Self {
        Self {
            canceled: true,
            ..Self::info(message)
        }
    }
}

/// Live handle on a running merge. Cancellation takes effect at the next
/// step boundary; an in-flight client call is never interrupted.
pub(crate) struct MergeHandle {
    cancel: Arc<AtomicBool>,
    tracker: Arc<CompletionTracker>,
    report: Arc<Mutex<Option<MergeReport>>>,
    _worker: Worker,
}

impl MergeHandle {
    pub(crate) fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Blocks until the pipeline has ended and every background task has
    /// drained, then returns the final report. Callable more than once.
    pub(crate) fn wait(&self) -> MergeReport {
        self.tracker.wait();
        self.report
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| MergeReport::canceled("merge canceled"))
    }
}

impl QuickMerge {
    pub(crate) fn execute(self) -> MergeHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let tracker = Arc::new(CompletionTracker::new());
        let report = Arc::new(Mutex::new(None));
        let worker = Worker::new("quick merge pipeline");

        tracker.task_started();
        let run = Run {
            pipeline: self,
            cancel: cancel.clone(),
            tracker: tracker.clone(),
            report: report.clone(),
            supports_mergeinfo: false,
            copy_point: None,
            classifier: None,
            candidates: Vec::new(),
            all_loaded: false,
            merge_paths: Vec::new(),
            intersection: Intersection::default(),
            merger: None,
            result: MergeResult::new(),
            is_merge_all: false,
            change_group: None,
        };
        worker.submit(Box::new(move || run.drive()));

        MergeHandle {
            cancel,
            tracker,
            report,
            _worker: worker,
        }
    }
}

/// The step chain. Each step decides its successor; nothing outside the
/// driver loop enqueues steps.
enum Step {
    CheckSelfMerge,
    QuerySwitchedRoots,
    ConfirmSwitchedRoots { roots: Vec<PathBuf> },
    ProbeMergeInfo,
    SelectVariant,
    FindCopyPoint { variant: MergeVariant },
    ConfirmReintegrate,
    LoadRevisions { variant: MergeVariant },
    SelectRevisions { variant: MergeVariant },
    CheckLocalChanges,
    DecideLocalChanges,
    ShelveChanges,
    SetupChangeGroup,
    ExecuteMerge,
    ResolveConflicts,
    Finalize,
    ReportErrors { report: MergeReport },
}

enum StepContext {
    Background,
    Interaction,
}

impl Step {
    /// Where the step must run. Background steps may block on the network or
    /// the filesystem; interaction steps represent a human decision and are
    /// marshaled through the host, serialized.
    fn context(&self) -> StepContext {
        match self {
            Self::ConfirmSwitchedRoots { .. }
            | Self::SelectVariant
            | Self::ConfirmReintegrate
            | Self::SelectRevisions { .. }
            | Self::DecideLocalChanges
            | Self::ResolveConflicts
            | Self::ReportErrors { .. } => StepContext::Interaction,
            _ => StepContext::Background,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::CheckSelfMerge => "checking merge endpoints",
            Self::QuerySwitchedRoots => "checking for switched roots",
            Self::ConfirmSwitchedRoots { .. } => "waiting for switched roots confirmation",
            Self::ProbeMergeInfo => "probing merge tracking support",
            Self::SelectVariant => "waiting for merge variant",
            Self::FindCopyPoint { .. } => "locating the branch copy point",
            Self::ConfirmReintegrate => "waiting for reintegrate confirmation",
            Self::LoadRevisions { .. } => "loading revisions",
            Self::SelectRevisions { .. } => "waiting for revision selection",
            Self::CheckLocalChanges => "checking pending local changes",
            Self::DecideLocalChanges => "waiting for local changes decision",
            Self::ShelveChanges => "shelving local changes",
            Self::SetupChangeGroup => "preparing the change group",
            Self::ExecuteMerge => "merging",
            Self::ResolveConflicts => "resolving conflicts",
            Self::Finalize => "finalizing",
            Self::ReportErrors { .. } => "reporting",
        }
    }
}

enum Next {
    Step(Step),
    End(MergeReport),
}

struct Run {
    pipeline: QuickMerge,
    cancel: Arc<AtomicBool>,
    tracker: Arc<CompletionTracker>,
    report: Arc<Mutex<Option<MergeReport>>>,

    supports_mergeinfo: bool,
    copy_point: Option<WrapperInvertor>,
    classifier: Option<MergeInfoClassifier>,
    candidates: Vec<Changelist>,
    all_loaded: bool,
    merge_paths: Vec<PathBuf>,
    intersection: Intersection,
    merger: Option<Box<dyn Merger>>,
    result: MergeResult,
    is_merge_all: bool,
    change_group: Option<String>,
}

impl Run {
    fn drive(mut self) {
        let mut step = Step::CheckSelfMerge;
        loop {
            // Cancellation is honored between steps only; an in-flight call
            // always completes.
            if self.cancel.load(Ordering::SeqCst) {
                self.end(MergeReport::canceled("merge canceled"));
                break;
            }
            self.set_progress(step.describe());
            match self.run_step(step) {
                Next::Step(next) => step = next,
                Next::End(report) => {
                    self.end(report);
                    break;
                }
            }
        }
        self.tracker.task_finished();
    }

    fn end(&self, report: MergeReport) {
        if self.tracker.is_finished() {
            return;
        }
        tracing::info!("{}", report.message);
        if let Some(progress) = &self.pipeline.progress {
            progress.freeze_progress();
        }
        *self.report.lock().unwrap() = Some(report);
        self.tracker.finish();
    }

    fn set_progress(&self, text: &str) {
        if let Some(progress) = &self.pipeline.progress {
            progress.set_progress(text.to_owned());
        }
    }

    /// Terminal failure: routed through the error-reporting step so every
    /// error surfaces exactly once, at the end of the run.
    fn fail(&self, message: String) -> Next {
        Next::Step(Step::ReportErrors {
            report: MergeReport::error(message),
        })
    }

    fn run_step(&mut self, step: Step) -> Next {
        match step.context() {
            StepContext::Background => self.step_body(step),
            StepContext::Interaction => {
                let host = self.pipeline.host.clone();
                let mut step = Some(step);
                let mut out = None;
                {
                    let this = &mut *self;
                    let step = &mut step;
                    let out = &mut out;
                    let mut body = move || {
                        if let Some(step) = step.take() {
                            *out = Some(this.step_body(step));
                        }
                    };
                    host.run_interaction(&mut body);
                }
                out.unwrap_or_else(|| {
                    Next::End(MergeReport::error("interaction host dropped the step"))
                })
            }
        }
    }

    fn step_body(&mut self, step: Step) -> Next {
        match step {
            Step::CheckSelfMerge => self.check_self_merge(),
            Step::QuerySwitchedRoots => self.query_switched_roots(),
            Step::ConfirmSwitchedRoots { roots } => self.confirm_switched_roots(&roots),
            Step::ProbeMergeInfo => self.probe_mergeinfo(),
            Step::SelectVariant => self.select_variant(),
            Step::FindCopyPoint { variant } => self.find_copy_point(variant),
            Step::ConfirmReintegrate => self.confirm_reintegrate(),
            Step::LoadRevisions { variant } => self.load_revisions(variant),
            Step::SelectRevisions { variant } => self.select_revisions(variant),
            Step::CheckLocalChanges => self.check_local_changes(),
            Step::DecideLocalChanges => self.decide_local_changes(),
            Step::ShelveChanges => self.shelve_changes(),
            Step::SetupChangeGroup => self.setup_change_group(),
            Step::ExecuteMerge => self.execute_merge(),
            Step::ResolveConflicts => self.resolve_conflicts(),
            Step::Finalize => self.finalize(),
            Step::ReportErrors { report } => self.report_errors(report),
        }
    }

    fn check_self_merge(&self) -> Next {
        let ctx = &self.pipeline.ctx;
        if is_url_ancestor(&ctx.source_url, &ctx.target_url)
            || is_url_ancestor(&ctx.target_url, &ctx.source_url)
        {
            return self.fail(format!(
                "cannot merge {} into {}: one is an ancestor of the other",
                ctx.source_url, ctx.target_url,
            ));
        }
        Next::Step(Step::QuerySwitchedRoots)
    }

    fn query_switched_roots(&self) -> Next {
        match self
            .pipeline
            .wc_state
            .switched_roots(&self.pipeline.ctx.working_copy)
        {
            Ok(roots) if roots.is_empty() => Next::Step(Step::ProbeMergeInfo),
            Ok(roots) => Next::Step(Step::ConfirmSwitchedRoots { roots }),
            Err(e) => self.fail(format!("failed to inspect the working copy: {e}")),
        }
    }

    fn confirm_switched_roots(&self, roots: &[PathBuf]) -> Next {
        if self.pipeline.interaction.confirm_switched_roots(roots) {
            Next::Step(Step::ProbeMergeInfo)
        } else {
            Next::End(MergeReport::canceled("merge canceled"))
        }
    }

    fn probe_mergeinfo(&mut self) -> Next {
        match self.pipeline.client.supports_mergeinfo() {
            Ok(supported) => {
                self.supports_mergeinfo = supported;
                Next::Step(Step::SelectVariant)
            }
            Err(e) => self.fail(format!("failed to probe merge tracking support: {e}")),
        }
    }

    fn select_variant(&self) -> Next {
        match self.pipeline.interaction.select_merge_variant() {
            MergeVariant::Cancel => Next::End(MergeReport::canceled("merge canceled")),
            variant => Next::Step(Step::FindCopyPoint { variant }),
        }
    }

    fn find_copy_point(&mut self, variant: MergeVariant) -> Next {
        let ctx = &self.pipeline.ctx;
        self.copy_point = self.pipeline.branch_points.compute_and_cache(
            &ctx.repository_root,
            &ctx.source_url,
            &ctx.target_url,
        );
        let Some(copy_point) = &self.copy_point else {
            return self.fail(format!(
                "merge start was not found: {} and {} share no history",
                ctx.source_url, ctx.target_url,
            ));
        };

        if variant != MergeVariant::All {
            return Next::Step(Step::LoadRevisions { variant });
        }

        self.is_merge_all = true;
        let reintegrate = copy_point.is_reintegrate();
        let merger: Box<dyn Merger> = if self.supports_mergeinfo {
            Box::new(BranchMerger::tracked(
                self.pipeline.client.clone(),
                ctx.clone(),
                reintegrate,
                self.pipeline.settings.dry_run,
                self.pipeline.settings.record_only,
            ))
        } else {
            let latest = match self.pipeline.history.latest_revision(&ctx.source_url) {
                Ok(latest) => latest,
                Err(e) => {
                    return self.fail(format!(
                        "failed to query the latest revision of {}: {e}",
                        ctx.source_url,
                    ));
                }
            };
            Box::new(BranchMerger::ranged(
                self.pipeline.client.clone(),
                ctx.clone(),
                copy_point,
                latest,
                self.pipeline.settings.dry_run,
                self.pipeline.settings.record_only,
            ))
        };
        self.merger = Some(merger);

        if reintegrate {
            Next::Step(Step::ConfirmReintegrate)
        } else {
            Next::Step(Step::CheckLocalChanges)
        }
    }

    fn confirm_reintegrate(&self) -> Next {
        if self
            .pipeline
            .interaction
            .confirm_reintegrate(&self.pipeline.ctx.target_url)
        {
            Next::Step(Step::CheckLocalChanges)
        } else {
            Next::End(MergeReport::canceled("merge canceled"))
        }
    }

    fn load_revisions(&mut self, variant: MergeVariant) -> Next {
        let ctx = self.pipeline.ctx.clone();
        let classifier =
            match MergeInfoClassifier::prepare(self.pipeline.client.as_ref(), &ctx) {
                Ok(classifier) => classifier,
                Err(e) => return self.fail(e.to_string()),
            };
        let Some(copy_point) = &self.copy_point else {
            return self.fail("no copy point before revision loading".into());
        };
        let boundary = copy_point.source_boundary();

        let latest = match self.pipeline.history.latest_revision(&ctx.source_url) {
            Ok(latest) => latest,
            Err(e) => {
                return self.fail(format!(
                    "failed to query the latest revision of {}: {e}",
                    ctx.source_url,
                ));
            }
        };
        let loader = RevisionLoader::new(
            self.pipeline.history.clone(),
            ctx.source_url.clone(),
            self.pipeline.settings.page_size,
            Some(boundary),
        );

        let (candidates, all_loaded) = match variant {
            MergeVariant::Recent => match loader.load_before(latest.saturating_add(1), latest) {
                Ok(page) => (page.changelists, page.is_last),
                Err(e) => {
                    return self.fail(format!(
                        "failed to load revisions of {}: {e}",
                        ctx.source_url,
                    ));
                }
            },
            _ => match loader.load_after(boundary, latest) {
                Ok(all) => (all, true),
                Err(e) => {
                    return self.fail(format!(
                        "failed to load revisions of {}: {e}",
                        ctx.source_url,
                    ));
                }
            },
        };

        // Classify while still in the background, so the picker opens with
        // every marker already computed.
        for (i, list) in candidates.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                return Next::End(MergeReport::canceled("merge canceled"));
            }
            self.set_progress(&format!(
                "classifying revision {} ({}/{})",
                list.revision,
                i + 1,
                candidates.len(),
            ));
            classifier.classify(list);
        }

        if !candidates
            .iter()
            .any(|list| classifier.classify(list) == MergeCheckResult::NotMerged)
        {
            return Next::End(MergeReport::info(format!(
                "everything loaded from {} is already merged",
                ctx.branch_name,
            )));
        }

        self.classifier = Some(classifier);
        self.candidates = candidates;
        self.all_loaded = all_loaded;
        Next::Step(Step::SelectRevisions { variant })
    }

    fn select_revisions(&mut self, variant: MergeVariant) -> Next {
        let Some(classifier) = &self.classifier else {
            return self.fail("no classifier before revision selection".into());
        };
        let Some(selection) = self.pipeline.interaction.select_revisions(
            &self.candidates,
            classifier,
            true,
            self.all_loaded,
        ) else {
            return Next::End(MergeReport::canceled("merge canceled"));
        };

        // "All" means "all not yet merged"; an explicit pick is honored
        // as-is, except that foreign revisions can never be merged here.
        let mut chosen: Vec<Changelist> = if selection.is_all() {
            self.candidates
                .iter()
                .filter(|list| classifier.classify(list) == MergeCheckResult::NotMerged)
                .cloned()
                .collect()
        } else {
            self.candidates
                .iter()
                .filter(|list| {
                    selection.is_selected(&list.revision)
                        && classifier.classify(list) != MergeCheckResult::Foreign
                })
                .cloned()
                .collect()
        };
        if chosen.is_empty() {
            return Next::End(MergeReport::info("nothing selected to merge"));
        }

        self.merge_paths = chosen
            .iter()
            .flat_map(|list| list.changes.iter())
            .filter_map(|change| self.pipeline.ctx.wc_path_for(&change.path))
            .collect();

        let settings = &self.pipeline.settings;
        let inverse = self
            .copy_point
            .as_ref()
            .is_some_and(WrapperInvertor::is_reintegrate);
        let single = if variant == MergeVariant::Select && chosen.len() == 1 {
            chosen.pop()
        } else {
            None
        };
        let merger: Box<dyn Merger> = match single {
            Some(list) => Box::new(PointMerger::new(
                self.pipeline.client.clone(),
                self.pipeline.ctx.clone(),
                list,
                settings.dry_run,
            )),
            None => {
                let splitter: Box<dyn Splitter> = if settings.batch_size <= 1 {
                    Box::new(StepByStepSplitter)
                } else {
                    Box::new(ChunkSplitter::new(settings.batch_size))
                };
                Box::new(GroupMerger::new(
                    self.pipeline.client.clone(),
                    self.pipeline.ctx.clone(),
                    chosen,
                    splitter,
                    inverse,
                    settings.dry_run,
                    settings.record_only,
                ))
            }
        };
        self.merger = Some(merger);
        Next::Step(Step::CheckLocalChanges)
    }

    fn check_local_changes(&mut self) -> Next {
        let pending = match self
            .pipeline
            .wc_state
            .pending_changes(&self.pipeline.ctx.working_copy)
        {
            Ok(pending) => pending,
            Err(e) => return self.fail(format!("failed to query pending local changes: {e}")),
        };
        self.intersection = local_changes::intersect(&pending, &self.merge_paths, self.is_merge_all);
        if self.intersection.is_empty() {
            Next::Step(Step::SetupChangeGroup)
        } else {
            Next::Step(Step::DecideLocalChanges)
        }
    }

    fn decide_local_changes(&self) -> Next {
        match self
            .pipeline
            .interaction
            .select_local_changes_action(self.is_merge_all)
        {
            LocalChangesAction::Cancel => Next::End(MergeReport::canceled("merge canceled")),
            LocalChangesAction::Continue => Next::Step(Step::SetupChangeGroup),
            LocalChangesAction::Shelve => Next::Step(Step::ShelveChanges),
            LocalChangesAction::Inspect => {
                self.pipeline
                    .interaction
                    .show_intersected_paths(&self.intersection);
                Next::End(MergeReport::info(
                    "stopped to inspect overlapping local changes",
                ))
            }
        }
    }

    fn shelve_changes(&self) -> Next {
        let root = &self.pipeline.ctx.working_copy;
        for (i, (group, files)) in self.intersection.groups().enumerate() {
            let stash_name = format!(
                "{}-merge-{}-{}",
                self.pipeline.ctx.branch_name,
                group,
                i + 1,
            );
            self.set_progress(&format!("shelving {group}"));
            if let Err(e) = self.pipeline.wc_state.shelve(root, files, &stash_name) {
                return self.fail(format!("failed to shelve {group}: {e}"));
            }
        }
        Next::Step(Step::SetupChangeGroup)
    }

    fn setup_change_group(&mut self) -> Next {
        let reintegrate = self
            .copy_point
            .as_ref()
            .is_some_and(WrapperInvertor::is_reintegrate);
        self.change_group = Some(if reintegrate {
            format!("Reintegrated {}", self.pipeline.ctx.branch_name)
        } else {
            format!("Merged from {}", self.pipeline.ctx.branch_name)
        });
        Next::Step(Step::ExecuteMerge)
    }

    fn execute_merge(&mut self) -> Next {
        let Some(merger) = self.merger.as_mut() else {
            return self.fail("no merge strategy selected".into());
        };
        if !merger.has_next() {
            return Next::Step(Step::Finalize);
        }

        // One batch per driver iteration, so cancellation and conflicts are
        // both observed between batches.
        merger.merge_next(&mut self.result);
        if self.result.has_conflicts() {
            Next::Step(Step::ResolveConflicts)
        } else {
            Next::Step(Step::ExecuteMerge)
        }
    }

    fn resolve_conflicts(&mut self) -> Next {
        for path in self.result.conflicted_paths() {
            if self.pipeline.resolver.resolve(&path) {
                self.result.mark_resolved(&path);
            } else {
                // Resolution abandoned: remaining revisions are skipped and
                // the conflicts stay in the report.
                let remaining = self
                    .merger
                    .as_ref()
                    .map(|merger| merger.remaining_revisions())
                    .unwrap_or_default();
                self.result.record_skipped(remaining);
                return Next::Step(Step::Finalize);
            }
        }
        Next::Step(Step::ExecuteMerge)
    }

    fn finalize(&mut self) -> Next {
        if let (Some(merger), Some(classifier)) = (&self.merger, &self.classifier) {
            merger.after_processing(classifier);
        }

        let changed = self.result.changed_paths();
        let conflicts = self.result.conflicted_paths();
        let errors: Vec<String> = self
            .result
            .errors()
            .iter()
            .map(ToString::to_string)
            .collect();
        let skipped = self.result.skipped().to_vec();

        if self.result.is_nothing_changed() && skipped.is_empty() {
            return Next::End(MergeReport::info("everything is up to date"));
        }

        if !changed.is_empty() && !self.pipeline.settings.dry_run {
            if let Some(group) = &self.change_group {
                if let Err(e) = self.pipeline.wc_state.assign_change_group(group, &changed) {
                    tracing::warn!("failed to assign merged files to {group:?}: {e}");
                }
            }
        }

        let commit_comment = match &self.merger {
            Some(merger) if !changed.is_empty() => Some(self.pipeline.comment_template.render(
                &self.pipeline.ctx.branch_name,
                &self.pipeline.ctx.source_url,
                &merger.processed_revisions(),
                &merger.comment(),
            )),
            _ => None,
        };

        let mut message = format!(
            "merged {} file(s) from {}",
            changed.len(),
            self.pipeline.ctx.branch_name,
        );
        if !conflicts.is_empty() {
            message.push_str(&format!(", {} conflict(s) unresolved", conflicts.len()));
        }
        if !skipped.is_empty() {
            message.push_str(&format!(", {} revision(s) skipped", skipped.len()));
        }
        if !errors.is_empty() {
            message.push_str(&format!(", {} error(s)", errors.len()));
        }
        if self.pipeline.settings.dry_run {
            message.push_str(" (dry run)");
        }

        let report = MergeReport {
            message,
            is_error: !errors.is_empty(),
            canceled: false,
            commit_comment,
            changed_files: changed,
            conflicts,
            errors,
            skipped_revisions: skipped,
        };
        if report.errors.is_empty() && report.conflicts.is_empty() && report.skipped_revisions.is_empty()
        {
            Next::End(report)
        } else {
            Next::Step(Step::ReportErrors { report })
        }
    }

    fn report_errors(&self, report: MergeReport) -> Next {
        let mut lines = report.errors.clone();
        for path in &report.conflicts {
            lines.push(format!("unresolved conflict in {}", path.display()));
        }
        for revision in &report.skipped_revisions {
            lines.push(format!("revision {revision} was not merged"));
        }
        self.pipeline.interaction.show_errors(&report.message, &lines);
        Next::End(report)
    }
}
