use crate::client::MergeResult;
use crate::mergeinfo::MergeInfoClassifier;
use crate::repo::Revision;

pub(crate) mod branch;
pub(crate) mod group;
pub(crate) mod point;

/// One merge strategy: whole branch, batched revision ranges, or a single
/// hand-picked changeset. The orchestrator drives it through `merge_next`
/// one batch at a time.
///
/// A failing client call is captured into `result`, never propagated: the
/// orchestrator decides whether to keep iterating, so partial progress is
/// preserved and reported instead of discarded.
pub(crate) trait Merger: Send {
    fn has_next(&self) -> bool;

    /// Performs the next unit of merge work, recording file events and any
    /// client error into `result`.
    fn merge_next(&mut self, result: &mut MergeResult);

    /// Commit comment body assembled from everything merged so far.
    fn comment(&self) -> String;

    /// Revisions covered by the batches executed so far. Empty for the
    /// whole-branch strategy, where the server picks the revision set.
    fn processed_revisions(&self) -> Vec<Revision>;

    /// Revisions not attempted yet; reported as skipped when the loop stops
    /// early.
    fn remaining_revisions(&self) -> Vec<Revision>;

    /// Records what was just merged into the classification state, so later
    /// queries reflect the new merge-tracking metadata instead of the
    /// snapshot taken at prepare time.
    fn after_processing(&self, classifier: &MergeInfoClassifier) {
        classifier.record_merged(&self.processed_revisions());
    }
}

pub(crate) const DEFAULT_COMMENT_TEMPLATE: &str = indoc::indoc! {r#"
    {% if logs %}{{ logs }}

    {% endif %}[[merged from {{ branch }}{% if revisions %}, revisions {{ revisions | join(", ") }}{% endif %}]]
"#};

/// Renders the final multi-line commit comment for the staged result.
/// Validated at startup so a broken template fails before any merge work.
pub(crate) struct CommentTemplate {
    jinja_env: minijinja::Environment<'static>,
}

impl CommentTemplate {
    pub(crate) fn new(template: &str) -> Result<Self, String> {
        let mut jinja_env = minijinja::Environment::empty();
        jinja_env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        // An empty environment registers no builtin filters; the default
        // template needs `join`.
        jinja_env.add_filter("join", minijinja::filters::join);
        jinja_env
            .add_template_owned("comment", template.to_owned())
            .map_err(|e| format!("failed to parse comment template: {e}"))?;
        Ok(Self { jinja_env })
    }

    pub(crate) fn render(
        &self,
        branch: &str,
        source_url: &str,
        revisions: &[Revision],
        logs: &str,
    ) -> String {
        let template = self.jinja_env.get_template("comment").unwrap();
        match template.render(minijinja::context! {
            branch => branch,
            source_url => source_url,
            revisions => revisions,
            logs => logs,
        }) {
            Ok(rendered) => rendered.replace("\r\n", "\n").trim_end().to_owned(),
            Err(e) => {
                tracing::warn!("failed to render comment template: {e}");
                logs.trim_end().to_owned()
            }
        }
    }
}
