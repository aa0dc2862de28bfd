use std::path::PathBuf;

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct MergeParams {
    #[serde(rename = "svn-command", default = "default_svn_command")]
    pub(crate) svn_command: String,
    #[serde(rename = "page-size")]
    pub(crate) page_size: Option<usize>,
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub(crate) batch_size: usize,
    /// Branch copy points are cached here; defaults to a file inside the
    /// working copy's administrative directory.
    #[serde(rename = "cache-file")]
    pub(crate) cache_file: Option<PathBuf>,
    #[serde(rename = "comment-template")]
    pub(crate) comment_template: Option<String>,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            svn_command: default_svn_command(),
            page_size: None,
            batch_size: default_batch_size(),
            cache_file: None,
            comment_template: None,
        }
    }
}

fn default_svn_command() -> String {
    "svn".into()
}

#[inline(always)]
fn default_batch_size() -> usize {
    25
}
