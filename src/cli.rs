use std::path::PathBuf;

use crate::interaction::MergeVariant;

#[derive(clap::Parser)]
pub(crate) struct Cli {
    #[arg(
        long = "stderr-log-level",
        value_name = "LEVEL",
        value_enum,
        help = "Maximum stderr log level (warn by default)"
    )]
    pub(crate) stderr_log_level: Option<LogLevel>,
    #[arg(
        long = "log-file",
        value_name = "PATH",
        help = "File to write logs (besides stderr)"
    )]
    pub(crate) log_file: Option<PathBuf>,
    #[arg(
        long = "file-log-level",
        value_name = "LEVEL",
        value_enum,
        help = "Maximum file log level (debug by default)"
    )]
    pub(crate) file_log_level: Option<LogLevel>,
    #[arg(long = "no-progress", help = "Do not print progress")]
    pub(crate) no_progress: bool,
    #[arg(
        long = "working-copy",
        short = 'w',
        value_name = "PATH",
        help = "Working copy receiving the merge (current directory by default)"
    )]
    pub(crate) working_copy: Option<PathBuf>,
    #[arg(
        long = "source",
        short = 's',
        value_name = "URL",
        help = "Branch URL to merge from"
    )]
    pub(crate) source: String,
    #[arg(
        long = "merge-params",
        short = 'P',
        value_name = "FILE",
        help = "Merge parameters file"
    )]
    pub(crate) merge_params: Option<PathBuf>,
    #[arg(
        long = "page-size",
        value_name = "N",
        help = "Revisions per loaded history page"
    )]
    pub(crate) page_size: Option<usize>,
    #[arg(
        long = "batch-size",
        value_name = "N",
        help = "Revisions merged per range-merge call (1 = one call per revision)"
    )]
    pub(crate) batch_size: Option<usize>,
    #[arg(
        long = "dry-run",
        help = "Report what would be merged without touching the working copy"
    )]
    pub(crate) dry_run: bool,
    #[arg(
        long = "record-only",
        help = "Mark revisions as merged without applying their changes"
    )]
    pub(crate) record_only: bool,
    #[arg(
        long = "variant",
        value_name = "VARIANT",
        value_enum,
        help = "Merge variant, skipping the interactive prompt"
    )]
    pub(crate) variant: Option<VariantArg>,
    #[arg(
        long = "yes",
        short = 'y',
        help = "Assume \"yes\" for confirmation prompts"
    )]
    pub(crate) assume_yes: bool,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
pub(crate) enum VariantArg {
    #[value(name = "all")]
    All,
    #[value(name = "recent")]
    Recent,
    #[value(name = "select")]
    Select,
}

impl VariantArg {
    pub(crate) fn to_merge_variant(self) -> MergeVariant {
        match self {
            Self::All => MergeVariant::All,
            Self::Recent => MergeVariant::Recent,
            Self::Select => MergeVariant::Select,
        }
    }
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl LogLevel {
    pub(crate) fn to_log_level_filter(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }
}
