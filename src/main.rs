#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![allow(clippy::enum_variant_names, clippy::type_complexity)]

use std::process::ExitCode;
use std::sync::Arc;

mod branch_points;
mod cli;
mod client;
mod history;
mod interaction;
mod local_changes;
mod mergeinfo;
mod merger;
mod params_file;
mod pipeline;
mod repo;
mod runner;
mod selection;
mod svn;
mod term_out;

use term_out::ProgressPrint;

pub(crate) type FHashMap<K, V> = std::collections::HashMap<K, V, foldhash::fast::RandomState>;
pub(crate) type FHashSet<T> = std::collections::HashSet<T, foldhash::fast::RandomState>;

enum RunError {
    Generic,
    Usage,
}

fn main() -> ExitCode {
    match main_inner() {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Generic) => ExitCode::from(1),
        Err(RunError::Usage) => ExitCode::from(2),
    }
}

fn main_inner() -> Result<(), RunError> {
    let start = std::time::Instant::now();

    let args = match <cli::Cli as clap::Parser>::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return Err(RunError::Usage);
        }
    };

    let term_out = term_out::init(start, !args.no_progress);
    let progress_print = term_out.get_progress_print();

    let stderr_log_level = args
        .stderr_log_level
        .unwrap_or(cli::LogLevel::Warn)
        .to_log_level_filter();
    let file_log_level = args.file_log_level.map(cli::LogLevel::to_log_level_filter);

    if let Err(e) = init_logger(
        Some(stderr_log_level),
        args.log_file.as_deref(),
        file_log_level,
        progress_print.clone(),
    ) {
        eprintln!("failed to initialize logging: {e}");
        return Err(RunError::Generic);
    }

    let params = match &args.merge_params {
        None => params_file::MergeParams::default(),
        Some(path) => {
            let params_raw = std::fs::read_to_string(path).map_err(|e| {
                tracing::error!("failed to read {path:?}: {e}");
                RunError::Generic
            })?;
            toml::from_str(&params_raw).map_err(|e| {
                tracing::error!("failed to parse {path:?}: {e}");
                RunError::Generic
            })?
        }
    };

    let working_copy = match &args.working_copy {
        Some(path) => path.clone(),
        None => std::env::current_dir().map_err(|e| {
            tracing::error!("failed to get the current directory: {e}");
            RunError::Generic
        })?,
    };
    if !working_copy.is_dir() {
        tracing::error!("working copy root {working_copy:?} is not a directory");
        return Err(RunError::Generic);
    }

    let svn_client = Arc::new(svn::SvnProcessClient::new(params.svn_command.clone()));
    let wc_info = svn_client.working_copy_info(&working_copy).map_err(|e| {
        tracing::error!("{working_copy:?} is not a usable working copy: {e}");
        RunError::Generic
    })?;

    let source_url = args.source.trim_end_matches('/').to_owned();
    if !repo::is_url_ancestor(&wc_info.repository_root, &source_url) {
        tracing::error!(
            "source {source_url} is not inside the repository {}",
            wc_info.repository_root,
        );
        return Err(RunError::Generic);
    }

    let ctx = repo::MergeContext {
        branch_name: repo::branch_name_of(&source_url).to_owned(),
        repository_root: wc_info.repository_root,
        target_url: wc_info.url,
        source_url,
        working_copy: working_copy.clone(),
    };

    let page_size = args
        .page_size
        .or_else(history::page_size_from_env)
        .or(params.page_size)
        .unwrap_or(history::DEFAULT_PAGE_SIZE);
    let batch_size = args.batch_size.unwrap_or(params.batch_size);

    let cache_file = params
        .cache_file
        .clone()
        .unwrap_or_else(|| working_copy.join(".svn").join("quick-merge-points.bin"));

    let comment_template = merger::CommentTemplate::new(
        params
            .comment_template
            .as_deref()
            .unwrap_or(merger::DEFAULT_COMMENT_TEMPLATE),
    )
    .map_err(|e| {
        tracing::error!("{e}");
        RunError::Generic
    })?;

    let interaction = Arc::new(interaction::ConsoleInteraction::new(
        progress_print.clone(),
        args.assume_yes,
        args.variant.map(cli::VariantArg::to_merge_variant),
    ));
    let resolver = Arc::new(interaction::ConsoleResolver::new(progress_print.clone()));

    let merge = pipeline::QuickMerge {
        ctx,
        client: svn_client.clone(),
        history: svn_client.clone(),
        wc_state: svn_client.clone(),
        interaction,
        resolver,
        branch_points: Arc::new(branch_points::BranchPointCache::open(
            cache_file,
            svn_client,
        )),
        comment_template,
        settings: pipeline::MergeSettings {
            page_size,
            batch_size,
            dry_run: args.dry_run,
            record_only: args.record_only,
        },
        host: Arc::new(runner::DirectHost),
        progress: Some(progress_print.clone()),
    };

    let report = merge.execute().wait();

    let mut line = report.message.clone().into_bytes();
    line.push(b'\n');
    progress_print.print_raw_line(line);
    if let Some(comment) = &report.commit_comment {
        let mut block = b"suggested commit message:\n".to_vec();
        for comment_line in comment.lines() {
            block.extend(b"  ");
            block.extend(comment_line.as_bytes());
            block.push(b'\n');
        }
        progress_print.print_raw_line(block);
    }

    term_out.finish();

    if report.is_error {
        Err(RunError::Generic)
    } else {
        Ok(())
    }
}

fn init_logger(
    stderr_level: Option<tracing::Level>,
    file_path: Option<&std::path::Path>,
    file_level: Option<tracing::Level>,
    progress_print: ProgressPrint,
) -> Result<(), std::io::Error> {
    use tracing_subscriber::layer::{Layer as _, SubscriberExt as _};
    use tracing_subscriber::util::SubscriberInitExt as _;

    let stderr_sub = if let Some(stderr_level) = stderr_level {
        let filter = tracing_subscriber::filter::LevelFilter::from_level(stderr_level);
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(MakeLogPrinter::new(progress_print))
                .with_filter(filter),
        )
    } else {
        None
    };

    let file_sub = if let Some(file_path) = file_path {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        let filter = tracing_subscriber::filter::LevelFilter::from_level(
            file_level.unwrap_or(tracing::Level::DEBUG),
        );
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file)
                .with_filter(filter),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(stderr_sub)
        .with(file_sub)
        .init();

    Ok(())
}

struct MakeLogPrinter {
    progress_print: ProgressPrint,
}

impl MakeLogPrinter {
    fn new(progress_print: ProgressPrint) -> Self {
        Self { progress_print }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MakeLogPrinter {
    type Writer = LogPrinter<'a>;

    fn make_writer(&'a self) -> LogPrinter<'a> {
        LogPrinter {
            progress_print: &self.progress_print,
            buf: Vec::new(),
        }
    }
}

struct LogPrinter<'a> {
    progress_print: &'a ProgressPrint,
    buf: Vec<u8>,
}

impl Drop for LogPrinter<'_> {
    fn drop(&mut self) {
        self.progress_print.print_raw_line(self.buf.clone());
    }
}

impl std::io::Write for LogPrinter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend(buf);
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.buf.extend(buf);
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
