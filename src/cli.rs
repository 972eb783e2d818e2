use crate::{constants::*, utils::util::Result};
use anyhow::anyhow;
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

/// Full version string including the crate version and git description.
///
/// # Examples
/// * `0.1.0-1ba958a-dirty` - while on a dirty branch
/// * `0.1.0-1ba958a` - with a fresh commit
pub static FULL_VERSION: Lazy<String> = Lazy::new(|| {
    let git_describe = env!("VERGEN_GIT_DESCRIBE");
    if git_describe.is_empty() {
        env!("CARGO_PKG_VERSION").to_string()
    } else {
        format!("{}-{}", env!("CARGO_PKG_VERSION"), git_describe)
    }
});

#[derive(Parser, Debug)]
#[command(name="gvx",
          version=&**FULL_VERSION,
          about="Genomic VCF merger",
          long_about = None,
          help_template = "{name} {version}\n{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}{after-help}",
          )]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true
    )]
    pub verbosity: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Merge(MergeArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Merge(_) => "merge",
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .args(["gvcfs", "gvcf_list"]),
))]
#[command(arg_required_else_help(true))]
pub struct MergeArgs {
    /// gVCF files to merge, plain or gzip-compressed
    #[arg(
        long = "gvcf",
        value_name = "GVCF",
        num_args = 1..,
        value_parser = check_file_exists
    )]
    pub gvcfs: Option<Vec<PathBuf>>,

    /// File containing paths of gVCF files to merge (one per line)
    #[arg(
        long = "gvcf-list",
        value_name = "GVCF_LIST",
        value_parser = check_file_exists
    )]
    pub gvcf_list: Option<PathBuf>,

    /// Write output to a file [default: standard output]
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        value_parser = check_prefix_path
    )]
    pub output: Option<String>,

    /// Number of threads to use
    #[arg(
        short = '@',
        value_name = "THREADS",
        default_value = "1",
        value_parser = threads_in_range
    )]
    pub num_threads: usize,

    /// Print only the merged header and exit
    #[arg(long = "print-header", help_heading = "Advanced")]
    pub print_header: bool,

    /// Run even if there is only one file on input
    #[arg(long = "force-single", help_heading = "Advanced")]
    pub force_single: bool,

    /// Resolve duplicate sample names by prefixing the input index
    #[arg(long = "force-samples", help_heading = "Advanced", hide = true)]
    pub force_samples: bool,

    /// Do not append version and command line to the header
    #[arg(long = "no-version", help_heading = "Advanced")]
    pub no_version: bool,

    #[command(flatten)]
    pub merge_args: MergeArgsInner,
}

#[derive(Parser, Debug, Clone)]
pub struct MergeArgsInner {
    /// Target number of leading-input records per work batch
    #[arg(
        help_heading("Advanced"),
        long,
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = batch_size_in_range
    )]
    pub batch_size: usize,

    /// Disable wall-clock based batch size adjustment
    #[arg(
        help_heading("Advanced"),
        long = "no-adaptive-batch",
        action = ArgAction::SetFalse,
        default_value_t = DEFAULT_ADAPTIVE_BATCHING
    )]
    pub adaptive_batching: bool,

    /// FILTER values whose records are dropped on input (repeatable)
    #[arg(
        help_heading("Advanced"),
        long = "reject-filter",
        value_name = "FILTER",
        default_values_t = DEFAULT_REJECT_FILTERS.iter().map(|s| s.to_string())
    )]
    pub reject_filters: Vec<String>,
}

impl MergeArgsInner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, updates: impl FnOnce(&mut Self)) -> Self {
        updates(&mut self);
        self
    }
}

impl Default for MergeArgsInner {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            adaptive_batching: DEFAULT_ADAPTIVE_BATCHING,
            reject_filters: DEFAULT_REJECT_FILTERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Initializes the verbosity level for logging based on the command-line
/// arguments.
pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.module_path().unwrap_or("unknown_module"),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

fn threads_in_range(s: &str) -> Result<usize> {
    let thread: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid thread number", s))?;
    if thread == 0 {
        return Err(anyhow!("Number of threads must be >= 1").into());
    }
    Ok(thread)
}

fn batch_size_in_range(s: &str) -> Result<usize> {
    let size: usize = s
        .parse::<usize>()
        .map_err(|_| anyhow!("`{}` is not a valid batch size", s))?;
    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size) {
        return Err(anyhow!(
            "Batch size must be between {} and {}",
            MIN_BATCH_SIZE,
            MAX_BATCH_SIZE
        )
        .into());
    }
    Ok(size)
}

fn check_file_exists(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        return Err(anyhow!("File does not exist: {}", path.display()).into());
    }
    Ok(path.to_path_buf())
}

fn check_prefix_path(s: &str) -> Result<String> {
    let path = Path::new(s);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            return Err(anyhow!("Path does not exist: {}", parent_dir.display()).into());
        }
    }
    Ok(s.to_string())
}

impl MergeArgs {
    pub fn process_gvcf_paths(&self) -> Result<Vec<PathBuf>> {
        match (&self.gvcfs, &self.gvcf_list) {
            (Some(gvcfs), None) => Ok(gvcfs.clone()),
            (None, Some(list_path)) => Self::read_gvcf_paths_from_file(list_path),
            _ => unreachable!("Either --gvcf or --gvcf-list is provided, never both"),
        }
    }

    fn read_gvcf_paths_from_file(path: &Path) -> Result<Vec<PathBuf>> {
        let file = File::open(path)
            .map_err(|e| anyhow!("Failed to open gVCF list file {}: {}", path.display(), e))?;
        let reader = BufReader::new(file);

        let mut paths = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| anyhow!("Error reading line {}: {}", line_num + 1, e))?;
            let trimmed = line.trim();
            // Skip empty or comment lines
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let path = PathBuf::from(trimmed);
            crate::utils::util::try_exists(&path)?;
            paths.push(path);
        }

        if paths.is_empty() {
            Err(anyhow!("No gVCF paths found in the input file".to_string()))?;
        }

        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threads_in_range() {
        assert!(threads_in_range("1").is_ok());
        assert!(threads_in_range("8").is_ok());
        assert!(threads_in_range("0").is_err());
        assert!(threads_in_range("abc").is_err());
    }

    #[test]
    fn test_batch_size_in_range() {
        assert_eq!(batch_size_in_range("2000").ok(), Some(2000));
        assert!(batch_size_in_range("1").is_err());
        assert!(batch_size_in_range("1000000").is_err());
    }

    #[test]
    fn test_path_validators() {
        let err = check_file_exists("/no/such/input.g.vcf").expect_err("missing file should fail");
        assert!(err.to_string().contains("does not exist"));
        let err = check_prefix_path("/no/such/dir/out.g.vcf").expect_err("missing dir should fail");
        assert!(err.to_string().contains("does not exist"));

        let gvcf = tempfile::NamedTempFile::new().expect("temp file should be creatable");
        assert!(check_file_exists(&gvcf.path().to_string_lossy()).is_ok());
        assert!(check_prefix_path("out.g.vcf").is_ok());
    }

    #[test]
    fn test_default_reject_filters() {
        let inner = MergeArgsInner::new();
        assert_eq!(inner.reject_filters, ["LowGQX", "LowDepth", "RefCall"]);
        assert!(inner.adaptive_batching);
    }

    #[test]
    fn test_read_gvcf_paths_skips_comments() {
        use std::io::Write as _;
        let mut list = tempfile::NamedTempFile::new().expect("temp file should be creatable");
        let gvcf = tempfile::NamedTempFile::new().expect("temp file should be creatable");
        writeln!(list, "# inputs").expect("list should be writable");
        writeln!(list).expect("list should be writable");
        writeln!(list, "{}", gvcf.path().display()).expect("list should be writable");
        list.flush().expect("list should flush");

        let args = MergeArgs {
            gvcfs: None,
            gvcf_list: Some(list.path().to_path_buf()),
            output: None,
            num_threads: 1,
            print_header: false,
            force_single: false,
            force_samples: false,
            no_version: false,
            merge_args: MergeArgsInner::new(),
        };
        let paths = args.process_gvcf_paths().expect("paths should parse");
        assert_eq!(paths, vec![gvcf.path().to_path_buf()]);
    }

    #[test]
    fn test_read_gvcf_paths_rejects_missing_entry() {
        use std::io::Write as _;
        let mut list = tempfile::NamedTempFile::new().expect("temp file should be creatable");
        writeln!(list, "/no/such/input.g.vcf").expect("list should be writable");
        list.flush().expect("list should flush");

        let args = MergeArgs {
            gvcfs: None,
            gvcf_list: Some(list.path().to_path_buf()),
            output: None,
            num_threads: 1,
            print_header: false,
            force_single: false,
            force_samples: false,
            no_version: false,
            merge_args: MergeArgsInner::new(),
        };
        let err = args
            .process_gvcf_paths()
            .expect_err("missing list entry should fail");
        assert!(err.to_string().contains("does not exist"));
    }
}
