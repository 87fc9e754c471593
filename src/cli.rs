use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

use crate::archive::{MAX_FULL_DOWNLOAD, OpenOptions};

#[derive(Parser, Debug)]
#[command(name = "packzip")]
#[command(version)]
#[command(about = "Read ZIP packages from disk, HTTP or exploded directories", long_about = None)]
#[command(after_help = "Examples:\n  \
  packzip ls book.epub                         list entries of a local package\n  \
  packzip ls https://example.com/book/         (fails: exploded HTTP can't list)\n  \
  packzip cat https://example.com/book.epub mimetype\n  \
  packzip inject tmp.epub out.epub OEBPS/manifest.json --file manifest.json")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// HTTP client timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30, global = true)]
    pub timeout: u64,

    /// Largest archive downloaded whole when the server lacks Range support
    #[arg(long, value_name = "BYTES", default_value_t = MAX_FULL_DOWNLOAD, global = true)]
    pub max_download: u64,

    /// More log output (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List entries, one per line
    Ls {
        /// ZIP file, directory, or HTTP URL
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Read a local ZIP whole into memory instead of streaming it
        #[arg(long)]
        buffered: bool,
    },

    /// Write one entry to stdout
    Cat {
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        #[arg(value_name = "ENTRY")]
        entry: String,

        #[arg(long)]
        buffered: bool,
    },

    /// Rewrite TMP into FINAL with ENTRY replaced
    Inject {
        #[arg(value_name = "TMP")]
        tmp: PathBuf,

        #[arg(value_name = "FINAL")]
        final_path: PathBuf,

        #[arg(value_name = "ENTRY")]
        entry: String,

        /// New content (default: stdin)
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
}

impl Cli {
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::new()
            .timeout(Duration::from_secs(self.timeout))
            .max_full_download(self.max_download)
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inject_with_file() {
        let cli = Cli::parse_from([
            "packzip", "-vv", "inject", "a.zip", "b.zip", "mimetype", "--file", "m.txt",
        ]);
        assert_eq!(cli.log_level(), LevelFilter::Debug);
        match cli.command {
            Command::Inject { entry, file, .. } => {
                assert_eq!(entry, "mimetype");
                assert_eq!(file, Some(PathBuf::from("m.txt")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn options_follow_flags() {
        let cli = Cli::parse_from(["packzip", "ls", "x.epub", "--max-download", "10", "-q"]);
        let options = cli.open_options();
        assert_eq!(options.max_full_download, 10);
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(cli.log_level(), LevelFilter::Error);
    }
}
