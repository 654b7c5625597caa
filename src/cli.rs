use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "walkpipe")]
#[command(version)]
#[command(about = "Walk folders, zip and tar archives as one tree", long_about = None)]
#[command(after_help = "Examples:\n  \
  walkpipe data/                     list every file under data/, archives included\n  \
  walkpipe -m '*.txt' -d 'dumps/*'   list .txt files, first occurrence of each name\n  \
  walkpipe -c logs.tar               count the members of logs.tar\n  \
  walkpipe -t -m '*.csv' export.zip  print the text of every csv in export.zip")]
pub struct Cli {
    /// Paths or wildcard patterns
    #[arg(value_name = "PATTERNS", required = true)]
    pub patterns: Vec<String>,

    /// Keep only entries whose file name matches this glob
    #[arg(short = 'm', long = "mask", value_name = "GLOB")]
    pub mask: Option<String>,

    /// Number of parallel walkers
    #[arg(short = 'j', long = "jobs", value_name = "N", default_value_t = 4,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub jobs: u16,

    /// Drop entries whose file name was already seen
    #[arg(short = 'd', long = "dedup")]
    pub dedup: bool,

    /// Print the number of entries
    #[arg(short = 'c', long = "count", conflicts_with = "text")]
    pub count: bool,

    /// List entries (default unless counting)
    #[arg(short = 'l', long = "list")]
    pub list: bool,

    /// Print the decoded text of every entry
    #[arg(short = 't', long = "text")]
    pub text: bool,

    /// More logging (-vv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Errors only
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn is_listing(&self) -> bool {
        self.list || (!self.count && !self.text)
    }

    /// Default log filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "walkpipe=info,warn",
            1 => "walkpipe=debug,info",
            _ => "walkpipe=trace,debug",
        }
    }
}
