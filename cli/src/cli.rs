//! Command-line surface.

use crate::batch::{BatchRequest, Invocation};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "blackout")]
#[command(about = "Redact personally identifiable information from machine-readable PDFs")]
#[command(version)]
pub struct Cli {
    /// Input collection (directory under the stage root)
    pub input: String,

    /// Output collection (directory under the stage root)
    pub output: String,

    /// File to process; several words are joined with single spaces.
    /// Without it every document in INPUT is processed.
    pub file: Vec<String>,

    /// Configuration file (defaults to ./blackout.json when present)
    #[arg(short, long, env = "BLACKOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the stage root directory
    #[arg(long)]
    pub stage_root: Option<PathBuf>,

    /// Override the processing record log path
    #[arg(long)]
    pub log_path: Option<PathBuf>,

    /// In bulk mode, skip files whose latest record completed
    #[arg(long)]
    pub skip_completed: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn invocation(&self) -> Invocation {
        if self.file.is_empty() {
            Invocation::Bulk
        } else {
            Invocation::Single(self.file.join(" "))
        }
    }

    pub fn request(&self) -> BatchRequest {
        BatchRequest {
            input: self.input.clone(),
            output: self.output.clone(),
            invocation: self.invocation(),
            skip_completed: self.skip_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_two_arguments_select_bulk_mode() {
        let cli = Cli::try_parse_from(["blackout", "inbox", "outbox"]).unwrap();
        assert_eq!(cli.invocation(), Invocation::Bulk);
        assert_eq!(cli.request().input, "inbox");
    }

    #[test]
    fn test_trailing_words_form_one_file_name() {
        let cli = Cli::try_parse_from(["blackout", "in", "out", "my", "important", "document.pdf"])
            .unwrap();
        assert_eq!(
            cli.invocation(),
            Invocation::Single("my important document.pdf".to_string())
        );

        let quoted = Cli::try_parse_from(["blackout", "in", "out", "my important document.pdf"])
            .unwrap();
        assert_eq!(quoted.invocation(), cli.invocation());
    }

    #[test]
    fn test_options() {
        let cli = Cli::try_parse_from([
            "blackout",
            "--skip-completed",
            "-v",
            "--log-path",
            "/var/log/records.jsonl",
            "in",
            "out",
        ])
        .unwrap();
        assert!(cli.skip_completed);
        assert!(cli.verbose);
        assert_eq!(cli.log_path, Some(PathBuf::from("/var/log/records.jsonl")));
    }

    #[test]
    fn test_missing_output_is_rejected() {
        assert!(Cli::try_parse_from(["blackout", "in"]).is_err());
    }
}
