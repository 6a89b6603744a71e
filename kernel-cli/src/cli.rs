//! Hand-rolled argument parsing for the `kernel` binary. Two subcommands,
//! a handful of flags each — not worth a dependency.

use std::path::PathBuf;

pub enum Command {
    /// Runs the kernel against `config`, resuming from the latest
    /// checkpoint under the configured `run_dir` if one exists.
    Run { config: PathBuf },
    /// Prints a summary of the checkpoint file at `path`.
    Inspect { path: PathBuf },
}

#[derive(Debug)]
pub struct UsageError(pub String);

impl std::fmt::Display for UsageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n\nusage:\n  kernel run --config <path>\n  kernel inspect <checkpoint-path>", self.0)
    }
}

pub fn parse(args: impl Iterator<Item = String>) -> Result<Command, UsageError> {
    let mut args: Vec<String> = args.collect();
    if args.is_empty() {
        return Err(UsageError("missing subcommand".into()));
    }
    let subcommand = args.remove(0);
    match subcommand.as_str() {
        "run" => {
            let mut config = None;
            let mut iter = args.into_iter();
            while let Some(flag) = iter.next() {
                match flag.as_str() {
                    "--config" => {
                        config = Some(PathBuf::from(iter.next().ok_or_else(|| UsageError("--config requires a path".into()))?));
                    }
                    other => return Err(UsageError(format!("unrecognized flag {other}"))),
                }
            }
            let config = config.ok_or_else(|| UsageError("run requires --config <path>".into()))?;
            Ok(Command::Run { config })
        }
        "inspect" => {
            let path = args.into_iter().next().ok_or_else(|| UsageError("inspect requires a checkpoint path".into()))?;
            Ok(Command::Inspect { path: PathBuf::from(path) })
        }
        other => Err(UsageError(format!("unknown subcommand {other}"))),
    }
}
