//! Keystone CLI, the command-line interface to the keystone rule key engine.
//!
//! Computes default, dependency-file and manifest keys for rules declared in
//! TOML rule files, and records and looks up dependency-file keys in the
//! project's manifest store.

#![warn(missing_docs)]

mod keys;
mod manifest;
mod project;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Exit code for a dependency file that no longer matches the rule's inputs.
pub const EXIT_STALE: i32 = 2;

/// Keystone, content-addressed rule keys with dependency-file narrowing.
#[derive(Parser, Debug)]
#[command(name = "keystone", version, about = "Keystone rule key engine")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project directory containing `keystone.toml`.
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format for computed keys.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the default rule key of one or more rules.
    Key {
        /// Rule description files.
        #[arg(required = true, num_args = 1..)]
        rules: Vec<PathBuf>,
    },
    /// Compute a rule's dependency-file key from a recorded dependency file.
    DepFileKey(DepFileArgs),
    /// Compute a rule's manifest key.
    ManifestKey {
        /// Rule description file.
        rule: PathBuf,
    },
    /// Compute a rule's dependency-file key and record it under its manifest key.
    Record(DepFileArgs),
    /// Find a recorded dependency-file key whose inputs are unchanged.
    Lookup {
        /// Rule description file.
        rule: PathBuf,
    },
}

/// Arguments for commands that read a dependency file.
#[derive(Parser, Debug)]
pub struct DepFileArgs {
    /// Rule description file.
    pub rule: PathBuf,

    /// Dependency file listing the inputs the last build used.
    #[arg(long)]
    pub deps: PathBuf,
}

/// Key output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Explicit project directory.
    pub project: Option<PathBuf>,
    /// Output format.
    pub format: OutputFormat,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        project: cli.project,
        format: cli.format,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Key { ref rules } => keys::run_key(rules, &global),
        Command::DepFileKey(ref args) => keys::run_dep_file_key(args, &global),
        Command::ManifestKey { ref rule } => keys::run_manifest_key(rule, &global),
        Command::Record(ref args) => manifest::run_record(args, &global),
        Command::Lookup { ref rule } => manifest::run_lookup(rule, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` overrides the level chosen
/// by `--quiet`/`--verbose`.
fn init_logging(global: &GlobalArgs) {
    let default_level = if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_key_multiple_rules() {
        let cli = Cli::parse_from(["keystone", "key", "rules/a.toml", "rules/b.toml"]);
        match cli.command {
            Command::Key { ref rules } => {
                assert_eq!(
                    rules,
                    &vec![PathBuf::from("rules/a.toml"), PathBuf::from("rules/b.toml")]
                );
            }
            _ => panic!("expected Key command"),
        }
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn parse_key_requires_rule() {
        assert!(Cli::try_parse_from(["keystone", "key"]).is_err());
    }

    #[test]
    fn parse_dep_file_key() {
        let cli = Cli::parse_from([
            "keystone",
            "dep-file-key",
            "foo.toml",
            "--deps",
            "out/foo.deps",
        ]);
        match cli.command {
            Command::DepFileKey(ref args) => {
                assert_eq!(args.rule, PathBuf::from("foo.toml"));
                assert_eq!(args.deps, PathBuf::from("out/foo.deps"));
            }
            _ => panic!("expected DepFileKey command"),
        }
    }

    #[test]
    fn parse_dep_file_key_requires_deps() {
        assert!(Cli::try_parse_from(["keystone", "dep-file-key", "foo.toml"]).is_err());
    }

    #[test]
    fn parse_manifest_key_and_lookup() {
        let cli = Cli::parse_from(["keystone", "manifest-key", "foo.toml"]);
        assert!(matches!(cli.command, Command::ManifestKey { .. }));
        let cli = Cli::parse_from(["keystone", "lookup", "foo.toml"]);
        assert!(matches!(cli.command, Command::Lookup { .. }));
    }

    #[test]
    fn parse_record() {
        let cli = Cli::parse_from(["keystone", "record", "foo.toml", "--deps", "foo.deps"]);
        match cli.command {
            Command::Record(ref args) => assert_eq!(args.deps, PathBuf::from("foo.deps")),
            _ => panic!("expected Record command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from([
            "keystone",
            "--quiet",
            "--project",
            "/work/demo",
            "--format",
            "json",
            "manifest-key",
            "foo.toml",
        ]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.project, Some(PathBuf::from("/work/demo")));
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["keystone", "key", "foo.toml", "--verbose"]);
        assert!(cli.verbose);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["keystone", "-q", "-v", "key", "foo.toml"]).is_err());
    }
}
