mod commands;
mod output;

use atelier_core::{install_signal_handler, CoreError};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::export::ArchiveKind;
use commands::{
    CliError, EXIT_BUILD_ERROR, EXIT_BUSY, EXIT_EXEC_ERROR, EXIT_FAILURE, EXIT_USAGE,
};
use output::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "atelier",
    version,
    about = "Manage collaborative project workspaces backed by declarative Guix environments"
)]
struct Cli {
    /// Workspace directory to operate on.
    #[arg(short = 'd', long, default_value = ".", global = true)]
    directory: PathBuf,

    /// Output format for results.
    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    format: OutputFormat,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a new workspace.
    Create {
        /// Display name; multiple words are joined with spaces.
        name: Vec<String>,
    },
    /// List workspaces below the search paths.
    List {
        /// Directory to search; may be given several times.
        #[arg(short, long = "search-path")]
        search_path: Vec<PathBuf>,
        /// Search hidden directories too.
        #[arg(short, long, default_value_t = false)]
        all: bool,
    },
    /// Synchronize the profile with the manifest and channel pin.
    Sync,
    /// Share the workspace with users or groups.
    Share {
        /// Revoke instead of grant.
        #[arg(short = 'x', long, default_value_t = false)]
        remove: bool,
        /// Grant write permissions as well.
        #[arg(short, long, default_value_t = false)]
        write: bool,
        /// Skip the home-directory safety check.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// u:username, g:groupname or o (everyone).
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Copy the workspace; the copy gets its own identity.
    Copy {
        /// Destination directory.
        dest: Option<PathBuf>,
    },
    /// Change workspace metadata.
    Modify {
        /// key=value pairs; an empty value removes the key.
        #[arg(required = true)]
        metadata: Vec<String>,
    },
    /// Export the workspace as an archive.
    Export {
        /// Archive format.
        #[arg(value_enum)]
        kind: ArchiveKind,
        /// Output file, or a directory to pick a name inside.
        output: PathBuf,
    },
    /// Import a workspace from an archive.
    Import {
        /// Archive file.
        input: PathBuf,
        /// Destination directory.
        dest: Option<PathBuf>,
    },
    /// Package operations.
    #[command(subcommand)]
    Package(PackageCommands),
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum PackageCommands {
    /// List installed packages.
    Installed,
    /// Add or remove packages (+spec adds, -spec removes).
    Modify {
        #[arg(required = true, allow_hyphen_values = true)]
        specs: Vec<String>,
    },
    /// Upgrade all packages by unpinning the channel revisions.
    Upgrade,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ATELIER_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let directory = &cli.directory;
    let format = cli.format;

    let result = match &cli.command {
        Commands::Create { name } => commands::create::run(directory, name, format),
        Commands::List { search_path, all } => {
            commands::list::run(directory, search_path, *all, format)
        }
        Commands::Sync => commands::sync::run(directory, format),
        Commands::Share {
            remove,
            write,
            force,
            targets,
        } => commands::share::run(directory, targets, *write, *remove, *force, format),
        Commands::Copy { dest } => {
            let dest = dest.clone().unwrap_or_else(|| PathBuf::from("."));
            commands::copy::run(directory, &dest, format)
        }
        Commands::Modify { metadata } => commands::modify::run(directory, metadata, format),
        Commands::Export { kind, output } => {
            commands::export::run(directory, *kind, output, format)
        }
        Commands::Import { input, dest } => {
            let dest = dest.clone().unwrap_or_else(|| directory.clone());
            commands::import::run(input, &dest, format)
        }
        Commands::Package(PackageCommands::Installed) => {
            commands::package::installed(directory, format)
        }
        Commands::Package(PackageCommands::Modify { specs }) => {
            commands::package::modify(directory, specs, format)
        }
        Commands::Package(PackageCommands::Upgrade) => {
            commands::package::upgrade(directory, format)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(*shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(CliError::Usage(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_USAGE)
        }
        Err(CliError::Core(err)) => {
            output::emit_error(format, &err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &CoreError) -> u8 {
    match err {
        CoreError::Execution(_) => EXIT_EXEC_ERROR,
        CoreError::Busy => EXIT_BUSY,
        CoreError::PackageBuildFailure(_) | CoreError::BrokenManifest => EXIT_BUILD_ERROR,
        // Conventional code for death by SIGINT.
        CoreError::Interrupted => 130,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::ExecutionFailed;

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn exec_failures_exit_3() {
        let err = CoreError::Execution(ExecutionFailed {
            command: "guix".to_owned(),
            status: 1,
            stdout: String::new(),
            stderr: String::new(),
        });
        assert_eq!(exit_code_for(&err), EXIT_EXEC_ERROR);
    }

    #[test]
    fn busy_exits_4() {
        assert_eq!(exit_code_for(&CoreError::Busy), EXIT_BUSY);
    }

    #[test]
    fn build_failures_exit_5() {
        assert_eq!(
            exit_code_for(&CoreError::PackageBuildFailure(vec!["x".to_owned()])),
            EXIT_BUILD_ERROR
        );
        assert_eq!(exit_code_for(&CoreError::BrokenManifest), EXIT_BUILD_ERROR);
    }
}
