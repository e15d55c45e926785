//! cnsh: a minimal package manager for npm-compatible registries.

mod commands;
mod logging;

use std::path::Path;
use std::process;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use cnsh_core::{InstallScope, PackageManifest};

use commands::publish::PublishFailed;

#[derive(Parser, Debug)]
#[command(
    name = "cnsh",
    about = "A minimal package manager for npm-compatible registries",
    disable_version_flag = true
)]
struct Cli {
    /// Print the version from the local package.json
    #[arg(long)]
    version: bool,

    /// Operate on the global install root instead of the working directory
    #[arg(short = 'g', long, global = true)]
    global: bool,

    /// Enable debug diagnostics on stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Install a package from the registry
    Add {
        /// Package name, optionally scoped (@scope/name)
        name: String,
    },
    /// Remove an installed package
    Remove {
        /// Package name
        name: String,
    },
    /// Install every dependency listed in package.json
    Install,
    /// Create a package.json
    Init {
        /// Accept all defaults without prompting
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Publish the project with npm
    Publish,
}

impl Cli {
    fn scope(&self) -> InstallScope {
        if self.global {
            InstallScope::Global
        } else {
            InstallScope::Local
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            process::exit(code);
        }
    };

    logging::init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(exit_code(&e));
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    if cli.version {
        println!("{}", project_version(&cwd)?);
        return Ok(());
    }

    let scope = cli.scope();
    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        anyhow::bail!("no command given");
    };

    match command {
        Commands::Init { yes } => commands::init::run(&cwd, yes),
        Commands::Add { name } => block_on(commands::packages::add(&cwd, scope, &name)),
        Commands::Remove { name } => block_on(commands::packages::remove(&cwd, scope, &name)),
        Commands::Install => block_on(commands::packages::install(&cwd, scope)),
        Commands::Publish => block_on(commands::publish::run(&cwd)),
    }
}

/// Drive an async command on a single-threaded runtime.
fn block_on<F>(future: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

fn project_version(cwd: &Path) -> anyhow::Result<String> {
    Ok(PackageManifest::load(cwd)?.version)
}

/// Exit status for a failed command.
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<PublishFailed>() {
        Some(failed) if failed.code != 0 => failed.code,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("cnsh").chain(args.iter().copied()))
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flag_before_or_after_subcommand() {
        let cli = parse(&["add", "-g", "left-pad"]).unwrap();
        assert!(cli.global);
        assert_eq!(cli.command, Some(Commands::Add { name: "left-pad".into() }));

        let cli = parse(&["--global", "remove", "left-pad"]).unwrap();
        assert_eq!(cli.scope(), InstallScope::Global);
        assert_eq!(cli.command, Some(Commands::Remove { name: "left-pad".into() }));
    }

    #[test]
    fn init_accepts_yes() {
        let cli = parse(&["init", "-y"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Init { yes: true }));
        let cli = parse(&["init"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Init { yes: false }));
    }

    #[test]
    fn missing_name_is_usage_error() {
        let err = parse(&["add"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn unknown_command_is_usage_error() {
        let err = parse(&["frobnicate"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn help_is_not_a_failure() {
        let err = parse(&["--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn version_flag_parses_without_command() {
        let cli = parse(&["--version"]).unwrap();
        assert!(cli.version);
        assert!(cli.command.is_none());
    }

    #[test]
    fn version_comes_from_package_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name": "app", "version": "2.4.1"}"#,
        )
        .unwrap();
        assert_eq!(project_version(dir.path()).unwrap(), "2.4.1");

        let empty = tempfile::tempdir().unwrap();
        assert!(project_version(empty.path()).is_err());
    }

    #[test]
    fn publish_failure_code_is_forwarded() {
        let err = anyhow::Error::from(PublishFailed { code: 3 });
        assert_eq!(exit_code(&err), 3);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
