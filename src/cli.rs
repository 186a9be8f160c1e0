// src/cli.rs
use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::{env, path::PathBuf};

use crate::infra::t;

pub mod commands;

use commands::run::RunArgs;

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for `--lang <VALUE>` or `--lang=<VALUE>`.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--lang") {
        return args.get(pos + 1).cloned();
    }
    args.iter()
        .find_map(|arg| arg.strip_prefix("--lang="))
        .map(str::to_string)
}

fn build_cli() -> Command {
    Command::new("ci-matrix")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about").to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.lang").to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help(t!("cli.config").to_string())
                .value_name("CONFIG")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.run_about").to_string())
                .arg(
                    Arg::new("isabelle")
                        .long("isabelle")
                        .help(t!("cli.isabelle").to_string())
                        .value_name("VERSION")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("java")
                        .long("java")
                        .help(t!("cli.java").to_string())
                        .value_name("VERSION")
                        .value_parser(clap::value_parser!(u32))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("os")
                        .long("os")
                        .help(t!("cli.os").to_string())
                        .value_name("OS")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("remote")
                        .long("remote")
                        .help(t!("cli.remote").to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("num-tests")
                        .short('n')
                        .long("num-tests")
                        .help(t!("cli.num_tests").to_string())
                        .value_name("N")
                        .default_value("1")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("show-results")
                        .long("show-results")
                        .help(t!("cli.show_results").to_string())
                        .action(ArgAction::SetTrue)
                        .conflicts_with("no-show-results"),
                )
                .arg(
                    Arg::new("no-show-results")
                        .long("no-show-results")
                        .help(t!("cli.no_show_results").to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cli.init_about").to_string())
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("cli.non_interactive").to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .help(t!("cli.force").to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

pub async fn run() -> Result<()> {
    // Pre-parse language and initialize i18n first.
    let language = pre_parse_language();
    crate::init(language.as_deref());

    let matches = build_cli().get_matches();
    let config = matches.get_one::<PathBuf>("config").cloned();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let show_results = if run_matches.get_flag("show-results") {
                Some(true)
            } else if run_matches.get_flag("no-show-results") {
                Some(false)
            } else {
                None
            };
            let args = RunArgs {
                isabelle: run_matches.get_one::<String>("isabelle").cloned(),
                java: run_matches.get_one::<u32>("java").copied(),
                os: run_matches.get_one::<String>("os").cloned(),
                remote: run_matches.get_flag("remote"),
                num_tests: run_matches.get_one::<usize>("num-tests").copied().unwrap_or(1),
                show_results,
            };
            commands::run::execute(args, config, language.is_some()).await?;
        }
        Some(("init", init_matches)) => {
            let non_interactive = init_matches.get_flag("non-interactive");
            let force = init_matches.get_flag("force");
            commands::init::execute(config, non_interactive, force)?;
        }
        _ => {
            // `subcommand_required` makes clap print help and exit before this point.
        }
    }
    Ok(())
}
