use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::info;

use strata::app::{Application, CliOverrides, Command as AppCommand};
use strata_core::logging::{init_logging, LogFormat};
use strata_core::EngineSettings;

fn trailing_flags() -> Arg {
    Arg::new("flags")
        .value_name("FLAGS")
        .help("Arguments for the flag source, given after --")
        .num_args(0..)
        .last(true)
        .allow_hyphen_values(true)
}

fn cli() -> Command {
    Command::new("strata")
        .version("1.0.0")
        .about("Layered configuration aggregation")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Engine settings file"),
        )
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Required configuration file or directory")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("optional")
                .short('o')
                .long("optional")
                .value_name("FILE")
                .help("Optional configuration file or directory")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("no-env")
                .long("no-env")
                .help("Do not read the process environment")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-expand")
                .long("no-expand")
                .help("Print values without resolving ${...} references")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log format")
                .value_parser(["pretty", "compact", "json"]),
        )
        .subcommand(
            Command::new("get")
                .about("Print the value of one key")
                .arg(Arg::new("key").required(true))
                .arg(trailing_flags()),
        )
        .subcommand(
            Command::new("all")
                .about("Print every key and value as JSON")
                .arg(trailing_flags()),
        )
        .subcommand(
            Command::new("keys")
                .about("List every key")
                .arg(trailing_flags()),
        )
        .subcommand(
            Command::new("watch")
                .about("Print change events for keys matching a pattern")
                .arg(Arg::new("pattern").required(true))
                .arg(trailing_flags()),
        )
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// The requested command and the flag source arguments
fn command(matches: &ArgMatches) -> Result<(AppCommand, Vec<String>)> {
    let (name, sub) = matches
        .subcommand()
        .context("a command is required")?;
    let arg = |id: &str| {
        sub.get_one::<String>(id)
            .cloned()
            .with_context(|| format!("missing <{id}>"))
    };
    let command = match name {
        "get" => AppCommand::Get(arg("key")?),
        "all" => AppCommand::All,
        "keys" => AppCommand::Keys,
        "watch" => AppCommand::Watch(arg("pattern")?),
        other => anyhow::bail!("unsupported command: {other}"),
    };
    Ok((command, strings(sub, "flags")))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut settings = EngineSettings::load(config_path.map(String::as_str))
        .with_context(|| format!("failed to load settings: {config_path:?}"))?;

    let level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| settings.logging.level.clone());
    let format = match matches.get_one::<String>("log-format") {
        Some(f) => f.parse::<LogFormat>()?,
        None => settings.logging.format,
    };
    init_logging(&level, format)?;

    CliOverrides {
        files: strings(&matches, "file"),
        optional_files: strings(&matches, "optional"),
        no_env: matches.get_flag("no-env"),
        no_expand: matches.get_flag("no-expand"),
    }
    .apply(&mut settings);

    let (command, flags) = command(&matches)?;
    let app = Application::new(&settings, flags).await?;
    info!(sources = app.manager().sources().len(), "configuration loaded");

    let mut stdout = std::io::stdout();
    let result = app.run(command, &mut stdout).await;
    app.close()?;
    result
}
