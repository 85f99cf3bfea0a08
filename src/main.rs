mod align;
mod app;
mod capture;
mod composite;
mod config;
mod export;
mod history;
mod ocr;
mod pager;
mod paper;
mod preview;
mod session;

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use dialoguer::Confirm;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::{Recorder, RunOptions};
use crate::capture::{CaptureRect, FrameSource, ScreenSource};
use crate::config::{Config, ConfigStore, DEFAULT_MAX_ERROR, Profile};
use crate::paper::PaperSize;

fn cli() -> Command {
    let profile_arg = Arg::new("profile")
        .long("profile")
        .short('p')
        .value_name("NAME")
        .help("Capture profile to use (defaults to the selected one)");

    Command::new("scroll2pdf")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Stitches a scrolling screen region into pages and saves them as PDF or PNG")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Profiles file (default: <config dir>/scroll2pdf/profiles.json)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("FILTER")
                .global(true)
                .help("Log filter, e.g. debug or scroll2pdf=trace (overrides RUST_LOG)"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Start capturing; type u/s/q + Enter to undo, save, stop")
                .arg(profile_arg.clone())
                .arg(
                    Arg::new("paper")
                        .long("paper")
                        .default_value("a4")
                        .value_parser(PaperSize::NAMES)
                        .help("Paper size used to derive the page height"),
                )
                .arg(
                    Arg::new("tick-ms")
                        .long("tick-ms")
                        .default_value("200")
                        .value_parser(value_parser!(u64).range(10..))
                        .help("Capture interval in milliseconds"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_name("PATH")
                        .value_parser(value_parser!(PathBuf))
                        .help("Save here on stop (.pdf or .png)"),
                )
                .arg(
                    Arg::new("ocr")
                        .long("ocr")
                        .action(ArgAction::SetTrue)
                        .help("Run ocrmypdf on saved PDFs"),
                ),
        )
        .subcommand(
            Command::new("snap")
                .about("Capture the profile's region once and save it as PNG")
                .arg(profile_arg.clone())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .default_value("screenshots/area.png")
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("profile")
                .about("Manage capture profiles")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("List profiles"))
                .subcommand(
                    Command::new("add")
                        .about("Add a profile")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("x").long("x").default_value("0").value_parser(value_parser!(u32)))
                        .arg(Arg::new("y").long("y").default_value("0").value_parser(value_parser!(u32)))
                        .arg(Arg::new("width").long("width").required(true).value_parser(value_parser!(u32)))
                        .arg(Arg::new("height").long("height").required(true).value_parser(value_parser!(u32)))
                        .arg(
                            Arg::new("max-error")
                                .long("max-error")
                                .default_value("200")
                                .value_parser(value_parser!(f64)),
                        ),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete a profile")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("yes").long("yes").short('y').action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("select")
                        .about("Make a profile the default")
                        .arg(Arg::new("name").required(true)),
                ),
        )
}

fn init_logging(level: Option<&String>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scroll2pdf=info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads profiles, creating the full-screen `Default` profile on first use.
fn load_config(store: &ConfigStore) -> Result<Config> {
    let mut config = store
        .load()
        .with_context(|| format!("Failed to load {}", store.path().display()))?;
    if config.profiles.is_empty() {
        let screen = capture::primary_monitor_size().context("Failed to query primary monitor")?;
        config.ensure_default(screen);
        store.save(&config).context("Failed to save default profile")?;
        info!(width = screen.0, height = screen.1, "created default profile");
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_one::<String>("log-level"));

    let store = match matches.get_one::<PathBuf>("config") {
        Some(path) => ConfigStore::at(path),
        None => ConfigStore::default_location()?,
    };

    match matches.subcommand() {
        Some(("run", sub)) => run(&store, sub).await,
        Some(("snap", sub)) => snap(&store, sub),
        Some(("profile", sub)) => profile(&store, sub),
        _ => unreachable!("subcommand_required"),
    }
}

async fn run(store: &ConfigStore, matches: &ArgMatches) -> Result<()> {
    let mut config = load_config(store)?;
    let (name, profile) = config.resolve(matches.get_one::<String>("profile").map(String::as_str))?;
    let name = name.to_string();
    let profile = *profile;

    let paper: PaperSize = matches
        .get_one::<String>("paper")
        .map(|p| p.parse())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or_default();
    let options = RunOptions {
        rect: profile.region,
        max_error: profile.max_error,
        paper,
        tick: Duration::from_millis(*matches.get_one::<u64>("tick-ms").unwrap_or(&200)),
        output: matches.get_one::<PathBuf>("output").cloned(),
        last_file: config.last_file.clone(),
        ocr: matches.get_flag("ocr"),
    };

    println!("scroll2pdf starting with profile '{name}' ({:?})", profile.region);
    println!("{}", app::HELP);
    if let Some(path) = options.output.as_ref().or(options.last_file.as_ref()) {
        println!("Default save path: {}", path.display());
    }

    let mut recorder = Recorder::start(ScreenSource::new(), options.rect, options.max_error, options.paper)?;
    let commands = app::spawn_stdin_commands();
    let saved = app::run(&mut recorder, &options, commands, tokio::signal::ctrl_c()).await?;
    info!(
        pages = recorder.session().pages().len(),
        rows = recorder.session().state().total_rows(),
        "capture stopped"
    );

    if let Some(last) = saved.last() {
        config.last_file = Some(last.clone());
        config.select(&name)?;
        if let Err(err) = store.save(&config) {
            warn!(error = %err, "failed to remember last file");
        }
    }
    Ok(())
}

fn snap(store: &ConfigStore, matches: &ArgMatches) -> Result<()> {
    let config = load_config(store)?;
    let (name, profile) = config.resolve(matches.get_one::<String>("profile").map(String::as_str))?;
    let out = matches
        .get_one::<PathBuf>("out")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("screenshots/area.png"));

    let frame = ScreenSource::new().capture(profile.region)?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    frame
        .save(&out)
        .with_context(|| format!("Failed to save {}", out.display()))?;
    println!("Saved area of profile '{name}' ({}x{}) to {}", frame.width(), frame.height(), out.display());
    Ok(())
}

fn profile(store: &ConfigStore, matches: &ArgMatches) -> Result<()> {
    let mut config = load_config(store)?;
    match matches.subcommand() {
        Some(("list", _)) => {
            let selected = config.selected()?.0.to_string();
            for (name, profile) in &config.profiles {
                let marker = if *name == selected { "*" } else { " " };
                let r = profile.region;
                println!(
                    "{marker} {name}: {}x{} at ({}, {}), max error {}",
                    r.width, r.height, r.x, r.y, profile.max_error
                );
            }
            return Ok(());
        }
        Some(("add", sub)) => {
            let name = required(sub, "name")?;
            let get = |key: &str| sub.get_one::<u32>(key).copied().unwrap_or(0);
            let region = CaptureRect::new(get("x"), get("y"), get("width"), get("height"));
            if region.width == 0 || region.height == 0 {
                bail!("Profile region must have a non-zero width and height");
            }
            let max_error = sub.get_one::<f64>("max-error").copied().unwrap_or(DEFAULT_MAX_ERROR);
            config.add_profile(&name, Profile { region, max_error })?;
            config.select(&name)?;
            println!("Added profile '{name}'");
        }
        Some(("delete", sub)) => {
            let name = required(sub, "name")?;
            let confirmed = sub.get_flag("yes")
                || Confirm::new()
                    .with_prompt(format!("Delete profile '{name}'?"))
                    .default(false)
                    .interact()
                    .context("Failed to read confirmation")?;
            if !confirmed {
                return Ok(());
            }
            config.remove_profile(&name)?;
            println!("Deleted profile '{name}'");
        }
        Some(("select", sub)) => {
            let name = required(sub, "name")?;
            config.select(&name)?;
            println!("Selected profile '{name}'");
        }
        _ => unreachable!("subcommand_required"),
    }
    store.save(&config).context("Failed to save profiles")?;
    Ok(())
}

fn required(matches: &ArgMatches, key: &str) -> Result<String> {
    matches
        .get_one::<String>(key)
        .cloned()
        .with_context(|| format!("missing <{key}>"))
}
