//! Command-line host for nanocom component modules.

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nanocom_core::{env_vars, Loader, LoaderConfig, LoaderEvent, ModuleId, DEFAULT_LOG_FILTER};
use nanocom_interfaces::{COMPONENT_A_MODULE, COMPONENT_B_MODULE};
use serde::Serialize;

/// Load component modules and drive their interfaces.
#[derive(Parser, Debug)]
#[command(name = "nanocom")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Extra directory to search for modules (repeatable).
    #[arg(short = 'L', long = "module-path", global = true)]
    module_paths: Vec<PathBuf>,

    /// Loader configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_log: bool,

    /// Skip modules that cannot be found instead of failing.
    #[arg(long, global = true)]
    optional: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print the version descriptor of one module.
    Info {
        /// Module name or library path.
        module: String,
    },
    /// Call component A.
    Alpha {
        #[arg(default_value = COMPONENT_A_MODULE)]
        module: String,
    },
    /// Round-trip one value through component B.
    Kv {
        #[arg(default_value = COMPONENT_B_MODULE)]
        module: String,
        #[arg(long, default_value = demo::DEMO_KEY)]
        key: String,
        #[arg(long, default_value_t = demo::DEMO_VALUE)]
        value: i32,
    },
    /// Show both components' versions, then use each of them.
    Demo,
}

fn main() {
    let args = Args::parse();
    init_logging(args.json_log);

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(json: bool) {
    let json = json
        || std::env::var(env_vars::LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false);

    let env_filter = tracing_subscriber::EnvFilter::try_from_env(env_vars::LOG)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn loader_config(args: &Args) -> Result<LoaderConfig> {
    let mut config = match &args.config {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => LoaderConfig::from_env(),
    };
    config.search_paths.extend(args.module_paths.iter().cloned());

    // Modules built in the same workspace sit next to the binary.
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
    {
        config.search_paths.push(dir);
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = loader_config(&args)?;
    tracing::debug!(search_paths = ?config.search_paths, "loader configured");

    let loader = Loader::new(config).with_event_callback(|event| match event {
        LoaderEvent::Mapped { module, location, .. } => {
            tracing::debug!(%module, %location, "mapped");
        }
        LoaderEvent::Unmapped { module, mappings } => {
            tracing::debug!(%module, mappings, "unmapped");
        }
        LoaderEvent::MapFailed { module, error } => {
            tracing::debug!(%module, %error, "map failed");
        }
        LoaderEvent::SymbolMissing { module, symbol } => {
            tracing::debug!(%module, %symbol, "symbol missing");
        }
    });

    let output = Output {
        json: args.json,
        optional: args.optional,
    };

    match args.command {
        Command::Info { module } => {
            output.step(&module, || demo::module_info(&loader, &ModuleId::new(module.as_str())), print_info)
        }
        Command::Alpha { module } => {
            output.step(&module, || demo::exercise_alpha(&loader, &ModuleId::new(module.as_str())), print_alpha)
        }
        Command::Kv { module, key, value } => output.step(
            &module,
            || demo::exercise_kv(&loader, &ModuleId::new(module.as_str()), &key, value),
            print_kv,
        ),
        Command::Demo => run_demo(&loader, &output),
    }?;

    let leaked = loader.loaded_modules();
    if !leaked.is_empty() {
        tracing::error!(modules = ?leaked, "modules still mapped at exit");
    }
    Ok(())
}

fn run_demo(loader: &Loader, output: &Output) -> Result<()> {
    let alpha = ModuleId::new(COMPONENT_A_MODULE);
    let store = ModuleId::new(COMPONENT_B_MODULE);

    output.step(alpha.as_str(), || demo::module_info(loader, &alpha), print_info)?;
    output.step(alpha.as_str(), || demo::exercise_alpha(loader, &alpha), print_alpha)?;
    output.step(store.as_str(), || demo::module_info(loader, &store), print_info)?;
    output.step(
        store.as_str(),
        || demo::exercise_kv(loader, &store, demo::DEMO_KEY, demo::DEMO_VALUE),
        print_kv,
    )?;
    Ok(())
}

struct Output {
    json: bool,
    optional: bool,
}

impl Output {
    /// Run one step and print its result; a missing module is skipped when
    /// running with `--optional`.
    fn step<T: Serialize>(
        &self,
        module: &str,
        step: impl FnOnce() -> Result<T>,
        print: fn(&T),
    ) -> Result<()> {
        match step() {
            Ok(value) => {
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&value)?);
                } else {
                    print(&value);
                }
                Ok(())
            }
            Err(e) if self.optional && demo::is_missing_module(&e) => {
                tracing::warn!(module, "module not found, skipping");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn print_info(info: &demo::ModuleInfo) {
    println!("Module:      {}", info.module);
    println!("Version:     {}", info.version);
    println!("Description: {}", info.description);
    println!();
}

fn print_alpha(report: &demo::AlphaReport) {
    println!("get42:             {}", report.answer);
    println!("connection string: {}", report.connection_string);
    println!();
}

fn print_kv(report: &demo::KvReport) {
    println!("Key:     {}", report.key);
    println!("Stored:  {}", report.stored);
    println!("Deleted: {}", report.deleted);
    println!();
}
