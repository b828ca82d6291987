use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use melo_core::{init_logging, AppDirs, Config, Core, Request};
use melo_plugin::{Plugin, PluginLoader};
use std::path::PathBuf;
use thiserror::Error;

const BUILTIN_FILE_PLUGIN: &str = "file";

#[derive(Debug, Parser)]
#[command(name = "melo", version, about = "Melo media service")]
struct Cli {
    /// Config file to use instead of the one in the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the configured plugins and list what they registered
    Plugins,
    /// List registered browsers
    Browsers,
    /// List registered players
    Players,
    /// Send a request to a browser and print its reply
    Request {
        /// Browser id, e.g. file.browser
        browser: String,
        /// Request payload, passed as raw bytes
        payload: String,
    },
    /// Print the core version
    Version,
}

#[derive(Debug, Error)]
enum RequestError {
    #[error("{0}")]
    Dispatch(#[from] melo_core::DispatchError),
    #[error("{0}")]
    Reply(#[from] melo_core::ReplyError),
    #[error("failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("melo {}", melo_core::version());
        return Ok(());
    }

    let dirs = AppDirs::discover()?;
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load_or_default(&dirs)?,
    };
    let _logging = init_logging(&config.logging, &dirs)?;

    let core = Core::new();
    let loader = PluginLoader::new(&core);
    let plugins = load_plugins(&loader, &config);

    let outcome = run(&cli.command, &core, &config, &plugins);

    for plugin in plugins {
        loader.unload(plugin);
    }
    core.shutdown();
    outcome
}

fn run(command: &Command, core: &Core, config: &Config, plugins: &[Plugin]) -> Result<()> {
    match command {
        Command::Plugins => print_plugins(plugins),
        Command::Browsers => {
            for id in core.browsers().ids() {
                if let Some(browser) = core.browsers().get_by_id(&id) {
                    println!("{id}\t{}\t{}", browser.name(), browser.description());
                }
            }
        }
        Command::Players => {
            for id in core.players().ids() {
                if let Some(player) = core.players().get_by_id(&id) {
                    println!("{id}\t{}\t{}", player.name(), player.description());
                }
            }
        }
        Command::Request { browser, payload } => {
            let response = send_request(core, config, browser, payload.as_bytes())
                .with_context(|| format!("request to '{browser}' failed"))?;
            println!("{}", String::from_utf8_lossy(&response));
        }
        Command::Version => println!("melo {}", melo_core::version()),
    }
    Ok(())
}

/// Load every plugin directory from the config, then the built-in file plugin.
///
/// A plugin that fails to load is logged and skipped.
fn load_plugins(loader: &PluginLoader<'_>, config: &Config) -> Vec<Plugin> {
    let mut plugins = Vec::new();
    for dir in &config.plugins.paths {
        let mut plugin = match loader.load(dir) {
            Ok(plugin) => plugin,
            Err(err) => {
                tracing::error!(dir = %dir.display(), error = %err, "failed to load plugin");
                continue;
            }
        };
        if config.plugins.is_disabled(plugin.name()) {
            tracing::info!(plugin = plugin.name(), "plugin disabled by configuration");
            continue;
        }
        if loader.activate(&mut plugin) {
            plugins.push(plugin);
        }
    }

    let builtin_wanted = !config.plugins.is_disabled(BUILTIN_FILE_PLUGIN)
        && !loader.loaded().iter().any(|name| name == BUILTIN_FILE_PLUGIN);
    if builtin_wanted {
        let mut plugin = loader.load_static(BUILTIN_FILE_PLUGIN, melo_file_plugin::entry_point);
        if loader.activate(&mut plugin) {
            plugins.push(plugin);
        }
    }
    plugins
}

fn send_request(
    core: &Core,
    config: &Config,
    browser: &str,
    payload: &[u8],
) -> Result<Vec<u8>, RequestError> {
    let (request, reply) = Request::with_reply(payload);
    if let Err(err) = core.dispatch(browser, request.clone()) {
        request.discard();
        return Err(err.into());
    }
    drop(request);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(RequestError::Runtime)?;
    let response = runtime.block_on(reply.recv_timeout(config.requests.timeout()))?;
    Ok(response)
}

fn print_plugins(plugins: &[Plugin]) {
    if plugins.is_empty() {
        println!("No plugins loaded. Set plugins.paths in config.toml.");
        return;
    }
    for plugin in plugins {
        println!(
            "{} {} ({})",
            plugin.name(),
            plugin.version(),
            plugin.kind().as_str()
        );
        for registration in plugin.registrations() {
            println!("  - {} {}", registration.kind.as_str(), registration.id);
        }
    }
}
