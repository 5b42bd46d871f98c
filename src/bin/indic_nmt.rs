//! indic-nmt CLI binary.
//!
//! Marian translation service for Indian languages.
//!
//! # Commands
//!
//! - `serve` - Load all configured models and start the HTTP server
//! - `translate` - Translate one text from the command line
//! - `languages` - Show configured languages and their artifact directories

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use indic_nmt::{
    config::{parse_language_list, Config},
    inference::{parse_device, CONFIG_FILE, WEIGHTS_FILE},
    server::{create_router, AppState},
    translate_text, validate_text, MarianTranslator, ModelRegistry, Translator, VERSION,
};

#[derive(Parser)]
#[command(name = "indic-nmt")]
#[command(version = VERSION)]
#[command(about = "Marian translation service for Indian languages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that resolves configuration
#[derive(Args)]
struct ConfigArgs {
    /// TOML config file (default: ./indic-nmt.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory with one model subdirectory per language
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Comma separated language codes to load
    #[arg(long)]
    languages: Option<String>,

    /// Compute device (cpu, cuda:N, metal:N)
    #[arg(long)]
    device: Option<String>,
}

impl ConfigArgs {
    /// Defaults, then file, then environment, then these flags
    fn resolve(&self) -> anyhow::Result<Config> {
        let mut config = Config::discover(self.config.as_deref())?.with_env();
        if let Some(root) = &self.models_dir {
            config.models.root.clone_from(root);
        }
        if let Some(languages) = &self.languages {
            config.models.languages = parse_language_list(languages);
        }
        if let Some(device) = &self.device {
            config.models.device.clone_from(device);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP translation server
    Serve {
        #[command(flatten)]
        config: ConfigArgs,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen host
        #[arg(long)]
        host: Option<String>,

        /// Bind to all interfaces
        #[arg(long)]
        bind_all: bool,

        /// Disable the cross-origin policy layer
        #[arg(long)]
        no_cors: bool,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Emit logs as JSON lines
        #[arg(long)]
        log_json: bool,
    },

    /// Translate text without starting the server
    Translate {
        #[command(flatten)]
        config: ConfigArgs,

        /// Target language code
        #[arg(short, long)]
        language: String,

        /// Text to translate (or - for stdin)
        text: Option<String>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// List configured languages
    Languages {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            host,
            bind_all,
            no_cors,
            verbose,
            log_json,
        } => cmd_serve(&config, port, host, bind_all, no_cors, verbose, log_json),

        Commands::Translate {
            config,
            language,
            text,
            verbose,
        } => cmd_translate(&config, &language, text, verbose),

        Commands::Languages { config } => cmd_languages(&config),
    }
}

/// Default filter for the server: this crate and request traces at debug
const SERVE_LOG_FILTER: &str = "info,indic_nmt=debug,tower_http=debug";

/// Filter used when `RUST_LOG` is unset
fn log_filter(verbose: bool, default: &str) -> &str {
    if verbose {
        "debug"
    } else {
        default
    }
}

fn init_logging(filter: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_serve(
    args: &ConfigArgs,
    port: Option<u16>,
    host: Option<String>,
    bind_all: bool,
    no_cors: bool,
    verbose: bool,
    log_json: bool,
) -> anyhow::Result<()> {
    init_logging(log_filter(verbose, SERVE_LOG_FILTER), log_json);

    let mut config = args.resolve()?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    if no_cors {
        config.server.cors = false;
    }

    let mut server_config = config.server_config()?;
    if bind_all {
        server_config = server_config.bind_all();
    }

    // Fail fast: never serve with a partially loaded registry
    let registry = ModelRegistry::load(&config.models, &config.generation)?;

    let state = Arc::new(AppState::new(server_config.clone(), registry));
    let app = create_router(state);

    tracing::info!("Starting indic-nmt server on {}", server_config.addr);
    tracing::info!(
        "CORS: {}",
        if server_config.cors_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(server_config.addr).await?;
        axum::serve(listener, app).await?;
        Ok::<_, anyhow::Error>(())
    })
}

fn cmd_translate(
    args: &ConfigArgs,
    language: &str,
    text: Option<String>,
    verbose: bool,
) -> anyhow::Result<()> {
    init_logging(log_filter(verbose, "info"), false);

    let text = read_input(text)?;
    let text = text.trim_end_matches(['\r', '\n']);
    validate_text(text)?;

    let config = args.resolve()?;
    if !config.models.languages.iter().any(|l| l == language) {
        anyhow::bail!("Language '{language}' not supported");
    }

    let device = parse_device(&config.models.device)?;
    let translator = MarianTranslator::load(
        language,
        &config.models.path_for(language),
        &device,
        &config.generation,
    )?;
    let registry = ModelRegistry::from_translators([(
        language.to_string(),
        Arc::new(translator) as Arc<dyn Translator>,
    )]);

    let translated = translate_text(&registry, text, language).map_err(|err| {
        // Keep the cause visible on the command line
        match std::error::Error::source(&err) {
            Some(source) => anyhow::anyhow!("{err}: {source}"),
            None => anyhow::anyhow!("{err}"),
        }
    })?;
    println!("{translated}");
    Ok(())
}

fn cmd_languages(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = args.resolve()?;

    println!("Device: {}", config.models.device);
    println!();
    println!("{:<8} {:<8} PATH", "CODE", "STATUS");
    for language in &config.models.languages {
        let path = config.models.path_for(language);
        let status = if path.join(CONFIG_FILE).is_file() && path.join(WEIGHTS_FILE).is_file() {
            "ok"
        } else if path.is_dir() {
            "partial"
        } else {
            "missing"
        };
        println!("{language:<8} {status:<8} {}", path.display());
    }

    Ok(())
}

fn read_input(input: Option<String>) -> anyhow::Result<String> {
    match input {
        Some(s) if s != "-" => Ok(s),
        _ => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_logs_crate_at_debug_by_default() {
        let filter = log_filter(false, SERVE_LOG_FILTER);
        assert!(filter.contains("indic_nmt=debug"));
        tracing_subscriber::EnvFilter::try_new(filter).unwrap();
    }

    #[test]
    fn test_verbose_enables_debug_everywhere() {
        assert_eq!(log_filter(true, SERVE_LOG_FILTER), "debug");
        assert_eq!(log_filter(true, "info"), "debug");
        assert_eq!(log_filter(false, "info"), "info");
    }

    #[test]
    fn test_cli_parses_serve_flags() {
        let cli = Cli::try_parse_from(["indic-nmt", "serve", "--port", "9000", "--languages", "hi,ur"])
            .unwrap();
        match cli.command {
            Commands::Serve { port, config, .. } => {
                assert_eq!(port, Some(9000));
                assert_eq!(config.languages.as_deref(), Some("hi,ur"));
            },
            _ => panic!("expected serve"),
        }
    }
}
