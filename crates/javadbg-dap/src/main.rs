use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use javadbg_config::DebugConfig;
use javadbg_vm::UnavailableVmManager;

/// Java Debug Adapter Protocol server.
///
/// Speaks DAP over stdio. Logs go to stderr (or a file), never stdout.
#[derive(Debug, Parser)]
#[command(name = "javadbg-dap", version, about)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// If unset, `JAVADBG_CONFIG` is used as a fallback. When neither are
    /// provided the adapter uses in-memory defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config);
    javadbg_dap::hardening::init(&config);

    javadbg_dap::run_stdio(&config.adapter, Arc::new(UnavailableVmManager)).await
}

fn load_config(cli_path: Option<PathBuf>) -> DebugConfig {
    let path = cli_path.or_else(|| std::env::var_os("JAVADBG_CONFIG").map(PathBuf::from));
    let Some(path) = path else {
        return DebugConfig::default();
    };

    match DebugConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "javadbg-dap: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            DebugConfig::default()
        }
    }
}
