//! Flexbridge CLI.
//!
//! Usage examples:
//!   Inspect how an options string is parsed:
//!     $ cargo run --bin flexbridge -- parse-options "chain=id:form/name:ok, text=Hello"
//!   Click a Flex component in a local browser:
//!     $ FLEXBRIDGE_CHROME_BIN=/path/to/chrome \
//!       cargo run --bin flexbridge -- run --url http://localhost/app.html \
//!         --locator movie1 --action click --options "id=okButton"

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flexbridge_rs::actions::{FlexAction, FlexCommandExecutor, FlexCommands};
use flexbridge_rs::config::{FlexConfig, LoggerCallback, Verbosity};
use flexbridge_rs::options::parse_options;
use flexbridge_rs::runtime::ChromiumoxideRuntime;
use flexbridge_rs::session::{FlexSession, SessionError};
use log::{info, warn};

#[derive(Parser)]
#[command(
    name = "flexbridge",
    author,
    version,
    about = "Drive Flex movies from the command line"
)]
struct Cli {
    /// Show per-call Flex logs (overrides FLEXBRIDGE_VERBOSE).
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the options map an options string parses to, as JSON.
    ParseOptions {
        /// Raw options string, e.g. "{text:'Hi'}" or "id=ok, text=Hi".
        raw: String,
    },
    /// Open a page and run one Flex action against a movie.
    Run(RunArgs),
    /// Open a page and wait until a movie exposes its automation API.
    WaitReady(WaitReadyArgs),
}

#[derive(Args)]
struct PageArgs {
    /// Page URL hosting the movie.
    #[arg(long)]
    url: String,

    /// Element locator of the movie (`id=`, `name=`, `xpath=`, `css=`, ...).
    #[arg(long)]
    locator: String,

    /// Show the launched browser window.
    #[arg(long)]
    show_browser: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    page: PageArgs,

    /// Action name: `click`, `type`, `assert-text`, `flexClick`, `fp_click`, ...
    #[arg(long)]
    action: String,

    /// Raw options string handed to the movie.
    #[arg(long, default_value = "")]
    options: String,

    /// Wait for the movie to become ready first.
    #[arg(long)]
    wait_ready: bool,
}

#[derive(Args)]
struct WaitReadyArgs {
    #[command(flatten)]
    page: PageArgs,

    /// Give up after this many milliseconds (defaults to the configured timeout).
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    let verbosity = verbosity_from_count(cli.verbose);

    match cli.command {
        Command::ParseOptions { raw } => {
            let parsed = parse_options(&raw);
            println!("{}", serde_json::to_string_pretty(&parsed.to_value())?);
        }
        Command::Run(args) => run_action(args, verbosity).await?,
        Command::WaitReady(args) => wait_ready(args, verbosity).await?,
    }

    Ok(())
}

async fn run_action(args: RunArgs, verbosity: Option<Verbosity>) -> Result<()> {
    let action: FlexAction = args.action.parse()?;
    let config = build_config(&args.page, verbosity)?;
    let ready_timeout = config.ready_timeout();
    let RunArgs {
        page,
        options,
        wait_ready,
        ..
    } = args;
    let locator = page.locator.clone();

    with_page(&page.url, config, |commands| async move {
        if wait_ready {
            commands.wait_for_ready(&locator, ready_timeout).await?;
        }
        commands.execute(action, &locator, &options).await?;
        info!("{action} succeeded on {locator}");
        Ok(())
    })
    .await
}

async fn wait_ready(args: WaitReadyArgs, verbosity: Option<Verbosity>) -> Result<()> {
    let config = build_config(&args.page, verbosity)?;
    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.ready_timeout());
    let locator = args.page.locator.clone();

    with_page(&args.page.url, config, |commands| async move {
        commands.wait_for_ready(&locator, timeout).await?;
        info!("{locator} is ready");
        Ok(())
    })
    .await
}

/// Start a browser, open the page, run `work` and always shut down.
async fn with_page<F, Fut>(url: &str, config: FlexConfig, work: F) -> Result<()>
where
    F: FnOnce(FlexCommands) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let runtime = Arc::new(ChromiumoxideRuntime::new());
    let session =
        FlexSession::new(config, runtime).context("failed to plan browser session")?;

    // A failed init may still have launched a browser, so close on every path.
    let outcome = match session.init().await {
        Ok(()) => match session.open_page(url).await {
            Ok(flex_page) => {
                info!("Opened {url}");
                work(flex_page.commands().clone()).await
            }
            Err(err) => Err(err).with_context(|| format!("failed to open {url}")),
        },
        Err(err) => Err(err).context("failed to start browser"),
    };

    settle(outcome, session.close().await)
}

/// Combine the work outcome with the shutdown result. A shutdown failure is
/// only reported when the work itself succeeded.
fn settle(outcome: Result<()>, closed: Result<(), SessionError>) -> Result<()> {
    match (outcome, closed) {
        (Ok(()), Err(err)) => Err(err).context("failed to shutdown Chromiumoxide runtime"),
        (Err(err), Err(close_err)) => {
            warn!("failed to shutdown Chromiumoxide runtime: {close_err}");
            Err(err)
        }
        (outcome, Ok(())) => outcome,
    }
}

fn build_config(page: &PageArgs, verbosity: Option<Verbosity>) -> Result<FlexConfig> {
    let mut config = FlexConfig::from_env().context("invalid FLEXBRIDGE_* configuration")?;
    apply_cli_overrides(&mut config, page, verbosity);
    config.logger = Some(make_logger_callback());
    Ok(config)
}

fn apply_cli_overrides(config: &mut FlexConfig, page: &PageArgs, verbosity: Option<Verbosity>) {
    if let Some(verbosity) = verbosity {
        config.verbose = verbosity;
    }
    if page.show_browser {
        config.headless = false;
    }
}

fn make_logger_callback() -> LoggerCallback {
    Arc::new(|line: &str| {
        log::info!("{line}");
    })
}

fn verbosity_from_count(count: u8) -> Option<Verbosity> {
    match count {
        0 => None,
        _ => Some(Verbosity::Detailed),
    }
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use flexbridge_rs::browser::BrowserRuntimeError;

    fn page_args(show_browser: bool) -> PageArgs {
        PageArgs {
            url: "http://localhost/app.html".into(),
            locator: "movie1".into(),
            show_browser,
        }
    }

    #[test]
    fn verbose_flag_only_overrides_when_passed() {
        let mut config = FlexConfig {
            verbose: Verbosity::Minimal,
            ..FlexConfig::default()
        };
        apply_cli_overrides(&mut config, &page_args(false), verbosity_from_count(0));
        assert_eq!(config.verbose, Verbosity::Minimal);
        assert!(config.headless);

        apply_cli_overrides(&mut config, &page_args(true), verbosity_from_count(2));
        assert_eq!(config.verbose, Verbosity::Detailed);
        assert!(!config.headless);
    }

    #[test]
    fn work_failure_wins_over_shutdown_failure() {
        let closed = Err(SessionError::Runtime(BrowserRuntimeError::Message(
            "already gone".into(),
        )));
        let err = settle(Err(anyhow!("fp_click failed")), closed).expect_err("work failed");
        assert_eq!(err.to_string(), "fp_click failed");
    }

    #[test]
    fn shutdown_failure_surfaces_after_successful_work() {
        let closed = Err(SessionError::Runtime(BrowserRuntimeError::NotInitialized));
        let err = settle(Ok(()), closed).expect_err("close failed");
        assert!(err.to_string().contains("failed to shutdown"));

        assert!(settle(Ok(()), Ok(())).is_ok());
    }
}
