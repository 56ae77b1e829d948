use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use critic_core::{CriticConfig, OutputFormat, PullRequestRef, ReviewComment};
use critic_review::demo::DemoReviewer;
use critic_review::github::GitHubClient;
use critic_review::host::PullRequestHost;
use critic_review::llm::{BackendHealth, OllamaClient};
use critic_review::pipeline::{ReviewOutcome, ReviewPipeline};

const CONFIG_FILE: &str = ".critic.toml";

#[derive(Parser)]
#[command(
    name = "critic",
    version,
    about = "Pull request reviews from a local model",
    long_about = "critic reviews GitHub pull requests with a model served by Ollama.\n\n\
                   It fetches the changed files, asks the model for a review and posts the\n\
                   answer back as PR comments. A template-based demo mode works without a model.\n\n\
                   Examples:\n  \
                     critic review --repo owner/repo --pr-number 42     Review and post comments\n  \
                     critic review --repo owner/repo --pr-number 42 --dry-run\n  \
                     critic demo --repo owner/repo --pr-number 42       Post a demo review\n  \
                     critic serve --bind 127.0.0.1:8000                 Start the HTTP service\n  \
                     critic doctor                                      Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .critic.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  Review comments as GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Review a pull request with the configured model
    #[command(long_about = "Review a pull request with the configured model.\n\n\
        Fetches the changed files at the PR head, sends one prompt to Ollama and posts\n\
        the answer as a summary comment plus detailed parts. If anything fails, a single\n\
        error comment is posted instead.\n\n\
        Examples:\n  critic review --repo owner/repo --pr-number 42\n  critic review --repo owner/repo --pr-number 42 --model codellama --dry-run")]
    Review {
        /// Repository (format: owner/name)
        #[arg(long)]
        repo: String,
        /// Pull request number
        #[arg(long)]
        pr_number: u64,
        /// GitHub token (defaults to GITHUB_TOKEN or the config file)
        #[arg(long)]
        token: Option<String>,
        /// Model to use instead of the configured one
        #[arg(long)]
        model: Option<String>,
        /// Print the comments instead of posting them
        #[arg(long)]
        dry_run: bool,
    },
    /// Post a template-based review without calling a model
    #[command(long_about = "Post a template-based review without calling a model.\n\n\
        Uses the PR's real file list to fill in counts and languages, then posts one\n\
        comment. Handy for checking GitHub access before setting up Ollama.\n\n\
        Example:\n  critic demo --repo owner/repo --pr-number 42 --dry-run")]
    Demo {
        /// Repository (format: owner/name)
        #[arg(long)]
        repo: String,
        /// Pull request number
        #[arg(long)]
        pr_number: u64,
        /// GitHub token (defaults to GITHUB_TOKEN or the config file)
        #[arg(long)]
        token: Option<String>,
        /// Print the review instead of posting it
        #[arg(long)]
        dry_run: bool,
    },
    /// Start the HTTP review service
    #[command(long_about = "Start the HTTP review service.\n\n\
        Endpoints: GET /, GET /health, POST /review, GET|DELETE /review/{id},\n\
        GET /demo-review. Reviews run on a bounded worker queue.\n\n\
        Example:\n  critic serve --bind 0.0.0.0:8000")]
    Serve {
        /// Address to listen on (default from config: 0.0.0.0:8000)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Create a default .critic.toml configuration file
    #[command(long_about = "Create a default .critic.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .critic.toml already exists.")]
    Init,
    /// Check your critic setup and environment
    #[command(long_about = "Check your critic setup and environment.\n\n\
        Checks the config file, GitHub token and authentication, and whether the\n\
        Ollama backend answers. Use --format json for machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");
    let (cmd, sub, reset) = if use_color {
        ("\x1b[36m", "\x1b[32m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    println!("critic v{version} - pull request reviews from a local model\n");

    println!("Quick start:");
    println!("  {cmd}critic init{reset}                                   Create a .critic.toml config file");
    println!("  {cmd}critic doctor{reset}                                 Check GitHub and Ollama access");
    println!("  {cmd}critic review --repo o/r --pr-number 1{reset}        Review a pull request\n");

    println!("All commands:");
    println!("  {sub}review{reset}    Review a PR with the configured model");
    println!("  {sub}demo{reset}      Post a template-based review (no model needed)");
    println!("  {sub}serve{reset}     Start the HTTP review service");
    println!("  {sub}doctor{reset}    Check your setup and environment");
    println!("  {sub}init{reset}      Create default configuration\n");

    println!("Run 'critic <command> --help' for details.");
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<CriticConfig> {
    let config = match path {
        Some(path) => CriticConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                CriticConfig::from_file(default_path)?
            } else {
                CriticConfig::default()
            }
        }
    };
    Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
}

/// Validate the target and pick a token before any network call.
fn resolve_target(
    config: &CriticConfig,
    repo: &str,
    pr_number: u64,
    token: Option<&str>,
) -> Result<(PullRequestRef, Arc<dyn PullRequestHost>)> {
    let pr = PullRequestRef::new(repo, pr_number)?;
    let token = config.resolve_token(token)?;
    let host: Arc<dyn PullRequestHost> =
        Arc::new(GitHubClient::new(&token, &config.github.api_base)?);
    Ok((pr, host))
}

fn print_comments(comments: &[ReviewComment], pr: &PullRequestRef, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({ "pr": pr.to_string(), "comments": comments });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            let bodies: Vec<&str> = comments.iter().map(|c| c.body.as_str()).collect();
            println!("{}", bodies.join("\n\n---\n\n"));
        }
        OutputFormat::Text => {
            println!("{}", "=".repeat(60));
            println!("DRY RUN - {} comment(s) that would be posted to {pr}:", comments.len());
            for comment in comments {
                println!("{}", "=".repeat(60));
                println!("{}", comment.body);
            }
            println!("{}", "=".repeat(60));
        }
    }
    Ok(())
}

fn print_outcome(outcome: &ReviewOutcome, pr: &PullRequestRef, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome).into_diagnostic()?);
        }
        OutputFormat::Text | OutputFormat::Markdown => {
            if outcome.is_success() {
                println!(
                    "Review completed for {pr}: {} file(s) reviewed, {} comment(s) posted",
                    outcome.files_reviewed, outcome.comments_posted
                );
            } else {
                let stage = outcome.failed_at.unwrap_or(outcome.stage);
                if outcome.comments_posted > 0 {
                    println!("Review of {pr} failed while {stage}; error comment posted");
                } else {
                    println!("Review of {pr} failed while {stage}; error comment could not be posted");
                }
            }
            if outcome.comments_failed > 0 {
                println!("{} comment(s) could not be posted", outcome.comments_failed);
            }
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

async fn run_doctor(
    config: &CriticConfig,
    config_path: Option<&Path>,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Config file
    let path = config_path.unwrap_or(Path::new(CONFIG_FILE));
    if path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", path.display()),
        ));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            format!("{} not found, using defaults", path.display()),
        ));
    }

    // 2. GitHub token and authentication
    match config.resolve_token(None) {
        Ok(token) => {
            checks.push(CheckResult::pass("github_token", "token configured"));
            let login = match GitHubClient::new(&token, &config.github.api_base) {
                Ok(client) => client.current_login().await,
                Err(e) => Err(e),
            };
            match login {
                Ok(login) => checks.push(CheckResult::pass(
                    "github_auth",
                    format!("authenticated as {login}"),
                )),
                Err(e) => checks.push(CheckResult::fail(
                    "github_auth",
                    e.to_string(),
                    "check the token's scopes and github.api_base",
                )),
            }
        }
        Err(_) => checks.push(CheckResult::fail(
            "github_token",
            "GITHUB_TOKEN not set",
            "export GITHUB_TOKEN=... or set token in .critic.toml [github]",
        )),
    }

    // 3. Backend
    checks.push(CheckResult::info(
        "backend_model",
        format!("{} at {}", config.backend.model, config.backend.base_url),
    ));
    let health = match OllamaClient::new(&config.backend) {
        Ok(client) => client.ping().await,
        Err(_) => BackendHealth::Unavailable,
    };
    match health {
        BackendHealth::Healthy => checks.push(CheckResult::pass("backend", "Ollama is reachable")),
        BackendHealth::Unhealthy => checks.push(CheckResult::fail(
            "backend",
            "Ollama answered with an error status",
            "check the Ollama logs",
        )),
        BackendHealth::Unavailable => checks.push(CheckResult::fail(
            "backend",
            format!("no answer from {}", config.backend.base_url),
            "start Ollama with 'ollama serve' or set OLLAMA_URL",
        )),
    }

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            println!("critic v{} - Environment Check\n", env!("CARGO_PKG_VERSION"));

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<20} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# critic configuration
# Environment variables override this file: GITHUB_TOKEN, GITHUB_API_URL,
# OLLAMA_URL, OLLAMA_MODEL.

[github]
# token = "ghp_..."
# api_base = "https://api.github.com"

[backend]
# base_url = "http://localhost:11434"
# model = "llama3.2"
# temperature = 0.7
# top_p = 0.9
# max_tokens = 2000
# timeout_secs = 60

[limits]
# Characters of file content included per file when there is no patch
# max_file_chars = 2000
# A single review block longer than this is split by paragraphs
# split_threshold = 1000
# pack_target = 800
# summary_max_chars = 2000

[server]
# bind = "0.0.0.0:8000"
# workers = 2
# queue_capacity = 32
# retain_finished = 256
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .expect("miette handler");
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    tracing::debug!(
        model = %config.backend.model,
        backend = %config.backend.base_url,
        api_base = %config.github.api_base,
        "configuration loaded"
    );

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => {
            print_welcome(use_color);
        }
        Some(Command::Review {
            repo,
            pr_number,
            token,
            model,
            dry_run,
        }) => {
            if let Some(model) = model {
                config.backend.model = model;
            }
            let (pr, host) = resolve_target(&config, &repo, pr_number, token.as_deref())?;
            let backend = Arc::new(OllamaClient::new(&config.backend)?);
            let pipeline = ReviewPipeline::new(host, backend, config.limits);

            if dry_run {
                let comments = pipeline.preview(&pr).await?;
                print_comments(&comments, &pr, cli.format)?;
            } else {
                let outcome = pipeline.run(&pr).await;
                print_outcome(&outcome, &pr, cli.format)?;
                if !outcome.is_success() {
                    let stage = outcome
                        .failed_at
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "unknown".into());
                    miette::bail!(
                        "review of {pr} failed while {stage}: {}",
                        outcome.error.unwrap_or_default()
                    );
                }
            }
        }
        Some(Command::Demo {
            repo,
            pr_number,
            token,
            dry_run,
        }) => {
            let (pr, host) = resolve_target(&config, &repo, pr_number, token.as_deref())?;
            let review = DemoReviewer::new(host).run(&pr, dry_run).await?;
            if dry_run {
                let comment = ReviewComment {
                    index: 0,
                    body: review,
                };
                print_comments(std::slice::from_ref(&comment), &pr, cli.format)?;
            } else if cli.format == OutputFormat::Json {
                let json = serde_json::json!({ "pr": pr.to_string(), "posted": true });
                println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
            } else {
                println!("Demo review posted to {pr}");
            }
        }
        Some(Command::Serve { bind }) => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            critic_server::start(config).await.into_diagnostic()?;
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Doctor) => {
            run_doctor(&config, cli.config.as_deref(), cli.format, use_color).await?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "critic", &mut std::io::stdout());
        }
    }

    Ok(())
}
