//! Bulwark CLI - resilient GitHub, AI and git calls for automation jobs
//!
//! Usage:
//!   bulwark init                         Write default .bulwark/config.toml
//!   bulwark preflight --require <deps>   Check credentials before a run
//!   bulwark land --target <branch>       Push HEAD, fall back to a PR when protected
//!   bulwark comment --issue <n> ...      Post a scrubbed issue/PR comment
//!   bulwark ask --prompt-file <file>     Send a prompt to the AI provider
//!   bulwark scrub                        Redact secrets from stdin to stdout

mod logging;

use anyhow::{anyhow, bail, Context, Result};
use bulwark_core::fail_open::fail_open;
use bulwark_core::{
    write_sanitized_artifact, BulwarkConfig, Dependency, OperationKind, SecretSanitizer,
};
use bulwark_git::{GitCommand, GitFallbackCoordinator, LandError, LandRequest};
use bulwark_github::{extract_reply, AiClient, Credentials, GitHubClient};
use bulwark_resilience::{
    render_conflict, render_failure, render_preflight, InvokeError, Operation, ResilienceContext,
    ResilientInvoker,
};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "bulwark")]
#[command(author, version, about = "Resilient GitHub, AI and git calls for automation jobs")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository path (defaults to current directory)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init,

    /// Fail fast when credentials for the given dependencies are missing
    Preflight {
        /// Dependencies the run will call (github-api, ai-api, git)
        #[arg(long, value_delimiter = ',', default_value = "github-api,ai-api")]
        require: Vec<Dependency>,
    },

    /// Land HEAD on a branch, opening a pull request if it is protected
    Land {
        /// Target branch
        #[arg(long)]
        target: String,

        /// Remote to push to (overrides config)
        #[arg(long)]
        remote: Option<String>,

        /// Title of the fallback pull request
        #[arg(long)]
        title: Option<String>,

        /// File with the fallback pull request body
        #[arg(long, value_name = "FILE")]
        body_file: Option<PathBuf>,

        /// Write a sanitized outcome report to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Comment on an issue or pull request
    Comment {
        /// Issue or pull request number
        #[arg(long)]
        issue: u64,

        /// File with the comment body
        #[arg(long, value_name = "FILE")]
        body_file: PathBuf,
    },

    /// Send a prompt to the AI provider and print the reply
    Ask {
        /// File with the prompt
        #[arg(long, value_name = "FILE")]
        prompt_file: PathBuf,
    },

    /// Redact secrets from stdin and write the result to stdout
    Scrub,
}

/// Everything a command needs after startup
struct Session {
    config: BulwarkConfig,
    credentials: Credentials,
    sanitizer: SecretSanitizer,
    invoker: ResilientInvoker,
    ctx: ResilienceContext,
}

impl Session {
    /// Check `required` credentials before any outbound call
    fn preflight(&self, attempted: &str, required: &[Dependency]) -> Result<()> {
        if let Err(err) = self.credentials.clone().require(required) {
            eprintln!("{}", render_preflight(attempted, &err, &self.sanitizer));
            bail!("pre-flight check failed");
        }
        Ok(())
    }

    /// Print to stdout, scrubbed
    fn say(&self, text: &str) {
        println!("{}", self.sanitizer.scrub(text));
    }

    async fn write_report(&self, path: Option<&Path>, text: &str) {
        if let Some(path) = path {
            fail_open("write report", &self.sanitizer, || async {
                write_sanitized_artifact(path, text, &self.sanitizer)
            })
            .await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Credentials are registered before logging starts so no line can leak them
    let credentials = Credentials::from_env();
    let mut sanitizer = SecretSanitizer::new();
    credentials.register_with(&mut sanitizer);
    logging::init(cli.verbose, sanitizer.clone())?;

    let config = match BulwarkConfig::load(&cli.repo) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", render_preflight("load configuration", &err, &sanitizer));
            return Err(err).context("Failed to load configuration");
        }
    };
    let invoker = ResilientInvoker::from_config(&config, sanitizer.clone());
    let ctx = ResilienceContext::from_config(&config);
    let mut session = Session {
        config,
        credentials,
        sanitizer,
        invoker,
        ctx,
    };

    match cli.command {
        Commands::Init => cmd_init(&cli.repo),
        Commands::Preflight { require } => cmd_preflight(&session, &require),
        Commands::Land {
            target,
            remote,
            title,
            body_file,
            report,
        } => {
            cmd_land(
                &mut session,
                &cli.repo,
                target,
                remote,
                title,
                body_file,
                report,
            )
            .await
        }
        Commands::Comment { issue, body_file } => {
            cmd_comment(&mut session, issue, &body_file).await
        }
        Commands::Ask { prompt_file } => cmd_ask(&mut session, &prompt_file).await,
        Commands::Scrub => cmd_scrub(&session.sanitizer),
    }
}

fn cmd_init(repo: &Path) -> Result<()> {
    let path = repo.join(".bulwark/config.toml");
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    BulwarkConfig::write_default(repo).context("Failed to write default configuration")?;
    println!("Created {}", path.display());
    Ok(())
}

fn cmd_preflight(session: &Session, require: &[Dependency]) -> Result<()> {
    session.preflight("pre-flight credential check", require)?;
    let names: Vec<&str> = require.iter().map(Dependency::as_str).collect();
    session.say(&format!("Credentials present for: {}", names.join(", ")));
    Ok(())
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn github_client(session: &Session) -> Result<GitHubClient> {
    let token = session
        .credentials
        .github_token()
        .ok_or_else(|| anyhow!("GitHub token missing"))?;
    Ok(GitHubClient::new(&session.config.github, token)?.with_sanitizer(session.sanitizer.clone()))
}

async fn cmd_land(
    session: &mut Session,
    repo: &Path,
    target: String,
    remote: Option<String>,
    title: Option<String>,
    body_file: Option<PathBuf>,
    report: Option<PathBuf>,
) -> Result<()> {
    let attempted = format!("land HEAD on {}", target);
    session.preflight(&attempted, &[Dependency::Git, Dependency::GithubApi])?;

    let git = GitCommand::detect(repo)
        .await
        .context("Failed to locate the git work tree")?;
    let github = github_client(session)?;

    let mut git_config = session.config.git.clone();
    if let Some(remote) = remote {
        git_config.remote = remote;
    }
    let coordinator =
        GitFallbackCoordinator::from_config(git, github, session.invoker.clone(), &git_config);

    let mut request = LandRequest::new(&target);
    if let Some(title) = title {
        request = request.with_title(title);
    }
    if let Some(path) = body_file {
        request = request.with_body(read_text(&path).await?);
    }

    let outcome = coordinator.land(&mut session.ctx, &request).await;
    let report = report.as_deref();

    match outcome {
        Ok(result) if result.has_conflicts() => {
            let text = render_conflict(&attempted, &result.conflicting_files, &session.sanitizer);
            session.say(&text);
            session.write_report(report, &text).await;
            bail!("merge conflicts need manual resolution");
        }
        Ok(result) => {
            let text = if result.pushed_directly {
                format!("Pushed directly to {}", target)
            } else {
                format!(
                    "{} is protected; {} pull request #{} from {}",
                    target,
                    if result.pr_reused { "updated" } else { "opened" },
                    result
                        .created_pr_number
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    result.fallback_branch.as_deref().unwrap_or("?")
                )
            };
            info!("{}", text);
            session.say(&text);
            session.write_report(report, &text).await;
            Ok(())
        }
        Err(LandError::Invoke(err)) => {
            let text = render_failure(&attempted, &err, &session.sanitizer);
            session.write_report(report, &text).await;
            Err(failure(text, &err))
        }
        Err(other) => Err(other).context("Landing failed"),
    }
}

async fn cmd_comment(session: &mut Session, issue: u64, body_file: &Path) -> Result<()> {
    let attempted = format!("comment on #{}", issue);
    session.preflight(&attempted, &[Dependency::GithubApi])?;

    let body = read_text(body_file).await?;
    let client = github_client(session)?;

    let op = Operation::new(Dependency::GithubApi, OperationKind::Write, || {
        client.post_issue_comment(issue, &body)
    });
    match session.invoker.call(&mut session.ctx, op).await {
        Ok(success) => {
            session.say(&format!(
                "Commented on #{} after {} attempt(s)",
                issue, success.attempts
            ));
            Ok(())
        }
        Err(err) => {
            let text = render_failure(&attempted, &err, &session.sanitizer);
            Err(failure(text, &err))
        }
    }
}

async fn cmd_ask(session: &mut Session, prompt_file: &Path) -> Result<()> {
    session.preflight("ask the AI provider", &[Dependency::AiApi])?;

    let prompt = read_text(prompt_file).await?;
    let key = session
        .credentials
        .ai_key()
        .ok_or_else(|| anyhow!("AI provider key missing"))?;
    let client = AiClient::new(&session.config.ai, key)?;

    let op = Operation::new(Dependency::AiApi, OperationKind::Read, || {
        client.complete(&prompt)
    });
    match session.invoker.call(&mut session.ctx, op).await {
        Ok(success) => {
            let reply = extract_reply(&success.result).context("Unexpected AI response")?;
            session.say(&reply.text);
            Ok(())
        }
        Err(err) => {
            let text = render_failure("ask the AI provider", &err, &session.sanitizer);
            Err(failure(text, &err))
        }
    }
}

fn cmd_scrub(sanitizer: &SecretSanitizer) -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read stdin")?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(sanitizer.scrub(&input).as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Print the rendered report to stderr and turn it into the exit error
fn failure(report: String, err: &InvokeError) -> anyhow::Error {
    eprintln!("{}", report);
    if err.is_circuit_open() {
        anyhow!("{} unavailable (circuit open)", err.dependency())
    } else {
        anyhow!("{} call failed", err.dependency())
    }
}
