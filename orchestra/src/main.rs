//! Multi-agent command layer.
//!
//! `orchestra` with no command starts the REPL. One-shot commands exit with
//! the codes in [`orchestra::exit_codes`].

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use orchestra::agents::{AgentRegistry, UnknownAgentError};
use orchestra::core::types::{LoopStatus, SafetyMode};
use orchestra::exit_codes;
use orchestra::io::config::{OrchestraConfig, OrchestraPaths, init_config, load_config};
use orchestra::io::credentials::{MissingCredentialError, api_key_from_env};
use orchestra::io::gateway::AnthropicGateway;
use orchestra::logging;
use orchestra::render::{render_agents, render_report, render_request_outcome};
use orchestra::repl::run_repl;
use orchestra::router::Router;

#[derive(Parser)]
#[command(
    name = "orchestra",
    version,
    about = "Route coding tasks to specialist agents that read, edit and run your project"
)]
struct Cli {
    /// Project root the tools operate on.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Config file (default: <root>/.orchestra/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More diagnostics on stderr (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session (default).
    Repl,
    /// List agents and their focus.
    Agents,
    /// Describe what an agent would do, without running any tool.
    Preview {
        task: String,
        #[arg(short, long)]
        agent: Option<String>,
    },
    /// Run the tool loop for one task.
    Execute {
        task: String,
        #[arg(short, long)]
        agent: Option<String>,
        /// Apply writes, edits and commands instead of previewing them.
        #[arg(long)]
        apply: bool,
        /// Skip the confirmation prompt for `--apply`.
        #[arg(short, long)]
        yes: bool,
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Plan a request across agents and synthesize one answer.
    Ask { request: String },
    /// Write a default `.orchestra/config.toml` if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_code_for(&err));
        }
    }
}

/// Credential and configuration problems get their own code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<MissingCredentialError>().is_some()
        || err.downcast_ref::<InvalidConfig>().is_some()
    {
        exit_codes::CONFIG
    } else {
        exit_codes::FAILED
    }
}

/// Marks errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct InvalidConfig(String);

fn run(cli: Cli) -> Result<i32> {
    let root = cli.root;
    let config_path = cli
        .config
        .unwrap_or_else(|| OrchestraPaths::new(&root).config_path);

    let settings = || load_settings(&config_path);

    match cli.command.unwrap_or(Command::Repl) {
        Command::Init { force } => cmd_init(&config_path, force),
        Command::Agents => {
            let (_, registry) = settings()?;
            println!("{}", render_agents(&registry));
            Ok(exit_codes::OK)
        }
        Command::Repl => {
            let (cfg, registry) = settings()?;
            let mut router = connect(&root, &cfg, registry)?;
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            run_repl(&mut router, stdin.lock(), &mut stdout)?;
            Ok(exit_codes::OK)
        }
        Command::Preview { task, agent } => {
            let (cfg, registry) = settings()?;
            let router = connect(&root, &cfg, registry)?;
            let preview = router.preview_task(&task, agent.as_deref())?;
            println!("Plan from {}:\n\n{}", preview.agent, preview.plan.trim());
            Ok(exit_codes::OK)
        }
        Command::Execute {
            task,
            agent,
            apply,
            yes,
            max_iterations,
        } => {
            let (cfg, registry) = settings()?;
            let mut router = connect(&root, &cfg, registry)?;
            let mode = if apply {
                SafetyMode::Execute
            } else {
                SafetyMode::Preview
            };
            if apply && !yes {
                let name = router.select_agent(&task, agent.as_deref())?;
                let stdin = std::io::stdin();
                if !confirm_apply(&name, stdin.lock(), &mut std::io::stderr())? {
                    eprintln!("Cancelled.");
                    return Ok(exit_codes::FAILED);
                }
            }
            let report = router.execute_task(&task, agent.as_deref(), mode, max_iterations)?;
            println!("{}", render_report(&report));
            Ok(match report.status {
                LoopStatus::Done => exit_codes::OK,
                LoopStatus::IterationExhausted => exit_codes::ITERATION_EXHAUSTED,
            })
        }
        Command::Ask { request } => {
            let (cfg, registry) = settings()?;
            let mut router = connect(&root, &cfg, registry)?;
            let outcome = router.process_request(&request)?;
            println!("{}", render_request_outcome(&outcome));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if init_config(config_path, force)? {
        println!("Wrote {}", config_path.display());
    } else {
        println!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    Ok(exit_codes::OK)
}

fn load_settings(config_path: &Path) -> Result<(OrchestraConfig, AgentRegistry)> {
    let loaded = load_config(config_path).and_then(|cfg| {
        let registry = AgentRegistry::from_config(&cfg)
            .with_context(|| format!("agents in {}", config_path.display()))?;
        Ok((cfg, registry))
    });
    loaded.map_err(|err| InvalidConfig(format!("{err:#}")).into())
}

fn connect(
    root: &Path,
    cfg: &OrchestraConfig,
    registry: AgentRegistry,
) -> Result<Router<AnthropicGateway>> {
    let api_key = api_key_from_env(root)?;
    let gateway = AnthropicGateway::from_config(api_key, cfg)?;
    Router::new(gateway, registry, root, cfg)
        .with_context(|| format!("open project root {}", root.display()))
}

/// Literal `yes` required; end of input declines.
fn confirm_apply<R: BufRead, W: Write>(agent: &str, mut input: R, out: &mut W) -> Result<bool> {
    write!(
        out,
        "Agent `{agent}` will modify files and run commands. Type 'yes' to continue: "
    )?;
    out.flush().context("flush confirmation")?;
    let mut answer = String::new();
    input.read_line(&mut answer).context("read confirmation")?;
    Ok(answer.trim() == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_command_means_repl() {
        let cli = Cli::parse_from(["orchestra"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.root, PathBuf::from("."));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn parse_execute_flags() {
        let cli = Cli::parse_from([
            "orchestra",
            "--root",
            "/tmp/project",
            "execute",
            "fix the login form",
            "--agent",
            "ui",
            "--apply",
            "--yes",
            "--max-iterations",
            "4",
            "-vv",
        ]);
        assert_eq!(cli.root, PathBuf::from("/tmp/project"));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Some(Command::Execute {
                task,
                agent,
                apply,
                yes,
                max_iterations,
            }) => {
                assert_eq!(task, "fix the login form");
                assert_eq!(agent.as_deref(), Some("ui"));
                assert!(apply && yes);
                assert_eq!(max_iterations, Some(4));
            }
            _ => panic!("expected execute"),
        }
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["orchestra", "init", "--force"]);
        assert!(matches!(cli.command, Some(Command::Init { force: true })));
    }

    #[test]
    fn confirmation_needs_literal_yes() {
        let mut out = Vec::new();
        assert!(confirm_apply("ui", "yes\n".as_bytes(), &mut out).expect("confirm"));
        assert!(!confirm_apply("ui", "y\n".as_bytes(), &mut out).expect("confirm"));
        assert!(!confirm_apply("ui", "".as_bytes(), &mut out).expect("confirm"));
        assert!(String::from_utf8(out).expect("utf8").contains("Agent `ui`"));
    }

    #[test]
    fn config_and_credential_errors_map_to_config_code() {
        let missing = anyhow::Error::from(MissingCredentialError {
            searched: Vec::new(),
        });
        assert_eq!(exit_code_for(&missing), exit_codes::CONFIG);
        let invalid = anyhow::Error::from(InvalidConfig("bad".to_string()));
        assert_eq!(exit_code_for(&invalid), exit_codes::CONFIG);
        let unknown = anyhow::Error::from(UnknownAgentError {
            name: "wizard".to_string(),
            available: vec!["ui".to_string()],
        });
        assert_eq!(exit_code_for(&unknown), exit_codes::FAILED);
    }
}
