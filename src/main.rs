#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    dead_code
)]

use agentrelay::agent::{AgentEntry, ModelAgent};
use agentrelay::config::Config;
use agentrelay::conversation::{load_image, Conversation, Message};
use agentrelay::observability::RuntimeTrace;
use agentrelay::providers::{self, ReasoningEffort};
use agentrelay::sessions::{self, ConversationStore};
use agentrelay::workflow::{cancel_pair, AgentKind, RunStatus, Workflow, WorkflowDefinition};
use agentrelay::SessionCommands;
use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

mod terminal;

use crate::terminal::{is_exit, read_input, ConsoleSink};

fn parse_temperature(s: &str) -> std::result::Result<f64, String> {
    let t: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !(0.0..=2.0).contains(&t) {
        return Err("temperature must be between 0.0 and 2.0".to_string());
    }
    Ok(t)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// `agentrelay` - route conversations between agents along a handoff graph.
#[derive(Parser, Debug)]
#[command(name = "agentrelay")]
#[command(version)]
#[command(about = "Multi-agent handoff and workflow router.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (overrides AGENTRELAY_CONFIG_DIR)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow file
    #[command(long_about = "\
Run a workflow file.

Loads the TOML workflow definition, builds its agents against the \
configured provider and prints every agent turn as it happens. \
Without --message, each line you type starts a fresh run; type \
'exit' to quit. Ctrl-C cancels the run in progress.

Examples:
  agentrelay run triage.toml -m \"My invoice is wrong\"
  agentrelay run pizza.toml")]
    Run {
        /// Workflow definition file
        workflow: PathBuf,

        /// Single message mode (don't enter interactive mode)
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Chat with a single model agent
    #[command(long_about = "\
Chat with a single model agent.

Uses the configured provider and model. With --session, the \
conversation is loaded from and saved to the session store so it \
can be resumed later.

Examples:
  agentrelay chat
  agentrelay chat --session support-42
  agentrelay chat -m \"Tell me a joke\" -p ollama --model llama3.2
  agentrelay chat -m \"What is in this picture?\" --image ./cat.jpg
  agentrelay chat -m \"Plan my week\" --model gpt-5-mini --reasoning-effort low")]
    Chat {
        /// Single message mode (don't enter interactive mode)
        #[arg(short, long)]
        message: Option<String>,

        /// Persist the conversation under this key
        #[arg(short, long)]
        session: Option<String>,

        /// Provider to use (openai, azure, ollama, foundry-local, custom:<url>)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use
        #[arg(long)]
        model: Option<String>,

        /// Temperature (0.0 - 2.0)
        #[arg(short, long, value_parser = parse_temperature)]
        temperature: Option<f64>,

        /// System instructions for the agent
        #[arg(long)]
        instructions: Option<String>,

        /// Reasoning effort for reasoning models (minimal, low, medium, high)
        #[arg(long)]
        reasoning_effort: Option<ReasoningEffort>,

        /// Image sent with the first message: an http(s) URL or a local file (repeatable)
        #[arg(long)]
        image: Vec<String>,
    },

    /// Check a workflow file without running it
    Validate {
        /// Workflow definition file
        workflow: PathBuf,
    },

    /// Show system status (full details)
    Status,

    /// List supported AI providers
    Providers,

    /// Manage stored chat sessions
    Sessions {
        #[command(subcommand)]
        session_command: SessionCommands,
    },

    /// Manage configuration
    #[command(long_about = "\
Manage agentrelay configuration.

Inspect and export configuration settings. Use 'schema' to dump \
the full JSON Schema for the config file, which documents every \
available key, type, and default value.

Examples:
  agentrelay config schema              # print JSON Schema to stdout
  agentrelay config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `agentrelay`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(agentrelay completions bash)
  agentrelay completions zsh > ~/.zfunc/_agentrelay
  agentrelay completions fish > ~/.config/fish/completions/agentrelay.fish")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = match &cli.config_dir {
        Some(dir) if dir.trim().is_empty() => bail!("--config-dir cannot be empty"),
        Some(dir) => Some(PathBuf::from(shellexpand::tilde(dir.trim()).into_owned())),
        None => None,
    };

    // Completions must remain stdout-only and should not load config or initialize logging.
    // This avoids warnings/log lines corrupting sourced completion scripts.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // Config schema is also pure stdout and independent of any config file.
    if let Commands::Config {
        config_command: ConfigCommands::Schema,
    } = &cli.command
    {
        let schema = schemars::schema_for!(Config);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    // Initialize logging - respects RUST_LOG env var, defaults to WARN so
    // agent output stays readable
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::load_or_init_in(config_dir.as_deref()).await?;

    match cli.command {
        Commands::Completions { .. } | Commands::Config { .. } => Ok(()),

        Commands::Run { workflow, message } => run_workflow(&config, &workflow, message).await,

        Commands::Chat {
            message,
            session,
            provider,
            model,
            temperature,
            instructions,
            reasoning_effort,
            image,
        } => {
            let mut config = config;
            if let Some(provider) = provider {
                config.default_provider = Some(provider);
            }
            if let Some(model) = model {
                config.default_model = Some(model);
            }
            if let Some(temperature) = temperature {
                config.default_temperature = temperature;
            }
            let options = ChatOptions {
                instructions,
                reasoning_effort,
                images: image,
            };
            chat(&config, message, session, options).await
        }

        Commands::Validate { workflow } => {
            let definition = WorkflowDefinition::load(&workflow).await?;
            println!(
                "✅ {} is valid: {} agent(s), {} edge(s), entry '{}'",
                workflow.display(),
                definition.agents.len(),
                definition.edges.len(),
                definition.entry
            );
            for agent in &definition.agents {
                println!("  {:<16} {}", agent.id, kind_name(agent.kind));
            }
            for edge in &definition.edges {
                let mode = if edge.handoff {
                    " [handoff]"
                } else if edge.guard.is_some() {
                    " [guarded]"
                } else {
                    ""
                };
                println!("  {} -> {}{}", edge.source, edge.target, mode);
            }
            for server in &definition.mcp_servers {
                println!("  mcp {:<12} {}", server.name, server.url);
            }
            Ok(())
        }

        Commands::Status => {
            println!("🔀 agentrelay Status");
            println!();
            println!("Version:     {}", env!("CARGO_PKG_VERSION"));
            println!("Config:      {}", config.config_path.display());
            println!();
            println!("🤖 Provider:      {}", config.provider_name());
            println!("   Model:         {}", config.model_name());
            println!("   Temperature:   {}", config.default_temperature);
            println!(
                "   API URL:       {}",
                config.api_url.as_deref().unwrap_or("(provider default)")
            );
            println!(
                "   API key:       {}",
                if config.api_key.is_some() {
                    "configured"
                } else {
                    "(from environment)"
                }
            );
            println!();
            println!("🔁 Max steps:     {}", config.workflow.max_steps);
            println!(
                "   Step timeout:  {}",
                config
                    .workflow
                    .step_timeout_secs
                    .map_or_else(|| "none".to_string(), |s| format!("{s}s"))
            );
            println!(
                "🧰 Tool loop:     {} iterations (streaming: {})",
                config.agent.max_tool_iterations,
                if config.agent.stream { "on" } else { "off" }
            );
            println!(
                "🧾 Trace storage:  {} ({})",
                config.observability.runtime_trace_mode,
                config.runtime_trace_path().display()
            );
            println!("💬 Sessions:      {}", config.sessions_dir().display());
            Ok(())
        }

        Commands::Providers => {
            let providers = providers::list_providers();
            let current = config.provider_name().trim().to_ascii_lowercase();
            println!("Supported providers ({} total):\n", providers.len());
            println!("  ID (use in config)  DESCRIPTION");
            println!("  ─────────────────── ───────────");
            for p in &providers {
                let is_active = p.name.eq_ignore_ascii_case(&current)
                    || p.aliases
                        .iter()
                        .any(|alias| alias.eq_ignore_ascii_case(&current));
                let marker = if is_active { " (active)" } else { "" };
                let local_tag = if p.local { " [local]" } else { "" };
                let aliases = if p.aliases.is_empty() {
                    String::new()
                } else {
                    format!("  (aliases: {})", p.aliases.join(", "))
                };
                println!(
                    "  {:<19} {}{}{}{}",
                    p.name, p.display_name, local_tag, marker, aliases
                );
            }
            println!("\n  custom:<URL>        Any OpenAI-compatible endpoint");
            Ok(())
        }

        Commands::Sessions { session_command } => {
            handle_session_command(session_command, &config).await
        }
    }
}

fn kind_name(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Model => "model",
        AgentKind::Tools => "tools",
        AgentKind::Delegate => "delegate",
        AgentKind::Scripted => "scripted",
    }
}

fn trace_for(config: &Config) -> Result<Option<RuntimeTrace>> {
    RuntimeTrace::from_config(&config.observability, &config.runtime_trace_path())
}

/// Run `workflow` once, cancelling on Ctrl-C.
async fn run_once(
    workflow: &Workflow,
    conversation: Conversation,
    sink: &mut ConsoleSink,
) -> agentrelay::RunResult {
    let (handle, signal) = cancel_pair();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    let result = workflow.run(conversation, sink, &signal).await;
    watcher.abort();
    result
}

async fn run_workflow(config: &Config, path: &Path, message: Option<String>) -> Result<()> {
    let workflow = WorkflowDefinition::load(path)
        .await?
        .into_workflow(config)
        .await?;
    let mut sink = ConsoleSink::new(trace_for(config)?);

    if let Some(message) = message {
        let result = run_once(&workflow, Conversation::from_user(message), &mut sink).await;
        if result.status == RunStatus::Failed {
            if let Some(error) = result.error {
                bail!(error);
            }
            bail!("run failed");
        }
        return Ok(());
    }

    println!("Running {} (type 'exit' to quit)", path.display());
    while let Some(input) = read_input("You").await? {
        if is_exit(&input) {
            break;
        }
        if input.trim().is_empty() {
            continue;
        }
        run_once(&workflow, Conversation::from_user(input), &mut sink).await;
    }
    Ok(())
}

struct ChatOptions {
    instructions: Option<String>,
    reasoning_effort: Option<ReasoningEffort>,
    images: Vec<String>,
}

async fn chat(
    config: &Config,
    message: Option<String>,
    session: Option<String>,
    options: ChatOptions,
) -> Result<()> {
    let provider = providers::create_provider(
        config.provider_name(),
        config.api_key.as_deref(),
        config.api_url.as_deref(),
    )?;
    let agent = ModelAgent::new(Arc::from(provider), config.model_name())
        .with_temperature(config.default_temperature)
        .with_reasoning_effort(options.reasoning_effort)
        .streaming(config.agent.stream);
    let mut entry = AgentEntry::new("assistant", Arc::new(agent));
    if let Some(instructions) = options.instructions {
        entry = entry.with_instructions(instructions);
    }
    let workflow = Workflow::sequential(vec![entry])?;

    let store = sessions::create_conversation_store(config);
    let mut conversation = match &session {
        Some(key) => store.load(key).await?.unwrap_or_default(),
        None => Conversation::new(),
    };
    if !conversation.is_empty() {
        println!("Resuming session with {} message(s)", conversation.len());
    }

    let mut attachments = Vec::with_capacity(options.images.len());
    for source in &options.images {
        attachments.push(load_image(source).await?);
    }

    let mut sink = ConsoleSink::new(trace_for(config)?);
    let single_shot = message.is_some();
    let mut pending = message;

    loop {
        let input = match pending.take() {
            Some(input) => input,
            None if single_shot => break,
            None => match read_input("You").await? {
                Some(input) if is_exit(&input) => break,
                Some(input) if input.trim().is_empty() => continue,
                Some(input) => input,
                None => break,
            },
        };

        let mut turn = conversation.clone();
        let message = attachments
            .drain(..)
            .fold(Message::user(input), Message::with_attachment);
        turn.push(message);
        let result = run_once(&workflow, turn, &mut sink).await;
        if result.status == RunStatus::Completed {
            conversation = result.conversation;
            if let Some(key) = &session {
                store.save(key, &conversation).await?;
            }
        } else if single_shot {
            if let Some(error) = result.error {
                bail!(error);
            }
            bail!("chat turn did not complete");
        }
    }
    Ok(())
}

async fn handle_session_command(command: SessionCommands, config: &Config) -> Result<()> {
    let store = sessions::create_conversation_store(config);
    match command {
        SessionCommands::List => {
            let sessions = store.list().await?;
            if sessions.is_empty() {
                println!("No stored sessions in {}", config.sessions_dir().display());
                return Ok(());
            }
            println!("  KEY                  MESSAGES  UPDATED");
            for session in sessions {
                println!(
                    "  {:<20} {:>8}  {}",
                    session.key,
                    session.messages,
                    session.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Ok(())
        }
        SessionCommands::Show { key } => {
            let key = match key {
                Some(key) => key,
                None => {
                    let keys: Vec<String> =
                        store.list().await?.into_iter().map(|s| s.key).collect();
                    if keys.is_empty() {
                        bail!("no stored sessions");
                    }
                    let index = dialoguer::FuzzySelect::new()
                        .with_prompt("Session")
                        .items(&keys)
                        .default(0)
                        .interact()?;
                    keys[index].clone()
                }
            };
            let Some(conversation) = store.load(&key).await? else {
                bail!("session not found: {key}");
            };
            for message in &conversation {
                let who = message
                    .author
                    .clone()
                    .unwrap_or_else(|| message.role.as_wire().to_string());
                println!("{who}: {}", message.text());
            }
            Ok(())
        }
        SessionCommands::Delete { key, yes } => {
            if !yes {
                let confirmed = dialoguer::Confirm::new()
                    .with_prompt(format!("Delete session '{key}'?"))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Aborted.");
                    return Ok(());
                }
            }
            if store.delete(&key).await? {
                println!("Deleted session '{key}'");
            } else {
                println!("No session named '{key}'");
            }
            Ok(())
        }
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
