//! Hotaru CLI entry point.
//!
//! Constructs a [`hotaru_runtime::RuntimeContainer`] for the current
//! working directory and exposes the debug/mcp verbs that sit outside the
//! core: `debug lsp diagnostics <file>` and
//! `mcp status|auth|logout|connect|disconnect <name>`. The interactive
//! session loop, the HTTP surface, and the terminal UI are out of scope;
//! this binary is the minimal host that proves the core boots and its
//! verbs work end to end.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hotaru_config::Config;
use hotaru_runtime::RuntimeContainer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "hotaru")]
#[command(about = "Hotaru agent runtime core")]
struct Args {
	/// Project directory the runtime operates against. Defaults to the
	/// current directory.
	#[arg(short, long, value_name = "PATH")]
	directory: Option<PathBuf>,

	/// Verbose logging.
	#[arg(short, long)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Start the runtime container, print its health, and exit.
	Health,
	/// LSP debug verbs.
	Debug {
		#[command(subcommand)]
		debug: DebugCommand,
	},
	/// MCP server lifecycle verbs.
	Mcp {
		#[command(subcommand)]
		mcp: McpCommand,
	},
}

#[derive(Subcommand, Debug)]
enum DebugCommand {
	/// Lsp verbs.
	Lsp {
		#[command(subcommand)]
		lsp: LspDebugCommand,
	},
}

#[derive(Subcommand, Debug)]
enum LspDebugCommand {
	/// Touches `file` on its handling language server and prints its
	/// current diagnostics.
	Diagnostics { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum McpCommand {
	/// Prints each configured server's connection status.
	Status,
	/// Runs the OAuth flow for a remote server missing tokens.
	Auth { name: String },
	/// Clears a server's stored tokens and cancels any pending auth.
	Logout { name: String },
	/// Reconnects a server (re-spawns local, re-probes remote).
	Connect { name: String },
	/// Closes a server's transport and marks it disabled.
	Disconnect { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	setup_tracing(args.verbose);

	let directory = match args.directory {
		Some(dir) => dir,
		None => std::env::current_dir()?,
	};
	let data_dir = dirs::data_dir().map(|d| d.join("hotaru")).unwrap_or_else(|| directory.join(".hotaru").join("data"));
	tokio::fs::create_dir_all(&data_dir).await?;

	let config = Config::default();
	match config_for(&directory) {
		Ok(loaded) => run(loaded, data_dir, directory, args.command).await,
		Err(error) => {
			error!(%error, "failed to load config, falling back to defaults");
			run(config, data_dir, directory, args.command).await
		}
	}
}

fn config_for(directory: &std::path::Path) -> hotaru_config::ConfigResult<Config> {
	hotaru_config::load(directory)
}

async fn run(config: Config, data_dir: PathBuf, directory: PathBuf, command: Command) -> Result<(), Box<dyn std::error::Error>> {
	info!(directory = %directory.display(), "starting hotaru runtime container");
	let container = RuntimeContainer::start(config, data_dir, directory).await?;

	let result = dispatch(&container, command).await;

	container.shutdown().await;
	result
}

async fn dispatch(container: &RuntimeContainer, command: Command) -> Result<(), Box<dyn std::error::Error>> {
	match command {
		Command::Health => {
			let health = container.health().await;
			println!("{}", serde_json::to_string_pretty(&health)?);
		}
		Command::Debug {
			debug: DebugCommand::Lsp {
				lsp: LspDebugCommand::Diagnostics { file },
			},
		} => {
			let text = tokio::fs::read_to_string(&file).await.unwrap_or_default();
			if let Err(error) = container.lsp.touch_file(&file, &text, true).await {
				error!(%error, path = %file.display(), "failed to touch file on its language server");
			}
			let diagnostics = container.lsp.diagnostics(&file).await;
			println!("{}", serde_json::to_string_pretty(&diagnostics)?);
		}
		Command::Mcp { mcp } => dispatch_mcp(container, mcp).await?,
	}
	Ok(())
}

async fn dispatch_mcp(container: &RuntimeContainer, mcp: McpCommand) -> Result<(), Box<dyn std::error::Error>> {
	match mcp {
		McpCommand::Status => {
			for (name, status) in container.mcp.statuses().await {
				println!("{name}: {status:?}");
			}
		}
		McpCommand::Auth { name } => {
			container.mcp.authenticate(&name).await?;
			println!("authenticated {name}");
		}
		McpCommand::Logout { name } => {
			container.mcp.logout(&name).await?;
			println!("logged out {name}");
		}
		McpCommand::Connect { name } => {
			container.mcp.reconnect(&name).await?;
			println!("connected {name}");
		}
		McpCommand::Disconnect { name } => {
			container.mcp.disconnect(&name).await?;
			println!("disconnected {name}");
		}
	}
	Ok(())
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| if verbose { EnvFilter::new("hotaru=debug,info") } else { EnvFilter::new("hotaru=info,warn") });

	tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
