use astral::agent::ChatPipeline;
use astral::secrets::{CredentialStore, Service};
use astral::types::ChatRequest;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "astral")]
#[command(about = "A chat backend with memory and web-augmented prompts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind to (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Auth token (required for non-loopback)
        #[arg(long, env = "ASTRAL_TOKEN")]
        token: Option<String>,
    },

    /// Store an API key in the credential store
    Auth {
        /// Service the key belongs to: groq, openai or bing
        #[arg(long, default_value = "groq")]
        provider: String,
    },

    /// Show resolved configuration
    Status,

    /// Send one message through the pipeline and print the reply
    Ask {
        /// Message text
        text: String,

        /// Force web augmentation
        #[arg(long)]
        web: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, bind, token } => {
            let mut config = astral::config::load()?;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            astral::gateway::run(config, token).await
        }
        Commands::Auth { provider } => {
            let service: Service = provider.parse()?;
            let key = rpassword::prompt_password(format!("{} API key: ", service.as_str()))?;
            let path = CredentialStore::default().write(service, &key)?;
            println!("saved {} key to {}", service.as_str(), path.display());
            Ok(())
        }
        Commands::Status => {
            let config = astral::config::load()?;
            let has_key = |key: &Option<String>| if key.is_some() { "set" } else { "missing" };
            println!("astral v{}", env!("CARGO_PKG_VERSION"));
            println!("gateway: {}:{}", config.gateway.bind, config.gateway.port);
            println!(
                "completion: {} / {} (key {})",
                config.completion.provider,
                config.completion.model,
                has_key(&config.completion.api_key)
            );
            println!("bing: key {}", has_key(&config.search.bing_api_key));
            match config.memory.path.as_deref() {
                Some(path) => println!("memory: {path} (cap {})", config.memory.capacity),
                None => println!("memory: in-process (cap {})", config.memory.capacity),
            }
            Ok(())
        }
        Commands::Ask { text, web } => {
            let config = astral::config::load()?;
            let pipeline = ChatPipeline::from_config(&config)?;
            let mut request = ChatRequest::new(text);
            request.use_web = web;
            let reply = pipeline.chat(request).await?;
            println!("{}", reply.reply);
            Ok(())
        }
    }
}
