use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use vidpair_client::config::ConfigError;
use vidpair_client::{
    ApiError, ChannelCallbacks, Client, ClientConfig, ExecutionContext, FileStorage, Identity, StorageError,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{0} must be a JSON object")]
    NotAnObject(&'static str),
    #[error("not logged in; run `vidpair login` first")]
    NotLoggedIn,
    #[error("cable unavailable for channel {0}")]
    CableUnavailable(String),
    #[error("subscription to {0} was rejected")]
    Rejected(String),
    #[error("waiting for ctrl-c failed: {0}")]
    Signal(std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "vidpair", about = "vidpair session, API and cable CLI")]
struct Cli {
    /// Host the session belongs to; picks local or production endpoints.
    #[arg(long, env = "VIDPAIR_HOST", default_value = "localhost")]
    host: String,

    /// JSON file holding the durable session.
    #[arg(long, env = "VIDPAIR_STORAGE", default_value = ".vidpair-session.json")]
    storage: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an identity as the current session.
    Login(LoginArgs),
    Logout,
    Whoami,
    /// Call the REST API with the session's identity headers.
    Api(ApiArgs),
    /// Subscribe to a cable channel and print every message.
    Subscribe(SubscribeArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    token: String,
    /// Extra profile fields as a JSON object.
    #[arg(long)]
    profile: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

#[derive(Args, Debug)]
struct ApiArgs {
    #[arg(value_enum)]
    method: HttpMethod,
    path: String,
    /// JSON request body for post/patch.
    #[arg(long)]
    data: Option<String>,
}

#[derive(Args, Debug)]
struct SubscribeArgs {
    channel: String,
    /// Channel params as a JSON object.
    #[arg(long)]
    params: Option<String>,
    /// Action to perform once the subscription is confirmed.
    #[arg(long)]
    perform: Option<String>,
    /// JSON object sent with `--perform`.
    #[arg(long)]
    data: Option<String>,
    /// Exit after this many messages.
    #[arg(long)]
    max_messages: Option<usize>,
}

#[derive(Debug)]
enum ChannelEvent {
    Connected,
    Disconnected,
    Rejected,
    Message(Value),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let storage = Arc::new(FileStorage::open(cli.storage.clone())?);
    let client = Client::new(&config, ExecutionContext::interactive(cli.host), storage)?;

    let result = match cli.command {
        Command::Login(args) => run_login(&client, args),
        Command::Logout => {
            client.session().logout();
            println!("logged out");
            Ok(())
        }
        Command::Whoami => run_whoami(&client),
        Command::Api(args) => run_api(&client, args).await,
        Command::Subscribe(args) => run_subscribe(&client, args).await,
    };
    client.dispose();
    result
}

fn run_login(client: &Client, args: LoginArgs) -> Result<(), CliError> {
    let mut identity = Identity::new(args.email, args.token);
    if let Some(raw) = args.profile.as_deref() {
        for (key, value) in parse_object(raw, "--profile")? {
            identity = identity.with_field(key, value);
        }
    }
    if !identity.has_credentials() {
        tracing::warn!("email or token is empty; requests will go out unauthenticated");
    }
    client.session().login(identity.clone());
    print_json(&serde_json::to_value(&identity)?)
}

fn run_whoami(client: &Client) -> Result<(), CliError> {
    let identity = client.session().current().ok_or(CliError::NotLoggedIn)?;
    print_json(&serde_json::to_value(&identity)?)
}

async fn run_api(client: &Client, args: ApiArgs) -> Result<(), CliError> {
    let body = match args.data.as_deref() {
        Some(raw) => serde_json::from_str::<Value>(raw)?,
        None => Value::Object(Map::new()),
    };
    let api = client.api();
    let value = match args.method {
        HttpMethod::Get => api.get_json(&args.path).await?,
        HttpMethod::Post => api.post_json(&args.path, body).await?,
        HttpMethod::Patch => api.patch_json(&args.path, body).await?,
        HttpMethod::Delete => api.delete_json(&args.path).await?,
    };
    print_json(&value)
}

async fn run_subscribe(client: &Client, args: SubscribeArgs) -> Result<(), CliError> {
    if !client.session().is_authenticated() {
        return Err(CliError::NotLoggedIn);
    }
    let params = match args.params.as_deref() {
        Some(raw) => parse_object(raw, "--params")?,
        None => Map::new(),
    };
    let perform_data = match args.data.as_deref() {
        Some(raw) => parse_object(raw, "--data")?,
        None => Map::new(),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = client
        .cable()
        .subscribe_to_channel(&args.channel, &params, forwarding_callbacks(&tx))
        .await
        .ok_or_else(|| CliError::CableUnavailable(args.channel.clone()))?;
    drop(tx);

    let mut received = 0usize;
    let outcome = loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ChannelEvent::Connected) => {
                    if let Some(action) = args.perform.as_deref() {
                        subscription.perform(action, perform_data.clone());
                    }
                }
                Some(ChannelEvent::Message(message)) => {
                    print_json(&message)?;
                    received += 1;
                    if args.max_messages.is_some_and(|max| received >= max) {
                        break Ok(());
                    }
                }
                Some(ChannelEvent::Rejected) => break Err(CliError::Rejected(args.channel.clone())),
                Some(ChannelEvent::Disconnected) | None => break Ok(()),
            },
            signal = tokio::signal::ctrl_c() => {
                break signal.map_err(CliError::Signal);
            }
        }
    };

    client.cable().unsubscribe_from_channel(&args.channel, &params);
    outcome
}

fn forwarding_callbacks(tx: &mpsc::UnboundedSender<ChannelEvent>) -> ChannelCallbacks {
    let (connected, disconnected, rejected, received) = (tx.clone(), tx.clone(), tx.clone(), tx.clone());
    ChannelCallbacks::new()
        .on_connected(move || forward(&connected, ChannelEvent::Connected))
        .on_disconnected(move || forward(&disconnected, ChannelEvent::Disconnected))
        .on_rejected(move || forward(&rejected, ChannelEvent::Rejected))
        .on_received(move |message| forward(&received, ChannelEvent::Message(message)))
}

fn forward(tx: &mpsc::UnboundedSender<ChannelEvent>, event: ChannelEvent) {
    if let Err(error) = tx.send(event) {
        tracing::debug!(event = ?error.0, "subscriber loop gone; event dropped");
    }
}

fn parse_object(raw: &str, what: &'static str) -> Result<Map<String, Value>, CliError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Err(CliError::NotAnObject(what)),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
