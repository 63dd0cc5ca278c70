use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use hearth_auth::client::{ClientConfig, PkceClient};
use hearth_auth::session::{AuthSession, FileSessionStorage};
use hearth_cli::api_client::ListingsClient;
use hearth_cli::browser::BrowserUserAgent;
use hearth_cli::loopback::{LOGIN_TIMEOUT, LoopbackListener};
use listings_srv::listing::{Listing, ListingQuery};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "hearth", author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the listings API
    #[arg(long, default_value = "http://localhost:3001", env = "HEARTH_API_BASE")]
    api_base: String,

    /// File holding the login session (default: ~/.hearth_session.json)
    #[arg(long, env = "HEARTH_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Timeout of API calls in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in through the browser
    Login,
    /// Forget the session and sign out of the hosted login page
    Logout,
    /// Show who is signed in
    Whoami,
    /// List properties
    List {
        /// Only properties with this availability (true or false)
        #[arg(long)]
        available: Option<bool>,
        /// Minimum number of bedrooms
        #[arg(long)]
        beds: Option<u32>,
        /// Minimum number of bathrooms
        #[arg(long)]
        baths: Option<f64>,
        /// Maximum price
        #[arg(long)]
        max_price: Option<f64>,
    },
    /// Create a property
    Create(ListingFields),
    /// Update some fields of a property
    Update {
        id: String,
        #[command(flatten)]
        fields: ListingFields,
    },
    /// Delete a property
    Delete { id: String },
    /// Get a presigned URL to upload a photo
    UploadUrl {
        filename: String,
        content_type: String,
    },
}

#[derive(Args, Debug)]
struct ListingFields {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    price: Option<f64>,
    #[arg(long)]
    bedrooms: Option<u32>,
    #[arg(long)]
    bathrooms: Option<f64>,
    #[arg(long)]
    available: Option<bool>,
    /// Comma separated
    #[arg(long)]
    tags: Option<String>,
    /// Comma separated URLs or object keys
    #[arg(long)]
    photos: Option<String>,
}

fn split_list(list: &str) -> Value {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Value::String(s.to_string()))
        .collect()
}

impl ListingFields {
    /// JSON object holding only the fields given on the command line
    fn to_json(&self) -> Value {
        let mut fields = Map::new();
        if let Some(title) = &self.title {
            fields.insert("title".into(), title.clone().into());
        }
        if let Some(description) = &self.description {
            fields.insert("description".into(), description.clone().into());
        }
        if let Some(price) = self.price {
            fields.insert("price".into(), price.into());
        }
        if let Some(bedrooms) = self.bedrooms {
            fields.insert("bedrooms".into(), bedrooms.into());
        }
        if let Some(bathrooms) = self.bathrooms {
            fields.insert("bathrooms".into(), bathrooms.into());
        }
        if let Some(available) = self.available {
            fields.insert("available".into(), available.into());
        }
        if let Some(tags) = &self.tags {
            fields.insert("tags".into(), split_list(tags));
        }
        if let Some(photos) = &self.photos {
            fields.insert("photos".into(), split_list(photos));
        }
        Value::Object(fields)
    }
}

fn default_session_file() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME not set, pass --session-file")?;
    Ok(PathBuf::from(home).join(".hearth_session.json"))
}

fn pkce_client(session_file: PathBuf) -> Result<PkceClient> {
    let config = ClientConfig::from_env()?;
    PkceClient::new(
        config,
        Arc::new(FileSessionStorage::new(session_file)),
        Arc::new(BrowserUserAgent),
    )
}

fn require_session(client: &PkceClient) -> Result<AuthSession> {
    client
        .session()
        .context("Not authenticated, run `hearth login` first")
}

fn print_listing(listing: &Listing) {
    let status = if listing.available {
        "available"
    } else {
        "unavailable"
    };
    println!(
        "{}  {}  ${:.0}  {} bd / {} ba  {status}",
        listing.id, listing.title, listing.price, listing.bedrooms, listing.bathrooms
    );
    if !listing.tags.is_empty() {
        println!("    tags: {}", listing.tags.join(", "));
    }
}

async fn login(client: &PkceClient) -> Result<()> {
    let redirect_uri =
        Url::parse(&client.config().redirect_uri).context("invalid redirect_uri")?;
    let listener = LoopbackListener::bind(&redirect_uri).await?;
    client.start_login()?;
    let url = listener.wait(LOGIN_TIMEOUT).await?;
    match client.handle_redirect(&url).await? {
        Some(session) => {
            println!("Logged in as {}", session.display_label());
            Ok(())
        }
        None => bail!("the login redirect carried no authorization response"),
    }
}

fn whoami(client: &PkceClient) {
    match client.session() {
        Some(session) => {
            println!("{}", session.display_label());
            if client.is_privileged_hint() {
                println!("Editing enabled (client-side hint; the API checks every write)");
            }
        }
        None => println!("Not signed in"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let session_file = match cli.session_file {
        Some(path) => path,
        None => default_session_file()?,
    };
    let api = ListingsClient::new(&cli.api_base, Duration::from_secs(cli.timeout_secs))?;

    match cli.command {
        Command::Login => login(&pkce_client(session_file)?).await?,
        Command::Logout => {
            pkce_client(session_file)?.logout()?;
            println!("Logged out");
        }
        Command::Whoami => whoami(&pkce_client(session_file)?),
        Command::List {
            available,
            beds,
            baths,
            max_price,
        } => {
            let query = ListingQuery {
                available,
                beds,
                baths,
                max_price,
            };
            let listings = api.list(&query).await?;
            for listing in &listings {
                print_listing(listing);
            }
            println!("{} listing(s)", listings.len());
        }
        Command::Create(fields) => {
            let session = require_session(&pkce_client(session_file)?)?;
            let listing = api.create(session.bearer(), &fields.to_json()).await?;
            print_listing(&listing);
        }
        Command::Update { id, fields } => {
            let session = require_session(&pkce_client(session_file)?)?;
            let listing = api.update(session.bearer(), &id, &fields.to_json()).await?;
            print_listing(&listing);
        }
        Command::Delete { id } => {
            let session = require_session(&pkce_client(session_file)?)?;
            api.delete(session.bearer(), &id).await?;
            println!("Deleted {id}");
        }
        Command::UploadUrl {
            filename,
            content_type,
        } => {
            let session = require_session(&pkce_client(session_file)?)?;
            let ticket = api
                .upload_url(session.bearer(), &filename, &content_type)
                .await?;
            println!("object key: {}", ticket.object_key);
            println!("expires in: {}s", ticket.expires_in);
            println!(
                "upload with: curl -X PUT -H 'Content-Type: {content_type}' --data-binary @{filename} '{}'",
                ticket.upload_url
            );
        }
    }

    Ok(())
}
