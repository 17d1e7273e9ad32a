use clap::Parser;
use log::{info, warn};
use serde_json::{json, Value};
use thiserror::Error as ThisError;
use unera_api::ApiClient;
use unera_client::{Client, ClientEvent};
use unera_db::{LocalStorage, Stores};
use unera_msg::{Credentials, Post};

mod config;

use config::Config;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Failed to find a home directory for local storage")]
    NoHomeDir,
    #[error("Failed to create storage directory, cause: {0}")]
    StorageDir(#[source] std::io::Error),
    #[error("Failed to open local storage, cause: {0}")]
    Storage(#[from] unera_db::Error),
    #[error("--login needs a password in UNERA_PASSWORD")]
    MissingPassword,
    #[error(transparent)]
    Client(#[from] unera_client::Error),
    #[error("Failed to wait for Ctrl-C, cause: {0}")]
    Signal(#[source] std::io::Error),
}

async fn open_storage(config: &Config) -> Result<LocalStorage, Error> {
    match config.storage_path()? {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(Error::StorageDir)?;
            }
            info!("local storage at {}", path.display());
            Ok(LocalStorage::open(&path).await?)
        }
        None => Ok(LocalStorage::in_memory().await?),
    }
}

fn summarize(stores: &Stores, post: &Post) -> Value {
    let author = stores
        .users()
        .get_by_id(&post.author_id)
        .map(|user| user.name.clone());
    json!({
        "id": post.id,
        "authorId": post.author_id,
        "author": author,
        "type": post.kind,
        "reactions": post.reactions.len(),
        "comments": post.comments.len(),
        "group": post.group_name,
        "brand": post.brand_name,
        "sponsored": post.product.is_some(),
    })
}

async fn print_feed(client: &Client<ApiClient>) {
    let feed = client.feed().await;
    let lines = client
        .read(|stores| {
            feed.iter()
                .map(|post| summarize(stores, post).to_string())
                .collect::<Vec<String>>()
        })
        .await;
    for line in lines {
        println!("{}", line);
    }
}

async fn run(config: Config) -> Result<(), Error> {
    let storage = open_storage(&config).await?;
    let backend = ApiClient::new(&config.api_url);
    let client = Client::start(backend, storage, config.client_config()).await?;

    if config.logout {
        client.logout().await?;
    }
    if let Some(email) = &config.login {
        let password = config.password.clone().ok_or(Error::MissingPassword)?;
        let user = client
            .login(&Credentials {
                email: email.clone(),
                password,
            })
            .await?;
        info!("logged in as {} ({})", user.name, user.id);
    }

    // partial loads still leave something to show
    if let Err(err) = client.refresh().await {
        warn!("Failed to load everything, cause: {}", err);
    }
    print_feed(&client).await;

    if !config.watch {
        return Ok(());
    }

    let mut revisions = client.subscribe_revisions();
    let mut events = client.subscribe_events();
    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                print_feed(&client).await;
            }
            event = events.recv() => {
                if let Ok(ClientEvent::SessionExpired) = event {
                    warn!("session expired, continuing as guest");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(Error::Signal)?;
                info!("stopping");
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();
    run(Config::parse()).await
}
