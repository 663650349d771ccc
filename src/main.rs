//! azuredir - dump Azure AD users with their group memberships.
//!
//! Lists every user with the groups they belong to, then resolves each user
//! again by id and by mail.

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use azuredir::config::Config;
use azuredir::directory::{DirectoryClient, DirectoryUser};
use azuredir::error::{AppError, DirectoryError};

#[tokio::main]
async fn main() {
    azuredir::load_dotenv();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            eprintln!("\nPlease set the following environment variables:");
            eprintln!("  AZURE_TENANT_ID=<your-tenant-id>");
            eprintln!("  AZURE_CLIENT_ID=<your-azure-ad-client-id>");
            eprintln!("  AZURE_CLIENT_SECRET=<your-client-secret>");
            std::process::exit(1);
        }
    };

    azuredir::init_logging(&config.logging.level);
    info!("Starting azuredir v{}", env!("CARGO_PKG_VERSION"));

    let client = match DirectoryClient::from_config(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating client: {:#}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping traversal");
            ctrl_c.cancel();
        }
    });

    if let Err(e) = run(&client, &cancel).await {
        let e = AppError::from(e);
        error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(client: &DirectoryClient, cancel: &CancellationToken) -> Result<(), DirectoryError> {
    let mut users = client.users()?;
    let mut listed = 0usize;
    while let Some(mut user) = users.next(cancel).await? {
        let result = client
            .iterate_user_groups(cancel, &user.id, |group| {
                user.groups.push(group);
                true
            })
            .await;
        match result {
            Ok(()) => {}
            Err(DirectoryError::Cancelled) => return Err(DirectoryError::Cancelled),
            Err(e) => error!("Error getting groups for {}: {}", user.id, e),
        }
        log_user(&user);
        listed += 1;
    }
    info!(
        "Listed {} users across {} pages (server count {:?})",
        listed,
        users.pages_fetched(),
        users.total_count()
    );

    let mut users = client.users()?;
    while let Some(user) = users.next(cancel).await? {
        match client.get_user_by_id(cancel, &user.id).await {
            Ok(found) => log_user(&found),
            Err(DirectoryError::Cancelled) => return Err(DirectoryError::Cancelled),
            Err(e) => error!("Error getting user: {}", e),
        }
    }

    let mut users = client.users()?;
    while let Some(user) = users.next(cancel).await? {
        match client.get_user_by_email(cancel, &user.mail).await {
            Ok(Some(found)) => log_user(&found),
            Ok(None) => info!("No user found by mail for {}", user.id),
            Err(DirectoryError::Cancelled) => return Err(DirectoryError::Cancelled),
            Err(e) => error!("Error getting user: {}", e),
        }
    }

    Ok(())
}

fn log_user(user: &DirectoryUser) {
    match serde_json::to_string(user) {
        Ok(json) => info!(user = %json, "User"),
        Err(e) => error!("Failed to serialize user {}: {}", user.id, e),
    }
}
