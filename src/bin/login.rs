//! azuredir-login - interactive Azure AD sign-in that shows the user's
//! claims and directory groups.
//!
//! Visit `/login` to start; the callback responds with the user-info claims,
//! group names and the decoded (unverified) tokens.

use std::sync::Arc;
use tracing::{error, info, warn};

use azuredir::auth::flow::AuthFlow;
use azuredir::auth::oauth::OAuth2Client;
use azuredir::auth::server::{self, ServerState, LOGIN_PATH};
use azuredir::config::Config;
use azuredir::directory::DirectoryClient;
use azuredir::error::AppError;

#[tokio::main]
async fn main() {
    azuredir::load_dotenv();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    azuredir::init_logging(&config.logging.level);
    info!("Starting azuredir-login v{}", env!("CARGO_PKG_VERSION"));

    // Groups are optional; sign-in works without directory access
    let directory = match DirectoryClient::from_config(&config) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!("Directory enrichment disabled: {:#}", e);
            None
        }
    };

    let oauth = match OAuth2Client::discover(&config).await {
        Ok(client) => client,
        Err(e) => {
            let e = AppError::from(e);
            error!("{}", e);
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    };

    let flow = Arc::new(AuthFlow::new(oauth, directory));
    let secure_cookies = config.oauth.redirect_uri.starts_with("https://");
    let app = server::router(ServerState::new(flow, secure_cookies));

    if config.server.open_browser {
        let login_url = format!("http://{}{}", config.server.listen_addr, LOGIN_PATH);
        if let Err(e) = open::that(&login_url) {
            warn!("Failed to open browser: {}", e);
        }
    }

    if let Err(e) = server::serve(&config.server.listen_addr, app).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
