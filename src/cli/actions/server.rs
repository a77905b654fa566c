use crate::api;
use crate::api::handlers::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            token_secret,
            frontend_url,
        } => {
            let auth_config = AuthConfig::new(token_secret, frontend_url);

            api::new(port, dsn, auth_config).await?;
        }
    }

    Ok(())
}
