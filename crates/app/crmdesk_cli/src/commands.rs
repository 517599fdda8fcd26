use std::sync::Arc;

use crmdesk_session::{
    FileStorage, HttpAuthApi, Identity, Registration, SessionConfig, SessionController,
    SessionError, SystemClock,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::cli::{Cli, Commands};
use crate::presenter::TerminalPresenter;
use crate::{Error, Result};

/// Session config from the environment, overridden by command-line flags.
pub fn config(cli: &Cli) -> SessionConfig {
    let mut config = SessionConfig::from_env();
    if let Some(api_url) = &cli.api_url {
        config.api_url = api_url.clone();
    }
    if let Some(dir) = &cli.session_dir {
        config.storage_dir = dir.clone();
    }
    config
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    if let Commands::Version = cli.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = config(&cli);
    debug!(api_url = %config.api_url, storage_dir = %config.storage_dir.display(), "session config");
    let controller = SessionController::new(
        &config,
        Arc::new(HttpAuthApi::new(&config)?),
        Arc::new(FileStorage::new(&config.storage_dir)),
        Arc::new(SystemClock),
        Arc::new(TerminalPresenter),
    );

    match cli.command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt("Password: ").await?,
            };
            let identity = controller
                .login(&username, &password)
                .await
                .map_err(Error::rejected)?;
            println!("Logged in as {}", identity.username);
        }
        Commands::Logout => {
            if resume(&controller).await.is_none() {
                println!("Already logged out");
                return Ok(());
            }
            controller.logout().await;
        }
        Commands::Whoami { json } => {
            let identity = resume(&controller)
                .await
                .ok_or(SessionError::NotAuthenticated)?;
            print_identity(&identity, json)?;
        }
        Commands::Can { name, role } => {
            resume(&controller)
                .await
                .ok_or(SessionError::NotAuthenticated)?;
            let store = controller.store();
            let granted = if role {
                store.has_role(&name)
            } else {
                store.has_permission(&name)
            };
            if !granted {
                return Err(Error::Denied(name));
            }
            println!("yes");
        }
        Commands::Refresh => {
            resume(&controller)
                .await
                .ok_or(SessionError::NotAuthenticated)?;
            if !controller.refresh().await.is_success() {
                return Err(Error::Custom(
                    "Session could not be refreshed; logged out".into(),
                ));
            }
            println!("Session refreshed");
        }
        Commands::Watch => {
            let identity = resume(&controller)
                .await
                .ok_or(SessionError::NotAuthenticated)?;
            println!("Watching session of {}; Ctrl-C to detach", identity.username);
            watch(&controller).await?;
        }
        Commands::ChangePassword {
            old_password,
            new_password,
        } => {
            resume(&controller)
                .await
                .ok_or(SessionError::NotAuthenticated)?;
            let old_password = or_prompt(old_password, "Current password: ").await?;
            let new_password = or_prompt(new_password, "New password: ").await?;
            controller
                .change_password(&old_password, &new_password)
                .await
                .map_err(Error::rejected)?;
            println!("Password changed");
        }
        Commands::ForgotPassword { email } => {
            controller.forgot_password(&email).await?;
            println!("If {email} is registered, a reset link is on its way");
        }
        Commands::ResetPassword {
            email,
            token,
            new_password,
        } => {
            let new_password = or_prompt(new_password, "New password: ").await?;
            controller
                .reset_password(&email, &token, &new_password)
                .await?;
            println!("Password reset; log in with the new password");
        }
        Commands::Signup {
            username,
            name,
            email,
            password,
        } => {
            let password = or_prompt(password, "Password: ").await?;
            let registration = Registration {
                username,
                name,
                email,
                password,
            };
            let message = controller
                .signup(&registration)
                .await
                .map_err(Error::invalid)?;
            println!("{message}");
        }
        Commands::ConfirmEmail { user_id, token } => {
            let message = controller
                .confirm_email(&user_id, &token)
                .await
                .map_err(Error::invalid)?;
            println!("{message}");
        }
        Commands::Version => {}
    }

    Ok(())
}

/// Restore the persisted session and deal with anything already due, such
/// as a token that expired while nobody was watching.
async fn resume(controller: &SessionController) -> Option<Identity> {
    controller.restore()?;
    controller.settle().await;
    controller.store().current()
}

/// `run` returns only after the revoke and notice; nothing but Ctrl-C may
/// cut it short.
async fn watch(controller: &SessionController) -> Result<()> {
    tokio::select! {
        _ = controller.run() => {
            info!("session ended");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            println!("Detached; session left as is");
        }
    }
    Ok(())
}

fn print_identity(identity: &Identity, as_json: bool) -> Result<()> {
    if as_json {
        let view = json!({
            "id": identity.id,
            "username": identity.username,
            "name": identity.name,
            "email": identity.email,
            "roles": identity.roles,
            "permissions": identity.permissions,
        });
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{} ({})", identity.username, identity.name);
    println!("id: {}", identity.id);
    if let Some(email) = &identity.email {
        println!("email: {email}");
    }
    println!("roles: {}", identity.roles.join(", "));
    let permissions: Vec<&str> = identity.permissions.iter().map(|p| p.name.as_str()).collect();
    println!("permissions: {}", permissions.join(", "));
    Ok(())
}

async fn or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt(label).await,
    }
}

async fn prompt(label: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    if BufReader::new(tokio::io::stdin()).read_line(&mut line).await? == 0 {
        return Err(Error::Custom(format!("no input for {}", label.trim_end_matches([':', ' ']))));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
