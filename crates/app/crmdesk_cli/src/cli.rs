use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "crmdesk", version, about = "CRM console session client")]
pub struct Cli {
    /// Base URL of the CRM API.
    #[arg(long, global = true, env = "CRM_API_URL")]
    pub api_url: Option<String>,

    /// Directory holding the persisted session.
    #[arg(long, global = true, env = "CRM_SESSION_DIR")]
    pub session_dir: Option<PathBuf>,

    /// Log session activity to stderr.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and persist the session.
    Login {
        username: String,

        /// Prompted for when omitted.
        #[arg(long, env = "CRM_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// End the session and revoke its refresh token.
    Logout,

    /// Show the logged-in identity.
    Whoami {
        /// Print as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Check a permission (or a role with --role). Exits non-zero when not granted.
    Can {
        name: String,

        #[arg(long, default_value_t = false)]
        role: bool,
    },

    /// Exchange the refresh token for a new pair.
    Refresh,

    /// Stay attached and handle expiry warnings until the session ends.
    Watch,

    /// Change the password of the logged-in user.
    ChangePassword {
        #[arg(long)]
        old_password: Option<String>,

        #[arg(long)]
        new_password: Option<String>,
    },

    /// Ask the server to mail a password reset link.
    ForgotPassword { email: String },

    /// Set a new password using a reset token.
    ResetPassword {
        email: String,

        token: String,

        #[arg(long)]
        new_password: Option<String>,
    },

    /// Register a new account. The server emails a confirmation link.
    Signup {
        username: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// Prompted for when omitted.
        #[arg(long, env = "CRM_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Confirm an email address with the user id and token from the link.
    ConfirmEmail { user_id: String, token: String },

    /// Print version.
    Version,
}
