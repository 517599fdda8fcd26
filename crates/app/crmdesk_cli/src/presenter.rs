//! Terminal rendering of the expiry warning and session notices.

use std::time::Duration;

use async_trait::async_trait;
use crmdesk_session::{Notice, SessionPresenter, WarningChoice};
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct TerminalPresenter;

#[async_trait]
impl SessionPresenter for TerminalPresenter {
    async fn present_warning(&self, window: Duration) -> WarningChoice {
        println!(
            "Your session expires in {} seconds. Continue? [y/N]",
            window.as_secs()
        );

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(0) | Err(_) => WarningChoice::Timeout,
            Ok(_) => parse_choice(&line),
        }
    }

    fn notify(&self, notice: Notice) {
        println!("{}", notice.message());
    }
}

fn parse_choice(answer: &str) -> WarningChoice {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "c" | "continue" => WarningChoice::Continue,
        _ => WarningChoice::Logout,
    }
}
