//! `soc login`, `soc logout`, `soc refresh`.

use std::io::BufRead;

use clap::Parser;

use crate::Console;

/// Consulted when neither `--password` nor `--password-stdin` is given.
const PASSWORD_ENV_VAR: &str = "SOC_PASSWORD";

#[derive(Debug, Parser)]
pub struct LoginArgs {
    #[arg(long, short = 'u')]
    pub username: String,

    /// Password on the command line. Prefer `--password-stdin`.
    #[arg(long, conflicts_with = "password_stdin")]
    pub password: Option<String>,

    /// Read the password from the first line of stdin.
    #[arg(long)]
    pub password_stdin: bool,
}

pub async fn run_login(console: &Console, args: LoginArgs) -> anyhow::Result<i32> {
    let password = match (args.password, args.password_stdin) {
        (Some(password), _) => password,
        (None, true) => read_password_line()?,
        (None, false) => std::env::var(PASSWORD_ENV_VAR).map_err(|_| {
            anyhow::anyhow!("no password given; use --password-stdin or ${PASSWORD_ENV_VAR}")
        })?,
    };

    let user = console.client.login(&args.username, &password).await?;
    println!("Signed in as {} ({})", user.username, user.role);
    Ok(0)
}

pub async fn run_logout(console: &Console) -> anyhow::Result<i32> {
    if !console.session.is_authenticated() {
        println!("Not signed in");
        return Ok(0);
    }
    if let Err(err) = console.client.logout().await {
        tracing::warn!("backend did not confirm logout: {err}");
    }
    println!("Signed out");
    Ok(0)
}

pub async fn run_refresh(console: &Console) -> anyhow::Result<i32> {
    console.require_login()?;
    console.client.refresh().await?;
    println!("Token refreshed");
    Ok(0)
}

fn read_password_line() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("empty password on stdin");
    }
    Ok(password)
}
