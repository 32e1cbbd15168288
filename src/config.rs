use std::path::PathBuf;

use anyhow::Context;

use crate::AppResult;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub client_secret_path: PathBuf,
    pub media_root: PathBuf,
    pub session_minutes: i64,
    /// Base used to build OAuth redirect urls.
    pub public_url: String,
    pub superuser: Option<SuperuserSeed>,
}

#[derive(Debug, Clone)]
pub struct SuperuserSeed {
    pub username: String,
    pub email: String,
}

impl Config {
    pub fn from_env() -> AppResult<Config> {
        dotenv::dotenv().ok();

        let host = dotenv::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_owned());
        let port = dotenv::var("PORT")
            .unwrap_or_else(|_| "8080".to_owned())
            .parse::<u16>()
            .context("PORT must be a number")?;
        let database_url = dotenv::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let max_connections = dotenv::var("MAX_CONNECTIONS")
            .unwrap_or_else(|_| "16".to_owned())
            .parse::<u32>()
            .context("MAX_CONNECTIONS must be a number")?;
        let client_secret_path = dotenv::var("CLIENT_SECRET_PATH")
            .unwrap_or_else(|_| "client_secret.json".to_owned())
            .into();
        let media_root = dotenv::var("MEDIA_ROOT")
            .unwrap_or_else(|_| "media".to_owned())
            .into();
        let session_minutes = dotenv::var("SESSION_MINUTES")
            .unwrap_or_else(|_| "60".to_owned())
            .parse::<i64>()
            .context("SESSION_MINUTES must be a number")?;
        let public_url = dotenv::var("PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"));

        let superuser = match (dotenv::var("SUPERUSER_USERNAME"), dotenv::var("SUPERUSER_EMAIL")) {
            (Ok(username), Ok(email)) => Some(SuperuserSeed { username, email }),
            _ => None,
        };

        Ok(Config {
            host,
            port,
            database_url,
            max_connections,
            client_secret_path,
            media_root,
            session_minutes,
            public_url,
            superuser,
        })
    }
}
