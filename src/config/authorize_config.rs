use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct AuthorizeConfig {
    /// HS256 key for user tokens.
    pub secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Shared secret required by the job and cron endpoints.
    pub task_secret: String,
}

fn default_issuer() -> String {
    "devicesync".to_string()
}
