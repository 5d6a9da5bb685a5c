use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::{env, fmt::Display};

use anyhow::{bail, Context};
use rand::{thread_rng, Rng};

use crate::models::{Identity, STUDENT_FIELDS};

pub const DEFAULT_REQUIRED_FIELDS: &[&str] = &["name", "phone", "email", "totalFee", "amountPaid"];

#[derive(Clone)]
pub struct AdminAccount {
    pub identity: Identity,
    pub password: String,
}

#[derive(Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// Institute details printed on receipts and used as the mail sender name.
#[derive(Debug, Clone)]
pub struct Branding {
    pub name: String,
    pub address: String,
    pub contact: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            name: "Auralith Bit".to_string(),
            address: "Siddharthanagar".to_string(),
            contact: "info@auralith.com".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub data_dir: PathBuf,
    pub admin: AdminAccount,
    pub token_secret: Vec<u8>,
    pub token_ttl: chrono::Duration,
    pub required_fields: Vec<String>,
    pub mail: Option<MailConfig>,
    pub mail_simulation_delay: std::time::Duration,
    pub branding: Branding,
}

impl Config {
    /// A config with defaults for everything but the admin account, the
    /// signing secret and where files live.
    pub fn new(admin: AdminAccount, token_secret: Vec<u8>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000),
            data_dir: data_dir.into(),
            admin,
            token_secret,
            token_ttl: chrono::Duration::hours(24),
            required_fields: DEFAULT_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            mail: None,
            mail_simulation_delay: std::time::Duration::from_millis(1500),
            branding: Branding::default(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let admin = AdminAccount {
            identity: Identity {
                email: required("ADMIN_EMAIL")?,
                name: try_load("ADMIN_NAME", "Administrator")?,
                role: "admin".to_string(),
            },
            password: required("ADMIN_PASSWORD")?,
        };

        let token_secret = match var("TOKEN_SECRET") {
            Some(secret) => secret.into_bytes(),
            None => {
                log::warn!("TOKEN_SECRET not set, using a random secret; tokens will not survive a restart");
                thread_rng().gen::<[u8; 32]>().to_vec()
            }
        };

        let ip: IpAddr = try_load("BIND_ADDR", "127.0.0.1")?;
        let port: u16 = try_load("PORT", "5000")?;
        let data_dir: PathBuf = try_load("DATA_DIR", "data")?;

        let mut config = Self::new(admin, token_secret, data_dir);
        config.addr = SocketAddr::new(ip, port);
        config.token_ttl = chrono::Duration::hours(try_load("TOKEN_TTL_HOURS", "24")?);
        config.required_fields = parse_required_fields(&try_load::<String>(
            "STUDENT_REQUIRED_FIELDS",
            &DEFAULT_REQUIRED_FIELDS.join(","),
        )?)?;
        config.mail_simulation_delay =
            std::time::Duration::from_millis(try_load("MAIL_SIMULATION_DELAY_MS", "1500")?);
        config.branding = Branding {
            name: try_load("INSTITUTE_NAME", "Auralith Bit")?,
            address: try_load("INSTITUTE_ADDRESS", "Siddharthanagar")?,
            contact: try_load("INSTITUTE_CONTACT", "info@auralith.com")?,
        };
        config.mail = load_mail(&config.branding)?;
        Ok(config)
    }

    pub fn roster_path(&self) -> PathBuf {
        self.data_dir.join("students.csv")
    }

    pub fn receipts_dir(&self) -> PathBuf {
        self.data_dir.join("receipts")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.receipts_dir().join("receipts.json")
    }
}

fn load_mail(branding: &Branding) -> anyhow::Result<Option<MailConfig>> {
    let (host, username, password) = match (
        var("SMTP_HOST"),
        var("SMTP_USERNAME"),
        var("SMTP_PASSWORD"),
    ) {
        (Some(host), Some(username), Some(password)) => (host, username, password),
        _ => {
            log::info!("SMTP not configured, receipt emails will be simulated");
            return Ok(None);
        }
    };
    let port = match var("SMTP_PORT") {
        Some(port) => Some(port.parse::<u16>().context("invalid SMTP_PORT")?),
        None => None,
    };
    let from = var("MAIL_FROM").unwrap_or_else(|| format!("{} <{}>", branding.name, username));
    Ok(Some(MailConfig {
        host,
        port,
        username,
        password,
        from,
    }))
}

pub fn parse_required_fields(raw: &str) -> anyhow::Result<Vec<String>> {
    let mut fields = Vec::new();
    for field in raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        if !STUDENT_FIELDS.contains(&field) {
            bail!(
                "unknown student field `{}` in STUDENT_REQUIRED_FIELDS, expected one of {}",
                field,
                STUDENT_FIELDS.join(", ")
            );
        }
        fields.push(field.to_string());
    }
    Ok(fields)
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn required(key: &str) -> anyhow::Result<String> {
    var(key).with_context(|| format!("environment variable {} must be set", key))
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        log::info!("{} not set, using default: {}", key, default);
        default.to_string()
    });
    match raw.parse() {
        Ok(value) => Ok(value),
        Err(err) => bail!("invalid {} value `{}`: {}", key, raw, err),
    }
}
