use regex::Regex;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub env_name: String,

    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,

    pub db_url: String,
    pub db_schema: Option<String>,

    pub jwt_secret: String,

    pub allowed_origins: Vec<String>,

    pub gateway_base_url: Option<String>,
    pub gateway_key_id: Option<String>,
    pub gateway_key_secret: Option<String>,
    pub gateway_provider: String,

    pub notify_base_url: Option<String>,
    pub notify_from: Option<String>,
    pub notify_token: Option<String>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(v) => {
            let v = v.trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        }
        Err(_) => None,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn normalize_db_url(raw: &str) -> String {
    // Accept SQLAlchemy-style URLs like "postgresql+psycopg://..." by dropping
    // the "+driver" portion.
    if let Some(colon) = raw.find(':') {
        let (scheme, rest) = raw.split_at(colon);
        if let Some(plus) = scheme.find('+') {
            return format!("{}{}", &scheme[..plus], rest);
        }
    }
    raw.to_string()
}

fn validate_postgres_url(url: &str) -> Result<(), String> {
    let scheme = url
        .split_once(':')
        .map(|(s, _)| s.trim().to_lowercase())
        .unwrap_or_default();
    match scheme.as_str() {
        "postgres" | "postgresql" => Ok(()),
        _ => Err("TAXI_DB_URL (or DB_URL) must be a postgres URL".to_string()),
    }
}

const WEAK_SECRETS: &[&str] = &["change-me", "change-me-taxi-jwt", "secret", "password"];

fn enforce_secret_policy(
    env_lower: &str,
    key: &str,
    value: Option<&str>,
    required: bool,
) -> Result<(), String> {
    let prod_like = matches!(env_lower, "prod" | "production" | "staging");
    let v = value.map(str::trim).unwrap_or("");
    if v.is_empty() {
        if required && prod_like {
            return Err(format!("{key} must be set in prod/staging"));
        }
        return Ok(());
    }
    if prod_like {
        if v.len() < 32 {
            return Err(format!("{key} must be at least 32 characters in prod/staging"));
        }
        if WEAK_SECRETS.iter().any(|w| v.eq_ignore_ascii_case(w)) {
            return Err(format!("{key} must not be a default placeholder in prod/staging"));
        }
    }
    Ok(())
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let env_name = env_or("ENV", "dev");
        let env_lower = env_name.trim().to_lowercase();
        let prod_like = matches!(env_lower.as_str(), "prod" | "production" | "staging");

        let host = env_or("APP_HOST", "0.0.0.0");
        let port: u16 = env_or("APP_PORT", "8084")
            .parse()
            .map_err(|_| "APP_PORT must be a valid u16".to_string())?;

        let db_raw = env_opt("TAXI_DB_URL")
            .or_else(|| env_opt("DB_URL"))
            .unwrap_or_else(|| "postgresql://taxi:taxi@db:5432/taxi".to_string());
        let db_url = normalize_db_url(&db_raw);
        validate_postgres_url(&db_url)?;

        let db_schema = env_opt("DB_SCHEMA");
        if let Some(s) = &db_schema {
            let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| e.to_string())?;
            if !re.is_match(s) {
                return Err("DB_SCHEMA must match ^[A-Za-z_][A-Za-z0-9_]*$".to_string());
            }
        }

        let jwt_secret = env_or("TAXI_JWT_SECRET", "change-me-taxi-jwt");
        enforce_secret_policy(&env_lower, "TAXI_JWT_SECRET", Some(jwt_secret.as_str()), true)?;

        let mut allowed_origins = parse_csv(&env_or("ALLOWED_ORIGINS", ""));
        if allowed_origins.is_empty() {
            // Safe local default for development.
            allowed_origins = vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ];
        }
        if prod_like && allowed_origins.iter().any(|o| o.trim() == "*") {
            return Err("ALLOWED_ORIGINS must not contain '*' in prod/staging".to_string());
        }
        if prod_like
            && allowed_origins
                .iter()
                .any(|o| !o.trim().starts_with("https://"))
        {
            return Err("ALLOWED_ORIGINS must use https:// origins in prod/staging".to_string());
        }

        let max_body_bytes: usize = env_or("TAXI_MAX_BODY_BYTES", "1048576")
            .parse()
            .map_err(|_| "TAXI_MAX_BODY_BYTES must be an integer".to_string())?;
        let max_body_bytes = max_body_bytes.clamp(16 * 1024, 10 * 1024 * 1024);

        let gateway_base_url = env_opt("PAYMENT_GATEWAY_BASE_URL");
        let gateway_key_id = env_opt("PAYMENT_GATEWAY_KEY_ID");
        let gateway_key_secret = env_opt("PAYMENT_GATEWAY_KEY_SECRET");
        let gateway_provider = env_or("PAYMENT_GATEWAY_PROVIDER", "razorpay")
            .trim()
            .to_ascii_lowercase();
        if gateway_base_url.is_some()
            && (gateway_key_id.is_none() || gateway_key_secret.is_none())
        {
            return Err(
                "PAYMENT_GATEWAY_KEY_ID and PAYMENT_GATEWAY_KEY_SECRET must be set when PAYMENT_GATEWAY_BASE_URL is configured"
                    .to_string(),
            );
        }
        enforce_secret_policy(
            &env_lower,
            "PAYMENT_GATEWAY_KEY_SECRET",
            gateway_key_secret.as_deref(),
            false,
        )?;

        let notify_base_url = env_opt("NOTIFY_BASE_URL");
        let notify_from = env_opt("NOTIFY_WHATSAPP_FROM");
        let notify_token = env_opt("NOTIFY_TOKEN");
        if notify_base_url.is_some() && prod_like && notify_token.is_none() {
            return Err(
                "NOTIFY_TOKEN must be set when NOTIFY_BASE_URL is configured in prod/staging"
                    .to_string(),
            );
        }
        enforce_secret_policy(&env_lower, "NOTIFY_TOKEN", notify_token.as_deref(), false)?;

        Ok(Self {
            env_name,
            host,
            port,
            max_body_bytes,
            db_url,
            db_schema,
            jwt_secret,
            allowed_origins,
            gateway_base_url,
            gateway_key_id,
            gateway_key_secret,
            gateway_provider,
            notify_base_url,
            notify_from,
            notify_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let mut keys = keys.to_vec();
            for required in ["TAXI_MAX_BODY_BYTES", "ALLOWED_ORIGINS"] {
                if !keys.contains(&required) {
                    keys.push(required);
                }
            }
            let mut saved = Vec::with_capacity(keys.len());
            for k in keys {
                let existing = env::var(k).ok();
                saved.push((k.to_string(), existing));
                env::remove_var(k);
            }
            env::set_var("ALLOWED_ORIGINS", "https://cabs.example.com");
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in self.saved.drain(..) {
                match v {
                    Some(val) => env::set_var(k, val),
                    None => env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn rejects_non_postgres_url() {
        let _g = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let _env = EnvGuard::new(&["ENV", "TAXI_DB_URL", "DB_URL", "TAXI_JWT_SECRET"]);

        env::set_var("TAXI_DB_URL", "sqlite:////tmp/taxi.db");
        env::set_var("TAXI_JWT_SECRET", "ffffffffffffffffffffffffffffffff");

        let res = Config::from_env();
        assert!(res.is_err());
    }

    #[test]
    fn normalizes_sqlalchemy_style_urls() {
        let _g = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let _env = EnvGuard::new(&["ENV", "TAXI_DB_URL", "DB_URL", "TAXI_JWT_SECRET"]);

        env::set_var("TAXI_DB_URL", "postgresql+psycopg://u:p@localhost:5432/taxi");
        env::set_var("TAXI_JWT_SECRET", "ffffffffffffffffffffffffffffffff");

        let cfg = Config::from_env().expect("config");
        assert_eq!(cfg.db_url, "postgresql://u:p@localhost:5432/taxi");
    }

    #[test]
    fn prod_rejects_default_jwt_secret() {
        let _g = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let _env = EnvGuard::new(&["ENV", "TAXI_DB_URL", "DB_URL", "TAXI_JWT_SECRET"]);

        env::set_var("ENV", "prod");
        env::set_var("TAXI_DB_URL", "postgresql://u:p@localhost:5432/taxi");
        env::set_var("TAXI_JWT_SECRET", "change-me-taxi-jwt");

        let res = Config::from_env();
        assert!(res.is_err());
    }

    #[test]
    fn prod_rejects_short_jwt_secret() {
        let _g = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let _env = EnvGuard::new(&["ENV", "TAXI_DB_URL", "DB_URL", "TAXI_JWT_SECRET"]);

        env::set_var("ENV", "prod");
        env::set_var("TAXI_DB_URL", "postgresql://u:p@localhost:5432/taxi");
        env::set_var("TAXI_JWT_SECRET", "tooshort");

        let err = Config::from_env().expect_err("short secret must be rejected");
        assert!(err.contains("TAXI_JWT_SECRET"));
    }

    #[test]
    fn gateway_requires_key_pair_when_enabled() {
        let _g = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let _env = EnvGuard::new(&[
            "ENV",
            "TAXI_DB_URL",
            "DB_URL",
            "TAXI_JWT_SECRET",
            "PAYMENT_GATEWAY_BASE_URL",
            "PAYMENT_GATEWAY_KEY_ID",
            "PAYMENT_GATEWAY_KEY_SECRET",
        ]);

        env::set_var("TAXI_DB_URL", "postgresql://u:p@localhost:5432/taxi");
        env::set_var("TAXI_JWT_SECRET", "ffffffffffffffffffffffffffffffff");
        env::set_var("PAYMENT_GATEWAY_BASE_URL", "https://api.gateway.example");
        env::remove_var("PAYMENT_GATEWAY_KEY_ID");
        env::remove_var("PAYMENT_GATEWAY_KEY_SECRET");

        let err = Config::from_env().expect_err("gateway without keys must be rejected");
        assert!(err.contains("PAYMENT_GATEWAY_KEY_ID"));
    }

    #[test]
    fn prod_rejects_wildcard_allowed_origins() {
        let _g = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let _env = EnvGuard::new(&[
            "ENV",
            "TAXI_DB_URL",
            "DB_URL",
            "TAXI_JWT_SECRET",
            "ALLOWED_ORIGINS",
        ]);

        env::set_var("ENV", "prod");
        env::set_var("TAXI_DB_URL", "postgresql://u:p@localhost:5432/taxi");
        env::set_var("TAXI_JWT_SECRET", "ffffffffffffffffffffffffffffffff");
        env::set_var("ALLOWED_ORIGINS", "*");

        let err = Config::from_env().expect_err("wildcard origins must be rejected in prod");
        assert!(err.contains("ALLOWED_ORIGINS"));
    }

    #[test]
    fn body_limit_is_clamped_to_safe_bounds() {
        let _g = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let _env = EnvGuard::new(&["ENV", "TAXI_DB_URL", "DB_URL", "TAXI_JWT_SECRET"]);

        env::set_var("ENV", "dev");
        env::set_var("TAXI_DB_URL", "postgresql://u:p@localhost:5432/taxi");
        env::set_var("TAXI_JWT_SECRET", "ffffffffffffffffffffffffffffffff");

        env::set_var("TAXI_MAX_BODY_BYTES", "1");
        let cfg = Config::from_env().expect("config");
        assert_eq!(cfg.max_body_bytes, 16 * 1024);

        env::set_var("TAXI_MAX_BODY_BYTES", "999999999");
        let cfg = Config::from_env().expect("config");
        assert_eq!(cfg.max_body_bytes, 10 * 1024 * 1024);
    }
}
