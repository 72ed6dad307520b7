use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub cashflows: CashflowsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Tokens are issued by the account service; this service only verifies them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    /// First order number handed out on an empty database.
    pub order_number_start: i64,
    /// Draw attempts allowed per requested ticket before allocation gives up.
    pub allocation_attempt_factor: u32,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            order_number_start: 1000,
            allocation_attempt_factor: 50,
            currency: "GBP".to_string(),
            success_url: "http://localhost:3000/payment/success".to_string(),
            cancel_url: "http://localhost:3000/payment/cancel".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CashflowsConfig {
    pub merchant_id: String,
    pub api_key: String,
    pub api_secret: String,
    pub gateway_url: String,
    pub webhook_secret: String,
}

impl Default for CashflowsConfig {
    fn default() -> Self {
        Self {
            merchant_id: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            gateway_url: "https://gateway.cashflows.com".to_string(),
            webhook_secret: String::new(),
        }
    }
}

impl CashflowsConfig {
    pub fn is_configured(&self) -> bool {
        !self.merchant_id.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let mut config: Config = match std::fs::read_to_string(&config_path) {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("解析配置文件失败: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // 数据库 URL 在无配置文件时必须提供
                let database_url = env::var("DATABASE_URL")
                    .map_err(|_| "缺少 DATABASE_URL 环境变量，且未找到配置文件 config.toml")?;

                Config {
                    server: ServerConfig {
                        host: "0.0.0.0".to_string(),
                        port: 8080,
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: 10,
                    },
                    jwt: JwtConfig {
                        secret: "change-me-in-production".to_string(),
                    },
                    checkout: CheckoutConfig::default(),
                    cashflows: CashflowsConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// 环境变量覆盖（即便文件存在时也覆盖）
    fn apply_env_overrides(&mut self) {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            env::var(name).ok().and_then(|v| v.parse::<T>().ok())
        }

        if let Ok(v) = env::var("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(p) = parsed("SERVER_PORT") {
            self.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(mc) = parsed("DB_MAX_CONNECTIONS") {
            self.database.max_connections = mc;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.jwt.secret = v;
        }

        // Checkout
        if let Some(n) = parsed("ORDER_NUMBER_START") {
            self.checkout.order_number_start = n;
        }
        if let Some(n) = parsed::<u32>("ALLOCATION_ATTEMPT_FACTOR")
            && n > 0
        {
            self.checkout.allocation_attempt_factor = n;
        }
        if let Ok(v) = env::var("PAYMENT_CURRENCY") {
            self.checkout.currency = v;
        }
        if let Ok(v) = env::var("PAYMENT_SUCCESS_URL") {
            self.checkout.success_url = v;
        }
        if let Ok(v) = env::var("PAYMENT_CANCEL_URL") {
            self.checkout.cancel_url = v;
        }

        // Cashflows
        if let Ok(v) = env::var("CASHFLOWS_MERCHANT_ID") {
            self.cashflows.merchant_id = v;
        }
        if let Ok(v) = env::var("CASHFLOWS_API_KEY") {
            self.cashflows.api_key = v;
        }
        if let Ok(v) = env::var("CASHFLOWS_API_SECRET") {
            self.cashflows.api_secret = v;
        }
        if let Ok(v) = env::var("CASHFLOWS_GATEWAY_URL") {
            self.cashflows.gateway_url = v;
        }
        if let Ok(v) = env::var("CASHFLOWS_WEBHOOK_SECRET") {
            self.cashflows.webhook_secret = v;
        }
    }
}
