// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment configuration.

use thiserror::Error;

use crate::path::PathConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_host: String,
    pub redis_port: u16,
    pub database_url: String,
    pub s3_bucket: String,
    pub aws_region: String,
    /// Unset in development; the secret store then refuses to encrypt.
    pub kms_key_id: Option<String>,
    /// System fallback model key for early-access tenants.
    pub anthropic_api_key: Option<String>,
    pub jwt_secret: String,
    pub log_level: String,

    pub heartbeat_offline_secs: u64,
    pub session_ttl_secs: u64,
    pub presign_ttl_secs: u64,
    pub secret_cache_ttl_secs: u64,
    pub log_blob_threshold_bytes: usize,

    /// Model token prices, micro-USD per token.
    pub input_price_micros: i64,
    pub output_price_micros: i64,
    /// Worst-case cost reserved before each call, micro-USD.
    pub forecast_cost_micros: i64,
    /// Attempts against the model before overload is promoted.
    pub ai_max_attempts: u32,

    pub path: PathConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            redis_host: var_or("REDIS_HOST", "127.0.0.1"),
            redis_port: parse_var("REDIS_PORT", 6379)?,
            database_url: require("DATABASE_URL")?,
            s3_bucket: require("S3_BUCKET")?,
            aws_region: var_or("AWS_REGION", "eu-west-1"),
            kms_key_id: optional("KMS_KEY_ID"),
            anthropic_api_key: optional("ANTHROPIC_API_KEY"),
            jwt_secret: require("JWT_SECRET")?,
            log_level: var_or("LOG_LEVEL", "info"),
            heartbeat_offline_secs: parse_var("FL_HEARTBEAT_OFFLINE_SECS", 120)?,
            session_ttl_secs: parse_var("FL_SESSION_TTL_SECS", 7200)?,
            presign_ttl_secs: parse_var("FL_PRESIGN_TTL_SECS", 900)?,
            secret_cache_ttl_secs: parse_var("FL_SECRET_CACHE_TTL_SECS", 300)?,
            log_blob_threshold_bytes: parse_var("FL_LOG_BLOB_THRESHOLD_BYTES", 50 * 1024)?,
            input_price_micros: parse_var("FL_INPUT_PRICE_MICROS", 3)?,
            output_price_micros: parse_var("FL_OUTPUT_PRICE_MICROS", 15)?,
            forecast_cost_micros: parse_var("FL_FORECAST_COST_MICROS", 150_000)?,
            ai_max_attempts: parse_var("FL_AI_MAX_ATTEMPTS", 5)?,
            path: PathConfig::default(),
        })
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/0", self.redis_host, self.redis_port)
    }

    /// Cost of one model call in micro-USD.
    pub fn call_cost_micros(&self, input_tokens: u64, output_tokens: u64) -> i64 {
        input_tokens as i64 * self.input_price_micros
            + output_tokens as i64 * self.output_price_micros
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingVar(var))
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

fn var_or(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
