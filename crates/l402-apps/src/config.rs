//! Runtime configuration and the marketplace price sheet.

use clap::Parser;

/// One-time cost of listing an app, in sats.
pub const APP_SUBMISSION_PRICE_SATS: u64 = 100;
/// Reward paid out to the submitter of a verified L402 API.
pub const API_SUBMISSION_REWARD_SATS: u64 = 10;
/// Price of reading the apps/APIs directories.
pub const API_GET_PRICE_SATS: u64 = 10;
/// First boost costs this much; subsequent boosts scale quadratically.
pub const BASE_BOOST_SATS: u64 = 21;
/// Boosts stay active this long.
pub const BOOST_DURATION_HOURS: i64 = 24;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 3000, env = "PORT")]
    pub port: u16,

    /// LND REST host, e.g. `https://mynode.m.voltageapp.io:8080`.
    /// Payment features are disabled when unset.
    #[arg(long, env = "LND_REST_HOST")]
    pub lnd_rest_host: Option<String>,

    /// Hex-encoded invoice macaroon for the LND REST API.
    #[arg(long, env = "LND_MACAROON_HEX")]
    pub lnd_macaroon_hex: Option<String>,

    /// Verify the LND TLS certificate. Off by default; most nodes present a
    /// self-signed cert.
    #[arg(long, default_value_t = false, env = "LND_TLS_VERIFY")]
    pub lnd_tls_verify: bool,

    /// Secret for minting and verifying L402 tokens. Every instance behind the
    /// same deployment must share it.
    #[arg(long, env = "MACAROON_SECRET")]
    pub macaroon_secret: Option<String>,

    /// PostgREST base URL (Supabase project REST endpoint). Falls back to
    /// in-memory storage when unset.
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Service-role key for the PostgREST endpoint.
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY")]
    pub supabase_service_role_key: Option<String>,

    /// Resend API key for notification emails. Notifications are skipped
    /// when unset.
    #[arg(long, env = "RESEND_API_KEY")]
    pub resend_api_key: Option<String>,

    /// Sender address for notification emails.
    #[arg(long, default_value = "onboarding@resend.dev", env = "RESEND_FROM")]
    pub resend_from: String,

    /// Recipient for notification emails.
    #[arg(long, env = "RESEND_TO")]
    pub resend_to: Option<String>,

    /// Channel balance, in sats, below which a low-balance alert fires.
    #[arg(long, default_value_t = 1000, env = "LOW_BALANCE_THRESHOLD")]
    pub low_balance_threshold: u64,

    /// Lottery house cut as a fraction of the pot.
    #[arg(long, default_value_t = 0.0, env = "LOTTERY_HOUSE_CUT")]
    pub lottery_house_cut: f64,
}

/// Accepts hosts with or without a scheme, normalizing to an https URL with no
/// trailing slash.
pub fn normalize_host(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}
