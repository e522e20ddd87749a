use clap::Parser;
use ctf_client::{driver, Controller, ControllerConfig, RateLimitConfig, SessionConfig};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game server address (host:port)
    #[arg(short = 's', long, default_value = "localhost:8080")]
    server: String,

    /// Maximum tool calls per rate-limit period
    #[arg(long, default_value = "10")]
    rate_limit_calls: usize,

    /// Rate-limit period in seconds
    #[arg(long, default_value = "1.0")]
    rate_limit_period: f64,

    /// Disable rate limiting entirely
    #[arg(long)]
    disable_rate_limit: bool,

    /// How long to wait for a join rejection, in milliseconds
    #[arg(long, default_value = "100")]
    join_grace_ms: u64,

    /// Append event records to this file
    #[arg(long, env = "CTF_EVENT_LOG")]
    event_log: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<ControllerConfig, Box<dyn std::error::Error>> {
        if !(self.rate_limit_period.is_finite() && self.rate_limit_period > 0.0) {
            return Err(format!(
                "--rate-limit-period must be a positive number of seconds (got {})",
                self.rate_limit_period
            )
            .into());
        }
        let period = Duration::try_from_secs_f64(self.rate_limit_period).map_err(|e| {
            format!(
                "--rate-limit-period {} is out of range: {}",
                self.rate_limit_period, e
            )
        })?;

        let mut session = SessionConfig::new(self.server);
        session.join_grace = Duration::from_millis(self.join_grace_ms);

        Ok(ControllerConfig {
            session,
            rate_limit: RateLimitConfig {
                calls: self.rate_limit_calls,
                period,
                enabled: !self.disable_rate_limit,
            },
            event_log: self.event_log,
            ..ControllerConfig::default()
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Args::parse().into_config()?;

    info!("Starting controller for {}", config.session.server);
    if config.rate_limit.enabled {
        info!(
            "Rate limiting: {} calls per {:.1} seconds",
            config.rate_limit.calls,
            config.rate_limit.period.as_secs_f64()
        );
    } else {
        info!("Rate limiting: disabled");
    }
    if let Some(path) = &config.event_log {
        info!("Event log: {}", path.display());
    }

    let controller = Arc::new(Controller::new(config));
    driver::run(
        controller,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    info!("Controller stopped");
    Ok(())
}
