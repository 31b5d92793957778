//! # Skyloc environment state
//!
//! This module defines [`crate::env_state::SkylocEnv`], the **network environment** used by
//! the external-grid skymap strategy. It holds:
//!
//! - A persistent **HTTP client** ([`ureq::Agent`]) with a global request timeout.
//! - The **retry policy** applied to remote FITS downloads.
//!
//! The object is cheap to clone and is shared by the [`Skyloc`](crate::skyloc::Skyloc) façade.
//!
//! ## Structure
//!
//! ```text
//! SkylocEnv
//! ├── http_client (ureq::Agent)
//! ├── retries     (u32)
//! └── backoff     (Duration, multiplied by the attempt number)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use skyloc::{config::SkylocConfig, env_state::SkylocEnv};
//!
//! let env = SkylocEnv::new(&SkylocConfig::default());
//! let bytes = env
//!     .get_bytes_from_url("https://gracedb.ligo.org/api/superevents/S190425z/files/bayestar.fits.gz")
//!     .unwrap();
//! println!("{} bytes", bytes.len());
//! ```
//!
//! ## Notes
//!
//! - Only the last failure is reported, wrapped in [`SkylocError::FetchFailure`].
//! - Response bodies are read without size limit: flat HEALPix maps at high resolution
//!   are routinely larger than the default `ureq` body limit.
use std::{thread, time::Duration};

use tracing::{debug, warn};
use ureq::Agent;

use crate::{config::SkylocConfig, skyloc_errors::SkylocError};

#[derive(Debug, Clone)]
pub struct SkylocEnv {
    pub http_client: Agent,
    retries: u32,
    backoff: Duration,
}

impl Default for SkylocEnv {
    fn default() -> Self {
        Self::new(&SkylocConfig::default())
    }
}

impl SkylocEnv {
    /// Create a new environment
    ///
    /// Argument
    /// --------
    /// * `config`: timeout, retry count and backoff of the downloads
    ///
    /// Return
    /// ------
    /// * A new environment with an HTTP client configured with the global timeout
    pub fn new(config: &SkylocConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.fetch_timeout_secs)))
            .build();
        let agent: Agent = agent_config.into();

        SkylocEnv {
            http_client: agent,
            retries: config.fetch_retries,
            backoff: Duration::from_millis(config.fetch_backoff_ms),
        }
    }

    fn fetch_once(&self, url: &str) -> Result<Vec<u8>, ureq::Error> {
        self.http_client
            .get(url)
            .call()?
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
    }

    /// Download a resource, retrying on failure.
    ///
    /// Argument
    /// --------
    /// * `url`: the resource location
    ///
    /// Return
    /// ------
    /// * The response body
    /// * [`SkylocError::FetchFailure`] with the last error once every attempt failed
    pub fn get_bytes_from_url(&self, url: &str) -> Result<Vec<u8>, SkylocError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url) {
                Ok(bytes) => {
                    debug!(url, bytes = bytes.len(), attempt, "downloaded resource");
                    return Ok(bytes);
                }
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    warn!(url, attempt, error = %err, "download failed, retrying");
                    thread::sleep(self.backoff * attempt);
                }
                Err(err) => {
                    warn!(url, attempt, error = %err, "download failed");
                    return Err(SkylocError::FetchFailure {
                        url: url.to_string(),
                        source: err,
                    });
                }
            }
        }
    }
}
