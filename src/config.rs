//! Reader configuration.

use crate::consumer::ConsumerFactory;
use crate::error::{CdcError, Result};
use crate::session::LogSession;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Tuning knobs of the polling loop.
///
/// The defaults favor correctness over latency; lower the delays and the
/// confidence window only if the cluster's clock skew allows it.
#[derive(Debug, Clone)]
pub struct AdvancedReaderConfig {
    /// Maximum span of one range query, measured in embedded-timestamp
    /// time.
    pub query_window: Duration,
    /// Lag behind `now` before rows are considered stable enough to read.
    /// Zero reads up to `now`.
    pub confidence_window: Duration,
    /// Sleep after a tick that consumed at least one row.
    pub post_non_empty_query_delay: Duration,
    /// Sleep after a tick that consumed no rows.
    pub post_empty_query_delay: Duration,
    /// Sleep after a tick whose query or close failed.
    pub post_failed_query_delay: Duration,
    /// Default age of the initial cursor when the caller has no saved
    /// progress; not consumed inside the loop.
    pub change_age_limit: Duration,
}

impl Default for AdvancedReaderConfig {
    fn default() -> Self {
        Self {
            query_window: Duration::from_secs(30),
            confidence_window: Duration::from_secs(30),
            post_non_empty_query_delay: Duration::from_secs(10),
            post_empty_query_delay: Duration::from_secs(30),
            post_failed_query_delay: Duration::from_secs(1),
            change_age_limit: Duration::from_secs(60),
        }
    }
}

impl AdvancedReaderConfig {
    /// Create a new builder.
    pub fn builder() -> AdvancedReaderConfigBuilder {
        AdvancedReaderConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.query_window.is_zero() {
            return Err(CdcError::config("query window must be > 0"));
        }
        if self.post_non_empty_query_delay.is_zero()
            || self.post_empty_query_delay.is_zero()
            || self.post_failed_query_delay.is_zero()
        {
            return Err(CdcError::config("post-query delays must be > 0"));
        }
        Ok(())
    }
}

/// Builder for [`AdvancedReaderConfig`].
#[derive(Debug, Default)]
pub struct AdvancedReaderConfigBuilder {
    query_window: Option<Duration>,
    confidence_window: Option<Duration>,
    post_non_empty_query_delay: Option<Duration>,
    post_empty_query_delay: Option<Duration>,
    post_failed_query_delay: Option<Duration>,
    change_age_limit: Option<Duration>,
}

impl AdvancedReaderConfigBuilder {
    /// Set the maximum span of one range query.
    pub fn query_window(mut self, d: Duration) -> Self {
        self.query_window = Some(d);
        self
    }

    /// Set the confidence lag behind `now`.
    pub fn confidence_window(mut self, d: Duration) -> Self {
        self.confidence_window = Some(d);
        self
    }

    /// Set the sleep after a tick that consumed rows.
    pub fn post_non_empty_query_delay(mut self, d: Duration) -> Self {
        self.post_non_empty_query_delay = Some(d);
        self
    }

    /// Set the sleep after a tick that consumed nothing.
    pub fn post_empty_query_delay(mut self, d: Duration) -> Self {
        self.post_empty_query_delay = Some(d);
        self
    }

    /// Set the sleep after a failed tick.
    pub fn post_failed_query_delay(mut self, d: Duration) -> Self {
        self.post_failed_query_delay = Some(d);
        self
    }

    /// Set the default initial cursor age.
    pub fn change_age_limit(mut self, d: Duration) -> Self {
        self.change_age_limit = Some(d);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<AdvancedReaderConfig> {
        let default = AdvancedReaderConfig::default();
        let config = AdvancedReaderConfig {
            query_window: self.query_window.unwrap_or(default.query_window),
            confidence_window: self.confidence_window.unwrap_or(default.confidence_window),
            post_non_empty_query_delay: self
                .post_non_empty_query_delay
                .unwrap_or(default.post_non_empty_query_delay),
            post_empty_query_delay: self
                .post_empty_query_delay
                .unwrap_or(default.post_empty_query_delay),
            post_failed_query_delay: self
                .post_failed_query_delay
                .unwrap_or(default.post_failed_query_delay),
            change_age_limit: self.change_age_limit.unwrap_or(default.change_age_limit),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Everything a shard reader needs besides its stream set and cursor.
#[derive(Clone)]
pub struct ReaderConfig {
    /// Shared database session.
    pub session: Arc<dyn LogSession>,
    /// Factory producing one consumer per shard reader.
    pub consumer_factory: Arc<dyn ConsumerFactory>,
    /// Loop tuning.
    pub advanced: AdvancedReaderConfig,
}

impl ReaderConfig {
    /// Create a config with default advanced options.
    pub fn new(session: Arc<dyn LogSession>, consumer_factory: Arc<dyn ConsumerFactory>) -> Self {
        Self {
            session,
            consumer_factory,
            advanced: AdvancedReaderConfig::default(),
        }
    }

    /// Replace the advanced options.
    pub fn with_advanced(mut self, advanced: AdvancedReaderConfig) -> Self {
        self.advanced = advanced;
        self
    }
}

impl fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("advanced", &self.advanced)
            .finish_non_exhaustive()
    }
}
