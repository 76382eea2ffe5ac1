/// A required configuration value is missing or invalid.
///
/// This is fatal and is raised before any virtual user is started.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("Invalid configuration for `{key}`: {reason}")]
pub struct ConfigurationError {
    key: String,
    reason: String,
}

impl ConfigurationError {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// The stage sequence cannot be scheduled.
///
/// Like [ConfigurationError], this is fatal and is raised before any virtual user is started.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerInvariantError {
    #[display("Stage `{stage}` has a negative duration")]
    NegativeDuration { stage: String },
    #[display("Stage `{stage}` has a negative target")]
    NegativeTarget { stage: String },
    #[display("Stage `{stage}` is not in the form `<duration>:<target>`, for example `30s:100`")]
    Malformed { stage: String },
    #[display("At least one stage is required")]
    NoStages,
    #[display("The stages last longer than can be scheduled")]
    TooLong,
}
