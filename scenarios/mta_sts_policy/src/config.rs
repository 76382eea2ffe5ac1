use http_client_instrumented::prelude::Url;
use volley_core::prelude::ConfigurationError;

/// Path of the policy file, relative to `BASE_URL`.
pub const POLICY_PATH: &str = "/.well-known/mta-sts.txt";

/// Values the scenario reads from the environment once, at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    policy_url: Url,
    domain: String,
    mx: String,
}

impl ScenarioConfig {
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from `lookup`, which returns the value of a variable if it is set.
    ///
    /// `BASE_URL` is required and must be an absolute http or https URL. `DOMAIN` and `MX` default
    /// to empty, with a warning, and must not start or end with a `.` when they are set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigurationError> {
        let base_url = lookup("BASE_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigurationError::new("BASE_URL", "must be set"))?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| ConfigurationError::new("BASE_URL", format!("not a valid URL: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigurationError::new(
                "BASE_URL",
                format!("must be an http or https URL, got scheme [{}]", base_url.scheme()),
            ));
        }

        Ok(Self {
            policy_url: policy_url(&base_url),
            domain: optional_name(&lookup, "DOMAIN")?,
            mx: optional_name(&lookup, "MX")?,
        })
    }

    /// `BASE_URL` with [POLICY_PATH] appended to its path.
    pub fn policy_url(&self) -> &Url {
        &self.policy_url
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn mx(&self) -> &str {
        &self.mx
    }
}

fn policy_url(base_url: &Url) -> Url {
    let mut url = base_url.clone();
    let path = format!("{}{}", base_url.path().trim_end_matches('/'), POLICY_PATH);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn optional_name(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String, ConfigurationError> {
    let value = lookup(key).unwrap_or_default();
    if value.is_empty() {
        log::warn!("{key} is not set, using an empty value");
        return Ok(value);
    }

    if value.starts_with('.') || value.ends_with('.') {
        return Err(ConfigurationError::new(
            key,
            format!("[{value}] must not start or end with a '.'"),
        ));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn reads_all_values() {
        let config = ScenarioConfig::from_lookup(lookup_from(&[
            ("BASE_URL", "http://app:8080"),
            ("DOMAIN", "example.com"),
            ("MX", "mail.example.com"),
        ]))
        .unwrap();

        assert_eq!(
            "http://app:8080/.well-known/mta-sts.txt",
            config.policy_url().as_str()
        );
        assert_eq!("example.com", config.domain());
        assert_eq!("mail.example.com", config.mx());
    }

    #[test]
    fn keeps_base_path() {
        let config = ScenarioConfig::from_lookup(lookup_from(&[(
            "BASE_URL",
            "https://proxy.example.com/mta/?debug=1",
        )]))
        .unwrap();

        assert_eq!(
            "https://proxy.example.com/mta/.well-known/mta-sts.txt",
            config.policy_url().as_str()
        );
    }

    #[test]
    fn missing_names_default_to_empty() {
        let config =
            ScenarioConfig::from_lookup(lookup_from(&[("BASE_URL", "http://localhost")])).unwrap();

        assert_eq!("", config.domain());
        assert_eq!("", config.mx());
    }

    #[test]
    fn base_url_is_required() {
        let err = ScenarioConfig::from_lookup(lookup_from(&[("MX", "mail.example.com")]))
            .unwrap_err();
        assert_eq!("BASE_URL", err.key());

        let err = ScenarioConfig::from_lookup(lookup_from(&[("BASE_URL", "  ")])).unwrap_err();
        assert_eq!("BASE_URL", err.key());
    }

    #[test]
    fn base_url_must_be_http() {
        for base_url in ["app:8080/policy", "ftp://app", "not a url"] {
            let err = ScenarioConfig::from_lookup(lookup_from(&[("BASE_URL", base_url)]))
                .unwrap_err();
            assert_eq!("BASE_URL", err.key(), "{base_url}");
        }
    }

    #[test]
    fn names_must_not_have_outer_dots() {
        let err = ScenarioConfig::from_lookup(lookup_from(&[
            ("BASE_URL", "http://localhost"),
            ("MX", ".mail.example.com"),
        ]))
        .unwrap_err();
        assert_eq!("MX", err.key());

        let err = ScenarioConfig::from_lookup(lookup_from(&[
            ("BASE_URL", "http://localhost"),
            ("DOMAIN", "example.com."),
        ]))
        .unwrap_err();
        assert_eq!("DOMAIN", err.key());
    }
}
