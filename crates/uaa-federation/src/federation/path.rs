//! Configuration path templates.
//!
//! Configuration documents are addressed by paths such as
//! `/config/tenants/{tenant}/idp-config.yml`. A [`PathTemplate`] compiles such
//! a template into an anchored matcher that extracts the placeholder values.

use regex::Regex;

use crate::config::{CLIENT_PLACEHOLDER, ConfigError, TENANT_PLACEHOLDER};
use crate::types::{ClientKey, TenantKey};

/// Values captured from a concrete configuration path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// Tenant the document belongs to.
    pub tenant: TenantKey,
    /// Client key, for templates that contain `{client}`.
    pub client: Option<ClientKey>,
}

/// A compiled configuration path template.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    template: String,
    pattern: Regex,
}

impl PathTemplate {
    /// Compiles a template. Placeholders match exactly one path segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the template has no `{tenant}` placeholder.
    pub fn compile(template: &str) -> Result<Self, ConfigError> {
        if !template.contains(TENANT_PLACEHOLDER) {
            return Err(ConfigError::InvalidValue(format!(
                "path template '{template}' must contain {TENANT_PLACEHOLDER}"
            )));
        }

        let mut pattern = String::from("^");
        let mut rest = template;
        while let Some(start) = rest.find('{') {
            let (literal, tail) = rest.split_at(start);
            pattern.push_str(&regex::escape(literal));

            if let Some(tail) = tail.strip_prefix(TENANT_PLACEHOLDER) {
                pattern.push_str("(?P<tenant>[^/]+)");
                rest = tail;
            } else if let Some(tail) = tail.strip_prefix(CLIENT_PLACEHOLDER) {
                pattern.push_str("(?P<client>[^/]+)");
                rest = tail;
            } else {
                pattern.push_str(&regex::escape("{"));
                rest = &tail[1..];
            }
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        let pattern = Regex::new(&pattern)
            .map_err(|e| ConfigError::InvalidValue(format!("path template '{template}': {e}")))?;

        Ok(Self {
            template: template.to_string(),
            pattern,
        })
    }

    /// Matches a concrete path against the template.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        let captures = self.pattern.captures(path)?;
        let tenant = TenantKey::new(captures.name("tenant")?.as_str());
        let client = captures
            .name("client")
            .map(|m| ClientKey::new(m.as_str()));
        Some(PathMatch { tenant, client })
    }

    /// Returns `true` if `path` matches the template.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    /// Renders the template for a tenant and optional client.
    #[must_use]
    pub fn render(&self, tenant: &TenantKey, client: Option<&ClientKey>) -> String {
        let path = self.template.replace(TENANT_PLACEHOLDER, tenant.as_str());
        match client {
            Some(client) => path.replace(CLIENT_PLACEHOLDER, client.as_str()),
            None => path,
        }
    }

    /// Returns the raw template.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }
}
