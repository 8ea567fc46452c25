//! Interception rules: which requests to take over and who handles them.
//!
//! Rules are built once at startup and shared read-only by every request.

use std::sync::Arc;

use crate::classifier::PathMatcher;
use crate::config::RuleConfig;
use crate::handlers::InterceptHandler;

/// Associates a path matcher with the handler that processes matching requests.
#[derive(Clone)]
pub struct InterceptionRule {
    name: String,
    matcher: PathMatcher,
    handler: Arc<dyn InterceptHandler>,
}

impl InterceptionRule {
    /// Rule named `{marker}/{resource_type}`.
    pub fn new(matcher: PathMatcher, handler: Arc<dyn InterceptHandler>) -> Self {
        let name = format!("{}/{}", matcher.marker(), matcher.resource_type());
        Self {
            name,
            matcher,
            handler,
        }
    }

    pub fn from_config(cfg: &RuleConfig, client: &reqwest::Client) -> Self {
        let matcher =
            PathMatcher::with_offset(&cfg.resource_type, &cfg.marker, cfg.marker_offset);
        Self::new(matcher, cfg.handler.build(client))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource type the parsed body must declare.
    pub fn resource_type(&self) -> &str {
        self.matcher.resource_type()
    }

    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }

    pub fn handler(&self) -> &Arc<dyn InterceptHandler> {
        &self.handler
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }
}

impl std::fmt::Debug for InterceptionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionRule")
            .field("name", &self.name)
            .field("matcher", &self.matcher)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// Ordered, immutable collection of rules. The first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Arc<[InterceptionRule]>,
}

impl RuleSet {
    pub fn new(rules: Vec<InterceptionRule>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    pub fn from_config(rules: &[RuleConfig], client: &reqwest::Client) -> Self {
        Self::new(
            rules
                .iter()
                .map(|cfg| InterceptionRule::from_config(cfg, client))
                .collect(),
        )
    }

    /// Rule covering `path`, if any.
    pub fn classify(&self, path: &str) -> Option<&InterceptionRule> {
        self.rules.iter().find(|rule| rule.matches(path))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterceptionRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
