use regex::Regex;
use smallvec::SmallVec;
use std::sync::Arc;

use crate::error::{Error, Result};

const GROUP_PREFIX: &str = "tlp";

/// Path captures; most templates have very few parameters.
pub type ParamVec = SmallVec<[(Arc<str>, String); 8]>;

/// Values a route pattern captured from a request path, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    params: ParamVec,
}

impl Captures {
    /// Capture by position, 0-based.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(|(_, v)| v.as_str())
    }

    /// Capture by parameter name. The last occurrence wins when a name repeats.
    #[must_use]
    pub fn name(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }
}

/// A compiled route template such as `/things/{id}` or `/things/{id:[0-9]+}`.
///
/// Templates are split on `/`. A segment wrapped in braces is a parameter,
/// optionally followed by `:regex` to constrain it; every other segment is
/// matched literally. The whole path must match.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: Arc<str>,
    regex: Regex,
    names: Vec<Arc<str>>,
    /// Capture group index of each parameter
    groups: Vec<usize>,
}

impl RoutePattern {
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for a template that does not start with `/`,
    /// a malformed or empty parameter, or a constraint that is not a valid regex.
    pub fn compile(template: &str) -> Result<Self> {
        if !template.starts_with('/') {
            return Err(Error::invalid(format!(
                "route template '{template}' must start with '/'"
            )));
        }

        let mut pattern = String::with_capacity(template.len() + 8);
        pattern.push('^');
        let mut names = Vec::with_capacity(template.matches('{').count());

        for segment in template.split('/').filter(|s| !s.is_empty()) {
            pattern.push('/');
            if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                let (name, constraint) = match inner.split_once(':') {
                    Some((name, re)) => (name, re),
                    None => (inner, "[^/]+"),
                };
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(Error::invalid(format!(
                        "bad parameter name '{name}' in route template '{template}'"
                    )));
                }
                if constraint.is_empty() {
                    return Err(Error::invalid(format!(
                        "empty constraint for '{name}' in route template '{template}'"
                    )));
                }
                pattern.push_str(&format!("(?P<{GROUP_PREFIX}{}>", names.len()));
                pattern.push_str(constraint);
                pattern.push(')');
                names.push(Arc::from(name));
            } else if segment.contains('{') || segment.contains('}') {
                return Err(Error::invalid(format!(
                    "parameter must span a whole segment in route template '{template}'"
                )));
            } else {
                pattern.push_str(&regex::escape(segment));
            }
        }

        if names.is_empty() && pattern.len() == 1 {
            pattern.push('/');
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|e| {
            Error::invalid(format!("route template '{template}' does not compile: {e}"))
        })?;

        // Constraints may add their own groups, so look parameters up by name.
        let mut groups = vec![0; names.len()];
        for (idx, group) in regex.capture_names().enumerate() {
            if let Some(n) = group
                .and_then(|g| g.strip_prefix(GROUP_PREFIX))
                .and_then(|n| n.parse::<usize>().ok())
            {
                if let Some(slot) = groups.get_mut(n) {
                    *slot = idx;
                }
            }
        }

        Ok(Self {
            template: Arc::from(template),
            regex,
            names,
            groups,
        })
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    pub(crate) fn template_arc(&self) -> Arc<str> {
        Arc::clone(&self.template)
    }

    /// Parameter names in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(AsRef::as_ref)
    }

    /// Match `path`, returning its captures.
    #[must_use]
    pub fn captures(&self, path: &str) -> Option<Captures> {
        let caps = self.regex.captures(path)?;
        let mut params = ParamVec::new();
        for (name, group) in self.names.iter().zip(&self.groups) {
            if let Some(m) = caps.get(*group) {
                params.push((Arc::clone(name), m.as_str().to_string()));
            }
        }
        Some(Captures { params })
    }

    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}
