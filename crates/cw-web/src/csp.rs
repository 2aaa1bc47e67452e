//! Content-Security-Policy header construction.

use std::fmt;

/// An ordered list of CSP directives and their sources.
///
/// Directive order is preserved and sources are deduplicated per directive,
/// so the rendered header is stable across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    directives: Vec<(String, Vec<String>)>,
}

impl ContentSecurityPolicy {
    /// The application's baseline policy.
    ///
    /// With a nonce, `script-src` only trusts scripts carrying that nonce
    /// (and what they load); without one it falls back to inline scripts.
    #[must_use]
    pub fn baseline(nonce: Option<&str>) -> Self {
        let script_src = match nonce {
            Some(nonce) => vec![
                "'self'".to_string(),
                format!("'nonce-{nonce}'"),
                "'strict-dynamic'".to_string(),
            ],
            None => vec![
                "'self'".to_string(),
                "'unsafe-inline'".to_string(),
                "'unsafe-eval'".to_string(),
            ],
        };

        let mut policy = Self {
            directives: Vec::new(),
        };
        policy.push("default-src", &["'self'"]);
        policy.directives.push(("script-src".to_string(), script_src));
        policy.push("style-src", &["'self'", "'unsafe-inline'"]);
        policy.push("img-src", &["'self'", "data:", "blob:", "https:"]);
        policy.push("font-src", &["'self'", "data:"]);
        policy.push("connect-src", &["'self'"]);
        policy.push("frame-ancestors", &["'none'"]);
        policy.push("base-uri", &["'self'"]);
        policy.push("form-action", &["'self'"]);
        policy.push("object-src", &["'none'"]);
        policy
    }

    fn push(&mut self, directive: &str, sources: &[&str]) {
        self.directives.push((
            directive.to_string(),
            sources.iter().map(ToString::to_string).collect(),
        ));
    }

    /// Add a source to a directive, creating the directive if needed.
    #[must_use]
    pub fn with_source(mut self, directive: &str, source: &str) -> Self {
        match self.directives.iter_mut().find(|(name, _)| name == directive) {
            Some((_, sources)) => {
                if !sources.iter().any(|s| s == source) {
                    sources.push(source.to_string());
                }
            }
            None => self
                .directives
                .push((directive.to_string(), vec![source.to_string()])),
        }
        self
    }

    /// Send violation reports to `uri`.
    #[must_use]
    pub fn with_report_uri(mut self, uri: &str) -> Self {
        self.directives.retain(|(name, _)| name != "report-uri");
        self.directives
            .push(("report-uri".to_string(), vec![uri.to_string()]));
        self
    }

    #[must_use]
    pub fn upgrade_insecure_requests(mut self) -> Self {
        if !self
            .directives
            .iter()
            .any(|(name, _)| name == "upgrade-insecure-requests")
        {
            self.directives
                .push(("upgrade-insecure-requests".to_string(), Vec::new()));
        }
        self
    }

    /// Sources configured for `directive`, if present.
    #[must_use]
    pub fn sources(&self, directive: &str) -> Option<&[String]> {
        self.directives
            .iter()
            .find(|(name, _)| name == directive)
            .map(|(_, sources)| sources.as_slice())
    }
}

impl fmt::Display for ContentSecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, sources)) in self.directives.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            f.write_str(name)?;
            for source in sources {
                write!(f, " {source}")?;
            }
        }
        Ok(())
    }
}

/// Build the baseline Content-Security-Policy header value.
#[must_use]
pub fn build_csp_header(nonce: Option<&str>) -> String {
    ContentSecurityPolicy::baseline(nonce).to_string()
}
