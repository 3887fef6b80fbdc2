//! Host environment facts and the construction-time snapshot
//!
//! The SDK never reads ambient globals. Everything it knows about the
//! client comes from a [`HostEnvironment`] handed to the tracker:
//! the facts read once at construction (user agent, referrer) and the
//! current location, read again whenever an event needs a path.

use std::sync::RwLock;

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::TrackerResult;

/// A parsed page location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Full URL
    pub href: String,

    /// Hostname plus non-default port
    pub host: String,

    /// Path component, without query or fragment
    pub pathname: String,
}

impl Location {
    /// Split an absolute URL into its parts.
    ///
    /// Input that does not parse as an absolute URL keeps `href` and
    /// leaves `host` and `pathname` empty.
    pub fn parse(href: &str) -> Self {
        match Url::parse(href) {
            Ok(url) => {
                let host = match (url.host_str(), url.port()) {
                    (Some(h), Some(port)) => format!("{}:{}", h, port),
                    (Some(h), None) => h.to_string(),
                    (None, _) => String::new(),
                };
                Self {
                    href: href.to_string(),
                    host,
                    pathname: url.path().to_string(),
                }
            }
            Err(_) => Self {
                href: href.to_string(),
                ..Self::default()
            },
        }
    }

    /// Resolve a possibly relative reference against this location
    pub fn join(&self, reference: &str) -> Self {
        match Url::parse(&self.href).and_then(|base| base.join(reference)) {
            Ok(url) => Self::parse(url.as_str()),
            Err(_) => Self::parse(reference),
        }
    }
}

/// Facts read from the host exactly once, at construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFacts {
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

/// Host environment capability
pub trait HostEnvironment: Send + Sync {
    /// Read the construction-time facts. Errors are fatal to construction.
    fn facts(&self) -> TrackerResult<HostFacts>;

    /// Current location, read at call time
    fn location(&self) -> Location;
}

/// In-process host with fixed facts and a navigable location
#[derive(Debug, Default)]
pub struct StaticHost {
    user_agent: Option<String>,
    referrer: Option<String>,
    location: RwLock<Location>,
}

impl StaticHost {
    pub fn new(href: &str) -> Self {
        Self {
            user_agent: None,
            referrer: None,
            location: RwLock::new(Location::parse(href)),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Move the current location, as a page navigation would
    pub fn navigate(&self, href: &str) {
        let next = self.location().join(href);
        match self.location.write() {
            Ok(mut location) => *location = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

impl HostEnvironment for StaticHost {
    fn facts(&self) -> TrackerResult<HostFacts> {
        Ok(HostFacts {
            user_agent: self.user_agent.clone(),
            referrer: self.referrer.clone(),
        })
    }

    fn location(&self) -> Location {
        match self.location.read() {
            Ok(location) => location.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Immutable environment snapshot taken at construction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub user_agent: String,
    pub client_name: String,
    pub client_version: String,
    pub os_name: String,
    pub os_version: String,
    pub is_mobile: bool,
    pub referrer: String,

    /// Location host at construction time
    pub host: String,
}

impl Environment {
    /// Read the host once. Unavailable values become empty strings.
    pub fn capture(host: &dyn HostEnvironment) -> TrackerResult<Self> {
        let facts = host.facts()?;
        let location = host.location();
        let user_agent = facts.user_agent.unwrap_or_default();
        let parsed = UserAgentParser::new().parse(&user_agent);

        Ok(Self {
            client_name: parsed.client_name,
            client_version: parsed.client_version,
            os_name: parsed.os_name,
            os_version: parsed.os_version,
            is_mobile: parsed.is_mobile,
            user_agent,
            referrer: facts.referrer.unwrap_or_default(),
            host: location.host,
        })
    }
}

/// Result of parsing a user agent string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub client_name: String,
    pub client_version: String,
    pub os_name: String,
    pub os_version: String,
    pub is_mobile: bool,
}

const MOBILE_PATTERN: &str = r"(?i)Android|webOS|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini";

// Order matters: Chromium derivatives before Chrome, Chrome before Safari.
const BROWSER_RULES: &[(&str, &str)] = &[
    ("Microsoft Edge", r"Edg(?:e|A|iOS)?/([\d.]+)"),
    ("Opera", r"(?:OPR|Opera)/([\d.]+)"),
    ("Samsung Internet", r"SamsungBrowser/([\d.]+)"),
    ("Chrome Mobile", r"CriOS/([\d.]+)"),
    ("Firefox for iOS", r"FxiOS/([\d.]+)"),
    ("Firefox", r"Firefox/([\d.]+)"),
    ("Chrome", r"Chrome/([\d.]+)"),
    ("Safari", r"Version/([\d.]+).*Safari/"),
    ("IE", r"MSIE ([\d.]+)"),
    ("IE", r"Trident/.*rv:([\d.]+)"),
];

// Android before Linux, iOS before OS X ("like Mac OS X").
const OS_RULES: &[(&str, &str)] = &[
    ("Windows Phone", r"Windows Phone(?: OS)? ([\d.]+)"),
    ("Windows", r"Windows NT ([\d.]+)"),
    ("iOS", r"(?:iPhone|iPad|iPod).*? OS ([\d_]+)"),
    ("Android", r"Android(?: ([\d.]+))?"),
    ("Chrome OS", r"CrOS \S+ ([\d.]+)"),
    ("OS X", r"Mac OS X ?([\d_.]+)?"),
    ("Ubuntu", r"Ubuntu(?:/([\d.]+))?"),
    ("Linux", r"Linux"),
];

struct Rule {
    name: &'static str,
    pattern: Regex,
}

fn compile(rules: &[(&'static str, &str)]) -> Vec<Rule> {
    rules
        .iter()
        .filter_map(|&(name, pattern)| {
            Regex::new(pattern).ok().map(|pattern| Rule { name, pattern })
        })
        .collect()
}

/// Pattern-based user agent classifier
pub struct UserAgentParser {
    browsers: Vec<Rule>,
    systems: Vec<Rule>,
    mobile: Option<Regex>,
}

impl UserAgentParser {
    pub fn new() -> Self {
        Self {
            browsers: compile(BROWSER_RULES),
            systems: compile(OS_RULES),
            mobile: Regex::new(MOBILE_PATTERN).ok(),
        }
    }

    pub fn parse(&self, user_agent: &str) -> UserAgentInfo {
        let (client_name, client_version) = first_match(&self.browsers, user_agent);
        let (os_name, os_version) = first_match(&self.systems, user_agent);
        let os_version = normalize_os_version(&os_name, &os_version);

        UserAgentInfo {
            client_name,
            client_version,
            os_name,
            os_version,
            is_mobile: self.is_mobile(user_agent),
        }
    }

    pub fn is_mobile(&self, user_agent: &str) -> bool {
        self.mobile
            .as_ref()
            .map(|re| re.is_match(user_agent))
            .unwrap_or(false)
    }
}

impl Default for UserAgentParser {
    fn default() -> Self {
        Self::new()
    }
}

fn first_match(rules: &[Rule], user_agent: &str) -> (String, String) {
    for rule in rules {
        if let Some(caps) = rule.pattern.captures(user_agent) {
            let version = caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            return (rule.name.to_string(), version);
        }
    }
    (String::new(), String::new())
}

fn normalize_os_version(os_name: &str, raw: &str) -> String {
    match os_name {
        "Windows" => match raw {
            "10.0" => "10".to_string(),
            "6.3" => "8.1".to_string(),
            "6.2" => "8".to_string(),
            "6.1" => "7".to_string(),
            "6.0" => "Vista".to_string(),
            "5.1" | "5.2" => "XP".to_string(),
            other => other.to_string(),
        },
        "iOS" | "OS X" => raw.replace('_', "."),
        _ => raw.to_string(),
    }
}

/// Case-insensitive mobile platform check
pub fn is_mobile(user_agent: &str) -> bool {
    UserAgentParser::new().is_mobile(user_agent)
}
