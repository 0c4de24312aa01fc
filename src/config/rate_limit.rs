use super::parse_bool_env;
use std::{env, fmt, str::FromStr};

/// Route groups that get their own governor bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitGroup {
    /// `/api/auth`: login, register and password reset.
    Auth,
    /// User-facing content groups (users, follows, posts, comments,
    /// products, reviews, categories).
    Content,
    /// `*_admin` groups and the dashboard.
    Admin,
}

impl RateLimitGroup {
    pub const ALL: [Self; 3] = [Self::Auth, Self::Content, Self::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Content => "content",
            Self::Admin => "admin",
        }
    }

    /// Auth stays the tightest bucket.
    fn default_rule(self) -> RateLimitRule {
        match self {
            Self::Auth => RateLimitRule::new(2, 5),
            Self::Content => RateLimitRule::new(20, 50),
            Self::Admin => RateLimitRule::new(10, 20),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for RateLimitGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown group '{}', expected auth/content/admin", s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub per_second: u64,
    pub burst_size: u32,
}

impl RateLimitRule {
    const fn new(per_second: u64, burst_size: u32) -> Self {
        Self {
            per_second,
            burst_size,
        }
    }
}

impl fmt::Display for RateLimitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.per_second, self.burst_size)
    }
}

/// `per_second:burst`, both non-zero.
impl FromStr for RateLimitRule {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (per_second, burst) = raw
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("invalid rule '{}', expected per:burst", raw.trim()))?;
        let per_second: u64 = per_second
            .trim()
            .parse()
            .map_err(|_| format!("invalid per_second '{}'", per_second.trim()))?;
        let burst_size: u32 = burst
            .trim()
            .parse()
            .map_err(|_| format!("invalid burst_size '{}'", burst.trim()))?;
        if per_second == 0 || burst_size == 0 {
            return Err("per_second and burst_size must be > 0".to_string());
        }
        Ok(Self::new(per_second, burst_size))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub enabled: bool,
    rules: [RateLimitRule; 3],
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: RateLimitGroup::ALL.map(RateLimitGroup::default_rule),
        }
    }
}

impl RateLimitConfig {
    /// `RATE_LIMIT_ENABLED` toggles the layers; `RATE_LIMIT_CONFIG` holds
    /// either one rule for every group (`10:20`) or per-group overrides
    /// (`auth=1:3,admin=5:10`). A bad value keeps the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self {
            enabled: parse_bool_env("RATE_LIMIT_ENABLED", true),
            ..Self::default()
        };
        if let Ok(raw) = env::var("RATE_LIMIT_CONFIG") {
            if let Err(err) = cfg.override_with(&raw) {
                tracing::warn!("Invalid RATE_LIMIT_CONFIG '{}': {}", raw, err);
            }
        }
        for group in RateLimitGroup::ALL {
            tracing::debug!(group = group.as_str(), rule = %cfg.rule(group), "Rate limit");
        }
        cfg
    }

    pub fn rule(&self, group: RateLimitGroup) -> RateLimitRule {
        self.rules[group.index()]
    }

    /// All-or-nothing: nothing changes unless every item parses.
    fn override_with(&mut self, raw: &str) -> Result<(), String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("empty value".to_string());
        }
        if !raw.contains('=') {
            self.rules = [raw.parse()?; 3];
            return Ok(());
        }

        let mut rules = self.rules;
        for item in raw.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let (group, rule) = item
                .split_once('=')
                .ok_or_else(|| format!("invalid item '{}', expected group=per:burst", item))?;
            let group: RateLimitGroup = group.parse()?;
            rules[group.index()] = rule.parse()?;
        }
        self.rules = rules;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_is_the_tightest_bucket() {
        let cfg = RateLimitConfig::default();
        let auth = cfg.rule(RateLimitGroup::Auth);
        for group in [RateLimitGroup::Content, RateLimitGroup::Admin] {
            assert!(auth.per_second < cfg.rule(group).per_second);
            assert!(auth.burst_size < cfg.rule(group).burst_size);
        }
    }

    #[test]
    fn single_rule_applies_everywhere() {
        let mut cfg = RateLimitConfig::default();
        cfg.override_with("12:24").unwrap();
        for group in RateLimitGroup::ALL {
            assert_eq!(cfg.rule(group), RateLimitRule::new(12, 24));
        }
    }

    #[test]
    fn grouped_rules_touch_only_named_groups() {
        let mut cfg = RateLimitConfig::default();
        cfg.override_with("ADMIN=2:4, auth = 1:1").unwrap();
        assert_eq!(cfg.rule(RateLimitGroup::Admin), RateLimitRule::new(2, 4));
        assert_eq!(cfg.rule(RateLimitGroup::Auth), RateLimitRule::new(1, 1));
        assert_eq!(
            cfg.rule(RateLimitGroup::Content),
            RateLimitGroup::Content.default_rule()
        );
    }

    #[test]
    fn bad_item_leaves_rules_untouched() {
        let mut cfg = RateLimitConfig::default();
        let err = cfg.override_with("admin=2:4,public=3:4").unwrap_err();
        assert!(err.contains("unknown group"));
        assert_eq!(
            cfg.rule(RateLimitGroup::Admin),
            RateLimitGroup::Admin.default_rule()
        );
        assert!(cfg.override_with("auth=abc").is_err());
        assert!(cfg.override_with("0:5").is_err());
        assert!(cfg.override_with("  ").is_err());
    }

    #[test]
    fn rules_print_as_parsed() {
        let rule: RateLimitRule = " 7 : 9 ".parse().unwrap();
        assert_eq!(rule.to_string(), "7:9");
    }
}
