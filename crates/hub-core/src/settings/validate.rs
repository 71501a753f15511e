//! Validation predicates for settings.
//!
//! Each validator inspects a resolved value and returns a human-readable
//! description of the violated constraint. The resolver wraps that into
//! [`Error::SettingValidation`](crate::Error::SettingValidation) together with
//! the setting name and (possibly redacted) value.

use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use super::value::SettingValue;

/// Signature shared by all validators
pub type Validator = fn(&SettingValue) -> Result<(), String>;

/// Certificate resolvers the reverse proxy is configured with
pub const CERT_RESOLVERS: &[&str] = &["prod", "staging"];

/// Log levels accepted by the reverse proxy
pub const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARN", "ERROR"];

static ENV_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex is valid")
});

static EMAIL_LOCAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+$").expect("static regex is valid")
});

static HTPASSWD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^:\s]+:\$2[abxy]?\$\d{2}\$[./A-Za-z0-9]{53}$").expect("static regex is valid")
});

static SECRET_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._~+/=-]{16,}$").expect("static regex is valid")
});

/// True if `label` is a single DNS label (letters, digits, inner hyphens)
pub fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// True if `name` is a syntactically valid multi-label DNS name
///
/// A single trailing dot is allowed. At least two labels are required and
/// the top-level label may not be all digits.
pub fn is_dns_name(name: &str) -> bool {
    if name.len() < 3 || name.len() > 255 {
        return false;
    }
    let name = name.strip_suffix('.').unwrap_or(name);
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    if labels
        .last()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
    {
        return false;
    }
    labels.iter().all(|label| is_dns_label(label))
}

/// True if `key` can be used as an environment variable name
pub fn is_env_key(key: &str) -> bool {
    ENV_KEY.is_match(key)
}

/// True if `value` looks like an email address with a valid DNS domain
pub fn is_email(value: &str) -> bool {
    match value.rsplit_once('@') {
        Some((local, domain)) => EMAIL_LOCAL.is_match(local) && is_dns_name(domain),
        None => false,
    }
}

fn text(value: &SettingValue) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected a string, got a {}", value.kind()))
}

fn one_of(value: &SettingValue, allowed: &[&str]) -> Result<(), String> {
    let s = text(value)?;
    if allowed.contains(&s) {
        Ok(())
    } else {
        Err(format!("must be one of: {}", allowed.join(", ")))
    }
}

fn int_in(value: &SettingValue, min: i64, max: i64) -> Result<(), String> {
    match value.as_int() {
        Some(i) if (min..=max).contains(&i) => Ok(()),
        Some(_) => Err(format!("must be between {min} and {max}")),
        None => Err(format!("expected an integer, got a {}", value.kind())),
    }
}

pub fn dns_name(value: &SettingValue) -> Result<(), String> {
    if is_dns_name(text(value)?) {
        Ok(())
    } else {
        Err("must be a valid DNS name with at least two labels".to_string())
    }
}

pub fn dns_label(value: &SettingValue) -> Result<(), String> {
    if is_dns_label(text(value)?) {
        Ok(())
    } else {
        Err("must be a single DNS label (letters, digits, inner hyphens)".to_string())
    }
}

/// A bare host name or a fully-qualified DNS name
pub fn host_name(value: &SettingValue) -> Result<(), String> {
    let s = text(value)?;
    if is_dns_label(s) || is_dns_name(s) {
        Ok(())
    } else {
        Err("must be a host name or DNS name".to_string())
    }
}

pub fn host_names(value: &SettingValue) -> Result<(), String> {
    let hosts = value
        .as_set()
        .ok_or_else(|| format!("expected a string set, got a {}", value.kind()))?;
    match hosts.iter().find(|h| !(is_dns_label(h) || is_dns_name(h))) {
        Some(bad) => Err(format!("'{bad}' is not a host name or DNS name")),
        None => Ok(()),
    }
}

pub fn email(value: &SettingValue) -> Result<(), String> {
    if is_email(text(value)?) {
        Ok(())
    } else {
        Err("must be an email address".to_string())
    }
}

/// `user:hash` where hash is a bcrypt hash as produced by `htpasswd -B`
pub fn htpasswd(value: &SettingValue) -> Result<(), String> {
    if HTPASSWD.is_match(text(value)?) {
        Ok(())
    } else {
        Err("must be of the form 'user:<bcrypt hash>'".to_string())
    }
}

pub fn secret_token(value: &SettingValue) -> Result<(), String> {
    if SECRET_TOKEN.is_match(text(value)?) {
        Ok(())
    } else {
        Err("must be at least 16 characters of [A-Za-z0-9._~+/=-]".to_string())
    }
}

pub fn cert_resolver(value: &SettingValue) -> Result<(), String> {
    one_of(value, CERT_RESOLVERS)
}

pub fn log_level(value: &SettingValue) -> Result<(), String> {
    one_of(value, LOG_LEVELS)
}

pub fn port(value: &SettingValue) -> Result<(), String> {
    int_in(value, 1, 65535)
}

pub fn ttl(value: &SettingValue) -> Result<(), String> {
    int_in(value, 60, 86400)
}

pub fn ipv4(value: &SettingValue) -> Result<(), String> {
    text(value)?
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| "must be an IPv4 address".to_string())
}

/// Every key of a string map must be a valid environment variable name
pub fn env_var_map(value: &SettingValue) -> Result<(), String> {
    let map = value
        .as_map()
        .ok_or_else(|| format!("expected a string map, got a {}", value.kind()))?;
    match map.keys().find(|k| !is_env_key(k)) {
        Some(bad) => Err(format!("'{bad}' is not a valid environment variable name")),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_names() {
        assert!(is_dns_name("example.com"));
        assert!(is_dns_name("ddns.example.com."));
        assert!(is_dns_name("a-b.c-d.example.org"));
        assert!(!is_dns_name("localhost"));
        assert!(!is_dns_name("-bad.example.com"));
        assert!(!is_dns_name("bad-.example.com"));
        assert!(!is_dns_name("a..example.com"));
        assert!(!is_dns_name("10.0.0.1"));
        assert!(!is_dns_name(&format!("{}.com", "a".repeat(64))));
    }

    #[test]
    fn htpasswd_requires_bcrypt_hash() {
        let ok = SettingValue::from("admin:$2y$05$LCmVF2WJY/Ue0avRDcsDmelPqzXQcMIXoRxHF3bR62HuIP.fqqqZm");
        assert!(htpasswd(&ok).is_ok());
        assert!(htpasswd(&SettingValue::from("admin:plaintext")).is_err());
        assert!(htpasswd(&SettingValue::from("$2y$05$LCmVF2WJY/Ue0avRDcsDmelPqzXQcMIXoRxHF3bR62HuIP.fqqqZm")).is_err());
    }

    #[test]
    fn allow_lists_and_ranges() {
        assert!(cert_resolver(&SettingValue::from("prod")).is_ok());
        assert!(cert_resolver(&SettingValue::from("production")).is_err());
        assert!(ttl(&SettingValue::Int(300)).is_ok());
        assert!(ttl(&SettingValue::Int(30)).is_err());
        assert!(port(&SettingValue::from("80")).is_err());
    }

    #[test]
    fn emails() {
        assert!(is_email("owner@example.com"));
        assert!(!is_email("owner@localhost"));
        assert!(!is_email("owner.example.com"));
    }
}
