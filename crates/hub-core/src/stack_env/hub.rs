//! The service hub's environment dictionaries.
//!
//! ```text
//!   base ─┬─ traefik
//!         ├─ portainer
//!         └─ app ── portainer-runtime
//! ```

use std::collections::BTreeMap;

use super::compositor::{DictionaryDef, StackEnvCompositor};
use super::{escape_compose_dollars, host_rule};
use crate::Result;
use crate::settings::{ResolvedSettings, Schema};

pub const BASE: &str = "base";
pub const TRAEFIK: &str = "traefik";
pub const PORTAINER: &str = "portainer";
pub const APP: &str = "app";
pub const PORTAINER_RUNTIME: &str = "portainer-runtime";

/// Compositor for the hub's stacks, checked against `schema`
pub fn hub_compositor(schema: &Schema) -> Result<StackEnvCompositor> {
    StackEnvCompositor::builder()
        .dictionary(
            DictionaryDef::new(BASE)
                .overrides("base_stack_env")
                .from_setting("PARENT_DNS_DOMAIN", "parent_dns_domain")
                .from_setting("ADMIN_PARENT_DNS_DOMAIN", "admin_parent_dns_domain")
                .from_setting("STABLE_PUBLIC_DNS_NAME", "stable_public_dns_name")
                .from_setting("DEFAULT_CERT_RESOLVER", "default_cert_resolver")
                .from_setting("HUB_HOSTNAME", "hub_hostname")
                .from_setting("HUB_LAN_IP", "hub_lan_ip")
                .from_setting("HUB_PACKAGE_VERSION", "hub_package_version"),
        )
        .dictionary(
            DictionaryDef::new(TRAEFIK)
                .parent(BASE)
                .overrides("traefik_stack_env")
                .from_setting("TRAEFIK_DASHBOARD_DNS_NAME", "traefik_dashboard_dns_name")
                .from_setting("TRAEFIK_DASHBOARD_CERT_RESOLVER", "traefik_dashboard_cert_resolver")
                .computed("TRAEFIK_DASHBOARD_HTPASSWD", dashboard_htpasswd)
                .computed("TRAEFIK_DASHBOARD_HOST_RULE", dashboard_host_rule)
                .from_setting("TRAEFIK_DASHBOARD_ENABLED", "traefik_dashboard_enabled")
                .from_setting("TRAEFIK_LOG_LEVEL", "traefik_log_level")
                .from_setting("TRAEFIK_HTTP_PORT", "http_port")
                .from_setting("TRAEFIK_HTTPS_PORT", "https_port")
                .from_setting("LETSENCRYPT_OWNER_EMAIL_PROD", "letsencrypt_owner_email_prod")
                .from_setting("LETSENCRYPT_OWNER_EMAIL_STAGING", "letsencrypt_owner_email_staging"),
        )
        .dictionary(
            DictionaryDef::new(PORTAINER)
                .parent(BASE)
                .overrides("portainer_stack_env")
                .from_setting("PORTAINER_DNS_NAME", "portainer_dns_name")
                .from_setting("PORTAINER_CERT_RESOLVER", "portainer_cert_resolver")
                .from_setting("PORTAINER_AGENT_SECRET", "portainer_agent_secret")
                .computed("PORTAINER_HOST_RULE", portainer_host_rule),
        )
        .dictionary(
            DictionaryDef::new(APP)
                .parent(BASE)
                .overrides("base_app_stack_env")
                .from_setting("DEFAULT_APP_DNS_NAME", "default_app_dns_name")
                .from_setting("APP_SUBDOMAIN_CERT_RESOLVER", "app_subdomain_cert_resolver")
                .computed("DEFAULT_APP_HOST_RULE", default_app_host_rule),
        )
        .dictionary(
            DictionaryDef::new(PORTAINER_RUNTIME)
                .parent(APP)
                .overrides("portainer_runtime_env"),
        )
        .build(schema)
}

// The value ends up in a compose file, where `$` starts an interpolation.
fn dashboard_htpasswd(settings: &ResolvedSettings, _: &BTreeMap<String, String>) -> Result<Option<String>> {
    Ok(settings.str("traefik_dashboard_htpasswd").map(escape_compose_dollars))
}

fn dashboard_host_rule(_: &ResolvedSettings, vars: &BTreeMap<String, String>) -> Result<Option<String>> {
    Ok(vars.get("TRAEFIK_DASHBOARD_DNS_NAME").map(|name| host_rule([name])))
}

fn portainer_host_rule(_: &ResolvedSettings, vars: &BTreeMap<String, String>) -> Result<Option<String>> {
    Ok(vars.get("PORTAINER_DNS_NAME").map(|name| host_rule([name])))
}

fn default_app_host_rule(settings: &ResolvedSettings, _: &BTreeMap<String, String>) -> Result<Option<String>> {
    Ok(settings.set("default_app_hostnames").map(host_rule))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::StaticHostProbe;
    use crate::settings::{RawSource, Resolver, SourceLayer, hub_schema};
    use serde_json::json;
    use std::sync::Arc;

    const HTPASSWD: &str = "admin:$2y$05$LCmVF2WJY/Ue0avRDcsDmelPqzXQcMIXoRxHF3bR62HuIP.fqqqZm";

    fn resolve(extra: serde_json::Value) -> ResolvedSettings {
        let mut values: RawSource = serde_json::from_value(json!({
            "parent_dns_domain": "example.com",
            "letsencrypt_owner_email": "ops@example.com",
            "portainer_agent_secret": "0123456789abcdef0123",
            "traefik_dashboard_htpasswd": HTPASSWD,
        }))
        .unwrap();
        values.extend(serde_json::from_value::<RawSource>(extra).unwrap());

        let schema = Arc::new(hub_schema().unwrap());
        let probe = Arc::new(StaticHostProbe::new("rpi-hub", [192, 168, 1, 20]));
        Resolver::new(schema, probe)
            .resolve(&[SourceLayer::new("test", values)])
            .unwrap()
    }

    #[test]
    fn hub_dictionaries_match_schema() {
        let compositor = hub_compositor(&hub_schema().unwrap()).unwrap();
        assert_eq!(
            compositor.names().collect::<Vec<_>>(),
            vec![BASE, TRAEFIK, PORTAINER, APP, PORTAINER_RUNTIME]
        );
    }

    #[test]
    fn traefik_gets_escaped_htpasswd_and_host_rule() {
        let settings = resolve(json!({}));
        let compositor = hub_compositor(&hub_schema().unwrap()).unwrap();
        let traefik = compositor.compose(TRAEFIK, &settings).unwrap();

        assert_eq!(traefik.get("PARENT_DNS_DOMAIN"), Some("example.com"));
        assert_eq!(traefik.get("HUB_LAN_IP"), Some("192.168.1.20"));
        assert_eq!(
            traefik.get("TRAEFIK_DASHBOARD_HTPASSWD"),
            Some("admin:$$2y$$05$$LCmVF2WJY/Ue0avRDcsDmelPqzXQcMIXoRxHF3bR62HuIP.fqqqZm")
        );
        let name = traefik.get("TRAEFIK_DASHBOARD_DNS_NAME").unwrap();
        assert_eq!(
            traefik.get("TRAEFIK_DASHBOARD_HOST_RULE").map(str::to_string),
            Some(format!("Host(`{}`)", name))
        );
        assert_eq!(traefik.get("TRAEFIK_HTTPS_PORT"), Some("443"));
        assert_eq!(traefik.get("PORTAINER_AGENT_SECRET"), None);
    }

    #[test]
    fn host_rule_uses_override_name() {
        let settings = resolve(json!({
            "portainer_stack_env": {"PORTAINER_DNS_NAME": "docker.example.net"}
        }));
        let compositor = hub_compositor(&hub_schema().unwrap()).unwrap();
        let portainer = compositor.compose(PORTAINER, &settings).unwrap();

        assert_eq!(portainer.get("PORTAINER_HOST_RULE"), Some("Host(`docker.example.net`)"));
        assert_eq!(portainer.get("PORTAINER_AGENT_SECRET"), Some("0123456789abcdef0123"));
    }

    #[test]
    fn runtime_inherits_app_and_base() {
        let settings = resolve(json!({
            "default_app_hostnames": ["b.example.com", "a.example.com", "b.example.com"],
            "base_stack_env": {"TZ": "UTC"},
            "portainer_runtime_env": {"EXTRA": "1"}
        }));
        let compositor = hub_compositor(&hub_schema().unwrap()).unwrap();
        let runtime = compositor.compose(PORTAINER_RUNTIME, &settings).unwrap();

        assert_eq!(runtime.get("TZ"), Some("UTC"));
        assert_eq!(runtime.get("EXTRA"), Some("1"));
        assert_eq!(
            runtime.get("DEFAULT_APP_HOST_RULE"),
            Some("Host(`a.example.com`) || Host(`b.example.com`)")
        );
        assert!(runtime.get("TRAEFIK_DASHBOARD_HTPASSWD").is_none());
    }
}
