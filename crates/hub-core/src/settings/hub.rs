//! The service hub's settings schema.

use std::collections::{BTreeMap, BTreeSet};

use super::schema::{DerivationContext, Schema, SettingDef};
use super::validate;
use super::value::{SettingKind, SettingValue};
use crate::Result;

/// Label used for the stable public name when none is configured
pub const DEFAULT_STABLE_PUBLIC_LABEL: &str = "ddns";

/// Build the hub schema
///
/// # Errors
///
/// Only on a programming error in the declarations below (unknown reference
/// or cycle); the hub schema is covered by tests.
pub fn hub_schema() -> Result<Schema> {
    let builder = Schema::builder()
        .setting(
            SettingDef::new("hub_package_version", SettingKind::Str)
                .default_value(env!("CARGO_PKG_VERSION"))
                .describe("Version of the hub package that wrote this file."),
        )
        .setting(
            SettingDef::new("parent_dns_domain", SettingKind::Str)
                .required("set hub.parent_dns_domain in hub.toml or HUB_PARENT_DNS_DOMAIN, e.g. 'example.com'")
                .validate(validate::dns_name)
                .describe(
                    "Registered public DNS domain under which the hub's subdomains are created. \
                     REQUIRED.",
                ),
        )
        .setting(
            SettingDef::new("admin_parent_dns_domain", SettingKind::Str)
                .fallback("parent_dns_domain")
                .validate(validate::dns_name)
                .describe(
                    "Domain for administrative services (dashboard, container manager). \
                     Defaults to parent_dns_domain.",
                ),
        )
        .setting(
            SettingDef::new("letsencrypt_owner_email", SettingKind::Str)
                .required("set hub.letsencrypt_owner_email to the address that receives certificate notices")
                .validate(validate::email)
                .describe("Email address registered with Let's Encrypt. REQUIRED."),
        )
        .setting(
            SettingDef::new("letsencrypt_owner_email_prod", SettingKind::Str)
                .fallback("letsencrypt_owner_email")
                .validate(validate::email)
                .describe("Email for the production ACME resolver. Defaults to letsencrypt_owner_email."),
        )
        .setting(
            SettingDef::new("letsencrypt_owner_email_staging", SettingKind::Str)
                .fallback("letsencrypt_owner_email")
                .validate(validate::email)
                .describe("Email for the staging ACME resolver. Defaults to letsencrypt_owner_email."),
        )
        .setting(
            SettingDef::new("default_cert_resolver", SettingKind::Str)
                .default_value("staging")
                .validate(validate::cert_resolver)
                .describe("Certificate resolver for app routes: 'prod' or 'staging'."),
        )
        .setting(
            SettingDef::new("admin_cert_resolver", SettingKind::Str)
                .default_value("prod")
                .validate(validate::cert_resolver)
                .describe("Certificate resolver for administrative routes: 'prod' or 'staging'."),
        )
        .setting(
            SettingDef::new("traefik_dashboard_cert_resolver", SettingKind::Str)
                .fallback("admin_cert_resolver")
                .validate(validate::cert_resolver)
                .describe("Certificate resolver for the proxy dashboard. Defaults to admin_cert_resolver."),
        )
        .setting(
            SettingDef::new("portainer_cert_resolver", SettingKind::Str)
                .fallback("admin_cert_resolver")
                .validate(validate::cert_resolver)
                .describe("Certificate resolver for the container manager. Defaults to admin_cert_resolver."),
        )
        .setting(
            SettingDef::new("app_subdomain_cert_resolver", SettingKind::Str)
                .fallback("default_cert_resolver")
                .validate(validate::cert_resolver)
                .describe("Certificate resolver for app subdomains. Defaults to default_cert_resolver."),
        )
        .setting(
            SettingDef::new("portainer_agent_secret", SettingKind::Str)
                .required("generate one with `openssl rand -hex 32` and store it in hub.portainer_agent_secret")
                .sensitive()
                .validate(validate::secret_token)
                .describe("Shared secret between the container manager and its agents. REQUIRED."),
        )
        .setting(
            SettingDef::new("traefik_dashboard_htpasswd", SettingKind::Str)
                .required("create one with `htpasswd -nB admin` and store it in hub.traefik_dashboard_htpasswd")
                .sensitive()
                .validate(validate::htpasswd)
                .describe(
                    "Dashboard credentials as 'user:<bcrypt hash>'. Stored exactly as given. REQUIRED.",
                ),
        )
        .setting(
            SettingDef::new("stable_public_dns_name", SettingKind::Str)
                .derive(&["admin_parent_dns_domain"], stable_public_dns_name)
                .normalize(&["admin_parent_dns_domain"], qualify_onto_admin_domain)
                .validate(validate::dns_name)
                .describe(
                    "DNS name that always resolves to the hub's public IP. A bare label is placed \
                     under admin_parent_dns_domain. Defaults to 'ddns'.",
                ),
        )
        .setting(
            SettingDef::new("traefik_dashboard_subdomain", SettingKind::Str)
                .default_value("traefik")
                .validate(validate::dns_label)
                .describe("Subdomain of admin_parent_dns_domain serving the proxy dashboard."),
        )
        .setting(
            SettingDef::new("portainer_subdomain", SettingKind::Str)
                .default_value("portainer")
                .validate(validate::dns_label)
                .describe("Subdomain of admin_parent_dns_domain serving the container manager."),
        )
        .setting(
            SettingDef::new("default_app_subdomain", SettingKind::Str)
                .default_value("hub")
                .validate(validate::dns_label)
                .describe("Subdomain of parent_dns_domain serving the default app."),
        )
        .setting(
            SettingDef::new("traefik_dashboard_dns_name", SettingKind::Str)
                .derive(
                    &["traefik_dashboard_subdomain", "admin_parent_dns_domain"],
                    traefik_dashboard_dns_name,
                )
                .validate(validate::dns_name)
                .describe("Fully-qualified dashboard name. Defaults to <subdomain>.<admin domain>."),
        )
        .setting(
            SettingDef::new("portainer_dns_name", SettingKind::Str)
                .derive(&["portainer_subdomain", "admin_parent_dns_domain"], portainer_dns_name)
                .validate(validate::dns_name)
                .describe("Fully-qualified container manager name."),
        )
        .setting(
            SettingDef::new("default_app_dns_name", SettingKind::Str)
                .derive(&["default_app_subdomain", "parent_dns_domain"], default_app_dns_name)
                .validate(validate::dns_name)
                .describe("Fully-qualified default app name."),
        )
        .setting(
            SettingDef::new("hub_hostname", SettingKind::Str)
                .derive(&[], probe_hostname)
                .validate(validate::host_name)
                .describe("Host name of the hub machine. Defaults to the system host name."),
        )
        .setting(
            SettingDef::new("hub_lan_ip", SettingKind::Str)
                .derive(&[], probe_lan_ip)
                .validate(validate::ipv4)
                .describe("LAN IPv4 address of the hub. Defaults to the address of the outbound interface."),
        )
        .setting(
            SettingDef::new("default_app_hostnames", SettingKind::StrSet)
                .derive(&["default_app_dns_name", "hub_hostname"], default_app_hostnames)
                .validate(validate::host_names)
                .describe("Host names routed to the default app."),
        )
        .setting(
            SettingDef::new("dns_ttl", SettingKind::Int)
                .default_value(300)
                .validate(validate::ttl)
                .describe("Time-to-live in seconds for DNS records created by the hub."),
        )
        .setting(
            SettingDef::new("http_port", SettingKind::Int)
                .default_value(80)
                .validate(validate::port)
                .describe("Host port for plain HTTP."),
        )
        .setting(
            SettingDef::new("https_port", SettingKind::Int)
                .default_value(443)
                .validate(validate::port)
                .describe("Host port for HTTPS."),
        )
        .setting(
            SettingDef::new("traefik_log_level", SettingKind::Str)
                .default_value("INFO")
                .validate(validate::log_level)
                .describe("Reverse proxy log level: DEBUG, INFO, WARN or ERROR."),
        )
        .setting(
            SettingDef::new("traefik_dashboard_enabled", SettingKind::Bool)
                .default_value(true)
                .describe("Whether the proxy dashboard is routed."),
        );

    ENV_OVERRIDE_SETTINGS
        .iter()
        .fold(builder, |builder, &(name, description)| {
            builder.setting(
                SettingDef::new(name, SettingKind::StrMap)
                    .default_value(SettingValue::StrMap(BTreeMap::new()))
                    .validate(validate::env_var_map)
                    .describe(description),
            )
        })
        .build()
}

/// Dictionary-valued settings holding explicit environment overrides
pub const ENV_OVERRIDE_SETTINGS: &[(&str, &str)] = &[
    ("base_stack_env", "Extra variables for every stack."),
    ("traefik_stack_env", "Extra variables for the reverse proxy stack."),
    ("portainer_stack_env", "Extra variables for the container manager stack."),
    ("base_app_stack_env", "Extra variables for every app stack."),
    ("portainer_runtime_env", "Extra variables for stacks launched by the container manager."),
];

fn join(label: &str, domain: &str) -> SettingValue {
    SettingValue::Str(format!("{}.{}", label, domain))
}

fn stable_public_dns_name(ctx: &DerivationContext<'_>) -> Result<Option<SettingValue>> {
    Ok(Some(join(
        DEFAULT_STABLE_PUBLIC_LABEL,
        ctx.require_str("admin_parent_dns_domain")?,
    )))
}

fn qualify_onto_admin_domain(value: SettingValue, ctx: &DerivationContext<'_>) -> Result<SettingValue> {
    match value {
        SettingValue::Str(name) if !name.contains('.') => {
            Ok(join(&name, ctx.require_str("admin_parent_dns_domain")?))
        }
        other => Ok(other),
    }
}

fn traefik_dashboard_dns_name(ctx: &DerivationContext<'_>) -> Result<Option<SettingValue>> {
    Ok(Some(join(
        ctx.require_str("traefik_dashboard_subdomain")?,
        ctx.require_str("admin_parent_dns_domain")?,
    )))
}

fn portainer_dns_name(ctx: &DerivationContext<'_>) -> Result<Option<SettingValue>> {
    Ok(Some(join(
        ctx.require_str("portainer_subdomain")?,
        ctx.require_str("admin_parent_dns_domain")?,
    )))
}

fn default_app_dns_name(ctx: &DerivationContext<'_>) -> Result<Option<SettingValue>> {
    Ok(Some(join(
        ctx.require_str("default_app_subdomain")?,
        ctx.require_str("parent_dns_domain")?,
    )))
}

fn probe_hostname(ctx: &DerivationContext<'_>) -> Result<Option<SettingValue>> {
    Ok(Some(SettingValue::Str(ctx.probe().hostname()?)))
}

fn probe_lan_ip(ctx: &DerivationContext<'_>) -> Result<Option<SettingValue>> {
    Ok(Some(SettingValue::Str(ctx.probe().lan_ipv4()?.to_string())))
}

fn default_app_hostnames(ctx: &DerivationContext<'_>) -> Result<Option<SettingValue>> {
    let hosts: BTreeSet<String> = [
        ctx.str("default_app_dns_name")?,
        ctx.str("hub_hostname")?,
    ]
    .into_iter()
    .flatten()
    .map(str::to_string)
    .collect();
    Ok(Some(SettingValue::StrSet(hosts)))
}
