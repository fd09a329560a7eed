//! CLI / environment configuration shared by the hades daemons.
//!
//! The *static* per-site configuration schema (subnets, RADIUS secrets,
//! template rendering, ...) is out of scope for this core -- it is owned
//! by the external configuration-compiler component. What lives here is
//! only the bootstrap configuration the core processes need in order to
//! start: where the database and broker are, which socket to listen on,
//! which network namespace to enter, how long to retain old rows.

pub mod cli {
    //! Parse from either cli or environment var, same convention the
    //! upstream DHCP engine uses for its own `Config`.

    /// Default path to the lease-script IPC socket.
    pub static DEFAULT_SOCKET_PATH: &str = "/run/hades/lease-script.sock";
    /// Default Postgres connection string.
    pub static DEFAULT_DATABASE_URL: &str =
        "postgres://hades@localhost/hades";
    /// Default AMQP broker connection string.
    pub static DEFAULT_BROKER_URL: &str = "amqp://localhost//";
    /// Default network namespace entered for privileged DHCP operations.
    pub static DEFAULT_AUTH_NAMESPACE: &str = "auth";
    /// Default retention interval, in seconds, for accounting/post-auth rows.
    pub const DEFAULT_RETENTION_SECS: u64 = 60 * 60 * 24 * 7;
    /// Default log level, can be overridden with `HADES_LOG` or `--log`.
    pub const DEFAULT_HADES_LOG: &str = "info";
    /// Default log format: "standard", "pretty" or "json".
    pub static DEFAULT_LOG_FORMAT: &str = "standard";

    use std::{path::PathBuf, time::Duration};

    pub use clap::Parser;

    /// Which RADIUS/DHCP instance this process is serving. Only `Auth` and
    /// `Unauth` mutate RPC bindings in response to VRRP notifications; see
    /// the RPC transport binding state machine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
    pub enum Instance {
        /// Authenticated VLAN instance.
        Auth,
        /// Unauthenticated (captive-portal) VLAN instance.
        Unauth,
    }

    /// Configuration shared by the lease-script server and the deputy
    /// service. Both binaries embed this struct via `#[clap(flatten)]`.
    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    pub struct Common {
        /// path to the site configuration (external schema, opaque here)
        #[clap(short, long, env = "HADES_CONFIG", value_parser)]
        pub config: Option<PathBuf>,
        /// Postgres connection string
        #[clap(long, env = "HADES_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
        pub database_url: String,
        /// set the log level, any valid `tracing_subscriber::EnvFilter` directive
        #[clap(long, env = "HADES_LOG", default_value = DEFAULT_HADES_LOG)]
        pub hades_log: String,
        /// log as "standard", "pretty" or "json"
        #[clap(long, env = "HADES_LOG_FORMAT", default_value = DEFAULT_LOG_FORMAT)]
        pub log_format: String,
    }

    /// `lease-script-server` CLI surface (spec section 6).
    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    #[clap(author, name = "hades-lease-script-server", about, long_about = None)]
    pub struct LeaseScriptConfig {
        #[clap(flatten)]
        pub common: Common,
        /// path to the UNIX socket to bind (or adopt via socket activation)
        #[clap(long, env = "HADES_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
        pub socket: PathBuf,
        /// print the version and exit
        #[clap(short = 'V', long)]
        pub version: bool,
    }

    /// `deputy` CLI surface (spec section 6).
    #[derive(Parser, Debug, Clone, PartialEq, Eq)]
    #[clap(author, name = "hades-deputy", about, long_about = None)]
    pub struct DeputyConfig {
        #[clap(flatten)]
        pub common: Common,
        /// which RADIUS instance this deputy is paired with
        #[clap(long = "auth", conflicts_with = "unauth")]
        pub auth: bool,
        /// which RADIUS instance this deputy is paired with
        #[clap(long = "unauth", conflicts_with = "auth")]
        pub unauth: bool,
        /// AMQP broker connection string
        #[clap(long, env = "HADES_BROKER_URL", default_value = DEFAULT_BROKER_URL)]
        pub broker_url: String,
        /// network namespace to enter for release packets and ipset restore
        #[clap(long, env = "HADES_AUTH_NAMESPACE", default_value = DEFAULT_AUTH_NAMESPACE)]
        pub namespace: String,
        /// retention interval for old accounting/post-auth rows, in seconds
        #[clap(long, env = "HADES_RETENTION_INTERVAL", default_value_t = DEFAULT_RETENTION_SECS)]
        pub retention_secs: u64,
        /// this node's own RPC routing key
        #[clap(long, env = "HADES_NODE_KEY", default_value = "node")]
        pub node_key: String,
        /// the site-wide RPC broadcast routing key
        #[clap(long, env = "HADES_SITE_KEY", default_value = "site")]
        pub site_key: String,
        /// the keepalived VRRP instance this deputy watches for MASTER
        /// transitions (only the RADIUS instance mutates RPC bindings)
        #[clap(long, env = "HADES_VRRP_INSTANCE", default_value = "hades-radius")]
        pub vrrp_instance: String,
        /// destination path for the generated DHCP hosts file
        #[clap(long, env = "HADES_DHCP_HOSTS_PATH", default_value = "/etc/hades/dhcp-hosts")]
        pub dhcp_hosts_path: PathBuf,
        /// owning uid for the generated DHCP hosts file
        #[clap(long, env = "HADES_DHCP_HOSTS_UID", default_value_t = 0)]
        pub dhcp_hosts_uid: u32,
        /// owning gid for the generated DHCP hosts file
        #[clap(long, env = "HADES_DHCP_HOSTS_GID", default_value_t = 0)]
        pub dhcp_hosts_gid: u32,
        /// systemd unit reloaded after the DHCP hosts file changes
        #[clap(long, env = "HADES_DHCP_HOSTS_UNIT", default_value = "auth-dhcp.service")]
        pub dhcp_hosts_unit: String,
        /// destination path for the generated RADIUS clients file
        #[clap(long, env = "HADES_RADIUS_CLIENTS_PATH", default_value = "/etc/freeradius/clients.conf")]
        pub radius_clients_path: PathBuf,
        /// owning uid for the generated RADIUS clients file
        #[clap(long, env = "HADES_RADIUS_CLIENTS_UID", default_value_t = 0)]
        pub radius_clients_uid: u32,
        /// owning gid for the generated RADIUS clients file
        #[clap(long, env = "HADES_RADIUS_CLIENTS_GID", default_value_t = 0)]
        pub radius_clients_gid: u32,
        /// systemd unit restarted after the RADIUS clients file changes
        #[clap(long, env = "HADES_RADIUS_UNIT", default_value = "radius.service")]
        pub radius_unit: String,
        /// name of the ipset holding alternative-DNS-permitted addresses
        #[clap(long, env = "HADES_ALTERNATIVE_DNS_IPSET", default_value = "hades-alternative-dns")]
        pub alternative_dns_ipset: String,
        /// address of the DHCP server targeted by administrative releases
        #[clap(long, env = "HADES_DHCP_SERVER_IP", default_value = "10.66.67.1")]
        pub dhcp_server_ip: std::net::Ipv4Addr,
        /// interface the release packet is sent from inside the namespace
        #[clap(long, env = "HADES_DHCP_RELEASE_INTERFACE")]
        pub dhcp_release_interface: Option<String>,
        /// path to this node's 32-byte ed25519 signing key seed
        #[clap(long, env = "HADES_SIGNING_KEY_PATH", default_value = "/etc/hades/agent.key")]
        pub signing_key_path: PathBuf,
        /// directory of `<base64-verify-key>` files trusted as RPC signers
        #[clap(long, env = "HADES_TRUSTED_KEYS_DIR", default_value = "/etc/hades/trusted-keys")]
        pub trusted_keys_dir: PathBuf,
        /// interval, in seconds, between unforced background refreshes
        #[clap(long, env = "HADES_REFRESH_INTERVAL", default_value_t = 60)]
        pub refresh_interval_secs: u64,
        /// interval, in seconds, between background cleanup runs
        #[clap(long, env = "HADES_CLEANUP_INTERVAL", default_value_t = 60 * 60 * 24)]
        pub cleanup_interval_secs: u64,
        /// address the liveness/metrics HTTP surface binds
        #[clap(long, env = "HADES_HEALTH_ADDR", default_value = "127.0.0.1:9090")]
        pub health_addr: std::net::SocketAddr,
        /// print the version and exit
        #[clap(short = 'V', long)]
        pub version: bool,
    }

    impl DeputyConfig {
        /// which instance this deputy is bound to; `unauth` observes but
        /// never mutates the RPC site-key binding.
        pub fn instance(&self) -> Instance {
            if self.unauth {
                Instance::Unauth
            } else {
                Instance::Auth
            }
        }

        /// retention interval as a `Duration`
        pub fn retention(&self) -> Duration {
            Duration::from_secs(self.retention_secs)
        }

        /// background refresh interval as a `Duration`
        pub fn refresh_interval(&self) -> Duration {
            Duration::from_secs(self.refresh_interval_secs)
        }

        /// background cleanup interval as a `Duration`
        pub fn cleanup_interval(&self) -> Duration {
            Duration::from_secs(self.cleanup_interval_secs)
        }
    }
}

pub mod trace {
    //! tracing configuration, identical in spirit to the upstream DHCP
    //! engine's own `trace::Config`: one `EnvFilter` plus a choice of
    //! formatting layers selected by an environment variable.
    use anyhow::Result;
    use tracing_subscriber::{
        filter::EnvFilter,
        fmt::{
            self,
            format::{Format, PrettyFields},
        },
        prelude::__tracing_subscriber_SubscriberExt,
        util::SubscriberInitExt,
    };

    /// Tracing subscriber configuration.
    #[derive(Debug)]
    pub struct Config {
        /// formatting applied to log events
        pub log_format: String,
    }

    impl Config {
        /// Initialize the global tracing subscriber from a log-level
        /// directive and a format name ("standard", "pretty", "json").
        pub fn parse(hades_log: &str, log_format: &str) -> Result<Self> {
            let filter = EnvFilter::try_new(hades_log).or_else(|_| EnvFilter::try_new("info"))?;

            match log_format {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "pretty" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(
                            fmt::layer()
                                .event_format(
                                    Format::default().pretty().with_source_location(false),
                                )
                                .fmt_fields(PrettyFields::new()),
                        )
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer())
                        .init();
                }
            }

            Ok(Self {
                log_format: log_format.to_owned(),
            })
        }
    }
}
