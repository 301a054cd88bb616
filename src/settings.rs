use std::{
	net::{IpAddr, Ipv4Addr, SocketAddr},
	str::FromStr,
	time::Duration,
};

use clap::{Arg, ArgMatches, Command};
use config::Config;
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use thiserror::Error;
use url::Url;

/// Error preventing the relay from starting
#[derive(Error, Debug)]
pub enum SettingsError {
	#[error("discord webhook url not configured (set --discord_webhook or DISCORD_WEBHOOK)")]
	MissingWebhook,
	#[error("invalid discord webhook url {0:?}: {1}")]
	InvalidWebhook(String, url::ParseError),
	#[error("invalid listen address {0:?}")]
	InvalidAddress(String),
	#[error("invalid log level {0:?}")]
	InvalidLogLevel(String),
	#[error("delivery timeout must be greater than zero")]
	InvalidTimeout,
	#[error("can't load config: {0}")]
	Config(#[from] config::ConfigError),
}

/// settings as read from defaults, config file, environment and command line
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
struct RawSettings {
	address: String,
	discord_webhook: Option<String>,
	discord_name: String,
	verbose: bool,
	log: String,
	#[serde_as(as = "DurationSecondsWithFrac<f64>")]
	delivery_timeout: Duration,
	telemetry_address: Option<String>,
}

/// Validated process configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
	/// address the alertmanager webhook receiver binds to
	pub address: SocketAddr,
	/// where rendered messages are posted
	pub webhook_url: Url,
	/// `username` of every posted message
	pub bot_name: String,
	/// log raw request bodies
	pub verbose: bool,
	/// maximum level of emitted log events
	pub log_level: tracing::Level,
	/// upper bound for a single webhook delivery
	pub delivery_timeout: Duration,
	/// serve prometheus metrics on this address if set
	pub telemetry_address: Option<SocketAddr>,
}

/// options that can be given on the command line or via environment, they
/// take precedence over the config file
const OVERRIDES: &[(&str, &str, &str)] = &[
	("address", "ADDRESS", "Service listen address and port"),
	("discord_webhook", "DISCORD_WEBHOOK", "DISCORD_WEBHOOK to push messages"),
	("discord_name", "DISCORD_NAME", "DISCORD_NAME of bot pushing messages"),
	("delivery_timeout", "DELIVERY_TIMEOUT", "timeout of a single webhook delivery in seconds"),
	("telemetry_address", "TELEMETRY_ADDRESS", "serve prometheus metrics on this address and port"),
];

fn command() -> Command<'static> {
	let mut command = Command::new(clap::crate_name!())
		.version(clap::crate_version!())
		.about(clap::crate_description!())
		.author(clap::crate_authors!())
		.args(&[
			Arg::new("config")
				.help("Config file with variables - optional. Command line and environment take precedence")
				.takes_value(true)
				.short('c')
				.long("config")
				.env("CONFIG"),
			Arg::new("verbose").help("Verbose mode").long("verbose").env("VERBOSE"),
			Arg::new("log")
				.help("log level")
				.possible_values(["Error", "Warn", "Info", "Debug", "Trace"])
				.ignore_case(true)
				.takes_value(true)
				.long("log")
				.env("LOG"),
		]);

	for (name, env, help) in OVERRIDES {
		command = command.arg(Arg::new(*name).help(*help).takes_value(true).long(name).env(env));
	}

	command
}

impl Settings {
	/// Parses the process arguments and environment. Exits the process on
	/// `--help`, `--version` or invalid arguments.
	pub fn load() -> Result<Self, SettingsError> {
		Self::from_matches(&command().get_matches())
	}

	fn from_matches(opts: &ArgMatches) -> Result<Self, SettingsError> {
		let mut builder = Config::builder()
			.set_default("address", ":9095")?
			.set_default("discord_name", "AlertManager")?
			.set_default("verbose", false)?
			.set_default("log", "info")?
			.set_default("delivery_timeout", 10.0)?;

		if let Some(config_path) = opts.value_of("config") {
			builder = builder.add_source(config::File::with_name(config_path));
		}

		for (name, ..) in OVERRIDES {
			if let Some(value) = opts.value_of(*name) {
				builder = builder.set_override(*name, value)?;
			}
		}
		if opts.is_present("verbose") {
			builder = builder.set_override("verbose", true)?;
		}
		if let Some(level) = opts.value_of("log") {
			builder = builder.set_override("log", level)?;
		}

		let raw: RawSettings = builder.build()?.try_deserialize()?;

		raw.try_into()
	}
}

impl TryFrom<RawSettings> for Settings {
	type Error = SettingsError;

	fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
		let webhook =
			raw.discord_webhook.filter(|url| !url.is_empty()).ok_or(SettingsError::MissingWebhook)?;
		let webhook_url =
			Url::parse(&webhook).map_err(|err| SettingsError::InvalidWebhook(webhook.clone(), err))?;

		let log_level = tracing::Level::from_str(&raw.log)
			.map_err(|_| SettingsError::InvalidLogLevel(raw.log.clone()))?;

		if raw.delivery_timeout.is_zero() {
			return Err(SettingsError::InvalidTimeout);
		}

		let telemetry_address = raw
			.telemetry_address
			.filter(|addr| !addr.is_empty())
			.map(|addr| parse_listen_address(&addr))
			.transpose()?;

		Ok(Self {
			address: parse_listen_address(&raw.address)?,
			webhook_url,
			bot_name: raw.discord_name,
			verbose: raw.verbose,
			log_level,
			delivery_timeout: raw.delivery_timeout,
			telemetry_address,
		})
	}
}

/// Parses `host:port`. An empty host (`:9095`) listens on all interfaces.
pub fn parse_listen_address(addr: &str) -> Result<SocketAddr, SettingsError> {
	if let Some(port) = addr.strip_prefix(':') {
		let port = port.parse().map_err(|_| SettingsError::InvalidAddress(addr.to_owned()))?;
		return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
	}

	addr.parse().map_err(|_| SettingsError::InvalidAddress(addr.to_owned()))
}
