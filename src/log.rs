use anyhow::Result;
use tracing_subscriber::{
	filter::LevelFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
	EnvFilter,
};

pub fn setup_logging(level: tracing::Level) -> Result<()> {
	let fmt_layer = fmt::layer();

	let filter_layer = EnvFilter::default()
		.add_directive(LevelFilter::from_level(level).into())
		.add_directive("hyper=warn".parse()?)
		.add_directive("hyper_util=warn".parse()?)
		.add_directive("reqwest=warn".parse()?);

	tracing_subscriber::registry().with(filter_layer).with(fmt_layer).try_init()?;

	Ok(())
}
