use {anyhow::Result, clap::Parser, sor_quote::arguments::Arguments};

fn main() -> Result<()> {
    let args = Arguments::parse();
    observe::tracing::initialize(&args.log_filter, args.use_json_logs);
    tracing::info!("running sor-quote with arguments:\n{}", args);

    let now = u64::try_from(chrono::Utc::now().timestamp())?;
    let info = sor_quote::run(&args, now)?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    tracing::debug!("metrics:\n{}", observe::metrics::encode()?);
    Ok(())
}
