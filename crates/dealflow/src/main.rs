use clap::Parser;

#[tokio::main]
async fn main() {
    let args = dealflow::arguments::Arguments::parse();
    observe::tracing::initialize(&args.log_filter, args.log_json);
    observe::metrics::setup_registry(Some("dealflow".into()), None);
    tracing::info!("running dealflow with arguments:\n{}", args);
    dealflow::run::run(args).await;
}
