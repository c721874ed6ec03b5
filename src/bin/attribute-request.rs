use std::{cell::RefCell, path::PathBuf, rc::Rc, time::Duration};

use attribute_request::{
    AttributeRequestCallback, AttributeRequester, AttributeScope, Error, InMemoryTransport,
    RequestConfig, RequestCounter, router::MessageRouter, topic::response_topic,
};
use clap::Parser;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Runs one attribute request against an in-memory transport and prints what happens.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "ATTRIBUTE_REQUEST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug mode
    #[arg(short, long)]
    verbose: bool,

    /// Attribute scope (client, shared)
    #[arg(long, default_value = "client")]
    scope: AttributeScope,

    /// Comma separated attribute keys
    #[arg(long, value_delimiter = ',', required = true)]
    keys: Vec<String>,

    /// Response document the simulated server answers with; omit to let the request time out
    #[arg(long)]
    response: Option<String>,

    /// Tick on which the response is delivered
    #[arg(long, default_value_t = 1)]
    respond_after: u32,

    /// Maximum number of ticks to run
    #[arg(long, default_value_t = 100)]
    ticks: u32,

    /// Interval between ticks, in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_interval_ms: u64,
}

fn load_config(cli: &Cli) -> Result<RequestConfig, Error> {
    let mut config = match &cli.config {
        Some(path) => attribute_request::config::from_file(path)?,
        None => RequestConfig::default(),
    };
    if cli.verbose {
        config.debug = true;
    }
    Ok(config)
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let config = load_config(cli)?;

    let response = cli
        .response
        .as_deref()
        .map(serde_json::from_str::<Value>)
        .transpose()
        .map_err(|e| Error::internal(format!("Invalid response document: {}", e)))?;

    let transport = Rc::new(InMemoryTransport::new());
    let requester = Rc::new(RefCell::new(AttributeRequester::new(
        config,
        transport.clone(),
        Rc::new(RequestCounter::new()),
    )));
    debug!(config = ?requester.borrow().config(), "requester ready");
    let mut router = MessageRouter::new();
    router.register(requester.clone());

    let result: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    let timed_out = Rc::new(RefCell::new(false));
    let callback = {
        let result = result.clone();
        let timed_out = timed_out.clone();
        AttributeRequestCallback::new(cli.keys.clone(), move |attributes| {
            *result.borrow_mut() = Some(attributes.clone());
        })
        .on_timeout(move || *timed_out.borrow_mut() = true)
    };

    let request_id = requester.borrow_mut().request(cli.scope, callback)?;
    for (topic, payload) in transport.sent() {
        println!("-> {} {}", topic, payload);
    }

    let mut interval = tokio::time::interval(Duration::from_millis(cli.tick_interval_ms));
    for tick in 1..=cli.ticks {
        interval.tick().await;
        router.poll();

        if let Some(response) = response.as_ref().filter(|_| tick == cli.respond_after) {
            let topic = response_topic(request_id);
            println!("<- {} {}", topic, response);
            router.route(&topic, response.to_string().as_bytes())?;
        }
        if requester.borrow().pending_count() == 0 {
            break;
        }
    }

    match (result.borrow().as_ref(), *timed_out.borrow()) {
        (Some(attributes), _) => {
            let pretty = serde_json::to_string_pretty(attributes)
                .map_err(|e| Error::internal(format!("Failed to print attributes: {}", e)))?;
            println!("{}", pretty);
        }
        (None, true) => info!(request_id, "request timed out"),
        (None, false) => info!(request_id, "request still pending"),
    }

    router.unsubscribe();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer())
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
