//! mongocursor - stream MongoDB query results through a batched cursor
//!
//! Runs a find or aggregate command, then pulls documents batch by batch and
//! prints each one as relaxed extended JSON on its own line. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! mongocursor --uri mongodb://localhost:27017 find app.users --filter '{"age": {"$gt": 21}}'
//! mongocursor aggregate app.orders --pipeline '[{"$group": {"_id": "$status"}}]'
//! mongocursor find app.log --tailable --await-data
//! ```

use std::sync::Arc;

use clap::Parser;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use mongocursor::cli::{
    CliArgs, Commands, parse_document, parse_namespace, parse_pipeline, parse_verbosity,
    sanitize_uri,
};
use mongocursor::config::Config;
use mongocursor::connection::MongoTopology;
use mongocursor::cursor::{AggregateCursor, CursorCommand, CursorStream, FindCursor};
use mongocursor::error::{ConfigError, Result};
use mongocursor::topology::Topology;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments
/// 2. Load configuration and apply overrides
/// 3. Initialize logging
/// 4. Connect and run the requested cursor
async fn run() -> Result<()> {
    let args = CliArgs::parse();

    let mut config = Config::load(args.config_file.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate()?;

    initialize_logging(&config);

    if let Commands::Config = args.command {
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        print!("{}", rendered);
        return Ok(());
    }

    debug!("Connecting to {}", sanitize_uri(&config.connection.uri));
    let topology = Arc::new(MongoTopology::connect(&config.connection).await?);

    let result = execute(&args, &config, topology.clone()).await;
    topology.shutdown().await;
    result
}

/// Build the cursor for the subcommand and print its output
async fn execute(args: &CliArgs, config: &Config, topology: Arc<MongoTopology>) -> Result<()> {
    let options = args.cursor_options(config)?;
    let topology: Arc<dyn Topology> = topology;

    match &args.command {
        Commands::Find {
            namespace,
            filter,
            sort,
            projection,
            limit,
            skip,
            tailable,
            await_data,
            explain,
        } => {
            let namespace = parse_namespace(namespace)?;
            let filter = parse_document("filter", filter)?;
            let mut cursor = FindCursor::create(topology, namespace, filter, options);

            if *tailable {
                cursor.add_cursor_flag("tailable", true)?;
            }
            if *await_data {
                cursor.add_cursor_flag("awaitData", true)?;
            }
            if let Some(sort) = sort {
                cursor.sort(parse_document("sort", sort)?)?;
            }
            if let Some(projection) = projection {
                cursor.project(parse_document("projection", projection)?)?;
            }
            if let Some(limit) = limit {
                cursor.limit(*limit)?;
            }
            if let Some(skip) = skip {
                cursor.skip(*skip)?;
            }

            if let Some(verbosity) = explain {
                let plan = cursor.explain(parse_verbosity(verbosity)?).await?;
                print_document(plan);
                return Ok(());
            }
            print_stream(cursor.stream()).await
        }

        Commands::Aggregate {
            namespace,
            pipeline,
            allow_disk_use,
            explain,
        } => {
            let namespace = parse_namespace(namespace)?;
            let pipeline = parse_pipeline(pipeline)?;
            let mut cursor = AggregateCursor::create(topology, namespace, pipeline, options);
            if *allow_disk_use {
                cursor.allow_disk_use(true)?;
            }

            if let Some(verbosity) = explain {
                let plan = cursor.explain(parse_verbosity(verbosity)?).await?;
                print_document(plan);
                return Ok(());
            }
            print_stream(cursor.stream()).await
        }

        Commands::Config => Ok(()),
    }
}

/// Print every document of the stream until it ends or Ctrl+C is pressed
async fn print_stream<C: CursorCommand>(mut stream: CursorStream<C>) -> Result<()> {
    let mut count: u64 = 0;
    let mut interrupted = false;

    loop {
        tokio::select! {
            item = stream.try_next() => match item? {
                Some(document) => {
                    print_document(document);
                    count += 1;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }

    if interrupted {
        info!("Interrupted; closing cursor");
        stream.close().await?;
    }
    info!("{} document(s) returned", count);
    Ok(())
}

fn print_document(document: Document) {
    println!("{}", Bson::Document(document).into_relaxed_extjson());
}

/// Initialize logging system from the logging configuration
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Arguments
/// * `config` - Configuration with verbosity already applied
fn initialize_logging(config: &Config) {
    let level = config.logging.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
