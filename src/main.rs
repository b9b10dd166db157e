use clap::Parser;
use manualseek::{
    DataDir, Document, EngineConfig, Error, Result, Session,
    retriever::Passage,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

pub mod cli;

use cli::{Cli, Command};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("MANUALSEEK_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let mut config = EngineConfig::load(&data_dir.config_file())?;
    config.apply_env();
    if let Some(collection) = cli.collection {
        config.collection = collection;
    }

    match cli.command {
        Command::Index(args) => cmd_index(&data_dir, config, &args)?,
        Command::Search(args) => cmd_search(&data_dir, config, &args)?,
        Command::Status(args) => cmd_status(&data_dir, &config, args.json)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_session(data_dir: &DataDir, config: EngineConfig) -> Result<Session> {
    let provider = config.embedding.build_provider()?;
    Session::open(&data_dir.index_db(), config, provider)
}

fn cmd_index(
    data_dir: &DataDir,
    config: EngineConfig,
    args: &cli::IndexArgs,
) -> Result<()> {
    let document = Document::read_file(&args.file, args.id.as_deref())?;
    let session = open_session(data_dir, config)?;

    let index = if args.force {
        session.build(&document)?
    } else {
        session.open_or_build(&document)?
    };

    println!(
        "Indexed {} into '{}': {} chunks",
        document.id(),
        session.config().collection,
        index.len()
    );
    session.close();
    Ok(())
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    results: &'a [Passage],
}

fn cmd_search(
    data_dir: &DataDir,
    config: EngineConfig,
    args: &cli::SearchArgs,
) -> Result<()> {
    let document = Document::read_file(&args.source, args.id.as_deref())?;
    let session = open_session(data_dir, config)?;

    // Never build implicitly from the search path.
    if !session.load(&document)? {
        return Err(Error::IndexNotBuilt {
            collection: session.config().collection.clone(),
        });
    }

    let passages = session.retrieve(&args.query, args.count, args.min_score)?;

    if args.json {
        let output = SearchOutput {
            query: &args.query,
            results: &passages,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if passages.is_empty() {
        println!("No results.");
    } else {
        for (rank, passage) in passages.iter().enumerate() {
            println!("{:>2}. [{:.3}] {}", rank + 1, passage.score, passage.formatted());
        }
    }

    session.close();
    Ok(())
}

#[derive(Serialize)]
struct StatusOutput<'a> {
    data_dir: String,
    collection: &'a str,
    model: &'a str,
    indexes: Vec<manualseek::Manifest>,
}

fn cmd_status(data_dir: &DataDir, config: &EngineConfig, json: bool) -> Result<()> {
    let store = manualseek::IndexStore::open(&data_dir.index_db())?;
    let manifests = store.list_manifests()?;
    let provider = config.embedding.build_provider()?;

    if json {
        let output = StatusOutput {
            data_dir: data_dir.root().display().to_string(),
            collection: &config.collection,
            model: provider.model_id(),
            indexes: manifests,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Active collection: {}", config.collection);
        println!("Embedding model: {}", provider.model_id());
        println!("Indexes: {}", manifests.len());
        for m in &manifests {
            println!(
                "  {}: {} ({} chunks, {} x {}, chunk {}/{})",
                m.collection,
                m.document_id,
                m.entry_count,
                m.model_id,
                m.dimension,
                m.max_chunk_size,
                m.overlap_size
            );
        }
    }
    Ok(())
}
