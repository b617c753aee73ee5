use std::sync::Arc;

use anyhow::bail;
use colored::Colorize;
use rdb_bridge::{BackendBridge, BoxedReferenceFactory, RefdbClient, ReferenceFactory, Status};
use rdb_refs::{Reference, ReferenceTarget};
use rdb_types::ObjectId;
use tracing::debug;

use crate::cli::*;
use crate::config::StoreFile;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut store = match &cli.config {
        Some(path) => StoreFile::load(path)?,
        None => StoreFile::default(),
    };
    let backend = store.seed()?;
    let factory: Arc<dyn ReferenceFactory> = Arc::new(BoxedReferenceFactory);
    let mut bridge = BackendBridge::new(backend.clone(), Arc::clone(&factory));
    // SAFETY: the table was just built and only this client frees it.
    let db = unsafe { RefdbClient::new(bridge.call_table(), factory) };

    let changed = match cli.command {
        Command::Exists(args) => cmd_exists(&db, args)?,
        Command::Lookup(args) => cmd_lookup(&db, args)?,
        Command::Write(args) => cmd_write(&db, args)?,
        Command::Delete(args) => cmd_delete(&db, args)?,
        Command::List(args) => cmd_list(&db, args)?,
        Command::Compress => cmd_compress(&db)?,
    };
    db.free();

    if let (true, Some(path)) = (changed, &cli.config) {
        store.set_references(&backend.snapshot()?);
        store.save(path)?;
        debug!(path = %path.display(), refs = store.refs.len(), "store saved");
    }
    Ok(())
}

fn show(reference: &Reference) -> String {
    match reference.target() {
        ReferenceTarget::Direct(oid) => format!("{} {}", oid.to_hex().yellow(), reference.name()),
        ReferenceTarget::Symbolic(target) => {
            format!("{} {} {}", "->".dimmed(), target.cyan(), reference.name())
        }
    }
}

fn cmd_exists(db: &RefdbClient, args: NameArgs) -> anyhow::Result<bool> {
    if db.exists(&args.name)? {
        println!("{} {}", "✓".green(), args.name);
    } else {
        println!("{} {}", "✗".red(), args.name);
    }
    Ok(false)
}

fn cmd_lookup(db: &RefdbClient, args: NameArgs) -> anyhow::Result<bool> {
    match db.lookup(&args.name)? {
        Some(reference) => println!("{}", show(&reference)),
        None => bail!("reference not found: {}", args.name),
    }
    Ok(false)
}

fn cmd_write(db: &RefdbClient, args: WriteArgs) -> anyhow::Result<bool> {
    let reference = match (args.oid, args.symbolic) {
        (Some(hex), None) => Reference::direct(args.name, ObjectId::from_hex(&hex)?),
        (None, Some(target)) => Reference::symbolic(args.name, target),
        _ => bail!("write needs exactly one of --oid or --symbolic"),
    };
    match db.write(&reference, args.force) {
        Ok(()) => {
            println!("{} {}", "created".green(), show(&reference));
            Ok(true)
        }
        Err(err) if err.status() == Some(Status::Exists) => {
            bail!("reference already exists: {}", reference.name())
        }
        Err(err) => Err(err.into()),
    }
}

fn cmd_delete(db: &RefdbClient, args: NameArgs) -> anyhow::Result<bool> {
    db.delete(&args.name)?;
    println!("{} {}", "deleted".red(), args.name);
    Ok(true)
}

fn cmd_list(db: &RefdbClient, args: ListArgs) -> anyhow::Result<bool> {
    let mut iter = db.iter(args.pattern.as_deref())?;
    if args.names_only {
        while let Some(name) = iter.next_name()? {
            println!("{name}");
        }
    } else {
        for reference in iter {
            println!("{}", show(&reference?));
        }
    }
    Ok(false)
}

fn cmd_compress(db: &RefdbClient) -> anyhow::Result<bool> {
    db.compress()?;
    println!("{} storage compressed", "✓".green());
    Ok(false)
}
