// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `kvs`: a thin command-line front-end over [`bitcask_kv::Store`].

use bitcask_kv::Store;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "kvs", version, about = "A durable, embeddable key-value store")]
struct Cli {
    /// Data directory to open (defaults to the current directory)
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the value stored for KEY
    Get { key: String },

    /// Store VALUE under KEY
    Set { key: String, value: String },

    /// Remove KEY
    Rm { key: String },
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let path = cli.path.unwrap_or_else(|| PathBuf::from("."));

    match run(&path, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kvs: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &PathBuf, command: Command) -> bitcask_kv::Result<()> {
    let store = Store::open(path)?;

    match command {
        Command::Get { key } => match store.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("Key not found"),
        },
        Command::Set { key, value } => store.set(key.as_bytes(), value.as_bytes())?,
        Command::Rm { key } => store.remove(key.as_bytes())?,
    }

    store.close()
}
