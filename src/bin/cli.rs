//! Elevator CLI Client
//!
//! Command-line interface for interacting with an Elevator server.

use clap::{Parser, Subcommand};
use elevator::network::Client;
use elevator::protocol::{decode_values, Response, Status};

/// Elevator CLI
#[derive(Parser, Debug)]
#[command(name = "elevator-cli")]
#[command(about = "CLI for the Elevator key-value server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:4141")]
    server: String,

    /// Database to run data commands against
    #[arg(long, default_value = "default")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { key: String },

    /// Set a key-value pair
    Put { key: String, value: String },

    /// Delete a key
    Del { key: String },

    /// Check whether a key exists
    Exists { key: String },

    /// Get several keys at once
    Mget { keys: Vec<String> },

    /// Add to an integer value
    Incr {
        key: String,
        #[arg(default_value = "1", allow_hyphen_values = true)]
        delta: i64,
    },

    /// List entries with start <= key <= end
    Range { start: String, end: String },

    /// Create a database
    Create { name: String },

    /// Remove a database and delete its files
    Drop { name: String },

    /// List databases
    List,

    /// Mount a database
    Mount { name: String },

    /// Unmount a database
    Umount { name: String },

    /// Show a database's mount state
    Status { name: String },

    /// Ping the server
    Ping,
}

fn main() {
    let args = Args::parse();

    let mut client = match Client::connect(&args.server) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to connect to {}: {}", args.server, e);
            std::process::exit(1);
        }
    };

    let db = args.db.as_str();
    let result = match &args.command {
        Commands::Get { key } => client.call(db, "GET", &[key.as_bytes()]),
        Commands::Put { key, value } => client.call(db, "PUT", &[key.as_bytes(), value.as_bytes()]),
        Commands::Del { key } => client.call(db, "DELETE", &[key.as_bytes()]),
        Commands::Exists { key } => client.call(db, "EXISTS", &[key.as_bytes()]),
        Commands::Mget { keys } => {
            let keys: Vec<&[u8]> = keys.iter().map(|k| k.as_bytes()).collect();
            client.call(db, "MGET", &keys)
        }
        Commands::Incr { key, delta } => {
            let delta = delta.to_string();
            client.call(db, "INCR", &[key.as_bytes(), delta.as_bytes()])
        }
        Commands::Range { start, end } => client.call(db, "RANGE", &[start.as_bytes(), end.as_bytes()]),
        Commands::Create { name } => client.call_global("DBCREATE", &[name.as_bytes()]),
        Commands::Drop { name } => client.call_global("DBDROP", &[name.as_bytes()]),
        Commands::List => client.call_global("DBLIST", &[]),
        Commands::Mount { name } => client.call_global("DBMOUNT", &[name.as_bytes()]),
        Commands::Umount { name } => client.call_global("DBUMOUNT", &[name.as_bytes()]),
        Commands::Status { name } => client.call_global("DBSTATUS", &[name.as_bytes()]),
        Commands::Ping => client.call_global("PING", &[]),
    };

    let response = match result {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Request failed: {}", e);
            std::process::exit(1);
        }
    };

    let lists = matches!(
        args.command,
        Commands::Mget { .. } | Commands::Range { .. } | Commands::List
    );
    std::process::exit(print_response(&response, lists));
}

/// Print a response and return the process exit code
fn print_response(response: &Response, lists: bool) -> i32 {
    match response.status {
        Status::Ok => {
            match response.payload.as_deref() {
                Some(payload) if lists => match decode_values(payload) {
                    Ok(items) => {
                        for item in items {
                            println!("{}", String::from_utf8_lossy(&item));
                        }
                    }
                    Err(e) => eprintln!("Malformed list reply: {}", e),
                },
                Some(payload) => println!("{}", String::from_utf8_lossy(payload)),
                None => println!("OK"),
            }
            0
        }
        Status::NotFound => {
            match response.payload {
                Some(_) => println!("(not found) {}", response.text()),
                None => println!("(not found)"),
            }
            1
        }
        _ => {
            eprintln!("{:?}: {}", response.status, response.text());
            2
        }
    }
}
