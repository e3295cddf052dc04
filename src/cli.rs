use cavdb::{VecStore, DEFAULT_DIMENSION};
use std::env;
use std::io::{self, Write};

pub enum Command {
    Insert { vec: Vec<f64> },
    Query { vec: Vec<f64>, k: usize },
    Get { id: String },
    List,
    Count,
    New { dimension: usize },
    Save { path: String },
    Load { path: String },
}

/// Parse a command from a provided argument vector
/// This is used both for command-line args and REPL input
pub fn parse_command_from_args(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command provided. Use: insert, query, get, list, count, new, save, load".to_string());
    }

    let command = &args[1];

    match command.as_str() {
        "insert" => parse_insert(args),
        "query" => parse_query(args),
        "get" => parse_get(args),
        "list" => parse_list(args),
        "count" => parse_count(args),
        "new" => parse_new(args),
        "save" => parse_save(args),
        "load" => parse_load(args),
        _ => Err(format!("Unknown command: {}. Available: insert, query, get, list, count, new, save, load", command)),
    }
}

/// Parse the 'insert' command
/// Usage: cavdb insert <vector>
/// The id is not an argument: it is derived from the vector content.
fn parse_insert(args: &[String]) -> Result<Command, String> {
    // args[0] = program name
    // args[1] = "insert"
    // args[2..] = vector (required, at least 1 component)
    if args.len() < 3 {
        return Err("'insert' command requires a vector. Usage: cavdb insert <v1> <v2> ...".to_string());
    }

    let vec: Result<Vec<f64>, _> = args[2..].iter()
        .map(|s| s.parse::<f64>())
        .collect();

    match vec {
        Ok(v) => Ok(Command::Insert { vec: v }),
        Err(_) => Err("Vector parsing error".to_string()),
    }
}

/// Parse the 'query' command
/// Usage: cavdb query <v1> <v2> ... [--k <number>]
fn parse_query(args: &[String]) -> Result<Command, String> {
    // args[0] = program name
    // args[1] = "query"
    // args[2..] = probe components and optional --k flag

    if args.len() < 3 {
        return Err("'query' command requires at least one vector component. Usage: cavdb query <v1> <v2> ... [--k <number>]".to_string());
    }

    let mut k = 5; // default value
    let mut vector_end = args.len();

    // Check if last two args are --k and a number
    if args.len() >= 4 && args[args.len() - 2] == "--k" {
        match args[args.len() - 1].parse::<i64>() {
            Ok(parsed) if parsed >= 0 => {
                k = parsed as usize;
                vector_end = args.len() - 2; // Exclude --k and the number
            }
            Ok(parsed) => {
                return Err(format!("Invalid --k value: {}. k must be non-negative.", parsed));
            }
            Err(_) => {
                return Err(format!("Invalid --k value: '{}'. Must be a non-negative integer.", args[args.len() - 1]));
            }
        }
    }

    let vec: Result<Vec<f64>, _> = args[2..vector_end].iter()
        .map(|s| s.parse::<f64>())
        .collect();

    match vec {
        Ok(v) => {
            if v.is_empty() {
                return Err("Query vector cannot be empty".to_string());
            }
            Ok(Command::Query { vec: v, k })
        }
        Err(_) => Err("Failed to parse vector components as numbers".to_string()),
    }
}

/// Parse the 'get' command
/// Usage: cavdb get <id>
fn parse_get(args: &[String]) -> Result<Command, String> {
    if args.len() < 3 {
        return Err("'get' command requires an ID. Usage: cavdb get <id>".to_string());
    }

    let id = args[2].clone();

    Ok(Command::Get { id })
}

/// Parse the 'list' command
/// Usage: cavdb list
fn parse_list(args: &[String]) -> Result<Command, String> {
    if args.len() > 2 {
        eprintln!("Warning: 'list' command takes no arguments, ignoring extras");
    }

    Ok(Command::List)
}

/// Parse the 'count' command
/// Usage: cavdb count
fn parse_count(args: &[String]) -> Result<Command, String> {
    if args.len() > 2 {
        eprintln!("Warning: 'count' command takes no arguments, ignoring extras");
    }

    Ok(Command::Count)
}

/// Parse the 'new' command
/// Usage: cavdb new <dimension>
fn parse_new(args: &[String]) -> Result<Command, String> {
    if args.len() < 3 {
        return Err("'new' command requires a dimension. Usage: new <dimension>".to_string());
    }

    match args[2].parse::<usize>() {
        Ok(dimension) => Ok(Command::New { dimension }),
        Err(_) => Err(format!("Invalid dimension: '{}'. Must be a positive integer.", args[2])),
    }
}

/// Parse the 'save' command
/// Usage: cavdb save <path>
fn parse_save(args: &[String]) -> Result<Command, String> {
    if args.len() < 3 {
        return Err("'save' command requires a file path. Usage: save <path>".to_string());
    }
    let path = args[2].clone();
    Ok(Command::Save { path })
}

/// Parse the 'load' command
/// Usage: cavdb load <path>
fn parse_load(args: &[String]) -> Result<Command, String> {
    if args.len() < 3 {
        return Err("'load' command requires a file path. Usage: load <path>".to_string());
    }
    let path = args[2].clone();
    Ok(Command::Load { path })
}

/// REPL mode - interactive session with persistent database
pub fn run_repl(db: &mut VecStore) {
    println!("CAVDB - Content-Addressed Vector Store");
    println!("Dimension: {}. Type 'help' for commands, 'exit' or 'quit' to quit\n", db.dimension());

    loop {
        print!("cavdb> ");
        if let Err(error) = io::stdout().flush() {
            eprintln!("Error flushing stdout: {}", error);
        }

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(_) => {}
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                continue;
            }
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input == "exit" || input == "quit" {
            println!("Goodbye!");
            break;
        }

        if input == "help" {
            print_help();
            continue;
        }

        let mut args: Vec<String> = vec!["cavdb".to_string()];
        args.extend(input.split_whitespace().map(|s| s.to_string()));

        let command = match parse_command_from_args(&args) {
            Ok(cmd) => cmd,
            Err(error) => {
                eprintln!("Error: {}", error);
                continue;
            }
        };

        execute_command(db, command);
    }
}

/// Single-command mode - load db from path, execute command, save back
/// Usage: cavdb <db_path> <command> [args...]
pub fn run_single_command() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: cavdb <db_path> <command> [args...]");
        std::process::exit(1);
    }

    let db_path = &args[1];

    // Load existing db or create new with the default dimension
    let mut db = if std::path::Path::new(db_path).exists() {
        match VecStore::load(db_path) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("Error loading '{}': {}", db_path, e);
                std::process::exit(1);
            }
        }
    } else {
        VecStore::new(DEFAULT_DIMENSION)
    };

    // Rebuild args: shift so args[1] becomes the command
    let shifted_args: Vec<String> = std::iter::once(args[0].clone())
        .chain(args[2..].iter().cloned())
        .collect();

    let command = match parse_command_from_args(&shifted_args) {
        Ok(cmd) => cmd,
        Err(error) => {
            eprintln!("Error: {}", error);
            std::process::exit(1);
        }
    };

    execute_command(&mut db, command);

    // Save db back to path
    if let Err(e) = db.save(db_path) {
        eprintln!("Error saving '{}': {}", db_path, e);
        std::process::exit(1);
    }
}

fn execute_command(db: &mut VecStore, command: Command) {
    match command {
        Command::Insert { vec } => {
            match db.insert(vec) {
                Ok((id, true)) => println!("Inserted {}", id),
                Ok((id, false)) => println!("Duplicate content, already stored as {}", id),
                Err(error) => eprintln!("Error: {}", error),
            }
        }

        Command::Query { vec, k } => {
            match db.knn(&vec, k) {
                Ok(results) => {
                    if results.is_empty() {
                        println!("No results found");
                    } else {
                        println!("Top {} results:", results.len());
                        for (rank, (record, distance)) in results.iter().enumerate() {
                            println!("{}. ID: {}, Distance: {:.4}, Vector: {:?}",
                                rank + 1, record.id, distance, record.vector);
                        }
                    }
                }
                Err(error) => eprintln!("Error: {}", error),
            }
        }

        Command::Get { id } => {
            match db.get(&id) {
                Ok(record) => println!("Vector '{}': {:?} (created {})", id, record.vector, record.created_at),
                Err(error) => eprintln!("Error: {}", error),
            }
        }

        Command::List => {
            let records = db.scan();
            if records.is_empty() {
                println!("Database is empty");
            } else {
                println!("Stored vectors:");
                for record in &records {
                    println!("  {}: {:?}", record.id, record.vector);
                }
                println!("Total: {} vectors", db.count());
            }
        }

        Command::Count => println!("{}", db.count()),

        Command::New { dimension } => {
            *db = VecStore::new(dimension);
            println!("New empty store with dimension {}", dimension);
        }

        Command::Save { path } => {
            match db.save(&path) {
                Ok(()) => println!("Database saved to '{}'", path),
                Err(error) => eprintln!("Error: {}", error),
            }
        }

        Command::Load { path } => {
            match VecStore::load(&path) {
                Ok(loaded_db) => {
                    let count = loaded_db.count();
                    *db = loaded_db;
                    println!("Database loaded from '{}' ({} vectors, dimension {})", path, count, db.dimension());
                }
                Err(error) => eprintln!("Error: {}", error),
            }
        }
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  insert <v1> <v2> ...         - Insert a vector (id derived from content)");
    println!("  query <v1> <v2> ... [--k N]  - Exact k-nearest-neighbor query (default k=5)");
    println!("  get <id>                     - Retrieve a vector by ID");
    println!("  list                         - List all vectors");
    println!("  count                        - Show vector count");
    println!("  new <dimension>              - Start a new empty store with another dimension");
    println!("  save <path>                  - Save database to file");
    println!("  load <path>                  - Load database from file");
    println!("  help                         - Show this help");
    println!("  exit, quit                   - Exit the program");
}
