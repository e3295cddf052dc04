mod cli;

use actix_web::{middleware, web, App, HttpServer};
use cavdb::server::AppState;
use cavdb::{VecStore, DEFAULT_DIMENSION};

#[actix_web::main]
async fn main() -> Result<(), std::io::Error> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 {
        let mut db = VecStore::new(DEFAULT_DIMENSION);
        cli::run_repl(&mut db);
    } else if args[1] == "serve" {
        // Usage: cavdb serve <db_path> [dimension] [addr]
        let path = args.get(2).cloned().unwrap_or_else(|| "cavdb.db".to_string());
        let dimension = match args.get(3) {
            Some(raw) => match raw.parse::<usize>() {
                Ok(d) => d,
                Err(_) => {
                    eprintln!("Invalid dimension: '{}'", raw);
                    std::process::exit(1);
                }
            },
            None => DEFAULT_DIMENSION,
        };
        let addr = args.get(4).cloned().unwrap_or_else(|| "0.0.0.0:7878".to_string());

        let state = match AppState::load_or_create(&path, dimension) {
            Ok(state) => web::Data::new(state),
            Err(e) => {
                eprintln!("Error opening '{}': {}", path, e);
                std::process::exit(1);
            }
        };

        log::info!(
            "serving '{}' ({} vectors, dimension {}) on {}",
            path,
            state.store.count(),
            state.store.dimension(),
            addr
        );

        HttpServer::new(move || {
            App::new()
                .wrap(middleware::Logger::default())
                .app_data(state.clone())
                .configure(cavdb::server::config)
        })
        .bind(addr.as_str())?
        .run()
        .await?;
    } else {
        cli::run_single_command();
    }

    Ok(())
}
