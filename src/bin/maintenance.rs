use std::process::ExitCode;

use dotenv::dotenv;
use shop_service::config::AppConfig;
use shop_service::database::MongoDB;
use shop_service::maintenance::{self, Task};

fn usage() {
    let names: Vec<&str> = Task::ALL.iter().map(|t| t.name()).collect();
    eprintln!("usage: shop-maintenance <task> [args]");
    eprintln!("tasks: {}", names.join(", "));
}

#[actix_web::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(task) = args.first().and_then(|name| Task::parse(name)) else {
        if let Some(name) = args.first() {
            eprintln!("unknown task: {}", name);
        }
        usage();
        return ExitCode::from(2);
    };

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let db = match MongoDB::new(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            log::error!("❌ Failed to connect to MongoDB: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match maintenance::run(&db, &config, task, &args[1..]).await {
        Ok(summary) => {
            log::info!("✅ {} finished", task.name());
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("❌ {} failed: {}", task.name(), e);
            ExitCode::FAILURE
        }
    }
}
