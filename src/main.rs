use log::error;
use school_timetabler::config::ServerConfig;
use school_timetabler::server;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::run_server(config).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
