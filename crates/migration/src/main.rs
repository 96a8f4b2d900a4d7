use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

#[tokio::main]
async fn main() {
    // DATABASE_URL wins; otherwise reuse the server's config.yaml
    if env::var("DATABASE_URL").is_err() {
        let url = Config::builder()
            .add_source(config::File::with_name("config.yaml").required(false))
            .build()
            .and_then(|settings| settings.get_string("database_url"));
        match url {
            Ok(url) => env::set_var("DATABASE_URL", url),
            Err(e) => eprintln!("database_url not found in config.yaml: {e}"),
        }
    }
    cli::run_cli(migration::Migrator).await;
}
