use crate::cli::MigrateArgs;
use modelsql::PgChannel;

pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    let config = modelsql::load_database_config(&args.schema)?;
    let url = args
        .database
        .or(config.connection)
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no connection string: pass --database, set \"connection\" in .database.json, or set DATABASE_URL"
            )
        })?;

    let channel = PgChannel::connect(&url).await?;
    modelsql::migrate(&channel, &args.schema, args.version).await?;
    println!("migrations applied");
    Ok(())
}
