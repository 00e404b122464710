mod cli;
mod create;
mod generate;
mod migrate_cmd;

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Create(args) => create::run(args),
        cli::Command::Generate(args) => generate::run(args),
        cli::Command::Migrate(args) => migrate_cmd::run(args).await,
    }
}
