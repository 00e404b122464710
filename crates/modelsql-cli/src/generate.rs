use crate::cli::GenerateArgs;

pub fn run(args: GenerateArgs) -> anyhow::Result<()> {
    match modelsql::generate(&args.schema)? {
        Some(generated) => {
            println!(
                "version {} snapshot: {}",
                generated.version,
                generated.history_dir.display()
            );
            println!("edit the migration stubs:");
            println!("  {}", generated.up_path.display());
            println!("  {}", generated.down_path.display());
        }
        None => println!("schema is up to date"),
    }
    Ok(())
}
