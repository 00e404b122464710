use crate::cli::CreateArgs;
use modelsql::{generate_database_sql, load_model, to_interfaces};
use std::fs;

pub fn run(args: CreateArgs) -> anyhow::Result<()> {
    let model = load_model(&args.schema)?;
    let out = args.out.unwrap_or_else(|| args.schema.clone());
    fs::create_dir_all(&out)?;

    let sql = generate_database_sql(&model)?;
    let sql_path = out.join("database.sql");
    fs::write(&sql_path, sql)?;
    println!("created {}", sql_path.display());

    let decl = to_interfaces(&model);
    let decl_path = out.join("database.d.ts");
    fs::write(&decl_path, decl)?;
    println!("created {}", decl_path.display());

    Ok(())
}
