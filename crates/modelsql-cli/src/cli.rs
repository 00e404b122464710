use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Create,
    Generate,
    Migrate,
}

#[derive(Debug, Clone)]
pub enum Command {
    Help(HelpTopic),
    Create(CreateArgs),
    Generate(GenerateArgs),
    Migrate(MigrateArgs),
}

#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub schema: PathBuf,
    pub out: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub schema: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MigrateArgs {
    pub schema: PathBuf,
    pub version: Option<u32>,
    pub database: Option<String>,
}

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" => Ok(Command::Help(HelpTopic::Root)),
        "create" => parse_create(it.map(|s| s.as_str())),
        "generate" => parse_generate(it.map(|s| s.as_str())),
        "migrate" => parse_migrate(it.map(|s| s.as_str())),
        _ => anyhow::bail!("unknown command: {first}"),
    }
}

fn parse_create<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut schema = PathBuf::from(".");
    let mut out: Option<PathBuf> = None;
    let mut positionals: Vec<&str> = Vec::new();

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Create)),
            "--schema" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--schema requires a value");
                };
                schema = PathBuf::from(v);
            }
            _ if token.starts_with("--schema=") => {
                schema = PathBuf::from(token.trim_start_matches("--schema="));
            }
            "--out" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--out requires a value");
                };
                out = Some(PathBuf::from(v));
            }
            _ if token.starts_with("--out=") => {
                out = Some(PathBuf::from(token.trim_start_matches("--out=")));
            }
            other if !other.starts_with('-') => positionals.push(other),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    if positionals.len() > 2 {
        anyhow::bail!("unexpected argument: {}", positionals[2]);
    }
    if let Some(path) = positionals.first() {
        schema = PathBuf::from(path);
    }
    if let Some(path) = positionals.get(1) {
        out = Some(PathBuf::from(path));
    }

    Ok(Command::Create(CreateArgs { schema, out }))
}

fn parse_generate<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut schema = PathBuf::from(".");
    let mut positionals: Vec<&str> = Vec::new();

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Generate)),
            "--schema" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--schema requires a value");
                };
                schema = PathBuf::from(v);
            }
            _ if token.starts_with("--schema=") => {
                schema = PathBuf::from(token.trim_start_matches("--schema="));
            }
            other if !other.starts_with('-') => positionals.push(other),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    if positionals.len() > 1 {
        anyhow::bail!("unexpected argument: {}", positionals[1]);
    }
    if let Some(path) = positionals.first() {
        schema = PathBuf::from(path);
    }

    Ok(Command::Generate(GenerateArgs { schema }))
}

fn parse_migrate<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut schema = PathBuf::from(".");
    let mut version: Option<u32> = None;
    let mut database: Option<String> = None;
    let mut positionals: Vec<&str> = Vec::new();

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Migrate)),
            "--schema" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--schema requires a value");
                };
                schema = PathBuf::from(v);
            }
            _ if token.starts_with("--schema=") => {
                schema = PathBuf::from(token.trim_start_matches("--schema="));
            }
            "--version" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--version requires a value");
                };
                version = Some(parse_version(v)?);
            }
            _ if token.starts_with("--version=") => {
                version = Some(parse_version(token.trim_start_matches("--version="))?);
            }
            "--database" => {
                let Some(v) = it.next() else {
                    anyhow::bail!("--database requires a value");
                };
                database = Some(v.to_string());
            }
            _ if token.starts_with("--database=") => {
                database = Some(token.trim_start_matches("--database=").to_string());
            }
            other if !other.starts_with('-') => positionals.push(other),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    if positionals.len() > 2 {
        anyhow::bail!("unexpected argument: {}", positionals[2]);
    }
    if let Some(path) = positionals.first() {
        schema = PathBuf::from(path);
    }
    if let Some(v) = positionals.get(1) {
        version = Some(parse_version(v)?);
    }

    Ok(Command::Migrate(MigrateArgs {
        schema,
        version,
        database,
    }))
}

fn parse_version(v: &str) -> anyhow::Result<u32> {
    v.parse()
        .map_err(|_| anyhow::anyhow!("--version must be a number, got: {v}"))
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
modelsql - schema compiler and migration CLI

USAGE:
  modelsql <COMMAND> [OPTIONS]

COMMANDS:
  create        Compile the schema into database.sql and database.d.ts
  generate      Snapshot the schema and write migration stubs
  migrate       Apply migration scripts to the database

Run `modelsql <command> --help` for more."
            );
        }
        HelpTopic::Create => {
            println!(
                "\
USAGE:
  modelsql create [<SCHEMA> [<OUT>]] [OPTIONS]

ARGS:
  <SCHEMA>              Schema directory (default: .)
  <OUT>                 Output directory (default: the schema directory)

OPTIONS:
  --schema <DIR>        Schema directory
  --out <DIR>           Output directory
  -h, --help            Print help"
            );
        }
        HelpTopic::Generate => {
            println!(
                "\
USAGE:
  modelsql generate [<SCHEMA>] [OPTIONS]

ARGS:
  <SCHEMA>              Schema directory (default: .)

OPTIONS:
  --schema <DIR>        Schema directory
  -h, --help            Print help"
            );
        }
        HelpTopic::Migrate => {
            println!(
                "\
USAGE:
  modelsql migrate [<SCHEMA> [<VERSION>]] [OPTIONS]

ARGS:
  <SCHEMA>              Schema directory (default: .)
  <VERSION>             Stop after this schema version (default: apply all)

OPTIONS:
  --schema <DIR>        Schema directory
  --version <N>         Stop after this schema version
  --database <URL>      Connection string (overrides .database.json and DATABASE_URL)
  -h, --help            Print help"
            );
        }
    }
}
