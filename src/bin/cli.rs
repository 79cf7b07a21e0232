//! Binary entry point for the gqlcypher translation CLI.
#![forbid(unsafe_code)]

#[path = "cli/config.rs"]
mod config;

use std::error::Error;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use gql_cypher::error::TranslateErrorWithCode;
use gql_cypher::schema::{CompositeKind, Entity};
use gql_cypher::{AuthContext, QueryPlan, Request, SchemaModel, TranslateError, Translator};
use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use config::{CliConfig, Profile};

#[derive(Parser, Debug)]
#[command(
    name = "gqlcypher",
    version,
    about = "Translate GraphQL-style requests into Cypher query plans",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "GQLCYPHER_CONFIG",
        value_name = "FILE",
        help = "CLI config file (defaults to the user config directory)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Config profile to use")]
    profile: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Schema definition JSON (overrides the profile schema)"
    )]
    schema: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RequestArgs {
    #[command(flatten)]
    schema: SchemaArgs,

    #[arg(value_name = "REQUEST", help = "Request JSON file, or '-' for stdin")]
    request: PathBuf,

    #[arg(
        long,
        value_name = "FILE",
        help = "Decoded token claims JSON; the request is anonymous without it"
    )]
    jwt: Option<PathBuf>,

    #[arg(long, help = "Emit change events from delete operations")]
    track_changes: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Print the Cypher text and parameters for a request")]
    Translate(RequestArgs),

    #[command(about = "Print the clause tree of a request as JSON")]
    Explain(RequestArgs),

    #[command(about = "List the entities of a schema definition")]
    Schema(SchemaArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateReport {
    cypher: String,
    params: Json,
    plan_hash: String,
}

#[derive(Serialize)]
struct EntityReport {
    name: String,
    kind: &'static str,
    labels: Vec<String>,
    members: Vec<String>,
    attributes: Vec<String>,
    relationships: Vec<String>,
}

fn main() {
    install_tracing_subscriber();
    if let Err(err) = run() {
        match err.downcast_ref::<TranslateError>() {
            Some(translate) => {
                eprintln!("error{}", TranslateErrorWithCode(translate));
                std::process::exit(2);
            }
            None => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
    }
}

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    let profile = config.profile(cli.profile.as_deref())?;
    debug!(
        config = ?config.path(),
        profile = %profile.name,
        "cli.config"
    );

    match &cli.command {
        Command::Translate(args) => {
            let plan = plan_request(&profile, args)?;
            let report = TranslateReport {
                cypher: plan.cypher(),
                params: serde_json::to_value(&plan.parameters)?,
                plan_hash: format!("{:016x}", plan.plan_hash()),
            };
            emit(cli.format, &report, || print_translate_text(&report))?;
        }
        Command::Explain(args) => {
            let plan = plan_request(&profile, args)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Schema(args) => {
            let schema = load_schema(&profile, args)?;
            let report: Vec<EntityReport> = schema.entities().map(entity_report).collect();
            emit(cli.format, &report, || print_schema_text(&report))?;
        }
    }
    Ok(())
}

fn plan_request(profile: &Profile, args: &RequestArgs) -> Result<QueryPlan, Box<dyn Error>> {
    let schema = load_schema(profile, &args.schema)?;
    let request: Request = serde_json::from_str(&read_source(&args.request)?)
        .map_err(|err| format!("invalid request {}: {err}", args.request.display()))?;
    let mut options = profile.options.clone();
    if args.track_changes {
        options.track_change_events = true;
    }
    let auth = match &args.jwt {
        Some(path) => {
            let claims: Map<String, Json> = serde_json::from_str(&read_source(path)?)
                .map_err(|err| format!("invalid claims {}: {err}", path.display()))?;
            AuthContext::authenticated(claims).with_claim_paths(&options.authorization)
        }
        None => AuthContext::anonymous(),
    };
    let translator = Translator::new(&schema, options);
    Ok(translator.translate(&request, &auth)?)
}

fn load_schema(profile: &Profile, args: &SchemaArgs) -> Result<SchemaModel, Box<dyn Error>> {
    let path = args
        .schema
        .as_ref()
        .or(profile.schema.as_ref())
        .ok_or("no schema given; pass --schema or set one in the CLI config")?;
    let raw = read_source(path)?;
    let model = if path.extension().is_some_and(|ext| ext == "toml") {
        SchemaModel::from_toml(&raw)?
    } else {
        SchemaModel::from_json(&raw)?
    };
    Ok(model)
}

fn read_source(path: &Path) -> Result<String, Box<dyn Error>> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    fs::read_to_string(path).map_err(|err| format!("failed to read {}: {err}", path.display()).into())
}

fn entity_report(entity: &Entity) -> EntityReport {
    match entity {
        Entity::Concrete(concrete) => EntityReport {
            name: concrete.name.clone(),
            kind: "node",
            labels: concrete.labels.clone(),
            members: Vec::new(),
            attributes: concrete.attributes.keys().cloned().collect(),
            relationships: concrete
                .relationships
                .values()
                .map(|rel| format!("{} -[:{}]-> {}", rel.name, rel.rel_type, rel.target))
                .collect(),
        },
        Entity::Composite(composite) => EntityReport {
            name: composite.name.clone(),
            kind: match composite.kind {
                CompositeKind::Interface => "interface",
                CompositeKind::Union => "union",
            },
            labels: Vec::new(),
            members: composite.members.clone(),
            attributes: composite.attributes.keys().cloned().collect(),
            relationships: composite.relationships.keys().cloned().collect(),
        },
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_translate_text(report: &TranslateReport) {
    println!("{}", report.cypher);
    println!();
    match &report.params {
        Json::Object(map) if map.is_empty() => println!("-- no parameters"),
        params => println!(
            "-- parameters\n{}",
            serde_json::to_string_pretty(params).unwrap_or_default()
        ),
    }
    println!("-- plan hash {}", report.plan_hash);
}

fn print_schema_text(report: &[EntityReport]) {
    for entity in report {
        match entity.kind {
            "node" => println!("{} ({}) :{}", entity.name, entity.kind, entity.labels.join(":")),
            _ => println!("{} ({}) = {}", entity.name, entity.kind, entity.members.join(" | ")),
        }
        for attribute in &entity.attributes {
            println!("  .{attribute}");
        }
        for rel in &entity.relationships {
            println!("  {rel}");
        }
    }
}
