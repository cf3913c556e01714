//! Query subcommands.
//!
//! - `soc schema` - list the queryable fields of the selected index
//! - `soc validate` - check a criterion offline and optionally print its DSL
//! - `soc query` - validate, build and execute a criterion
//! - `soc chat` - hand a natural-language prompt to the backend

use clap::Parser;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use soc_core::SchemaCatalog;
use soc_core::SearchSpec;
use soc_core::ValidationReport;
use soc_core::search_spec::BuildError;
use soc_core::validation::CriterionDraft;
use soc_core::validation::ErrorField;
use soc_core::validation::ValidationError;
use soc_core::validation::resolve_criterion;
use soc_core::validation::selectable_operators;
use soc_protocol::FieldType;
use soc_protocol::QueryCriterion;
use soc_protocol::QueryOperator;
use soc_protocol::QueryResponse;
use soc_protocol::QueryValue;
use soc_protocol::Role;
use soc_protocol::Schema;
use soc_protocol::SchemaField;
use soc_protocol::TimeRange;

use crate::Console;

#[derive(Debug, Parser)]
pub struct SchemaArgs {
    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Field, operator, value and lookback of one criterion.
#[derive(Debug, Clone, Parser)]
pub struct CriterionArgs {
    /// Field name, e.g. `rule.level`.
    #[arg(long, short = 'f')]
    pub field: String,

    /// term, match or wildcard.
    #[arg(long = "op", short = 'o', default_value = "term")]
    pub operator: QueryOperator,

    /// Value to compare against.
    #[arg(long, short = 'v', default_value = "")]
    pub value: String,

    /// Lookback: 1h, 24h or 7d.
    #[arg(long = "range", short = 'r', default_value = "24h")]
    pub time_range: TimeRange,
}

impl CriterionArgs {
    fn draft(&self) -> CriterionDraft {
        CriterionDraft {
            field_name: self.field.clone(),
            operator: self.operator,
            value: QueryValue::from(self.value.as_str()),
            time_range: self.time_range,
        }
    }
}

#[derive(Debug, Parser)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub criterion: CriterionArgs,

    /// Field type, as the schema would report it. Unknown fields are
    /// treated as text.
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub field_type: Option<FieldType>,

    /// Validate as this role instead of the signed-in user's.
    #[arg(long)]
    pub role: Option<Role>,

    /// Result-size cap used for the printed DSL.
    #[arg(long, default_value_t = 100)]
    pub size: u32,

    /// Print the search DSL of a valid criterion.
    #[arg(long)]
    pub dsl: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    #[command(flatten)]
    pub criterion: CriterionArgs,

    /// Result-size cap. Defaults to the session's max results.
    #[arg(long)]
    pub size: Option<u32>,

    /// Output the raw response as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ChatArgs {
    /// What to look for, in plain language.
    pub prompt: String,

    /// Result-size cap. Defaults to the session's max results.
    #[arg(long)]
    pub size: Option<u32>,

    /// Output the raw response as JSON.
    #[arg(long)]
    pub json: bool,
}

pub async fn run_schema(console: &Console, args: SchemaArgs) -> anyhow::Result<i32> {
    console.require_login()?;
    let index = console.index();
    let catalog = SchemaCatalog::from_schema(console.client.schema(&index).await?);

    if args.json {
        println!("{}", serde_json::to_string_pretty(catalog.fields())?);
        return Ok(0);
    }
    println!("{} queryable fields in {index}", catalog.fields().len());
    for field in catalog.fields() {
        let operators: Vec<String> = selectable_operators(field.field_type)
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "  {:<40} {:<8} [{}]",
            field.name,
            field.field_type,
            operators.join(", ")
        );
    }
    Ok(0)
}

/// Exit code 0 when the criterion is valid, 1 when it is not.
pub fn run_validate(console: &Console, args: ValidateArgs) -> anyhow::Result<i32> {
    let mut catalog = SchemaCatalog::new();
    if let Some(field_type) = args.field_type {
        catalog.replace(Schema {
            index: console.index(),
            fields: vec![SchemaField::new(args.criterion.field.clone(), field_type)],
        });
    }
    let role = args.role.unwrap_or_else(|| console.session.role());

    let outcome = resolve_criterion(args.criterion.draft(), &catalog, role).and_then(|c| {
        SearchSpec::build(c, role, args.size, &console.index()).map_err(|err| match err {
            BuildError::Invalid(report) => report,
            BuildError::MissingIndex => missing_index_report(),
        })
    });

    match outcome {
        Ok(spec) => {
            if args.json {
                let mut out = json!({ "valid": true, "errors": {} });
                if args.dsl {
                    out["dsl"] = spec.to_query_dsl();
                }
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("valid");
                if args.dsl {
                    println!("{}", serde_json::to_string_pretty(&spec.to_query_dsl())?);
                }
            }
            Ok(0)
        }
        Err(report) => {
            print_report(&report, args.json)?;
            Ok(1)
        }
    }
}

pub async fn run_query(console: &Console, args: QueryArgs) -> anyhow::Result<i32> {
    console.require_login()?;
    let index = console.index();
    let role = console.session.role();
    let catalog = SchemaCatalog::from_schema(console.client.schema(&index).await?);

    let resolved = resolve_criterion(args.criterion.draft(), &catalog, role);
    let criterion: QueryCriterion = match resolved {
        Ok(criterion) => criterion,
        Err(report) => {
            print_report(&report, args.json)?;
            return Ok(1);
        }
    };
    let size = args
        .size
        .unwrap_or_else(|| console.session.snapshot().max_results);
    let spec = match SearchSpec::build(criterion, role, size, &index) {
        Ok(spec) => spec,
        Err(BuildError::Invalid(report)) => {
            print_report(&report, args.json)?;
            return Ok(1);
        }
        Err(BuildError::MissingIndex) => anyhow::bail!("no index selected"),
    };
    console.session.set_time_range(spec.time_range());

    let response = console.client.execute_search(&spec).await?;
    print_response(console, &response, args.json)?;
    Ok(0)
}

pub async fn run_chat(console: &Console, args: ChatArgs) -> anyhow::Result<i32> {
    console.require_login()?;
    let index = console.index();
    let size = args
        .size
        .unwrap_or_else(|| console.session.snapshot().max_results);
    let response = console.client.chat(&args.prompt, &index, size).await?;
    print_response(console, &response, args.json)?;
    Ok(0)
}

fn missing_index_report() -> ValidationReport {
    let mut report = ValidationReport::new();
    report.record(Some(ValidationError::new(
        ErrorField::Field,
        "No index selected",
    )));
    report
}

fn print_report(report: &ValidationReport, json: bool) -> anyhow::Result<()> {
    if json {
        let errors: Map<String, Value> = report
            .errors()
            .map(|err| (err.field.to_string(), Value::String(err.message)))
            .collect();
        let out = json!({ "valid": false, "errors": errors });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for err in report.errors() {
            println!("{}: {}", err.field, err.message);
        }
    }
    Ok(())
}

fn print_response(console: &Console, response: &QueryResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    print!("{} hits", response.results.total_hits);
    match response.severity {
        Some(severity) => println!(" (severity: {severity})"),
        None => println!(),
    }
    let rows = console.session.snapshot().rows_per_page as usize;
    for row in response.results.data.iter().take(rows) {
        println!("  {row}");
    }
    if response.results.data.len() > rows {
        println!("  ... {} more", response.results.data.len() - rows);
    }
    for (label, text) in [
        ("Analysis", &response.analysis),
        ("Story", &response.story),
        ("Remediation", &response.remediation),
    ] {
        if let Some(text) = text {
            println!("\n{label}:\n{text}");
        }
    }
    Ok(())
}
