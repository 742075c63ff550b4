//! Purpose: `rowstore` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout (one document, or one line per row for dumps).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All table mutations go through `api::Store`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod import;
mod table_info_json;
mod table_paths;

use import::{ErrorPolicy, ImportConfig, ImportFailure, ImportOutcome, import};
use rowstore::api::{
    Durability, Error, ErrorKind, IndexEntry, JoinPair, Schema, Store, StoreOptions, StorePaths,
    materialize, to_exit_code,
};
use rowstore::notice::{Notice, notice_json};
use table_info_json::{columns_json, row_json, table_info_json};
use table_paths::{
    TableNameResolveError, default_table_dir, resolve_table_name, schema_path,
    table_name_from_schema_file,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let message = clap_error_summary(&err);
                let hint = clap_error_hint(&err);
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(message)
                        .with_hint(hint),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let table_dir = cli.dir.unwrap_or_else(default_table_dir);
    let color_mode = cli.color;

    let result = command_dispatch::dispatch_command(cli.command, table_dir, color_mode);

    result
        .map_err(add_corrupt_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

#[derive(Parser)]
#[command(
    name = "rowstore",
    version,
    about = "Fixed-width record tables in plain files",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Each table is a data file of fixed-size records plus an id -> offset index.

Mental model:
  - `create` defines a table from a JSON schema
  - `insert` / `import` append rows (ids are assigned 0, 1, 2, ...)
  - `get` reads one row by id; `join` matches rows across two tables
"#,
    after_help = r#"EXAMPLES
  $ rowstore create Person --schema person.json
  $ rowstore insert Person 9 Jhoe
  $ rowstore get Person 0
  $ rowstore join Person Worked --inner-column dre --outer-column id_person

LEARN MORE
  $ rowstore <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        help = "Table directory (default: ~/.rowstore/tables)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, ValueEnum)]
enum ErrorPolicyCli {
    Stop,
    Skip,
}

impl From<ErrorPolicyCli> for ErrorPolicy {
    fn from(value: ErrorPolicyCli) -> Self {
        match value {
            ErrorPolicyCli::Stop => ErrorPolicy::Stop,
            ErrorPolicyCli::Skip => ErrorPolicy::Skip,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, ValueEnum)]
enum DurabilityCli {
    Fast,
    Flush,
}

impl From<DurabilityCli> for Durability {
    fn from(value: DurabilityCli) -> Self {
        match value {
            DurabilityCli::Fast => Durability::Fast,
            DurabilityCli::Flush => Durability::Flush,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Create a table from a JSON schema file",
        after_help = r#"SCHEMA FORMAT
  {"columns": [
    {"name": "dre", "type": "int32"},
    {"name": "name", "type": "text", "width": 32},
    {"name": "id_person", "type": "foreign_key"}
  ]}

  Types: int32, int64, float32, float64, text (requires width), foreign_key.
  The `_id` column is implicit and always first."#
    )]
    Create {
        #[arg(help = "Table name")]
        table: String,
        #[arg(long, help = "Path to the schema JSON file", value_hint = ValueHint::FilePath)]
        schema: PathBuf,
    },
    #[command(
        about = "Append one row",
        after_help = r#"EXAMPLES
  $ rowstore insert Person 9 Jhoe
  $ rowstore insert Worked 0 --durability flush"#
    )]
    Insert {
        #[arg(help = "Table name")]
        table: String,
        #[arg(
            required = true,
            allow_negative_numbers = true,
            help = "Values in schema order, without `_id`"
        )]
        values: Vec<String>,
        #[arg(long, value_enum, default_value = "fast", help = "Durability mode: fast|flush")]
        durability: DurabilityCli,
    },
    #[command(
        about = "Append rows from comma-separated text",
        long_about = r#"Append rows from comma-separated text.

The first line is a header and is skipped unless --no-header is given. Fields
are split on commas and trimmed; quoting is not supported."#
    )]
    Import {
        #[arg(help = "Table name")]
        table: String,
        #[arg(help = "Input file (use - for stdin)", value_hint = ValueHint::FilePath)]
        input: PathBuf,
        #[arg(long, value_enum, default_value = "stop", help = "On a bad row: stop|skip")]
        errors: ErrorPolicyCli,
        #[arg(long, help = "Treat the first line as data")]
        no_header: bool,
        #[arg(long, value_enum, default_value = "fast", help = "Durability mode: fast|flush")]
        durability: DurabilityCli,
    },
    #[command(about = "Read one row by id")]
    Get {
        #[arg(help = "Table name")]
        table: String,
        #[arg(allow_negative_numbers = true, help = "Row id")]
        id: i64,
    },
    #[command(about = "Dump every row as JSON lines")]
    Print {
        #[arg(help = "Table name")]
        table: String,
        #[arg(long, help = "Stop after N rows")]
        limit: Option<usize>,
    },
    #[command(about = "Dump the id -> offset index as JSON lines")]
    Index {
        #[arg(help = "Table name")]
        table: String,
        #[arg(long, help = "Stop after N entries")]
        limit: Option<usize>,
    },
    #[command(
        about = "Equi-join two tables",
        long_about = r#"Equi-join two tables.

Every row of the inner table is compared with every row of the outer table.
The result is a list of (inner offset, outer offset) pairs in inner index order,
or the joined rows themselves with --rows."#,
        after_help = r#"EXAMPLES
  $ rowstore join Person Worked --inner-column dre --outer-column id_person
  $ rowstore join Person Worked --inner-column dre --outer-column id_person --seed 0 --rows"#
    )]
    Join {
        #[arg(help = "Inner table (drives output order)")]
        inner: String,
        #[arg(help = "Outer table")]
        outer: String,
        #[arg(long, help = "Join column of the inner table")]
        inner_column: String,
        #[arg(long, help = "Join column of the outer table")]
        outer_column: String,
        #[arg(long, help = "Join only the inner row at this index position")]
        seed: Option<usize>,
        #[arg(long, help = "Emit joined rows instead of offset pairs")]
        rows: bool,
    },
    #[command(about = "Show table files, sizes, and columns")]
    Info {
        #[arg(help = "Table name")]
        table: String,
    },
    #[command(about = "List tables in the table directory")]
    List,
    #[command(about = "Delete tables and their files")]
    Drop {
        #[arg(required = true, help = "Table names")]
        tables: Vec<String>,
    },
    #[command(
        about = "Generate shell completions",
        after_help = r#"EXAMPLES
  $ rowstore completion bash > ~/.local/share/bash-completion/completions/rowstore
  $ rowstore completion zsh > ~/.zfunc/_rowstore"#
    )]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn resolve_table(table: &str) -> Result<&str, Error> {
    resolve_table_name(table).map_err(|err| map_table_name_resolve_error(err, table))
}

fn map_table_name_resolve_error(err: TableNameResolveError, input: &str) -> Error {
    match err {
        TableNameResolveError::Empty => Error::new(ErrorKind::Usage)
            .with_message("table name is empty")
            .with_hint("Pass a table name such as `Person`."),
        TableNameResolveError::ContainsPathSeparator => Error::new(ErrorKind::Usage)
            .with_message(format!("invalid table name `{input}`"))
            .with_hint("Table names cannot contain path separators; use --dir to pick a directory."),
    }
}

fn io_error(err: io::Error, path: &Path, message: &str) -> Error {
    let kind = match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
        _ => ErrorKind::Io,
    };
    Error::new(kind)
        .with_message(message)
        .with_path(path)
        .with_source(err)
}

fn ensure_table_dir(dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(dir).map_err(|err| io_error(err, dir, "failed to create table directory"))
}

fn touch(path: &Path) -> Result<(), Error> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|err| io_error(err, path, "failed to create table file"))
}

fn load_table_schema(table_dir: &Path, table: &str) -> Result<Schema, Error> {
    let path = schema_path(table_dir, table);
    let text = fs::read_to_string(&path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => Error::new(ErrorKind::NotFound)
            .with_message(format!("table {table} does not exist"))
            .with_path(&path)
            .with_hint(format!(
                "Create it first: rowstore create {table} --schema FILE (or check --dir)."
            )),
        _ => io_error(err, &path, "failed to read table schema"),
    })?;
    Schema::from_json(&text).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("table schema file is invalid")
            .with_path(&path)
            .with_source(err)
    })
}

fn open_table(table_dir: &Path, table: &str, options: StoreOptions) -> Result<Store, Error> {
    let name = resolve_table(table)?;
    let schema = load_table_schema(table_dir, name)?;
    Store::open_with_options(table_dir, name, schema, options)
}

fn create_table(table_dir: &Path, table: &str, schema_file: &Path) -> Result<Value, Error> {
    let name = resolve_table(table)?;
    let text = fs::read_to_string(schema_file)
        .map_err(|err| io_error(err, schema_file, "failed to read schema file"))?;
    let schema = Schema::from_json(&text).map_err(|err| err.with_path(schema_file))?;

    ensure_table_dir(table_dir)?;
    let sidecar = schema_path(table_dir, name);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&sidecar)
        .map_err(|err| match err.kind() {
            io::ErrorKind::AlreadyExists => Error::new(ErrorKind::AlreadyExists)
                .with_message(format!("table {name} already exists"))
                .with_path(&sidecar)
                .with_hint(format!("Drop it first with `rowstore drop {name}`, or pick another name.")),
            _ => io_error(err, &sidecar, "failed to create table schema"),
        })?;
    file.write_all(schema.to_json()?.as_bytes())
        .map_err(|err| io_error(err, &sidecar, "failed to write table schema"))?;

    let paths = StorePaths::new(table_dir, name);
    touch(&paths.data)?;
    touch(&paths.index)?;
    let store = Store::open(table_dir, name, schema)?;
    Ok(json!({
        "created": {
            "table": store.name(),
            "schema_path": sidecar.display().to_string(),
            "record_size": store.layout().record_size(),
            "columns": columns_json(store.schema().columns()),
        }
    }))
}

fn import_rows(
    store: &mut Store,
    input: &Path,
    config: ImportConfig,
    color_mode: ColorMode,
) -> Result<ImportOutcome, Error> {
    let reader: Box<dyn Read> = if input == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(File::open(input).map_err(|err| io_error(err, input, "failed to open input"))?)
    };
    let table = store.name().to_string();
    import(
        reader,
        config,
        |row| store.insert(row.as_slice()).map(|_| ()),
        |failure| emit_notice(&import_skip_notice(&table, &failure), color_mode),
    )
}

fn import_skip_notice(table: &str, failure: &ImportFailure) -> Notice {
    let mut details = Map::new();
    details.insert("line".to_string(), json!(failure.line));
    details.insert("error_kind".to_string(), json!(failure.error_kind));
    if let Some(snippet) = &failure.snippet {
        details.insert("snippet".to_string(), json!(snippet));
    }
    Notice {
        kind: "import_skip".to_string(),
        time: notice_time_now().unwrap_or_default(),
        cmd: "import".to_string(),
        table: table.to_string(),
        message: failure.message.clone(),
        details,
    }
}

fn join_pairs_json(inner: &Store, outer: &Store, pairs: &[JoinPair]) -> Value {
    let pairs = pairs
        .iter()
        .map(|pair| json!([pair.inner_offset, pair.outer_offset]))
        .collect::<Vec<_>>();
    json!({
        "inner": inner.name(),
        "outer": outer.name(),
        "count": pairs.len(),
        "pairs": pairs,
    })
}

fn list_table_names(table_dir: &Path) -> Result<Vec<String>, Error> {
    let entries = match fs::read_dir(table_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(io_error(err, table_dir, "failed to read table directory")),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|err| io_error(err, table_dir, "failed to read table directory entry"))?;
        let file_name = entry.file_name();
        if let Some(name) = file_name.to_str().and_then(table_name_from_schema_file) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn list_tables(table_dir: &Path) -> Result<Vec<Value>, Error> {
    let tables = list_table_names(table_dir)?
        .into_iter()
        .map(|name| {
            let described = open_table(table_dir, &name, StoreOptions::new())
                .and_then(|store| store.info().map(|info| table_info_json(&info, store.schema())));
            described.unwrap_or_else(|err| table_list_error(&name, table_dir, err))
        })
        .collect();
    Ok(tables)
}

fn table_list_error(name: &str, table_dir: &Path, err: Error) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(name));
    map.insert(
        "schema_path".to_string(),
        json!(schema_path(table_dir, name).display().to_string()),
    );
    map.insert("error".to_string(), error_json(&err)["error"].clone());
    Value::Object(map)
}

fn drop_table(table_dir: &Path, table: &str) -> Result<Value, Error> {
    let mut store = open_table(table_dir, table, StoreOptions::new())?;
    let rows = store.row_count();
    store.drop()?;
    let sidecar = schema_path(table_dir, store.name());
    fs::remove_file(&sidecar)
        .map_err(|err| io_error(err, &sidecar, "failed to remove table schema"))?;
    Ok(json!({
        "table": store.name(),
        "rows": rows,
    }))
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Permission => err.with_hint(
            "Permission denied. Check directory permissions or use --dir to a writable location.",
        ),
        ErrorKind::Busy => {
            err.with_hint("Table is busy (another writer holds the lock). Retry with backoff.")
        }
        ErrorKind::Io => err.with_hint("I/O error. Check the path, filesystem, and disk space."),
        ErrorKind::Read => err.with_hint(
            "The data file is shorter than the index expects. Check `rowstore info <table>`.",
        ),
        _ => err,
    }
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("Table appears corrupt. Inspect it with `rowstore index <table>` or recreate it.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_LOG=debug and share command/context if it persists.",
    )
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

/// One compact JSON document per line, for row and index dumps.
fn emit_line(value: &Value) {
    let json = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notice_time_now() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {} (table: {})", notice.message, notice.table);
        return;
    }

    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Permission => "permission denied".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Encoding => "value does not fit its column".to_string(),
        ErrorKind::Read => "record read failed".to_string(),
        ErrorKind::InvalidState => "table is no longer usable".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(row_id) = err.row_id() {
        inner.insert("id".to_string(), json!(row_id));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(column) = err.column() {
        lines.push(format!(
            "{} {column}",
            colorize_label("column:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(row_id) = err.row_id() {
        lines.push(format!(
            "{} {row_id}",
            colorize_label("id:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!(
            "{} {offset}",
            colorize_label("offset:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);

    let Some(usage) = usage else {
        return "Try `rowstore --help`.".to_string();
    };

    let tokens: Vec<&str> = usage.split_whitespace().collect();
    let Some(pos) = tokens.iter().position(|t| *t == "rowstore") else {
        return "Try `rowstore --help`.".to_string();
    };

    let parts = tokens
        .iter()
        .skip(pos + 1)
        .take_while(|token| {
            !(token.starts_with('-') || token.starts_with('<') || token.starts_with('['))
        })
        .copied()
        .collect::<Vec<_>>();

    if parts.is_empty() {
        return "Try `rowstore --help`.".to_string();
    }
    format!("Try `rowstore {} --help`.", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::{
        Error, ErrorKind, add_corrupt_hint, add_io_hint, create_table, drop_table, error_json,
        error_text, list_table_names, list_tables, load_table_schema, normalize_args, open_table,
    };
    use rowstore::api::StoreOptions;
    use std::ffi::OsString;

    const PERSON_SCHEMA: &str = r#"{"columns":[
        {"name":"dre","type":"int32"},
        {"name":"name","type":"text","width":16}
    ]}"#;

    fn write_schema(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("person.json");
        std::fs::write(&path, PERSON_SCHEMA).expect("write schema");
        path
    }

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::Usage).with_message("bad input");
        let colored = error_text(&err, true);
        let plain = error_text(&err, false);
        assert!(colored.contains("\u{1b}[31merror:\u{1b}[0m"));
        assert!(plain.contains("error:"));
        assert!(!plain.contains("\u{1b}["));
    }

    #[test]
    fn error_json_carries_record_context() {
        let err = Error::new(ErrorKind::Corrupt)
            .with_message("bad header")
            .with_row_id(4)
            .with_offset(1068)
            .with_column("dre");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Corrupt");
        assert_eq!(value["error"]["id"], 4);
        assert_eq!(value["error"]["offset"], 1068);
        assert_eq!(value["error"]["column"], "dre");
    }

    #[test]
    fn hints_are_added_once() {
        let err = add_corrupt_hint(Error::new(ErrorKind::Corrupt));
        assert!(err.hint().is_some_and(|hint| hint.contains("corrupt")));
        let kept = add_io_hint(Error::new(ErrorKind::Io).with_hint("custom"));
        assert_eq!(kept.hint(), Some("custom"));
    }

    #[test]
    fn normalize_args_rewrites_triple_dash_help() {
        let args = normalize_args(vec![OsString::from("rowstore"), OsString::from("---help")]);
        assert_eq!(args[1], OsString::from("--help"));
    }

    #[test]
    fn create_writes_sidecar_and_refuses_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let schema_file = write_schema(dir.path());
        let tables = dir.path().join("tables");

        let created = create_table(&tables, "Person", &schema_file).expect("create");
        assert_eq!(created["created"]["table"], "Person");
        assert_eq!(created["created"]["record_size"], 267 + 8 + 4 + 16);
        assert!(tables.join("Person.schema.json").exists());
        assert!(tables.join("Person.dat").exists());
        assert!(tables.join("Person_h.dat").exists());

        let err = create_table(&tables, "Person", &schema_file).expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let schema = load_table_schema(&tables, "Person").expect("reload");
        assert_eq!(schema.resolve("name"), Some(2));
    }

    #[test]
    fn missing_table_is_not_found_with_hint() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = open_table(dir.path(), "Ghost", StoreOptions::new())
            .err()
            .expect("missing table");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.hint().is_some());

        let err = open_table(dir.path(), "../x", StoreOptions::new())
            .err()
            .expect("bad name");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn list_reports_tables_and_drop_removes_them() {
        let dir = tempfile::tempdir().expect("tempdir");
        let schema_file = write_schema(dir.path());
        let tables = dir.path().join("tables");
        assert!(list_table_names(&tables).expect("empty").is_empty());

        create_table(&tables, "B", &schema_file).expect("create B");
        create_table(&tables, "A", &schema_file).expect("create A");
        let mut store = open_table(&tables, "A", StoreOptions::new()).expect("open");
        store.insert(&["9", "Jhoe"]).expect("insert");

        assert_eq!(list_table_names(&tables).expect("names"), vec!["A", "B"]);
        let listed = list_tables(&tables).expect("list");
        assert_eq!(listed[0]["rows"], 1);

        let dropped = drop_table(&tables, "A").expect("drop");
        assert_eq!(dropped["rows"], 1);
        assert!(!tables.join("A.dat").exists());
        assert!(!tables.join("A.schema.json").exists());
        assert_eq!(list_table_names(&tables).expect("names"), vec!["B"]);
    }
}
