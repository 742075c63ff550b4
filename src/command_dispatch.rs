//! Purpose: Hold top-level CLI command dispatch for `rowstore`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Output envelopes and exit code semantics are stable per command.
//! Invariants: Helpers in `main.rs` remain the source of command business logic.

use super::*;

const DEFAULT_MAX_SNIPPET_BYTES: usize = 200;

pub(super) fn dispatch_command(
    command: Command,
    table_dir: PathBuf,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "rowstore", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Create { table, schema } => {
            let created = create_table(&table_dir, &table, &schema)?;
            emit_json(created, color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Insert {
            table,
            values,
            durability,
        } => {
            let options = StoreOptions::new().with_durability(durability.into());
            let mut store = open_table(&table_dir, &table, options)?;
            let id = store.insert(values.as_slice())?;
            emit_json(
                json!({
                    "table": store.name(),
                    "id": id,
                    "offset": store.offset_of(id),
                }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Import {
            table,
            input,
            errors,
            no_header,
            durability,
        } => {
            let options = StoreOptions::new().with_durability(durability.into());
            let mut store = open_table(&table_dir, &table, options)?;
            let config = ImportConfig {
                errors: errors.into(),
                has_header: !no_header,
                delimiter: ',',
                max_snippet_bytes: DEFAULT_MAX_SNIPPET_BYTES,
            };
            let outcome = import_rows(&mut store, &input, config, color_mode)?;
            emit_json(
                json!({
                    "table": store.name(),
                    "records_total": outcome.records_total,
                    "ok": outcome.ok,
                    "failed": outcome.failed,
                }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Get { table, id } => {
            let store = open_table(&table_dir, &table, StoreOptions::new())?;
            let Some(row) = store.read_by_id(id)? else {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message(format!("no row with id {id} in table {}", store.name()))
                    .with_row_id(id)
                    .with_hint(format!(
                        "Table {} has {} rows (ids 0..{}).",
                        store.name(),
                        store.row_count(),
                        store.row_count()
                    )));
            };
            let entry = store
                .offset_of(id)
                .map(|offset| IndexEntry { row_id: id, offset });
            emit_json(row_json(store.schema(), entry, &row), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Print { table, limit } => {
            let store = open_table(&table_dir, &table, StoreOptions::new())?;
            let cursor = store.scan()?;
            let limit = limit.unwrap_or(usize::MAX);
            for (entry, row) in store.entries().iter().zip(&cursor).take(limit) {
                emit_line(&row_json(cursor.schema(), Some(*entry), row));
            }
            Ok(RunOutcome::ok())
        }
        Command::Index { table, limit } => {
            let store = open_table(&table_dir, &table, StoreOptions::new())?;
            let limit = limit.unwrap_or(usize::MAX);
            for entry in store.entries().iter().take(limit) {
                emit_line(&json!({ "id": entry.row_id, "offset": entry.offset }));
            }
            Ok(RunOutcome::ok())
        }
        Command::Join {
            inner,
            outer,
            inner_column,
            outer_column,
            seed,
            rows,
        } => {
            let inner = open_table(&table_dir, &inner, StoreOptions::new())?;
            let outer = open_table(&table_dir, &outer, StoreOptions::new())?;
            let pairs = match seed {
                Some(position) => {
                    inner.seeded_join(&outer, &outer_column, &inner_column, position)?
                }
                None => inner.full_join(&outer, &outer_column, &inner_column)?,
            };
            if rows {
                let cursor = materialize(&inner, &outer, &pairs)?;
                for row in &cursor {
                    emit_line(&row_json(cursor.schema(), None, row));
                }
            } else {
                emit_json(join_pairs_json(&inner, &outer, &pairs), color_mode);
            }
            Ok(RunOutcome::ok())
        }
        Command::Info { table } => {
            let store = open_table(&table_dir, &table, StoreOptions::new())?;
            let info = store.info()?;
            emit_json(table_info_json(&info, store.schema()), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::List => {
            let tables = list_tables(&table_dir)?;
            emit_json(json!({ "tables": tables }), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Drop { tables } => {
            let mut dropped = Vec::new();
            let mut failed = Vec::new();
            let mut first_error_kind = None;

            for table in tables {
                match drop_table(&table_dir, &table) {
                    Ok(value) => dropped.push(value),
                    Err(err) => {
                        if first_error_kind.is_none() {
                            first_error_kind = Some(err.kind());
                        }
                        failed.push(json!({
                            "table": table,
                            "error": error_json(&err)["error"].clone(),
                        }));
                    }
                }
            }

            emit_json(
                json!({
                    "dropped": dropped,
                    "failed": failed,
                }),
                color_mode,
            );
            let exit_code = first_error_kind.map(to_exit_code).unwrap_or(0);
            Ok(RunOutcome::with_code(exit_code))
        }
    }
}
