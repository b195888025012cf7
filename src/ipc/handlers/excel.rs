use crate::access;
use crate::error::{AppError, AppResult};
use crate::ipc::error::respond;
use crate::ipc::helpers::{db_and_session, non_empty, params, session, to_value};
use crate::ipc::types::{AppState, Request};
use crate::model::{CategoryStatus, ColumnStatus, Target};
use crate::sheet::{self, Cell, SheetFormat};
use crate::workflow::{self, EntryValue, SaveSummary};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const TEMPLATE_HEADERS: [&str; 8] = [
    "category_id",
    "category_name",
    "column_id",
    "column_name",
    "type",
    "required",
    "options",
    "value",
];

/// Refuses paths whose extension is not a spreadsheet we can handle.
pub fn sheet_format(path: &Path) -> AppResult<SheetFormat> {
    match SheetFormat::from_path(path) {
        Some(SheetFormat::Xls) => Err(AppError::UnsupportedFormat(
            "legacy .xls workbooks are not supported; save as .xlsx".into(),
        )),
        Some(f) => Ok(f),
        None => Err(AppError::UnsupportedFormat(format!(
            "{} is not a .xlsx or .csv file",
            path.to_string_lossy()
        ))),
    }
}

/// Spreadsheet I/O failures keep their io kind so callers see `io_failed`.
pub fn sheet_error(e: anyhow::Error) -> AppError {
    match e.downcast::<std::io::Error>() {
        Ok(io) => AppError::Io(io),
        Err(other) => AppError::Other(other),
    }
}

fn path_param(raw: &str, field: &str) -> AppResult<PathBuf> {
    Ok(PathBuf::from(non_empty(raw, field)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateParams {
    category_ids: Vec<String>,
    out_path: String,
    #[serde(default)]
    include_optional: bool,
}

/// One blank-value row per required column; `includeOptional` adds the rest.
fn handle_download_template(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: TemplateParams = params(req)?;
    let out = path_param(&p.out_path, "outPath")?;
    sheet_format(&out)?;
    if p.category_ids.is_empty() {
        return Err(AppError::bad_params("categoryIds must not be empty"));
    }
    let (conn, _session) = db_and_session(state)?;

    let mut rows: Vec<Vec<Cell>> = vec![TEMPLATE_HEADERS.iter().map(|h| Cell::text(*h)).collect()];
    for category_id in &p.category_ids {
        let category = workflow::load_category(conn, category_id)?;
        if category.status != CategoryStatus::Active {
            return Err(AppError::validation(format!(
                "category {:?} is {} and does not accept data",
                category.name, category.status
            )));
        }
        for column in workflow::load_columns(conn, category_id)?
            .into_iter()
            .filter(|c| c.status == ColumnStatus::Active && (c.is_required || p.include_optional))
        {
            let options = column
                .options
                .iter()
                .map(|o| o.value.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            rows.push(vec![
                Cell::text(category.id.as_str()),
                Cell::text(category.name.as_str()),
                Cell::text(column.id),
                Cell::text(column.name),
                Cell::text(column.column_type.as_str()),
                Cell::text(if column.is_required { "yes" } else { "no" }),
                Cell::text(options),
                Cell::Empty,
            ]);
        }
    }

    sheet::write_table(&out, "Template", &rows).map_err(sheet_error)?;
    log::info!(
        "template written to {} ({} column row(s))",
        out.to_string_lossy(),
        rows.len() - 1
    );
    Ok(json!({ "path": out.to_string_lossy(), "rows": rows.len() - 1 }))
}

fn json_cell(v: &serde_json::Value) -> Cell {
    match v {
        serde_json::Value::Null => Cell::Empty,
        serde_json::Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
        serde_json::Value::String(s) => Cell::text(s.as_str()),
        serde_json::Value::Bool(b) => Cell::text(b.to_string()),
        other => Cell::text(other.to_string()),
    }
}

/// Header is the union of keys across rows, in first-seen order.
fn rows_to_table(rows: &[serde_json::Map<String, serde_json::Value>]) -> Vec<Vec<Cell>> {
    let mut headers: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }
    let mut table = vec![headers.iter().map(|h| Cell::text(*h)).collect::<Vec<_>>()];
    for row in rows {
        table.push(
            headers
                .iter()
                .map(|h| row.get(*h).map(json_cell).unwrap_or(Cell::Empty))
                .collect(),
        );
    }
    table
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportParams {
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
    out_path: String,
    #[serde(default)]
    sheet_name: Option<String>,
}

fn handle_export_data(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ExportParams = params(req)?;
    session(state)?;
    let out = path_param(&p.out_path, "outPath")?;
    sheet_format(&out)?;
    let table = rows_to_table(&p.rows);
    let sheet_name = p.sheet_name.as_deref().unwrap_or("Data");
    sheet::write_table(&out, sheet_name, &table).map_err(sheet_error)?;
    Ok(json!({ "path": out.to_string_lossy(), "rows": p.rows.len() }))
}

/// Header cell names; blanks become `columnN` so every value keeps a key.
fn header_names(row: &[String]) -> Vec<String> {
    row.iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim();
            if h.is_empty() {
                format!("column{}", i + 1)
            } else {
                h.to_string()
            }
        })
        .collect()
}

#[derive(Deserialize)]
struct ImportFileParams {
    path: String,
}

fn handle_import_file(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ImportFileParams = params(req)?;
    session(state)?;
    let path = path_param(&p.path, "path")?;
    sheet_format(&path)?;
    let table = sheet::read_table(&path).map_err(sheet_error)?;

    let mut lines = table.into_iter();
    let headers = lines.next().map(|h| header_names(&h)).unwrap_or_default();
    let rows: Vec<serde_json::Value> = lines
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .map(|r| {
            let obj: serde_json::Map<String, serde_json::Value> = headers
                .iter()
                .cloned()
                .zip(r.into_iter().map(serde_json::Value::String))
                .collect();
            serde_json::Value::Object(obj)
        })
        .collect();
    Ok(json!({ "headers": headers, "rows": rows }))
}

#[derive(Deserialize)]
struct ImportEntriesParams {
    path: String,
    target: Target,
}

fn find_header(headers: &[String], name: &str) -> AppResult<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| AppError::validation(format!("template is missing the {name} column")))
}

/// Saves the values of a filled template as drafts, one category at a time.
/// Rows that fail validation are reported as warnings and skipped.
fn handle_import_entries(state: &mut AppState, req: &Request) -> AppResult<serde_json::Value> {
    let p: ImportEntriesParams = params(req)?;
    let path = path_param(&p.path, "path")?;
    sheet_format(&path)?;
    let (conn, session) = db_and_session(state)?;
    access::require_editor(conn, session, &p.target)?;
    let table = sheet::read_table(&path).map_err(sheet_error)?;

    let Some(header) = table.first() else {
        return Err(AppError::validation("the file is empty"));
    };
    let category_col = find_header(header, "category_id")?;
    let column_col = find_header(header, "column_id")?;
    let value_col = find_header(header, "value")?;

    let mut warnings: Vec<String> = Vec::new();
    let mut by_category: BTreeMap<String, BTreeMap<String, EntryValue>> = BTreeMap::new();
    let mut columns_cache = BTreeMap::new();
    for (idx, row) in table.iter().enumerate().skip(1) {
        let line = idx + 1;
        let category_id = row[category_col].trim();
        let column_id = row[column_col].trim();
        let value = row[value_col].trim();
        if value.is_empty() {
            continue;
        }
        if category_id.is_empty() || column_id.is_empty() {
            warnings.push(format!("line {line}: missing category_id or column_id"));
            continue;
        }
        if !columns_cache.contains_key(category_id) {
            let columns = match workflow::load_columns(conn, category_id) {
                Ok(c) => c,
                Err(e) => {
                    warnings.push(format!("line {line}: {e}"));
                    continue;
                }
            };
            columns_cache.insert(category_id.to_string(), columns);
        }
        let column = columns_cache
            .get(category_id)
            .and_then(|cols| cols.iter().find(|c| c.id == column_id));
        let Some(column) = column else {
            warnings.push(format!("line {line}: unknown column {column_id}"));
            continue;
        };
        if column.status != ColumnStatus::Active {
            warnings.push(format!("line {line}: column {:?} is archived", column.name));
            continue;
        }
        let cleaned = match workflow::validate_value(column, value) {
            Ok(v) => v,
            Err(msg) => {
                warnings.push(format!("line {line}: {}: {msg}", column.name));
                continue;
            }
        };
        let previous = by_category
            .entry(category_id.to_string())
            .or_default()
            .insert(
                column_id.to_string(),
                EntryValue {
                    column_id: column_id.to_string(),
                    value: cleaned,
                    expected_version: None,
                },
            );
        if previous.is_some() {
            warnings.push(format!(
                "line {line}: {:?} repeated; the later value is kept",
                column.name
            ));
        }
    }

    let mut total = SaveSummary::default();
    let mut categories = 0;
    for (category_id, values) in by_category {
        let values: Vec<EntryValue> = values.into_values().collect();
        match workflow::save_entries(conn, session, &p.target, &category_id, &values) {
            Ok(s) => {
                categories += 1;
                total.saved += s.saved;
                total.unchanged += s.unchanged;
                total.reopened += s.reopened;
            }
            Err(e @ (AppError::Db(_) | AppError::Io(_) | AppError::Other(_))) => return Err(e),
            Err(e) => warnings.push(format!("category {category_id}: {e}")),
        }
    }

    log::info!(
        "{} imported {} value(s) for {} {} from {} ({} warning(s))",
        session.email,
        total.saved,
        p.target.kind,
        p.target.id,
        path.to_string_lossy(),
        warnings.len()
    );
    Ok(json!({
        "categories": categories,
        "summary": to_value(&total)?,
        "warnings": warnings
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "excel.downloadTemplate" => handle_download_template(state, req),
        "excel.exportData" => handle_export_data(state, req),
        "excel.importFile" => handle_import_file(state, req),
        "excel.importEntries" => handle_import_entries(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_header_is_union_in_first_seen_order() {
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = vec![
            serde_json::from_value(json!({ "school": "A", "count": 3 })).expect("row"),
            serde_json::from_value(json!({ "note": "x", "school": "B" })).expect("row"),
        ];
        let table = rows_to_table(&rows);
        assert_eq!(
            table[0],
            vec![Cell::text("school"), Cell::text("count"), Cell::text("note")]
        );
        assert_eq!(table[1], vec![Cell::text("A"), Cell::Number(3.0), Cell::Empty]);
        assert_eq!(table[2], vec![Cell::text("B"), Cell::Empty, Cell::text("x")]);
    }

    #[test]
    fn xls_is_refused() {
        let err = sheet_format(Path::new("old.XLS")).expect_err("xls");
        assert_eq!(err.code(), "unsupported_format");
        assert!(sheet_format(Path::new("notes.txt")).is_err());
        assert_eq!(sheet_format(Path::new("a.csv")).expect("csv"), SheetFormat::Csv);
    }

    #[test]
    fn blank_headers_get_positional_names() {
        let names = header_names(&["a".into(), " ".into(), "c".into()]);
        assert_eq!(names, vec!["a", "column2", "c"]);
    }
}
