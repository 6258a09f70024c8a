//! Alias interchange files.
//!
//! CSV with the header `name,short_name,state__short_name,aliases`, one row
//! per entity that has aliases. `aliases` is the comma-joined alias text, so
//! it is quoted by the CSV writer.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alias::AliasSet;
use crate::civic::{City, County, Locality, State};
use crate::engine::DedupeEngine;
use crate::error::DedupeResult;
use crate::model::Dedupe;
use crate::query::Lookup;
use crate::record::RecordId;
use crate::registry;
use crate::storage::RecordStore;

/// Column names, in file order.
pub const HEADER: [&str; 4] = ["name", "short_name", "state__short_name", "aliases"];

/// One row of an alias file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRow {
    /// Identifying name.
    pub name: String,
    /// Abbreviation, if any.
    #[serde(default)]
    pub short_name: Option<String>,
    /// Postal abbreviation of the containing state.
    #[serde(rename = "state__short_name", default)]
    pub state_short_name: Option<String>,
    /// Comma-joined aliases.
    #[serde(default)]
    pub aliases: Option<String>,
}

/// Counts from [`load_aliases`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Data rows read.
    pub rows: usize,
    /// Cities created because no existing one matched.
    pub created: usize,
    /// Cities whose aliases were set for the first time.
    pub set: usize,
    /// Cities whose existing aliases were extended.
    pub extended: usize,
    /// Rows that changed nothing.
    pub unchanged: usize,
    /// Rows skipped because of conflicting aliases or a blank name.
    pub skipped: usize,
    /// Saves that merged other cities.
    pub merges: usize,
}

enum RowOutcome {
    Set,
    Extended,
    Unchanged,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// What one row did. Counted only once its transaction commits.
struct RowResult {
    outcome: RowOutcome,
    created: bool,
    merged: bool,
}

fn load_row<S: RecordStore>(engine: &DedupeEngine<S>, row: &AliasRow) -> DedupeResult<RowResult> {
    let max = engine.config().max_alias_text_len;
    engine.store().transaction(|txn| {
        let scope = match non_blank(row.state_short_name.as_deref()) {
            Some(short_name) => {
                let (state, _) =
                    registry::get_or_create::<State>(txn, short_name, &Lookup::new(), max)?;
                Lookup::new().eq("state", state.id)
            }
            None => Lookup::new().is_null("state"),
        };

        let (mut city, created) =
            registry::find_or_create::<City>(txn, row.name.trim(), &scope, max)?;

        let loaded = AliasSet::from_field(row.aliases.as_deref());
        let existing = AliasSet::from_field(city.aliases.as_deref());
        let mut merged = existing.clone();
        merged.extend(loaded.iter());
        merged.remove(&city.name);
        if merged == existing {
            return Ok(RowResult {
                outcome: RowOutcome::Unchanged,
                created,
                merged: false,
            });
        }

        let outcome = if existing.is_empty() {
            RowOutcome::Set
        } else {
            RowOutcome::Extended
        };
        info!(city = %city.name, aliases = %merged, "setting aliases");
        city.aliases = merged.to_text();
        let saved = engine.save_in(txn, city)?;
        Ok(RowResult {
            outcome,
            created,
            merged: saved.merge.is_some(),
        })
    })
}

/// Loads city aliases from CSV.
///
/// Each row's state is created if needed and its city found (by name or
/// alias) or created within that state. Loaded aliases are added to the
/// city's existing ones, never replacing them, and saved through the normal
/// pipeline, so a row may merge cities. Each row runs in one transaction;
/// rows that hit a conflicting alias are logged and skipped without leaving
/// any state or city behind. Loading the same file twice changes nothing the second
/// time.
///
/// # Errors
/// - `Csv`: malformed input
/// - any non-conflict error from lookup or save
pub fn load_aliases<S: RecordStore, R: Read>(
    engine: &DedupeEngine<S>,
    reader: R,
) -> DedupeResult<LoadReport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut report = LoadReport::default();
    for result in reader.deserialize::<AliasRow>() {
        let row = result?;
        report.rows += 1;

        if row.name.trim().is_empty() {
            warn!(line = report.rows + 1, "skipping row without a name");
            report.skipped += 1;
            continue;
        }

        match load_row(engine, &row) {
            Ok(result) => {
                report.created += usize::from(result.created);
                report.merges += usize::from(result.merged);
                match result.outcome {
                    RowOutcome::Set => report.set += 1,
                    RowOutcome::Extended => report.extended += 1,
                    RowOutcome::Unchanged => report.unchanged += 1,
                }
            }
            Err(e) if e.is_conflict() => {
                warn!(name = %row.name, error = %e, "skipping conflicting aliases");
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        rows = report.rows,
        created = report.created,
        skipped = report.skipped,
        merges = report.merges,
        "loaded aliases"
    );
    Ok(report)
}

/// [`load_aliases`] from a file.
///
/// # Errors
/// - `Io`: the file cannot be opened
/// - see [`load_aliases`]
pub fn load_aliases_from_path<S: RecordStore>(
    engine: &DedupeEngine<S>,
    path: impl AsRef<Path>,
) -> DedupeResult<LoadReport> {
    load_aliases(engine, File::open(path)?)
}

fn state_short_name<S: RecordStore>(
    engine: &DedupeEngine<S>,
    state: Option<RecordId>,
) -> DedupeResult<Option<String>> {
    let Some(id) = state else {
        return Ok(None);
    };
    Ok(engine.get::<State>(id)?.map(|state| state.short_name))
}

fn aliased<T: Dedupe, S: RecordStore>(engine: &DedupeEngine<S>) -> DedupeResult<Vec<T>> {
    Ok(engine
        .select::<T>(&Lookup::new())?
        .into_iter()
        .filter(|entity| entity.aliases().is_some())
        .collect())
}

/// Collects one row per locality, city and county that has aliases.
///
/// # Errors
/// - store errors
pub fn alias_rows<S: RecordStore>(engine: &DedupeEngine<S>) -> DedupeResult<Vec<AliasRow>> {
    let mut rows = Vec::new();

    for locality in aliased::<Locality, S>(engine)? {
        rows.push(AliasRow {
            name: locality.name,
            short_name: locality.short_name,
            state_short_name: None,
            aliases: locality.aliases,
        });
    }
    for city in aliased::<City, S>(engine)? {
        rows.push(AliasRow {
            state_short_name: state_short_name(engine, city.state)?,
            name: city.name,
            short_name: city.short_name,
            aliases: city.aliases,
        });
    }
    for county in aliased::<County, S>(engine)? {
        rows.push(AliasRow {
            state_short_name: state_short_name(engine, county.state)?,
            name: county.name,
            short_name: county.short_name,
            aliases: county.aliases,
        });
    }

    Ok(rows)
}

/// Writes every aliased locality, city and county as CSV. The header is
/// written even when there are no rows. Returns the number of rows.
///
/// # Errors
/// - `Csv` / `Io`: the writer failed
/// - store errors
pub fn dump_aliases<S: RecordStore, W: Write>(
    engine: &DedupeEngine<S>,
    writer: W,
) -> DedupeResult<usize> {
    let rows = alias_rows(engine)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(HEADER)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(rows.len())
}

/// [`dump_aliases`] into a file, replacing it.
///
/// # Errors
/// - `Io`: the file cannot be created
/// - see [`dump_aliases`]
pub fn dump_aliases_to_path<S: RecordStore>(
    engine: &DedupeEngine<S>,
    path: impl AsRef<Path>,
) -> DedupeResult<usize> {
    dump_aliases(engine, File::create(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
name,short_name,state__short_name,aliases
Alameda,,CA,\"ALAMEDA,Alameda City\"
San Diego,SD,CA,La Jolla
Springfield,,,
";

    #[test]
    fn rows_deserialize_blank_fields_as_none() {
        let mut reader = csv::Reader::from_reader(SAMPLE.as_bytes());
        let rows: Vec<AliasRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].state_short_name.as_deref(), Some("CA"));
        assert_eq!(rows[0].aliases.as_deref(), Some("ALAMEDA,Alameda City"));
        assert_eq!(rows[2].state_short_name, None);
        assert_eq!(rows[2].aliases, None);
    }

    #[test]
    fn load_creates_states_and_cities() {
        let engine = DedupeEngine::in_memory();
        let report = load_aliases(&engine, SAMPLE.as_bytes()).unwrap();

        assert_eq!(report.rows, 3);
        assert_eq!(report.created, 3);
        assert_eq!(report.set, 2);
        assert_eq!(report.unchanged, 1);

        let ca = engine.find::<State>("CA", &Lookup::new()).unwrap();
        let alameda: City = engine
            .find("Alameda City", &Lookup::new().eq("state", ca.id))
            .unwrap();
        assert_eq!(alameda.name, "Alameda");
    }

    #[test]
    fn dump_of_empty_store_is_header_only() {
        let engine = DedupeEngine::in_memory();
        let mut out = Vec::new();
        assert_eq!(dump_aliases(&engine, &mut out).unwrap(), 0);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "name,short_name,state__short_name,aliases\n"
        );

        let report = load_aliases(&engine, "name,short_name,state__short_name,aliases\n".as_bytes())
            .unwrap();
        assert_eq!(report, LoadReport::default());
    }
}
